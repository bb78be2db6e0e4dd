/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::common::{ActorId, DirectorInner, Mutation, Scheduler};
use crate::message::PnError;
use crate::traits::Token;

/// What an actor sees of the network while it runs.
///
/// Handed to every [`Actor`](crate::prelude::Actor) callback on the actor's
/// own process thread. All blocking calls re-check the network's stop flag,
/// so errors from them should be propagated with `?`.
pub struct ProcessContext<T: Token> {
    actor: ActorId,
    name: Arc<str>,
    inner: Arc<DirectorInner<T>>,
    iteration: Cell<u64>,
}

impl<T: Token> ProcessContext<T> {
    pub(crate) fn new(actor: ActorId, name: Arc<str>, inner: Arc<DirectorInner<T>>) -> Self {
        Self {
            actor,
            name,
            inner,
            iteration: Cell::new(0),
        }
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn advance_iteration(&self) {
        self.iteration.set(self.iteration.get() + 1);
    }

    /// The actor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The actor's id.
    pub fn actor_id(&self) -> ActorId {
        self.actor
    }

    /// Number of completed firings.
    pub fn iteration(&self) -> u64 {
        self.iteration.get()
    }

    /// Reads the next token from channel 0 of `port`.
    ///
    /// # Errors
    ///
    /// [`PnError::UnknownPort`] if nothing is connected to `port`, or the
    /// receiver's errors.
    pub fn get(&self, port: &str) -> Result<T, PnError> {
        self.get_channel(port, 0)
    }

    /// Reads the next token from one channel of a multi-input port.
    ///
    /// # Errors
    ///
    /// [`PnError::UnknownPort`] if the channel does not exist, or the
    /// receiver's errors.
    pub fn get_channel(&self, port: &str, channel: usize) -> Result<T, PnError> {
        let receiver = self
            .inner
            .input(self.actor, port, channel)
            .ok_or_else(|| self.unknown_port(port))?;
        receiver.get()
    }

    /// Number of channels connected to the input `port`.
    pub fn width(&self, port: &str) -> usize {
        self.inner.input_width(self.actor, port)
    }

    /// Writes `token` to every receiver connected to the output `port`, in
    /// connection order. An unconnected output discards the token.
    ///
    /// # Errors
    ///
    /// The first receiver error; receivers after it are not written.
    pub fn put(&self, port: &str, token: T) -> Result<(), PnError> {
        let receivers = self.inner.outputs(self.actor, port);
        let Some((last, rest)) = receivers.split_last() else {
            trace!(actor = %self.name, port, "output not connected; token dropped");
            return Ok(());
        };
        for receiver in rest {
            receiver.put(token.clone())?;
        }
        last.put(token)
    }

    /// Writes `token` to one connection of the output `port`.
    ///
    /// # Errors
    ///
    /// [`PnError::UnknownPort`] if the port has no such connection, or the
    /// receiver's errors.
    pub fn send(&self, port: &str, channel: usize, token: T) -> Result<(), PnError> {
        let receivers = self.inner.outputs(self.actor, port);
        let receiver = receivers
            .get(channel)
            .ok_or_else(|| self.unknown_port(port))?;
        receiver.put(token)
    }

    /// Current logical time.
    pub fn model_time(&self) -> f64 {
        self.scheduler().model_time()
    }

    /// Blocks until logical time has advanced by `delta`.
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidState`] for a negative or NaN `delta`;
    /// [`PnError::TerminationRequested`] if the network stops first.
    pub fn delay(&self, delta: f64) -> Result<(), PnError> {
        if delta.is_nan() || delta < 0.0 {
            return Err(PnError::InvalidState(format!(
                "cannot delay by {delta}"
            )));
        }
        self.wait_until(self.model_time() + delta)
    }

    /// Blocks until logical time reaches `time`. Returns at once when `time`
    /// is the current time.
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidState`] if `time` is already in the past;
    /// [`PnError::TerminationRequested`] if the network stops first.
    pub fn wait_until(&self, time: f64) -> Result<(), PnError> {
        let now = self.model_time();
        if time.is_nan() || time < now {
            return Err(PnError::InvalidState(format!(
                "cannot wait until {time}: model time is already {now}"
            )));
        }
        if time == now {
            return Ok(());
        }
        self.scheduler().delay_until(self.actor, time)
    }

    /// Asks the director to apply `mutation` and blocks until it has.
    ///
    /// The director pauses the network, applies the mutation and resumes it.
    /// A mutation that removes the calling actor ends this process.
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidMutation`] if the mutation was refused;
    /// [`PnError::TerminationRequested`] if the network stops first.
    pub fn request_mutation(&self, mutation: Mutation<T>) -> Result<(), PnError> {
        self.inner.request_mutation(self.actor, mutation)
    }

    /// A removed actor loses its ports before it stops; that is reported as
    /// the stop rather than as a missing port.
    fn unknown_port(&self, port: &str) -> PnError {
        if self.scheduler().stop_requested_for(self.actor) {
            return PnError::TerminationRequested;
        }
        PnError::UnknownPort {
            actor: self.name.to_string(),
            port: port.to_string(),
        }
    }
}

impl<T: Token> fmt::Debug for ProcessContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("actor", &self.actor)
            .field("name", &self.name)
            .field("iteration", &self.iteration.get())
            .finish()
    }
}
