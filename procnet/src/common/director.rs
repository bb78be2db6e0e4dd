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

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::actor::{current_process, ProcessState};
use crate::common::{
    DirectorInner, Graph, ListenerId, Mutation, PauseOwner, PnConfig, RunReport, StateCounts,
    CONFIG,
};
use crate::message::PnError;
use crate::receiver::Receiver;
use crate::traits::{ProcessListener, ReceiverListener, Token};

/// Runs a process network.
///
/// A `Director` owns the network built from a [`Graph`]: one thread per
/// actor, one bounded [`Receiver`] per connection and a directing thread that
/// resolves deadlocks and applies mutations requested by actors.
///
/// Handles are cheap to clone and may be shared with other threads, for
/// example to pause or terminate a running network while another thread
/// waits for it.
///
/// # Examples
///
/// ```rust,no_run
/// use procnet::prelude::*;
///
/// let mut graph = Graph::<u32>::new();
/// graph
///     .add_actor_with_iterations("source", from_fn(|ctx: &ProcessContext<u32>| {
///         ctx.put("out", ctx.iteration() as u32)?;
///         Ok(Firing::Continue)
///     }), 3)
///     .add_actor_with_iterations("sink", from_fn(|ctx: &ProcessContext<u32>| {
///         let _ = ctx.get("in")?;
///         Ok(Firing::Continue)
///     }), 3)
///     .connect(("source", "out"), ("sink", "in"));
///
/// let report = Director::new().run(graph)?;
/// assert_eq!(report.processes.len(), 2);
/// # Ok::<(), PnError>(())
/// ```
pub struct Director<T: Token> {
    pub(crate) inner: Arc<DirectorInner<T>>,
}

impl<T: Token> Clone for Director<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Token> Default for Director<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Token> fmt::Debug for Director<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Director")
            .field("initialized", &self.inner.is_initialized())
            .field("counts", &self.inner.scheduler.counts())
            .finish()
    }
}

impl<T: Token> Director<T> {
    /// Creates a director using the process-wide [`CONFIG`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CONFIG.clone())
    }

    /// Creates a director with an explicit configuration.
    #[must_use]
    pub fn with_config(config: PnConfig) -> Self {
        Self {
            inner: Arc::new(DirectorInner::new(config)),
        }
    }

    /// The configuration this director runs with.
    pub fn config(&self) -> &PnConfig {
        &self.inner.config
    }

    /// Builds the network described by `graph` and starts every process.
    ///
    /// Returns as soon as the processes are running; use [`wait`](Self::wait)
    /// to block until the network finishes.
    ///
    /// # Errors
    ///
    /// - [`PnError::InvalidGraph`] if the graph names unknown actors or
    ///   repeats an actor name
    /// - [`PnError::InvalidState`] if this director was already initialized
    #[instrument(skip_all)]
    pub fn initialize(&self, graph: Graph<T>) -> Result<(), PnError> {
        self.inner.initialize(graph.into_mutation())
    }

    /// Blocks until the network finishes and returns its outcome.
    ///
    /// The network finishes when every process has finished, when a deadlock
    /// cannot be resolved, when an actor fails under
    /// [`FailurePolicy::FailFast`](crate::prelude::FailurePolicy::FailFast),
    /// or after [`terminate_all`](Self::terminate_all). Calling `wait` again
    /// returns the same outcome.
    ///
    /// # Errors
    ///
    /// - [`PnError::Deadlock`] for a deadlock that growing capacities cannot
    ///   resolve
    /// - [`PnError::ActorFailure`] for the first failure under fail-fast
    /// - [`PnError::InvalidState`] if the director was never initialized or
    ///   when called from one of its own processes
    pub fn wait(&self) -> Result<RunReport, PnError> {
        self.inner.wait()
    }

    /// Initializes, waits and wraps up in one call.
    ///
    /// # Errors
    ///
    /// Any error of [`initialize`](Self::initialize) or [`wait`](Self::wait).
    pub fn run(&self, graph: Graph<T>) -> Result<RunReport, PnError> {
        self.initialize(graph)?;
        let outcome = self.wait();
        self.wrapup();
        outcome
    }

    /// Releases every receiver and forgets the topology. A network that is
    /// still running is terminated first.
    pub fn wrapup(&self) {
        if !self.inner.is_initialized() {
            return;
        }
        if !self.inner.has_outcome() {
            self.inner.terminate();
            let _ = self.inner.wait();
        }
        self.inner.release();
        debug!("director wrapped up");
    }

    /// Pauses the whole network.
    ///
    /// Returns once every process is paused, finished or waiting for a
    /// mutation. Tokens stay where they are. Pausing is the prerequisite for
    /// [`apply_mutation`](Self::apply_mutation).
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidState`] if the network is not running, is already
    /// paused, is terminating, or if called from one of its own processes.
    #[instrument(skip_all)]
    pub fn pause_all(&self) -> Result<(), PnError> {
        self.ensure_external("pause")?;
        let _barrier = self.inner.barrier();
        let result = self.inner.pause(PauseOwner::Caller);
        if let Err(err) = &result {
            if !matches!(err, PnError::InvalidState(_)) {
                let _ = self.inner.resume(PauseOwner::Caller);
            }
        } else {
            info!("network paused");
        }
        result.map_err(|err| match err {
            PnError::TerminationRequested => {
                PnError::InvalidState("the network is terminating".into())
            }
            other => other,
        })
    }

    /// Resumes a network paused with [`pause_all`](Self::pause_all) and
    /// starts any actors added while it was paused.
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidState`] if the network is not paused by a caller.
    #[instrument(skip_all)]
    pub fn resume_all(&self) -> Result<(), PnError> {
        self.ensure_external("resume")?;
        let _barrier = self.inner.barrier();
        self.inner.resume(PauseOwner::Caller)?;
        info!("network resumed");
        Ok(())
    }

    /// Applies `mutation` to a paused network.
    ///
    /// Operations are validated together first; nothing changes if any of
    /// them is invalid. Removed actors are stopped before this returns. Added
    /// actors start on [`resume_all`](Self::resume_all).
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidMutation`] if the network is not fully paused or the
    /// mutation is invalid.
    #[instrument(skip_all, fields(ops = mutation.len()))]
    pub fn apply_mutation(&self, mutation: Mutation<T>) -> Result<(), PnError> {
        self.ensure_external("mutate")?;
        let _barrier = self.inner.barrier();
        if !self.inner.scheduler.fully_paused() {
            return Err(PnError::InvalidMutation(
                "mutations require a paused network".into(),
            ));
        }
        self.inner.apply(mutation)
    }

    /// Stops every process and waits until all of them have finished.
    ///
    /// Blocked processes are released with
    /// [`PnError::TerminationRequested`] and finish abruptly. Safe to call
    /// from a process, in which case the caller's own thread is not waited
    /// for.
    #[instrument(skip_all)]
    pub fn terminate_all(&self) {
        if !self.inner.is_initialized() {
            return;
        }
        info!("terminating network");
        self.inner.terminate();
    }

    /// Registers a listener for process state changes.
    pub fn add_process_listener(&self, listener: impl ProcessListener + 'static) -> ListenerId {
        self.inner.listeners.add_process(Arc::new(listener))
    }

    /// Removes a process listener. Returns whether it was registered.
    pub fn remove_process_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove_process(id)
    }

    /// Registers a listener for receiver actions.
    pub fn add_receiver_listener(&self, listener: impl ReceiverListener + 'static) -> ListenerId {
        self.inner.listeners.add_receiver(Arc::new(listener))
    }

    /// Removes a receiver listener. Returns whether it was registered.
    pub fn remove_receiver_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove_receiver(id)
    }

    /// Current state of the most recently added actor called `name`.
    pub fn process_state(&self, name: &str) -> Option<ProcessState> {
        self.inner.scheduler.state_of(name)
    }

    /// Number of processes in each state.
    pub fn counts(&self) -> StateCounts {
        self.inner.scheduler.counts()
    }

    /// Current model time of timed actors.
    pub fn model_time(&self) -> f64 {
        self.inner.scheduler.model_time()
    }

    /// The receiver feeding channel `channel` of `actor.port`, if connected.
    pub fn receiver(&self, actor: &str, port: &str, channel: usize) -> Option<Arc<Receiver<T>>> {
        self.inner.receiver_at(actor, port, channel)
    }

    /// Number of receivers in the network.
    pub fn receiver_count(&self) -> usize {
        self.inner.receiver_count()
    }

    fn ensure_external(&self, operation: &str) -> Result<(), PnError> {
        if current_process().is_some() {
            return Err(PnError::InvalidState(format!(
                "a process cannot {operation} its own network; request a mutation instead"
            )));
        }
        if !self.inner.is_initialized() {
            return Err(PnError::InvalidState(
                "the director has not been initialized".into(),
            ));
        }
        Ok(())
    }
}
