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

use crate::actor::BlockCause;
use crate::receiver::Capacity;

/// Errors surfaced by receivers, process contexts and the director.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PnError {
    /// The receiver (or the whole network) was told to finish while the
    /// caller was inside, or about to enter, a blocking operation.
    #[error("termination requested")]
    TerminationRequested,
    /// Every live process is blocked and no capacity growth can help.
    #[error("deadlock: {0}")]
    Deadlock(DeadlockReport),
    /// An actor failed and the failure policy halted the network.
    #[error(transparent)]
    ActorFailure(ActorFailure),
    /// A topology change or capacity change was refused; nothing was applied.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
    /// The destination actor's filter refused the token.
    #[error("token rejected by {receiver}")]
    TokenRejected {
        /// Description of the refusing receiver.
        receiver: String,
    },
    /// The actor has no connection on the named port.
    #[error("actor `{actor}` has no connected port `{port}`")]
    UnknownPort {
        /// Actor name.
        actor: String,
        /// Port name.
        port: String,
    },
    /// The graph handed to the director is malformed.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    /// The director was driven out of order.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl PnError {
    /// Whether an actor-level error is, at its root, a termination request.
    ///
    /// Actors propagate receiver errors with `?`, so a `TerminationRequested`
    /// usually arrives wrapped in an `anyhow::Error`.
    #[must_use]
    pub fn is_termination(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<PnError>(),
                Some(PnError::TerminationRequested)
            )
        })
    }
}

/// An actor that finished with an exception.
#[derive(Debug, Clone, thiserror::Error)]
#[error("actor `{actor}` failed: {cause:#}")]
pub struct ActorFailure {
    /// Name of the failed actor.
    pub actor: String,
    /// The error it returned, or a description of its panic.
    pub cause: Arc<anyhow::Error>,
}

/// What made a deadlock unrecoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlockKind {
    /// Every live process waits to read.
    Read,
    /// Writers are blocked but growing the smallest full receiver would pass
    /// the configured ceiling.
    CapacityCeiling {
        /// Description of the receiver that could not grow.
        receiver: String,
        /// Its current capacity.
        capacity: usize,
        /// The capacity growth asked for.
        requested: usize,
        /// The configured ceiling.
        maximum: usize,
    },
}

/// One blocked process at the moment a real deadlock was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedProcess {
    /// Actor name.
    pub actor: String,
    /// Why it was blocked.
    pub cause: BlockCause,
    /// Description of the receiver it was blocked on, if any.
    pub receiver: Option<String>,
}

/// Snapshot of the network when a real deadlock was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    /// What made the deadlock real.
    pub kind: DeadlockKind,
    /// Every blocked process, ordered by actor id.
    pub blocked: Vec<BlockedProcess>,
}

impl fmt::Display for DeadlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("all processes blocked reading"),
            Self::CapacityCeiling {
                receiver,
                capacity,
                requested,
                maximum,
            } => write!(
                f,
                "{receiver} cannot grow from {} to {} (maximum {maximum})",
                Capacity::Bounded(*capacity),
                requested
            ),
        }
    }
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for process in &self.blocked {
            write!(f, "; {} {}", process.actor, process.cause)?;
            if let Some(receiver) = &process.receiver {
                write!(f, " on {receiver}")?;
            }
        }
        Ok(())
    }
}
