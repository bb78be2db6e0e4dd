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

//! Process states reported by every process thread.
//!
//! The vocabulary here is shared with external tooling, so the `Display`
//! strings are fixed:
//!
//! - states: `RUNNING`, `BLOCKED`, `PAUSED`, `FINISHED`
//! - blocking causes: `BLOCKED_ON_DELAY`, `BLOCKED_ON_MUTATION`,
//!   `BLOCKED_ON_READ`, `BLOCKED_ON_WRITE`
//! - finishing causes: `FINISHED_ABRUPTLY`, `FINISHED_PROPERLY`,
//!   `FINISHED_WITH_EXCEPTION`

use std::fmt;

/// Why a process is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCause {
    /// Waiting for the director's logical time to reach a requested instant.
    OnDelay,
    /// Waiting for a topology change it requested to be applied.
    OnMutation,
    /// Waiting on an empty receiver.
    OnRead,
    /// Waiting on a full receiver.
    OnWrite,
}

/// Why a process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishCause {
    /// Stopped by a terminate request while still live.
    Abruptly,
    /// The actor's firing loop ended on its own.
    Properly,
    /// The actor returned an error or panicked.
    WithException,
}

/// The state of one process at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Executing actor code or engine code that will not suspend.
    Running,
    /// Suspended inside a receiver, a delay or a mutation request.
    Blocked(BlockCause),
    /// Suspended by a pause request.
    Paused,
    /// The thread has left its firing loop; terminal.
    Finished(FinishCause),
}

impl BlockCause {
    /// The external code for this cause.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OnDelay => "BLOCKED_ON_DELAY",
            Self::OnMutation => "BLOCKED_ON_MUTATION",
            Self::OnRead => "BLOCKED_ON_READ",
            Self::OnWrite => "BLOCKED_ON_WRITE",
        }
    }

    /// Whether the cause is a receiver operation, the only kind that takes
    /// part in deadlock classification.
    #[must_use]
    pub const fn is_channel(&self) -> bool {
        matches!(self, Self::OnRead | Self::OnWrite)
    }
}

impl FinishCause {
    /// The external code for this cause.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Abruptly => "FINISHED_ABRUPTLY",
            Self::Properly => "FINISHED_PROPERLY",
            Self::WithException => "FINISHED_WITH_EXCEPTION",
        }
    }
}

impl ProcessState {
    /// The external code for the state itself, without its cause.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Blocked(_) => "BLOCKED",
            Self::Paused => "PAUSED",
            Self::Finished(_) => "FINISHED",
        }
    }

    /// The cause code for `BLOCKED` and `FINISHED`, `None` otherwise.
    #[must_use]
    pub const fn cause_code(&self) -> Option<&'static str> {
        match self {
            Self::Blocked(cause) => Some(cause.code()),
            Self::Finished(cause) => Some(cause.code()),
            Self::Running | Self::Paused => None,
        }
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

impl fmt::Display for BlockCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Display for FinishCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause_code() {
            Some(cause) => write!(f, "{} ({cause})", self.code()),
            None => f.write_str(self.code()),
        }
    }
}
