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

use crate::common::{ActorId, ReceiverId};
use crate::receiver::Capacity;

/// Something that happened on a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverAction {
    /// The capacity changed to the value carried by the event. Explicit
    /// decreases are reported this way too; compare with the previous
    /// capacity to tell growth from shrinking.
    CapacityIncreased,
    /// The queue was emptied.
    Clear,
    /// The receiver was told to finish.
    FinishRequested,
    /// A token was taken.
    Get,
    /// The receiver was told to pause.
    PauseRequested,
    /// A token was queued.
    Put,
    /// A reader started waiting on an empty queue.
    ReadBlocked,
    /// A waiting reader was released.
    ReadUnblocked,
    /// The receiver was told to resume.
    ResumeRequested,
    /// A writer started waiting on a full queue.
    WriteBlocked,
    /// A waiting writer was released.
    WriteUnblocked,
}

impl ReceiverAction {
    /// The external code for this action.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CapacityIncreased => "capacity-increased",
            Self::Clear => "clear",
            Self::FinishRequested => "finish-requested",
            Self::Get => "get",
            Self::PauseRequested => "pause-requested",
            Self::Put => "put",
            Self::ReadBlocked => "read-blocked",
            Self::ReadUnblocked => "read-unblocked",
            Self::ResumeRequested => "resume-requested",
            Self::WriteBlocked => "write-blocked",
            Self::WriteUnblocked => "write-unblocked",
        }
    }
}

impl fmt::Display for ReceiverAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A receiver action, as seen by the director and by receiver listeners.
#[derive(Debug, Clone)]
pub struct ReceiverActionEvent {
    /// The receiver the action happened on.
    pub receiver: ReceiverId,
    /// Human readable location, e.g. `sink.input[0]`.
    pub description: Arc<str>,
    /// Capacity at the time of the action.
    pub capacity: Capacity,
    /// What happened.
    pub action: ReceiverAction,
    /// The process that blocked or was released, for the four blocking
    /// actions and for `get`/`put` performed by a process thread.
    pub actor: Option<ActorId>,
}

impl fmt::Display for ReceiverActionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (capacity {})",
            self.description, self.action, self.capacity
        )?;
        if let Some(actor) = self.actor {
            write!(f, " by {actor}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes_are_kebab_case() {
        let all = [
            (ReceiverAction::CapacityIncreased, "capacity-increased"),
            (ReceiverAction::Clear, "clear"),
            (ReceiverAction::FinishRequested, "finish-requested"),
            (ReceiverAction::Get, "get"),
            (ReceiverAction::PauseRequested, "pause-requested"),
            (ReceiverAction::Put, "put"),
            (ReceiverAction::ReadBlocked, "read-blocked"),
            (ReceiverAction::ReadUnblocked, "read-unblocked"),
            (ReceiverAction::ResumeRequested, "resume-requested"),
            (ReceiverAction::WriteBlocked, "write-blocked"),
            (ReceiverAction::WriteUnblocked, "write-unblocked"),
        ];
        for (action, code) in all {
            assert_eq!(action.to_string(), code);
        }
    }
}
