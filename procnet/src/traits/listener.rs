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

use crate::message::{ProcessEvent, ReceiverActionEvent};

/// Observer of process state changes.
///
/// Listeners are called synchronously, in registration order, on whichever
/// thread caused the change, after every engine lock has been released. An
/// error or panic is logged and does not reach the engine or other listeners.
///
/// Closures taking `&ProcessEvent` implement this trait.
pub trait ProcessListener: Send + Sync {
    /// Called once per state change.
    fn process_event(&self, event: &ProcessEvent) -> anyhow::Result<()>;
}

/// Observer of receiver actions.
///
/// Same delivery guarantees as [`ProcessListener`]. Closures taking
/// `&ReceiverActionEvent` implement this trait.
///
/// [`ReceiverAction::CapacityIncreased`](crate::message::ReceiverAction::CapacityIncreased)
/// marks any capacity change, including an explicit decrease through
/// `set_capacity`; the event carries the new capacity.
pub trait ReceiverListener: Send + Sync {
    /// Called once per receiver action.
    fn receiver_event(&self, event: &ReceiverActionEvent) -> anyhow::Result<()>;
}

impl<F> ProcessListener for F
where
    F: Fn(&ProcessEvent) + Send + Sync,
{
    fn process_event(&self, event: &ProcessEvent) -> anyhow::Result<()> {
        self(event);
        Ok(())
    }
}

impl<F> ReceiverListener for F
where
    F: Fn(&ReceiverActionEvent) + Send + Sync,
{
    fn receiver_event(&self, event: &ReceiverActionEvent) -> anyhow::Result<()> {
        self(event);
        Ok(())
    }
}
