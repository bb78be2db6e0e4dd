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
use std::sync::Arc;

use parking_lot::Mutex;
use procnet::prelude::*;

/// Records `(actor, state display)` for every process event.
#[derive(Clone, Default)]
pub struct ProcessLog(Arc<Mutex<Vec<(String, ProcessState)>>>);

impl ProcessLog {
    pub fn attach(&self, director: &Director<u32>) -> ListenerId {
        let log = Arc::clone(&self.0);
        director.add_process_listener(move |event: &ProcessEvent| {
            log.lock().push((event.actor_name.to_string(), event.state));
        })
    }

    pub fn saw(&self, actor: &str, state: ProcessState) -> bool {
        self.0
            .lock()
            .iter()
            .any(|(name, seen)| name == actor && *seen == state)
    }

    pub fn states_of(&self, actor: &str) -> Vec<ProcessState> {
        self.0
            .lock()
            .iter()
            .filter(|(name, _)| name == actor)
            .map(|(_, state)| *state)
            .collect()
    }
}

/// Records every receiver action.
#[derive(Clone, Default)]
pub struct ReceiverLog(Arc<Mutex<Vec<(String, ReceiverAction)>>>);

impl ReceiverLog {
    pub fn attach(&self, director: &Director<u32>) -> ListenerId {
        let log = Arc::clone(&self.0);
        director.add_receiver_listener(move |event: &ReceiverActionEvent| {
            log.lock().push((event.description.to_string(), event.action));
        })
    }

    pub fn count(&self, action: ReceiverAction) -> usize {
        self.0.lock().iter().filter(|(_, seen)| *seen == action).count()
    }
}

/// A listener that always fails.
pub struct Grumpy;

impl ProcessListener for Grumpy {
    fn process_event(&self, _event: &ProcessEvent) -> anyhow::Result<()> {
        anyhow::bail!("not listening")
    }
}

/// A listener that always panics.
pub struct Fragile;

impl ProcessListener for Fragile {
    fn process_event(&self, _event: &ProcessEvent) -> anyhow::Result<()> {
        panic!("listener exploded")
    }
}
