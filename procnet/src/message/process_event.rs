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

use crate::actor::ProcessState;
use crate::common::ActorId;

/// A process changed state.
///
/// Events are immutable and cheap to clone; listeners receive them by
/// reference after every engine lock has been released.
#[derive(Debug, Clone)]
pub struct ProcessEvent {
    /// The actor whose process changed state.
    pub actor: ActorId,
    /// Its name.
    pub actor_name: Arc<str>,
    /// The state entered.
    pub state: ProcessState,
    /// The captured failure, present only for `FINISHED_WITH_EXCEPTION`.
    pub failure: Option<Arc<anyhow::Error>>,
}

impl ProcessEvent {
    pub(crate) fn new(actor: ActorId, actor_name: Arc<str>, state: ProcessState) -> Self {
        Self {
            actor,
            actor_name,
            state,
            failure: None,
        }
    }

    pub(crate) fn with_failure(mut self, failure: Arc<anyhow::Error>) -> Self {
        self.failure = Some(failure);
        self
    }

    /// The cause code of the new state, when it has one.
    #[must_use]
    pub const fn cause_code(&self) -> Option<&'static str> {
        self.state.cause_code()
    }
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.actor_name, self.state)?;
        if let Some(failure) = &self.failure {
            write!(f, ": {failure:#}")?;
        }
        Ok(())
    }
}
