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

//! What the network does when one of its actors fails.
//!
//! - [`FailurePolicy::FailFast`]: the first failure terminates every process
//!   and the run ends with [`PnError::ActorFailure`](crate::prelude::PnError::ActorFailure)
//! - [`FailurePolicy::BestEffort`]: the failed process finishes on its own,
//!   siblings keep running and every failure is listed in the run report

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reaction of the director to a process finishing with an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Terminate the whole network on the first failure.
    #[default]
    FailFast,
    /// Let the remaining processes continue; collect failures in the report.
    BestEffort,
}

impl FailurePolicy {
    /// Whether a failure should halt the network.
    #[must_use]
    pub const fn halts_on_failure(&self) -> bool {
        matches!(self, Self::FailFast)
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail-fast"),
            Self::BestEffort => f.write_str("best-effort"),
        }
    }
}
