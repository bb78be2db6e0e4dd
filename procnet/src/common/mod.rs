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
pub use config::{BehaviorConfig, PnConfig, QueueConfig, CONFIG};
pub use director::Director;
pub(crate) use director_inner::DirectorInner;
pub(crate) use multicaster::{panic_message, Listeners};
pub use mutation::{Graph, Mutation, MutationOp};
pub(crate) use schedule::{PauseOwner, Scheduler, Verdict};
pub use schedule::{ProcessSummary, RunReport, StateCounts};
pub(crate) use topology::Topology;
pub(crate) use types::{IdGenerator, STANDALONE_IDS};
pub use types::{ActorId, ListenerId, PortRef, ReceiverId};

mod types;

mod config;
mod director;
mod director_inner;
mod multicaster;
mod mutation;
mod schedule;
mod topology;
