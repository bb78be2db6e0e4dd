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

#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! Procnet
//!
//! A process-network execution engine. Every actor of a network runs on its
//! own thread and talks to other actors only through bounded FIFO
//! [`Receiver`](receiver::Receiver)s. A [`Director`](prelude::Director) builds
//! the network from a [`Graph`](prelude::Graph), detects deadlocks and
//! resolves the artificial ones by growing the smallest full receiver,
//! pauses the network to apply topology mutations safely, and reports every
//! process state change and receiver action to registered listeners.
//!
//! Configuration is read once from `procnet/config.toml` under the XDG
//! config directories; see [`PnConfig`](prelude::PnConfig).

/// Directors, configuration, graphs and run reports.
pub(crate) mod common;

pub(crate) mod actor;
pub(crate) mod message;
pub mod receiver;
/// Actor, token and listener traits.
pub(crate) mod traits;

/// Prelude module for convenient imports.
///
/// Re-exports everything needed to build, run, observe and mutate a network.
pub mod prelude {
    pub use crate::actor::{
        BlockCause, FailurePolicy, FinishCause, ProcessContext, ProcessState,
    };
    pub use crate::common::{
        ActorId, BehaviorConfig, Director, Graph, ListenerId, Mutation, MutationOp, PnConfig,
        PortRef, ProcessSummary, QueueConfig, ReceiverId, RunReport, StateCounts, CONFIG,
    };
    pub use crate::message::{
        ActorFailure, BlockedProcess, DeadlockKind, DeadlockReport, PnError, ProcessEvent,
        ReceiverAction, ReceiverActionEvent,
    };
    pub use crate::receiver::{Capacity, CapacityGrowth, Receiver};
    pub use crate::traits::{
        from_fn, Actor, Firing, FnActor, ProcessListener, ReceiverListener, Token, TokenFilter,
    };
}
