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
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of an actor (and of the process executing it) within one director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

/// Stable identity of a receiver within one director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(pub(crate) u64);

/// Handle returned when a listener is registered; used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver#{}", self.0)
    }
}

/// Names one port of one actor, e.g. `("ramp", "output")`.
///
/// Ports are not declared up front: a port exists as soon as a connection
/// references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRef {
    /// Name of the actor owning the port.
    pub actor: String,
    /// Name of the port on that actor.
    pub port: String,
}

impl PortRef {
    /// Creates a reference to `port` on `actor`.
    pub fn new(actor: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            port: port.into(),
        }
    }
}

impl<A: Into<String>, P: Into<String>> From<(A, P)> for PortRef {
    fn from((actor, port): (A, P)) -> Self {
        Self::new(actor, port)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.actor, self.port)
    }
}

/// Monotonic id source shared by everything a director hands out.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator(AtomicU64);

impl IdGenerator {
    pub(crate) fn next_actor(&self) -> ActorId {
        ActorId(self.bump())
    }

    pub(crate) fn next_receiver(&self) -> ReceiverId {
        ReceiverId(self.bump())
    }

    pub(crate) fn next_listener(&self) -> ListenerId {
        ListenerId(self.bump())
    }

    fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Id source for receivers built outside of a director.
pub(crate) static STANDALONE_IDS: IdGenerator = IdGenerator(AtomicU64::new(0));
