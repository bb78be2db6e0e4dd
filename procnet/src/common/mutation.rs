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

use crate::common::PortRef;
use crate::receiver::Capacity;
use crate::traits::{Actor, Token};

/// One structural change to a network.
pub enum MutationOp<T: Token> {
    /// Adds an actor and its (not yet started) process.
    AddActor {
        /// Unique actor name.
        name: String,
        /// The actor.
        actor: Box<dyn Actor<T>>,
        /// Finish properly after this many firings.
        iterations: Option<u64>,
    },
    /// Terminates and removes an actor together with every connection
    /// touching it.
    RemoveActor(String),
    /// Creates a receiver feeding the next free channel of `to`.
    Connect {
        /// Producing port.
        from: PortRef,
        /// Consuming port.
        to: PortRef,
        /// Receiver capacity; the configured initial capacity when `None`.
        capacity: Option<Capacity>,
    },
    /// Removes the oldest connection from `from` to `to` and finishes its
    /// receiver. Later channels of `to` shift down by one.
    Disconnect {
        /// Producing port.
        from: PortRef,
        /// Consuming port.
        to: PortRef,
    },
    /// Changes the capacity of channel `channel` of `to`.
    SetCapacity {
        /// Consuming port.
        to: PortRef,
        /// Channel index on that port.
        channel: usize,
        /// New capacity.
        capacity: Capacity,
    },
}

impl<T: Token> fmt::Debug for MutationOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddActor {
                name, iterations, ..
            } => f
                .debug_struct("AddActor")
                .field("name", name)
                .field("iterations", iterations)
                .finish_non_exhaustive(),
            Self::RemoveActor(name) => f.debug_tuple("RemoveActor").field(name).finish(),
            Self::Connect { from, to, capacity } => f
                .debug_struct("Connect")
                .field("from", from)
                .field("to", to)
                .field("capacity", capacity)
                .finish(),
            Self::Disconnect { from, to } => f
                .debug_struct("Disconnect")
                .field("from", from)
                .field("to", to)
                .finish(),
            Self::SetCapacity {
                to,
                channel,
                capacity,
            } => f
                .debug_struct("SetCapacity")
                .field("to", to)
                .field("channel", channel)
                .field("capacity", capacity)
                .finish(),
        }
    }
}

/// An ordered batch of [`MutationOp`]s applied atomically: either every
/// operation is valid and all are applied, or none is.
#[derive(Debug)]
pub struct Mutation<T: Token> {
    pub(crate) ops: Vec<MutationOp<T>>,
}

impl<T: Token> Default for Mutation<T> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<T: Token> Mutation<T> {
    /// An empty mutation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an arbitrary operation.
    pub fn push(&mut self, op: MutationOp<T>) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Adds an actor that fires until it is done.
    pub fn add_actor(&mut self, name: impl Into<String>, actor: impl Actor<T>) -> &mut Self {
        self.push(MutationOp::AddActor {
            name: name.into(),
            actor: Box::new(actor),
            iterations: None,
        })
    }

    /// Adds an actor that finishes properly after `iterations` firings.
    pub fn add_actor_with_iterations(
        &mut self,
        name: impl Into<String>,
        actor: impl Actor<T>,
        iterations: u64,
    ) -> &mut Self {
        self.push(MutationOp::AddActor {
            name: name.into(),
            actor: Box::new(actor),
            iterations: Some(iterations),
        })
    }

    /// Removes an actor and its connections.
    pub fn remove_actor(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(MutationOp::RemoveActor(name.into()))
    }

    /// Connects two ports through a receiver of the configured initial capacity.
    pub fn connect(&mut self, from: impl Into<PortRef>, to: impl Into<PortRef>) -> &mut Self {
        self.push(MutationOp::Connect {
            from: from.into(),
            to: to.into(),
            capacity: None,
        })
    }

    /// Connects two ports through a receiver of the given capacity.
    pub fn connect_with_capacity(
        &mut self,
        from: impl Into<PortRef>,
        to: impl Into<PortRef>,
        capacity: impl Into<Capacity>,
    ) -> &mut Self {
        self.push(MutationOp::Connect {
            from: from.into(),
            to: to.into(),
            capacity: Some(capacity.into()),
        })
    }

    /// Removes the oldest connection between two ports.
    pub fn disconnect(&mut self, from: impl Into<PortRef>, to: impl Into<PortRef>) -> &mut Self {
        self.push(MutationOp::Disconnect {
            from: from.into(),
            to: to.into(),
        })
    }

    /// Changes the capacity of one input channel.
    pub fn set_capacity(
        &mut self,
        to: impl Into<PortRef>,
        channel: usize,
        capacity: impl Into<Capacity>,
    ) -> &mut Self {
        self.push(MutationOp::SetCapacity {
            to: to.into(),
            channel,
            capacity: capacity.into(),
        })
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The initial network handed to
/// [`Director::initialize`](crate::prelude::Director::initialize): actors and
/// the connections between them.
#[derive(Debug)]
pub struct Graph<T: Token> {
    mutation: Mutation<T>,
}

impl<T: Token> Default for Graph<T> {
    fn default() -> Self {
        Self {
            mutation: Mutation::new(),
        }
    }
}

impl<T: Token> Graph<T> {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an actor that fires until it is done.
    pub fn add_actor(&mut self, name: impl Into<String>, actor: impl Actor<T>) -> &mut Self {
        self.mutation.add_actor(name, actor);
        self
    }

    /// Adds an actor that finishes properly after `iterations` firings.
    pub fn add_actor_with_iterations(
        &mut self,
        name: impl Into<String>,
        actor: impl Actor<T>,
        iterations: u64,
    ) -> &mut Self {
        self.mutation
            .add_actor_with_iterations(name, actor, iterations);
        self
    }

    /// Connects two ports through a receiver of the configured initial capacity.
    ///
    /// Connecting several producers to one input port gives it one channel
    /// per connection, numbered in connection order.
    pub fn connect(&mut self, from: impl Into<PortRef>, to: impl Into<PortRef>) -> &mut Self {
        self.mutation.connect(from, to);
        self
    }

    /// Connects two ports through a receiver of the given capacity.
    pub fn connect_with_capacity(
        &mut self,
        from: impl Into<PortRef>,
        to: impl Into<PortRef>,
        capacity: impl Into<Capacity>,
    ) -> &mut Self {
        self.mutation.connect_with_capacity(from, to, capacity);
        self
    }

    pub(crate) fn into_mutation(self) -> Mutation<T> {
        self.mutation
    }
}
