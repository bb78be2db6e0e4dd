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

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::common::{ActorId, MutationOp, PortRef, ReceiverId};
use crate::message::PnError;
use crate::receiver::Capacity;
use crate::traits::{Token, TokenFilter};

/// One receiver between two ports.
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    pub(crate) from: PortRef,
    pub(crate) to: PortRef,
    pub(crate) from_actor: ActorId,
    pub(crate) to_actor: ActorId,
    pub(crate) receiver: ReceiverId,
}

/// What a validated mutation will tear down.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub(crate) removed_actors: Vec<ActorId>,
    pub(crate) removed_receivers: Vec<ReceiverId>,
}

/// Actors and connections of a running network.
///
/// Lookups by port go through actor ids, so a name reused by a later
/// mutation never resolves to the ports of the actor it replaced.
pub(crate) struct Topology<T> {
    actors: BTreeMap<String, ActorId>,
    filters: HashMap<ActorId, Arc<dyn TokenFilter<T>>>,
    connections: Vec<Connection>,
}

impl<T> Default for Topology<T> {
    fn default() -> Self {
        Self {
            actors: BTreeMap::new(),
            filters: HashMap::new(),
            connections: Vec::new(),
        }
    }
}

impl<T: Token> Topology<T> {
    pub(crate) fn actor(&self, name: &str) -> Option<ActorId> {
        self.actors.get(name).copied()
    }

    pub(crate) fn name_of(&self, actor: ActorId) -> Option<&str> {
        self.actors
            .iter()
            .find(|(_, id)| **id == actor)
            .map(|(name, _)| name.as_str())
    }

    pub(crate) fn add_actor(
        &mut self,
        name: String,
        actor: ActorId,
        filter: Option<Arc<dyn TokenFilter<T>>>,
    ) {
        if let Some(filter) = filter {
            self.filters.insert(actor, filter);
        }
        self.actors.insert(name, actor);
    }

    /// Removes an actor and returns the connections that touched it.
    pub(crate) fn remove_actor(&mut self, name: &str) -> Option<(ActorId, Vec<Connection>)> {
        let actor = self.actors.remove(name)?;
        self.filters.remove(&actor);
        let (removed, kept) = self
            .connections
            .drain(..)
            .partition(|c| c.from_actor == actor || c.to_actor == actor);
        self.connections = kept;
        Some((actor, removed))
    }

    pub(crate) fn filter_for(&self, actor: ActorId) -> Option<Arc<dyn TokenFilter<T>>> {
        self.filters.get(&actor).cloned()
    }

    pub(crate) fn connect(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    pub(crate) fn disconnect(&mut self, from: &PortRef, to: &PortRef) -> Option<Connection> {
        let position = self
            .connections
            .iter()
            .position(|c| c.from == *from && c.to == *to)?;
        Some(self.connections.remove(position))
    }

    fn inputs<'a>(&'a self, actor: ActorId, port: &'a str) -> impl Iterator<Item = &'a Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to_actor == actor && c.to.port == port)
    }

    pub(crate) fn input(&self, actor: ActorId, port: &str, channel: usize) -> Option<ReceiverId> {
        self.inputs(actor, port).nth(channel).map(|c| c.receiver)
    }

    pub(crate) fn input_width(&self, actor: ActorId, port: &str) -> usize {
        self.inputs(actor, port).count()
    }

    pub(crate) fn outputs(&self, actor: ActorId, port: &str) -> Vec<ReceiverId> {
        self.connections
            .iter()
            .filter(|c| c.from_actor == actor && c.from.port == port)
            .map(|c| c.receiver)
            .collect()
    }

    pub(crate) fn receivers(&self) -> impl Iterator<Item = ReceiverId> + '_ {
        self.connections.iter().map(|c| c.receiver)
    }

    /// Checks `ops` in order against a scratch copy of the topology.
    ///
    /// `queued` reports how many tokens an existing receiver holds, so that a
    /// capacity decrease below occupancy is refused up front.
    pub(crate) fn validate(
        &self,
        ops: &[MutationOp<T>],
        queued: impl Fn(ReceiverId) -> usize,
    ) -> Result<Plan, PnError> {
        let invalid = |message: String| Err(PnError::InvalidMutation(message));
        let mut actors: BTreeMap<String, Option<ActorId>> = self
            .actors
            .iter()
            .map(|(name, id)| (name.clone(), Some(*id)))
            .collect();
        let mut connections: Vec<(PortRef, PortRef, Option<ReceiverId>)> = self
            .connections
            .iter()
            .map(|c| (c.from.clone(), c.to.clone(), Some(c.receiver)))
            .collect();
        let mut plan = Plan::default();

        for op in ops {
            match op {
                MutationOp::AddActor { name, .. } => {
                    if name.is_empty() {
                        return invalid("actor names must not be empty".into());
                    }
                    if actors.contains_key(name) {
                        return invalid(format!("actor `{name}` already exists"));
                    }
                    actors.insert(name.clone(), None);
                }
                MutationOp::RemoveActor(name) => {
                    let Some(existing) = actors.remove(name) else {
                        return invalid(format!("cannot remove unknown actor `{name}`"));
                    };
                    plan.removed_actors.extend(existing);
                    connections.retain(|(from, to, receiver)| {
                        let touches = from.actor == *name || to.actor == *name;
                        if touches {
                            plan.removed_receivers.extend(*receiver);
                        }
                        !touches
                    });
                }
                MutationOp::Connect { from, to, .. } => {
                    for end in [from, to] {
                        if !actors.contains_key(&end.actor) {
                            return invalid(format!(
                                "cannot connect {from} to {to}: unknown actor `{}`",
                                end.actor
                            ));
                        }
                        if end.port.is_empty() {
                            return invalid(format!(
                                "cannot connect {from} to {to}: empty port name"
                            ));
                        }
                    }
                    connections.push((from.clone(), to.clone(), None));
                }
                MutationOp::Disconnect { from, to } => {
                    let Some(position) = connections
                        .iter()
                        .position(|(f, t, _)| f == from && t == to)
                    else {
                        return invalid(format!("no connection from {from} to {to}"));
                    };
                    let (_, _, receiver) = connections.remove(position);
                    plan.removed_receivers.extend(receiver);
                }
                MutationOp::SetCapacity {
                    to,
                    channel,
                    capacity,
                } => {
                    let Some((_, _, receiver)) =
                        connections.iter().filter(|(_, t, _)| t == to).nth(*channel)
                    else {
                        return invalid(format!("{to} has no channel {channel}"));
                    };
                    if let Some(receiver) = receiver {
                        let len = queued(*receiver);
                        if !capacity.can_hold(len) {
                            return invalid(format!(
                                "{to}[{channel}]: capacity {capacity} is below the {len} queued tokens"
                            ));
                        }
                    }
                }
            }
        }
        Ok(plan)
    }
}

/// Human readable name of an input channel, e.g. `sink.input[0]`.
pub(crate) fn channel_description(to: &PortRef, channel: usize) -> Arc<str> {
    Arc::from(format!("{to}[{channel}]"))
}

/// Capacity a new connection gets.
pub(crate) fn connection_capacity(declared: Option<Capacity>, initial: Capacity) -> Capacity {
    declared.unwrap_or(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ProcessContext;
    use crate::common::Mutation;
    use crate::traits::Firing;

    fn idle(_ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        Ok(Firing::Done)
    }

    fn topology() -> Topology<u32> {
        let mut topology = Topology::default();
        topology.add_actor("a".into(), ActorId(1), None);
        topology.add_actor("b".into(), ActorId(2), None);
        topology.connect(Connection {
            from: PortRef::new("a", "out"),
            to: PortRef::new("b", "in"),
            from_actor: ActorId(1),
            to_actor: ActorId(2),
            receiver: ReceiverId(10),
        });
        topology
    }

    #[test]
    fn removing_an_actor_plans_its_receivers() {
        let mut mutation = Mutation::<u32>::new();
        mutation.remove_actor("b");
        let plan = topology().validate(&mutation.ops, |_| 0).unwrap();
        assert_eq!(plan.removed_actors, vec![ActorId(2)]);
        assert_eq!(plan.removed_receivers, vec![ReceiverId(10)]);
    }

    #[test]
    fn operations_see_earlier_operations() {
        let mut mutation = Mutation::<u32>::new();
        mutation
            .add_actor("c", crate::traits::from_fn(idle))
            .connect(("b", "out"), ("c", "in"))
            .set_capacity(("c", "in"), 0, Capacity::Bounded(4));
        assert!(topology().validate(&mutation.ops, |_| 0).is_ok());
    }

    #[test]
    fn invalid_operation_rejects_whole_batch() {
        let mut mutation = Mutation::<u32>::new();
        mutation
            .add_actor("c", crate::traits::from_fn(idle))
            .connect(("c", "out"), ("missing", "in"));
        assert!(matches!(
            topology().validate(&mutation.ops, |_| 0),
            Err(PnError::InvalidMutation(_))
        ));
    }

    #[test]
    fn capacity_decrease_below_occupancy_is_refused() {
        let mut mutation = Mutation::<u32>::new();
        mutation.set_capacity(("b", "in"), 0, Capacity::Bounded(1));
        assert!(topology().validate(&mutation.ops, |_| 2).is_err());
        assert!(topology().validate(&mutation.ops, |_| 1).is_ok());
    }

    #[test]
    fn channels_follow_connection_order() {
        let mut topology = topology();
        topology.connect(Connection {
            from: PortRef::new("a", "out2"),
            to: PortRef::new("b", "in"),
            from_actor: ActorId(1),
            to_actor: ActorId(2),
            receiver: ReceiverId(11),
        });
        assert_eq!(topology.input(ActorId(2), "in", 0), Some(ReceiverId(10)));
        assert_eq!(topology.input(ActorId(2), "in", 1), Some(ReceiverId(11)));
        assert_eq!(topology.input_width(ActorId(2), "in"), 2);
        assert_eq!(topology.outputs(ActorId(1), "out"), vec![ReceiverId(10)]);
        let removed = topology.disconnect(&PortRef::new("a", "out"), &PortRef::new("b", "in"));
        assert!(removed.is_some());
        assert_eq!(topology.input(ActorId(2), "in", 0), Some(ReceiverId(11)));
    }
}
