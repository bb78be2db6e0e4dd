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

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::actor::{current_process, FinishCause, ProcessState, ProcessThread};
use crate::common::topology::{channel_description, connection_capacity, Connection, Plan};
use crate::common::{
    panic_message, ActorId, IdGenerator, Listeners, Mutation, MutationOp, PauseOwner, PnConfig,
    ReceiverId, RunReport, Scheduler, Topology, Verdict,
};
use crate::message::{DeadlockKind, DeadlockReport, PnError};
use crate::receiver::{Capacity, Receiver};
use crate::traits::Token;

/// Shared state of one director, owned jointly by the [`Director`] handles,
/// the directing thread and every process thread.
///
/// [`Director`]: crate::prelude::Director
pub(crate) struct DirectorInner<T: Token> {
    pub(crate) config: PnConfig,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) listeners: Arc<Listeners>,
    ids: IdGenerator,
    topology: RwLock<Topology<T>>,
    receivers: DashMap<ReceiverId, Arc<Receiver<T>>>,
    /// Processes created but not started yet.
    pending: Mutex<Vec<ProcessThread<T>>>,
    threads: Mutex<Vec<(ActorId, JoinHandle<()>)>>,
    directing: Mutex<Option<JoinHandle<Result<RunReport, PnError>>>>,
    outcome: Mutex<Option<Result<RunReport, PnError>>>,
    /// Mutations requested by actors, applied by the directing thread.
    requests: Mutex<VecDeque<(u64, Mutation<T>)>>,
    tickets: AtomicU64,
    /// Serializes pause and resume sequences.
    barrier: Mutex<()>,
    initialized: AtomicBool,
}

/// Everything `apply_ops` decided that has to happen outside the topology lock.
struct Applied<T> {
    removed_actors: Vec<ActorId>,
    /// Receivers connected during a pause; they start paused.
    created: Vec<Arc<Receiver<T>>>,
    finished: Vec<Arc<Receiver<T>>>,
    resized: Vec<(Arc<Receiver<T>>, Capacity)>,
}

impl<T: Token> DirectorInner<T> {
    pub(crate) fn new(config: PnConfig) -> Self {
        let listeners = Arc::new(Listeners::default());
        Self {
            scheduler: Arc::new(Scheduler::new(
                config.behavior.failure_policy,
                Arc::clone(&listeners),
            )),
            listeners,
            config,
            ids: IdGenerator::default(),
            topology: RwLock::new(Topology::default()),
            receivers: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            directing: Mutex::new(None),
            outcome: Mutex::new(None),
            requests: Mutex::new(VecDeque::new()),
            tickets: AtomicU64::new(0),
            barrier: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Builds the initial network, starts every process and the directing
    /// thread.
    pub(crate) fn initialize(self: &Arc<Self>, mutation: Mutation<T>) -> Result<(), PnError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PnError::InvalidState(
                "the director is already initialized".into(),
            ));
        }
        if let Err(err) = self.apply(mutation) {
            self.initialized.store(false, Ordering::Release);
            return Err(match err {
                PnError::InvalidMutation(message) => PnError::InvalidGraph(message),
                other => other,
            });
        }
        self.start_pending();
        let inner = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("pn-director".into())
            .spawn(move || inner.direct())
            .map_err(|e| PnError::InvalidState(format!("cannot start the directing thread: {e}")))?;
        *self.directing.lock() = Some(handle);
        info!(processes = self.scheduler.counts().registered, "network started");
        Ok(())
    }

    /// The directing loop: resolves deadlocks, applies requested mutations
    /// and ends the run.
    #[instrument(skip_all, name = "directing")]
    fn direct(self: &Arc<Self>) -> Result<RunReport, PnError> {
        loop {
            match self.scheduler.next_verdict() {
                Verdict::Finished => {
                    let report = self.scheduler.report();
                    info!(
                        processes = report.processes.len(),
                        capacity_increases = report.capacity_increases,
                        terminated = report.terminated,
                        "network finished"
                    );
                    return Ok(report);
                }
                Verdict::Halt(err) => {
                    error!(error = %err, "halting the network");
                    self.terminate();
                    return Err(err);
                }
                Verdict::Mutations => self.apply_requested_mutations(),
                Verdict::Artificial(receivers) => {
                    if let Err(report) = self.grow_smallest(&receivers) {
                        error!(%report, "deadlock cannot be resolved by growing capacity");
                        self.terminate();
                        return Err(PnError::Deadlock(report));
                    }
                }
                Verdict::Real(blocked) => {
                    let report = DeadlockReport {
                        kind: DeadlockKind::Read,
                        blocked,
                    };
                    error!(%report, "real deadlock");
                    self.terminate();
                    return Err(PnError::Deadlock(report));
                }
            }
        }
    }

    /// Resolves an artificial deadlock by growing the smallest receiver that
    /// has a blocked writer.
    fn grow_smallest(&self, candidates: &[ReceiverId]) -> Result<(), DeadlockReport> {
        let smallest = candidates
            .iter()
            .filter_map(|id| self.receiver_by_id(*id))
            .filter_map(|receiver| receiver.capacity().bounded().map(|cap| (cap, receiver)))
            .min_by_key(|(cap, receiver)| (*cap, receiver.id()));
        let Some((current, receiver)) = smallest else {
            return Err(DeadlockReport {
                kind: DeadlockKind::Read,
                blocked: self.scheduler.blocked_processes(),
            });
        };
        let growth = self.config.queues.growth;
        let requested = growth.next(current);
        if let Some(maximum) = self.config.queues.ceiling() {
            if requested > maximum {
                return Err(DeadlockReport {
                    kind: DeadlockKind::CapacityCeiling {
                        receiver: receiver.description().to_string(),
                        capacity: current,
                        requested,
                        maximum,
                    },
                    blocked: self.scheduler.blocked_processes(),
                });
            }
        }
        debug!(
            receiver = receiver.description(),
            from = current,
            to = requested,
            "artificial deadlock; growing receiver"
        );
        if let Err(err) = receiver.set_capacity(Capacity::Bounded(requested)) {
            warn!(error = %err, "capacity growth refused");
        }
        self.scheduler.note_capacity_increase();
        Ok(())
    }

    fn apply_requested_mutations(self: &Arc<Self>) {
        let _barrier = self.barrier.lock();
        if let Err(err) = self.pause(PauseOwner::Director) {
            debug!(error = %err, "requested mutations deferred");
            return;
        }
        let requests: Vec<(u64, Mutation<T>)> = self.requests.lock().drain(..).collect();
        let results: Vec<(u64, Result<(), PnError>)> = requests
            .into_iter()
            .map(|(ticket, mutation)| (ticket, self.apply(mutation)))
            .collect();
        if let Err(err) = self.resume(PauseOwner::Director) {
            warn!(error = %err, "resume after requested mutations failed");
        }
        for (ticket, result) in results {
            self.scheduler.complete_mutation(ticket, result);
        }
    }

    pub(crate) fn request_mutation(
        &self,
        actor: ActorId,
        mutation: Mutation<T>,
    ) -> Result<(), PnError> {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        let blocked = {
            let mut requests = self.requests.lock();
            requests.push_back((ticket, mutation));
            self.scheduler.note_mutation_request(actor)
        };
        if let Some(event) = blocked {
            self.listeners.publish_process(&event);
        }
        self.scheduler.await_mutation(actor, ticket)
    }

    /// Validates and applies a mutation. Removed actors are stopped and
    /// joined before this returns; added ones are left unstarted.
    pub(crate) fn apply(self: &Arc<Self>, mutation: Mutation<T>) -> Result<(), PnError> {
        let paused = self.scheduler.is_paused();
        let mut topology = self.topology.write();
        let plan = topology.validate(&mutation.ops, |id| {
            self.receiver_by_id(id).map_or(0, |receiver| receiver.len())
        })?;
        self.check_stranding(&topology, &plan)?;
        let applied = self.apply_ops(&mut topology, mutation.ops, paused);
        drop(topology);

        for receiver in &applied.created {
            receiver.request_pause();
        }
        for receiver in &applied.finished {
            receiver.request_finish();
        }
        for (receiver, capacity) in &applied.resized {
            if let Err(err) = receiver.set_capacity(*capacity) {
                warn!(error = %err, "capacity change refused after validation");
            }
        }
        if !applied.removed_actors.is_empty() {
            self.retire(&applied.removed_actors);
        }
        Ok(())
    }

    /// Refuses to remove a receiver some surviving process is waiting on.
    fn check_stranding(&self, topology: &Topology<T>, plan: &Plan) -> Result<(), PnError> {
        for id in &plan.removed_receivers {
            let Some(receiver) = self.receiver_by_id(*id) else {
                continue;
            };
            for waiting in receiver.waiting_actors() {
                if !plan.removed_actors.contains(&waiting) {
                    let name = topology.name_of(waiting).unwrap_or("<unknown>");
                    return Err(PnError::InvalidMutation(format!(
                        "removing {} would strand `{name}`, which is waiting on it",
                        receiver.description()
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply_ops(
        self: &Arc<Self>,
        topology: &mut Topology<T>,
        ops: Vec<MutationOp<T>>,
        paused: bool,
    ) -> Applied<T> {
        let mut applied = Applied {
            removed_actors: Vec::new(),
            created: Vec::new(),
            finished: Vec::new(),
            resized: Vec::new(),
        };
        let initial = if paused {
            ProcessState::Paused
        } else {
            ProcessState::Running
        };
        for op in ops {
            match op {
                MutationOp::AddActor {
                    name,
                    actor,
                    iterations,
                } => {
                    let id = self.ids.next_actor();
                    let shared: Arc<str> = Arc::from(name.as_str());
                    topology.add_actor(name, id, actor.token_filter());
                    self.scheduler.register(id, Arc::clone(&shared), initial);
                    self.pending
                        .lock()
                        .push(ProcessThread::new(id, shared, actor, iterations));
                    debug!(actor = %id, "actor added");
                }
                MutationOp::RemoveActor(name) => {
                    if let Some((id, connections)) = topology.remove_actor(&name) {
                        applied.finished.extend(self.drop_receivers(&connections));
                        applied.removed_actors.push(id);
                        debug!(actor = %name, "actor removed");
                    }
                }
                MutationOp::Connect { from, to, capacity } => {
                    let (Some(from_actor), Some(to_actor)) =
                        (topology.actor(&from.actor), topology.actor(&to.actor))
                    else {
                        continue;
                    };
                    let channel = topology.input_width(to_actor, &to.port);
                    let id = self.ids.next_receiver();
                    let receiver = Receiver::attached(
                        id,
                        channel_description(&to, channel),
                        connection_capacity(capacity, self.config.queues.initial()),
                        Some(Arc::clone(&self.scheduler)),
                        Arc::clone(&self.listeners),
                        topology
                            .filter_for(to_actor)
                            .map(|filter| (to.port.clone(), filter)),
                    );
                    debug!(receiver = receiver.description(), capacity = %receiver.capacity(), "connected");
                    let receiver = Arc::new(receiver);
                    if paused {
                        applied.created.push(Arc::clone(&receiver));
                    }
                    self.receivers.insert(id, receiver);
                    topology.connect(Connection {
                        from,
                        to,
                        from_actor,
                        to_actor,
                        receiver: id,
                    });
                }
                MutationOp::Disconnect { from, to } => {
                    if let Some(connection) = topology.disconnect(&from, &to) {
                        applied
                            .finished
                            .extend(self.drop_receivers(std::slice::from_ref(&connection)));
                    }
                }
                MutationOp::SetCapacity {
                    to,
                    channel,
                    capacity,
                } => {
                    let receiver = topology
                        .actor(&to.actor)
                        .and_then(|actor| topology.input(actor, &to.port, channel))
                        .and_then(|id| self.receiver_by_id(id));
                    if let Some(receiver) = receiver {
                        applied.resized.push((receiver, capacity));
                    }
                }
            }
        }
        applied
    }

    fn drop_receivers(&self, connections: &[Connection]) -> Vec<Arc<Receiver<T>>> {
        connections
            .iter()
            .filter_map(|c| self.receivers.remove(&c.receiver).map(|(_, receiver)| receiver))
            .collect()
    }

    /// Stops removed actors and waits for their threads.
    fn retire(&self, actors: &[ActorId]) {
        let unstarted: Vec<ProcessThread<T>> = {
            let mut pending = self.pending.lock();
            let (removed, kept): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| actors.contains(&p.id));
            *pending = kept;
            removed
        };
        for process in unstarted {
            self.scheduler.finish(process.id, FinishCause::Abruptly, None);
        }
        self.scheduler.stop_processes(actors);
        let caller = current_process();
        self.scheduler
            .wait_finished(|id| actors.contains(&id) && Some(id) != caller);
        self.join(|id| actors.contains(&id) && Some(id) != caller);
    }

    pub(crate) fn start_pending(self: &Arc<Self>) {
        let pending: Vec<ProcessThread<T>> = self.pending.lock().drain(..).collect();
        for process in pending {
            let id = process.id;
            let name = Arc::clone(&process.name);
            match process.spawn(Arc::clone(self)) {
                Ok(handle) => self.threads.lock().push((id, handle)),
                Err(err) => {
                    error!(actor = %name, error = %err, "cannot start process thread");
                    self.scheduler.finish(
                        id,
                        FinishCause::WithException,
                        Some(Arc::new(anyhow::Error::new(err))),
                    );
                }
            }
        }
    }

    pub(crate) fn pause(&self, owner: PauseOwner) -> Result<(), PnError> {
        self.scheduler.begin_pause(owner)?;
        for receiver in self.receiver_list() {
            receiver.request_pause();
        }
        self.scheduler.await_quiescence()
    }

    pub(crate) fn resume(self: &Arc<Self>, owner: PauseOwner) -> Result<(), PnError> {
        self.scheduler.end_pause(owner)?;
        for receiver in self.receiver_list() {
            receiver.request_resume();
        }
        self.start_pending();
        Ok(())
    }

    pub(crate) fn barrier(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.barrier.lock()
    }

    /// Stops every process and waits until all of them, except the caller
    /// when it is itself a process, have finished.
    pub(crate) fn terminate(&self) {
        self.scheduler.request_stop();
        for receiver in self.receiver_list() {
            receiver.request_finish();
        }
        let unstarted: Vec<ProcessThread<T>> = {
            let _topology = self.topology.read();
            self.pending.lock().drain(..).collect()
        };
        for process in unstarted {
            self.scheduler.finish(process.id, FinishCause::Abruptly, None);
        }
        let caller = current_process();
        self.scheduler.wait_finished(|id| Some(id) != caller);
    }

    /// Joins the directing thread and every process thread, once. Later
    /// calls return the stored outcome.
    pub(crate) fn wait(&self) -> Result<RunReport, PnError> {
        if current_process().is_some() {
            return Err(PnError::InvalidState(
                "a process cannot wait for its own network".into(),
            ));
        }
        let mut directing = self.directing.lock();
        if let Some(handle) = directing.take() {
            let outcome = handle.join().unwrap_or_else(|payload| {
                Err(PnError::InvalidState(format!(
                    "the directing thread panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
            self.join(|_| true);
            *self.outcome.lock() = Some(outcome);
        }
        drop(directing);
        self.outcome.lock().clone().unwrap_or_else(|| {
            Err(PnError::InvalidState(
                "the director has not been initialized".into(),
            ))
        })
    }

    pub(crate) fn has_outcome(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn join(&self, include: impl Fn(ActorId) -> bool) {
        let handles: Vec<(ActorId, JoinHandle<()>)> = {
            let mut threads = self.threads.lock();
            let (selected, kept): (Vec<_>, Vec<_>) =
                threads.drain(..).partition(|(id, _)| include(*id));
            *threads = kept;
            selected
        };
        for (id, handle) in handles {
            if handle.join().is_err() {
                warn!(actor = %id, "process thread panicked outside the actor");
            }
        }
    }

    /// Drops every receiver and forgets the topology.
    pub(crate) fn release(&self) {
        *self.topology.write() = Topology::default();
        self.receivers.clear();
    }

    pub(crate) fn receiver_by_id(&self, id: ReceiverId) -> Option<Arc<Receiver<T>>> {
        self.receivers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn receiver_list(&self) -> Vec<Arc<Receiver<T>>> {
        self.receivers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn input(&self, actor: ActorId, port: &str, channel: usize) -> Option<Arc<Receiver<T>>> {
        let id = self.topology.read().input(actor, port, channel)?;
        self.receiver_by_id(id)
    }

    pub(crate) fn input_width(&self, actor: ActorId, port: &str) -> usize {
        self.topology.read().input_width(actor, port)
    }

    pub(crate) fn outputs(&self, actor: ActorId, port: &str) -> Vec<Arc<Receiver<T>>> {
        let ids = self.topology.read().outputs(actor, port);
        ids.into_iter()
            .filter_map(|id| self.receiver_by_id(id))
            .collect()
    }

    /// Receiver feeding channel `channel` of `actor.port`.
    pub(crate) fn receiver_at(
        &self,
        actor: &str,
        port: &str,
        channel: usize,
    ) -> Option<Arc<Receiver<T>>> {
        let id = {
            let topology = self.topology.read();
            let actor = topology.actor(actor)?;
            topology.input(actor, port, channel)?
        };
        self.receiver_by_id(id)
    }

    pub(crate) fn receiver_count(&self) -> usize {
        self.topology.read().receivers().count()
    }
}
