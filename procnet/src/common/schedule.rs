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

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::actor::{BlockCause, FailurePolicy, FinishCause, ProcessState};
use crate::common::{ActorId, Listeners, ReceiverId};
use crate::message::{
    ActorFailure, BlockedProcess, PnError, ProcessEvent, ReceiverAction, ReceiverActionEvent,
};

/// How many processes are in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    /// Processes known to the director, finished ones included.
    pub registered: usize,
    /// `RUNNING`.
    pub running: usize,
    /// `BLOCKED_ON_READ`.
    pub read_blocked: usize,
    /// `BLOCKED_ON_WRITE`.
    pub write_blocked: usize,
    /// `BLOCKED_ON_DELAY`.
    pub delay_blocked: usize,
    /// `BLOCKED_ON_MUTATION`.
    pub mutation_blocked: usize,
    /// `PAUSED`.
    pub paused: usize,
    /// `FINISHED`, any cause.
    pub finished: usize,
}

impl StateCounts {
    /// Processes that have not finished.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.registered - self.finished
    }

    fn count(&mut self, state: ProcessState) {
        self.registered += 1;
        match state {
            ProcessState::Running => self.running += 1,
            ProcessState::Blocked(BlockCause::OnRead) => self.read_blocked += 1,
            ProcessState::Blocked(BlockCause::OnWrite) => self.write_blocked += 1,
            ProcessState::Blocked(BlockCause::OnDelay) => self.delay_blocked += 1,
            ProcessState::Blocked(BlockCause::OnMutation) => self.mutation_blocked += 1,
            ProcessState::Paused => self.paused += 1,
            ProcessState::Finished(_) => self.finished += 1,
        }
    }
}

/// How one process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Actor name.
    pub name: String,
    /// Finishing cause.
    pub cause: FinishCause,
}

/// Outcome of a run that did not end in deadlock or a fail-fast failure.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Every process that ran, in creation order.
    pub processes: Vec<ProcessSummary>,
    /// Failures tolerated under the best-effort policy.
    pub failures: Vec<ActorFailure>,
    /// Number of artificial deadlocks resolved by growing a receiver.
    pub capacity_increases: usize,
    /// Logical time when the run ended.
    pub model_time: f64,
    /// Whether the run was ended by a terminate request.
    pub terminated: bool,
}

/// Who holds the pause barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseOwner {
    Caller,
    Director,
}

/// What the directing thread has to do next.
#[derive(Debug)]
pub(crate) enum Verdict {
    /// A fail-fast failure was recorded.
    Halt(PnError),
    /// No live process remains.
    Finished,
    /// Actors are waiting for topology changes they requested.
    Mutations,
    /// Every live process is blocked and some wait to write on these receivers.
    Artificial(Vec<ReceiverId>),
    /// Every live process is blocked reading.
    Real(Vec<BlockedProcess>),
}

struct ProcessRecord {
    name: Arc<str>,
    state: ProcessState,
    blocked_on: Option<(ReceiverId, Arc<str>)>,
    stop_requested: bool,
}

/// The director's bookkeeping. Only mutated under the scheduler lock.
struct Schedule {
    records: BTreeMap<ActorId, ProcessRecord>,
    pause: Option<PauseOwner>,
    fully_paused: bool,
    stop_requested: bool,
    model_time: f64,
    delays: Vec<(f64, ActorId)>,
    pending_mutations: usize,
    mutation_results: HashMap<u64, Result<(), PnError>>,
    failures: Vec<ActorFailure>,
    halt: Option<PnError>,
    capacity_increases: usize,
    policy: FailurePolicy,
}

impl Schedule {
    fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for record in self.records.values() {
            counts.count(record.state);
        }
        counts
    }

    fn stopping(&self, actor: ActorId) -> bool {
        self.stop_requested
            || self
                .records
                .get(&actor)
                .map_or(false, |record| record.stop_requested)
    }

    fn has_delay(&self, actor: ActorId) -> bool {
        self.delays.iter().any(|(_, waiting)| *waiting == actor)
    }

    fn transition(
        &mut self,
        actor: ActorId,
        state: ProcessState,
        blocked_on: Option<(ReceiverId, Arc<str>)>,
    ) -> Option<ProcessEvent> {
        let record = self.records.get_mut(&actor)?;
        if record.state.is_finished() {
            return None;
        }
        record.blocked_on = match state {
            ProcessState::Blocked(cause) if cause.is_channel() => blocked_on,
            _ => None,
        };
        if record.state == state {
            return None;
        }
        trace!(actor = %record.name, from = %record.state, to = %state, "process state");
        record.state = state;
        Some(ProcessEvent::new(actor, Arc::clone(&record.name), state))
    }

    /// Released processes are marked running by whoever released them. A
    /// process that is paused stays paused until it notices the resume.
    fn unblock(&mut self, actor: ActorId) -> Option<ProcessEvent> {
        let paused = self
            .records
            .get(&actor)
            .map_or(true, |record| record.state == ProcessState::Paused);
        if paused {
            return None;
        }
        self.transition(actor, ProcessState::Running, None)
    }

    fn quiescent(&self) -> bool {
        self.records.values().all(|record| {
            matches!(
                record.state,
                ProcessState::Paused
                    | ProcessState::Finished(_)
                    | ProcessState::Blocked(BlockCause::OnMutation)
            )
        })
    }

    fn blocked_processes(&self) -> Vec<BlockedProcess> {
        self.records
            .values()
            .filter_map(|record| match record.state {
                ProcessState::Blocked(cause) => Some(BlockedProcess {
                    actor: record.name.to_string(),
                    cause,
                    receiver: record
                        .blocked_on
                        .as_ref()
                        .map(|(_, description)| description.to_string()),
                }),
                _ => None,
            })
            .collect()
    }

    fn evaluate(&mut self, events: &mut Vec<ProcessEvent>) -> Option<Verdict> {
        if let Some(halt) = &self.halt {
            return Some(Verdict::Halt(halt.clone()));
        }
        let counts = self.counts();
        if counts.live() == 0 {
            return Some(Verdict::Finished);
        }
        if self.stop_requested || self.pause.is_some() {
            return None;
        }
        if self.pending_mutations > 0 {
            return Some(Verdict::Mutations);
        }
        let blocked = counts.read_blocked + counts.write_blocked + counts.delay_blocked;
        if blocked < counts.live() {
            return None;
        }
        if counts.write_blocked > 0 {
            let mut receivers: Vec<ReceiverId> = self
                .records
                .values()
                .filter(|record| record.state == ProcessState::Blocked(BlockCause::OnWrite))
                .filter_map(|record| record.blocked_on.as_ref().map(|(id, _)| *id))
                .collect();
            receivers.sort_unstable();
            receivers.dedup();
            return Some(Verdict::Artificial(receivers));
        }
        if counts.delay_blocked == 0 {
            return Some(Verdict::Real(self.blocked_processes()));
        }
        self.advance_time(events);
        None
    }

    /// Moves logical time to the earliest pending wake-up and releases every
    /// process due at that instant.
    fn advance_time(&mut self, events: &mut Vec<ProcessEvent>) {
        let Some(next) = self
            .delays
            .iter()
            .map(|(time, _)| *time)
            .min_by(f64::total_cmp)
        else {
            return;
        };
        if next > self.model_time {
            self.model_time = next;
        }
        debug!(model_time = self.model_time, "advancing model time");
        let now = self.model_time;
        let (due, later): (Vec<_>, Vec<_>) =
            self.delays.drain(..).partition(|(time, _)| *time <= now);
        self.delays = later;
        for (_, actor) in due {
            events.extend(self.transition(actor, ProcessState::Running, None));
        }
    }

    fn report(&self) -> RunReport {
        RunReport {
            processes: self
                .records
                .values()
                .filter_map(|record| match record.state {
                    ProcessState::Finished(cause) => Some(ProcessSummary {
                        name: record.name.to_string(),
                        cause,
                    }),
                    _ => None,
                })
                .collect(),
            failures: self.failures.clone(),
            capacity_increases: self.capacity_increases,
            model_time: self.model_time,
            terminated: self.stop_requested,
        }
    }
}

/// Shared process bookkeeping: one lock, one condition variable.
///
/// Every effective state change notifies `changed`, which wakes the directing
/// thread, pause and terminate barriers, and processes waiting on a delay or a
/// mutation. Receivers call in while holding their own lock; the scheduler
/// never calls into a receiver.
pub(crate) struct Scheduler {
    state: Mutex<Schedule>,
    changed: Condvar,
    listeners: Arc<Listeners>,
}

impl Scheduler {
    pub(crate) fn new(policy: FailurePolicy, listeners: Arc<Listeners>) -> Self {
        Self {
            state: Mutex::new(Schedule {
                records: BTreeMap::new(),
                pause: None,
                fully_paused: false,
                stop_requested: false,
                model_time: 0.0,
                delays: Vec::new(),
                pending_mutations: 0,
                mutation_results: HashMap::new(),
                failures: Vec::new(),
                halt: None,
                capacity_increases: 0,
                policy,
            }),
            changed: Condvar::new(),
            listeners,
        }
    }

    fn publish(&self, events: impl IntoIterator<Item = ProcessEvent>) {
        for event in events {
            self.listeners.publish_process(&event);
        }
    }

    /// Publishes with the lock released. Callers re-check their wait
    /// condition afterwards.
    fn publish_unlocked(&self, guard: &mut MutexGuard<'_, Schedule>, event: Option<ProcessEvent>) {
        if event.is_some() {
            self.changed.notify_all();
            MutexGuard::unlocked(guard, || self.publish(event));
        }
    }

    pub(crate) fn register(&self, actor: ActorId, name: Arc<str>, state: ProcessState) {
        self.state.lock().records.insert(
            actor,
            ProcessRecord {
                name,
                state,
                blocked_on: None,
                stop_requested: false,
            },
        );
        self.changed.notify_all();
    }

    /// Reports `RUNNING` once the actor has initialized.
    pub(crate) fn announce_running(&self, actor: ActorId) {
        let event = {
            let mut s = self.state.lock();
            let stopping = s.stopping(actor);
            let Some(record) = s.records.get_mut(&actor) else {
                return;
            };
            if record.state.is_finished() {
                return;
            }
            record.state = ProcessState::Running;
            record.blocked_on = None;
            ProcessEvent::new(actor, Arc::clone(&record.name), ProcessState::Running)
        };
        self.changed.notify_all();
        self.listeners.publish_process(&event);
    }

    /// State change driven by a receiver. The caller publishes the event
    /// after releasing its own lock.
    pub(crate) fn transition(
        &self,
        actor: ActorId,
        state: ProcessState,
        blocked_on: Option<(ReceiverId, Arc<str>)>,
    ) -> Option<ProcessEvent> {
        let event = self.state.lock().transition(actor, state, blocked_on);
        if event.is_some() {
            self.changed.notify_all();
        }
        event
    }

    /// Bookkeeping for one receiver action.
    pub(crate) fn receiver_event(&self, event: &ReceiverActionEvent) -> Option<ProcessEvent> {
        let actor = event.actor?;
        let blocked_on = || Some((event.receiver, Arc::clone(&event.description)));
        let mut s = self.state.lock();
        let process_event = match event.action {
            ReceiverAction::ReadBlocked => {
                s.transition(actor, ProcessState::Blocked(BlockCause::OnRead), blocked_on())
            }
            ReceiverAction::WriteBlocked => {
                s.transition(actor, ProcessState::Blocked(BlockCause::OnWrite), blocked_on())
            }
            ReceiverAction::ReadUnblocked | ReceiverAction::WriteUnblocked => s.unblock(actor),
            _ => None,
        };
        drop(s);
        if process_event.is_some() {
            self.changed.notify_all();
        }
        process_event
    }

    /// Suspends the calling process while a pause is in effect.
    pub(crate) fn pause_point(&self, actor: ActorId) -> Result<(), PnError> {
        let mut s = self.state.lock();
        if s.stopping(actor) {
            return Err(PnError::TerminationRequested);
        }
        if s.pause.is_none() {
            return Ok(());
        }
        let paused = s.transition(actor, ProcessState::Paused, None);
        self.publish_unlocked(&mut s, paused);
        loop {
            if s.stopping(actor) {
                return Err(PnError::TerminationRequested);
            }
            if s.pause.is_none() {
                break;
            }
            self.changed.wait(&mut s);
        }
        let running = s.transition(actor, ProcessState::Running, None);
        drop(s);
        if running.is_some() {
            self.changed.notify_all();
        }
        self.publish(running);
        Ok(())
    }

    /// Blocks the calling process until logical time reaches `until`.
    pub(crate) fn delay_until(&self, actor: ActorId, until: f64) -> Result<(), PnError> {
        let mut s = self.state.lock();
        if s.stopping(actor) {
            return Err(PnError::TerminationRequested);
        }
        if until <= s.model_time {
            return Ok(());
        }
        s.delays.push((until, actor));
        let blocked = s.transition(actor, ProcessState::Blocked(BlockCause::OnDelay), None);
        self.publish_unlocked(&mut s, blocked);
        let mut paused = false;
        loop {
            if !s.has_delay(actor) {
                break;
            }
            if s.stopping(actor) {
                s.delays.retain(|(_, waiting)| *waiting != actor);
                return Err(PnError::TerminationRequested);
            }
            if s.pause.is_some() != paused {
                paused = s.pause.is_some();
                let state = if paused {
                    ProcessState::Paused
                } else {
                    ProcessState::Blocked(BlockCause::OnDelay)
                };
                let event = s.transition(actor, state, None);
                self.publish_unlocked(&mut s, event);
                continue;
            }
            self.changed.wait(&mut s);
        }
        let running = s.transition(actor, ProcessState::Running, None);
        drop(s);
        if running.is_some() {
            self.changed.notify_all();
        }
        self.publish(running);
        Ok(())
    }

    pub(crate) fn model_time(&self) -> f64 {
        self.state.lock().model_time
    }

    /// Marks the caller as waiting for a requested mutation. Must be called
    /// while the request queue is locked, so the directing thread never sees
    /// a queued request without its count.
    pub(crate) fn note_mutation_request(&self, actor: ActorId) -> Option<ProcessEvent> {
        let mut s = self.state.lock();
        s.pending_mutations += 1;
        let event = s.transition(actor, ProcessState::Blocked(BlockCause::OnMutation), None);
        drop(s);
        self.changed.notify_all();
        event
    }

    pub(crate) fn await_mutation(&self, actor: ActorId, ticket: u64) -> Result<(), PnError> {
        let mut s = self.state.lock();
        loop {
            if let Some(result) = s.mutation_results.remove(&ticket) {
                let running = s.transition(actor, ProcessState::Running, None);
                drop(s);
                if running.is_some() {
                    self.changed.notify_all();
                }
                self.publish(running);
                return result;
            }
            if s.stopping(actor) {
                return Err(PnError::TerminationRequested);
            }
            self.changed.wait(&mut s);
        }
    }

    pub(crate) fn complete_mutation(&self, ticket: u64, result: Result<(), PnError>) {
        let mut s = self.state.lock();
        s.pending_mutations = s.pending_mutations.saturating_sub(1);
        s.mutation_results.insert(ticket, result);
        drop(s);
        self.changed.notify_all();
    }

    /// Records the end of a process and applies the failure policy.
    pub(crate) fn finish(
        &self,
        actor: ActorId,
        cause: FinishCause,
        failure: Option<Arc<anyhow::Error>>,
    ) {
        let event = {
            let mut s = self.state.lock();
            let stopping = s.stopping(actor);
            let Some(record) = s.records.get_mut(&actor) else {
                return;
            };
            if record.state.is_finished() {
                return;
            }
            record.state = ProcessState::Finished(cause);
            record.blocked_on = None;
            let mut event =
                ProcessEvent::new(actor, Arc::clone(&record.name), ProcessState::Finished(cause));
            let name = record.name.to_string();
            s.delays.retain(|(_, waiting)| *waiting != actor);
            if let Some(cause) = failure {
                event = event.with_failure(Arc::clone(&cause));
                let failure = ActorFailure { actor: name, cause };
                s.failures.push(failure.clone());
                // A failure raised while stopping is recorded but does not
                // replace the outcome of the stop.
                if s.policy.halts_on_failure() && s.halt.is_none() && !stopping {
                    s.halt = Some(PnError::ActorFailure(failure));
                }
            }
            event
        };
        self.changed.notify_all();
        self.listeners.publish_process(&event);
    }

    pub(crate) fn stop_requested_for(&self, actor: ActorId) -> bool {
        self.state.lock().stopping(actor)
    }

    pub(crate) fn request_stop(&self) {
        self.state.lock().stop_requested = true;
        self.changed.notify_all();
    }

    /// Asks the given processes, and only them, to finish.
    pub(crate) fn stop_processes(&self, actors: &[ActorId]) {
        let mut s = self.state.lock();
        for actor in actors {
            if let Some(record) = s.records.get_mut(actor) {
                record.stop_requested = true;
            }
        }
        drop(s);
        self.changed.notify_all();
    }

    /// Blocks until every process selected by `include` has finished.
    pub(crate) fn wait_finished(&self, include: impl Fn(ActorId) -> bool) {
        let mut s = self.state.lock();
        while s
            .records
            .iter()
            .any(|(id, record)| include(*id) && !record.state.is_finished())
        {
            self.changed.wait(&mut s);
        }
    }

    pub(crate) fn begin_pause(&self, owner: PauseOwner) -> Result<(), PnError> {
        let mut s = self.state.lock();
        if s.stop_requested {
            return Err(PnError::InvalidState("the network is terminating".into()));
        }
        if s.pause.is_some() {
            return Err(PnError::InvalidState("the network is already paused".into()));
        }
        s.pause = Some(owner);
        drop(s);
        debug!(?owner, "pause requested");
        self.changed.notify_all();
        Ok(())
    }

    /// Waits until every process is paused, finished or waiting on a mutation.
    pub(crate) fn await_quiescence(&self) -> Result<(), PnError> {
        let mut s = self.state.lock();
        loop {
            if s.stop_requested {
                return Err(PnError::TerminationRequested);
            }
            if s.pause.is_none() {
                return Err(PnError::InvalidState("the pause was lifted".into()));
            }
            if s.quiescent() {
                s.fully_paused = true;
                return Ok(());
            }
            self.changed.wait(&mut s);
        }
    }

    pub(crate) fn end_pause(&self, owner: PauseOwner) -> Result<(), PnError> {
        let mut s = self.state.lock();
        match s.pause {
            Some(current) if current == owner => {}
            Some(_) => {
                return Err(PnError::InvalidState(
                    "the network is paused by the director".into(),
                ))
            }
            None => return Err(PnError::InvalidState("the network is not paused".into())),
        }
        s.pause = None;
        s.fully_paused = false;
        drop(s);
        debug!(?owner, "pause lifted");
        self.changed.notify_all();
        Ok(())
    }

    pub(crate) fn fully_paused(&self) -> bool {
        self.state.lock().fully_paused
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.lock().pause.is_some()
    }

    /// Blocks the directing thread until there is something to decide.
    pub(crate) fn next_verdict(&self) -> Verdict {
        let mut s = self.state.lock();
        loop {
            let mut released = Vec::new();
            let verdict = s.evaluate(&mut released);
            if !released.is_empty() {
                self.changed.notify_all();
                MutexGuard::unlocked(&mut s, || self.publish(released));
                continue;
            }
            if let Some(verdict) = verdict {
                return verdict;
            }
            self.changed.wait(&mut s);
        }
    }

    pub(crate) fn note_capacity_increase(&self) {
        self.state.lock().capacity_increases += 1;
    }

    pub(crate) fn blocked_processes(&self) -> Vec<BlockedProcess> {
        self.state.lock().blocked_processes()
    }

    pub(crate) fn counts(&self) -> StateCounts {
        self.state.lock().counts()
    }

    /// Latest state of the most recently created process called `name`.
    pub(crate) fn state_of(&self, name: &str) -> Option<ProcessState> {
        self.state
            .lock()
            .records
            .values()
            .rev()
            .find(|record| &*record.name == name)
            .map(|record| record.state)
    }

    pub(crate) fn report(&self) -> RunReport {
        self.state.lock().report()
    }
}
