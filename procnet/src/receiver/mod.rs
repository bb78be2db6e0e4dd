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

//! Bounded FIFO channels between processes.
//!
//! A [`Receiver`] belongs to exactly one input channel of one actor. Writers
//! that find it full and readers that find it empty wait inside it; the
//! thread that makes room or delivers a token completes the waiter's
//! operation on its behalf and marks it unblocked before it wakes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

pub use capacity::{Capacity, CapacityGrowth};

use crate::actor::{current_process, BlockCause, ProcessState};
use crate::common::{ActorId, Listeners, ReceiverId, Scheduler, STANDALONE_IDS};
use crate::message::{PnError, ProcessEvent, ReceiverAction, ReceiverActionEvent};
use crate::traits::TokenFilter;

/// Defines [`Capacity`] and [`CapacityGrowth`].
mod capacity;

struct PendingWrite<T> {
    ticket: u64,
    actor: Option<ActorId>,
    token: T,
}

struct ReadWaiter {
    ticket: u64,
    actor: Option<ActorId>,
}

struct QueueState<T> {
    contents: VecDeque<T>,
    capacity: Capacity,
    /// Writers waiting for room, oldest first. Their tokens follow `contents`
    /// in FIFO order.
    pending_writes: VecDeque<PendingWrite<T>>,
    /// Readers waiting for a token, oldest first. Non-empty only while both
    /// `contents` and `pending_writes` are empty.
    read_waiters: VecDeque<ReadWaiter>,
    delivered: HashMap<u64, T>,
    completed_writes: HashSet<u64>,
    next_ticket: u64,
    finish_requested: bool,
    paused: bool,
}

impl<T> QueueState<T> {
    fn new(capacity: Capacity) -> Self {
        Self {
            contents: VecDeque::new(),
            capacity,
            pending_writes: VecDeque::new(),
            read_waiters: VecDeque::new(),
            delivered: HashMap::new(),
            completed_writes: HashSet::new(),
            next_ticket: 0,
            finish_requested: false,
            paused: false,
        }
    }

    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

/// Events produced under the receiver lock and published after it.
#[derive(Default)]
struct Outbox {
    receiver: Vec<ReceiverActionEvent>,
    process: Vec<ProcessEvent>,
}

impl Outbox {
    fn is_empty(&self) -> bool {
        self.receiver.is_empty() && self.process.is_empty()
    }
}

struct PortFilter<T> {
    port: String,
    filter: Arc<dyn TokenFilter<T>>,
}

/// A bounded FIFO queue of tokens for one input channel.
///
/// `put` and `get` block the calling thread when the queue is full or empty
/// and are cancelled by [`request_finish`](Receiver::request_finish). Every
/// operation is reported as a [`ReceiverActionEvent`].
pub struct Receiver<T> {
    id: ReceiverId,
    description: Arc<str>,
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    scheduler: Option<Arc<Scheduler>>,
    listeners: Arc<Listeners>,
    filter: Option<PortFilter<T>>,
}

impl<T: Send + 'static> Receiver<T> {
    /// Creates a receiver that is not attached to any director.
    pub fn new(capacity: impl Into<Capacity>) -> Self {
        let id = STANDALONE_IDS.next_receiver();
        Self::attached(
            id,
            Arc::from(id.to_string()),
            capacity.into(),
            None,
            Arc::new(Listeners::default()),
            None,
        )
    }

    /// Installs a filter consulted on every `put`, as if the receiver fed
    /// `port` of the filtering actor.
    #[must_use]
    pub fn with_filter(mut self, port: impl Into<String>, filter: Arc<dyn TokenFilter<T>>) -> Self {
        self.filter = Some(PortFilter {
            port: port.into(),
            filter,
        });
        self
    }

    pub(crate) fn attached(
        id: ReceiverId,
        description: Arc<str>,
        capacity: Capacity,
        scheduler: Option<Arc<Scheduler>>,
        listeners: Arc<Listeners>,
        filter: Option<(String, Arc<dyn TokenFilter<T>>)>,
    ) -> Self {
        Self {
            id,
            description,
            state: Mutex::new(QueueState::new(capacity)),
            ready: Condvar::new(),
            scheduler,
            listeners,
            filter: filter.map(|(port, filter)| PortFilter { port, filter }),
        }
    }

    /// Appends `token`, blocking while the receiver is full.
    ///
    /// If a reader is already waiting, the token is handed to it directly.
    ///
    /// # Errors
    ///
    /// - [`PnError::TokenRejected`] if the destination actor refuses the token
    /// - [`PnError::TerminationRequested`] if the receiver is told to finish
    ///   before the token is queued
    pub fn put(&self, token: T) -> Result<(), PnError> {
        if let Some(PortFilter { port, filter }) = &self.filter {
            if filter.reject(port, &token) {
                debug!(receiver = %self.description, "token rejected");
                return Err(PnError::TokenRejected {
                    receiver: self.description.to_string(),
                });
            }
        }
        let actor = current_process();
        let mut outbox = Outbox::default();
        let mut st = self.state.lock();
        let result = self.put_locked(&mut st, token, actor, &mut outbox);
        drop(st);
        self.flush(outbox);
        result
    }

    fn put_locked(
        &self,
        st: &mut MutexGuard<'_, QueueState<T>>,
        token: T,
        actor: Option<ActorId>,
        outbox: &mut Outbox,
    ) -> Result<(), PnError> {
        self.pause_gate(st, actor, outbox)?;
        if let Some(reader) = st.read_waiters.pop_front() {
            st.delivered.insert(reader.ticket, token);
            self.note(outbox, st.capacity, ReceiverAction::Put, actor);
            self.note(outbox, st.capacity, ReceiverAction::Get, reader.actor);
            self.note(outbox, st.capacity, ReceiverAction::ReadUnblocked, reader.actor);
            self.ready.notify_all();
            return Ok(());
        }
        // Writers still blocked from before a `clear` do not hold back a
        // fresh put while there is room.
        if st.capacity.admits(st.contents.len()) {
            st.contents.push_back(token);
            self.note(outbox, st.capacity, ReceiverAction::Put, actor);
            return Ok(());
        }
        let ticket = st.ticket();
        st.pending_writes.push_back(PendingWrite {
            ticket,
            actor,
            token,
        });
        self.note(outbox, st.capacity, ReceiverAction::WriteBlocked, actor);
        self.block_until(
            st,
            actor,
            BlockCause::OnWrite,
            outbox,
            |st| st.completed_writes.remove(&ticket).then_some(()),
            |st| st.pending_writes.retain(|write| write.ticket != ticket),
        )
    }

    /// Removes and returns the oldest token, blocking while the receiver is
    /// empty.
    ///
    /// # Errors
    ///
    /// [`PnError::TerminationRequested`] if the receiver is told to finish
    /// before a token arrives.
    pub fn get(&self) -> Result<T, PnError> {
        let actor = current_process();
        let mut outbox = Outbox::default();
        let mut st = self.state.lock();
        let result = self.get_locked(&mut st, actor, &mut outbox);
        drop(st);
        self.flush(outbox);
        result
    }

    fn get_locked(
        &self,
        st: &mut MutexGuard<'_, QueueState<T>>,
        actor: Option<ActorId>,
        outbox: &mut Outbox,
    ) -> Result<T, PnError> {
        self.pause_gate(st, actor, outbox)?;
        if let Some(token) = self.take_next(st, actor, outbox) {
            return Ok(token);
        }
        let ticket = st.ticket();
        st.read_waiters.push_back(ReadWaiter { ticket, actor });
        self.note(outbox, st.capacity, ReceiverAction::ReadBlocked, actor);
        self.block_until(
            st,
            actor,
            BlockCause::OnRead,
            outbox,
            |st| st.delivered.remove(&ticket),
            |st| st.read_waiters.retain(|reader| reader.ticket != ticket),
        )
    }

    /// Takes the oldest token, from the queue or, on a rendezvous, straight
    /// from the oldest blocked writer.
    fn take_next(
        &self,
        st: &mut QueueState<T>,
        actor: Option<ActorId>,
        outbox: &mut Outbox,
    ) -> Option<T> {
        let token = if let Some(token) = st.contents.pop_front() {
            token
        } else {
            let write = st.pending_writes.pop_front()?;
            st.completed_writes.insert(write.ticket);
            self.note(outbox, st.capacity, ReceiverAction::Put, write.actor);
            self.note(outbox, st.capacity, ReceiverAction::WriteUnblocked, write.actor);
            self.ready.notify_all();
            write.token
        };
        self.note(outbox, st.capacity, ReceiverAction::Get, actor);
        self.admit_pending(st, outbox);
        Some(token)
    }

    /// Moves blocked writers' tokens into the queue while there is room.
    fn admit_pending(&self, st: &mut QueueState<T>, outbox: &mut Outbox) {
        let mut admitted = false;
        while !st.pending_writes.is_empty() && st.capacity.admits(st.contents.len()) {
            let Some(write) = st.pending_writes.pop_front() else {
                break;
            };
            st.contents.push_back(write.token);
            st.completed_writes.insert(write.ticket);
            self.note(outbox, st.capacity, ReceiverAction::Put, write.actor);
            self.note(outbox, st.capacity, ReceiverAction::WriteUnblocked, write.actor);
            admitted = true;
        }
        if admitted {
            self.ready.notify_all();
        }
    }

    /// Waits out a pause before an operation starts.
    fn pause_gate(
        &self,
        st: &mut MutexGuard<'_, QueueState<T>>,
        actor: Option<ActorId>,
        outbox: &mut Outbox,
    ) -> Result<(), PnError> {
        if st.finish_requested {
            return Err(PnError::TerminationRequested);
        }
        if !st.paused {
            return Ok(());
        }
        self.report(outbox, actor, ProcessState::Paused, None);
        loop {
            if st.finish_requested {
                return Err(PnError::TerminationRequested);
            }
            if !st.paused {
                break;
            }
            if !outbox.is_empty() {
                self.flush_unlocked(st, outbox);
                continue;
            }
            self.ready.wait(st);
        }
        self.report(outbox, actor, ProcessState::Running, None);
        Ok(())
    }

    /// The wait shared by blocked readers and writers.
    ///
    /// Re-checks completion, finish and pause on every wake-up. `done`
    /// observes completion by another thread; `cancel` withdraws the request
    /// when the receiver finishes first.
    fn block_until<R>(
        &self,
        st: &mut MutexGuard<'_, QueueState<T>>,
        actor: Option<ActorId>,
        cause: BlockCause,
        outbox: &mut Outbox,
        mut done: impl FnMut(&mut QueueState<T>) -> Option<R>,
        cancel: impl FnOnce(&mut QueueState<T>),
    ) -> Result<R, PnError> {
        let mut paused = false;
        loop {
            if let Some(result) = done(&mut **st) {
                if paused || st.paused {
                    self.settle(st, actor, outbox);
                }
                return Ok(result);
            }
            if st.finish_requested {
                cancel(&mut **st);
                return Err(PnError::TerminationRequested);
            }
            if st.paused != paused {
                paused = st.paused;
                if paused {
                    self.report(outbox, actor, ProcessState::Paused, None);
                } else {
                    let on = Some((self.id, Arc::clone(&self.description)));
                    self.report(outbox, actor, ProcessState::Blocked(cause), on);
                }
            }
            if !outbox.is_empty() {
                self.flush_unlocked(st, outbox);
                continue;
            }
            self.ready.wait(st);
        }
    }

    /// After an operation completed during a pause: stay paused until the
    /// pause ends, then report running again.
    fn settle(
        &self,
        st: &mut MutexGuard<'_, QueueState<T>>,
        actor: Option<ActorId>,
        outbox: &mut Outbox,
    ) {
        if st.paused {
            self.report(outbox, actor, ProcessState::Paused, None);
        }
        loop {
            if st.finish_requested || !st.paused {
                break;
            }
            if !outbox.is_empty() {
                self.flush_unlocked(st, outbox);
                continue;
            }
            self.ready.wait(st);
        }
        self.report(outbox, actor, ProcessState::Running, None);
    }

    /// Empties the queue. Blocked writers stay blocked.
    pub fn clear(&self) {
        let mut outbox = Outbox::default();
        let mut st = self.state.lock();
        st.contents.clear();
        self.note(&mut outbox, st.capacity, ReceiverAction::Clear, None);
        drop(st);
        self.flush(outbox);
    }

    /// Changes the capacity and admits blocked writers if it grew.
    ///
    /// Any change, a decrease included, is reported as
    /// [`ReceiverAction::CapacityIncreased`] carrying the new capacity.
    ///
    /// # Errors
    ///
    /// [`PnError::InvalidMutation`] if `capacity` cannot hold the tokens
    /// already queued; the receiver is left unchanged.
    pub fn set_capacity(&self, capacity: impl Into<Capacity>) -> Result<(), PnError> {
        let capacity = capacity.into();
        let mut outbox = Outbox::default();
        let mut st = self.state.lock();
        if !capacity.can_hold(st.contents.len()) {
            return Err(PnError::InvalidMutation(format!(
                "{}: capacity {capacity} is below the {} queued tokens",
                self.description,
                st.contents.len()
            )));
        }
        if st.capacity != capacity {
            debug!(receiver = %self.description, from = %st.capacity, to = %capacity, "capacity changed");
            let grew = capacity.exceeds(&st.capacity);
            st.capacity = capacity;
            self.note(&mut outbox, capacity, ReceiverAction::CapacityIncreased, None);
            if grew {
                self.admit_pending(&mut st, &mut outbox);
            }
        }
        drop(st);
        self.flush(outbox);
        Ok(())
    }

    /// Makes every current and future blocking call fail with
    /// [`PnError::TerminationRequested`].
    pub fn request_finish(&self) {
        self.set_flag(ReceiverAction::FinishRequested, |st| st.finish_requested = true);
    }

    /// Holds callers entering `get`/`put`, and reports blocked callers as
    /// paused, until [`request_resume`](Receiver::request_resume).
    pub fn request_pause(&self) {
        self.set_flag(ReceiverAction::PauseRequested, |st| st.paused = true);
    }

    /// Lifts a pause.
    pub fn request_resume(&self) {
        self.set_flag(ReceiverAction::ResumeRequested, |st| st.paused = false);
    }

    fn set_flag(&self, action: ReceiverAction, apply: impl FnOnce(&mut QueueState<T>)) {
        let mut outbox = Outbox::default();
        let mut st = self.state.lock();
        apply(&mut *st);
        self.note(&mut outbox, st.capacity, action, None);
        self.ready.notify_all();
        drop(st);
        self.flush(outbox);
    }

    /// This receiver's id.
    pub fn id(&self) -> ReceiverId {
        self.id
    }

    /// Where the receiver sits, e.g. `sink.input[0]`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current capacity.
    pub fn capacity(&self) -> Capacity {
        self.state.lock().capacity
    }

    /// Number of queued tokens.
    pub fn len(&self) -> usize {
        self.state.lock().contents.len()
    }

    /// Whether no token is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of readers waiting for a token.
    pub fn read_blocked_count(&self) -> usize {
        self.state.lock().read_waiters.len()
    }

    /// Number of writers waiting for room.
    pub fn write_blocked_count(&self) -> usize {
        self.state.lock().pending_writes.len()
    }

    /// Whether finish was requested.
    pub fn is_finished(&self) -> bool {
        self.state.lock().finish_requested
    }

    /// Processes currently waiting inside this receiver.
    pub(crate) fn waiting_actors(&self) -> Vec<ActorId> {
        let st = self.state.lock();
        st.read_waiters
            .iter()
            .filter_map(|reader| reader.actor)
            .chain(st.pending_writes.iter().filter_map(|write| write.actor))
            .collect()
    }

    fn note(
        &self,
        outbox: &mut Outbox,
        capacity: Capacity,
        action: ReceiverAction,
        actor: Option<ActorId>,
    ) {
        trace!(receiver = %self.description, %action, ?actor, "receiver action");
        let event = ReceiverActionEvent {
            receiver: self.id,
            description: Arc::clone(&self.description),
            capacity,
            action,
            actor,
        };
        if let Some(scheduler) = &self.scheduler {
            outbox.process.extend(scheduler.receiver_event(&event));
        }
        outbox.receiver.push(event);
    }

    fn report(
        &self,
        outbox: &mut Outbox,
        actor: Option<ActorId>,
        state: ProcessState,
        blocked_on: Option<(ReceiverId, Arc<str>)>,
    ) {
        if let (Some(actor), Some(scheduler)) = (actor, &self.scheduler) {
            outbox
                .process
                .extend(scheduler.transition(actor, state, blocked_on));
        }
    }

    fn flush_unlocked(&self, st: &mut MutexGuard<'_, QueueState<T>>, outbox: &mut Outbox) {
        let pending = std::mem::take(outbox);
        MutexGuard::unlocked(st, || self.flush(pending));
    }

    fn flush(&self, outbox: Outbox) {
        for event in &outbox.receiver {
            self.listeners.publish_receiver(event);
        }
        for event in &outbox.process {
            self.listeners.publish_process(event);
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
