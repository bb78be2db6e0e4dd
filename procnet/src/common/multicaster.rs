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

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, warn};

use crate::common::{IdGenerator, ListenerId};
use crate::message::{ProcessEvent, ReceiverActionEvent};
use crate::traits::{ProcessListener, ReceiverListener};

/// Ordered set of listeners of one kind.
struct Multicaster<L: ?Sized> {
    entries: RwLock<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for Multicaster<L> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> Multicaster<L> {
    fn add(&self, id: ListenerId, listener: Arc<L>) {
        self.entries.write().push((id, listener));
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Calls `deliver` for every listener registered at the time of the call.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may register or remove listeners themselves.
    fn multicast(&self, kind: &str, deliver: impl Fn(&L) -> anyhow::Result<()>) {
        let snapshot: Vec<(ListenerId, Arc<L>)> = self.entries.read().clone();
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| deliver(&*listener))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(listener = id.0, kind, error = %err, "listener failed; skipping");
                }
                Err(payload) => {
                    error!(
                        listener = id.0,
                        kind,
                        panic = %panic_message(payload.as_ref()),
                        "listener panicked; skipping"
                    );
                }
            }
        }
    }
}

/// Process and receiver listeners of one director.
#[derive(Default)]
pub(crate) struct Listeners {
    ids: IdGenerator,
    process: Multicaster<dyn ProcessListener>,
    receiver: Multicaster<dyn ReceiverListener>,
}

impl Listeners {
    pub(crate) fn add_process(&self, listener: Arc<dyn ProcessListener>) -> ListenerId {
        let id = self.ids.next_listener();
        self.process.add(id, listener);
        id
    }

    pub(crate) fn remove_process(&self, id: ListenerId) -> bool {
        self.process.remove(id)
    }

    pub(crate) fn add_receiver(&self, listener: Arc<dyn ReceiverListener>) -> ListenerId {
        let id = self.ids.next_listener();
        self.receiver.add(id, listener);
        id
    }

    pub(crate) fn remove_receiver(&self, id: ListenerId) -> bool {
        self.receiver.remove(id)
    }

    pub(crate) fn publish_process(&self, event: &ProcessEvent) {
        if self.process.is_empty() {
            return;
        }
        self.process
            .multicast("process", |listener| listener.process_event(event));
    }

    pub(crate) fn publish_receiver(&self, event: &ReceiverActionEvent) {
        if self.receiver.is_empty() {
            return;
        }
        self.receiver
            .multicast("receiver", |listener| listener.receiver_event(event));
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::actor::ProcessState;
    use crate::common::ActorId;

    fn event() -> ProcessEvent {
        ProcessEvent::new(ActorId(1), Arc::from("ramp"), ProcessState::Running)
    }

    struct Failing;

    impl ProcessListener for Failing {
        fn process_event(&self, _event: &ProcessEvent) -> anyhow::Result<()> {
            anyhow::bail!("listener refused")
        }
    }

    #[test]
    fn failing_and_panicking_listeners_do_not_stop_delivery() {
        let listeners = Listeners::default();
        let delivered = Arc::new(AtomicUsize::new(0));
        listeners.add_process(Arc::new(Failing));
        listeners.add_process(Arc::new(|_event: &ProcessEvent| panic!("listener panic")));
        let counter = Arc::clone(&delivered);
        listeners.add_process(Arc::new(move |_event: &ProcessEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.publish_process(&event());
        listeners.publish_process(&event());
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let listeners = Listeners::default();
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        let id = listeners.add_process(Arc::new(move |_event: &ProcessEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(listeners.remove_process(id));
        assert!(!listeners.remove_process(id));
        listeners.publish_process(&event());
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panic_message_reads_both_string_kinds() {
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
    }
}
