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

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::actor::{FinishCause, ProcessContext};
use crate::common::{panic_message, ActorId, DirectorInner};
use crate::message::PnError;
use crate::traits::{Actor, Firing, Token};

thread_local! {
    static CURRENT_PROCESS: Cell<Option<ActorId>> = const { Cell::new(None) };
}

/// The process running on this thread, if any.
pub(crate) fn current_process() -> Option<ActorId> {
    CURRENT_PROCESS.with(Cell::get)
}

/// One actor and the thread that will drive it.
pub(crate) struct ProcessThread<T: Token> {
    pub(crate) id: ActorId,
    pub(crate) name: Arc<str>,
    actor: Box<dyn Actor<T>>,
    iterations: Option<u64>,
}

impl<T: Token> ProcessThread<T> {
    pub(crate) fn new(
        id: ActorId,
        name: Arc<str>,
        actor: Box<dyn Actor<T>>,
        iterations: Option<u64>,
    ) -> Self {
        Self {
            id,
            name,
            actor,
            iterations,
        }
    }

    /// Starts the thread, named after the actor.
    pub(crate) fn spawn(self, inner: Arc<DirectorInner<T>>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || self.run(inner))
    }

    fn run(mut self, inner: Arc<DirectorInner<T>>) {
        CURRENT_PROCESS.with(|current| current.set(Some(self.id)));
        let scheduler = Arc::clone(&inner.scheduler);
        let ctx = ProcessContext::new(self.id, Arc::clone(&self.name), inner);
        debug!(actor = %self.name, "process started");

        let outcome = catch_unwind(AssertUnwindSafe(|| self.drive(&ctx)))
            .unwrap_or_else(|payload| Err(panicked(payload.as_ref())));
        let wrapup = catch_unwind(AssertUnwindSafe(|| self.actor.wrapup(&ctx)))
            .unwrap_or_else(|payload| Err(panicked(payload.as_ref())));

        let classify = |err: anyhow::Error| {
            if PnError::is_termination(&err) {
                (FinishCause::Abruptly, None)
            } else {
                (FinishCause::WithException, Some(err))
            }
        };
        let (cause, failure) = match (outcome, wrapup) {
            (Ok(()), Ok(())) => (FinishCause::Properly, None),
            (Ok(()), Err(err)) => classify(err),
            (Err(err), wrapup) => {
                if let Err(wrapup_err) = wrapup {
                    warn!(actor = %self.name, error = %wrapup_err, "wrapup failed after an earlier error");
                }
                classify(err)
            }
        };
        if let Some(err) = &failure {
            error!(actor = %self.name, error = %format!("{err:#}"), "actor failed");
        } else {
            debug!(actor = %self.name, %cause, "process finished");
        }
        scheduler.finish(self.id, cause, failure.map(Arc::new));
        CURRENT_PROCESS.with(|current| current.set(None));
    }

    fn drive(&mut self, ctx: &ProcessContext<T>) -> anyhow::Result<()> {
        self.actor.initialize(ctx)?;
        ctx.scheduler().announce_running(self.id);
        loop {
            if self
                .iterations
                .is_some_and(|limit| ctx.iteration() >= limit)
            {
                return Ok(());
            }
            ctx.scheduler().pause_point(self.id)?;
            let firing = self.actor.fire(ctx)?;
            ctx.advance_iteration();
            if firing == Firing::Done {
                return Ok(());
            }
        }
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> anyhow::Error {
    anyhow::anyhow!("actor panicked: {}", panic_message(payload))
}
