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

//! Testing utilities for procnet networks.
//!
//! Network tests block on real threads, so a deadlock in the engine would hang
//! the test binary. [`procnet_test`](prelude::procnet_test) runs each test body
//! on its own thread under a watchdog and fails the test when it overruns.
//! Every test shares one tracing subscriber writing to `logs/procnet_tests.txt`.

use std::any::Any;
use std::panic;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use procnet_test_macro::procnet_test;

    pub use crate::{initialize_tracing, last_panic, run_with_watchdog};
}

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

static LAST_PANIC: Mutex<Option<String>> = parking_lot::const_mutex(None);

/// Installs the global tracing subscriber and the panic hook, once.
///
/// The filter comes from `RUST_LOG` and defaults to `procnet=debug`. Output
/// goes to `logs/procnet_tests.txt` through a non-blocking writer.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        if let Err(err) = std::fs::create_dir_all("logs") {
            eprintln!("procnet-test: could not create logs dir: {err}");
            return;
        }
        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "procnet_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the writer outlives every test.
        Box::leak(Box::new(guard));

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("procnet=debug,procnet_test=info"));

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("procnet-test: a global subscriber was already set");
        }

        let original = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "no error message".to_string());
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string());
            let cleaned = message.trim().replace('\n', " ");
            error!(thread = thread::current().name().unwrap_or("<unnamed>"), "Panic at {location}: {cleaned}");
            *LAST_PANIC.lock() = Some(cleaned);
            original(info);
        }));
    });
}

/// Message of the most recent panic seen by the hook, on any thread.
pub fn last_panic() -> Option<String> {
    LAST_PANIC.lock().clone()
}

type Outcome<R> = Option<Result<R, Box<dyn Any + Send>>>;

/// Runs `body` on a separate thread and waits at most `timeout` for it.
///
/// # Panics
///
/// Panics when `body` panics, with the original payload, or when it does not
/// finish within `timeout`.
pub fn run_with_watchdog<R, F>(name: &str, timeout: Duration, body: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let slot: Arc<(Mutex<Outcome<R>>, Condvar)> = Arc::new((Mutex::new(None), Condvar::new()));
    let filler = Arc::clone(&slot);
    let spawned = thread::Builder::new()
        .name(format!("test-{name}"))
        .spawn(move || {
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(body));
            let (lock, ready) = &*filler;
            *lock.lock() = Some(outcome);
            ready.notify_all();
        });
    if let Err(err) = spawned {
        panic!("could not start test thread for `{name}`: {err}");
    }

    let (lock, ready) = &*slot;
    let mut outcome = lock.lock();
    if outcome.is_none() {
        let _ = ready.wait_while_for(&mut outcome, |outcome| outcome.is_none(), timeout);
    }
    match outcome.take() {
        Some(Ok(value)) => value,
        Some(Err(payload)) => panic::resume_unwind(payload),
        None => {
            error!(test = name, ?timeout, "test timed out");
            panic!("test `{name}` did not finish within {timeout:?}");
        }
    }
}
