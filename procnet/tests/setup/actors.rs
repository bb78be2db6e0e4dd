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
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::bail;
use parking_lot::Mutex;
use procnet::prelude::*;

/// Writes `values` to `output`, one per firing, then finishes.
pub struct Producer {
    values: Vec<u32>,
    next: usize,
}

impl Producer {
    pub fn new(values: impl Into<Vec<u32>>) -> Self {
        Self {
            values: values.into(),
            next: 0,
        }
    }
}

impl Actor<u32> for Producer {
    fn fire(&mut self, ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        let Some(value) = self.values.get(self.next).copied() else {
            return Ok(Firing::Done);
        };
        ctx.put("output", value)?;
        self.next += 1;
        if self.next == self.values.len() {
            Ok(Firing::Done)
        } else {
            Ok(Firing::Continue)
        }
    }
}

/// Reads `expected` tokens from `input`, optionally sleeping before each read.
pub struct Collector {
    seen: Arc<Mutex<Vec<u32>>>,
    expected: usize,
    nap: Duration,
}

impl Collector {
    /// The collector and a handle on what it has read so far.
    pub fn new(expected: usize) -> (Self, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collector = Self {
            seen: Arc::clone(&seen),
            expected,
            nap: Duration::ZERO,
        };
        (collector, seen)
    }

    pub fn napping(mut self, nap: Duration) -> Self {
        self.nap = nap;
        self
    }
}

impl Actor<u32> for Collector {
    fn fire(&mut self, ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        if !self.nap.is_zero() {
            thread::sleep(self.nap);
        }
        let token = ctx.get("input")?;
        let mut seen = self.seen.lock();
        seen.push(token);
        if seen.len() >= self.expected {
            Ok(Firing::Done)
        } else {
            Ok(Firing::Continue)
        }
    }
}

/// Keeps firing until stopped, sleeping between firings.
pub struct Spinner {
    interval: Duration,
}

impl Spinner {
    pub fn new() -> Self {
        Self {
            interval: Duration::from_millis(2),
        }
    }
}

impl Actor<u32> for Spinner {
    fn fire(&mut self, _ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        thread::sleep(self.interval);
        Ok(Firing::Continue)
    }
}

/// Fails on its first firing.
pub struct Faulty;

impl Actor<u32> for Faulty {
    fn fire(&mut self, _ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        bail!("sensor offline")
    }
}

/// Panics on its first firing.
pub struct Panicky;

impl Actor<u32> for Panicky {
    fn fire(&mut self, _ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        panic!("kaboom")
    }
}

/// Refuses odd tokens on every input port, then reads one token.
pub struct EvenOnly {
    pub seen: Arc<Mutex<Vec<u32>>>,
}

impl Actor<u32> for EvenOnly {
    fn fire(&mut self, ctx: &ProcessContext<u32>) -> anyhow::Result<Firing> {
        let token = ctx.get("input")?;
        self.seen.lock().push(token);
        Ok(Firing::Done)
    }

    fn token_filter(&self) -> Option<Arc<dyn TokenFilter<u32>>> {
        Some(Arc::new(|_port: &str, token: &u32| token % 2 == 1))
    }
}
