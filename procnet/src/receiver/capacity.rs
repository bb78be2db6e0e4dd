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

use serde::{Deserialize, Serialize};

/// How many tokens a receiver may hold.
///
/// `Bounded(0)` is a rendezvous: a writer completes only when a reader takes
/// its token directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capacity {
    /// At most `n` queued tokens.
    Bounded(usize),
    /// No limit; writers never block.
    Unbounded,
}

impl Capacity {
    /// Whether one more token may be queued when `len` are already queued.
    #[must_use]
    pub const fn admits(&self, len: usize) -> bool {
        match self {
            Self::Bounded(n) => len < *n,
            Self::Unbounded => true,
        }
    }

    /// Whether `len` queued tokens fit within this capacity.
    #[must_use]
    pub const fn can_hold(&self, len: usize) -> bool {
        match self {
            Self::Bounded(n) => len <= *n,
            Self::Unbounded => true,
        }
    }

    /// Whether this capacity holds more tokens than `other`.
    #[must_use]
    pub const fn exceeds(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unbounded, Self::Bounded(_)) => true,
            (Self::Bounded(a), Self::Bounded(b)) => *a > *b,
            _ => false,
        }
    }

    /// The bound, or `None` when unbounded.
    #[must_use]
    pub const fn bounded(&self) -> Option<usize> {
        match self {
            Self::Bounded(n) => Some(*n),
            Self::Unbounded => None,
        }
    }
}

impl From<usize> for Capacity {
    fn from(n: usize) -> Self {
        Self::Bounded(n)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{n}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Rule used by the director to enlarge a receiver during artificial
/// deadlock.
///
/// In TOML this is either `growth = "double"` or `growth = { increment = 4 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityGrowth {
    /// Double the current capacity.
    #[default]
    Double,
    /// Add a fixed number of slots. A step of zero is treated as one.
    Increment(usize),
}

impl CapacityGrowth {
    /// The capacity that follows `current`. Zero always grows to one.
    #[must_use]
    pub fn next(&self, current: usize) -> usize {
        if current == 0 {
            return 1;
        }
        match self {
            Self::Double => current.saturating_mul(2),
            Self::Increment(step) => current.saturating_add((*step).max(1)),
        }
    }
}
