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

use std::path::Path;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::actor::FailurePolicy;
use crate::receiver::{Capacity, CapacityGrowth};

/// Configuration for procnet directors
///
/// Loaded from TOML files in XDG-compliant directories. Every section and
/// every key is optional; missing values take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnConfig {
    /// Receiver capacity configuration
    pub queues: QueueConfig,
    /// Behavioral configuration switches
    pub behavior: BehaviorConfig,
}

/// Receiver capacity configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of a receiver whose connection declares none
    pub initial_capacity: usize,
    /// Ceiling for artificial deadlock growth; `0` disables the ceiling
    pub maximum_capacity: usize,
    /// How a receiver grows during artificial deadlock
    pub growth: CapacityGrowth,
}

/// Behavioral configuration switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Reaction to an actor failure
    pub failure_policy: FailurePolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1,
            maximum_capacity: 65_536,
            growth: CapacityGrowth::Double,
        }
    }
}

impl QueueConfig {
    /// Capacity given to a connection that declares none.
    #[must_use]
    pub const fn initial(&self) -> Capacity {
        Capacity::Bounded(self.initial_capacity)
    }

    /// The ceiling, or `None` when growth is unlimited.
    #[must_use]
    pub const fn ceiling(&self) -> Option<usize> {
        match self.maximum_capacity {
            0 => None,
            max => Some(max),
        }
    }
}

impl PnConfig {
    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `procnet/config.toml` under `$XDG_CONFIG_HOME` (falling back
    /// to `~/.config`) and then the XDG config dirs.
    ///
    /// If no configuration file is found, returns the default configuration.
    /// If a configuration file exists but is malformed, logs an error and uses defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("procnet") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            info!("Loading configuration from: {}", path.display());
            Self::load_from(&path).unwrap_or_else(|e| {
                error!("{e:#}");
                Self::default()
            })
        } else {
            info!("No configuration file found, using defaults");
            Self::default()
        }
    }

    /// Load configuration from an explicit file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid configuration.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        toml::from_str::<Self>(&config_str)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: PnConfig = PnConfig::load();
}
