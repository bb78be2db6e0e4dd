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

use std::fs;

use procnet::prelude::*;
use procnet_test::prelude::*;
use tempfile::TempDir;

mod setup;

/// Environment variables are process-wide, so every XDG scenario runs inside
/// this one test.
#[procnet_test]
fn test_configuration_loading() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    // No file: defaults.
    assert_eq!(PnConfig::load(), PnConfig::default());

    // A partial file overrides only what it names.
    let config_dir = temp_dir.path().join("procnet");
    fs::create_dir_all(&config_dir)?;
    fs::write(
        config_dir.join("config.toml"),
        r#"
        [queues]
        maximum_capacity = 128
        growth = { increment = 4 }

        [behavior]
        failure_policy = "best-effort"
        "#,
    )?;
    let config = PnConfig::load();
    assert_eq!(config.queues.initial_capacity, 1);
    assert_eq!(config.queues.ceiling(), Some(128));
    assert_eq!(config.queues.growth, CapacityGrowth::Increment(4));
    assert_eq!(config.behavior.failure_policy, FailurePolicy::BestEffort);

    // A malformed file falls back to defaults.
    fs::write(config_dir.join("config.toml"), "[queues\ninitial_capacity = ")?;
    assert_eq!(PnConfig::load(), PnConfig::default());
    assert!(PnConfig::load_from(&config_dir.join("config.toml")).is_err());

    temp_dir.close()?;
    Ok(())
}

#[procnet_test]
fn test_configured_initial_capacity_applies_to_connections() -> anyhow::Result<()> {
    let mut config = PnConfig::default();
    config.queues.initial_capacity = 5;
    let director = Director::with_config(config);

    let mut graph = Graph::new();
    graph
        .add_actor("source", from_fn(|_ctx: &ProcessContext<u32>| Ok(Firing::Done)))
        .add_actor("sink", from_fn(|_ctx: &ProcessContext<u32>| Ok(Firing::Done)))
        .connect(("source", "output"), ("sink", "input"))
        .connect_with_capacity(("source", "output"), ("sink", "input"), Capacity::Unbounded);
    director.initialize(graph)?;
    director.wait()?;

    assert_eq!(
        director.receiver("sink", "input", 0).map(|r| r.capacity()),
        Some(Capacity::Bounded(5))
    );
    assert_eq!(
        director.receiver("sink", "input", 1).map(|r| r.capacity()),
        Some(Capacity::Unbounded)
    );
    assert_eq!(director.config().queues.initial_capacity, 5);
    director.wrapup();
    assert_eq!(director.receiver_count(), 0);
    Ok(())
}
