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

use parking_lot::Mutex;
use procnet::prelude::*;
use procnet_test::prelude::*;

use crate::setup::config;
use crate::setup::listeners::ReceiverLog;

mod setup;

/// Writes `count` tokens to `data`, then one to `signal`.
fn burst_writer(count: u32) -> impl Actor<u32> {
    from_fn(move |ctx: &ProcessContext<u32>| {
        for value in 0..count {
            ctx.put("data", value)?;
        }
        ctx.put("signal", 99)?;
        Ok(Firing::Done)
    })
}

/// Waits for `signal`, then drains `count` tokens from `data`.
fn signal_first_reader(count: u32, seen: Arc<Mutex<Vec<u32>>>) -> impl Actor<u32> {
    from_fn(move |ctx: &ProcessContext<u32>| {
        ctx.get("signal")?;
        for _ in 0..count {
            seen.lock().push(ctx.get("data")?);
        }
        Ok(Firing::Done)
    })
}

fn burst_graph(count: u32, data_capacity: Capacity) -> (Graph<u32>, Arc<Mutex<Vec<u32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut graph = Graph::new();
    graph
        .add_actor("writer", burst_writer(count))
        .add_actor("reader", signal_first_reader(count, Arc::clone(&seen)))
        .connect_with_capacity(("writer", "data"), ("reader", "data"), data_capacity)
        .connect(("writer", "signal"), ("reader", "signal"));
    (graph, seen)
}

fn ping_pong() -> impl Actor<u32> {
    from_fn(|ctx: &ProcessContext<u32>| {
        let token = ctx.get("input")?;
        ctx.put("output", token + 1)?;
        Ok(Firing::Continue)
    })
}

#[procnet_test]
fn test_read_cycle_is_a_real_deadlock() -> anyhow::Result<()> {
    let director = Director::with_config(PnConfig::default());
    let mut graph = Graph::new();
    graph
        .add_actor("ping", ping_pong())
        .add_actor("pong", ping_pong())
        .connect(("ping", "output"), ("pong", "input"))
        .connect(("pong", "output"), ("ping", "input"));
    director.initialize(graph)?;

    let Err(PnError::Deadlock(report)) = director.wait() else {
        panic!("expected a deadlock");
    };
    assert_eq!(report.kind, DeadlockKind::Read);
    assert_eq!(report.blocked.len(), 2);
    assert!(report
        .blocked
        .iter()
        .all(|blocked| blocked.cause == BlockCause::OnRead && blocked.receiver.is_some()));
    assert_eq!(
        director.process_state("ping"),
        Some(ProcessState::Finished(FinishCause::Abruptly))
    );
    director.wrapup();
    Ok(())
}

#[procnet_test]
fn test_artificial_deadlock_grows_smallest_receiver() -> anyhow::Result<()> {
    let director = Director::with_config(PnConfig::default());
    let actions = ReceiverLog::default();
    actions.attach(&director);
    let (graph, seen) = burst_graph(4, Capacity::Bounded(1));
    director.initialize(graph)?;

    let report = director.wait()?;

    assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    assert_eq!(report.capacity_increases, 2);
    assert_eq!(actions.count(ReceiverAction::CapacityIncreased), 2);
    let data = director
        .receiver("reader", "data", 0)
        .expect("data receiver");
    assert_eq!(data.capacity(), Capacity::Bounded(4));
    director.wrapup();
    Ok(())
}

#[procnet_test]
fn test_rendezvous_grows_to_one() -> anyhow::Result<()> {
    let (graph, seen) = burst_graph(1, Capacity::Bounded(0));
    let report = Director::with_config(PnConfig::default()).run(graph)?;

    assert_eq!(*seen.lock(), vec![0]);
    assert_eq!(report.capacity_increases, 1);
    Ok(())
}

#[procnet_test]
fn test_growth_past_ceiling_is_a_real_deadlock() -> anyhow::Result<()> {
    let director = Director::with_config(config(2, FailurePolicy::FailFast));
    let (graph, _seen) = burst_graph(4, Capacity::Bounded(1));

    let Err(PnError::Deadlock(report)) = director.run(graph) else {
        panic!("expected a deadlock");
    };
    assert_eq!(
        report.kind,
        DeadlockKind::CapacityCeiling {
            receiver: "reader.data[0]".into(),
            capacity: 2,
            requested: 4,
            maximum: 2,
        }
    );
    assert!(report
        .blocked
        .iter()
        .any(|blocked| blocked.actor == "writer" && blocked.cause == BlockCause::OnWrite));
    Ok(())
}

#[procnet_test]
fn test_fixed_increment_growth() -> anyhow::Result<()> {
    let mut config = PnConfig::default();
    config.queues.growth = CapacityGrowth::Increment(3);
    let director = Director::with_config(config);
    let (graph, seen) = burst_graph(5, Capacity::Bounded(1));
    director.initialize(graph)?;

    let report = director.wait()?;

    assert_eq!(seen.lock().len(), 5);
    assert_eq!(report.capacity_increases, 2);
    assert_eq!(
        director.receiver("reader", "data", 0).map(|r| r.capacity()),
        Some(Capacity::Bounded(7))
    );
    director.wrapup();
    Ok(())
}
