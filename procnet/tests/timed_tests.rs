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

mod setup;

#[procnet_test]
fn test_model_time_advances_to_earliest_wakeup() -> anyhow::Result<()> {
    let times: Arc<Mutex<Vec<f64>>> = Arc::default();
    let late_seen: Arc<Mutex<Option<f64>>> = Arc::default();
    let ticks = Arc::clone(&times);
    let late = Arc::clone(&late_seen);

    let mut graph = Graph::new();
    graph
        .add_actor_with_iterations(
            "clock",
            from_fn(move |ctx: &ProcessContext<u32>| {
                ctx.delay(1.0)?;
                ticks.lock().push(ctx.model_time());
                Ok(Firing::Continue)
            }),
            3,
        )
        .add_actor(
            "late",
            from_fn(move |ctx: &ProcessContext<u32>| {
                ctx.delay(2.5)?;
                *late.lock() = Some(ctx.model_time());
                Ok(Firing::Done)
            }),
        );

    let director = Director::with_config(PnConfig::default());
    let report = director.run(graph)?;

    assert_eq!(*times.lock(), vec![1.0, 2.0, 3.0]);
    assert_eq!(*late_seen.lock(), Some(2.5));
    assert_eq!(report.model_time, 3.0);
    assert_eq!(director.model_time(), 3.0);
    Ok(())
}

#[procnet_test]
fn test_delayed_writer_releases_blocked_reader() -> anyhow::Result<()> {
    let received: Arc<Mutex<Option<(u32, f64)>>> = Arc::default();
    let slot = Arc::clone(&received);

    let mut graph = Graph::new();
    graph
        .add_actor(
            "writer",
            from_fn(|ctx: &ProcessContext<u32>| {
                ctx.wait_until(4.0)?;
                ctx.put("output", 42)?;
                Ok(Firing::Done)
            }),
        )
        .add_actor(
            "reader",
            from_fn(move |ctx: &ProcessContext<u32>| {
                let token = ctx.get("input")?;
                *slot.lock() = Some((token, ctx.model_time()));
                Ok(Firing::Done)
            }),
        )
        .connect(("writer", "output"), ("reader", "input"));

    let report = Director::with_config(PnConfig::default()).run(graph)?;

    assert_eq!(*received.lock(), Some((42, 4.0)));
    assert_eq!(report.capacity_increases, 0);
    Ok(())
}

#[procnet_test]
fn test_waiting_into_the_past_is_refused() -> anyhow::Result<()> {
    let errors: Arc<Mutex<Vec<String>>> = Arc::default();
    let log = Arc::clone(&errors);

    let mut graph = Graph::new();
    graph.add_actor(
        "confused",
        from_fn(move |ctx: &ProcessContext<u32>| {
            ctx.delay(2.0)?;
            for result in [ctx.wait_until(1.0), ctx.delay(f64::NAN), ctx.delay(-1.0)] {
                match result {
                    Err(PnError::InvalidState(message)) => log.lock().push(message),
                    other => anyhow::bail!("expected a refusal, got {other:?}"),
                }
            }
            ctx.wait_until(ctx.model_time())?;
            Ok(Firing::Done)
        }),
    );

    let report = Director::with_config(PnConfig::default()).run(graph)?;

    assert_eq!(errors.lock().len(), 3);
    assert_eq!(report.model_time, 2.0);
    Ok(())
}
