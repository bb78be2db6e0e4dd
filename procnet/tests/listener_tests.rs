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

use crate::setup::actors::{Collector, Producer};
use crate::setup::listeners::{Fragile, Grumpy, ProcessLog};

mod setup;

fn small_pipeline() -> (Graph<u32>, Arc<Mutex<Vec<u32>>>) {
    let (collector, seen) = Collector::new(2);
    let mut graph = Graph::new();
    graph
        .add_actor("source", Producer::new([1, 2]))
        .add_actor("sink", collector)
        .connect(("source", "output"), ("sink", "input"));
    (graph, seen)
}

#[procnet_test]
fn test_faulty_listeners_are_isolated() -> anyhow::Result<()> {
    let director = Director::with_config(PnConfig::default());
    director.add_process_listener(Grumpy);
    director.add_process_listener(Fragile);
    let processes = ProcessLog::default();
    processes.attach(&director);

    let (graph, seen) = small_pipeline();
    let report = director.run(graph)?;

    assert_eq!(*seen.lock(), vec![1, 2]);
    assert!(report.failures.is_empty());
    assert!(processes.saw("source", ProcessState::Finished(FinishCause::Properly)));
    assert!(processes.saw("sink", ProcessState::Finished(FinishCause::Properly)));
    Ok(())
}

#[procnet_test]
fn test_removed_listener_hears_nothing() -> anyhow::Result<()> {
    let director = Director::with_config(PnConfig::default());
    let processes = ProcessLog::default();
    let id = processes.attach(&director);
    assert!(director.remove_process_listener(id));
    assert!(!director.remove_process_listener(id));

    let (graph, _seen) = small_pipeline();
    director.run(graph)?;

    assert!(processes.states_of("source").is_empty());
    Ok(())
}

#[procnet_test]
fn test_listeners_run_in_registration_order() -> anyhow::Result<()> {
    let director = Director::with_config(PnConfig::default());
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    for label in ["first", "second"] {
        let order = Arc::clone(&order);
        director.add_process_listener(move |event: &ProcessEvent| {
            if &*event.actor_name == "sink" && event.state.is_finished() {
                order.lock().push(label);
            }
        });
    }

    let (graph, _seen) = small_pipeline();
    director.run(graph)?;

    assert_eq!(*order.lock(), vec!["first", "second"]);
    Ok(())
}

#[procnet_test]
fn test_failure_is_attached_to_the_event() -> anyhow::Result<()> {
    let director = Director::with_config(crate::setup::config(0, FailurePolicy::BestEffort));
    let failures: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&failures);
    director.add_process_listener(move |event: &ProcessEvent| {
        if event.failure.is_some() {
            sink.lock().push(event.to_string());
        }
    });

    let mut graph = Graph::new();
    graph.add_actor("faulty", crate::setup::actors::Faulty);
    director.run(graph)?;

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("FINISHED_WITH_EXCEPTION"), "{}", failures[0]);
    assert!(failures[0].contains("sensor offline"));
    Ok(())
}
