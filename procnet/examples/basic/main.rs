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

use procnet::prelude::*;

// actors keep their own state between firings
#[derive(Debug, Default)]
struct Squarer {
    squared: usize,
}

impl Actor<u64> for Squarer {
    fn fire(&mut self, ctx: &ProcessContext<u64>) -> anyhow::Result<Firing> {
        let value = ctx.get("input")?;
        ctx.put("output", value * value)?;
        self.squared += 1;
        Ok(Firing::Continue)
    }

    fn wrapup(&mut self, ctx: &ProcessContext<u64>) -> anyhow::Result<()> {
        println!("{} squared {} numbers", ctx.name(), self.squared);
        Ok(())
    }
}

fn main() -> Result<(), PnError> {
    let mut graph = Graph::new();
    graph
        // a closure is enough for a stateless actor
        .add_actor_with_iterations(
            "numbers",
            from_fn(|ctx: &ProcessContext<u64>| {
                ctx.put("output", ctx.iteration() + 1)?;
                Ok(Firing::Continue)
            }),
            10,
        )
        .add_actor_with_iterations("squarer", Squarer::default(), 10)
        .add_actor_with_iterations(
            "printer",
            from_fn(|ctx: &ProcessContext<u64>| {
                println!("{}", ctx.get("input")?);
                Ok(Firing::Continue)
            }),
            10,
        )
        .connect(("numbers", "output"), ("squarer", "input"))
        .connect(("squarer", "output"), ("printer", "input"));

    let director = Director::new();
    director.add_process_listener(|event: &ProcessEvent| {
        if event.state.is_finished() {
            println!("{event}");
        }
    });

    let report = director.run(graph)?;
    println!(
        "{} processes finished, {} capacity increases",
        report.processes.len(),
        report.capacity_increases
    );
    Ok(())
}
