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

use procnet::prelude::*;
use procnet_test::prelude::*;

mod setup;

#[procnet_test]
fn test_many_writers_one_reader_lose_nothing() -> anyhow::Result<()> {
    let receiver = Arc::new(Receiver::<u32>::new(Capacity::Bounded(1)));
    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let receiver = Arc::clone(&receiver);
            thread::spawn(move || -> Result<(), PnError> {
                for value in 0..50 {
                    receiver.put(writer * 1000 + value)?;
                }
                Ok(())
            })
        })
        .collect();

    let mut received = Vec::with_capacity(200);
    for _ in 0..200 {
        received.push(receiver.get()?);
    }
    for writer in writers {
        writer.join().expect("writer thread")?;
    }

    assert!(receiver.is_empty());
    for writer in 0..4u32 {
        let from_writer: Vec<u32> = received
            .iter()
            .copied()
            .filter(|value| value / 1000 == writer)
            .collect();
        let expected: Vec<u32> = (0..50).map(|value| writer * 1000 + value).collect();
        assert_eq!(from_writer, expected, "tokens of writer {writer} out of order");
    }
    Ok(())
}

#[procnet_test]
fn test_capacity_is_never_exceeded() -> anyhow::Result<()> {
    let receiver = Arc::new(Receiver::<u32>::new(Capacity::Bounded(3)));
    let writer = {
        let receiver = Arc::clone(&receiver);
        thread::spawn(move || -> Result<(), PnError> {
            for value in 0..20 {
                receiver.put(value)?;
            }
            Ok(())
        })
    };

    let mut received = Vec::new();
    while received.len() < 20 {
        assert!(receiver.len() <= 3);
        thread::sleep(Duration::from_millis(1));
        received.push(receiver.get()?);
    }
    writer.join().expect("writer thread")?;

    assert_eq!(received, (0..20).collect::<Vec<_>>());
    Ok(())
}

#[procnet_test]
fn test_finish_releases_blocked_reader() -> anyhow::Result<()> {
    let receiver = Arc::new(Receiver::<u32>::new(Capacity::Bounded(1)));
    let reader = {
        let receiver = Arc::clone(&receiver);
        thread::spawn(move || receiver.get())
    };
    assert!(setup::eventually(|| receiver.read_blocked_count() == 1));

    receiver.request_finish();

    let outcome = reader.join().expect("reader thread");
    assert!(matches!(outcome, Err(PnError::TerminationRequested)));
    assert!(receiver.is_finished());
    assert!(matches!(receiver.put(1), Err(PnError::TerminationRequested)));
    Ok(())
}
