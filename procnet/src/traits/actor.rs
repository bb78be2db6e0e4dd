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
use std::marker::PhantomData;

use crate::actor::ProcessContext;

/// Payload carried between actors. Every network picks one token type.
pub trait Token: Clone + Send + 'static {}

impl<T> Token for T where T: Clone + Send + 'static {}

/// Returned by [`Actor::fire`] to say whether the process should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    /// Fire again.
    Continue,
    /// The actor has nothing more to do; the process finishes properly.
    Done,
}

/// Decides, before a token is queued, whether the destination actor accepts it.
///
/// A rejected token makes the writer's `put` fail with
/// [`PnError::TokenRejected`](crate::prelude::PnError::TokenRejected).
pub trait TokenFilter<T>: Send + Sync {
    /// `true` to refuse `token` arriving on the input `port`.
    fn reject(&self, port: &str, token: &T) -> bool;
}

impl<T, F> TokenFilter<T> for F
where
    F: Fn(&str, &T) -> bool + Send + Sync,
{
    fn reject(&self, port: &str, token: &T) -> bool {
        self(port, token)
    }
}

/// A unit of computation executed by its own process thread.
///
/// The process calls [`initialize`](Actor::initialize) once, then
/// [`fire`](Actor::fire) until it returns [`Firing::Done`], fails, reaches its
/// iteration limit or is terminated, and finally [`wrapup`](Actor::wrapup)
/// regardless of how the loop ended.
///
/// Receiver errors propagated with `?` keep their identity: a
/// [`PnError::TerminationRequested`](crate::prelude::PnError::TerminationRequested)
/// returned from `fire` finishes the process abruptly rather than with an
/// exception.
pub trait Actor<T: Token>: Send + 'static {
    /// Runs on the process thread before the first firing.
    fn initialize(&mut self, _ctx: &ProcessContext<T>) -> anyhow::Result<()> {
        Ok(())
    }

    /// One firing. Reads and writes go through `ctx`.
    fn fire(&mut self, ctx: &ProcessContext<T>) -> anyhow::Result<Firing>;

    /// Runs on the process thread after the last firing.
    fn wrapup(&mut self, _ctx: &ProcessContext<T>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Filter installed on every receiver feeding this actor.
    ///
    /// Queried once, when the actor is added to the network.
    fn token_filter(&self) -> Option<std::sync::Arc<dyn TokenFilter<T>>> {
        None
    }
}

/// An [`Actor`] built from a closure. See [`from_fn`].
pub struct FnActor<T, F> {
    fire: F,
    _token: PhantomData<fn() -> T>,
}

/// Wraps a firing closure into an [`Actor`] with no initialize or wrapup work.
///
/// ```rust,ignore
/// graph.add_actor("ramp", from_fn(move |ctx: &ProcessContext<u64>| {
///     ctx.put("output", ctx.iteration())?;
///     Ok(Firing::Continue)
/// }));
/// ```
pub fn from_fn<T, F>(fire: F) -> FnActor<T, F>
where
    T: Token,
    F: FnMut(&ProcessContext<T>) -> anyhow::Result<Firing> + Send + 'static,
{
    FnActor {
        fire,
        _token: PhantomData,
    }
}

impl<T, F> Actor<T> for FnActor<T, F>
where
    T: Token,
    F: FnMut(&ProcessContext<T>) -> anyhow::Result<Firing> + Send + 'static,
{
    fn fire(&mut self, ctx: &ProcessContext<T>) -> anyhow::Result<Firing> {
        (self.fire)(ctx)
    }
}

impl<T, F> fmt::Debug for FnActor<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnActor").finish_non_exhaustive()
    }
}
