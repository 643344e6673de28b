// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Minimal synchronization primitives used by the task/collective/pool layer.
//!
//! These are deliberately narrow slices of their source counterparts
//! (`gevent.hub.Waiter`, `gevent.event.Event`, `gevent.coros.Semaphore`/
//! `DummySemaphore`, `gevent.queue.Queue`) — just enough surface for `Task`,
//! `joinall`/`killall`, `TaskSet` and `Pool` to build on, all single-threaded
//! and built on `Rc`/`RefCell` rather than atomics, since there is exactly
//! one OS thread driving everything.

mod event;
mod queue;
mod semaphore;
mod waiter;

pub use event::Event;
pub use queue::Queue;
pub use semaphore::{DummySemaphore, Semaphore, SemaphoreLike};
pub use waiter::Waiter;
