// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The single-threaded cooperative event loop.
//!
//! Exposes exactly the two primitives the task layer needs: [`active_event`]
//! (run a closure on the next loop turn) and [`timer`] (run a closure after a
//! delay), both returning cancellable handles. Unlike the source's hub, which
//! is a coroutine that a stackful-coroutine `switch` suspends into, this hub
//! is driven by [`run_until`] — callers that need to "park on the hub" call
//! it with a condition closure and it pumps events/timers until the
//! condition holds (or there is nothing left to pump), the same role the
//! source's `get_hub().switch()` plays.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// Tuning knobs with no analog in the source (which hardcodes its batching);
/// supplied as ambient configuration in the teacher's style.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Maximum number of ready events drained per [`run_until`] iteration
    /// before re-checking timers. Bounds latency of newly-armed timers when
    /// the ready queue is kept continuously busy.
    pub max_events_per_tick: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_events_per_tick: 256,
        }
    }
}

struct TimerEntry {
    deadline: Instant,
    id: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.id).cmp(&(other.deadline, other.id))
    }
}

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct Inner {
    events: VecDeque<(u64, Option<Callback>)>,
    cancelled_events: HashSet<u64>,
    next_event_id: u64,
    timer_heap: BinaryHeap<Reverse<TimerEntry>>,
    timer_callbacks: std::collections::HashMap<u64, Callback>,
    next_timer_id: u64,
}

/// The hub singleton. One per OS thread; accessed through [`with`].
pub struct Hub {
    inner: RefCell<Inner>,
    config: Cell<HubConfig>,
}

impl Hub {
    fn new() -> Self {
        Self {
            inner: RefCell::new(Inner::default()),
            config: Cell::new(HubConfig::default()),
        }
    }

    pub fn set_config(&self, config: HubConfig) {
        self.config.set(config);
    }

    pub fn config(&self) -> HubConfig {
        self.config.get()
    }

    /// Schedule `f` to run at the next loop iteration. FIFO relative to
    /// other `active_event` registrations made before it fires.
    pub fn active_event(&self, f: impl FnOnce() + 'static) -> EventHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_event_id;
        inner.next_event_id += 1;
        inner.events.push_back((id, Some(Box::new(f))));
        EventHandle { id }
    }

    /// Schedule `f` to run after `delay` has elapsed.
    pub fn timer(&self, delay: Duration, f: impl FnOnce() + 'static) -> TimerHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_timer_id;
        inner.next_timer_id += 1;
        let deadline = Instant::now() + delay;
        inner.timer_heap.push(Reverse(TimerEntry { deadline, id }));
        inner.timer_callbacks.insert(id, Box::new(f));
        TimerHandle { id, deadline }
    }

    pub(crate) fn cancel_event(&self, id: u64) {
        let mut inner = self.inner.borrow_mut();
        inner.cancelled_events.insert(id);
    }

    pub(crate) fn cancel_timer(&self, id: u64) {
        let mut inner = self.inner.borrow_mut();
        inner.timer_callbacks.remove(&id);
    }

    fn fire_due_timers(&self) {
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                match inner.timer_heap.peek() {
                    Some(Reverse(entry)) if entry.deadline <= Instant::now() => {
                        let Reverse(entry) = inner.timer_heap.pop().unwrap();
                        inner.timer_callbacks.remove(&entry.id)
                    }
                    _ => None,
                }
            };
            match due {
                Some(cb) => cb(),
                None => break,
            }
        }
    }

    fn next_timer_deadline(&self) -> Option<Instant> {
        let inner = self.inner.borrow();
        // Skip timers whose callback was already cancelled/removed.
        inner
            .timer_heap
            .iter()
            .filter(|Reverse(e)| inner.timer_callbacks.contains_key(&e.id))
            .map(|Reverse(e)| e.deadline)
            .min()
    }

    fn pop_event(&self) -> Option<Callback> {
        loop {
            let mut inner = self.inner.borrow_mut();
            let (id, cb) = inner.events.pop_front()?;
            let cancelled = inner.cancelled_events.remove(&id);
            if cancelled {
                continue;
            }
            return cb;
        }
    }

    fn has_pending_events(&self) -> bool {
        !self.inner.borrow().events.is_empty()
    }

    /// Pump the event loop until `cond` returns `true`, or there is nothing
    /// left to pump (returns `false` in that case).
    pub fn run_until(&self, mut cond: impl FnMut() -> bool) -> bool {
        loop {
            if cond() {
                return true;
            }
            self.fire_due_timers();
            if cond() {
                return true;
            }

            let batch = self.config().max_events_per_tick;
            let mut ran_any = false;
            for _ in 0..batch {
                match self.pop_event() {
                    Some(cb) => {
                        cb();
                        ran_any = true;
                        if cond() {
                            return true;
                        }
                    }
                    None => break,
                }
            }
            if ran_any {
                continue;
            }

            if self.has_pending_events() {
                continue;
            }

            match self.next_timer_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                }
                None => return false,
            }
        }
    }

    /// Run every currently-ready event and due timer exactly once, without
    /// blocking for future timers. Used by tests and by callers that just
    /// want to drain the loop rather than wait for a condition.
    pub fn turn(&self) {
        self.fire_due_timers();
        while let Some(cb) = self.pop_event() {
            cb();
        }
    }
}

/// Handle to a pending `active_event` registration.
///
/// `cancel` always targets the current thread's singleton hub (see [`with`]);
/// a handle obtained from a directly constructed [`Hub`] rather than through
/// [`active_event`]/[`timer`] cannot be cancelled through this method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle {
    id: u64,
}

impl EventHandle {
    pub fn cancel(&self) {
        with(|hub| hub.cancel_event(self.id));
    }
}

/// Handle to a pending `timer` registration.
///
/// Implements [`PartialEq`]/[`Eq`] by identity so a caller can tell "my
/// timeout" apart from any other timeout that happens to fire, per the
/// source's "distinguish their timeout from a propagated one by identity
/// comparison".
#[derive(Debug, Clone, Copy)]
pub struct TimerHandle {
    id: u64,
    deadline: Instant,
}

impl TimerHandle {
    pub fn cancel(&self) {
        with(|hub| hub.cancel_timer(self.id));
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl PartialEq for TimerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for TimerHandle {}

thread_local! {
    static HUB: Hub = Hub::new();
}

/// Access the current thread's hub singleton.
pub fn with<R>(f: impl FnOnce(&Hub) -> R) -> R {
    HUB.with(f)
}

/// Convenience wrapper around [`Hub::active_event`] on the current thread's hub.
pub fn active_event(f: impl FnOnce() + 'static) -> EventHandle {
    with(|hub| hub.active_event(f))
}

/// Convenience wrapper around [`Hub::timer`] on the current thread's hub.
pub fn timer(delay: Duration, f: impl FnOnce() + 'static) -> TimerHandle {
    with(|hub| hub.timer(delay, f))
}

/// Convenience wrapper around [`Hub::run_until`] on the current thread's hub.
pub fn run_until(cond: impl FnMut() -> bool) -> bool {
    with(|hub| hub.run_until(cond))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn active_event_runs_fifo() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let hub = Hub::new();
        for i in 0..3 {
            let order = order.clone();
            hub.active_event(move || order.borrow_mut().push(i));
        }
        hub.turn();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn cancelled_event_does_not_run() {
        // `EventHandle::cancel` always targets the thread-local singleton
        // (see `with`), so it must be exercised through that singleton
        // rather than a freestanding `Hub::new()` the handle has no tie to.
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let handle = active_event(move || r.set(true));
        handle.cancel();
        with(Hub::turn);
        assert!(!ran.get());
    }

    #[test]
    fn timer_fires_after_delay() {
        let ran = Rc::new(Cell::new(false));
        let hub = Hub::new();
        let r = ran.clone();
        hub.timer(Duration::from_millis(5), move || r.set(true));
        assert!(hub.run_until(|| ran.get()));
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        // Same reasoning as `cancelled_event_does_not_run`: `TimerHandle::cancel`
        // targets the thread-local singleton, so the test must too.
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let handle = timer(Duration::from_millis(5), move || r.set(true));
        handle.cancel();
        thread::sleep(Duration::from_millis(10));
        with(Hub::turn);
        assert!(!ran.get());
    }

    #[test]
    fn run_until_returns_false_when_starved() {
        let hub = Hub::new();
        assert!(!hub.run_until(|| false));
    }

    #[test]
    fn timer_handles_compare_by_identity() {
        let hub = Hub::new();
        let a = hub.timer(Duration::from_secs(1), || {});
        let b = hub.timer(Duration::from_secs(1), || {});
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
