// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::hub;

/// A one-shot value handoff driven by the hub's run loop.
///
/// Stands in for the source's `gevent.hub.Waiter`: one side calls
/// [`Waiter::switch`] from inside a hub event, the other calls
/// [`Waiter::wait`], which pumps the hub until a value has been switched in.
#[derive(Debug)]
pub struct Waiter<T = ()> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Default for Waiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Waiter<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }

    /// Deliver `value` to whoever is waiting. Idempotent-but-last-write-wins
    /// if called more than once (the source assumes single delivery too).
    pub fn switch(&self, value: T) {
        *self.slot.borrow_mut() = Some(value);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Pump the hub until a value has been switched in, then return it.
    pub fn wait(&self) -> T {
        loop {
            hub::run_until(|| self.slot.borrow().is_some());
            if let Some(v) = self.slot.borrow_mut().take() {
                return v;
            }
            // Hub ran dry before anything was switched in; keep waiting
            // rather than treating a starved pump as "delivered".
        }
    }

    /// Like [`Waiter::wait`] but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Option<Duration>) -> Option<T> {
        let Some(timeout) = timeout else {
            return Some(self.wait());
        };
        let timed_out = Rc::new(RefCell::new(false));
        let flag = timed_out.clone();
        let handle = hub::timer(timeout, move || *flag.borrow_mut() = true);
        let ready = hub::run_until(|| self.slot.borrow().is_some() || *timed_out.borrow());
        handle.cancel();
        if !ready {
            return None;
        }
        self.slot.borrow_mut().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_then_wait_returns_value() {
        let w = Waiter::new();
        w.switch(42);
        assert_eq!(w.wait(), 42);
    }

    #[test]
    fn wait_blocks_until_switched_via_event() {
        let w = Waiter::new();
        let w2 = w.clone();
        hub::active_event(move || w2.switch("done"));
        assert_eq!(w.wait(), "done");
    }

    #[test]
    fn wait_timeout_returns_none_on_expiry() {
        let w: Waiter<()> = Waiter::new();
        let result = w.wait_timeout(Some(Duration::from_millis(5)));
        assert!(result.is_none());
    }

    #[test]
    fn wait_timeout_returns_some_on_delivery() {
        let w = Waiter::new();
        w.switch(7);
        assert_eq!(w.wait_timeout(Some(Duration::from_secs(1))), Some(7));
    }
}
