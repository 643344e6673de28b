// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::hub;

/// A level-triggered flag: `wait()` returns immediately once `set()` has
/// been called, and blocks (by pumping the hub) while clear.
///
/// Used by [`crate::task_set::TaskSet`] as `empty_event`: set iff the set's
/// membership is empty.
#[derive(Debug, Clone)]
pub struct Event {
    flag: Rc<Cell<bool>>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Rc::new(Cell::new(false)),
        }
    }

    pub fn set(&self) {
        self.flag.set(true);
    }

    pub fn clear(&self) {
        self.flag.set(false);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.get()
    }

    /// Pump the hub until the event is set, or `timeout` elapses (returns
    /// whether the event ended up set).
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            None => {
                hub::run_until(|| self.flag.get());
                true
            }
            Some(d) => {
                let timed_out = Rc::new(Cell::new(false));
                let flag = timed_out.clone();
                let handle = hub::timer(d, move || flag.set(true));
                let flag = self.flag.clone();
                hub::run_until(|| flag.get() || timed_out.get());
                handle.cancel();
                self.flag.get()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        assert!(!Event::new().is_set());
    }

    #[test]
    fn wait_returns_immediately_once_set() {
        let e = Event::new();
        e.set();
        assert!(e.wait(None));
    }

    #[test]
    fn wait_times_out_while_clear() {
        let e = Event::new();
        assert!(!e.wait(Some(Duration::from_millis(5))));
    }

    #[test]
    fn wait_wakes_on_later_set() {
        let e = Event::new();
        let e2 = e.clone();
        hub::active_event(move || e2.set());
        assert!(e.wait(None));
    }
}
