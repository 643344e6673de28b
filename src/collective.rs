// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Free functions operating on a collection of tasks at once.
//!
//! Mirrors `gevent.joinall`/`gevent.killall`: convenience wrappers around
//! [`crate::sync::Queue`] (for `joinall`, matching the source's "register
//! `q.put` as a rawlink on everything and pull `len(tasks)` items off `q`")
//! and repeated [`crate::task::Task::kill`] (for `killall`).

use std::time::Duration;

use crate::error::{TaskError, TaskExit};
use crate::hub;
use crate::sync::Queue;
use crate::task::Task;

/// Wait for every task in `tasks` to terminate, or until `timeout` elapses.
///
/// Returns the tasks that are *not yet* done (empty if all finished in
/// time), matching the source's `joinall` returning the not-yet-ready
/// subset rather than raising on a timeout by default. When `raise_error`
/// is set, the first member's failure (in `tasks` order) is re-raised as
/// an `Err` once every completion has been drained and every `rawlink`
/// unregistered, rather than being silently folded into the "not done"
/// set.
pub fn joinall<T: 'static>(
    tasks: &[Task<T>],
    timeout: Option<Duration>,
    raise_error: bool,
) -> Result<Vec<Task<T>>, TaskError> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }
    let queue: Queue<()> = Queue::new();
    let mut link_ids = Vec::with_capacity(tasks.len());
    for t in tasks {
        let q = queue.clone();
        link_ids.push(t.rawlink(move |_| q.put(())));
    }

    let remaining = tasks.len();
    let deadline_flag = timeout.map(|d| {
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let f = flag.clone();
        (hub::timer(d, move || f.set(true)), flag)
    });

    let mut delivered = 0;
    loop {
        if delivered >= remaining {
            break;
        }
        if deadline_flag.as_ref().is_some_and(|(_, f)| f.get()) {
            break;
        }
        let flag = deadline_flag.as_ref().map(|(_, f)| f.clone());
        let pumped = hub::run_until(|| {
            !queue.is_empty() || flag.as_ref().is_some_and(|f| f.get())
        });
        while queue.try_get().is_some() {
            delivered += 1;
        }
        if !pumped {
            break;
        }
        if deadline_flag.as_ref().is_some_and(|(_, f)| f.get()) {
            break;
        }
    }
    if let Some((handle, _)) = deadline_flag {
        handle.cancel();
    }

    for (t, id) in tasks.iter().zip(link_ids) {
        t.unlink(id);
    }

    if raise_error {
        for t in tasks {
            if let Some(e) = t.exception() {
                return Err(e);
            }
        }
    }

    Ok(tasks.iter().filter(|t| !t.ready()).cloned().collect())
}

/// Kill every task in `tasks` with `exc` (default [`TaskExit::new`]),
/// waiting for all of them to terminate when `block` is true.
pub fn killall<T: 'static>(
    tasks: &[Task<T>],
    exc: impl Fn() -> TaskExit,
    block: bool,
    timeout: Option<Duration>,
) {
    for t in tasks {
        t.kill(exc(), false, None);
    }
    if block {
        // `raise_error: false` never constructs an `Err`; this can't fail.
        let _ = joinall(tasks, timeout, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[test]
    fn joinall_waits_for_everything() {
        let a = Task::spawn(|| 1);
        let b = Task::spawn(|| 2);
        let remaining = joinall(&[a.clone(), b.clone()], None, false).unwrap();
        assert!(remaining.is_empty());
        assert!(a.ready() && b.ready());
    }

    #[test]
    fn joinall_returns_unfinished_on_timeout() {
        let waiter: crate::sync::Waiter<()> = crate::sync::Waiter::new();
        let w = waiter.clone();
        let stuck: Task<()> = Task::spawn(move || w.wait());
        let remaining = joinall(&[stuck.clone()], Some(Duration::from_millis(5)), false).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn joinall_raise_error_reraises_first_failure() {
        let ok: Task<u32> = Task::spawn(|| 1);
        let bad: Task<u32> = Task::spawn(|| panic!("boom"));
        let err = joinall(&[ok.clone(), bad.clone()], None, true).unwrap_err();
        assert!(matches!(err, TaskError::Panic(_)));
    }

    #[test]
    fn joinall_without_raise_error_returns_normally_despite_failure() {
        let ok: Task<u32> = Task::spawn(|| 1);
        let bad: Task<u32> = Task::spawn(|| panic!("boom"));
        let remaining = joinall(&[ok.clone(), bad.clone()], None, false).unwrap();
        assert!(remaining.is_empty());
        assert!(bad.exception().is_some());
    }

    #[test]
    fn killall_terminates_everything() {
        let waiter: crate::sync::Waiter<()> = crate::sync::Waiter::new();
        let w = waiter.clone();
        let a: Task<()> = Task::spawn(move || w.wait());
        let b: Task<()> = Task::spawn(|| ());
        killall(&[a.clone(), b.clone()], TaskExit::new, true, None);
        assert!(a.dead() && b.dead());
        assert!(a.successful());
    }
}
