// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Membership tracking over a group of same-typed tasks, with completion
//! signaling and multiprocessing-style collective calls.
//!
//! Grounded on `gevent.pool.Group`/`gevent.pool.GroupMappingMixin`: a
//! membership set plus a "being-killed" set plus a level-triggered
//! `empty_event`, with `apply`/`map`/`imap` family built on top of
//! `spawn`+`join`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::collective::joinall;
use crate::error::{TaskError, TaskExit};
use crate::sync::{Event, Queue};
use crate::task::Task;

struct Inner<T> {
    members: RefCell<HashMap<u64, Task<T>>>,
    dying: RefCell<HashSet<u64>>,
    empty_event: Event,
}

/// An unordered group of `Task<T>` with aggregate join/kill and
/// multiprocessing-style `apply`/`map`/`imap` helpers.
///
/// Monomorphized per output type `T`, since Rust collections are
/// homogeneous: one `TaskSet<T>` runs one function's worth of work.
pub struct TaskSet<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for TaskSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for TaskSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> TaskSet<T> {
    #[must_use]
    pub fn new() -> Self {
        let empty_event = Event::new();
        empty_event.set();
        Self {
            inner: Rc::new(Inner {
                members: RefCell::new(HashMap::new()),
                dying: RefCell::new(HashSet::new()),
                empty_event,
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.members.borrow().is_empty()
    }

    #[must_use]
    pub fn contains(&self, task: &Task<T>) -> bool {
        self.inner.members.borrow().contains_key(&task.id())
    }

    fn snapshot(&self) -> Vec<Task<T>> {
        self.inner.members.borrow().values().cloned().collect()
    }

    /// Add `task` to the set, registering a link that removes it again once
    /// it terminates so membership always reflects "still running".
    pub fn add(&self, task: &Task<T>) {
        let id = task.id();
        if self.inner.members.borrow_mut().insert(id, task.clone()).is_some() {
            return;
        }
        self.inner.empty_event.clear();
        let this = self.clone();
        let t = task.clone();
        task.rawlink(move |_| this.discard(&t));
    }

    /// Remove `task` from the set. Returns whether it was actually a member.
    pub fn discard(&self, task: &Task<T>) -> bool {
        let id = task.id();
        let removed = self.inner.members.borrow_mut().remove(&id).is_some();
        self.inner.dying.borrow_mut().remove(&id);
        if self.inner.members.borrow().is_empty() {
            self.inner.empty_event.set();
        }
        removed
    }

    /// Start `task` (if not already started) and add it to the set.
    pub fn start(&self, task: &Task<T>) {
        task.start();
        self.add(task);
    }

    /// Construct, start and add a task running `body`.
    pub fn spawn(&self, body: impl FnOnce() -> T + 'static) -> Task<T> {
        let t = Task::spawn(body);
        self.add(&t);
        t
    }

    /// Like [`TaskSet::spawn`], additionally linking the new task to
    /// `target` for any outcome. The source links to "whichever greenlet is
    /// current"; this crate has no such ambient registry, so the caller
    /// supplies the link target explicitly.
    pub fn spawn_link<U: 'static>(
        &self,
        target: &Task<U>,
        body: impl FnOnce() -> T + 'static,
    ) -> Task<T> {
        let t = Task::spawn(body);
        t.link_task(target);
        self.add(&t);
        t
    }

    pub fn spawn_link_value<U: 'static>(
        &self,
        target: &Task<U>,
        body: impl FnOnce() -> T + 'static,
    ) -> Task<T> {
        let t = Task::spawn(body);
        t.link_value_task(target);
        self.add(&t);
        t
    }

    pub fn spawn_link_exception<U: 'static>(
        &self,
        target: &Task<U>,
        body: impl FnOnce() -> T + 'static,
    ) -> Task<T> {
        let t = Task::spawn(body);
        t.link_exception_task(target);
        self.add(&t);
        t
    }

    /// Wait for the set to become empty, or for `timeout` to elapse.
    /// When `raise_error` is set, re-raises the first failed member's error
    /// (from a snapshot taken before waiting).
    pub fn join(&self, timeout: Option<Duration>, raise_error: bool) -> Result<bool, TaskError> {
        let snapshot = self.snapshot();
        let settled = self.inner.empty_event.wait(timeout);
        if raise_error {
            for t in &snapshot {
                if let Some(e) = t.exception() {
                    return Err(e);
                }
            }
        }
        Ok(settled)
    }

    /// Kill every member not already being killed, repeating to cover tasks
    /// spawned during the kill (e.g. from a link callback), until the set is
    /// empty or `timeout` elapses.
    pub fn kill(&self, exc: impl Fn() -> TaskExit, block: bool, timeout: Option<Duration>) {
        loop {
            let targets: Vec<Task<T>> = {
                let members = self.inner.members.borrow();
                let dying = self.inner.dying.borrow();
                members
                    .iter()
                    .filter(|(id, _)| !dying.contains(id))
                    .map(|(_, t)| t.clone())
                    .collect()
            };
            if targets.is_empty() {
                break;
            }
            for t in &targets {
                self.inner.dying.borrow_mut().insert(t.id());
                t.kill(exc(), false, None);
            }
            if !block {
                break;
            }
            // `raise_error: false` never constructs an `Err`; this can't fail.
            let _ = joinall(&targets, timeout, false);
            if self.is_empty() {
                break;
            }
        }
    }

    /// Kill a single member, guarded by membership and the "being killed"
    /// set so a concurrent [`TaskSet::kill`] does not double-kill it.
    pub fn killone(
        &self,
        task: &Task<T>,
        exc: impl Fn() -> TaskExit,
        block: bool,
        timeout: Option<Duration>,
    ) {
        if !self.contains(task) || self.inner.dying.borrow().contains(&task.id()) {
            return;
        }
        self.inner.dying.borrow_mut().insert(task.id());
        task.kill(exc(), block, timeout);
    }

    /// Spawn `body` and block for its result. The source bypasses spawning
    /// entirely when the calling greenlet is already a member of the group;
    /// this crate has no ambient "current task" registry (see link module),
    /// so `apply` always spawns.
    pub fn apply(&self, body: impl FnOnce() -> T + 'static) -> Result<T, TaskError>
    where
        T: Clone,
    {
        let t = self.spawn(body);
        t.join(None);
        t.exception().map_or_else(|| Ok(value_of(&t)), Err)
    }

    /// Non-blocking variant: spawn and return the handle immediately.
    pub fn apply_async(&self, body: impl FnOnce() -> T + 'static) -> Task<T> {
        self.spawn(body)
    }

    /// Like [`TaskSet::apply_async`], invoking `cb` with the result once the
    /// task succeeds.
    pub fn apply_cb(
        &self,
        body: impl FnOnce() -> T + 'static,
        cb: impl FnOnce(T) + 'static,
    ) -> Task<T>
    where
        T: Clone,
    {
        let t = self.spawn(body);
        t.link_value(move |task| {
            if let Some(v) = task.try_get().and_then(Result::ok).and_then(crate::task::GetOutcome::into_value) {
                cb(v);
            }
        });
        t
    }

    /// Spawn one task per item, block for all results, in input order.
    /// Propagates the first member's error, matching the source iterating
    /// results in submission order.
    pub fn map<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I>,
        f: impl Fn(I) -> T + Clone + 'static,
    ) -> Result<Vec<T>, TaskError>
    where
        T: Clone,
    {
        let tasks: Vec<Task<T>> = items
            .into_iter()
            .map(|item| {
                let f = f.clone();
                self.spawn(move || f(item))
            })
            .collect();
        // `raise_error: false` never constructs an `Err`; this can't fail.
        let _ = joinall(&tasks, None, false);
        let mut out = Vec::with_capacity(tasks.len());
        for t in &tasks {
            match t.exception() {
                Some(e) => return Err(e),
                None => out.push(value_of(t)),
            }
        }
        Ok(out)
    }

    /// Asynchronous variant of [`TaskSet::map`]: the whole map runs inside
    /// one task, whose result is the collected `Vec<T>`.
    pub fn map_async<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I> + 'static,
        f: impl Fn(I) -> T + Clone + 'static,
    ) -> Task<Vec<T>>
    where
        T: Clone,
    {
        let this = self.clone();
        Task::spawn(move || this.map(items, f).unwrap_or_default())
    }

    /// Like [`TaskSet::map_async`], invoking `cb` with the collected results.
    pub fn map_cb<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I> + 'static,
        f: impl Fn(I) -> T + Clone + 'static,
        cb: impl FnOnce(Vec<T>) + 'static,
    ) -> Task<Vec<T>>
    where
        T: Clone,
    {
        let t = self.map_async(items, f);
        t.link_value(move |task| {
            if let Some(v) = task
                .try_get()
                .and_then(Result::ok)
                .and_then(crate::task::GetOutcome::into_value)
            {
                cb(v);
            }
        });
        t
    }

    /// Stream results as each item's task completes, in **input order**:
    /// blocks only until the next-expected item is ready, buffering any
    /// that finish earlier, rather than waiting for every item up front.
    pub fn imap<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I>,
        f: impl Fn(I) -> T + Clone + 'static,
    ) -> Imap<T>
    where
        T: Clone,
    {
        let queue: Queue<(usize, T)> = Queue::new();
        let mut count = 0;
        for (index, item) in items.into_iter().enumerate() {
            let f = f.clone();
            let q = queue.clone();
            let t = self.spawn(move || f(item));
            t.rawlink(move |task| {
                if let Some(v) = task
                    .try_get()
                    .and_then(Result::ok)
                    .and_then(crate::task::GetOutcome::into_value)
                {
                    q.put((index, v));
                }
            });
            count += 1;
        }
        Imap::new(queue, count)
    }

    /// Like [`TaskSet::imap`], but yields results in **completion order**
    /// instead of input order.
    pub fn imap_unordered<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I>,
        f: impl Fn(I) -> T + Clone + 'static,
    ) -> ImapUnordered<T>
    where
        T: Clone,
    {
        let queue: Queue<T> = Queue::new();
        let mut count = 0;
        for item in items {
            let f = f.clone();
            let q = queue.clone();
            let t = self.spawn(move || f(item));
            t.rawlink(move |task| {
                if let Some(v) = task
                    .try_get()
                    .and_then(Result::ok)
                    .and_then(crate::task::GetOutcome::into_value)
                {
                    q.put(v);
                }
            });
            count += 1;
        }
        ImapUnordered::new(queue, count)
    }

    /// `TaskSet` is unbounded; always `false`. Overridden by [`crate::pool::Pool`].
    #[must_use]
    pub fn full(&self) -> bool {
        false
    }

    /// No-op for an unbounded set; overridden by [`crate::pool::Pool`].
    pub fn wait_available(&self) {}
}

fn value_of<T: Clone + 'static>(t: &Task<T>) -> T {
    match t.try_get() {
        Some(Ok(outcome)) => outcome
            .into_value()
            .expect("caller already checked exception() is None"),
        _ => panic!("value_of called on a task with no successful value"),
    }
}

/// Order-preserving streaming iterator returned by [`TaskSet::imap`].
pub struct Imap<T> {
    queue: Queue<(usize, T)>,
    buffer: HashMap<usize, T>,
    next_index: usize,
    remaining: usize,
}

impl<T> Imap<T> {
    pub(crate) fn new(queue: Queue<(usize, T)>, remaining: usize) -> Self {
        Self {
            queue,
            buffer: HashMap::new(),
            next_index: 0,
            remaining,
        }
    }
}

impl<T> Iterator for Imap<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.next_index >= self.remaining {
            return None;
        }
        loop {
            if let Some(v) = self.buffer.remove(&self.next_index) {
                self.next_index += 1;
                return Some(v);
            }
            let (index, value) = self.queue.get();
            self.buffer.insert(index, value);
        }
    }
}

/// Completion-order streaming iterator returned by [`TaskSet::imap_unordered`].
pub struct ImapUnordered<T> {
    queue: Queue<T>,
    remaining: usize,
}

impl<T> ImapUnordered<T> {
    pub(crate) fn new(queue: Queue<T>, remaining: usize) -> Self {
        Self { queue, remaining }
    }
}

impl<T> Iterator for ImapUnordered<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.queue.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskExit;

    #[test]
    fn spawn_adds_and_self_removes() {
        let set: TaskSet<u32> = TaskSet::new();
        let t = set.spawn(|| 1);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&t));
        set.join(None, false).unwrap();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn join_raises_first_error() {
        let set: TaskSet<u32> = TaskSet::new();
        set.spawn(|| 1);
        set.spawn(|| panic!("boom"));
        let err = set.join(None, true).unwrap_err();
        assert!(matches!(err, TaskError::Panic(_)));
    }

    #[test]
    fn map_collects_in_order() {
        let set: TaskSet<u32> = TaskSet::new();
        let result = set.map(0..5, |x| x * 2).unwrap();
        assert_eq!(result, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn imap_unordered_yields_all_values() {
        let set: TaskSet<u32> = TaskSet::new();
        let mut got: Vec<u32> = set.imap_unordered(0..4, |x| x * x).collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 4, 9]);
    }

    #[test]
    fn imap_preserves_input_order() {
        let set: TaskSet<u32> = TaskSet::new();
        let got: Vec<u32> = set.imap(0..4, |x| x * x).collect();
        assert_eq!(got, vec![0, 1, 4, 9]);
    }

    #[test]
    fn kill_empties_the_set() {
        let set: TaskSet<()> = TaskSet::new();
        let waiter: crate::sync::Waiter<()> = crate::sync::Waiter::new();
        let w = waiter.clone();
        set.spawn(move || w.wait());
        set.kill(TaskExit::new, true, None);
        assert!(set.is_empty());
    }

    #[test]
    fn full_and_wait_available_are_trivial() {
        let set: TaskSet<u32> = TaskSet::new();
        assert!(!set.full());
        set.wait_available();
    }
}
