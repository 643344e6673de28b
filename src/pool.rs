// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A [`crate::task_set::TaskSet`] with bounded admission.
//!
//! Grounded on `gevent.pool.Pool`: a `TaskSet` plus a counting semaphore
//! (or a no-op [`DummySemaphore`] when unbounded) acquired before a task is
//! admitted and released once it terminates.

use std::rc::Rc;
use std::time::Duration;

use crate::error::{PoolError, TaskError, TaskExit};
use crate::sync::{DummySemaphore, Semaphore, SemaphoreLike};
use crate::task::Task;
use crate::task_set::{Imap, ImapUnordered, TaskSet};

pub struct Pool<T> {
    set: TaskSet<T>,
    semaphore: Rc<dyn SemaphoreLike>,
    size: Option<usize>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
            semaphore: self.semaphore.clone(),
            size: self.size,
        }
    }
}

impl<T: 'static> Pool<T> {
    /// `size = None` is unbounded (gated by a [`DummySemaphore`] that never
    /// blocks); `Some(n)` bounds concurrent membership to `n`. A negative
    /// `size` is rejected rather than silently clamped.
    pub fn new(size: Option<i64>) -> Result<Self, PoolError> {
        let size = match size {
            None => None,
            Some(n) if n >= 0 => Some(n as usize),
            Some(n) => return Err(PoolError::InvalidSize(n)),
        };
        let semaphore: Rc<dyn SemaphoreLike> = match size {
            Some(n) => Rc::new(Semaphore::new(n)),
            None => Rc::new(DummySemaphore),
        };
        Ok(Self {
            set: TaskSet::new(),
            semaphore,
            size,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    #[must_use]
    pub fn contains(&self, task: &Task<T>) -> bool {
        self.set.contains(task)
    }

    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// Number of permits immediately available (`1` when unbounded).
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.semaphore.free_count()
    }

    #[must_use]
    pub fn full(&self) -> bool {
        self.free_count() == 0
    }

    /// Block (without consuming a permit) until at least one is free.
    pub fn wait_available(&self) {
        self.semaphore.wait_available();
    }

    /// Acquire a permit, add `task` to the set, and release the permit once
    /// it terminates. Blocks if the pool is already full.
    fn admit(&self, task: &Task<T>) {
        self.semaphore.acquire();
        self.set.add(task);
        let sem = self.semaphore.clone();
        task.rawlink(move |_| sem.release());
    }

    /// Acquire a permit (blocking if full), then start `task`.
    pub fn start(&self, task: &Task<T>) {
        self.admit(task);
        task.start();
    }

    /// Acquire a permit (blocking if full), then construct and start a task
    /// running `body`.
    pub fn spawn(&self, body: impl FnOnce() -> T + 'static) -> Task<T> {
        let t = Task::new(body);
        self.admit(&t);
        t.start();
        t
    }

    pub fn spawn_link<U: 'static>(
        &self,
        target: &Task<U>,
        body: impl FnOnce() -> T + 'static,
    ) -> Task<T> {
        let t = Task::new(body);
        t.link_task(target);
        self.admit(&t);
        t.start();
        t
    }

    pub fn spawn_link_value<U: 'static>(
        &self,
        target: &Task<U>,
        body: impl FnOnce() -> T + 'static,
    ) -> Task<T> {
        let t = Task::new(body);
        t.link_value_task(target);
        self.admit(&t);
        t.start();
        t
    }

    pub fn spawn_link_exception<U: 'static>(
        &self,
        target: &Task<U>,
        body: impl FnOnce() -> T + 'static,
    ) -> Task<T> {
        let t = Task::new(body);
        t.link_exception_task(target);
        self.admit(&t);
        t.start();
        t
    }

    pub fn join(&self, timeout: Option<Duration>, raise_error: bool) -> Result<bool, TaskError> {
        self.set.join(timeout, raise_error)
    }

    pub fn kill(&self, exc: impl Fn() -> TaskExit, block: bool, timeout: Option<Duration>) {
        self.set.kill(exc, block, timeout);
    }

    pub fn killone(
        &self,
        task: &Task<T>,
        exc: impl Fn() -> TaskExit,
        block: bool,
        timeout: Option<Duration>,
    ) {
        self.set.killone(task, exc, block, timeout);
    }

    pub fn apply(&self, body: impl FnOnce() -> T + 'static) -> Result<T, TaskError>
    where
        T: Clone,
    {
        let t = self.spawn(body);
        t.join(None);
        t.exception()
            .map_or_else(|| Ok(value_of(&t)), Err)
    }

    /// Like [`TaskSet::apply_async`], but when the pool is already
    /// [`Pool::full`] the admission itself (the semaphore wait) happens
    /// inside the returned task's own body instead of blocking this call,
    /// so the caller never stalls synchronously on a full pool.
    pub fn apply_async(&self, body: impl FnOnce() -> T + 'static) -> Task<T> {
        if !self.full() {
            return self.spawn(body);
        }
        let sem = self.semaphore.clone();
        let release = sem.clone();
        let t: Task<T> = Task::new(move || {
            sem.acquire();
            body()
        });
        self.set.add(&t);
        t.rawlink(move |_| release.release());
        t.start();
        t
    }

    pub fn apply_cb(
        &self,
        body: impl FnOnce() -> T + 'static,
        cb: impl FnOnce(T) + 'static,
    ) -> Task<T>
    where
        T: Clone,
    {
        let t = self.apply_async(body);
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

    /// Spawn one gated task per item and block for all results in order.
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
        let _ = crate::collective::joinall(&tasks, None, false);
        let mut out = Vec::with_capacity(tasks.len());
        for t in &tasks {
            match t.exception() {
                Some(e) => return Err(e),
                None => out.push(value_of(t)),
            }
        }
        Ok(out)
    }

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

    /// Like [`TaskSet::imap`], with each item's task gated by the pool's
    /// admission semaphore.
    pub fn imap<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I>,
        f: impl Fn(I) -> T + Clone + 'static,
    ) -> Imap<T>
    where
        T: Clone,
    {
        let queue: crate::sync::Queue<(usize, T)> = crate::sync::Queue::new();
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

    pub fn imap_unordered<I: 'static>(
        &self,
        items: impl IntoIterator<Item = I>,
        f: impl Fn(I) -> T + Clone + 'static,
    ) -> ImapUnordered<T>
    where
        T: Clone,
    {
        let queue: crate::sync::Queue<T> = crate::sync::Queue::new();
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
}

fn value_of<T: Clone + 'static>(t: &Task<T>) -> T {
    match t.try_get() {
        Some(Ok(outcome)) => outcome
            .into_value()
            .expect("caller already checked exception() is None"),
        _ => panic!("value_of called on a task with no successful value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Waiter;

    #[test]
    fn zero_size_pool_is_always_full() {
        let pool: Pool<u32> = Pool::new(Some(0)).unwrap();
        assert!(pool.full());
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn negative_size_is_rejected() {
        assert!(matches!(Pool::<u32>::new(Some(-1)), Err(PoolError::InvalidSize(-1))));
    }

    #[test]
    fn bounded_admission_limits_concurrency() {
        let pool: Pool<()> = Pool::new(Some(2)).unwrap();
        let w1: Waiter<()> = Waiter::new();
        let w2: Waiter<()> = Waiter::new();
        let w3: Waiter<()> = Waiter::new();
        let (a, b, c) = (w1.clone(), w2.clone(), w3.clone());
        pool.spawn(move || a.wait());
        pool.spawn(move || b.wait());
        assert_eq!(pool.free_count(), 0);

        let third = pool.apply_async(move || c.wait());
        assert_eq!(pool.free_count(), 0, "third task should not hold a permit yet");

        w1.switch(());
        crate::hub::run_until(|| pool.free_count() > 0);
        assert_eq!(pool.free_count(), 1);

        w2.switch(());
        w3.switch(());
        crate::hub::run_until(|| third.ready());
        assert!(third.ready());
    }

    #[test]
    fn map_respects_pool_bound() {
        let pool: Pool<u32> = Pool::new(Some(2)).unwrap();
        let result = pool.map(0..5, |x| x + 1).unwrap();
        assert_eq!(result, vec![1, 2, 3, 4, 5]);
        assert_eq!(pool.free_count(), 2);
    }
}
