// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cooperatively scheduled tasks.
//!
//! A [`Task<T>`] wraps a plain `FnOnce() -> T`. There is no second stack:
//! the body runs synchronously on the hub's own call stack once dispatched,
//! and anything it does that would "suspend" (waiting on a [`crate::sync`]
//! primitive, or on another task via [`Task::get`]) is a *recursive* call
//! back into [`hub::run_until`], which keeps pumping other tasks while this
//! one's frame sits parked further down the stack. See the crate's design
//! notes for why this replaces a `Future`/`Waker` design.

mod link;

pub use link::{LinkId, LinkTarget};

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::instrument;

use crate::error::{LinkedExited, PanicPayload, TaskError, TaskExit, TimeoutError};
use crate::hub;
use crate::sync::Waiter;
use link::{Link, LinkKey};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Signal a cooperative, successful early exit from inside a running task
/// body, the way `raise GreenletExit` does in the source. Unwinds to the
/// nearest [`Task::run`], which reports it as a success whose value is the
/// [`TaskExit`] itself.
pub fn exit() -> ! {
    std::panic::panic_any(TaskExit::new())
}

/// Like [`exit`], attaching a reason recoverable from the resulting
/// [`TaskExit`].
pub fn exit_with(reason: impl Into<String>) -> ! {
    std::panic::panic_any(TaskExit::with_reason(reason))
}

#[derive(Clone)]
enum Outcome<T> {
    Value(T),
    Exited(TaskExit),
    Panicked(TaskError),
}

enum Classification {
    Value,
    Exited,
    Panicked(TaskError),
}

enum State<T> {
    Created,
    Scheduled,
    Running,
    Done(Outcome<T>),
}

/// The start dispatch is either an immediate `active_event` or a delayed
/// `timer`; both need cancelling the same way when a `throw` preempts them.
enum PendingStart {
    Event(hub::EventHandle),
    Timer(hub::TimerHandle),
}

impl PendingStart {
    fn cancel(&self) {
        match self {
            PendingStart::Event(h) => h.cancel(),
            PendingStart::Timer(h) => h.cancel(),
        }
    }
}

struct TaskInner<T> {
    id: u64,
    name: Option<String>,
    body: RefCell<Option<Box<dyn FnOnce() -> T>>>,
    state: RefCell<State<T>>,
    start_handle: RefCell<Option<PendingStart>>,
    notify_handle: RefCell<Option<hub::EventHandle>>,
    links: RefCell<Vec<(LinkKey, Link<T>)>>,
    link_keys: RefCell<HashSet<LinkKey>>,
}

/// A cooperatively scheduled unit of work.
///
/// Cheap to clone (an `Rc` underneath): clones are handles to the same
/// underlying task, matching the source's greenlets being ordinary objects
/// passed around by reference.
pub struct Task<T> {
    inner: Rc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            State::Created => "created",
            State::Scheduled => "scheduled",
            State::Running => "running",
            State::Done(Outcome::Value(_)) => "done(value)",
            State::Done(Outcome::Exited(_)) => "done(exited)",
            State::Done(Outcome::Panicked(_)) => "done(panicked)",
        };
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &state)
            .finish()
    }
}

impl<T: 'static> Task<T> {
    /// Build a new, not-yet-scheduled task from a body closure.
    #[must_use]
    pub fn new(body: impl FnOnce() -> T + 'static) -> Self {
        Self::named(None, body)
    }

    /// Like [`Task::new`], attaching a name surfaced in [`Debug`] and
    /// tracing spans, mirroring the source's greenlets each carrying a
    /// human-assigned name for diagnostics.
    #[must_use]
    pub fn named(name: Option<impl Into<String>>, body: impl FnOnce() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(TaskInner {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                name: name.map(Into::into),
                body: RefCell::new(Some(Box::new(body))),
                state: RefCell::new(State::Created),
                start_handle: RefCell::new(None),
                notify_handle: RefCell::new(None),
                links: RefCell::new(Vec::new()),
                link_keys: RefCell::new(HashSet::new()),
            }),
        }
    }

    /// Build and immediately [`Task::start`] a task in one call.
    #[must_use]
    pub fn spawn(body: impl FnOnce() -> T + 'static) -> Self {
        let t = Self::new(body);
        t.start();
        t
    }

    /// Like [`Task::spawn`], deferring the first dispatch by `delay`.
    #[must_use]
    pub fn spawn_later(delay: Duration, body: impl FnOnce() -> T + 'static) -> Self {
        let t = Self::new(body);
        t.start_later(delay);
        t
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Schedule the task's body to run on the hub's next turn.
    pub fn start(&self) {
        let mut state = self.inner.state.borrow_mut();
        if !matches!(*state, State::Created) {
            return;
        }
        *state = State::Scheduled;
        drop(state);
        let this = self.clone();
        let handle = hub::active_event(move || this.run());
        *self.inner.start_handle.borrow_mut() = Some(PendingStart::Event(handle));
    }

    /// Like [`Task::start`], deferring the first dispatch by `delay`.
    pub fn start_later(&self, delay: Duration) {
        let mut state = self.inner.state.borrow_mut();
        if !matches!(*state, State::Created) {
            return;
        }
        *state = State::Scheduled;
        drop(state);
        let this = self.clone();
        let handle = hub::timer(delay, move || this.run());
        *self.inner.start_handle.borrow_mut() = Some(PendingStart::Timer(handle));
    }

    #[instrument(level = "debug", skip(self), fields(task_id = self.inner.id))]
    fn run(&self) {
        *self.inner.start_handle.borrow_mut() = None;
        let body = self.inner.body.borrow_mut().take();
        let Some(body) = body else {
            return;
        };
        *self.inner.state.borrow_mut() = State::Running;

        let outcome = match catch_unwind_silent(std::panic::AssertUnwindSafe(body)) {
            Ok(value) => Outcome::Value(value),
            Err(payload) => classify_panic(payload),
        };
        if let Outcome::Panicked(err) = &outcome {
            tracing::error!(task_id = self.inner.id, error = %err, "task failed");
        }
        *self.inner.state.borrow_mut() = State::Done(outcome);
        self.maybe_schedule_notify();
    }

    fn classify(&self) -> Classification {
        match &*self.inner.state.borrow() {
            State::Done(Outcome::Value(_)) => Classification::Value,
            State::Done(Outcome::Exited(_)) => Classification::Exited,
            State::Done(Outcome::Panicked(e)) => Classification::Panicked(e.clone()),
            _ => panic!("classify() called on a task that is not done"),
        }
    }

    fn linked_exit_error(&self) -> LinkedExited {
        match self.classify() {
            Classification::Value => LinkedExited::Completed(self.inner.id),
            Classification::Exited => LinkedExited::Killed(self.inner.id),
            Classification::Panicked(e) => LinkedExited::Failed(self.inner.id, e),
        }
    }

    /// Inject the cooperative exit signal into this task.
    ///
    /// Caller contract: safe only when called from code that is dynamically
    /// nested inside this task's own frames (i.e. from a hub event that ran
    /// because this task is currently blocked), which is exactly how
    /// [`Task::kill`]'s scheduled dispatch reaches it. From any other
    /// context use [`Task::kill`], not this directly.
    pub fn throw(&self, exit: TaskExit) {
        self.throw_outcome(Outcome::Exited(exit));
    }

    fn throw_outcome(&self, outcome: Outcome<T>) {
        if let Some(h) = self.inner.start_handle.borrow_mut().take() {
            h.cancel();
        }
        let should_panic = matches!(*self.inner.state.borrow(), State::Running);
        if should_panic {
            match outcome {
                Outcome::Exited(exit) => std::panic::panic_any(exit),
                Outcome::Panicked(TaskError::Linked(err)) => std::panic::panic_any(*err),
                _ => unreachable!("throw_outcome only constructs Exited/Linked payloads"),
            }
        }
        let mut state = self.inner.state.borrow_mut();
        if matches!(*state, State::Done(_)) {
            return;
        }
        *self.inner.body.borrow_mut() = None;
        *state = State::Done(outcome);
        drop(state);
        self.maybe_schedule_notify();
    }

    /// Asynchronously kill this task by injecting `exit` (default
    /// [`TaskExit::new`]); blocks until dispatch (and, if `block`, until the
    /// task has actually terminated) when `block` is `true`.
    pub fn kill(&self, exit: TaskExit, block: bool, timeout: Option<Duration>) {
        if self.ready() {
            return;
        }
        let waiter: Waiter<()> = Waiter::new();
        let w = waiter.clone();
        let target = self.clone();
        hub::active_event(move || {
            let result = catch_unwind_silent(std::panic::AssertUnwindSafe(move || {
                target.throw(exit);
            }));
            w.switch(());
            if let Err(payload) = result {
                std::panic::resume_unwind(payload);
            }
        });
        if block {
            waiter.wait();
            self.join(timeout);
        }
    }

    fn throw_linked(&self, err: LinkedExited) {
        self.throw_outcome(Outcome::Panicked(TaskError::Linked(Box::new(err))));
    }

    fn maybe_schedule_notify(&self) {
        if self.inner.links.borrow().is_empty() {
            return;
        }
        if self.inner.notify_handle.borrow().is_some() {
            return;
        }
        let this = self.clone();
        let handle = hub::active_event(move || this.drain_links());
        *self.inner.notify_handle.borrow_mut() = Some(handle);
    }

    /// Dispatch every registered link, in LIFO order, to completion.
    ///
    /// If a link's dispatch unwinds (a [`Task::throw_linked`]/[`Task::throw`]
    /// targeting a task that is itself currently running further down this
    /// same call stack legitimately does this, on its way to that task's
    /// own `catch_unwind`), the remaining links still get their turn; the
    /// first such unwind is resumed only once the loop is done so it keeps
    /// propagating toward its real destination. A second simultaneous
    /// unwind from another link in the same drain is a rare case this
    /// crate does not attempt to preserve — the first one wins.
    fn drain_links(&self) {
        let mut pending_unwind: Option<Box<dyn Any + Send>> = None;
        loop {
            let next = self.inner.links.borrow_mut().pop();
            match next {
                Some((key, link)) => {
                    self.inner.link_keys.borrow_mut().remove(&key);
                    let result =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| link.invoke(self)));
                    if let Err(payload) = result {
                        pending_unwind.get_or_insert(payload);
                    }
                }
                None => break,
            }
        }
        *self.inner.notify_handle.borrow_mut() = None;
        if let Some(payload) = pending_unwind {
            std::panic::resume_unwind(payload);
        }
    }

    fn register(&self, key: LinkKey, link: Link<T>) -> LinkId {
        if !self.inner.link_keys.borrow_mut().insert(key) {
            return LinkId(key);
        }
        self.inner.links.borrow_mut().push((key, link));
        if self.ready() {
            self.maybe_schedule_notify();
        }
        LinkId(key)
    }

    fn next_raw_key() -> LinkKey {
        LinkKey::Raw(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `cb` to be invoked directly (in the hub, not a fresh task)
    /// with this task once it has terminated, for any outcome.
    pub fn rawlink(&self, cb: impl FnOnce(&Task<T>) + 'static) -> LinkId {
        self.register(Self::next_raw_key(), Link::Raw(Box::new(cb)))
    }

    /// Like [`Task::rawlink`], but `cb` runs inside a freshly spawned task
    /// rather than directly in the hub, matching `link(callable)` in the
    /// source.
    pub fn link(&self, cb: impl FnOnce(&Task<T>) + 'static) -> LinkId {
        self.register(Self::next_raw_key(), Link::Spawned(Box::new(cb)))
    }

    /// Like [`Task::link`], only invoked if this task completes without
    /// panicking (including a cooperative [`exit`]).
    pub fn link_value(&self, cb: impl FnOnce(&Task<T>) + 'static) -> LinkId {
        self.register(Self::next_raw_key(), Link::SuccessSpawned(Box::new(cb)))
    }

    /// Like [`Task::link`], only invoked if this task panics.
    pub fn link_exception(&self, cb: impl FnOnce(&Task<T>) + 'static) -> LinkId {
        self.register(Self::next_raw_key(), Link::FailureSpawned(Box::new(cb)))
    }

    /// Link `target` to this task: once this task terminates, `target` has
    /// a [`LinkedExited`] thrown into it describing how, for any outcome.
    pub fn link_task<U: 'static>(&self, target: &Task<U>) -> LinkId {
        self.register(
            LinkKey::Task(target.inner.id),
            Link::TaskAny(Rc::new(TaskLinkHandle(target.clone()))),
        )
    }

    /// Like [`Task::link_task`], only dispatched if this task succeeds.
    pub fn link_value_task<U: 'static>(&self, target: &Task<U>) -> LinkId {
        self.register(
            LinkKey::Task(target.inner.id),
            Link::TaskSuccess(Rc::new(TaskLinkHandle(target.clone()))),
        )
    }

    /// Like [`Task::link_task`], only dispatched if this task fails.
    pub fn link_exception_task<U: 'static>(&self, target: &Task<U>) -> LinkId {
        self.register(
            LinkKey::Task(target.inner.id),
            Link::TaskFailure(Rc::new(TaskLinkHandle(target.clone()))),
        )
    }

    /// Remove a previously registered link by the id returned from its
    /// registration method. Returns whether a link was actually removed.
    pub fn unlink(&self, id: LinkId) -> bool {
        if !self.inner.link_keys.borrow_mut().remove(&id.0) {
            return false;
        }
        let mut links = self.inner.links.borrow_mut();
        let before = links.len();
        links.retain(|(k, _)| *k != id.0);
        links.len() != before
    }

    /// Remove a task-to-task link by the target's identity (any of
    /// [`Task::link_task`]/[`Task::link_value_task`]/[`Task::link_exception_task`]).
    pub fn unlink_task<U>(&self, target: &Task<U>) -> bool {
        self.unlink(LinkId(LinkKey::Task(target.inner.id)))
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Done(_))
    }

    #[must_use]
    pub fn dead(&self) -> bool {
        self.ready()
    }

    /// Whether the task terminated without panicking. True both for a
    /// normal return and for a cooperative [`exit`]/[`Task::kill`], false
    /// for a panic (including one caused by a linked task's failure).
    #[must_use]
    pub fn successful(&self) -> bool {
        matches!(
            *self.inner.state.borrow(),
            State::Done(Outcome::Value(_)) | State::Done(Outcome::Exited(_))
        )
    }

    #[must_use]
    pub fn exception(&self) -> Option<TaskError> {
        match &*self.inner.state.borrow() {
            State::Done(Outcome::Panicked(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Block (by recursively pumping the hub) until this task is ready, or
    /// `timeout` elapses.
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            None => hub::run_until(|| self.ready()),
            Some(d) => {
                let done = self.clone();
                let flag = Rc::new(std::cell::Cell::new(false));
                let f = flag.clone();
                let handle = hub::timer(d, move || f.set(true));
                let result = hub::run_until(|| done.ready() || flag.get());
                handle.cancel();
                result && done.ready()
            }
        }
    }
}

impl<T: Clone + 'static> Task<T> {
    /// Block until ready (like [`Task::join`] with `block = true`), then
    /// return the task's outcome: the value on success, the [`TaskExit`]
    /// that ended the task if it was killed, or the panic if it failed. An
    /// optional `timeout` turns a still-pending task into `Timeout` instead
    /// of blocking forever.
    pub fn get(&self, timeout: Option<Duration>) -> Result<GetOutcome<T>, GetError> {
        if !self.ready() {
            let Some(timeout) = timeout else {
                hub::run_until(|| self.ready());
                return self.get(None);
            };
            let done = self.clone();
            let flag = Rc::new(std::cell::Cell::new(false));
            let f = flag.clone();
            let handle = hub::timer(timeout, move || f.set(true));
            hub::run_until(|| done.ready() || flag.get());
            let timed_out = !done.ready();
            let timer_id = handle.id();
            handle.cancel();
            if timed_out {
                return Err(GetError::Timeout(TimeoutError { timer_id }));
            }
        }
        match &*self.inner.state.borrow() {
            State::Done(Outcome::Value(v)) => Ok(GetOutcome::Value(v.clone())),
            State::Done(Outcome::Exited(e)) => Ok(GetOutcome::Exited(e.clone())),
            State::Done(Outcome::Panicked(e)) => Err(GetError::Panicked(e.clone())),
            _ => unreachable!("task is ready by this point"),
        }
    }

    /// Non-blocking variant of [`Task::get`]: `None` if the task has not
    /// finished yet.
    pub fn try_get(&self) -> Option<Result<GetOutcome<T>, GetError>> {
        if !self.ready() {
            return None;
        }
        Some(match &*self.inner.state.borrow() {
            State::Done(Outcome::Value(v)) => Ok(GetOutcome::Value(v.clone())),
            State::Done(Outcome::Exited(e)) => Ok(GetOutcome::Exited(e.clone())),
            State::Done(Outcome::Panicked(e)) => Err(GetError::Panicked(e.clone())),
            _ => unreachable!("ready() implies Done"),
        })
    }
}

/// Adapts a `Task<T>` handle to the type-erased [`LinkTarget`] trait so a
/// task of one output type can link to a task of another.
struct TaskLinkHandle<T>(Task<T>);

impl<T: 'static> LinkTarget for TaskLinkHandle<T> {
    fn throw_linked(&self, err: LinkedExited) {
        self.0.throw_linked(err);
    }

    fn id(&self) -> u64 {
        self.0.id()
    }
}

/// A task's terminal value as seen by [`Task::get`]: either the body's own
/// return value, or the [`TaskExit`] that cooperatively ended it, which the
/// source's duck typing lets stand in as "the value" of a killed greenlet.
#[derive(Debug, Clone)]
pub enum GetOutcome<T> {
    Value(T),
    Exited(TaskExit),
}

impl<T> GetOutcome<T> {
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            GetOutcome::Value(v) => Some(v),
            GetOutcome::Exited(_) => None,
        }
    }
}

/// What [`Task::get`] returns for a task that did not end in a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GetError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Panicked(TaskError),
}

pub(crate) fn catch_unwind_silent<R>(
    f: impl FnOnce() -> R + std::panic::UnwindSafe,
) -> Result<R, Box<dyn Any + Send>> {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(f);
    std::panic::set_hook(prev_hook);
    result
}

fn classify_panic<T>(payload: Box<dyn Any + Send>) -> Outcome<T> {
    if let Some(exit) = payload.downcast_ref::<TaskExit>() {
        return Outcome::Exited(exit.clone());
    }
    if let Some(err) = payload.downcast_ref::<LinkedExited>() {
        return Outcome::Panicked(TaskError::Linked(Box::new(err.clone())));
    }
    Outcome::Panicked(TaskError::Panic(PanicPayload::capture(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_runs_body_and_reports_value() {
        let t = Task::spawn(|| 42);
        assert_eq!(
            t.get(None).unwrap().into_value(),
            Some(42),
            "task should have completed with its return value"
        );
    }

    #[test]
    fn exit_is_reported_as_successful() {
        let t = Task::spawn(|| -> u32 {
            exit_with("done early");
        });
        hub::run_until(|| t.ready());
        assert!(t.successful());
        match t.get(None).unwrap() {
            GetOutcome::Exited(e) => assert_eq!(e.reason(), Some("done early")),
            GetOutcome::Value(_) => panic!("expected Exited"),
        }
    }

    #[test]
    fn panic_is_reported_as_failure() {
        let t: Task<u32> = Task::spawn(|| panic!("boom"));
        hub::run_until(|| t.ready());
        assert!(!t.successful());
        assert!(t.exception().is_some());
        assert!(matches!(t.get(None), Err(GetError::Panicked(_))));
    }

    #[test]
    fn kill_before_start_is_successful_with_exit_value() {
        let t: Task<u32> = Task::new(|| 1);
        t.kill(TaskExit::new(), true, None);
        assert!(t.dead());
        assert!(t.successful());
        assert!(matches!(t.get(None).unwrap(), GetOutcome::Exited(_)));
    }

    #[test]
    fn rawlink_fires_after_completion() {
        let t = Task::spawn(|| 7);
        let seen = Rc::new(std::cell::Cell::new(0));
        let s = seen.clone();
        t.rawlink(move |task| s.set(task.get(None).unwrap().into_value().unwrap()));
        hub::run_until(|| seen.get() == 7);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn rawlink_on_already_ready_task_still_fires() {
        let t = Task::spawn(|| 1);
        hub::run_until(|| t.ready());
        let seen = Rc::new(std::cell::Cell::new(false));
        let s = seen.clone();
        t.rawlink(move |_| s.set(true));
        hub::run_until(|| seen.get());
        assert!(seen.get());
    }

    #[test]
    fn unlink_prevents_dispatch() {
        let t: Task<u32> = Task::new(|| 1);
        let seen = Rc::new(std::cell::Cell::new(false));
        let s = seen.clone();
        let id = t.rawlink(move |_| s.set(true));
        assert!(t.unlink(id));
        t.start();
        hub::run_until(|| t.ready());
        assert!(!seen.get());
    }

    #[test]
    fn link_task_propagates_failure() {
        // b blocks on a waiter that never fires on its own, so the only way
        // it terminates is via the link from a's failure preempting it.
        let a: Task<u32> = Task::new(|| panic!("boom"));
        let waiter: Waiter<()> = Waiter::new();
        let w = waiter.clone();
        let b: Task<()> = Task::new(move || w.wait());
        a.link_task(&b);
        a.start();
        b.start();
        hub::run_until(|| b.ready());
        assert!(!b.successful());
        match b.exception() {
            Some(TaskError::Linked(err)) if matches!(*err, LinkedExited::Failed(id, _) if id == a.id()) => {}
            other => panic!("expected Linked(Failed), got {other:?}"),
        }
    }

    #[test]
    fn link_value_task_ignored_on_failure() {
        let a: Task<u32> = Task::new(|| panic!("boom"));
        let b: Task<()> = Task::new(|| ());
        a.link_value_task(&b);
        a.start();
        b.start();
        hub::run_until(|| a.ready() && b.ready());
        assert!(b.successful(), "b should finish on its own, untouched");
    }

    #[test]
    fn killing_a_blocked_task_unwinds_as_exit() {
        // t blocks forever on a waiter nobody ever switches, so the only
        // way it terminates is via a kill preempting it while it's parked
        // in its own nested `run_until`. The kill has to be scheduled (not
        // called directly from this top-level test body) so there is
        // something left in the hub queue for that nested pump to find.
        let waiter: Waiter<()> = Waiter::new();
        let w = waiter.clone();
        let t: Task<u32> = Task::spawn(move || {
            w.wait();
            1
        });
        let target = t.clone();
        hub::active_event(move || target.kill(TaskExit::with_reason("cancelled"), false, None));
        hub::run_until(|| t.ready());
        assert!(t.dead());
        assert!(t.successful());
    }
}
