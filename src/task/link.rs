// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Completion-linkage objects.
//!
//! Mirrors the source's `SuccessGreenletLink`/`FailureGreenletLink` pair and
//! the callable-vs-greenlet split in `Greenlet.link`/`Greenlet.rawlink`: a
//! link is either a raw callable (invoked directly wherever `notify_links`
//! runs), a callable dispatched through a fresh task (`SpawnedLink` and its
//! success/failure-only variants), or another task reachable through
//! [`LinkTarget`] (`TaskAny`/`TaskSuccess`/`TaskFailure`).

use std::rc::Rc;

use crate::error::LinkedExited;
use crate::task::Task;

/// What a task-to-task link throws into its target once the source has
/// terminated. Implemented by every `Task<T>` regardless of `T`, which is
/// what lets a `Task<u32>` link to a `Task<String>`.
pub trait LinkTarget {
    fn throw_linked(&self, err: LinkedExited);
    fn id(&self) -> u64;
}

/// Key used to deduplicate links "by equals on the link's underlying
/// target": task-to-task links key on the target's id, so linking the same
/// task twice is a no-op; raw/spawned callables get a fresh key per
/// registration since closures have no useful identity to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LinkKey {
    Task(u64),
    Raw(u64),
}

/// Opaque handle returned by the registration methods, accepted by
/// [`Task::unlink`] to remove a link regardless of what kind it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkId(pub(crate) LinkKey);

pub(crate) enum Link<T> {
    /// `rawlink`: invoked directly, in place, during notification.
    Raw(Box<dyn FnOnce(&Task<T>)>),
    /// `link(callable)`: dispatched through a newly spawned task.
    Spawned(Box<dyn FnOnce(&Task<T>)>),
    SuccessSpawned(Box<dyn FnOnce(&Task<T>)>),
    FailureSpawned(Box<dyn FnOnce(&Task<T>)>),
    TaskAny(Rc<dyn LinkTarget>),
    TaskSuccess(Rc<dyn LinkTarget>),
    TaskFailure(Rc<dyn LinkTarget>),
}

impl<T: 'static> Link<T> {
    /// Dispatch this link now that `source` has terminated. Called only
    /// from [`Task::drain_links`], which already runs as a hub event.
    pub(crate) fn invoke(self, source: &Task<T>) {
        match self {
            Link::Raw(cb) => cb(source),
            Link::Spawned(cb) => spawn_callback(cb, source.clone()),
            Link::SuccessSpawned(cb) => {
                if source.successful() {
                    spawn_callback(cb, source.clone());
                }
            }
            Link::FailureSpawned(cb) => {
                if !source.successful() {
                    spawn_callback(cb, source.clone());
                }
            }
            Link::TaskAny(target) => dispatch_task_link(&*target, source),
            Link::TaskSuccess(target) => {
                if source.successful() {
                    dispatch_task_link(&*target, source);
                }
            }
            Link::TaskFailure(target) => {
                if !source.successful() {
                    dispatch_task_link(&*target, source);
                }
            }
        }
    }
}

/// Run `cb(source)` inside a freshly spawned task rather than in the caller's
/// own stack frame, the way the source's `GreenletLink.__call__` does
/// `greenlet(self.callback, get_hub()).switch(source)`. Isolates the
/// callback's panics and lets it block without stalling the rest of the
/// notification drain.
fn spawn_callback<T: 'static>(cb: Box<dyn FnOnce(&Task<T>)>, source: Task<T>) {
    let t: Task<()> = Task::new(move || cb(&source));
    t.start();
}

/// The always-"in the hub" dispatch path from the source's
/// `GreenletLink.__call__`: throw the linked-exit error into `target`. If
/// `target` is currently running (suspended somewhere on this very call
/// stack), this unwinds through here on its way to `target`'s own
/// `catch_unwind` — [`Task::drain_links`] is what keeps that unwind from
/// swallowing this source's remaining links.
fn dispatch_task_link<T>(target: &dyn LinkTarget, source: &Task<T>) {
    let err = source.linked_exit_error();
    target.throw_linked(err);
}
