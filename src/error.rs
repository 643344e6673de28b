// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Exception taxonomy for tasks and links.
//!
//! Mirrors `gevent.hub.GreenletExit` and `gevent.greenlet.Linked*` from the
//! source: [`TaskExit`] is the cooperative-termination signal, [`TaskError`]
//! is what a task's `exception` slot holds on failure, and [`LinkedExited`]
//! (with its three variants) is what gets injected into a task linked to
//! another task that has terminated.

use std::any::Any;
use std::fmt;

/// The distinguished "please stop" signal.
///
/// Returning or "raising" this from a task body is treated as a *successful*
/// termination whose value is the signal itself (see [`crate::task::Task::run`]).
#[derive(Debug, Clone, Default)]
pub struct TaskExit {
    reason: Option<String>,
}

impl TaskExit {
    #[must_use]
    pub fn new() -> Self {
        Self { reason: None }
    }

    #[must_use]
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for TaskExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(r) => write!(f, "task exit: {r}"),
            None => write!(f, "task exit"),
        }
    }
}

impl std::error::Error for TaskExit {}

/// The payload of a caught panic, captured the way `tokio::task::JoinError`
/// captures one: downcast to `&str`/`String` when possible, otherwise a
/// placeholder message.
#[derive(Debug, Clone)]
pub struct PanicPayload(pub(crate) String);

impl PanicPayload {
    pub(crate) fn capture(payload: Box<dyn Any + Send>) -> Self {
        if let Some(s) = payload.downcast_ref::<&str>() {
            Self((*s).to_string())
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self(s.clone())
        } else {
            Self("Box<dyn Any>".to_string())
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The error a task's `exception` slot holds once it has failed.
///
/// Corresponds to "any other exception" in the source: the task body
/// panicked rather than returning a value or a [`TaskExit`], or had a
/// [`LinkedExited`] injected into it by a task it was linked to.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panic(PanicPayload),
    #[error("linked task exited: {0}")]
    Linked(Box<LinkedExited>),
}

/// Raised into a task waiting for another task via [`crate::task::Task::get`]
/// or the collective operations when the wait's timer expires before the
/// watched task(s) terminate.
///
/// Distinguished from any other timeout by identity of the [`crate::hub::TimerHandle`]
/// that produced it, per the source's "distinguish their timeout from a
/// propagated one by identity comparison".
#[derive(Debug, Clone, thiserror::Error)]
#[error("timed out waiting for task completion")]
pub struct TimeoutError {
    pub(crate) timer_id: u64,
}

/// Base of the linked-exit exception family. Injected into a task that
/// linked to another task which has since terminated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkedExited {
    /// The linked task returned a value normally.
    #[error("linked task #{0} completed successfully")]
    Completed(u64),
    /// The linked task returned a [`TaskExit`] (i.e. was killed cooperatively).
    #[error("linked task #{0} was killed")]
    Killed(u64),
    /// The linked task panicked.
    #[error("linked task #{0} failed: {1}")]
    Failed(u64, TaskError),
}

impl LinkedExited {
    #[must_use]
    pub fn task_id(&self) -> u64 {
        match self {
            Self::Completed(id) | Self::Killed(id) => *id,
            Self::Failed(id, _) => *id,
        }
    }
}

/// Errors a [`crate::pool::Pool`] can report in addition to task errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool size: {0} (expected a positive integer or unbounded)")]
    InvalidSize(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_exit_display_without_reason() {
        assert_eq!(TaskExit::new().to_string(), "task exit");
    }

    #[test]
    fn task_exit_display_with_reason() {
        assert_eq!(
            TaskExit::with_reason("shutdown").to_string(),
            "task exit: shutdown"
        );
    }

    #[test]
    fn panic_payload_captures_str() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(PanicPayload::capture(payload).message(), "boom");
    }

    #[test]
    fn panic_payload_captures_string() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(PanicPayload::capture(payload).message(), "kaboom");
    }

    #[test]
    fn linked_exited_task_id() {
        let e = LinkedExited::Completed(42);
        assert_eq!(e.task_id(), 42);
    }
}
