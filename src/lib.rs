//! A cooperative, single-threaded task runtime.
//!
//! Tasks (`Task<T>`) share one OS thread under a small event-driven
//! [`hub`]. There is no preemption and no second stack per task: a task
//! body is a plain closure run to completion by the hub, and "suspending"
//! is a recursive call back into the hub from one of the [`sync`]
//! primitives. Tasks can link to each other's completion ([`task::Task::link_task`]
//! and friends), be grouped for collective join/kill ([`collective`],
//! [`task_set`]), and admitted into a bounded [`pool::Pool`].
//!
//! ```
//! use taskhub::task::Task;
//!
//! let t = Task::spawn(|| 41 + 1);
//! assert_eq!(t.get(None).unwrap().into_value(), Some(42));
//! ```

pub mod collective;
pub mod error;
pub mod hub;
pub mod pool;
pub mod sync;
pub mod task;
pub mod task_set;

pub use error::{LinkedExited, PoolError, TaskError, TimeoutError};
pub use pool::Pool;
pub use task::{Task, exit, exit_with};
pub use task_set::TaskSet;
