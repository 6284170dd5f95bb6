#![deny(missing_docs)]
//! 一个有界、可动态伸缩的任务队列（固定线程池 + 受管任务记录分配器）。

pub use error::{TaskqError, Result};
pub use entry::Task;
pub use queue::{TaskQueue, TaskId, PauseGuard};

#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

mod error;
mod entry;
pub mod queue;
