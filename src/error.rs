use failure::Fail;
use std::io;

/// taskq 错误类型.
#[derive(Debug, Fail)]
pub enum TaskqError {
    /// IO 错误（例如工作线程创建失败）.
    #[fail(display = "{}", _0)]
    Io(#[cause] io::Error),
    /// 队列已达到最大分配上限，非阻塞派发被拒绝.
    #[fail(display = "Task queue is at capacity")]
    Full,
    /// 带错误信息的通用错误.
    #[fail(display = "{}", _0)]
    StringError(String),
}

impl From<io::Error> for TaskqError {
    fn from(err: io::Error) -> TaskqError {
        TaskqError::Io(err)
    }
}

/// taskq中的Result类型
pub type Result<T> = std::result::Result<T, TaskqError>;
