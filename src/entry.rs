//! 任务记录：一次回调及其归属标记

/// 任务回调闭包
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// 任务记录的归属
///
/// `Pooled`记录由队列分配并经空闲链回收；
/// `Owned`记录由调用者自备，执行后直接丢弃，不计入分配额度。
pub(crate) enum EntryKind {
    Pooled,
    Owned,
}

pub(crate) struct TaskEntry {
    pub(crate) id: u64,
    pub(crate) job: Option<Job>,
    pub(crate) kind: EntryKind,
}

impl TaskEntry {
    /// 创建一条空的池内记录
    pub(crate) fn new_pooled() -> Box<TaskEntry> {
        Box::new(TaskEntry {
            id: 0,
            job: None,
            kind: EntryKind::Pooled,
        })
    }

    /// 回收前清空记录内容
    pub(crate) fn reset(&mut self) {
        self.id = 0;
        self.job = None;
    }
}

/// 调用者自备的任务记录
///
/// 与普通派发不同，`Task`的分配由调用者自己完成，
/// 不占用队列的`min_alloc`/`max_alloc`额度，因此派发永不因容量受阻。
/// 执行完毕后记录被直接释放，不会进入队列的空闲链。
pub struct Task(pub(crate) Box<TaskEntry>);

impl Task {
    /// 用给定闭包构造一条调用者自备的任务记录
    pub fn new<F>(job: F) -> Task
    where
        F: FnOnce() + Send + 'static,
    {
        Task(Box::new(TaskEntry {
            id: 0,
            job: Some(Box::new(job)),
            kind: EntryKind::Owned,
        }))
    }
}
