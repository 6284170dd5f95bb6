//! 有界任务队列
//!
//! 固定数量的工作线程从一条有序待执行队列取任务；任务记录由
//! 受`min_alloc`/`max_alloc`约束的记录池分配，达到上限时对派发者节流。

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use slog::Logger;

use crate::entry::{Job, Task, TaskEntry};
use crate::error::{Result, TaskqError};

mod pool;
mod worker;

use pool::EntryPool;

/// 分配节流的单次等待上限
///
/// 有界重试保证阻塞在分配上的派发者不会与正在别处释放记录的
/// 消费者互相死锁。
const THROTTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// 一次成功派发的任务标识符（非零，仅作诊断用途）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// 返回标识符的数值形式
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

pub(crate) struct Inner {
    pub(crate) running: bool,
    /// 未阻塞等待任务的工作线程数
    pub(crate) active: u32,
    next_id: u64,
    pub(crate) pool: EntryPool,
    pub(crate) pending: VecDeque<Box<TaskEntry>>,
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// 有新任务入队时唤醒
    pub(crate) dispatch_cv: Condvar,
    /// 队列完全空闲时唤醒
    pub(crate) drain_cv: Condvar,
    /// 分配节流：有记录被释放时唤醒
    pub(crate) alloc_cv: Condvar,
    /// 暂停/恢复用的执行锁，独立于状态锁
    exec_lock: RwLock<()>,
    pub(crate) log: Logger,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("taskq state lock poisoned")
    }
}

/// 有界任务队列（固定线程池）
///
/// 队列在`Drop`时先等待全部已派发任务执行完毕，再回收所有
/// 工作线程与任务记录。句柄不可克隆，派发借用`&self`，
/// 因此"销毁后继续派发"在编译期即被排除。
pub struct TaskQueue {
    shared: Arc<Shared>,
    name: String,
    nthreads: u32,
    workers: Vec<JoinHandle<()>>,
}

/// 暂停守卫
///
/// 存活期间以写模式持有执行锁：保证没有任何回调正在执行，
/// 但不阻止派发，也不阻止工作线程出队（它们会阻塞在回调前）。
/// 守卫释放即恢复执行。
pub struct PauseGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    log: &'a Logger,
}

impl<'a> Drop for PauseGuard<'a> {
    fn drop(&mut self) {
        debug!(self.log, "Task queue resumed");
    }
}

impl TaskQueue {
    /// 创建任务队列
    ///
    /// # 参数
    /// * `name`: 队列名称，仅用于诊断与日志
    /// * `threads`: 工作线程数，必须至少为1
    /// * `min_alloc`: 保持预先分配的任务记录下限
    /// * `max_alloc`: 允许同时存在的任务记录上限
    /// * `prepopulate`: 创建时即分配`min_alloc`条记录到空闲链
    /// * `logger`: 嵌入方提供的日志器
    ///
    /// # 注意
    /// 任一工作线程创建失败时会终止所有已创建线程并返回错误，
    /// 调用者观察不到部分成功的状态。
    pub fn new(
        name: &str,
        threads: u32,
        min_alloc: usize,
        max_alloc: usize,
        prepopulate: bool,
        logger: Logger,
    ) -> Result<TaskQueue> {
        if threads == 0 {
            return Err(TaskqError::StringError(
                "Argument 'threads' must be positive".to_string(),
            ));
        }
        if min_alloc > max_alloc {
            return Err(TaskqError::StringError(
                "Argument 'min_alloc' must not exceed 'max_alloc'".to_string(),
            ));
        }

        let log = logger.new(o!("taskq" => name.to_string()));

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                running: true,
                active: threads,
                next_id: 1,
                pool: EntryPool::new(min_alloc, max_alloc, prepopulate),
                pending: VecDeque::new(),
            }),
            dispatch_cv: Condvar::new(),
            drain_cv: Condvar::new(),
            alloc_cv: Condvar::new(),
            exec_lock: RwLock::new(()),
            log,
        });

        let mut workers = Vec::with_capacity(threads as usize);
        for i in 0..threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || worker::run_worker(worker_shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // 终止所有已创建线程，不留下半启动的队列
                    shared.lock().running = false;
                    shared.dispatch_cv.notify_all();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(TaskqError::Io(e));
                }
            }
        }

        info!(shared.log, "Task queue started";
              "threads" => threads,
              "min_alloc" => min_alloc,
              "max_alloc" => max_alloc);

        Ok(TaskQueue {
            shared,
            name: name.to_string(),
            nthreads: threads,
            workers,
        })
    }

    /// 派发一个任务到队列尾部
    ///
    /// 记录池到达上限时阻塞，直到有记录被释放。
    pub fn dispatch<F>(&self, job: F) -> Result<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_inner(Box::new(job), true, false)
    }

    /// 非阻塞地派发一个任务到队列尾部
    ///
    /// # Errors
    ///
    /// 记录池已到达`max_alloc`且空闲链为空时返回
    /// `TaskqError::Full`，且不产生任何副作用。
    pub fn try_dispatch<F>(&self, job: F) -> Result<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_inner(Box::new(job), false, false)
    }

    /// 派发一个任务到队列头部（单次优先级提升）
    pub fn dispatch_front<F>(&self, job: F) -> Result<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_inner(Box::new(job), true, true)
    }

    /// 派发一条调用者自备的任务记录
    ///
    /// 记录不占用队列的分配额度，因此永不节流、永不失败；
    /// 执行完毕后记录被直接释放，不进入空闲链。
    pub fn dispatch_task(&self, task: Task, front: bool) -> TaskId {
        let mut ent = task.0;
        let mut inner = self.shared.lock();
        assert!(inner.running, "dispatch on a stopped task queue");

        ent.id = inner.next_id;
        inner.next_id += 1;
        let id = ent.id;

        if front {
            inner.pending.push_front(ent);
        } else {
            inner.pending.push_back(ent);
        }
        self.shared.dispatch_cv.notify_one();

        trace!(self.shared.log, "Caller-owned task dispatched"; "id" => id);
        TaskId(id)
    }

    fn dispatch_inner(&self, job: Job, block: bool, front: bool) -> Result<TaskId> {
        let inner = self.shared.lock();
        assert!(inner.running, "dispatch on a stopped task queue");

        let (mut inner, ent) = self.allocate(inner, block);
        let mut ent = match ent {
            Some(ent) => ent,
            None => return Err(TaskqError::Full),
        };

        ent.id = inner.next_id;
        inner.next_id += 1;
        ent.job = Some(job);
        let id = ent.id;

        if front {
            inner.pending.push_front(ent);
        } else {
            inner.pending.push_back(ent);
        }
        self.shared.dispatch_cv.notify_one();

        trace!(self.shared.log, "Task dispatched"; "id" => id, "front" => front);
        Ok(TaskId(id))
    }

    /// 取一条可用的任务记录
    ///
    /// 依次尝试：空闲链复用、在`max_alloc`内增长（实际分配在锁外
    /// 进行）、以及按`block`要么立即失败要么在节流条件变量上
    /// 有界等待后从头重试。
    fn allocate<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
        block: bool,
    ) -> (MutexGuard<'a, Inner>, Option<Box<TaskEntry>>) {
        loop {
            if let Some(ent) = inner.pool.pop_free() {
                return (inner, Some(ent));
            }

            if inner.pool.can_grow() {
                inner.pool.note_grow();
                drop(inner);
                let ent = TaskEntry::new_pooled();
                return (self.shared.lock(), Some(ent));
            }

            if !block {
                return (inner, None);
            }

            inner.pool.waiters += 1;
            let (guard, _) = self
                .shared
                .alloc_cv
                .wait_timeout(inner, THROTTLE_TIMEOUT)
                .expect("taskq state lock poisoned");
            inner = guard;
            inner.pool.waiters -= 1;
        }
    }

    /// 阻塞直到队列完全空闲
    ///
    /// 即待执行队列为空且没有工作线程正在执行回调。返回后不阻止
    /// 新的派发立即进入；需要稳定的"已排空"快照时由调用者与
    /// 派发方自行串行化。
    pub fn wait(&self) {
        let mut inner = self.shared.lock();
        while !(inner.pending.is_empty() && inner.active == 0) {
            inner = self
                .shared
                .drain_cv
                .wait(inner)
                .expect("taskq state lock poisoned");
        }
    }

    /// 暂停回调执行
    ///
    /// 返回的守卫存活期间保证没有任何回调正在执行；与`wait`不同，
    /// 暂停不排空队列，也不阻止新的派发。
    pub fn pause(&self) -> PauseGuard<'_> {
        let guard = self
            .shared
            .exec_lock
            .write()
            .expect("taskq execution lock poisoned");
        debug!(self.shared.log, "Task queue paused");
        PauseGuard {
            _guard: guard,
            log: &self.shared.log,
        }
    }

    /// 队列名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 工作线程数
    pub fn threads(&self) -> u32 {
        self.nthreads
    }

    /// 当前存在的任务记录总数
    pub fn allocated(&self) -> usize {
        self.shared.lock().pool.allocated()
    }

    /// 已派发但尚未开始执行的任务数
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// 未阻塞等待任务的工作线程数
    pub fn active_workers(&self) -> u32 {
        self.shared.lock().active
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.wait();

        self.shared.lock().running = false;
        self.shared.dispatch_cv.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(self.shared.log, "Worker thread panicked during shutdown");
            }
        }

        let mut inner = self.shared.lock();
        inner.pool.drain_free();
        assert_eq!(inner.pool.allocated(), 0, "task entries leaked at destroy");

        info!(self.shared.log, "Task queue destroyed");
    }
}
