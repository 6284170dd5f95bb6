//! 工作线程的取任务/执行循环

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::Shared;
use crate::entry::EntryKind;

/// 工作线程主体
///
/// 在`running`期间反复从待执行队列头部取出记录并在锁外执行回调；
/// 队列为空时递减活跃计数（归零时唤醒`wait`）并在派发条件变量上休眠。
/// 回调在执行锁的读模式下运行，且被`catch_unwind`包住：
/// 任务panic只记录日志，不会杀死工作线程。
pub(crate) fn run_worker(shared: Arc<Shared>) {
    let mut inner = shared.lock();

    loop {
        if !inner.running {
            break;
        }

        if inner.pending.is_empty() {
            inner.active -= 1;
            if inner.active == 0 {
                shared.drain_cv.notify_all();
            }
            inner = shared
                .dispatch_cv
                .wait(inner)
                .expect("taskq state lock poisoned");
            inner.active += 1;
            continue;
        }

        let mut ent = inner.pending.pop_front().expect("pending list is empty");
        drop(inner);

        {
            // 严格交接：先放状态锁，再取执行锁，绝不同时持有
            let _exec = shared
                .exec_lock
                .read()
                .expect("taskq execution lock poisoned");
            let id = ent.id;
            let job = ent.job.take().expect("task entry has no job");
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(shared.log, "Task {} panicked in worker thread", id);
            }
        }

        inner = shared.lock();
        match ent.kind {
            EntryKind::Pooled => {
                inner.pool.recycle(ent);
                if inner.pool.waiters > 0 {
                    shared.alloc_cv.notify_one();
                }
            }
            // 调用者自备的记录不进空闲链，直接释放
            EntryKind::Owned => drop(ent),
        }
    }
}
