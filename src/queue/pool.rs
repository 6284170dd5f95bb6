//! 任务记录的分配与回收
//!
//! 空闲链维护一组可复用的任务记录，总分配量被限制在
//! `minalloc..=maxalloc`之间：低于`minalloc`时优先增长，
//! 达到`maxalloc`后由调用方节流，回收时向`minalloc`收缩。

use crate::entry::TaskEntry;

pub(crate) struct EntryPool {
    nalloc: usize,
    minalloc: usize,
    maxalloc: usize,
    /// 阻塞在分配节流上的派发者数量
    pub(crate) waiters: u32,
    free: Vec<Box<TaskEntry>>,
}

impl EntryPool {
    pub(crate) fn new(minalloc: usize, maxalloc: usize, prepopulate: bool) -> EntryPool {
        let mut pool = EntryPool {
            nalloc: 0,
            minalloc,
            maxalloc,
            waiters: 0,
            free: Vec::new(),
        };

        if prepopulate {
            for _ in 0..minalloc {
                pool.free.push(TaskEntry::new_pooled());
                pool.nalloc += 1;
            }
        }

        pool
    }

    /// 快速路径：仅当分配量不低于`minalloc`时从空闲链取记录，
    /// 否则让调用方走增长路径以补足预留量
    pub(crate) fn pop_free(&mut self) -> Option<Box<TaskEntry>> {
        if self.nalloc >= self.minalloc {
            self.free.pop()
        } else {
            None
        }
    }

    pub(crate) fn can_grow(&self) -> bool {
        self.nalloc < self.maxalloc
    }

    /// 为一条将在锁外创建的新记录预留名额
    pub(crate) fn note_grow(&mut self) {
        debug_assert!(self.nalloc < self.maxalloc);
        self.nalloc += 1;
    }

    /// 回收一条执行完毕的池内记录
    ///
    /// 分配量高于`minalloc`时直接释放记录以收缩池子，
    /// 否则清空后挂回空闲链复用。
    pub(crate) fn recycle(&mut self, mut ent: Box<TaskEntry>) {
        if self.nalloc <= self.minalloc {
            ent.reset();
            self.free.push(ent);
        } else {
            self.nalloc -= 1;
        }
    }

    /// 销毁路径：清空空闲链并释放全部记录
    pub(crate) fn drain_free(&mut self) {
        self.minalloc = 0;
        while self.free.pop().is_some() {
            self.nalloc -= 1;
        }
    }

    pub(crate) fn allocated(&self) -> usize {
        self.nalloc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepopulate_fills_to_min() {
        let mut pool = EntryPool::new(3, 8, true);
        assert_eq!(pool.allocated(), 3);
        assert!(pool.pop_free().is_some());
        assert!(pool.pop_free().is_some());
        assert!(pool.pop_free().is_some());
        assert!(pool.pop_free().is_none());
        assert_eq!(pool.allocated(), 3);
    }

    #[test]
    fn grows_before_reusing_below_min() {
        let mut pool = EntryPool::new(2, 8, false);
        // 空闲链非空但分配量低于minalloc，不走复用路径
        pool.note_grow();
        pool.recycle(TaskEntry::new_pooled());
        assert_eq!(pool.allocated(), 1);
        assert!(pool.pop_free().is_none());
        assert!(pool.can_grow());
    }

    #[test]
    fn recycle_shrinks_toward_min() {
        let mut pool = EntryPool::new(1, 4, false);
        pool.note_grow();
        pool.note_grow();
        pool.note_grow();
        assert_eq!(pool.allocated(), 3);

        pool.recycle(TaskEntry::new_pooled());
        assert_eq!(pool.allocated(), 2);
        pool.recycle(TaskEntry::new_pooled());
        assert_eq!(pool.allocated(), 1);
        // 到达minalloc后改为复用
        pool.recycle(TaskEntry::new_pooled());
        assert_eq!(pool.allocated(), 1);
        assert!(pool.pop_free().is_some());
    }

    #[test]
    fn drain_free_releases_everything() {
        let mut pool = EntryPool::new(2, 4, true);
        pool.drain_free();
        assert_eq!(pool.allocated(), 0);
        assert!(pool.pop_free().is_none());
    }
}
