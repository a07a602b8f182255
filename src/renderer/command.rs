//! 命令分配器 / 命令列表池
//!
//! # 回收策略
//!
//! - **分配器**按 fence 门控回收：分配器的内存承载着 GPU 正在执行的命令，
//!   只有当提交它时的 fence 值已完成才能重置复用。
//! - **列表**不需要 fence 门控：列表只是录制容器，提交后其命令已被队列消费，
//!   只要不在提交调用返回前复用即可。
//!
//! 待回收分配器队列是 FIFO，且入队的 fence 值单调不减，因此只检查队首即可：
//! 若队首未完成，后面的条目也一定未完成，永远不会被检查或取出。
//!
//! # 列表状态
//!
//! `空闲 → 录制 → 已提交 → 空闲` 由类型表达：空闲列表只存在于 [`CommandListPool`]，
//! 录制中的列表只存在于 [`CommandList`] 句柄，提交会消耗句柄并把列表放回池中。

use std::collections::VecDeque;

use crate::renderer::sync::FenceValue;

/// 待回收的分配器条目
#[derive(Debug)]
struct AllocatorEntry<A> {
    fence_value: FenceValue,
    allocator: A,
}

/// 命令分配器池
///
/// 按提交顺序保存 `(fence 值, 分配器)`，只有队首的 fence 完成后才交出分配器。
#[derive(Debug)]
pub struct CommandAllocatorPool<A> {
    pending: VecDeque<AllocatorEntry<A>>,
}

impl<A> CommandAllocatorPool<A> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// 把分配器放回池中，`fence_value` 完成后才可重置
    pub fn release(&mut self, allocator: A, fence_value: FenceValue) {
        debug_assert!(
            self.pending
                .back()
                .map_or(true, |entry| entry.fence_value <= fence_value),
            "allocators must be released in submission order"
        );
        self.pending.push_back(AllocatorEntry { fence_value, allocator });
    }

    /// 若队首分配器的 fence 已完成则取出它
    ///
    /// `is_complete` 最多调用一次，且只针对队首条目。
    pub fn pop_ready<F>(&mut self, is_complete: F) -> Option<(A, FenceValue)>
    where
        F: FnOnce(FenceValue) -> bool,
    {
        let front = self.pending.front()?;
        if !is_complete(front.fence_value) {
            return None;
        }
        self.pending
            .pop_front()
            .map(|entry| (entry.allocator, entry.fence_value))
    }

    /// 队首条目的 fence 值
    pub fn oldest_fence_value(&self) -> Option<FenceValue> {
        self.pending.front().map(|entry| entry.fence_value)
    }

    /// 待回收的分配器数量
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 取出全部分配器（仅在队列已 flush 后使用）
    pub fn drain(&mut self) -> impl Iterator<Item = A> + '_ {
        self.pending.drain(..).map(|entry| entry.allocator)
    }
}

impl<A> Default for CommandAllocatorPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// 命令列表池
///
/// 保存已提交、可重新录制的列表。
#[derive(Debug)]
pub struct CommandListPool<L> {
    free: VecDeque<L>,
}

impl<L> CommandListPool<L> {
    pub fn new() -> Self {
        Self { free: VecDeque::new() }
    }

    pub fn release(&mut self, list: L) {
        self.free.push_back(list);
    }

    pub fn pop(&mut self) -> Option<L> {
        self.free.pop_front()
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

impl<L> Default for CommandListPool<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// 正在录制的命令列表
///
/// 句柄同时持有录制所用的分配器，提交时由队列管理器取回。
/// 只能通过 `CommandQueue::get_command_list` 获得，通过
/// `CommandQueue::execute_command_list` 消耗，因此不可能复用尚未回收的分配器。
pub struct CommandList<L, A> {
    pub(crate) list: L,
    pub(crate) allocator: A,
}

impl<L, A> CommandList<L, A> {
    /// 后端命令列表，用于录制命令
    pub fn raw(&self) -> &L {
        &self.list
    }

    pub fn raw_mut(&mut self) -> &mut L {
        &mut self.list
    }

    /// 录制所用的分配器
    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<L, A> std::ops::Deref for CommandList<L, A> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.list
    }
}

impl<L, A> std::ops::DerefMut for CommandList<L, A> {
    fn deref_mut(&mut self) -> &mut L {
        &mut self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_allocator_pool_fifo() {
        let mut pool = CommandAllocatorPool::new();
        pool.release("a", FenceValue::new(1));
        pool.release("b", FenceValue::new(2));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.oldest_fence_value(), Some(FenceValue::new(1)));

        let completed = FenceValue::new(1);
        assert_eq!(pool.pop_ready(|v| v <= completed), Some(("a", FenceValue::new(1))));
        assert_eq!(pool.pop_ready(|v| v <= completed), None);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_incomplete_front_blocks_entries_behind() {
        let mut pool = CommandAllocatorPool::new();
        for value in 1..=5 {
            pool.release(value, FenceValue::new(value));
        }

        let checks = Cell::new(0);
        let checked = Cell::new(FenceValue::NONE);
        let result = pool.pop_ready(|v| {
            checks.set(checks.get() + 1);
            checked.set(v);
            false
        });

        assert!(result.is_none());
        assert_eq!(checks.get(), 1);
        assert_eq!(checked.get(), FenceValue::new(1));
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn test_empty_pool_does_not_query() {
        let mut pool: CommandAllocatorPool<u32> = CommandAllocatorPool::default();
        let result = pool.pop_ready(|_| panic!("empty pool must not query the fence"));
        assert!(result.is_none());
    }

    #[test]
    fn test_list_pool() {
        let mut pool = CommandListPool::new();
        assert!(pool.pop().is_none());

        pool.release(1);
        pool.release(2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.pop(), Some(1));
        assert_eq!(pool.pop(), Some(2));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_drain_allocators() {
        let mut pool = CommandAllocatorPool::new();
        pool.release('x', FenceValue::new(3));
        pool.release('y', FenceValue::new(3));
        let drained: Vec<char> = pool.drain().collect();
        assert_eq!(drained, vec!['x', 'y']);
        assert!(pool.is_empty());
    }

    /// 随机推进已完成值，验证取出的分配器 fence 一定已完成
    #[test]
    fn test_pop_never_returns_incomplete_allocator() {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        let mut pool = CommandAllocatorPool::new();
        let mut next_value = 1u64;
        let mut completed = 0u64;

        for _ in 0..2000 {
            match rng.next() % 3 {
                0 => {
                    pool.release(next_value, FenceValue::new(next_value));
                    next_value += 1 + rng.next() % 2;
                }
                1 => {
                    // GPU 完成值跳跃前进，但不会超过已 signal 的值
                    let jump = rng.next() % 4;
                    completed = (completed + jump).min(next_value - 1);
                }
                _ => {
                    let at_pop = completed;
                    if let Some((allocator, value)) =
                        pool.pop_ready(|v| v.value() <= at_pop)
                    {
                        assert!(value.value() <= at_pop);
                        assert_eq!(allocator, value.value());
                    }
                }
            }
        }
    }

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }
}
