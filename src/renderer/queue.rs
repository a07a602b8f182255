//! 命令队列管理器
//!
//! 每种队列类型（direct / compute / copy）一个实例，持有一个硬件队列、
//! 一个 fence，以及按提交顺序排列的分配器池和列表池。
//!
//! ```text
//! get_command_list ──▶ 录制 ──▶ execute_command_list ──▶ FenceValue
//!        ▲                                  │
//!        └──── 分配器（fence 完成后）/ 列表 ◀─┘
//! ```
//!
//! 管理器由单个线程驱动，内部不加锁。

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::core::error::Result;
use crate::gfx::backend::{GraphicsDevice, QueueBackend, QueueType};
use crate::renderer::command::{CommandAllocatorPool, CommandList, CommandListPool};
use crate::renderer::sync::{Fence, FenceStats, FenceValue, WaitStatus};

/// 后端队列对应的录制句柄类型
pub type QueueCommandList<Q> =
    CommandList<<Q as QueueBackend>::List, <Q as QueueBackend>::Allocator>;

/// 队列统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// 新建的分配器数
    pub allocators_created: u64,
    /// 复用的分配器数
    pub allocators_recycled: u64,
    /// 新建的命令列表数
    pub lists_created: u64,
    /// 复用的命令列表数
    pub lists_recycled: u64,
    /// 提交次数
    pub submissions: u64,
    /// 等待回收的分配器数
    pub pending_allocators: usize,
    /// 空闲的命令列表数
    pub free_lists: usize,
}

/// 命令队列管理器
pub struct CommandQueue<Q: QueueBackend> {
    queue_type: QueueType,
    queue: Q,
    fence: Fence<Q>,
    allocators: CommandAllocatorPool<Q::Allocator>,
    lists: CommandListPool<Q::List>,
    stats: QueueStats,
}

impl<Q: QueueBackend> CommandQueue<Q> {
    /// 在设备上创建指定类型的队列及其 fence
    pub fn new<D>(device: &D, queue_type: QueueType) -> Result<Self>
    where
        D: GraphicsDevice<Queue = Q>,
    {
        let queue = device.create_queue(queue_type)?;
        let fence = Fence::new(&queue)?;

        debug!(
            backend = device.backend_name(),
            queue = queue_type.name(),
            "Command queue created"
        );

        Ok(Self {
            queue_type,
            queue,
            fence,
            allocators: CommandAllocatorPool::new(),
            lists: CommandListPool::new(),
            stats: QueueStats::default(),
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// 底层硬件队列
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn fence(&self) -> &Fence<Q> {
        &self.fence
    }

    /// 获取一个处于录制状态的命令列表
    ///
    /// 最早提交的分配器已完成则重置复用，否则新建；不会阻塞等待 GPU。
    /// 列表池非空时直接复用，并重新绑定到选中的分配器。
    pub fn get_command_list(&mut self) -> Result<QueueCommandList<Q>> {
        let fence = &self.fence;
        let allocator = match self.allocators.pop_ready(|value| fence.is_complete(value)) {
            Some((mut allocator, value)) => {
                self.queue.reset_allocator(&mut allocator)?;
                self.stats.allocators_recycled += 1;
                debug!(
                    queue = self.queue_type.name(),
                    fence_value = value.value(),
                    "Recycled command allocator"
                );
                allocator
            }
            None => {
                let allocator = self.queue.create_allocator()?;
                self.stats.allocators_created += 1;
                debug!(
                    queue = self.queue_type.name(),
                    pending = self.allocators.len(),
                    "Created command allocator"
                );
                allocator
            }
        };

        let list = match self.lists.pop() {
            Some(mut list) => {
                self.queue.reset_list(&mut list, &allocator)?;
                self.stats.lists_recycled += 1;
                list
            }
            None => {
                let list = self.queue.create_list(&allocator)?;
                self.stats.lists_created += 1;
                debug!(queue = self.queue_type.name(), "Created command list");
                list
            }
        };

        Ok(CommandList { list, allocator })
    }

    /// 关闭并提交命令列表，返回本次提交对应的 fence 值
    ///
    /// 分配器进入待回收队列，列表立即回到空闲池。
    pub fn execute_command_list(&mut self, command_list: QueueCommandList<Q>) -> Result<FenceValue> {
        let CommandList { mut list, allocator } = command_list;

        self.queue.close_list(&mut list)?;
        self.queue.execute(&list)?;
        let value = self.fence.signal(&self.queue)?;

        self.allocators.release(allocator, value);
        self.lists.release(list);
        self.stats.submissions += 1;

        trace!(
            queue = self.queue_type.name(),
            fence_value = value.value(),
            pending_allocators = self.allocators.len(),
            "Command list executed"
        );

        Ok(value)
    }

    /// 在队列上 signal，不提交命令
    pub fn signal(&self) -> Result<FenceValue> {
        self.fence.signal(&self.queue)
    }

    pub fn is_fence_complete(&self, value: FenceValue) -> bool {
        self.fence.is_complete(value)
    }

    /// 等待 fence 值完成，`timeout` 为 `None` 表示无限等待
    pub fn wait_for_fence_value(
        &self,
        value: FenceValue,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus> {
        self.fence.wait_until(value, timeout)
    }

    /// 等待之前提交的所有工作完成
    pub fn flush(&self) -> Result<FenceValue> {
        let value = self.fence.flush(&self.queue)?;
        debug!(queue = self.queue_type.name(), fence_value = value.value(), "Queue flushed");
        Ok(value)
    }

    /// 最近一次提交或 signal 的 fence 值
    pub fn last_fence_value(&self) -> FenceValue {
        self.fence.last_signaled()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending_allocators: self.allocators.len(),
            free_lists: self.lists.len(),
            ..self.stats
        }
    }

    pub fn fence_stats(&self) -> FenceStats {
        self.fence.stats()
    }
}

impl<Q: QueueBackend> Drop for CommandQueue<Q> {
    fn drop(&mut self) {
        let last = self.fence.last_signaled();
        if !self.fence.is_complete(last) {
            warn!(
                queue = self.queue_type.name(),
                fence_value = last.value(),
                "Command queue dropped with GPU work in flight, call flush() first"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::RecordCommands;
    use crate::gfx::soft::{SoftDevice, SoftQueue};

    fn manual_queue() -> CommandQueue<SoftQueue> {
        CommandQueue::new(&SoftDevice::manual(), QueueType::Direct).unwrap()
    }

    fn threaded_queue() -> CommandQueue<SoftQueue> {
        CommandQueue::new(&SoftDevice::threaded(Duration::from_micros(20)), QueueType::Direct)
            .unwrap()
    }

    fn submit_draw(queue: &mut CommandQueue<SoftQueue>) -> FenceValue {
        let mut list = queue.get_command_list().unwrap();
        list.draw_indexed(3);
        queue.execute_command_list(list).unwrap()
    }

    #[test]
    fn test_fence_values_strictly_increase() {
        let mut queue = manual_queue();
        let mut previous = FenceValue::NONE;
        for _ in 0..10 {
            let value = submit_draw(&mut queue);
            assert!(value > previous);
            previous = value;
        }
        queue.queue().retire_all();
    }

    #[test]
    fn test_flush_completes_all_prior_submissions() {
        let mut queue = threaded_queue();
        let values: Vec<FenceValue> = (0..8).map(|_| submit_draw(&mut queue)).collect();

        let flushed = queue.flush().unwrap();

        assert!(flushed > *values.last().unwrap());
        for value in values {
            assert!(queue.is_fence_complete(value));
        }
    }

    #[test]
    fn test_flush_on_manual_queue_drives_timeline() {
        let mut queue = manual_queue();
        let first = submit_draw(&mut queue);
        let second = submit_draw(&mut queue);

        queue.flush().unwrap();

        assert!(queue.is_fence_complete(first));
        assert!(queue.is_fence_complete(second));
        assert_eq!(queue.queue().pending_work(), 0);
    }

    #[test]
    fn test_incomplete_value_is_not_complete() {
        let mut queue = manual_queue();
        let value = submit_draw(&mut queue);
        assert!(!queue.is_fence_complete(value));

        queue.queue().retire_all();
        assert!(queue.is_fence_complete(value));
    }

    #[test]
    fn test_stalled_gpu_allocates_instead_of_blocking() {
        let mut queue = manual_queue();
        for _ in 0..5 {
            submit_draw(&mut queue);
        }
        assert_eq!(queue.stats().allocators_created, 5);
        assert_eq!(queue.stats().pending_allocators, 5);

        let sixth = queue.get_command_list().unwrap();
        let stats = queue.stats();
        assert_eq!(stats.allocators_created, 6);
        assert_eq!(stats.allocators_recycled, 0);
        assert_eq!(queue.queue().allocators_created(), 6);
        assert_eq!(queue.fence_stats().os_waits, 0);

        // 列表不受 fence 门控，直接复用
        assert_eq!(stats.lists_created, 1);
        assert_eq!(sixth.raw().commands().len(), 0);

        queue.execute_command_list(sixth).unwrap();
        queue.queue().retire_all();
    }

    #[test]
    fn test_only_front_allocator_is_queried() {
        let mut queue = manual_queue();
        for _ in 0..5 {
            submit_draw(&mut queue);
        }

        let before = queue.fence_stats().completion_queries;
        let list = queue.get_command_list().unwrap();
        assert_eq!(queue.fence_stats().completion_queries, before + 1);

        queue.execute_command_list(list).unwrap();
        queue.queue().retire_all();
    }

    #[test]
    fn test_zero_timeout_wait_does_not_deadlock() {
        let mut queue = manual_queue();
        submit_draw(&mut queue);
        let value = queue.signal().unwrap();

        let status = queue.wait_for_fence_value(value, Some(Duration::ZERO)).unwrap();
        assert_eq!(status, WaitStatus::TimedOut);
        assert!(!queue.is_fence_complete(value));

        queue.queue().retire_all();
        assert_eq!(
            queue.wait_for_fence_value(value, Some(Duration::ZERO)).unwrap(),
            WaitStatus::Complete
        );
    }

    #[test]
    fn test_recycled_objects_are_reset() {
        let mut queue = manual_queue();

        let mut list = queue.get_command_list().unwrap();
        let allocator_id = list.allocator().id();
        let list_id = list.raw().id();
        list.clear_render_target(0, [0.4, 0.6, 0.9, 1.0]);
        list.draw_indexed(36);
        assert_eq!(list.allocator().recorded_commands(), 2);
        queue.execute_command_list(list).unwrap();

        queue.queue().retire_all();

        let list = queue.get_command_list().unwrap();
        assert_eq!(list.allocator().id(), allocator_id);
        assert_eq!(list.raw().id(), list_id);
        assert_eq!(list.allocator().recorded_commands(), 0);
        assert_eq!(list.allocator().reset_count(), 1);
        assert!(list.raw().commands().is_empty());
        assert!(!list.raw().is_closed());
        assert_eq!(list.raw().allocator_id(), allocator_id);

        let stats = queue.stats();
        assert_eq!(stats.allocators_recycled, 1);
        assert_eq!(stats.lists_recycled, 1);

        queue.execute_command_list(list).unwrap();
        queue.queue().retire_all();
    }

    /// 随机交错获取、提交与 GPU 推进，后端会拒绝任何过早的分配器重置
    #[test]
    fn test_random_interleaving_never_resets_in_flight_allocator() {
        let mut rng = 0x2545_F491_4F6C_DD1Du64;
        let mut next = move || {
            rng ^= rng << 13;
            rng ^= rng >> 7;
            rng ^= rng << 17;
            rng
        };

        let mut queue = manual_queue();
        let mut submitted = Vec::new();

        for _ in 0..500 {
            match next() % 4 {
                0 | 1 => {
                    let mut list = queue.get_command_list().unwrap();
                    assert_eq!(list.allocator().recorded_commands(), 0);
                    list.draw_indexed((next() % 64) as u32 + 1);
                    submitted.push(queue.execute_command_list(list).unwrap());
                }
                2 => {
                    queue.queue().advance((next() % 5) as usize);
                }
                _ => {
                    if let Some(&value) = submitted.last() {
                        let _ = queue.wait_for_fence_value(value, Some(Duration::ZERO)).unwrap();
                    }
                }
            }
        }

        queue.queue().retire_all();
        for value in submitted {
            assert!(queue.is_fence_complete(value));
        }
    }

    #[test]
    fn test_copy_queue_round_trip() {
        let mut queue =
            CommandQueue::new(&SoftDevice::threaded(Duration::ZERO), QueueType::Copy).unwrap();
        assert_eq!(queue.queue_type(), QueueType::Copy);

        let mut list = queue.get_command_list().unwrap();
        list.copy_buffer(1024);
        let value = queue.execute_command_list(list).unwrap();

        assert_eq!(queue.wait_for_fence_value(value, None).unwrap(), WaitStatus::Complete);
        assert_eq!(queue.queue().counters().copy_bytes, 1024);
    }
}
