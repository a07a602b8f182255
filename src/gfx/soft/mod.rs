//! 软件模拟 GPU 后端
//!
//! 在所有平台上都可用的后端，用软件时间线模拟 GPU 的异步执行：
//!
//! - **线程模式**：每个队列有一个后台线程按提交顺序执行工作，可配置每条命令的耗时
//! - **手动模式**：工作只在调用方调用 [`SoftQueue::advance`] 时推进，
//!   用于构造"GPU 很慢"或"GPU 停滞"的确定性场景
//!
//! 后端会像 D3D12 调试层一样检查误用：重置仍在 GPU 上执行的分配器、
//! 提交未关闭的列表、重置正在录制的列表，都会返回错误。
//!
//! 手动模式下的无限等待由等待线程自己推进该队列的时间线，直到目标值完成；
//! 带超时的等待不推进时间线。

mod timeline;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{
    FenceBackend, GraphicsDevice, QueueBackend, QueueType, RawWait, RecordCommands, ResourceState,
};
use timeline::{AllocatorState, FenceShared, GpuWork, Timeline};

pub use timeline::ExecutionCounters;

/// 软件 GPU 的执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// 后台线程执行，`latency` 为每条命令的模拟耗时
    Threaded { latency: Duration },
    /// 由调用方手动推进
    Manual,
}

/// 录制到软件命令列表中的命令
#[derive(Debug, Clone, PartialEq)]
pub enum SoftCommand {
    Transition {
        back_buffer: usize,
        before: ResourceState,
        after: ResourceState,
    },
    ClearRenderTarget {
        back_buffer: usize,
        color: [f32; 4],
    },
    CopyBuffer {
        bytes: usize,
    },
    DrawIndexed {
        index_count: u32,
    },
}

/// 软件设备
///
/// 可被多个队列共享；对象 ID 在设备范围内唯一。
#[derive(Debug, Clone)]
pub struct SoftDevice {
    mode: ExecutionMode,
    next_id: Arc<AtomicU64>,
    outstanding: Arc<AtomicUsize>,
}

impl SoftDevice {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            next_id: Arc::new(AtomicU64::new(1)),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 线程模式设备
    pub fn threaded(latency: Duration) -> Self {
        Self::new(ExecutionMode::Threaded { latency })
    }

    /// 手动模式设备
    pub fn manual() -> Self {
        Self::new(ExecutionMode::Manual)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// 设备上所有队列已提交但尚未执行完的工作项数量
    ///
    /// 队列被丢弃后仍然有效：被丢弃时没有执行的工作会一直计在这里。
    pub fn outstanding_work(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl GraphicsDevice for SoftDevice {
    type Queue = SoftQueue;

    fn create_queue(&self, queue_type: QueueType) -> Result<SoftQueue> {
        SoftQueue::new(
            self.mode,
            queue_type,
            Arc::clone(&self.next_id),
            Arc::clone(&self.outstanding),
        )
    }

    fn backend_name(&self) -> &str {
        "Software"
    }

    /// 没有呈现引擎限制
    fn supports_tearing(&self) -> bool {
        true
    }
}

/// 软件 fence
pub struct SoftFence {
    shared: Arc<FenceShared>,
    /// 手动模式下创建它的队列的时间线
    manual_timeline: Option<Arc<Timeline>>,
}

impl SoftFence {
    /// 在当前线程推进时间线，直到 `value` 完成
    fn drive(&self, timeline: &Timeline, value: u64) -> Result<RawWait> {
        while self.shared.completed() < value {
            if timeline.advance(1) == 0 {
                return Err(GraphicsError::Wait(format!(
                    "fence value {} is never signaled on this manual queue (completed {})",
                    value,
                    self.shared.completed()
                ))
                .into());
            }
        }
        Ok(RawWait::Signaled)
    }
}

impl fmt::Debug for SoftFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftFence")
            .field("completed", &self.shared.completed())
            .field("manual", &self.manual_timeline.is_some())
            .finish()
    }
}

impl FenceBackend for SoftFence {
    fn completed_value(&self) -> u64 {
        self.shared.completed()
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> Result<RawWait> {
        match (&self.manual_timeline, timeout) {
            (Some(timeline), None) => self.drive(timeline, value),
            _ => Ok(self.shared.wait(value, timeout)),
        }
    }
}

/// 软件命令分配器
#[derive(Debug)]
pub struct SoftCommandAllocator {
    id: u64,
    state: Arc<AllocatorState>,
    resets: u64,
}

impl SoftCommandAllocator {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 自上次重置以来录制进该分配器的命令数
    pub fn recorded_commands(&self) -> usize {
        self.state.recorded.load(Ordering::Acquire)
    }

    /// 被重置的次数
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    /// 是否仍有引用它的工作在 GPU 上执行
    pub fn is_in_flight(&self) -> bool {
        self.state.in_flight.load(Ordering::Acquire) > 0
    }
}

/// 软件命令列表
#[derive(Debug)]
pub struct SoftCommandList {
    id: u64,
    allocator_id: u64,
    allocator: Arc<AllocatorState>,
    commands: Vec<SoftCommand>,
    closed: bool,
}

impl SoftCommandList {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 当前绑定的分配器 ID
    pub fn allocator_id(&self) -> u64 {
        self.allocator_id
    }

    /// 已录制的命令
    pub fn commands(&self) -> &[SoftCommand] {
        &self.commands
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn record(&mut self, command: SoftCommand) {
        debug_assert!(!self.closed, "recording into a closed command list");
        self.allocator.recorded.fetch_add(1, Ordering::AcqRel);
        self.commands.push(command);
    }
}

impl RecordCommands for SoftCommandList {
    fn transition(&mut self, back_buffer: usize, before: ResourceState, after: ResourceState) {
        self.record(SoftCommand::Transition { back_buffer, before, after });
    }

    fn clear_render_target(&mut self, back_buffer: usize, color: [f32; 4]) {
        self.record(SoftCommand::ClearRenderTarget { back_buffer, color });
    }

    fn copy_buffer(&mut self, bytes: usize) {
        self.record(SoftCommand::CopyBuffer { bytes });
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.record(SoftCommand::DrawIndexed { index_count });
    }
}

/// 软件命令队列
pub struct SoftQueue {
    queue_type: QueueType,
    timeline: Arc<Timeline>,
    worker: Option<JoinHandle<()>>,
    next_id: Arc<AtomicU64>,
    allocators_created: AtomicU64,
    lists_created: AtomicU64,
}

impl SoftQueue {
    fn new(
        mode: ExecutionMode,
        queue_type: QueueType,
        next_id: Arc<AtomicU64>,
        outstanding: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let (timeline, worker) = match mode {
            ExecutionMode::Threaded { latency } => {
                let timeline = Arc::new(Timeline::new(latency, outstanding));
                let worker_timeline = Arc::clone(&timeline);
                let worker = std::thread::Builder::new()
                    .name(format!("soft-gpu-{}", queue_type.name()))
                    .spawn(move || worker_timeline.run_worker())
                    .map_err(|e| GraphicsError::QueueCreation(e.to_string()))?;
                (timeline, Some(worker))
            }
            ExecutionMode::Manual => (Arc::new(Timeline::new(Duration::ZERO, outstanding)), None),
        };

        debug!(queue = queue_type.name(), ?mode, "Soft queue created");

        Ok(Self {
            queue_type,
            timeline,
            worker,
            next_id,
            allocators_created: AtomicU64::new(0),
            lists_created: AtomicU64::new(0),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 在调用线程上执行最多 `count` 个待处理工作项（手动模式）
    pub fn advance(&self, count: usize) -> usize {
        self.timeline.advance(count)
    }

    /// 执行所有待处理工作（手动模式）
    pub fn retire_all(&self) -> usize {
        self.timeline.advance(usize::MAX)
    }

    /// 尚未执行的工作项数量
    pub fn pending_work(&self) -> usize {
        self.timeline.pending_len()
    }

    /// 时间线执行计数
    pub fn counters(&self) -> ExecutionCounters {
        self.timeline.counters()
    }

    /// 创建过的分配器数量
    pub fn allocators_created(&self) -> u64 {
        self.allocators_created.load(Ordering::Relaxed)
    }

    /// 创建过的命令列表数量
    pub fn lists_created(&self) -> u64 {
        self.lists_created.load(Ordering::Relaxed)
    }
}

impl QueueBackend for SoftQueue {
    type Fence = SoftFence;
    type Allocator = SoftCommandAllocator;
    type List = SoftCommandList;

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn create_fence(&self) -> Result<SoftFence> {
        let manual_timeline = match self.worker {
            Some(_) => None,
            None => Some(Arc::clone(&self.timeline)),
        };
        Ok(SoftFence {
            shared: Arc::new(FenceShared::default()),
            manual_timeline,
        })
    }

    fn signal(&self, fence: &SoftFence, value: u64) -> Result<()> {
        self.timeline.push(GpuWork::Signal {
            fence: Arc::clone(&fence.shared),
            value,
        });
        Ok(())
    }

    fn create_allocator(&self) -> Result<SoftCommandAllocator> {
        self.allocators_created.fetch_add(1, Ordering::Relaxed);
        Ok(SoftCommandAllocator {
            id: self.next_id(),
            state: Arc::new(AllocatorState::default()),
            resets: 0,
        })
    }

    fn reset_allocator(&self, allocator: &mut SoftCommandAllocator) -> Result<()> {
        if allocator.is_in_flight() {
            return Err(GraphicsError::AllocatorCreation(format!(
                "allocator {} reset while still in use by the GPU",
                allocator.id
            ))
            .into());
        }
        allocator.state.recorded.store(0, Ordering::Release);
        allocator.resets += 1;
        Ok(())
    }

    fn create_list(&self, allocator: &SoftCommandAllocator) -> Result<SoftCommandList> {
        self.lists_created.fetch_add(1, Ordering::Relaxed);
        Ok(SoftCommandList {
            id: self.next_id(),
            allocator_id: allocator.id,
            allocator: Arc::clone(&allocator.state),
            commands: Vec::new(),
            closed: false,
        })
    }

    fn reset_list(&self, list: &mut SoftCommandList, allocator: &SoftCommandAllocator) -> Result<()> {
        if !list.closed {
            return Err(GraphicsError::ListCreation(format!(
                "command list {} reset while still recording",
                list.id
            ))
            .into());
        }
        list.commands.clear();
        list.allocator_id = allocator.id;
        list.allocator = Arc::clone(&allocator.state);
        list.closed = false;
        Ok(())
    }

    fn close_list(&self, list: &mut SoftCommandList) -> Result<()> {
        if list.closed {
            return Err(GraphicsError::CommandExecution(format!(
                "command list {} is already closed",
                list.id
            ))
            .into());
        }
        list.closed = true;
        Ok(())
    }

    fn execute(&self, list: &SoftCommandList) -> Result<()> {
        if !list.closed {
            return Err(GraphicsError::CommandExecution(format!(
                "command list {} executed before being closed",
                list.id
            ))
            .into());
        }

        if self.queue_type == QueueType::Copy {
            let unsupported = list.commands.iter().any(|c| {
                matches!(c, SoftCommand::ClearRenderTarget { .. } | SoftCommand::DrawIndexed { .. })
            });
            if unsupported {
                return Err(GraphicsError::CommandExecution(
                    "graphics commands are not supported on a copy queue".to_string(),
                )
                .into());
            }
        }

        list.allocator.in_flight.fetch_add(1, Ordering::AcqRel);
        self.timeline.push(GpuWork::Execute {
            commands: list.commands.clone(),
            allocator: Arc::clone(&list.allocator),
        });
        Ok(())
    }
}

impl Drop for SoftQueue {
    fn drop(&mut self) {
        let pending = self.timeline.pending_len();
        if self.worker.is_none() && pending > 0 {
            warn!(
                queue = self.queue_type.name(),
                pending,
                "Manual soft queue dropped with unexecuted work"
            );
        }
        self.timeline.shutdown();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(queue = self.queue_type.name(), "Soft GPU worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_queue(queue_type: QueueType) -> SoftQueue {
        SoftDevice::manual().create_queue(queue_type).unwrap()
    }

    #[test]
    fn test_reset_allocator_in_flight_is_rejected() {
        let queue = manual_queue(QueueType::Direct);
        let mut allocator = queue.create_allocator().unwrap();
        let mut list = queue.create_list(&allocator).unwrap();
        list.draw_indexed(3);
        queue.close_list(&mut list).unwrap();
        queue.execute(&list).unwrap();

        assert!(allocator.is_in_flight());
        assert!(queue.reset_allocator(&mut allocator).is_err());

        queue.retire_all();
        assert!(!allocator.is_in_flight());
        queue.reset_allocator(&mut allocator).unwrap();
        assert_eq!(allocator.recorded_commands(), 0);
        assert_eq!(allocator.reset_count(), 1);
    }

    #[test]
    fn test_execute_requires_closed_list() {
        let queue = manual_queue(QueueType::Direct);
        let allocator = queue.create_allocator().unwrap();
        let mut list = queue.create_list(&allocator).unwrap();

        assert!(queue.execute(&list).is_err());
        assert!(queue.reset_list(&mut list, &allocator).is_err());

        queue.close_list(&mut list).unwrap();
        assert!(queue.close_list(&mut list).is_err());
        queue.execute(&list).unwrap();
    }

    #[test]
    fn test_copy_queue_rejects_draws() {
        let queue = manual_queue(QueueType::Copy);
        let allocator = queue.create_allocator().unwrap();
        let mut list = queue.create_list(&allocator).unwrap();
        list.draw_indexed(36);
        queue.close_list(&mut list).unwrap();

        assert!(queue.execute(&list).is_err());
    }

    #[test]
    fn test_threaded_queue_completes_signal() {
        let queue = SoftDevice::threaded(Duration::ZERO)
            .create_queue(QueueType::Direct)
            .unwrap();
        let fence = queue.create_fence().unwrap();

        queue.signal(&fence, 1).unwrap();
        assert_eq!(fence.wait_for_value(1, None).unwrap(), RawWait::Signaled);
        assert_eq!(fence.completed_value(), 1);
    }

    #[test]
    fn test_manual_infinite_wait_drives_timeline() {
        let device = SoftDevice::manual();
        let queue = device.create_queue(QueueType::Direct).unwrap();
        let fence = queue.create_fence().unwrap();
        let allocator = queue.create_allocator().unwrap();
        let mut list = queue.create_list(&allocator).unwrap();
        list.draw_indexed(3);
        queue.close_list(&mut list).unwrap();

        queue.execute(&list).unwrap();
        queue.signal(&fence, 1).unwrap();
        queue.signal(&fence, 2).unwrap();
        assert_eq!(device.outstanding_work(), 3);

        // 带超时的等待不推进
        assert_eq!(fence.wait_for_value(1, Some(Duration::ZERO)).unwrap(), RawWait::TimedOut);

        // 无限等待只推进到目标值为止
        assert_eq!(fence.wait_for_value(1, None).unwrap(), RawWait::Signaled);
        assert_eq!(fence.completed_value(), 1);
        assert!(!allocator.is_in_flight());
        assert_eq!(queue.pending_work(), 1);
        assert_eq!(device.outstanding_work(), 1);

        // 永远不会被 signal 的值返回错误而不是永久阻塞
        assert!(fence.wait_for_value(5, None).is_err());
        assert_eq!(fence.completed_value(), 2);
        assert_eq!(device.outstanding_work(), 0);
    }

    #[test]
    fn test_dropped_manual_queue_leaves_work_outstanding() {
        let device = SoftDevice::manual();
        let queue = device.create_queue(QueueType::Copy).unwrap();
        let fence = queue.create_fence().unwrap();
        queue.signal(&fence, 1).unwrap();

        drop(queue);
        assert_eq!(device.outstanding_work(), 1);
        assert_eq!(fence.completed_value(), 0);
    }

    #[test]
    fn test_object_ids_are_unique_across_queues() {
        let device = SoftDevice::manual();
        let direct = device.create_queue(QueueType::Direct).unwrap();
        let copy = device.create_queue(QueueType::Copy).unwrap();

        let a = direct.create_allocator().unwrap();
        let b = copy.create_allocator().unwrap();
        assert_ne!(a.id(), b.id());
    }
}
