//! 软件 GPU 时间线
//!
//! 每个软件队列拥有一条时间线：提交的工作按 FIFO 顺序执行，`Signal`
//! 在其之前的所有 `Execute` 执行完毕后才更新 fence。线程模式下由后台线程消费，
//! 手动模式下由调用方通过 `advance` 推进。
//!
//! 设备上所有时间线共享一个未完成工作计数：入队时加一，执行完才减一。
//! 队列被丢弃时尚未执行的工作不会被计为完成。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use super::SoftCommand;
use crate::gfx::backend::RawWait;

/// Fence 共享状态：已完成值 + 条件变量（OS 等待原语）
#[derive(Debug, Default)]
pub(crate) struct FenceShared {
    completed: Mutex<u64>,
    signaled: Condvar,
}

impl FenceShared {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn completed(&self) -> u64 {
        *self.lock()
    }

    /// GPU 侧更新已完成值，只会单调增加
    pub(crate) fn complete(&self, value: u64) {
        let mut completed = self.lock();
        if value > *completed {
            *completed = value;
        }
        self.signaled.notify_all();
    }

    pub(crate) fn wait(&self, value: u64, timeout: Option<Duration>) -> RawWait {
        let mut completed = self.lock();
        match timeout {
            None => {
                while *completed < value {
                    completed = self
                        .signaled
                        .wait(completed)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                RawWait::Signaled
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *completed < value {
                    let now = Instant::now();
                    if now >= deadline {
                        return RawWait::TimedOut;
                    }
                    completed = self
                        .signaled
                        .wait_timeout(completed, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                RawWait::Signaled
            }
        }
    }
}

/// 分配器在 GPU 侧的使用状态
#[derive(Debug, Default)]
pub(crate) struct AllocatorState {
    /// 已提交但尚未被时间线执行完的列表数
    pub(crate) in_flight: AtomicUsize,
    /// 自上次重置以来录制进该分配器的命令数
    pub(crate) recorded: AtomicUsize,
}

pub(crate) enum GpuWork {
    Execute {
        commands: Vec<SoftCommand>,
        allocator: Arc<AllocatorState>,
    },
    Signal {
        fence: Arc<FenceShared>,
        value: u64,
    },
}

/// 时间线执行计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionCounters {
    /// 执行过的命令列表数
    pub lists: u64,
    /// 执行过的命令总数
    pub commands: u64,
    /// 清屏次数
    pub clears: u64,
    /// 绘制调用次数
    pub draws: u64,
    /// 绘制的索引总数
    pub indices: u64,
    /// 复制的字节总数
    pub copy_bytes: u64,
    /// 处理过的 signal 数
    pub signals: u64,
}

#[derive(Default)]
struct TimelineState {
    pending: VecDeque<GpuWork>,
    shutdown: bool,
    counters: ExecutionCounters,
}

pub(crate) struct Timeline {
    state: Mutex<TimelineState>,
    work_ready: Condvar,
    latency: Duration,
    outstanding: Arc<AtomicUsize>,
}

impl Timeline {
    pub(crate) fn new(latency: Duration, outstanding: Arc<AtomicUsize>) -> Self {
        Self {
            state: Mutex::new(TimelineState::default()),
            work_ready: Condvar::new(),
            latency,
            outstanding,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, work: GpuWork) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.lock().pending.push_back(work);
        self.work_ready.notify_one();
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn counters(&self) -> ExecutionCounters {
        self.lock().counters
    }

    /// 在当前线程执行最多 `count` 个工作项，返回实际执行的数量
    pub(crate) fn advance(&self, count: usize) -> usize {
        let mut done = 0;
        while done < count {
            let work = match self.lock().pending.pop_front() {
                Some(work) => work,
                None => break,
            };
            self.run(work);
            done += 1;
        }
        done
    }

    pub(crate) fn shutdown(&self) {
        self.lock().shutdown = true;
        self.work_ready.notify_all();
    }

    /// 后台线程主循环。关闭时先执行完剩余工作，避免等待者永久阻塞。
    pub(crate) fn run_worker(self: Arc<Self>) {
        loop {
            let work = {
                let mut state = self.lock();
                while state.pending.is_empty() && !state.shutdown {
                    state = self
                        .work_ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                match state.pending.pop_front() {
                    Some(work) => work,
                    None => break,
                }
            };
            self.run(work);
        }
    }

    /// 执行一个列表的模拟耗时，溢出时饱和
    fn execution_time(&self, command_count: usize) -> Duration {
        let scale = u32::try_from(command_count.max(1)).unwrap_or(u32::MAX);
        self.latency.saturating_mul(scale)
    }

    fn run(&self, work: GpuWork) {
        self.execute(work);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn execute(&self, work: GpuWork) {
        match work {
            GpuWork::Execute { commands, allocator } => {
                let busy = self.execution_time(commands.len());
                if !busy.is_zero() {
                    std::thread::sleep(busy);
                }

                let mut state = self.lock();
                let counters = &mut state.counters;
                counters.lists += 1;
                counters.commands += commands.len() as u64;
                for command in &commands {
                    match command {
                        SoftCommand::ClearRenderTarget { .. } => counters.clears += 1,
                        SoftCommand::DrawIndexed { index_count } => {
                            counters.draws += 1;
                            counters.indices += u64::from(*index_count);
                        }
                        SoftCommand::CopyBuffer { bytes } => counters.copy_bytes += *bytes as u64,
                        SoftCommand::Transition { .. } => {}
                    }
                }
                drop(state);

                allocator.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            GpuWork::Signal { fence, value } => {
                self.lock().counters.signals += 1;
                trace!(value, "Soft GPU reached signal");
                fence.complete(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_wait_short_timeout() {
        let fence = FenceShared::default();
        assert_eq!(fence.wait(1, Some(Duration::ZERO)), RawWait::TimedOut);

        fence.complete(3);
        assert_eq!(fence.wait(2, Some(Duration::ZERO)), RawWait::Signaled);

        // 已完成值不会倒退
        fence.complete(1);
        assert_eq!(fence.completed(), 3);
    }

    fn new_timeline(latency: Duration) -> Timeline {
        Timeline::new(latency, Arc::default())
    }

    #[test]
    fn test_signal_follows_execute_order() {
        let timeline = new_timeline(Duration::ZERO);
        let fence = Arc::new(FenceShared::default());
        let allocator = Arc::new(AllocatorState::default());

        allocator.in_flight.fetch_add(1, Ordering::AcqRel);
        timeline.push(GpuWork::Execute {
            commands: vec![SoftCommand::DrawIndexed { index_count: 36 }],
            allocator: Arc::clone(&allocator),
        });
        timeline.push(GpuWork::Signal { fence: Arc::clone(&fence), value: 1 });

        assert_eq!(timeline.advance(1), 1);
        assert_eq!(allocator.in_flight.load(Ordering::Acquire), 0);
        assert_eq!(fence.completed(), 0);

        assert_eq!(timeline.advance(10), 1);
        assert_eq!(fence.completed(), 1);

        let counters = timeline.counters();
        assert_eq!(counters.lists, 1);
        assert_eq!(counters.indices, 36);
        assert_eq!(counters.signals, 1);
    }

    #[test]
    fn test_execution_time_saturates() {
        let timeline = new_timeline(Duration::from_micros(10));
        assert_eq!(timeline.execution_time(0), Duration::from_micros(10));
        assert_eq!(timeline.execution_time(3), Duration::from_micros(30));

        let slow = new_timeline(Duration::from_secs(u64::MAX / 2));
        assert_eq!(slow.execution_time(3), Duration::MAX);
        assert_eq!(slow.execution_time(usize::MAX), Duration::MAX);
    }

    #[test]
    fn test_worker_drains_before_shutdown() {
        let outstanding = Arc::new(AtomicUsize::new(0));
        let timeline = Arc::new(Timeline::new(Duration::ZERO, Arc::clone(&outstanding)));
        let fence = Arc::new(FenceShared::default());
        timeline.push(GpuWork::Signal { fence: Arc::clone(&fence), value: 5 });
        timeline.shutdown();
        assert_eq!(outstanding.load(Ordering::Acquire), 1);

        let worker = {
            let timeline = Arc::clone(&timeline);
            std::thread::spawn(move || timeline.run_worker())
        };
        worker.join().unwrap();

        assert_eq!(fence.completed(), 5);
        assert_eq!(timeline.pending_len(), 0);
        assert_eq!(outstanding.load(Ordering::Acquire), 0);
    }
}
