//! GPU 同步机制模块
//!
//! 提供 CPU-GPU 同步原语：单调递增的 fence 值，以及绑定在 fence 上的 OS 等待句柄。
//!
//! # 约定
//!
//! - fence 值 0 保留为"从未提交"，`signal` 返回的第一个值是 1
//! - 值 V 已完成 ⇔ GPU 报告的已完成计数 ≥ V
//! - 对已完成的值（包括 0）调用 `is_complete`/`wait_until` 直接返回，不会触碰 OS 等待原语
//! - 超时的等待只把控制权交还调用方，对应的 GPU 工作仍在执行，该值依旧处于未完成状态
//!
//! # 示例
//!
//! ```ignore
//! let fence = Fence::new(&queue)?;
//! let value = fence.signal(&queue)?;
//! if fence.wait_until(value, Some(Duration::from_millis(16)))? == WaitStatus::TimedOut {
//!     // GPU 仍在处理，稍后再检查
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use crate::core::error::Result;
use crate::gfx::backend::{FenceBackend, QueueBackend, RawWait};

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 保留值："从未提交"
    pub const NONE: FenceValue = FenceValue(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 是否为保留的"从未提交"值
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// 目标值已完成
    Complete,
    /// 超时，目标值仍未完成（GPU 工作不会被取消）
    TimedOut,
}

impl WaitStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, WaitStatus::Complete)
    }
}

/// Fence 计数，用于测试和诊断
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceStats {
    /// 发出的 signal 次数
    pub signals: u64,
    /// 查询 GPU 已完成值的次数
    pub completion_queries: u64,
    /// 真正进入 OS 等待原语的次数
    pub os_waits: u64,
    /// 超时次数
    pub timeouts: u64,
}

/// Fence
///
/// 封装后端 fence 对象和 CPU 侧的 signal 计数器。
/// 计数器只增不减，因此每次 `signal` 返回的值严格递增。
pub struct Fence<Q: QueueBackend> {
    raw: Q::Fence,
    /// 最近一次 signal 的值（CPU 侧）
    last_signaled: AtomicU64,
    completion_queries: AtomicU64,
    os_waits: AtomicU64,
    timeouts: AtomicU64,
}

impl<Q: QueueBackend> Fence<Q> {
    /// 在队列上创建 fence，初始值为 0
    pub fn new(queue: &Q) -> Result<Self> {
        Ok(Self {
            raw: queue.create_fence()?,
            last_signaled: AtomicU64::new(0),
            completion_queries: AtomicU64::new(0),
            os_waits: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        })
    }

    /// 后端 fence 对象
    pub fn raw(&self) -> &Q::Fence {
        &self.raw
    }

    /// 递增计数器，并让队列在之前提交的工作全部完成时把 fence 设为新值
    ///
    /// 对 CPU 是非阻塞的，立即返回新值。
    pub fn signal(&self, queue: &Q) -> Result<FenceValue> {
        let value = FenceValue::new(self.last_signaled.fetch_add(1, Ordering::AcqRel)).next();
        queue.signal(&self.raw, value.value())?;
        trace!(queue = queue.queue_type().name(), fence_value = value.value(), "Fence signaled");
        Ok(value)
    }

    /// 最近一次 signal 的值
    pub fn last_signaled(&self) -> FenceValue {
        FenceValue::new(self.last_signaled.load(Ordering::Acquire))
    }

    /// GPU 报告的已完成值
    pub fn completed_value(&self) -> FenceValue {
        self.completion_queries.fetch_add(1, Ordering::Relaxed);
        FenceValue::new(self.raw.completed_value())
    }

    /// 值是否已完成，非阻塞
    ///
    /// 值 0 永远视为已完成，且不会查询 GPU。
    pub fn is_complete(&self, value: FenceValue) -> bool {
        value.is_none() || self.completed_value() >= value
    }

    /// 阻塞直到 `value` 完成或超时
    ///
    /// `timeout` 为 `None` 表示无限等待。值已完成时立即返回 `Complete`，不进入 OS 等待。
    /// 超时返回 `TimedOut`，这不是错误：对应的 GPU 工作仍在执行。
    pub fn wait_until(&self, value: FenceValue, timeout: Option<Duration>) -> Result<WaitStatus> {
        if self.is_complete(value) {
            return Ok(WaitStatus::Complete);
        }

        self.os_waits.fetch_add(1, Ordering::Relaxed);
        match self.raw.wait_for_value(value.value(), timeout)? {
            RawWait::Signaled => Ok(WaitStatus::Complete),
            RawWait::TimedOut => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    fence_value = value.value(),
                    completed = self.raw.completed_value(),
                    ?timeout,
                    "Fence wait timed out, value still pending"
                );
                Ok(WaitStatus::TimedOut)
            }
        }
    }

    /// 发出 signal 并无限等待，保证之前提交的所有工作都已完成
    ///
    /// 用于关闭程序和调整交换链大小之前。
    pub fn flush(&self, queue: &Q) -> Result<FenceValue> {
        let value = self.signal(queue)?;
        self.wait_until(value, None)?;
        Ok(value)
    }

    /// 诊断计数
    pub fn stats(&self) -> FenceStats {
        FenceStats {
            signals: self.last_signaled.load(Ordering::Acquire),
            completion_queries: self.completion_queries.load(Ordering::Relaxed),
            os_waits: self.os_waits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
