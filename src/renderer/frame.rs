//! 帧驱动
//!
//! 管理交换链后台缓冲区的轮换。每个缓冲区槽位记录最后一次写入它的提交所对应的
//! fence 值，重新使用该槽位之前必须等待这个值完成。
//!
//! # 帧循环
//!
//! ```ignore
//! frames.begin_frame(&queue, timeout)?;   // 等待当前槽位可用
//! let mut list = queue.get_command_list()?;
//! // ... 录制命令 ...
//! let value = queue.execute_command_list(list)?;
//! frames.end_frame(value);                // 记录 fence 值并轮换到下一槽位
//! ```

use std::time::Duration;

use tracing::{debug, info};

use crate::core::error::Result;
use crate::gfx::backend::QueueBackend;
use crate::renderer::queue::CommandQueue;
use crate::renderer::sync::{FenceValue, WaitStatus};

/// 后台缓冲区槽位
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSlot {
    /// 槽位索引
    pub index: usize,
    /// 最后一次写入该槽位的提交（0 表示从未提交）
    pub fence_value: FenceValue,
}

/// 帧驱动
#[derive(Debug)]
pub struct FrameDriver {
    slots: Vec<FrameSlot>,
    current_index: usize,
    width: u32,
    height: u32,
    vsync: bool,
    tearing_supported: bool,
    frame_count: u64,
}

impl FrameDriver {
    /// 创建帧驱动
    ///
    /// # 参数
    ///
    /// * `count` - 后台缓冲区数量（至少为 2）
    /// * `width`、`height` - 初始客户区大小
    pub fn new(count: usize, width: u32, height: u32) -> Self {
        let count = count.max(2);
        let slots = (0..count)
            .map(|index| FrameSlot { index, fence_value: FenceValue::NONE })
            .collect();

        Self {
            slots,
            current_index: 0,
            width,
            height,
            vsync: false,
            tearing_supported: false,
            frame_count: 0,
        }
    }

    /// 三缓冲
    pub fn triple_buffering(width: u32, height: u32) -> Self {
        Self::new(3, width, height)
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_tearing_supported(mut self, supported: bool) -> Self {
        self.tearing_supported = supported;
        self
    }

    pub fn buffer_count(&self) -> usize {
        self.slots.len()
    }

    /// 当前后台缓冲区索引
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current_index]
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// 已呈现的帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 等待当前槽位上一次的提交完成
    ///
    /// 超时返回 `TimedOut`，此时槽位仍被 GPU 使用，调用方应继续等待而不是写入它。
    pub fn begin_frame<Q: QueueBackend>(
        &self,
        queue: &CommandQueue<Q>,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus> {
        queue.wait_for_fence_value(self.current().fence_value, timeout)
    }

    /// 记录本帧提交的 fence 值并轮换到下一个后台缓冲区
    pub fn end_frame(&mut self, fence_value: FenceValue) -> usize {
        self.slots[self.current_index].fence_value = fence_value;
        self.current_index = (self.current_index + 1) % self.slots.len();
        self.frame_count += 1;
        self.current_index
    }

    /// 调整后台缓冲区大小
    ///
    /// 先 flush 队列，因为所有后台缓冲区都可能仍被 GPU 引用。大小不变或为 0 时忽略。
    /// 返回是否真的执行了调整。
    pub fn resize<Q: QueueBackend>(
        &mut self,
        queue: &CommandQueue<Q>,
        width: u32,
        height: u32,
    ) -> Result<bool> {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return Ok(false);
        }

        queue.flush()?;
        for slot in &mut self.slots {
            slot.fence_value = FenceValue::NONE;
        }
        self.width = width;
        self.height = height;

        debug!(width, height, "Back buffers resized");
        Ok(true)
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn toggle_vsync(&mut self) -> bool {
        self.vsync = !self.vsync;
        info!(vsync = self.vsync, "VSync toggled");
        self.vsync
    }

    pub fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }

    /// 呈现参数：(sync interval, 是否允许撕裂)
    pub fn present_params(&self) -> (u32, bool) {
        let sync_interval = u32::from(self.vsync);
        let allow_tearing = self.tearing_supported && !self.vsync;
        (sync_interval, allow_tearing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::{QueueType, RecordCommands};
    use crate::gfx::soft::{SoftDevice, SoftQueue};

    fn submit_clear(queue: &mut CommandQueue<SoftQueue>, slot: usize) -> FenceValue {
        let mut list = queue.get_command_list().unwrap();
        list.clear_render_target(slot, [0.0, 0.0, 0.0, 1.0]);
        queue.execute_command_list(list).unwrap()
    }

    #[test]
    fn test_slot_rotation() {
        let mut frames = FrameDriver::triple_buffering(800, 600);
        assert_eq!(frames.buffer_count(), 3);
        assert_eq!(frames.current_index(), 0);

        frames.end_frame(FenceValue::new(1));
        frames.end_frame(FenceValue::new(2));
        assert_eq!(frames.end_frame(FenceValue::new(3)), 0);
        assert_eq!(frames.current().fence_value, FenceValue::new(1));
        assert_eq!(frames.frame_count(), 3);
    }

    #[test]
    fn test_minimum_two_buffers() {
        assert_eq!(FrameDriver::new(1, 1, 1).buffer_count(), 2);
    }

    #[test]
    fn test_begin_frame_waits_for_slot() {
        let mut queue =
            CommandQueue::new(&SoftDevice::manual(), QueueType::Direct).unwrap();
        let mut frames = FrameDriver::new(2, 640, 480);

        // 从未提交过的槽位立即可用
        assert!(frames
            .begin_frame(&queue, Some(Duration::ZERO))
            .unwrap()
            .is_complete());

        let first = submit_clear(&mut queue, frames.current_index());
        frames.end_frame(first);
        let second = submit_clear(&mut queue, frames.current_index());
        frames.end_frame(second);

        // 回到槽位 0，它的提交还未完成
        assert_eq!(
            frames.begin_frame(&queue, Some(Duration::ZERO)).unwrap(),
            WaitStatus::TimedOut
        );

        queue.queue().advance(2);
        assert_eq!(
            frames.begin_frame(&queue, Some(Duration::ZERO)).unwrap(),
            WaitStatus::Complete
        );
        assert!(!queue.is_fence_complete(second));

        queue.queue().retire_all();
    }

    #[test]
    fn test_resize_flushes_and_clears_slots() {
        let mut queue =
            CommandQueue::new(&SoftDevice::threaded(Duration::ZERO), QueueType::Direct).unwrap();
        let mut frames = FrameDriver::new(3, 640, 480);

        for _ in 0..3 {
            let value = submit_clear(&mut queue, frames.current_index());
            frames.end_frame(value);
        }
        let last = queue.last_fence_value();

        assert!(!frames.resize(&queue, 0, 480).unwrap());
        assert!(!frames.resize(&queue, 640, 480).unwrap());
        assert!(frames.resize(&queue, 1024, 768).unwrap());

        assert!(queue.is_fence_complete(last));
        assert_eq!(frames.size(), (1024, 768));
        assert!(frames.slots().iter().all(|slot| slot.fence_value.is_none()));
    }

    #[test]
    fn test_vsync_toggle() {
        let mut frames = FrameDriver::new(3, 1, 1).with_tearing_supported(true);
        assert_eq!(frames.present_params(), (0, true));

        assert!(frames.toggle_vsync());
        assert_eq!(frames.present_params(), (1, false));
    }
}
