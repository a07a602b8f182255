//! 帧统计模块
//!
//! FrameStats 用于跟踪帧率与帧时间，每经过一秒输出一次 FPS。

use std::time::{Duration, Instant};
use tracing::info;

/// 帧统计（帧率、帧时间、总帧数）
#[derive(Debug)]
pub struct FrameStats {
    frames_in_window: u32,
    window_start: Instant,
    last_frame: Instant,
    start: Instant,
    total_frames: u64,
    fps: f32,
    frame_time_ms: f32,
}

impl FrameStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            frames_in_window: 0,
            window_start: now,
            last_frame: now,
            start: now,
            total_frames: 0,
            fps: 0.0,
            frame_time_ms: 0.0,
        }
    }

    /// 记录一帧，返回距离上一帧的时间
    pub fn record_frame(&mut self) -> Duration {
        self.record_frame_at(Instant::now())
    }

    fn record_frame_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.frames_in_window += 1;
        self.total_frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames_in_window as f32 / elapsed.as_secs_f32();
            self.frame_time_ms = 1000.0 / self.fps;
            info!(fps = self.fps, frame_time_ms = self.frame_time_ms, "Frame rate");
            self.frames_in_window = 0;
            self.window_start = now;
        }

        delta
    }

    /// 获取当前 FPS
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// 获取当前帧时间（毫秒）
    pub fn frame_time_ms(&self) -> f32 {
        self.frame_time_ms
    }

    /// 已记录的总帧数
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// 自创建以来经过的时间
    pub fn elapsed(&self) -> Duration {
        self.last_frame.saturating_duration_since(self.start)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_window() {
        let mut stats = FrameStats::new();
        let base = stats.window_start;

        for i in 1..=10 {
            stats.record_frame_at(base + Duration::from_millis(100 * i));
        }

        assert_eq!(stats.total_frames(), 10);
        assert!((stats.fps() - 10.0).abs() < 0.01);
        assert!((stats.frame_time_ms() - 100.0).abs() < 0.1);
        assert_eq!(stats.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_delta_time() {
        let mut stats = FrameStats::new();
        let base = stats.last_frame;

        let delta = stats.record_frame_at(base + Duration::from_millis(16));
        assert_eq!(delta, Duration::from_millis(16));
        assert_eq!(stats.fps(), 0.0);
    }
}
