//! 应用程序上下文
//!
//! 显式构造、由 `main` 持有的上下文对象：持有图形设备、每种类型一个命令队列
//! （direct / compute / copy）、帧驱动和帧统计。
//!
//! # 生命周期
//!
//! `Application` 被丢弃时，如果任何队列仍有未完成的提交，会先 flush 全部队列，
//! 保证在释放 GPU 对象之前 GPU 已经不再引用它们。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::app::event::{KeyCode, KeyEventArgs, KeyState, RenderEventArgs, UpdateEventArgs, WindowEvent};
use crate::app::game::Game;
use crate::core::error::Result;
use crate::core::{Config, FrameStats};
use crate::gfx::backend::{GraphicsDevice, QueueType};
use crate::renderer::frame::FrameDriver;
use crate::renderer::queue::CommandQueue;
use crate::renderer::sync::{FenceValue, WaitStatus};

/// 后台缓冲区等待超时后，重试等待的最短时间
pub const MIN_RETRY_WAIT: Duration = Duration::from_millis(1);

fn retry_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.map(|timeout| timeout.max(MIN_RETRY_WAIT))
}

/// 应用程序
pub struct Application<D: GraphicsDevice> {
    device: D,
    config: Config,
    direct_queue: CommandQueue<D::Queue>,
    compute_queue: CommandQueue<D::Queue>,
    copy_queue: CommandQueue<D::Queue>,
    frames: FrameDriver,
    stats: FrameStats,
    events: VecDeque<WindowEvent>,
    quit_requested: bool,
}

impl<D: GraphicsDevice> Application<D> {
    /// 在设备上创建三种命令队列和帧驱动
    pub fn new(device: D, config: Config) -> Result<Self> {
        let direct_queue = CommandQueue::new(&device, QueueType::Direct)?;
        let compute_queue = CommandQueue::new(&device, QueueType::Compute)?;
        let copy_queue = CommandQueue::new(&device, QueueType::Copy)?;

        let frames = FrameDriver::new(
            config.graphics.back_buffer_count,
            config.window.width,
            config.window.height,
        )
        .with_vsync(config.window.vsync)
        .with_tearing_supported(device.supports_tearing());

        info!(
            backend = device.backend_name(),
            title = %config.window.title,
            width = config.window.width,
            height = config.window.height,
            back_buffers = frames.buffer_count(),
            tearing_supported = frames.tearing_supported(),
            "Application initialized"
        );

        Ok(Self {
            device,
            config,
            direct_queue,
            compute_queue,
            copy_queue,
            frames,
            stats: FrameStats::new(),
            events: VecDeque::new(),
            quit_requested: false,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 获取指定类型的命令队列
    pub fn command_queue(&self, queue_type: QueueType) -> &CommandQueue<D::Queue> {
        match queue_type {
            QueueType::Direct => &self.direct_queue,
            QueueType::Compute => &self.compute_queue,
            QueueType::Copy => &self.copy_queue,
        }
    }

    pub fn command_queue_mut(&mut self, queue_type: QueueType) -> &mut CommandQueue<D::Queue> {
        match queue_type {
            QueueType::Direct => &mut self.direct_queue,
            QueueType::Compute => &mut self.compute_queue,
            QueueType::Copy => &mut self.copy_queue,
        }
    }

    pub fn frames(&self) -> &FrameDriver {
        &self.frames
    }

    pub fn frame_stats(&self) -> &FrameStats {
        &self.stats
    }

    /// fence 等待超时，来自配置
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.config.wait_timeout()
    }

    /// 等待所有队列上之前提交的工作完成
    pub fn flush(&self) -> Result<()> {
        for queue_type in QueueType::ALL {
            self.command_queue(queue_type).flush()?;
        }
        Ok(())
    }

    /// 请求在当前帧结束后退出主循环
    pub fn quit(&mut self) {
        if !self.quit_requested {
            info!("Quit requested");
        }
        self.quit_requested = true;
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// 投递窗口事件，在下一帧开始时分发
    pub fn post_event(&mut self, event: WindowEvent) {
        self.events.push_back(event);
    }

    /// 呈现当前后台缓冲区
    ///
    /// `fence_value` 是本帧最后一次写入该缓冲区的提交，下次轮到这个缓冲区时会等待它。
    /// 返回新的后台缓冲区索引。
    pub fn present(&mut self, fence_value: FenceValue) -> usize {
        let (sync_interval, allow_tearing) = self.frames.present_params();
        let next = self.frames.end_frame(fence_value);
        debug!(
            fence_value = fence_value.value(),
            sync_interval,
            allow_tearing,
            next_back_buffer = next,
            "Present"
        );
        next
    }

    /// 切换垂直同步
    pub fn toggle_vsync(&mut self) -> bool {
        self.frames.toggle_vsync()
    }

    /// 调整后台缓冲区大小
    ///
    /// 先 flush 所有队列，因为任何队列都可能仍在使用后台缓冲区。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 || (width, height) == self.frames.size() {
            return Ok(false);
        }
        self.flush()?;
        self.frames.resize(&self.direct_queue, width, height)
    }

    /// 运行主循环
    ///
    /// `frame_limit` 为 `None` 时一直运行到 [`quit`](Self::quit) 被调用。
    /// 返回渲染的帧数。
    pub fn run<G: Game<D>>(&mut self, game: &mut G, frame_limit: Option<u64>) -> Result<u64> {
        info!(game = game.name(), ?frame_limit, "Loading content");
        game.load_content(self)?;

        let start = Instant::now();
        let mut last = start;
        let mut frame_number = 0u64;

        while !self.quit_requested && frame_limit.map_or(true, |limit| frame_number < limit) {
            self.dispatch_events(game)?;
            if self.quit_requested {
                break;
            }

            self.stats.record_frame();
            let now = Instant::now();
            let elapsed_time = now.duration_since(last).as_secs_f64();
            let total_time = now.duration_since(start).as_secs_f64();
            last = now;

            let update = UpdateEventArgs { elapsed_time, total_time, frame_number };
            game.on_update(self, &update)?;

            self.wait_for_back_buffer()?;

            let render = RenderEventArgs {
                elapsed_time,
                total_time,
                frame_number,
                back_buffer_index: self.frames.current_index(),
            };
            game.on_render(self, &render)?;

            frame_number += 1;
        }

        info!(game = game.name(), frames = frame_number, "Unloading content");
        game.unload_content(self);
        self.flush()?;

        Ok(frame_number)
    }

    /// 阻塞直到当前后台缓冲区不再被 GPU 使用
    ///
    /// 配置了超时时，超时后继续等待：写入仍在使用的缓冲区是不允许的。
    /// 每帧只在第一次超时时警告，重试的等待时间不低于 [`MIN_RETRY_WAIT`]。
    fn wait_for_back_buffer(&self) -> Result<()> {
        let mut timeout = self.wait_timeout();
        let mut timeouts = 0u32;
        loop {
            match self.frames.begin_frame(&self.direct_queue, timeout)? {
                WaitStatus::Complete => {
                    if timeouts > 0 {
                        debug!(timeouts, "Back buffer released after timed out waits");
                    }
                    return Ok(());
                }
                WaitStatus::TimedOut => {
                    if timeouts == 0 {
                        warn!(
                            back_buffer = self.frames.current_index(),
                            ?timeout,
                            "GPU is behind, still waiting for back buffer"
                        );
                    }
                    timeouts += 1;
                    timeout = retry_timeout(timeout);
                }
            }
        }
    }

    fn dispatch_events<G: Game<D>>(&mut self, game: &mut G) -> Result<()> {
        while let Some(event) = self.events.pop_front() {
            debug!(%event, "Dispatching window event");
            match event {
                WindowEvent::Key(args) => match args.state {
                    KeyState::Pressed => {
                        self.handle_key(&args);
                        game.on_key_pressed(self, &args);
                    }
                    KeyState::Released => game.on_key_released(self, &args),
                },
                WindowEvent::MouseMoved(args) => game.on_mouse_moved(self, &args),
                WindowEvent::MouseWheel(args) => game.on_mouse_wheel(self, &args),
                WindowEvent::Resize(args) => {
                    if self.resize(args.width, args.height)? {
                        game.on_resize(self, &args)?;
                    }
                }
                WindowEvent::Destroy => {
                    game.on_window_destroy(self);
                    self.quit();
                }
            }
        }
        Ok(())
    }

    /// 窗口级快捷键：V 切换垂直同步，Escape / Alt+F4 退出
    fn handle_key(&mut self, args: &KeyEventArgs) {
        match args.key {
            KeyCode::V => {
                self.toggle_vsync();
            }
            KeyCode::Escape => self.quit(),
            KeyCode::F4 if args.modifiers.alt => self.quit(),
            _ => {}
        }
    }
}

impl<D: GraphicsDevice> Drop for Application<D> {
    fn drop(&mut self) {
        let in_flight = QueueType::ALL.iter().any(|&queue_type| {
            let queue = self.command_queue(queue_type);
            !queue.is_fence_complete(queue.last_fence_value())
        });
        if !in_flight {
            return;
        }

        debug!("Flushing command queues before shutdown");
        if let Err(e) = self.flush() {
            error!("Failed to flush command queues on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::event::ResizeEventArgs;
    use crate::gfx::soft::SoftDevice;

    fn app() -> Application<SoftDevice> {
        Application::new(SoftDevice::threaded(Duration::ZERO), Config::default()).unwrap()
    }

    #[test]
    fn test_one_queue_per_type() {
        let app = app();
        for queue_type in QueueType::ALL {
            assert_eq!(app.command_queue(queue_type).queue_type(), queue_type);
        }
        assert_eq!(app.frames().buffer_count(), 3);
    }

    #[test]
    fn test_flush_completes_every_queue() {
        let mut app = app();
        let value = {
            let queue = app.command_queue_mut(QueueType::Compute);
            let list = queue.get_command_list().unwrap();
            queue.execute_command_list(list).unwrap()
        };

        app.flush().unwrap();
        assert!(app.command_queue(QueueType::Compute).is_fence_complete(value));
        for queue_type in QueueType::ALL {
            let queue = app.command_queue(queue_type);
            assert!(queue.is_fence_complete(queue.last_fence_value()));
        }
    }

    #[test]
    fn test_shortcut_keys() {
        let mut app = app();
        assert!(app.frames().tearing_supported());
        assert_eq!(app.frames().present_params(), (0, true));

        app.handle_key(&KeyEventArgs::pressed(KeyCode::V));
        assert!(app.frames().vsync());
        assert_eq!(app.frames().present_params(), (1, false));

        app.handle_key(&KeyEventArgs::pressed(KeyCode::F4));
        assert!(!app.is_quit_requested());

        app.handle_key(&KeyEventArgs::pressed(KeyCode::F4).with_alt());
        assert!(app.is_quit_requested());
    }

    #[test]
    fn test_retry_timeout_backs_off() {
        assert_eq!(retry_timeout(None), None);
        assert_eq!(retry_timeout(Some(Duration::ZERO)), Some(MIN_RETRY_WAIT));
        assert_eq!(retry_timeout(Some(Duration::from_secs(5))), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_resize_ignores_zero_and_same_size() {
        let mut app = app();
        assert!(!app.resize(0, 100).unwrap());
        assert!(!app.resize(1280, 720).unwrap());
        assert!(app.resize(800, 600).unwrap());
        assert_eq!(app.frames().size(), (800, 600));

        app.post_event(WindowEvent::Resize(ResizeEventArgs { width: 800, height: 600 }));
        assert_eq!(app.events.len(), 1);
    }
}
