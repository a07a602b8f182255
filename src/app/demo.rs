//! 演示程序
//!
//! - [`ClearScreen`]：每帧清屏并在呈现前转换后台缓冲区状态
//! - [`SpinningCube`]：通过复制队列上传一次立方体数据，之后每帧绘制 36 个索引
//! - [`IdleFrames`]：每帧提交一个空命令列表，适用于任何后端

use tracing::{debug, info};

use crate::app::application::Application;
use crate::app::event::{KeyCode, KeyEventArgs, MouseWheelEventArgs, RenderEventArgs, ResizeEventArgs, UpdateEventArgs};
use crate::app::game::Game;
use crate::core::error::Result;
use crate::gfx::backend::{GraphicsDevice, QueueBackend, QueueType, RecordCommands, ResourceState};
use crate::renderer::sync::FenceValue;

/// 清屏颜色（矢车菊蓝）
pub const CLEAR_COLOR: [f32; 4] = [0.4, 0.6, 0.9, 1.0];

/// 立方体顶点：位置 + 颜色
pub const CUBE_VERTICES: [[f32; 6]; 8] = [
    [-1.0, -1.0, -1.0, 0.0, 0.0, 0.0],
    [-1.0, 1.0, -1.0, 0.0, 1.0, 0.0],
    [1.0, 1.0, -1.0, 1.0, 1.0, 0.0],
    [1.0, -1.0, -1.0, 1.0, 0.0, 0.0],
    [-1.0, -1.0, 1.0, 0.0, 0.0, 1.0],
    [-1.0, 1.0, 1.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0, 1.0, 0.0, 1.0],
];

/// 立方体索引，12 个三角形
pub const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 0, 2, 3, //
    4, 6, 5, 4, 7, 6, //
    4, 5, 1, 4, 1, 0, //
    3, 2, 6, 3, 6, 7, //
    1, 5, 6, 1, 6, 2, //
    4, 0, 3, 4, 3, 7,
];

/// 录制清屏命令：Present → RenderTarget，清除，RenderTarget → Present
fn record_clear<L: RecordCommands>(list: &mut L, back_buffer: usize, color: [f32; 4]) {
    list.transition(back_buffer, ResourceState::Present, ResourceState::RenderTarget);
    list.clear_render_target(back_buffer, color);
}

fn record_present<L: RecordCommands>(list: &mut L, back_buffer: usize) {
    list.transition(back_buffer, ResourceState::RenderTarget, ResourceState::Present);
}

/// 清屏演示
#[derive(Debug)]
pub struct ClearScreen {
    color: [f32; 4],
    frames_rendered: u64,
}

impl ClearScreen {
    pub fn new() -> Self {
        Self::with_color(CLEAR_COLOR)
    }

    pub fn with_color(color: [f32; 4]) -> Self {
        Self { color, frames_rendered: 0 }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl Default for ClearScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Game<D> for ClearScreen
where
    D: GraphicsDevice,
    <D::Queue as QueueBackend>::List: RecordCommands,
{
    fn name(&self) -> &str {
        "Clear Screen"
    }

    fn load_content(&mut self, _app: &mut Application<D>) -> Result<()> {
        Ok(())
    }

    fn unload_content(&mut self, _app: &mut Application<D>) {}

    fn on_update(&mut self, _app: &mut Application<D>, _args: &UpdateEventArgs) -> Result<()> {
        Ok(())
    }

    fn on_render(&mut self, app: &mut Application<D>, args: &RenderEventArgs) -> Result<()> {
        let back_buffer = args.back_buffer_index;
        let queue = app.command_queue_mut(QueueType::Direct);

        let mut list = queue.get_command_list()?;
        record_clear(list.raw_mut(), back_buffer, self.color);
        record_present(list.raw_mut(), back_buffer);
        let fence_value = queue.execute_command_list(list)?;

        app.present(fence_value);
        self.frames_rendered += 1;
        Ok(())
    }
}

/// 旋转立方体演示
#[derive(Debug)]
pub struct SpinningCube {
    /// 上传完成时复制队列的 fence 值
    upload_fence: FenceValue,
    content_loaded: bool,
    /// 绕 (0, 1, 1) 轴的旋转角度（度）
    angle: f32,
    /// 垂直视野（度）
    fov: f32,
    aspect_ratio: f32,
    draws: u64,
}

impl SpinningCube {
    /// 每秒旋转的角度
    pub const DEGREES_PER_SECOND: f64 = 90.0;

    pub fn new() -> Self {
        Self {
            upload_fence: FenceValue::NONE,
            content_loaded: false,
            angle: 0.0,
            fov: 45.0,
            aspect_ratio: 16.0 / 9.0,
            draws: 0,
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn upload_fence(&self) -> FenceValue {
        self.upload_fence
    }

    pub fn is_content_loaded(&self) -> bool {
        self.content_loaded
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl Default for SpinningCube {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Game<D> for SpinningCube
where
    D: GraphicsDevice,
    <D::Queue as QueueBackend>::List: RecordCommands,
{
    fn name(&self) -> &str {
        "Spinning Cube"
    }

    /// 顶点和索引数据只上传一次，等待复制队列完成后才开始渲染
    fn load_content(&mut self, app: &mut Application<D>) -> Result<()> {
        let (width, height) = app.frames().size();
        self.aspect_ratio = width as f32 / height.max(1) as f32;

        let copy_queue = app.command_queue_mut(QueueType::Copy);
        let mut list = copy_queue.get_command_list()?;
        list.raw_mut().copy_buffer(std::mem::size_of_val(&CUBE_VERTICES));
        list.raw_mut().copy_buffer(std::mem::size_of_val(&CUBE_INDICES));
        let fence_value = copy_queue.execute_command_list(list)?;

        copy_queue.wait_for_fence_value(fence_value, None)?;
        self.upload_fence = fence_value;
        self.content_loaded = true;

        info!(fence_value = fence_value.value(), "Cube geometry uploaded");
        Ok(())
    }

    fn unload_content(&mut self, _app: &mut Application<D>) {
        self.content_loaded = false;
    }

    fn on_update(&mut self, _app: &mut Application<D>, args: &UpdateEventArgs) -> Result<()> {
        self.angle = ((args.total_time * Self::DEGREES_PER_SECOND) % 360.0) as f32;
        Ok(())
    }

    fn on_render(&mut self, app: &mut Application<D>, args: &RenderEventArgs) -> Result<()> {
        let back_buffer = args.back_buffer_index;
        let queue = app.command_queue_mut(QueueType::Direct);

        let mut list = queue.get_command_list()?;
        record_clear(list.raw_mut(), back_buffer, CLEAR_COLOR);
        list.raw_mut().draw_indexed(CUBE_INDICES.len() as u32);
        record_present(list.raw_mut(), back_buffer);
        let fence_value = queue.execute_command_list(list)?;

        app.present(fence_value);
        self.draws += 1;
        Ok(())
    }

    fn on_key_pressed(&mut self, _app: &mut Application<D>, args: &KeyEventArgs) {
        if args.key == KeyCode::Space {
            self.fov = 45.0;
        }
    }

    fn on_mouse_wheel(&mut self, _app: &mut Application<D>, args: &MouseWheelEventArgs) {
        self.fov = (self.fov - args.wheel_delta).clamp(12.0, 90.0);
        debug!(fov = self.fov, "Field of view changed");
    }

    fn on_resize(&mut self, _app: &mut Application<D>, args: &ResizeEventArgs) -> Result<()> {
        self.aspect_ratio = args.width as f32 / args.height.max(1) as f32;
        Ok(())
    }
}

/// 空帧演示
///
/// 每帧获取一个命令列表并直接提交，只驱动同步核心，不需要录制接口。
#[derive(Debug, Default)]
pub struct IdleFrames {
    last_fence: FenceValue,
}

impl IdleFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_fence(&self) -> FenceValue {
        self.last_fence
    }
}

impl<D: GraphicsDevice> Game<D> for IdleFrames {
    fn name(&self) -> &str {
        "Idle Frames"
    }

    fn load_content(&mut self, _app: &mut Application<D>) -> Result<()> {
        Ok(())
    }

    fn unload_content(&mut self, _app: &mut Application<D>) {}

    fn on_update(&mut self, _app: &mut Application<D>, _args: &UpdateEventArgs) -> Result<()> {
        Ok(())
    }

    fn on_render(&mut self, app: &mut Application<D>, _args: &RenderEventArgs) -> Result<()> {
        let queue = app.command_queue_mut(QueueType::Direct);
        let list = queue.get_command_list()?;
        self.last_fence = queue.execute_command_list(list)?;
        app.present(self.last_fence);
        Ok(())
    }
}
