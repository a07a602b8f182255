//! 游戏接口
//!
//! 每个演示程序实现一个 [`Game`]。`Application::run` 按下面的顺序调用钩子：
//!
//! ```text
//! load_content ──▶ { 输入事件钩子 ──▶ on_update ──▶ on_render } × N ──▶ unload_content
//! ```
//!
//! 钩子通过 `&mut Application` 访问命令队列和帧驱动。

use crate::app::application::Application;
use crate::app::event::{
    KeyEventArgs, MouseMotionEventArgs, MouseWheelEventArgs, RenderEventArgs, ResizeEventArgs,
    UpdateEventArgs,
};
use crate::core::error::Result;
use crate::gfx::backend::GraphicsDevice;

pub trait Game<D: GraphicsDevice> {
    /// 名称，用于日志
    fn name(&self) -> &str;

    /// 加载资源（上传顶点数据等），在第一帧之前调用一次
    fn load_content(&mut self, app: &mut Application<D>) -> Result<()>;

    /// 释放资源，在最后一帧之后、队列 flush 之前调用
    fn unload_content(&mut self, app: &mut Application<D>);

    fn on_update(&mut self, app: &mut Application<D>, args: &UpdateEventArgs) -> Result<()>;

    /// 录制并提交本帧命令，然后调用 `Application::present`
    fn on_render(&mut self, app: &mut Application<D>, args: &RenderEventArgs) -> Result<()>;

    fn on_key_pressed(&mut self, _app: &mut Application<D>, _args: &KeyEventArgs) {}

    fn on_key_released(&mut self, _app: &mut Application<D>, _args: &KeyEventArgs) {}

    fn on_mouse_moved(&mut self, _app: &mut Application<D>, _args: &MouseMotionEventArgs) {}

    fn on_mouse_wheel(&mut self, _app: &mut Application<D>, _args: &MouseWheelEventArgs) {}

    /// 后台缓冲区已经调整完毕后调用
    fn on_resize(&mut self, _app: &mut Application<D>, _args: &ResizeEventArgs) -> Result<()> {
        Ok(())
    }

    fn on_window_destroy(&mut self, _app: &mut Application<D>) {}
}
