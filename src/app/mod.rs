//! 应用程序层
//!
//! - `application`：显式构造的应用程序上下文，驱动帧循环
//! - `game`：演示程序实现的钩子接口
//! - `event`：窗口事件参数
//! - `demo`：演示程序

pub mod application;
pub mod demo;
pub mod event;
pub mod game;

pub use application::Application;
pub use demo::{ClearScreen, IdleFrames, SpinningCube};
pub use event::WindowEvent;
pub use game::Game;
