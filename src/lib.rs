//! SyncRender - GPU 命令提交与帧同步核心
//!
//! 管理命令分配器和命令列表的回收，向 GPU 提交工作，并用 fence 值保证
//! CPU 与 GPU 的执行顺序：CPU 不会改写 GPU 仍在使用的资源，也不会无谓地等待。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（配置、日志、错误处理、帧统计）
//! - `gfx`: 图形后端抽象层（软件后端、DirectX 12）
//! - `renderer`: fence、命令池、命令队列管理器、帧驱动
//! - `app`: 应用程序上下文、游戏接口和演示程序
//!
//! # 使用示例
//!
//! ```no_run
//! use std::time::Duration;
//! use sync_render::gfx::{QueueType, RecordCommands, SoftDevice};
//! use sync_render::renderer::CommandQueue;
//!
//! let device = SoftDevice::threaded(Duration::from_micros(100));
//! let mut queue = CommandQueue::new(&device, QueueType::Direct)?;
//!
//! let mut list = queue.get_command_list()?;
//! list.draw_indexed(36);
//! let fence_value = queue.execute_command_list(list)?;
//!
//! queue.wait_for_fence_value(fence_value, None)?;
//! # Ok::<(), sync_render::core::SyncRenderError>(())
//! ```

pub mod app;
pub mod core;
pub mod gfx;
pub mod renderer;
