//! 图形后端模块
//!
//! 本模块封装了不同图形 API 的底层实现，包括：
//! - 软件后端：在所有平台可用，用软件时间线模拟 GPU 异步执行
//! - DirectX 12：Windows 平台的高性能图形 API
//!
//! 所有后端都实现了 `backend` 中的 `GraphicsDevice` / `QueueBackend` trait，
//! 命令队列管理器因此可以在不同后端之间无缝切换。

pub mod backend;
pub mod soft;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::{GraphicsDevice, QueueBackend, QueueType, RecordCommands};
pub use soft::SoftDevice;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Device;
