//! 核心功能模块
//!
//! 本模块提供了与具体图形 API 无关的基础功能：日志系统、配置管理、错误处理和帧统计。
//!
//! # 模块组织
//!
//! - `log`：日志系统，基于 `tracing` 的结构化日志
//! - `config`：配置管理，支持从 TOML 文件加载并由命令行覆盖
//! - `error`：错误处理，定义统一的错误类型
//! - `metrics`：帧率统计

pub mod config;
pub mod error;
pub mod log;
pub mod metrics;

pub use config::Config;
pub use error::{Result, SyncRenderError};
pub use metrics::FrameStats;
