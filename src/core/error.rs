//! 错误处理模块
//!
//! 定义了引擎中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **致命设备错误**：创建、提交、signal 等 GPU API 调用失败。
//!   这一层无法恢复，直接向上传播，由 `main` 记录并终止程序。
//! - **等待超时**：不是错误，见 `renderer::sync::WaitStatus`。
//! - **误用**：例如重置仍被 GPU 引用的命令分配器。通过池化访问在结构上避免，
//!   后端检测到时作为图形错误报告。

use thiserror::Error;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, SyncRenderError>;

/// SyncRender 的错误类型
#[derive(Debug, Error)]
pub enum SyncRenderError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形 API 错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// 运行时错误
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
///
/// 每个变体对应命令队列生命周期中的一个 GPU 调用点。
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// 命令队列创建失败
    #[error("Command queue creation failed: {0}")]
    QueueCreation(String),

    /// Fence 或等待句柄创建失败
    #[error("Fence creation failed: {0}")]
    FenceCreation(String),

    /// 命令分配器创建或重置失败
    #[error("Command allocator error: {0}")]
    AllocatorCreation(String),

    /// 命令列表创建或重置失败
    #[error("Command list error: {0}")]
    ListCreation(String),

    /// 关闭或提交命令列表失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// 队列 signal 失败
    #[error("Fence signal failed: {0}")]
    Signal(String),

    /// 等待原语失败（不包括超时）
    #[error("Fence wait failed: {0}")]
    Wait(String),

    /// 设备已移除或丢失
    #[error("Device removed: {0}")]
    DeviceRemoved(String),
}
