//! 配置管理模块
//!
//! 提供引擎配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "SyncRender"
//! vsync = false
//!
//! [graphics]
//! backend = "soft"    # 或 "dx12"
//! use_warp = false
//! back_buffer_count = 3
//! gpu_latency_us = 500
//!
//! [sync]
//! wait_timeout_ms = 5000   # 省略表示无限等待
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};

/// 软件后端每条命令模拟耗时的上限（微秒）
pub const MAX_GPU_LATENCY_US: u64 = 1_000_000;

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 同步配置
    #[serde(default)]
    pub sync: SyncConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 演示程序渲染的帧数上限（仅命令行设置）
    #[serde(skip)]
    pub frame_limit: Option<u64>,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 客户区宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 客户区高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 垂直同步
    #[serde(default)]
    pub vsync: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 使用 WARP 软件适配器（仅 DX12）
    #[serde(default)]
    pub use_warp: bool,

    /// 交换链后台缓冲区数量
    #[serde(default = "default_back_buffer_count")]
    pub back_buffer_count: usize,

    /// 软件后端中每条命令的模拟执行耗时（微秒）
    #[serde(default = "default_gpu_latency_us")]
    pub gpu_latency_us: u64,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// 软件模拟 GPU 时间线（所有平台）
    Soft,
    /// DirectX 12 后端（仅 Windows）
    Dx12,
}

/// 同步配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// CPU 等待 fence 的超时时间（毫秒），`None` 表示无限等待
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "SyncRender".to_string() }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Soft }
fn default_back_buffer_count() -> usize { 3 }
fn default_gpu_latency_us() -> u64 { 500 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "syncrender.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            vsync: false,
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            use_warp: false,
            back_buffer_count: default_back_buffer_count(),
            gpu_latency_us: default_gpu_latency_us(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在或无法解析则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `-w` / `--width <value>`: 设置窗口宽度
    /// - `-h` / `--height <value>`: 设置窗口高度
    /// - `-warp` / `--warp`: 使用 WARP 适配器
    /// - `--dx12` / `--soft`: 选择图形后端
    /// - `--vsync`: 开启垂直同步
    /// - `--frames <value>`: 渲染指定帧数后退出
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-w" | "--width" => {
                    if let Some(width) = iter.next().and_then(|v| v.parse().ok()) {
                        self.window.width = width;
                    }
                }
                "-h" | "--height" => {
                    if let Some(height) = iter.next().and_then(|v| v.parse().ok()) {
                        self.window.height = height;
                    }
                }
                "--frames" => {
                    if let Some(frames) = iter.next().and_then(|v| v.parse().ok()) {
                        self.frame_limit = Some(frames);
                    }
                }
                "-warp" | "--warp" => self.graphics.use_warp = true,
                "--dx12" => self.graphics.backend = GraphicsBackend::Dx12,
                "--soft" => self.graphics.backend = GraphicsBackend::Soft,
                "--vsync" => self.window.vsync = true,
                _ => {}
            }
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }
            .into());
        }

        if !(2..=16).contains(&self.graphics.back_buffer_count) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.back_buffer_count".to_string(),
                reason: "Back buffer count must be between 2 and 16".to_string(),
            }
            .into());
        }

        if self.graphics.gpu_latency_us > MAX_GPU_LATENCY_US {
            return Err(ConfigError::InvalidValue {
                field: "graphics.gpu_latency_us".to_string(),
                reason: format!("Simulated GPU latency must not exceed {} us", MAX_GPU_LATENCY_US),
            }
            .into());
        }

        if self.sync.wait_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "sync.wait_timeout_ms".to_string(),
                reason: "Wait timeout must be greater than 0, omit it to wait without a timeout"
                    .to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// fence 等待超时，`None` 表示无限等待
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.sync.wait_timeout_ms.map(Duration::from_millis)
    }
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Soft => "Software",
            GraphicsBackend::Dx12 => "DirectX 12",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.backend, GraphicsBackend::Soft);
        assert_eq!(config.graphics.back_buffer_count, 3);
        assert_eq!(config.wait_timeout(), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        config.window.width = 800;
        config.graphics.back_buffer_count = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_latency_and_timeout() {
        let mut config = Config::default();
        config.graphics.gpu_latency_us = MAX_GPU_LATENCY_US;
        assert!(config.validate().is_ok());

        config.graphics.gpu_latency_us = u64::MAX / 2;
        assert!(config.validate().is_err());

        config.graphics.gpu_latency_us = 500;
        config.sync.wait_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.sync.wait_timeout_ms = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["sync_render", "-w", "640", "--height", "480", "--warp", "--dx12", "--frames", "12"]);

        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert!(config.graphics.use_warp);
        assert_eq!(config.graphics.backend, GraphicsBackend::Dx12);
        assert_eq!(config.frame_limit, Some(12));
    }

    #[test]
    fn test_apply_args_ignores_malformed_values() {
        let mut config = Config::default();
        config.apply_args(["--width", "wide", "--frames"]);

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.frame_limit, None);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            backend = "dx12"

            [sync]
            wait_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, GraphicsBackend::Dx12);
        assert_eq!(config.graphics.back_buffer_count, 3);
        assert_eq!(config.wait_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.window.title, "SyncRender");
    }
}
