//! SyncRender 演示程序
//!
//! 通过配置文件或命令行参数选择图形后端，运行一个演示程序指定的帧数后退出。
//!
//! # 使用方法
//!
//! ```bash
//! # 软件后端，旋转立方体
//! cargo run -- --frames 600
//!
//! # 使用 DirectX 12 + WARP（仅 Windows）
//! cargo run -- --dx12 --warp
//! ```
//!
//! # 架构概览
//!
//! ```text
//! ┌──────────────┐
//! │   main.rs    │  入口：配置、日志、后端选择
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ Application  │  帧循环、事件分发
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ CommandQueue │  分配器/列表回收、提交、fence
//! └──────┬───────┘
//!        │
//!   ┌────┴────┐
//!   │         │
//! ┌─▼──┐   ┌──▼──┐
//! │Soft│   │DX12 │  具体后端实现
//! └────┘   └─────┘
//! ```

use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use sync_render::app::{Application, Game, SpinningCube};
use sync_render::core::config::GraphicsBackend;
use sync_render::core::{log, Config};
use sync_render::gfx::{GraphicsDevice, SoftDevice};

/// 未指定 `--frames` 时渲染的帧数
const DEFAULT_FRAME_LIMIT: u64 = 300;

fn main() {
    if let Err(e) = run() {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// 初始化流程
///
/// 1. 加载配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 验证配置
/// 4. 初始化日志系统
/// 5. 创建设备并运行演示，退出前由主循环 flush 一次
fn run() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args().skip(1));
    config.validate().context("Invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file);

    info!(version = env!("CARGO_PKG_VERSION"), "SyncRender starting...");
    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        back_buffers = config.graphics.back_buffer_count,
        wait_timeout = ?config.wait_timeout(),
        "Graphics configuration"
    );

    let frame_limit = config.frame_limit.unwrap_or(DEFAULT_FRAME_LIMIT);

    match config.graphics.backend {
        GraphicsBackend::Soft => {
            let latency = Duration::from_micros(config.graphics.gpu_latency_us);
            let device = SoftDevice::threaded(latency);
            run_demo(device, config, &mut SpinningCube::new(), frame_limit)
        }
        GraphicsBackend::Dx12 => run_dx12(config, frame_limit),
    }
}

#[cfg(target_os = "windows")]
fn run_dx12(config: Config, frame_limit: u64) -> anyhow::Result<()> {
    use sync_render::app::IdleFrames;
    use sync_render::gfx::Dx12Device;

    let device =
        Dx12Device::new(config.graphics.use_warp).context("Failed to create D3D12 device")?;
    run_demo(device, config, &mut IdleFrames::new(), frame_limit)
}

#[cfg(not(target_os = "windows"))]
fn run_dx12(_config: Config, _frame_limit: u64) -> anyhow::Result<()> {
    anyhow::bail!("DirectX 12 backend is only available on Windows, use --soft instead")
}

fn run_demo<D, G>(device: D, config: Config, game: &mut G, frame_limit: u64) -> anyhow::Result<()>
where
    D: GraphicsDevice,
    G: Game<D>,
{
    let mut app = Application::new(device, config).context("Failed to initialize application")?;

    // run 返回前已 flush 所有队列
    let frames = app
        .run(game, Some(frame_limit))
        .with_context(|| format!("{} failed", game.name()))?;

    let stats = app.frame_stats();
    info!(
        frames,
        fps = stats.fps(),
        elapsed_ms = stats.elapsed().as_millis() as u64,
        "SyncRender exiting"
    );
    Ok(())
}
