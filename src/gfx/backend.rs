//! 图形后端的统一抽象接口
//!
//! 命令队列管理器只依赖本模块定义的几个 trait，从而可以在 DirectX 12
//! 与软件模拟后端之间切换，而无需修改同步逻辑。
//!
//! # 对象关系
//!
//! ```text
//! GraphicsDevice ──create_queue──▶ QueueBackend
//!                                   ├── Fence: FenceBackend   （GPU 完成计数 + OS 等待句柄）
//!                                   ├── Allocator             （命令的底层内存）
//!                                   └── List                  （命令录制容器）
//! ```

use std::time::Duration;

use crate::core::error::Result;

/// 命令队列类型
///
/// 对应 D3D12 的 `D3D12_COMMAND_LIST_TYPE`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    /// 直接队列（支持图形、计算、复制）
    Direct,
    /// 计算队列（支持计算、复制）
    Compute,
    /// 复制队列（仅支持复制）
    Copy,
}

impl QueueType {
    /// 所有队列类型
    pub const ALL: [QueueType; 3] = [QueueType::Direct, QueueType::Compute, QueueType::Copy];

    /// 获取队列类型名称
    pub fn name(&self) -> &'static str {
        match self {
            QueueType::Direct => "direct",
            QueueType::Compute => "compute",
            QueueType::Copy => "copy",
        }
    }
}

/// OS 等待原语返回的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawWait {
    /// GPU 已到达目标值
    Signaled,
    /// 超时，目标值仍未完成
    TimedOut,
}

/// GPU fence 对象
///
/// 暴露一个由 GPU 单调更新的"已完成"计数，以及绑定在该 fence 上的 OS 等待句柄。
pub trait FenceBackend {
    /// GPU 报告的已完成值，非阻塞
    fn completed_value(&self) -> u64;

    /// 阻塞当前线程，直到已完成值 ≥ `value` 或超时
    ///
    /// `timeout` 为 `None` 表示无限等待。调用方保证只在值尚未完成时调用。
    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> Result<RawWait>;
}

/// 单个硬件命令队列
///
/// 所有方法都对应一次底层 API 调用；任何失败都是致命的，由调用方向上传播。
pub trait QueueBackend {
    type Fence: FenceBackend;
    type Allocator;
    type List;

    /// 队列类型
    fn queue_type(&self) -> QueueType;

    /// 创建绑定到此队列的 fence（初始完成值为 0）
    fn create_fence(&self) -> Result<Self::Fence>;

    /// 在队列中插入 signal：当之前提交的所有工作完成时把 fence 设置为 `value`
    fn signal(&self, fence: &Self::Fence, value: u64) -> Result<()>;

    /// 创建新的命令分配器
    fn create_allocator(&self) -> Result<Self::Allocator>;

    /// 重置命令分配器，回收其内存
    ///
    /// 只能在引用该分配器的 GPU 工作全部完成之后调用。
    fn reset_allocator(&self, allocator: &mut Self::Allocator) -> Result<()>;

    /// 基于分配器创建命令列表，返回的列表处于录制状态
    fn create_list(&self, allocator: &Self::Allocator) -> Result<Self::List>;

    /// 重置已关闭的命令列表，使其重新录制到 `allocator`
    fn reset_list(&self, list: &mut Self::List, allocator: &Self::Allocator) -> Result<()>;

    /// 结束录制
    fn close_list(&self, list: &mut Self::List) -> Result<()>;

    /// 提交已关闭的命令列表
    fn execute(&self, list: &Self::List) -> Result<()>;
}

/// 图形设备
///
/// 多个队列共享同一个设备（只读共享），各自拥有独立的状态。
pub trait GraphicsDevice {
    type Queue: QueueBackend;

    /// 创建指定类型的硬件队列
    fn create_queue(&self, queue_type: QueueType) -> Result<Self::Queue>;

    /// 获取后端的名称，用于日志输出
    fn backend_name(&self) -> &str;

    /// 关闭垂直同步时呈现是否允许撕裂（可变刷新率显示器）
    fn supports_tearing(&self) -> bool {
        false
    }
}

/// 资源状态，用于 `RecordCommands::transition`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
    CopyDest,
    VertexAndIndexBuffer,
}

/// 演示程序使用的最小命令录制接口
///
/// 真实的绘制命令不属于同步核心；这里只保留演示需要的几条。
pub trait RecordCommands {
    /// 资源状态转换屏障
    fn transition(&mut self, back_buffer: usize, before: ResourceState, after: ResourceState);

    /// 清除渲染目标
    fn clear_render_target(&mut self, back_buffer: usize, color: [f32; 4]);

    /// 复制缓冲区数据
    fn copy_buffer(&mut self, bytes: usize);

    /// 索引绘制
    fn draw_indexed(&mut self, index_count: u32);
}
