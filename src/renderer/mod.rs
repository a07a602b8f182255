//! 渲染器模块
//!
//! GPU 命令提交与帧同步核心，与具体图形 API 无关：
//!
//! - `sync`：fence 与 fence 值
//! - `command`：命令分配器池、命令列表池
//! - `queue`：命令队列管理器
//! - `frame`：后台缓冲区轮换

pub mod command;
pub mod frame;
pub mod queue;
pub mod sync;

pub use command::CommandList;
pub use frame::FrameDriver;
pub use queue::{CommandQueue, QueueCommandList, QueueStats};
pub use sync::{Fence, FenceValue, WaitStatus};
