//! DirectX 12 后端（仅 Windows）
//!
//! - `device`：DXGI 工厂、适配器选择、D3D12 设备和调试层
//! - `queue`：命令队列、fence + 事件句柄、命令分配器和命令列表

mod device;
mod queue;

pub use device::Dx12Device;
pub use queue::{Dx12Fence, Dx12Queue};

use windows::Win32::Graphics::Direct3D12::{
    D3D12_COMMAND_LIST_TYPE, D3D12_COMMAND_LIST_TYPE_COMPUTE, D3D12_COMMAND_LIST_TYPE_COPY,
    D3D12_COMMAND_LIST_TYPE_DIRECT,
};

use crate::gfx::backend::QueueType;

impl QueueType {
    /// 对应的 `D3D12_COMMAND_LIST_TYPE`
    pub fn to_d3d12(self) -> D3D12_COMMAND_LIST_TYPE {
        match self {
            QueueType::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
            QueueType::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
            QueueType::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
        }
    }
}
