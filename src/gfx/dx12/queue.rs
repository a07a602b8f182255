//! DirectX 12 命令队列、fence 与命令对象

use std::time::Duration;

use tracing::{debug, error};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{FenceBackend, QueueBackend, QueueType, RawWait};

/// `ID3D12Fence` 与绑定的 Win32 事件句柄
pub struct Dx12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

impl Dx12Fence {
    pub fn raw(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl FenceBackend for Dx12Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> Result<RawWait> {
        let millis = match timeout {
            None => INFINITE,
            Some(timeout) => u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1),
        };

        unsafe {
            self.fence
                .SetEventOnCompletion(value, self.event)
                .map_err(|e| GraphicsError::Wait(format!("SetEventOnCompletion: {}", e)))?;

            let result = WaitForSingleObject(self.event, millis);
            if result == WAIT_OBJECT_0 {
                Ok(RawWait::Signaled)
            } else if result == WAIT_TIMEOUT {
                Ok(RawWait::TimedOut)
            } else {
                Err(GraphicsError::Wait(format!("WaitForSingleObject returned {:?}", result)).into())
            }
        }
    }
}

impl Drop for Dx12Fence {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = CloseHandle(self.event) {
                error!("Failed to close fence event handle: {}", e);
            }
        }
    }
}

/// DirectX 12 命令队列
pub struct Dx12Queue {
    queue_type: QueueType,
    device: ID3D12Device,
    queue: ID3D12CommandQueue,
}

impl Dx12Queue {
    pub(super) fn new(device: &ID3D12Device, queue_type: QueueType) -> Result<Self> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: queue_type.to_d3d12(),
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };

        let queue: ID3D12CommandQueue = unsafe { device.CreateCommandQueue(&desc) }
            .map_err(|e| GraphicsError::QueueCreation(format!("{}: {}", queue_type.name(), e)))?;

        debug!(queue = queue_type.name(), "D3D12 command queue created");

        Ok(Self {
            queue_type,
            device: device.clone(),
            queue,
        })
    }

    /// 底层 `ID3D12CommandQueue`，交换链创建时需要
    pub fn raw(&self) -> &ID3D12CommandQueue {
        &self.queue
    }

    /// 设备移除时附带移除原因
    fn device_error(&self, context: &str, e: windows::core::Error) -> GraphicsError {
        match unsafe { self.device.GetDeviceRemovedReason() } {
            Err(reason) => GraphicsError::DeviceRemoved(format!("{}: {} ({})", context, e, reason)),
            Ok(()) => GraphicsError::CommandExecution(format!("{}: {}", context, e)),
        }
    }
}

impl QueueBackend for Dx12Queue {
    type Fence = Dx12Fence;
    type Allocator = ID3D12CommandAllocator;
    type List = ID3D12GraphicsCommandList;

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn create_fence(&self) -> Result<Dx12Fence> {
        unsafe {
            let fence: ID3D12Fence = self
                .device
                .CreateFence(0, D3D12_FENCE_FLAG_NONE)
                .map_err(|e| GraphicsError::FenceCreation(e.to_string()))?;
            let event = CreateEventA(None, false, false, None)
                .map_err(|e| GraphicsError::FenceCreation(format!("CreateEvent: {}", e)))?;
            Ok(Dx12Fence { fence, event })
        }
    }

    fn signal(&self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(&fence.fence, value) }.map_err(|e| {
            let error = match self.device_error("Signal", e) {
                GraphicsError::CommandExecution(msg) => GraphicsError::Signal(msg),
                other => other,
            };
            error.into()
        })
    }

    fn create_allocator(&self) -> Result<ID3D12CommandAllocator> {
        unsafe { self.device.CreateCommandAllocator(self.queue_type.to_d3d12()) }
            .map_err(|e| GraphicsError::AllocatorCreation(e.to_string()).into())
    }

    fn reset_allocator(&self, allocator: &mut ID3D12CommandAllocator) -> Result<()> {
        unsafe { allocator.Reset() }
            .map_err(|e| GraphicsError::AllocatorCreation(format!("Reset: {}", e)).into())
    }

    fn create_list(&self, allocator: &ID3D12CommandAllocator) -> Result<ID3D12GraphicsCommandList> {
        unsafe {
            self.device.CreateCommandList(
                0,
                self.queue_type.to_d3d12(),
                allocator,
                None::<&ID3D12PipelineState>,
            )
        }
        .map_err(|e| GraphicsError::ListCreation(e.to_string()).into())
    }

    fn reset_list(
        &self,
        list: &mut ID3D12GraphicsCommandList,
        allocator: &ID3D12CommandAllocator,
    ) -> Result<()> {
        unsafe { list.Reset(allocator, None::<&ID3D12PipelineState>) }
            .map_err(|e| GraphicsError::ListCreation(format!("Reset: {}", e)).into())
    }

    fn close_list(&self, list: &mut ID3D12GraphicsCommandList) -> Result<()> {
        unsafe { list.Close() }
            .map_err(|e| GraphicsError::CommandExecution(format!("Close: {}", e)).into())
    }

    fn execute(&self, list: &ID3D12GraphicsCommandList) -> Result<()> {
        let lists = [Some(list.clone().into())];
        unsafe { self.queue.ExecuteCommandLists(&lists) };
        Ok(())
    }
}
