//! DirectX 12 设备创建
//!
//! # 初始化流程
//!
//! 1. 启用调试层（Debug 模式）
//! 2. 创建 DXGI 工厂
//! 3. 选择适配器：WARP，或专用显存最大的硬件适配器
//! 4. 创建 D3D12 设备
//! 5. 配置信息队列过滤（Debug 模式）
//! 6. 查询呈现撕裂支持

use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use super::queue::Dx12Queue;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{GraphicsDevice, QueueType};

/// DirectX 12 设备
///
/// 多个队列共享同一个设备。
pub struct Dx12Device {
    device: ID3D12Device,
    adapter_name: String,
    tearing_supported: bool,
}

impl Dx12Device {
    /// 创建设备
    ///
    /// # 参数
    ///
    /// * `use_warp` - 使用 WARP 软件光栅器代替硬件适配器
    pub fn new(use_warp: bool) -> Result<Self> {
        unsafe {
            #[cfg(debug_assertions)]
            {
                let mut debug_interface: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug_interface) {
                    Ok(()) => {
                        if let Some(debug_interface) = debug_interface {
                            debug_interface.EnableDebugLayer();
                            debug!("DX12 Debug Layer enabled");
                        }
                    }
                    Err(e) => warn!("Failed to enable DX12 Debug Layer: {}", e),
                }
            }

            let factory_flags = if cfg!(debug_assertions) {
                DXGI_CREATE_FACTORY_DEBUG
            } else {
                DXGI_CREATE_FACTORY_FLAGS(0)
            };
            let factory: IDXGIFactory4 = CreateDXGIFactory2(factory_flags)
                .map_err(|e| GraphicsError::DeviceCreation(format!("CreateDXGIFactory2: {}", e)))?;

            let adapter = select_adapter(&factory, use_warp)?;
            let desc = adapter
                .GetDesc1()
                .map_err(|e| GraphicsError::DeviceCreation(format!("GetDesc1: {}", e)))?;
            let adapter_name = adapter_description(&desc);

            let mut device: Option<ID3D12Device> = None;
            D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)
                .map_err(|e| GraphicsError::DeviceCreation(format!("D3D12CreateDevice: {}", e)))?;
            let device = device.ok_or_else(|| {
                GraphicsError::DeviceCreation("D3D12CreateDevice returned no device".to_string())
            })?;

            #[cfg(debug_assertions)]
            configure_info_queue(&device);

            let tearing_supported = check_tearing_support(&factory);

            info!(
                adapter = %adapter_name,
                dedicated_video_memory_mb = desc.DedicatedVideoMemory / (1024 * 1024),
                warp = use_warp,
                tearing_supported,
                "D3D12 Device created"
            );

            Ok(Self {
                device,
                adapter_name,
                tearing_supported,
            })
        }
    }

    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }
}

impl GraphicsDevice for Dx12Device {
    type Queue = Dx12Queue;

    fn create_queue(&self, queue_type: QueueType) -> Result<Dx12Queue> {
        Dx12Queue::new(&self.device, queue_type)
    }

    fn backend_name(&self) -> &str {
        "DirectX 12"
    }

    fn supports_tearing(&self) -> bool {
        self.tearing_supported
    }
}

/// 查询 `DXGI_FEATURE_PRESENT_ALLOW_TEARING`，需要 DXGI 1.5
///
/// 工厂不支持 `IDXGIFactory5` 或查询失败时视为不支持。
unsafe fn check_tearing_support(factory: &IDXGIFactory4) -> bool {
    let factory5: IDXGIFactory5 = match factory.cast() {
        Ok(factory5) => factory5,
        Err(_) => return false,
    };

    // BOOL
    let mut allow_tearing: i32 = 0;
    let result = factory5.CheckFeatureSupport(
        DXGI_FEATURE_PRESENT_ALLOW_TEARING,
        &mut allow_tearing as *mut i32 as *mut _,
        std::mem::size_of::<i32>() as u32,
    );
    match result {
        Ok(()) => allow_tearing != 0,
        Err(e) => {
            debug!("CheckFeatureSupport(PRESENT_ALLOW_TEARING) failed: {}", e);
            false
        }
    }
}

/// 选择适配器
///
/// 跳过软件适配器，在能创建 D3D12 设备的硬件适配器中取专用显存最大的一个。
unsafe fn select_adapter(factory: &IDXGIFactory4, use_warp: bool) -> Result<IDXGIAdapter1> {
    if use_warp {
        return factory
            .EnumWarpAdapter::<IDXGIAdapter1>()
            .map_err(|e| GraphicsError::DeviceCreation(format!("EnumWarpAdapter: {}", e)).into());
    }

    let mut best: Option<(usize, IDXGIAdapter1)> = None;
    let mut index = 0;
    while let Ok(adapter) = factory.EnumAdapters1(index) {
        index += 1;

        let desc = match adapter.GetDesc1() {
            Ok(desc) => desc,
            Err(_) => continue,
        };
        if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
            continue;
        }

        let mut candidate: Option<ID3D12Device> = None;
        if D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut candidate).is_err() {
            continue;
        }

        debug!(
            adapter = %adapter_description(&desc),
            dedicated_video_memory_mb = desc.DedicatedVideoMemory / (1024 * 1024),
            "Found D3D12 capable adapter"
        );

        if best
            .as_ref()
            .map_or(true, |(memory, _)| desc.DedicatedVideoMemory > *memory)
        {
            best = Some((desc.DedicatedVideoMemory, adapter));
        }
    }

    best.map(|(_, adapter)| adapter).ok_or_else(|| {
        GraphicsError::DeviceCreation("no D3D12 capable hardware adapter found".to_string()).into()
    })
}

fn adapter_description(desc: &DXGI_ADAPTER_DESC1) -> String {
    let len = desc
        .Description
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(desc.Description.len());
    String::from_utf16_lossy(&desc.Description[..len])
}

/// 在调试层上中断严重错误，并过滤掉已知无害的警告
#[cfg(debug_assertions)]
unsafe fn configure_info_queue(device: &ID3D12Device) {
    let info_queue: ID3D12InfoQueue = match device.cast() {
        Ok(info_queue) => info_queue,
        Err(_) => return,
    };

    let _ = info_queue.SetBreakOnSeverity(D3D12_MESSAGE_SEVERITY_CORRUPTION, true);
    let _ = info_queue.SetBreakOnSeverity(D3D12_MESSAGE_SEVERITY_ERROR, true);
    let _ = info_queue.SetBreakOnSeverity(D3D12_MESSAGE_SEVERITY_WARNING, true);

    let mut severities = [D3D12_MESSAGE_SEVERITY_INFO];
    let mut deny_ids = [
        D3D12_MESSAGE_ID_CLEARRENDERTARGETVIEW_MISMATCHINGCLEARVALUE,
        D3D12_MESSAGE_ID_MAP_INVALID_NULLRANGE,
        D3D12_MESSAGE_ID_UNMAP_INVALID_NULLRANGE,
    ];

    let filter = D3D12_INFO_QUEUE_FILTER {
        DenyList: D3D12_INFO_QUEUE_FILTER_DESC {
            NumSeverities: severities.len() as u32,
            pSeverityList: severities.as_mut_ptr(),
            NumIDs: deny_ids.len() as u32,
            pIDList: deny_ids.as_mut_ptr(),
            ..Default::default()
        },
        ..Default::default()
    };

    match info_queue.PushStorageFilter(&filter) {
        Ok(()) => debug!("D3D12 info queue filter installed"),
        Err(e) => warn!("Failed to install D3D12 info queue filter: {}", e),
    }
}
