//! 事件参数
//!
//! 窗口层把平台消息翻译成 [`WindowEvent`] 投递给 `Application`，
//! 再由 `Application` 分发到 `Game` 的各个钩子。

use std::fmt;

/// 鼠标按键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// 额外按钮（侧键等），参数为按钮编号
    Other(u8),
}

/// 键盘按键（简化版本）
///
/// 只包含演示程序用到的按键，其余按键使用 `Other`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// 切换垂直同步
    V,
    Escape,
    Enter,
    Space,
    F4,
    F11,
    /// 平台相关的虚拟键码
    Other(u32),
}

/// 按键状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// 修饰键
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub control: bool,
    pub shift: bool,
    pub alt: bool,
}

/// 键盘事件参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEventArgs {
    pub key: KeyCode,
    pub state: KeyState,
    pub modifiers: Modifiers,
}

impl KeyEventArgs {
    pub fn pressed(key: KeyCode) -> Self {
        Self {
            key,
            state: KeyState::Pressed,
            modifiers: Modifiers::default(),
        }
    }

    pub fn released(key: KeyCode) -> Self {
        Self {
            key,
            state: KeyState::Released,
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }
}

/// 鼠标移动事件参数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseMotionEventArgs {
    /// 鼠标位置（客户区坐标）
    pub x: i32,
    pub y: i32,
    /// 相对上一次移动的偏移
    pub rel_x: i32,
    pub rel_y: i32,
    pub left_button: bool,
    pub right_button: bool,
    pub middle_button: bool,
}

/// 鼠标滚轮事件参数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseWheelEventArgs {
    /// 滚动量，正值表示向前滚动
    pub wheel_delta: f32,
    pub x: i32,
    pub y: i32,
}

/// 窗口大小变化事件参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEventArgs {
    pub width: u32,
    pub height: u32,
}

/// 更新事件参数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateEventArgs {
    /// 帧间隔时间（秒）
    pub elapsed_time: f64,
    /// 总运行时间（秒）
    pub total_time: f64,
    /// 帧序号，从 0 开始
    pub frame_number: u64,
}

/// 渲染事件参数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderEventArgs {
    pub elapsed_time: f64,
    pub total_time: f64,
    pub frame_number: u64,
    /// 本帧写入的后台缓冲区索引
    pub back_buffer_index: usize,
}

/// 投递给应用程序的窗口事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    Key(KeyEventArgs),
    MouseMoved(MouseMotionEventArgs),
    MouseWheel(MouseWheelEventArgs),
    Resize(ResizeEventArgs),
    /// 窗口被销毁，应用程序随之退出
    Destroy,
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowEvent::Key(args) => write!(f, "Key: {:?} {:?}", args.key, args.state),
            WindowEvent::MouseMoved(args) => write!(f, "MouseMoved: ({}, {})", args.x, args.y),
            WindowEvent::MouseWheel(args) => write!(f, "MouseWheel: {:.2}", args.wheel_delta),
            WindowEvent::Resize(args) => write!(f, "Resize: {}x{}", args.width, args.height),
            WindowEvent::Destroy => write!(f, "Destroy"),
        }
    }
}
