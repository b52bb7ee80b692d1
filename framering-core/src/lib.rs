// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod config;
pub mod error;
pub mod frame;
pub mod pixel_format;
pub mod stats;
pub mod traits;
pub mod wire;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::config::TransportConfig;
    pub use crate::error::{Result, TransportError};
    pub use crate::frame::FrameView;
    pub use crate::pixel_format::{FourCC, PixelFormat};
    pub use crate::stats::TransportStats;
    pub use crate::traits::FrameSink;
    pub use crate::wire::HandshakeHeader;
}

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
