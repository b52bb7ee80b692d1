// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod server;
pub mod slot;
pub mod state;
pub mod transport;

mod publisher;

pub use transport::ShmTransport;

// 重新导出核心层，避免用户版本冲突
pub use framering_core as core;
