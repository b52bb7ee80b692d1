//! 控制通道二进制协议
//!
//! 纯字节逻辑，不碰 OS：生产者 (transport) 和消费者 (client) 共用。
//! 所有整数一律 little-endian。

use crate::error::{Result, TransportError};

/// 握手元数据头长度
pub const HEADER_LEN: usize = 24;

/// 魔数高 24 位："FRM" (0x46 0x52 0x4D)，低 8 位留给 slot 数量
pub const HEADER_MAGIC: u32 = 0x4652_4D00;

/// 提取魔数时使用的掩码
pub const MAGIC_MASK: u32 = 0xFFFF_FF00;

/// 握手完成确认字节 (消费者 -> 生产者)
pub const ACK_READY: u8 = 0x01;

/// 每次 SCM_RIGHTS 传递时伴随的占位负载字节，内容无意义
pub const FD_SENTINEL: u8 = 0xF5;

/// 握手元数据头 (24 字节)
///
/// | 偏移 | 大小 | 字段                              |
/// |------|------|-----------------------------------|
/// | 0    | 4    | magic 高 24 位 | slot 数量低 8 位 |
/// | 4    | 4    | wire 宽度                         |
/// | 8    | 4    | wire 高度                         |
/// | 12   | 4    | 像素格式码 (FourCC)               |
/// | 16   | 4    | 帧大小低 32 位                    |
/// | 20   | 4    | 帧大小高 32 位 (保留，恒为 0)     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub slot_count: u8,
    pub width: u32,
    pub height: u32,
    pub format_code: u32,
    pub frame_size: u64,
}

impl HandshakeHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let tagged = HEADER_MAGIC | self.slot_count as u32;
        buf[0..4].copy_from_slice(&tagged.to_le_bytes());
        buf[4..8].copy_from_slice(&self.width.to_le_bytes());
        buf[8..12].copy_from_slice(&self.height.to_le_bytes());
        buf[12..16].copy_from_slice(&self.format_code.to_le_bytes());
        buf[16..20].copy_from_slice(&(self.frame_size as u32).to_le_bytes());
        buf[20..24].copy_from_slice(&((self.frame_size >> 32) as u32).to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(TransportError::Handshake(format!(
                "Short header: {} of {} bytes",
                buf.len(),
                HEADER_LEN
            )));
        }

        let le32 = |off: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&buf[off..off + 4]);
            u32::from_le_bytes(word)
        };

        let tagged = le32(0);
        if tagged & MAGIC_MASK != HEADER_MAGIC {
            return Err(TransportError::Handshake(format!(
                "Bad magic: 0x{:08X}",
                tagged
            )));
        }

        Ok(Self {
            slot_count: (tagged & 0xFF) as u8,
            width: le32(4),
            height: le32(8),
            format_code: le32(12),
            frame_size: le32(16) as u64 | ((le32(20) as u64) << 32),
        })
    }
}
