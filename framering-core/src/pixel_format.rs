use std::fmt::{self, Display};

/// 四字符代码 (Four Character Code)，视频工业标准
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FourCC(pub u32);

impl FourCC {
    /// 从 ASCII 字符创建 FourCC
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();

        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// 常用像素格式定义
impl FourCC {
    // --- 平面 YUV Formats (相机回调最常见) ---
    /// NV12 4:2:0 - Y 平面 + 交织 UV 平面
    pub const NV12: Self = Self::new(b'N', b'V', b'1', b'2');
    /// I420 4:2:0 (Planar: Y + U + V，正好三个平面)
    pub const I420: Self = Self::new(b'I', b'4', b'2', b'0');
    /// YV12 4:2:0 (Planar, V 在前)
    pub const YV12: Self = Self::new(b'Y', b'V', b'1', b'2');

    // --- Packed Formats ---
    /// YUYV 4:2:2 - 工业相机最常用的未压缩格式
    pub const YUYV: Self = Self::new(b'Y', b'U', b'Y', b'V');
    /// RGB24 (Little Endian: B-G-R)
    pub const BGR3: Self = Self::new(b'B', b'G', b'R', b'3');
    /// RGB24 (Big Endian: R-G-B)
    pub const RGB3: Self = Self::new(b'R', b'G', b'B', b'3');
    /// RGBA32
    pub const RGBA: Self = Self::new(b'R', b'G', b'B', b'A');
}

/// 像素格式的高级枚举
/// Known/Unknown 的区分只影响日志可读性，wire 上永远是原始 u32。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 已知的标准格式
    Known(FourCC),
    /// 帧源返回了库不认识的私有格式
    Unknown(u32),
}

impl PixelFormat {
    /// 上线的格式码 (握手头第 12..16 字节)
    pub fn code(&self) -> u32 {
        match self {
            Self::Known(cc) => cc.0,
            Self::Unknown(val) => *val,
        }
    }

    /// 判断是否为平面格式 (三平面布局有意义)
    pub fn is_planar(&self) -> bool {
        match self {
            Self::Known(cc) => matches!(*cc, FourCC::NV12 | FourCC::I420 | FourCC::YV12),
            _ => false,
        }
    }
}

impl From<u32> for PixelFormat {
    fn from(val: u32) -> Self {
        // 这里可以维护一个已知列表的查找
        // 简化起见，任何值都按 Known 的 FourCC 解释
        Self::Known(FourCC(val))
    }
}

impl From<FourCC> for PixelFormat {
    fn from(cc: FourCC) -> Self {
        Self::Known(cc)
    }
}

impl PartialEq<PixelFormat> for FourCC {
    fn eq(&self, other: &PixelFormat) -> bool {
        match other {
            PixelFormat::Known(cc) => self == cc,
            PixelFormat::Unknown(val) => self.0 == *val,
        }
    }
}

// 反向比较也加上
impl PartialEq<FourCC> for PixelFormat {
    fn eq(&self, other: &FourCC) -> bool {
        match self {
            PixelFormat::Known(cc) => cc == other,
            PixelFormat::Unknown(val) => *val == other.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_display_roundtrip() {
        assert_eq!(FourCC::NV12.to_string(), "NV12");
        assert_eq!(FourCC::new(b'I', b'4', b'2', b'0'), FourCC::I420);
    }

    #[test]
    fn wire_code_matches_raw_value() {
        assert_eq!(PixelFormat::from(FourCC::NV12).code(), FourCC::NV12.0);
        assert_eq!(PixelFormat::Unknown(0xDEAD_BEEF).code(), 0xDEAD_BEEF);
    }
}
