use crate::pixel_format::PixelFormat;

/// 一帧最多携带的平面数 (Y / U / V 或 Y / UV / 空)
pub const MAX_PLANES: usize = 3;

/// 核心帧视图结构体
/// 使用生命周期 'a 绑定到捕获回调栈帧，实现零拷贝传递。
///
/// 帧源每次回调给出三个平面 (指针 + 长度)；空指针或零长度的平面
/// 在这里表示为 `None`，拷贝时直接跳过。
#[derive(Debug)]
pub struct FrameView<'a> {
    /// 图像宽度 (Pixels)
    pub width: u32,

    /// 图像高度 (Pixels)
    pub height: u32,

    /// 像素格式 (FourCC 编码，直接上线)
    pub format: PixelFormat,

    /// 平面数据切片，按固定顺序排列
    /// 【关键】平面布局在一次会话内假定稳定：第一帧测得的长度
    /// 决定 slot 大小和各平面的写入偏移
    pub planes: [Option<&'a [u8]>; MAX_PLANES],

    /// 帧索引 (用于丢帧统计和调试)
    pub sequence: u64,
}

impl<'a> FrameView<'a> {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: [Option<&'a [u8]>; MAX_PLANES],
    ) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, seq: u64) -> Self {
        self.sequence = seq;
        self
    }

    /// 三个平面的总字节数，即该帧需要的 slot 容量
    pub fn total_len(&self) -> usize {
        self.planes.iter().flatten().map(|p| p.len()).sum()
    }

    /// 总像素数，用于 wire 分辨率覆盖的合法性检查
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
