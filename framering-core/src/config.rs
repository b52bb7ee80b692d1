use std::path::PathBuf;
use std::time::Duration;

/// 传输子系统配置
///
/// 所有字段都有保守的默认值；链式 setter 与 CameraConfig 同风格。
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// 控制通道 Unix Socket 路径 (well-known，消费者按此连接)
    pub socket_path: PathBuf,

    /// Ring 深度，默认 4
    /// 这是对抗 "消费者还没读完就被覆盖" 的唯一防线，按预期消费延迟取值
    pub slot_count: usize,

    /// 最小帧间隔：比上一个被接受的帧来得更快的帧直接丢弃 (计入 skipped)
    pub min_interval: Duration,

    /// Accept 轮询周期 (ticker 线程)
    pub accept_poll: Duration,

    /// 统计日志输出周期
    pub stats_interval: Duration,

    /// 熔断阈值：内部错误累计到该值后永久停用
    pub error_threshold: u32,

    /// 每帧 drain 的最大字节数 (回收 release 信号，防止 socket 缓冲填满)
    pub drain_budget: usize,

    /// Wire 分辨率覆盖：像素总数与真实分辨率一致时才生效
    /// (用于把旋转/宽高比归一化后报告给消费者)
    pub wire_resolution: Option<(u32, u32)>,

    /// 握手 ack 的读超时，防止挂死 ticker 线程
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/framering.sock"),
            slot_count: 4,
            min_interval: Duration::from_millis(33), // 默认封顶 ~30fps
            accept_poll: Duration::from_millis(200),
            stats_interval: Duration::from_secs(5),
            error_threshold: 30,
            drain_budget: 16,
            wire_resolution: None,
            handshake_timeout: Duration::from_secs(5),
        }
    }

    /// 设置控制通道路径
    pub fn socket_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.socket_path = path.into();
        self
    }

    /// 设置 Ring 深度
    /// 上限 255：slot 索引和握手头里都只有一个字节的位置
    pub fn slot_count(mut self, count: usize) -> Self {
        self.slot_count = count.clamp(1, u8::MAX as usize);
        self
    }

    /// 设置最小帧间隔 (Duration::ZERO 表示不限速)
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// 设置 accept 轮询周期
    pub fn accept_poll(mut self, interval: Duration) -> Self {
        self.accept_poll = interval;
        self
    }

    /// 设置统计日志周期
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// 设置熔断阈值
    pub fn error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold.max(1);
        self
    }

    /// 设置 wire 分辨率覆盖
    pub fn wire_resolution(mut self, width: u32, height: u32) -> Self {
        self.wire_resolution = Some((width, height));
        self
    }
}
