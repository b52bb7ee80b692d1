use std::os::unix::net::UnixStream;
use std::time::Instant;

use tracing::{error, info, warn};

use framering_core::config::TransportConfig;
use framering_core::frame::FrameView;
use framering_core::stats::TransportStats;
use framering_core::wire::HandshakeHeader;

use crate::server::ControlServer;
use crate::slot::{allocate_ring, Slot};

/// 一个已握手完成的消费者会话
#[derive(Debug)]
pub struct Session {
    pub stream: UnixStream,
    pub established: Instant,
}

/// 子系统全部可变状态，单结构体持有，绝不散落全局
///
/// Publisher (帧回调) 和 ticker 线程共享同一把 `Mutex<TransportState>`；
/// 两边都只做非阻塞操作 (握手的阻塞部分在锁外执行)，
/// 所以帧回调永远不会被一个慢消费者卡住。
#[derive(Debug)]
pub struct TransportState {
    pub config: TransportConfig,
    pub server: Option<ControlServer>,
    pub ring: Vec<Slot>,
    pub ring_ready: bool,
    pub slot_size: usize,
    pub header: Option<HandshakeHeader>,
    pub frame_count: u64,
    pub last_accepted: Option<Instant>,
    pub session: Option<Session>,
    pub stats: TransportStats,
    pub disabled: bool,
}

impl TransportState {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            server: None,
            ring: Vec::new(),
            ring_ready: false,
            slot_size: 0,
            header: None,
            frame_count: 0,
            last_accepted: None,
            session: None,
            stats: TransportStats::new(),
            disabled: false,
        }
    }

    /// 懒初始化：第一个被接受的帧决定 slot 大小和握手头
    ///
    /// 失败全部降级处理：Ring 可以半满甚至全空，socket 可以没 bind 上，
    /// 采集照常进行，只是送不出去。
    pub fn ensure_ready(&mut self, frame: &FrameView<'_>) {
        if self.ring_ready {
            return;
        }

        // 深度再截一次：索引上线时只有一个字节，配置字段是 pub 的
        let requested = self.config.slot_count.clamp(1, u8::MAX as usize);

        self.slot_size = frame.total_len();
        self.ring = allocate_ring(self.slot_size, requested);
        self.ring_ready = true;

        if self.ring.len() < requested {
            warn!(
                allocated = self.ring.len(),
                requested,
                "Ring is degraded: fewer slots than configured"
            );
        }

        let (wire_w, wire_h) = self.wire_dimensions(frame);
        self.header = Some(HandshakeHeader {
            slot_count: self.ring.len() as u8,
            width: wire_w,
            height: wire_h,
            format_code: frame.format.code(),
            frame_size: self.slot_size as u64,
        });

        match ControlServer::bind(&self.config.socket_path) {
            Ok(server) => self.server = Some(server),
            Err(e) => {
                // 没有监听端点的降级状态：帧继续采集，只是无人接收
                warn!("Control channel bind failed, frames will go undelivered: {e}");
            }
        }

        info!(
            slot_size = self.slot_size,
            slots = self.ring.len(),
            width = wire_w,
            height = wire_h,
            "Ring initialized from first frame"
        );
    }

    /// Wire 分辨率：覆盖值只有在像素总数吻合时才生效
    /// (用途是把旋转/宽高比归一化报告给消费者，不是缩放)
    fn wire_dimensions(&self, frame: &FrameView<'_>) -> (u32, u32) {
        match self.config.wire_resolution {
            Some((w, h)) if w as u64 * h as u64 == frame.pixel_count() => (w, h),
            Some((w, h)) => {
                warn!(
                    override_w = w,
                    override_h = h,
                    true_w = frame.width,
                    true_h = frame.height,
                    "Wire resolution override ignored: pixel count mismatch"
                );
                (frame.width, frame.height)
            }
            None => (frame.width, frame.height),
        }
    }

    /// 会话拆除，幂等：连续多帧发送失败也只拆一次
    pub fn teardown_session(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            info!(
                uptime_secs = session.established.elapsed().as_secs(),
                "Consumer session closed: {reason}"
            );
            // stream 随 drop 关闭；slot 映射保持原样，等下一个消费者
        }
    }

    pub fn install_session(&mut self, stream: UnixStream) {
        if self.session.is_some() {
            // 只有 ticker 会走到这里，且只在无会话时 accept；防御性保留
            warn!("Dropping handshaken consumer: a session is already active");
            return;
        }
        self.session = Some(Session {
            stream,
            established: Instant::now(),
        });
    }

    /// 记录一次内部失败；到达阈值后整个传输路径永久熔断
    pub fn record_failure(&mut self, context: &str) {
        self.stats.errors = self.stats.errors.saturating_add(1);
        warn!(errors = self.stats.errors, "Frame path error: {context}");

        if !self.disabled && self.stats.errors >= self.config.error_threshold {
            self.disabled = true;
            self.teardown_session("circuit breaker tripped");
            error!(
                errors = self.stats.errors,
                "Error threshold reached, frame transport permanently disabled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framering_core::pixel_format::FourCC;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> TransportConfig {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "framering-state-{}-{}.sock",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        TransportConfig::new().socket_path(path)
    }

    fn frame_with_planes<'a>(y: &'a [u8], uv: &'a [u8]) -> FrameView<'a> {
        FrameView::new(4, 4, FourCC::NV12.into(), [Some(y), Some(uv), None])
    }

    #[test]
    fn first_frame_fixes_slot_size() {
        let mut state = TransportState::new(test_config().slot_count(2));
        let y = [0u8; 16];
        let uv = [0u8; 8];

        state.ensure_ready(&frame_with_planes(&y, &uv));
        assert!(state.ring_ready);
        assert_eq!(state.slot_size, 24);
        assert_eq!(state.ring.len(), 2);

        // 后续帧不得改变 slot 大小
        let big = [0u8; 64];
        state.ensure_ready(&frame_with_planes(&big, &big));
        assert_eq!(state.slot_size, 24);
    }

    #[test]
    fn header_reflects_ring_and_format() {
        let mut state = TransportState::new(test_config().slot_count(3));
        let y = [0u8; 16];
        let uv = [0u8; 8];
        state.ensure_ready(&frame_with_planes(&y, &uv));

        let header = state.header.unwrap();
        assert_eq!(header.slot_count, 3);
        assert_eq!(header.width, 4);
        assert_eq!(header.height, 4);
        assert_eq!(header.format_code, FourCC::NV12.0);
        assert_eq!(header.frame_size, 24);
    }

    #[test]
    fn wire_override_requires_matching_pixel_count() {
        // 4x4 = 16 像素；8x2 合法，5x5 非法
        let mut state = TransportState::new(test_config().wire_resolution(8, 2));
        let y = [0u8; 16];
        let uv = [0u8; 8];
        state.ensure_ready(&frame_with_planes(&y, &uv));
        let header = state.header.unwrap();
        assert_eq!((header.width, header.height), (8, 2));

        let mut state = TransportState::new(test_config().wire_resolution(5, 5));
        state.ensure_ready(&frame_with_planes(&y, &uv));
        let header = state.header.unwrap();
        assert_eq!((header.width, header.height), (4, 4));
    }

    #[test]
    fn oversized_slot_count_is_capped_to_notify_byte_range() {
        // 绕过 builder 直接改字段，环深也必须截到 255，
        // 否则握手头低字节和通知索引都会悄悄回绕
        let mut config = test_config();
        config.slot_count = 300;

        let mut state = TransportState::new(config);
        let y = [0u8; 16];
        let uv = [0u8; 8];
        state.ensure_ready(&frame_with_planes(&y, &uv));

        assert_eq!(state.ring.len(), 255);
        assert_eq!(state.header.unwrap().slot_count, 255);
    }

    #[test]
    fn breaker_trips_exactly_at_threshold() {
        let mut state = TransportState::new(test_config().error_threshold(3));

        state.record_failure("one");
        state.record_failure("two");
        assert!(!state.disabled);

        state.record_failure("three");
        assert!(state.disabled);

        // 不可复位
        state.record_failure("four");
        assert!(state.disabled);
        assert_eq!(state.stats.errors, 4);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut state = TransportState::new(test_config());
        state.teardown_session("no session yet");
        assert!(state.session.is_none());
    }
}
