use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::socket::{send, MsgFlags};
use tracing::trace;

use framering_core::error::Result;
use framering_core::frame::FrameView;

use crate::state::TransportState;

/// 每帧发布路径的结局：要么没人听，要么送达，要么消费者没了
enum WireOutcome {
    /// 无会话，本帧只入 Ring 不通知
    Idle,
    /// 通知写出成功，附带本次 drain 回收的 release 字节数
    Delivered(usize),
    /// 发送/回收失败，按消费者断连处理
    Lost(&'static str),
}

/// 单帧发布：拷贝进 Ring、通知消费者、回收 release 信号
///
/// 在帧源回调上下文内同步执行，全程非阻塞。
/// 返回 Err 仅代表内部逻辑错误 (如帧形状变化导致越界)，
/// 由调用方计入熔断；消费者断连不算错误，就地拆会话。
pub(crate) fn publish(state: &mut TransportState, frame: &FrameView<'_>) -> Result<()> {
    if state.disabled {
        return Ok(());
    }

    state.stats.captured += 1;

    // 1. 限速：离上一个被接受的帧太近就丢弃
    if let Some(last) = state.last_accepted {
        if last.elapsed() < state.config.min_interval {
            state.stats.skipped += 1;
            trace!(sequence = frame.sequence, "Frame skipped by rate limit");
            return Ok(());
        }
    }

    // 2. 第一个被接受的帧触发 Ring + 控制通道建立
    state.ensure_ready(frame);
    state.last_accepted = Some(Instant::now());

    // 3. 降级 Ring 防护：索引前必须看实际长度
    if state.ring.is_empty() {
        state.frame_count += 1;
        return Ok(());
    }

    // 4. 顺序拷贝三个平面，偏移按前面平面长度累加
    let index = (state.frame_count % state.ring.len() as u64) as usize;
    let slot = &state.ring[index];
    let mut offset = 0usize;
    for plane in frame.planes.iter().flatten() {
        if plane.is_empty() {
            continue;
        }
        slot.write_at(offset, plane)?;
        offset += plane.len();
    }
    state.frame_count += 1;

    // 5. 通知 + drain (仅当有已握手的会话)
    let mut outcome = WireOutcome::Idle;
    if let Some(session) = state.session.as_mut() {
        outcome = notify_and_drain(&mut session.stream, index as u8, state.config.drain_budget);
    }

    match outcome {
        WireOutcome::Idle => {}
        WireOutcome::Delivered(released) => {
            state.stats.delivered += 1;
            state.stats.releases += released as u64;
        }
        WireOutcome::Lost(reason) => state.teardown_session(reason),
    }

    Ok(())
}

/// 写一个 slot 索引字节，然后非阻塞回收积压的 release 信号
///
/// 任何失败或短写都视为消费者消失；WouldBlock 也是 ——
/// 通知缓冲满说明对端早就不读了，绝不允许它反压采集。
///
/// 【宿主安全】必须走 MSG_NOSIGNAL：宿主进程未必装了 SIGPIPE 处理，
/// 消费者断开后的一次裸 write 足以把整个宿主杀掉。
fn notify_and_drain(stream: &mut UnixStream, slot_index: u8, budget: usize) -> WireOutcome {
    match send(stream.as_raw_fd(), &[slot_index], MsgFlags::MSG_NOSIGNAL) {
        Ok(1) => {}
        Ok(_) => return WireOutcome::Lost("short notify write"),
        Err(Errno::EAGAIN) => return WireOutcome::Lost("notify buffer full"),
        Err(_) => return WireOutcome::Lost("notify send failed"),
    }

    // release 内容不解析，读到即算；只为了别让 socket 缓冲涨死
    let mut buf = [0u8; 64];
    let take = budget.clamp(1, buf.len());
    match stream.read(&mut buf[..take]) {
        Ok(0) => WireOutcome::Lost("consumer closed"),
        Ok(n) => WireOutcome::Delivered(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => WireOutcome::Delivered(0),
        Err(_) => WireOutcome::Lost("drain read failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framering_core::config::TransportConfig;
    use framering_core::error::TransportError;
    use framering_core::pixel_format::FourCC;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn test_state(config: TransportConfig) -> TransportState {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "framering-pub-{}-{}.sock",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        TransportState::new(config.socket_path(path))
    }

    fn nv12_frame<'a>(y: &'a [u8], uv: &'a [u8]) -> FrameView<'a> {
        FrameView::new(4, 4, FourCC::NV12.into(), [Some(y), Some(uv), None])
    }

    #[test]
    fn frames_cycle_through_ring_slots() {
        let mut state = test_state(
            TransportConfig::new()
                .slot_count(3)
                .min_interval(Duration::ZERO),
        );

        for i in 0..7u8 {
            let y = [i; 16];
            let uv = [i ^ 0xFF; 8];
            publish(&mut state, &nv12_frame(&y, &uv)).unwrap();
        }

        assert_eq!(state.frame_count, 7);
        assert_eq!(state.stats.captured, 7);
        assert_eq!(state.ring.len(), 3);

        // 第 7 帧 (i=6) 落在 slot 6 % 3 = 0；平面偏移 0 和 16
        let mut y_back = [0u8; 16];
        let mut uv_back = [0u8; 8];
        state.ring[0].read_at(0, &mut y_back).unwrap();
        state.ring[0].read_at(16, &mut uv_back).unwrap();
        assert_eq!(y_back, [6u8; 16]);
        assert_eq!(uv_back, [6u8 ^ 0xFF; 8]);
    }

    #[test]
    fn rate_limit_skips_fast_frames() {
        let mut state = test_state(
            TransportConfig::new()
                .slot_count(2)
                .min_interval(Duration::from_millis(40)),
        );
        let y = [1u8; 16];
        let uv = [2u8; 8];

        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();
        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();
        assert_eq!(state.stats.skipped, 1);
        assert_eq!(state.frame_count, 1);

        std::thread::sleep(Duration::from_millis(45));
        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();
        assert_eq!(state.stats.skipped, 1);
        assert_eq!(state.frame_count, 2);
        assert_eq!(state.stats.captured, 3);
    }

    #[test]
    fn grown_frame_reports_slot_overflow() {
        let mut state = test_state(
            TransportConfig::new()
                .slot_count(2)
                .min_interval(Duration::ZERO),
        );
        let y = [0u8; 16];
        let uv = [0u8; 8];
        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();

        // 帧源形状突变：平面比第一帧大
        let big = [0u8; 32];
        let err = publish(&mut state, &nv12_frame(&big, &big)).unwrap_err();
        assert!(matches!(err, TransportError::SlotOverflow { .. }));
    }

    #[test]
    fn missing_planes_are_skipped_in_copy() {
        let mut state = test_state(
            TransportConfig::new()
                .slot_count(1)
                .min_interval(Duration::ZERO),
        );
        let a = [7u8; 8];
        let c = [9u8; 4];
        let frame = FrameView::new(2, 2, FourCC::I420.into(), [Some(&a[..]), None, Some(&c[..])]);

        publish(&mut state, &frame).unwrap();
        assert_eq!(state.slot_size, 12);

        // c 紧跟 a 之后 (缺失平面不占偏移)
        let mut back = [0u8; 4];
        state.ring[0].read_at(8, &mut back).unwrap();
        assert_eq!(back, [9u8; 4]);
    }

    #[test]
    fn disabled_state_suppresses_all_work() {
        let mut state = test_state(TransportConfig::new().min_interval(Duration::ZERO));
        state.disabled = true;

        let y = [0u8; 16];
        let uv = [0u8; 8];
        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();

        assert_eq!(state.stats.captured, 0);
        assert!(!state.ring_ready);
    }

    #[test]
    fn empty_degraded_ring_accepts_frames_without_io() {
        // 三个平面全缺 → slot 大小为 0 → 分配只能给出空 Ring；
        // 发布路径必须静默吞帧，不碰任何 slot 或 socket
        let mut state = test_state(TransportConfig::new().min_interval(Duration::ZERO));
        let frame = FrameView::new(4, 4, FourCC::NV12.into(), [None, None, None]);

        publish(&mut state, &frame).unwrap();
        publish(&mut state, &frame).unwrap();

        assert!(state.ring_ready);
        assert!(state.ring.is_empty());
        assert_eq!(state.frame_count, 2);
        assert_eq!(state.stats.captured, 2);
        assert_eq!(state.stats.delivered, 0);
        assert_eq!(state.stats.errors, 0);
    }

    #[test]
    fn closed_consumer_never_raises_sigpipe() {
        // 把 SIGPIPE 还原成默认动作 —— 宿主进程往往就是这个状态。
        // 通知若走不带 MSG_NOSIGNAL 的裸写，这个测试会把进程直接杀掉。
        unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) };

        let mut state = test_state(TransportConfig::new().min_interval(Duration::ZERO));
        let y = [0u8; 16];
        let uv = [0u8; 8];
        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();

        let (ours, theirs) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        state.install_session(ours);
        drop(theirs);

        publish(&mut state, &nv12_frame(&y, &uv)).unwrap();

        unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };

        // 对端消失按断连处理，不算内部错误
        assert!(state.session.is_none());
        assert_eq!(state.stats.errors, 0);
        assert_eq!(state.stats.delivered, 0);
    }
}
