use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, info, warn};

use framering_core::config::TransportConfig;
use framering_core::error::Result;
use framering_core::frame::FrameView;
use framering_core::stats::TransportStats;
use framering_core::traits::FrameSink;

use crate::publisher;
use crate::server::perform_handshake;
use crate::state::TransportState;

/// 共享内存帧传输入口
///
/// 持有全部子系统状态，并在后台跑一个 ticker 线程：
/// 周期性 accept 轮询 + 周期性统计日志。帧回调通过 `FrameSink`
/// 同步投递，绝不阻塞，也绝不向帧源抛错。
#[derive(Debug)]
pub struct ShmTransport {
    state: Arc<Mutex<TransportState>>,
    shutdown: Sender<()>,
    ticker: Option<JoinHandle<()>>,
}

/// ticker 单步结论
enum TickerStep {
    Idle,
    Stop,
}

impl ShmTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let accept_poll = config.accept_poll;
        let stats_interval = config.stats_interval;
        let state = Arc::new(Mutex::new(TransportState::new(config)));

        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let ticker_state = Arc::clone(&state);

        // accept 轮询和统计日志走独立定时线程，
        // 与帧发布交错执行但互不抢占 (共享同一把状态锁)
        let ticker = std::thread::Builder::new()
            .name("framering-ticker".into())
            .spawn(move || {
                let accept_tick = tick(accept_poll);
                let stats_tick = tick(stats_interval);

                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(accept_tick) -> _ => {
                            if let TickerStep::Stop = try_admit_consumer(&ticker_state) {
                                break;
                            }
                        }
                        recv(stats_tick) -> _ => log_status(&ticker_state),
                    }
                }
                debug!("Ticker thread exiting");
            })?;

        Ok(Self {
            state,
            shutdown,
            ticker: Some(ticker),
        })
    }

    /// 当前统计快照
    pub fn stats(&self) -> TransportStats {
        self.state
            .lock()
            .map(|s| s.stats.clone())
            .unwrap_or_default()
    }

    /// 是否有已握手的消费者
    pub fn consumer_attached(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.session.is_some())
            .unwrap_or(false)
    }

    /// 熔断是否已触发
    pub fn is_disabled(&self) -> bool {
        self.state.lock().map(|s| s.disabled).unwrap_or(true)
    }
}

impl FrameSink for ShmTransport {
    fn on_frame(&mut self, frame: FrameView<'_>) {
        // 帧源宿主永远看不到错误：全部在这里消化
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Err(e) = publisher::publish(&mut state, &frame) {
            let context = e.to_string();
            state.record_failure(&context);
        }
    }
}

impl Drop for ShmTransport {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
    }
}

/// 尝试接纳一个新消费者
///
/// 锁只在收集握手材料和安装会话时短暂持有；
/// 可能阻塞的握手本体在锁外执行，绝不挡住帧回调。
fn try_admit_consumer(state: &Arc<Mutex<TransportState>>) -> TickerStep {
    let (mut stream, header, slot_fds, ack_timeout) = {
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(_) => return TickerStep::Stop,
        };

        if guard.disabled {
            return TickerStep::Stop;
        }
        if !guard.ring_ready || guard.session.is_some() {
            return TickerStep::Idle;
        }
        let Some(header) = guard.header else {
            return TickerStep::Idle;
        };

        let accepted = match guard.server.as_ref() {
            Some(server) => server.try_accept(),
            None => return TickerStep::Idle,
        };
        let stream = match accepted {
            Ok(Some(stream)) => stream,
            Ok(None) => return TickerStep::Idle,
            Err(e) => {
                let context = format!("accept: {e}");
                guard.record_failure(&context);
                return TickerStep::Idle;
            }
        };

        let slot_fds: Vec<RawFd> = guard.ring.iter().map(|slot| slot.raw_fd()).collect();
        (stream, header, slot_fds, guard.config.handshake_timeout)
    };

    match perform_handshake(&mut stream, &header, &slot_fds, ack_timeout) {
        Ok(()) => {
            if let Ok(mut guard) = state.lock() {
                guard.install_session(stream);
            }
        }
        Err(e) => {
            // 协议失败只废弃这个连接，监听端点保持可用
            warn!("Consumer handshake rejected: {e}");
        }
    }
    TickerStep::Idle
}

fn log_status(state: &Arc<Mutex<TransportState>>) {
    let Ok(guard) = state.lock() else { return };
    let stats = &guard.stats;

    if stats.captured == 0 {
        debug!("Transport idle: no frames captured yet");
        return;
    }

    info!(
        captured = stats.captured,
        delivered = stats.delivered,
        skipped = stats.skipped,
        errors = stats.errors,
        fps = format_args!("{:.1}", stats.effective_fps()),
        consumer = guard.session.is_some(),
        "Transport status"
    );
}
