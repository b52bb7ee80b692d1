use std::fmt;
use std::time::Instant;

/// 传输运行统计
///
/// 这些计数器由 Frame Publisher 每帧更新，ticker 线程定期打印；
/// 不追求原子性 —— 所有写入都发生在同一把状态锁下。
#[derive(Clone)]
pub struct TransportStats {
    /// 回调送达的帧总数 (含被限速丢弃的)
    pub captured: u64,

    /// 成功通知到消费者的帧数
    pub delivered: u64,

    /// 因最小帧间隔被丢弃的帧数
    pub skipped: u64,

    /// 从消费者 drain 回来的 release 信号字节数
    pub releases: u64,

    /// 内部错误累计 (熔断依据)
    pub errors: u32,

    /// 子系统启动时刻，用于计算有效 fps
    pub started: Instant,
}

impl Default for TransportStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportStats {
    pub fn new() -> Self {
        Self {
            captured: 0,
            delivered: 0,
            skipped: 0,
            releases: 0,
            errors: 0,
            started: Instant::now(),
        }
    }

    /// 自启动以来的有效投递帧率
    pub fn effective_fps(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.delivered as f64 / elapsed
    }

    /// 导出统计快照 (用于持久化或上报)
    #[cfg(feature = "serialize")]
    pub fn export_state(&self) -> serde_json::Value {
        serde_json::to_value(StatsSnapshot {
            captured: self.captured,
            delivered: self.delivered,
            skipped: self.skipped,
            releases: self.releases,
            errors: self.errors,
            uptime_secs: self.started.elapsed().as_secs_f64(),
            effective_fps: self.effective_fps(),
        })
        .unwrap_or_default()
    }
}

/// 可序列化的统计快照，Instant 换算成已运行秒数
#[cfg(feature = "serialize")]
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub releases: u64,
    pub errors: u32,
    pub uptime_secs: f64,
    pub effective_fps: f64,
}

impl fmt::Debug for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportStats")
            .field("captured", &self.captured)
            .field("delivered", &self.delivered)
            .field("skipped", &self.skipped)
            .field("errors", &self.errors)
            .field("fps", &format_args!("{:.1}", self.effective_fps()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_starts_at_zero() {
        let stats = TransportStats::new();
        assert_eq!(stats.delivered, 0);
        assert!(stats.effective_fps() < 1.0);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn export_state_carries_counters() {
        let mut stats = TransportStats::new();
        stats.captured = 10;
        stats.delivered = 7;
        stats.skipped = 3;

        let snapshot = stats.export_state();
        assert_eq!(snapshot["captured"], 10);
        assert_eq!(snapshot["delivered"], 7);
        assert_eq!(snapshot["skipped"], 3);
    }
}
