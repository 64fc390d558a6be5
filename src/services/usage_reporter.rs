use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::services::usage::{UsageRecorder, UsageSnapshot};

/// 使用量レポーター
/// 定期的に集計をログに出してリセットする
pub struct UsageReporter {
    usage: Arc<dyn UsageRecorder>,
    interval: Duration,
}

impl UsageReporter {
    pub fn new(usage: Arc<dyn UsageRecorder>, interval_secs: u64) -> Self {
        Self {
            usage,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// リセットを無限ループで定期実行
    pub async fn start(self) {
        info!("Starting usage reporter (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;
            self.report_and_reset();
        }
    }

    pub fn report_and_reset(&self) -> UsageSnapshot {
        let stats = self.usage.reset();
        info!(
            "Usage since last reset - Reads: {} | Writes: {} | Deletes: {}",
            stats.reads, stats.writes, stats.deletes
        );
        stats
    }
}
