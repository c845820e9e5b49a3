//! 監視スケジューラ
//!
//! 固定間隔でサイクルを回す: エンドポイント集合の照合 → セマフォで
//! 並列数を制限したプローブのファンアウト → サイクルデッドラインでの
//! 打ち切り → 結果の公開。サイクルは重複実行されない（前サイクルの
//! 完了後にインターバル分待ってから次を開始する）。

use crate::config::MonitorConfig;
use crate::probe::Prober;
use crate::source::EndpointSource;
use crate::store::StatusStore;
use crate::types::node::ProbeResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

/// 監視スケジューラ
pub struct Monitor {
    source: Arc<dyn EndpointSource>,
    prober: Arc<dyn Prober>,
    store: StatusStore,
    config: MonitorConfig,
    permits: Arc<Semaphore>,
}

impl Monitor {
    /// 新しいスケジューラを作成
    pub fn new(
        source: Arc<dyn EndpointSource>,
        prober: Arc<dyn Prober>,
        store: StatusStore,
        config: MonitorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.probe_concurrency));
        Self {
            source,
            prober,
            store,
            config,
            permits,
        }
    }

    /// バックグラウンドの監視ループを開始する
    pub fn start(self) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval);
            // 初回tickは即時発火する
            loop {
                interval.tick().await;
                self.run_cycle().await;
            }
        });
    }

    /// 1サイクルを実行する
    pub async fn run_cycle(&self) {
        // ソース照会の失敗はサイクルを止めない。既知の集合を再検査する。
        match self.source.resolve().await {
            Ok(latest) => {
                let diff = self.store.reconcile(&latest).await;
                if !diff.added.is_empty() || !diff.removed.is_empty() {
                    info!(
                        added = diff.added.len(),
                        removed = diff.removed.len(),
                        tracked = latest.len(),
                        "Endpoint set reconciled"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Endpoint source unavailable; re-probing last known set");
            }
        }

        let cycle = self.store.begin_cycle().await;
        let addresses = self.store.tracked().await;
        if addresses.is_empty() {
            self.store.publish(cycle).await;
            return;
        }

        let deadline = Instant::now() + self.config.cycle_deadline;
        let mut tasks = JoinSet::new();
        let mut task_addresses = HashMap::new();
        for address in addresses.clone() {
            let permits = Arc::clone(&self.permits);
            let prober = Arc::clone(&self.prober);
            let store = self.store.clone();
            let task_address = address.clone();
            let handle = tasks.spawn(async move {
                // セマフォclose時はスケジューラ終了中なので静かに抜ける
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let result = prober.probe(&task_address).await;
                store.update(&task_address, cycle, result).await;
            });
            task_addresses.insert(handle.id(), address);
        }

        let mut completed = 0usize;
        loop {
            match timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(Ok(_))) => completed += 1,
                Ok(Some(Err(e))) => {
                    error!(error = %e, "Probe task failed");
                    // パニックしたタスクのノードはTimeoutではなくInternalError
                    if let Some(address) = task_addresses.get(&e.id()) {
                        self.store
                            .update(
                                address,
                                cycle,
                                ProbeResult::internal_error("Probe task panicked"),
                            )
                            .await;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // デッドライン超過。残タスクを中断して未完了分をTimeoutにする
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }

        let mut timed_out = 0usize;
        for address in &addresses {
            if self.store.mark_timed_out(address, cycle).await {
                timed_out += 1;
            }
        }

        self.store.publish(cycle).await;
        info!(
            cycle,
            total = addresses.len(),
            completed,
            timed_out,
            "Status cycle complete"
        );
    }
}
