//! ステータスストア
//!
//! 追跡中ノードの状態をメモリ内で一元管理する。
//! 共有可変状態はこのストアの背後にのみ存在し、外部コンポーネントが
//! バッキングマップへの直接参照を持つことはない。キー単位の更新は
//! アトミックで、サイクル番号により書き込みが全順序付けされる。

use crate::types::node::{NodeState, NodeStatus, ProbeResult, StatusSnapshot, CHECK_TIMED_OUT};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 照合（reconcile）で適用された差分
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// 今回追加されたアドレス（ソート済み）
    pub added: Vec<String>,
    /// 今回削除されたアドレス（ソート済み）
    pub removed: Vec<String>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, NodeState>,
    /// 進行中サイクルの番号（begin_cycleで採番、1始まり）
    current_cycle: u64,
    /// 最後に公開されたサイクルの番号
    published_cycle: u64,
    updated_at: Option<chrono::DateTime<Utc>>,
}

/// ステータスストア
///
/// Cloneハンドル越しに共有される。スケジューラが照合と書き込みを行い、
/// 読み取り側は`snapshot()`のみを使用する。
#[derive(Clone, Default)]
pub struct StatusStore {
    inner: Arc<RwLock<Inner>>,
}

impl StatusStore {
    /// 空のストアを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 最新の正解集合と追跡集合を照合し、差分を適用する
    ///
    /// 追加分は`Pending`で挿入し、削除分は状態ごと破棄する。
    /// 照合後の追跡キー集合は`latest`と厳密に一致する。
    pub async fn reconcile(&self, latest: &HashSet<String>) -> Reconciliation {
        let mut inner = self.inner.write().await;

        let mut removed: Vec<String> = inner
            .nodes
            .keys()
            .filter(|addr| !latest.contains(*addr))
            .cloned()
            .collect();
        removed.sort();

        for addr in &removed {
            inner.nodes.remove(addr);
        }

        let mut added: Vec<String> = latest
            .iter()
            .filter(|addr| !inner.nodes.contains_key(*addr))
            .cloned()
            .collect();
        added.sort();

        for addr in &added {
            inner.nodes.insert(addr.clone(), NodeState::pending());
        }

        Reconciliation { added, removed }
    }

    /// 新しいサイクルを開始し、その番号を返す
    pub async fn begin_cycle(&self) -> u64 {
        let mut inner = self.inner.write().await;
        inner.current_cycle += 1;
        inner.current_cycle
    }

    /// プローブ結果をノード状態へ反映する
    ///
    /// 追跡外のアドレス、または既により新しいサイクルの書き込みが
    /// あるアドレスへの書き込みは破棄してfalseを返す。削除済み
    /// ノードの遅延プローブ結果はここで捨てられる。
    pub async fn update(&self, address: &str, cycle: u64, result: ProbeResult) -> bool {
        let mut inner = self.inner.write().await;
        let Some(state) = inner.nodes.get_mut(address) else {
            debug!(address, "Discarding probe result for untracked node");
            return false;
        };
        if cycle < state.cycle {
            debug!(address, cycle, "Discarding stale probe result");
            return false;
        }

        state.status = result.status;
        state.version = result.version;
        state.last_error = result.error_detail;
        state.last_checked = Some(Utc::now());
        state.cycle = cycle;
        true
    }

    /// デッドラインまでに完了しなかったノードをTimeoutにする
    ///
    /// 今サイクルで既に更新済みのノードには何もしない。
    /// マークした場合にtrueを返す。
    pub async fn mark_timed_out(&self, address: &str, cycle: u64) -> bool {
        let mut inner = self.inner.write().await;
        let Some(state) = inner.nodes.get_mut(address) else {
            return false;
        };
        if state.cycle >= cycle {
            return false;
        }

        state.status = NodeStatus::Timeout;
        state.last_error = Some(CHECK_TIMED_OUT.to_string());
        state.cycle = cycle;
        true
    }

    /// サイクルの結果を公開する
    pub async fn publish(&self, cycle: u64) {
        let mut inner = self.inner.write().await;
        inner.published_cycle = cycle;
        inner.updated_at = Some(Utc::now());
    }

    /// 公開済みスナップショットを取得する
    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;
        StatusSnapshot {
            cycle: inner.published_cycle,
            updated_at: inner.updated_at,
            nodes: inner
                .nodes
                .iter()
                .map(|(addr, state)| (addr.clone(), state.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// 追跡中の全アドレスを取得する（ソート済み）
    pub async fn tracked(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut addresses: Vec<String> = inner.nodes.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// 追跡中ノード数
    pub async fn count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }
}
