//! 監視サイクルの統合テスト
//!
//! フェイクのエンドポイントソースとプローブを差し込み、照合・
//! ファンアウト・デッドライン・公開の一連の流れを検証する。

use async_trait::async_trait;
use nodewatch::common::error::{SourceError, SourceResult};
use nodewatch::config::MonitorConfig;
use nodewatch::monitor::Monitor;
use nodewatch::probe::Prober;
use nodewatch::source::EndpointSource;
use nodewatch::store::StatusStore;
use nodewatch::types::node::{NodeStatus, ProbeResult, CHECK_TIMED_OUT};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// サイクルごとに用意した結果を順に返すソース
struct ScriptedSource {
    script: Mutex<VecDeque<SourceResult<HashSet<String>>>>,
}

impl ScriptedSource {
    fn new(script: Vec<SourceResult<HashSet<String>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl EndpointSource for ScriptedSource {
    async fn resolve(&self) -> SourceResult<HashSet<String>> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HashSet::new()))
    }
}

/// アドレスごとに固定結果を返すプローブ
struct FakeProber {
    results: HashMap<String, ProbeResult>,
    delay: Duration,
    panic_on: HashSet<String>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeProber {
    fn new(results: HashMap<String, ProbeResult>) -> Self {
        Self {
            results,
            delay: Duration::ZERO,
            panic_on: HashSet::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_panic_on(mut self, address: &str) -> Self {
        self.panic_on.insert(address.to_string());
        self
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, address: &str) -> ProbeResult {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.panic_on.contains(address) {
            panic!("probe blew up for {}", address);
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.results
            .get(address)
            .cloned()
            .unwrap_or_else(|| ProbeResult::reachable(None))
    }
}

fn test_config() -> MonitorConfig {
    MonitorConfig {
        rpc_url: "http://localhost:8545".to_string(),
        registry_contract: "0x0000000000000000000000000000000000000000".to_string(),
        poll_interval: Duration::from_secs(10),
        probe_timeout: Duration::from_secs(5),
        version_timeout: Duration::from_secs(2),
        cycle_deadline: Duration::from_secs(15),
        probe_concurrency: 10,
    }
}

fn set_of(addrs: &[&str]) -> HashSet<String> {
    addrs.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_cycle_probes_and_publishes() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(set_of(&["a:443", "b:443"]))]));
    let mut results = HashMap::new();
    results.insert(
        "a:443".to_string(),
        ProbeResult::reachable(Some("1.2.3".to_string())),
    );
    results.insert("b:443".to_string(), ProbeResult::unreachable());
    let prober = Arc::new(FakeProber::new(results));

    let store = StatusStore::new();
    let monitor = Monitor::new(source, prober, store.clone(), test_config());
    monitor.run_cycle().await;

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 1);
    assert!(snapshot.updated_at.is_some());

    let node_a = &snapshot.nodes["a:443"];
    assert_eq!(node_a.status, NodeStatus::Reachable);
    assert_eq!(node_a.version.as_deref(), Some("1.2.3"));
    assert!(node_a.last_checked.is_some());

    let node_b = &snapshot.nodes["b:443"];
    assert_eq!(node_b.status, NodeStatus::Unreachable);
    assert_eq!(node_b.last_error.as_deref(), Some("No response from server"));
}

#[tokio::test]
async fn test_removed_node_disappears_from_snapshot() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(set_of(&["a:443", "b:443"])),
        Ok(set_of(&["a:443", "c:443"])),
    ]));
    let prober = Arc::new(FakeProber::new(HashMap::new()));

    let store = StatusStore::new();
    let monitor = Monitor::new(source, prober, store.clone(), test_config());
    monitor.run_cycle().await;
    monitor.run_cycle().await;

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 2);
    assert!(snapshot.nodes.contains_key("a:443"));
    assert!(snapshot.nodes.contains_key("c:443"));
    assert!(!snapshot.nodes.contains_key("b:443"));
}

#[tokio::test]
async fn test_source_failure_keeps_last_known_set() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(set_of(&["a:443"])),
        Err(SourceError::Rpc {
            code: -32000,
            message: "execution reverted".to_string(),
        }),
    ]));
    let prober = Arc::new(FakeProber::new(HashMap::new()));

    let store = StatusStore::new();
    let monitor = Monitor::new(source, prober, store.clone(), test_config());
    monitor.run_cycle().await;
    monitor.run_cycle().await;

    // ソース失敗サイクルでも既知のノードは再検査・再公開される
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 2);
    let node = &snapshot.nodes["a:443"];
    assert_eq!(node.status, NodeStatus::Reachable);
    assert_eq!(node.cycle, 2);
}

#[tokio::test]
async fn test_empty_source_result_clears_tracking() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(set_of(&["a:443"])),
        Ok(HashSet::new()),
    ]));
    let prober = Arc::new(FakeProber::new(HashMap::new()));

    let store = StatusStore::new();
    let monitor = Monitor::new(source, prober, store.clone(), test_config());
    monitor.run_cycle().await;
    monitor.run_cycle().await;

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 2);
    assert!(snapshot.nodes.is_empty());
}

#[tokio::test]
async fn test_panicking_probe_marks_internal_error() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(set_of(&[
        "ok:443", "boom:443",
    ]))]));
    let prober = Arc::new(FakeProber::new(HashMap::new()).with_panic_on("boom:443"));

    let store = StatusStore::new();
    let monitor = Monitor::new(source, prober, store.clone(), test_config());
    monitor.run_cycle().await;

    // パニックしたプローブのノードはTimeoutではなくInternalErrorになる
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 1);
    assert_eq!(snapshot.nodes["ok:443"].status, NodeStatus::Reachable);
    let boom = &snapshot.nodes["boom:443"];
    assert_eq!(boom.status, NodeStatus::InternalError);
    assert_eq!(boom.last_error.as_deref(), Some("Probe task panicked"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_marks_unfinished_probes_timed_out() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(set_of(&["slow:443"])),
        Ok(set_of(&["slow:443"])),
    ]));
    // デッドライン(15s)より長くかかるプローブ
    let prober = Arc::new(FakeProber::new(HashMap::new()).with_delay(Duration::from_secs(60)));

    let store = StatusStore::new();
    let monitor = Monitor::new(source, prober, store.clone(), test_config());
    monitor.run_cycle().await;

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 1);
    let node = &snapshot.nodes["slow:443"];
    assert_eq!(node.status, NodeStatus::Timeout);
    assert_eq!(node.last_error.as_deref(), Some(CHECK_TIMED_OUT));

    // タイムアウトしたノードも追跡から外れず、次サイクルで再検査される
    monitor.run_cycle().await;
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.cycle, 2);
    assert_eq!(snapshot.nodes["slow:443"].cycle, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_probe_concurrency_is_bounded() {
    let addresses: Vec<String> = (0..6).map(|i| format!("node-{}:443", i)).collect();
    let set: HashSet<String> = addresses.iter().cloned().collect();
    let source = Arc::new(ScriptedSource::new(vec![Ok(set)]));
    let prober = Arc::new(FakeProber::new(HashMap::new()).with_delay(Duration::from_millis(50)));

    let mut config = test_config();
    config.probe_concurrency = 2;

    let store = StatusStore::new();
    let monitor = Monitor::new(source, Arc::clone(&prober) as Arc<dyn Prober>, store.clone(), config);
    monitor.run_cycle().await;

    assert!(prober.max_active.load(Ordering::SeqCst) <= 2);
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.nodes.len(), 6);
    for address in &addresses {
        assert_eq!(snapshot.nodes[address].status, NodeStatus::Reachable);
    }
}
