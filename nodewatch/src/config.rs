//! Configuration management via environment variables
//!
//! 監視ループの全パラメータを環境変数から読み込むヘルパーを提供する。
//! コアロジックには一切ハードコードしない。

use crate::common::error::{WatchError, WatchResult};
use std::time::Duration;

/// デフォルトのレジストリコントラクトアドレス
pub const DEFAULT_REGISTRY_CONTRACT: &str = "0x5275FfA7D1f5aBd4159Ae38925fD9F4D5686725E";

/// 環境変数を取得
pub fn get_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// 環境変数を取得し、未設定ならデフォルト値を返す
pub fn get_env_or(name: &str, default: &str) -> String {
    get_env(name).unwrap_or_else(|| default.to_string())
}

/// 環境変数を指定の型にパースして取得
///
/// 未設定またはパース失敗時はデフォルト値を返す。
pub fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    get_env(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// 監視ループ設定
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// JSON-RPCプロバイダURL（必須）
    pub rpc_url: String,
    /// ノードレジストリのコントラクトアドレス
    pub registry_contract: String,
    /// サイクル間のスリープ間隔
    pub poll_interval: Duration,
    /// プローブ1件あたりの発見呼び出しタイムアウト
    pub probe_timeout: Duration,
    /// バージョン照会（セカンダリ）のタイムアウト
    pub version_timeout: Duration,
    /// サイクル全体のプローブデッドライン
    pub cycle_deadline: Duration,
    /// 同時実行プローブ数の上限（ワーカー数W）
    pub probe_concurrency: usize,
}

impl MonitorConfig {
    /// 環境変数から設定を読み込む
    ///
    /// `NODEWATCH_RPC_URL`のみ必須。他は設計デフォルトを使用する。
    pub fn from_env() -> WatchResult<Self> {
        let rpc_url = get_env("NODEWATCH_RPC_URL")
            .ok_or_else(|| WatchError::Config("NODEWATCH_RPC_URL is not set".to_string()))?;

        Ok(Self {
            rpc_url,
            registry_contract: get_env_or("NODEWATCH_REGISTRY_CONTRACT", DEFAULT_REGISTRY_CONTRACT),
            poll_interval: Duration::from_secs(get_env_parse(
                "NODEWATCH_POLL_INTERVAL_SECS",
                10u64,
            )),
            probe_timeout: Duration::from_secs(get_env_parse(
                "NODEWATCH_PROBE_TIMEOUT_SECS",
                5u64,
            )),
            version_timeout: Duration::from_secs(get_env_parse(
                "NODEWATCH_VERSION_TIMEOUT_SECS",
                2u64,
            )),
            cycle_deadline: Duration::from_secs(get_env_parse(
                "NODEWATCH_CYCLE_DEADLINE_SECS",
                15u64,
            )),
            probe_concurrency: get_env_parse("NODEWATCH_PROBE_CONCURRENCY", 10usize),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_monitor_env() {
        for name in [
            "NODEWATCH_RPC_URL",
            "NODEWATCH_REGISTRY_CONTRACT",
            "NODEWATCH_POLL_INTERVAL_SECS",
            "NODEWATCH_PROBE_TIMEOUT_SECS",
            "NODEWATCH_VERSION_TIMEOUT_SECS",
            "NODEWATCH_CYCLE_DEADLINE_SECS",
            "NODEWATCH_PROBE_CONCURRENCY",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_get_env_parse_valid() {
        std::env::set_var("TEST_NODEWATCH_PARSE", "42");
        let result: u64 = get_env_parse("TEST_NODEWATCH_PARSE", 7);
        assert_eq!(result, 42);
        std::env::remove_var("TEST_NODEWATCH_PARSE");
    }

    #[test]
    #[serial]
    fn test_get_env_parse_invalid_falls_back() {
        std::env::set_var("TEST_NODEWATCH_PARSE2", "not-a-number");
        let result: u64 = get_env_parse("TEST_NODEWATCH_PARSE2", 7);
        assert_eq!(result, 7);
        std::env::remove_var("TEST_NODEWATCH_PARSE2");
    }

    #[test]
    #[serial]
    fn test_from_env_requires_rpc_url() {
        clear_monitor_env();
        let result = MonitorConfig::from_env();
        assert!(matches!(result, Err(WatchError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_monitor_env();
        std::env::set_var("NODEWATCH_RPC_URL", "http://localhost:8545");

        let config = MonitorConfig::from_env().expect("config should load");
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert_eq!(config.registry_contract, DEFAULT_REGISTRY_CONTRACT);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.version_timeout, Duration::from_secs(2));
        assert_eq!(config.cycle_deadline, Duration::from_secs(15));
        assert_eq!(config.probe_concurrency, 10);

        std::env::remove_var("NODEWATCH_RPC_URL");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_monitor_env();
        std::env::set_var("NODEWATCH_RPC_URL", "http://localhost:8545");
        std::env::set_var("NODEWATCH_POLL_INTERVAL_SECS", "30");
        std::env::set_var("NODEWATCH_PROBE_CONCURRENCY", "4");

        let config = MonitorConfig::from_env().expect("config should load");
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.probe_concurrency, 4);

        clear_monitor_env();
    }
}
