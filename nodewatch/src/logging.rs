//! ロギング初期化ユーティリティ
//!
//! tracing-subscriberによる構造化ログの初期化。
//! `RUST_LOG`が未設定の場合は`nodewatch=info`を使用する。

use tracing_subscriber::EnvFilter;

/// グローバルのtracingサブスクライバを初期化
///
/// プロセス起動時に一度だけ呼び出すこと。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nodewatch=info,tower_http=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()?;

    Ok(())
}
