//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! ノード単位の障害（到達不能・プロトコルエラー等）はエラーではなく
//! ステータスデータ（`NodeStatus`）として扱う。ここで定義するのは
//! 境界を越えて伝播するエラーのみ。

use thiserror::Error;

/// エンドポイントソース（レジストリ照会）のエラー型
///
/// いずれの変種も「今サイクルのソース照会が失敗した」ことを意味し、
/// スケジューラは既知の追跡集合を保持して次サイクルで再試行する。
#[derive(Debug, Error)]
pub enum SourceError {
    /// プロバイダへのHTTPリクエスト失敗
    #[error("Provider request failed: {0}")]
    Provider(#[from] reqwest::Error),

    /// JSON-RPCエラーレスポンス
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPCエラーコード
        code: i64,
        /// エラーメッセージ
        message: String,
    },

    /// レスポンスのデコード失敗（不正なJSON/hex/ABIデータ）
    #[error("Malformed registry response: {0}")]
    Decode(String),
}

/// プロセスレベルのエラー型（起動・設定）
#[derive(Debug, Error)]
pub enum WatchError {
    /// 設定エラー
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result型エイリアス（エンドポイントソース）
pub type SourceResult<T> = Result<T, SourceError>;

/// Result型エイリアス（プロセスレベル）
pub type WatchResult<T> = Result<T, WatchError>;
