//! ノード状態の型定義
//!
//! 監視対象ノードのステータス分類とプローブ結果を表す。
//! ノードの識別子はアドレス文字列（`host:port`）そのもの。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// バージョン未検出時の表示文字列
pub const NO_VERSION_DETECTED: &str = "no version detected";

/// サイクルデッドライン超過時のエラーメッセージ
pub const CHECK_TIMED_OUT: &str = "Check timed out";

/// ノードのステータス分類（閉集合）
///
/// 各ノードは常にちょうど1つのステータスを持つ。
/// `ProtocolError`の`code`はgRPCステータスコード名（プロトコル固有の分類）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// 初回出現後、まだプローブされていない
    #[default]
    Pending,
    /// リフレクション応答あり（サービス1件以上）
    Reachable,
    /// 接続はできたがサービス一覧が空
    Unreachable,
    /// リモートが呼び出しを拒否・失敗させた
    ProtocolError {
        /// gRPCステータスコード名（例: "UNAVAILABLE"）
        code: String,
    },
    /// プローブまたはサイクルデッドライン超過
    Timeout,
    /// プローブ中の予期しない内部エラー
    InternalError,
}

impl NodeStatus {
    /// ステータスを識別子文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reachable => "reachable",
            Self::Unreachable => "unreachable",
            Self::ProtocolError { .. } => "protocol_error",
            Self::Timeout => "timeout",
            Self::InternalError => "internal_error",
        }
    }

    /// ダッシュボード表示用ラベル
    pub fn label(&self) -> String {
        match self {
            Self::Pending => "⏳ Checking...".to_string(),
            Self::Reachable => "✅ Reachable".to_string(),
            Self::Unreachable => "❌ No Response".to_string(),
            Self::ProtocolError { code } => format!("❌ Error: {code}"),
            Self::Timeout => "⏱ Timed Out".to_string(),
            Self::InternalError => "⚠️ Exception".to_string(),
        }
    }

    /// エラー系ステータスかどうか
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ProtocolError { .. } | Self::Timeout | Self::InternalError
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 1回のプローブの分類済み結果
///
/// プローブエンジンは失敗を呼び出し元へ伝播させず、
/// あらゆる失敗モードをこの型に変換して返す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// ステータス分類
    pub status: NodeStatus,
    /// 検出されたバージョン文字列（ベストエフォート）
    pub version: Option<String>,
    /// 人間可読なエラー詳細
    pub error_detail: Option<String>,
}

impl ProbeResult {
    /// 到達可能（サービスあり）
    pub fn reachable(version: Option<String>) -> Self {
        Self {
            status: NodeStatus::Reachable,
            version,
            error_detail: None,
        }
    }

    /// 接続は成功したがサービス一覧が空
    pub fn unreachable() -> Self {
        Self {
            status: NodeStatus::Unreachable,
            version: None,
            error_detail: Some("No response from server".to_string()),
        }
    }

    /// トランスポート/プロトコルレベルの失敗
    pub fn protocol_error(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::ProtocolError { code: code.into() },
            version: None,
            error_detail: Some(detail.into()),
        }
    }

    /// プローブタイムアウト
    pub fn timed_out(detail: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Timeout,
            version: None,
            error_detail: Some(detail.into()),
        }
    }

    /// 予期しない内部エラー
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::InternalError,
            version: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// 追跡中ノード1件の状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeState {
    /// 現在のステータス
    pub status: NodeStatus,
    /// 検出済みバージョン
    pub version: Option<String>,
    /// 直近のエラー詳細（Reachableへの更新でクリアされる）
    pub last_error: Option<String>,
    /// 最後にプローブ結果を反映した時刻
    pub last_checked: Option<DateTime<Utc>>,
    /// この状態を書き込んだサイクル番号（書き込みの全順序付けに使用）
    pub cycle: u64,
}

impl NodeState {
    /// 初回出現時の状態を作成
    pub fn pending() -> Self {
        Self {
            status: NodeStatus::Pending,
            version: None,
            last_error: None,
            last_checked: None,
            cycle: 0,
        }
    }
}

/// 読み取り側へ公開される一貫したスナップショット
///
/// エントリ単位の整合性は保証される（同一キーのstatus/version/errorは
/// 常に同一書き込み由来）。エントリ間の publish 内の時差は許容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// 最後に公開されたサイクル番号
    pub cycle: u64,
    /// 最終公開時刻
    pub updated_at: Option<DateTime<Utc>>,
    /// アドレス → ノード状態
    pub nodes: BTreeMap<String, NodeState>,
}
