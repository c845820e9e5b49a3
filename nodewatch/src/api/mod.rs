//! HTTP API
//!
//! ダッシュボード（HTML）とステータスデータ（JSON）を提供する。
//! ハンドラは公開済みスナップショットを読むだけで、監視ループの
//! 状態を変更することはない。

use crate::AppState;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tower_http::trace::TraceLayer;

use crate::types::node::NO_VERSION_DETECTED;

/// ダッシュボードHTML
///
/// サーバ側レンダリングは行わず、`/data`を1秒間隔でポーリングして
/// テーブルを書き換える。
const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// `/data`のノード1件分のビュー
#[derive(Debug, Serialize)]
pub struct NodeView {
    /// ステータス識別子（機械可読）
    pub status: String,
    /// 表示用ラベル
    pub label: String,
    /// 検出済みバージョン（未検出時は固定文字列）
    pub version: String,
    /// 直近のエラー詳細
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 最終チェック時刻
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

/// `/data`のレスポンス
#[derive(Debug, Serialize)]
pub struct DataResponse {
    /// 公開済みサイクル番号
    pub cycle: u64,
    /// 最終公開時刻
    pub updated_at: Option<DateTime<Utc>>,
    /// アドレス → ノードビュー（アドレス昇順）
    pub nodes: BTreeMap<String, NodeView>,
}

/// アプリケーションのルーターを構築
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/data", get(data))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ダッシュボードHTMLを返す
async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// 公開済みスナップショットをJSONで返す
async fn data(State(state): State<AppState>) -> Json<DataResponse> {
    let snapshot = state.store.snapshot().await;
    let nodes = snapshot
        .nodes
        .into_iter()
        .map(|(address, node)| {
            let view = NodeView {
                status: node.status.as_str().to_string(),
                label: node.status.label(),
                version: node
                    .version
                    .unwrap_or_else(|| NO_VERSION_DETECTED.to_string()),
                error: node.last_error,
                last_checked: node.last_checked,
            };
            (address, view)
        })
        .collect();

    Json(DataResponse {
        cycle: snapshot.cycle,
        updated_at: snapshot.updated_at,
        nodes,
    })
}

/// ヘルスチェック
async fn health(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.store.snapshot().await;
    Json(json!({
        "status": "ok",
        "tracked": snapshot.nodes.len(),
        "cycle": snapshot.cycle,
    }))
}
