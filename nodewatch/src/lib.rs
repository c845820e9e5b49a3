//! nodewatch - 分散ノードステータスモニター
//!
//! オンチェーンのノードレジストリから監視対象集合を取得し、
//! 各ノードをgRPCリフレクションで定期検査して、最新のステータスを
//! HTTPダッシュボード/JSON APIとして公開する。

#![warn(missing_docs)]

pub mod api;
pub mod common;
pub mod config;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod source;
pub mod store;
pub mod types;

use store::StatusStore;

/// HTTPハンドラ間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// ステータスストアへの読み取りハンドル
    pub store: StatusStore,
}
