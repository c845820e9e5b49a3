//! エンドポイントソース
//!
//! 監視対象ノードの「正解集合」を解決する抽象。スケジューラは
//! この抽象越しにのみ集合を取得するため、テストでは任意の集合を
//! 差し込める。

pub mod registry;

use crate::common::error::SourceResult;
use async_trait::async_trait;
use std::collections::HashSet;

/// 監視対象エンドポイント集合の供給元
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// 現在の監視対象アドレス集合を解決する
    ///
    /// 返されるアドレスは正規化済み（`host:port`形式）であること。
    async fn resolve(&self) -> SourceResult<HashSet<String>>;
}
