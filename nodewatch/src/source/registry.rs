//! ノードレジストリ（コントラクト）ソース
//!
//! JSON-RPCプロバイダに対する`eth_call`でレジストリコントラクトの
//! `getAllNodes()`を呼び出し、ABIエンコードされた戻り値から
//! canonicalノードのアドレス集合を復元する。

use crate::common::error::{SourceError, SourceResult};
use crate::source::EndpointSource;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

/// `getAllNodes()`の関数セレクタ（keccak-256先頭4バイト、事前計算済み）
const GET_ALL_NODES_SELECTOR: &str = "0xa1174e7d";

/// ABIのワード幅（バイト）
const WORD: usize = 32;

/// デコードを打ち切る配列長の上限
///
/// プロバイダが返す壊れたデータで巨大な確保が起きないようにする。
const MAX_NODES: usize = 4096;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// レジストリに登録されたノード1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryNode {
    /// レジストリ上のノードID
    pub node_id: u32,
    /// 公開HTTPアドレス（未正規化）
    pub http_address: String,
    /// canonicalネットワークに属するか
    pub is_canonical: bool,
}

/// コントラクト呼び出しベースのエンドポイントソース
pub struct RegistryEndpointSource {
    client: reqwest::Client,
    rpc_url: String,
    contract: String,
}

impl RegistryEndpointSource {
    /// 新しいレジストリソースを作成
    pub fn new(client: reqwest::Client, rpc_url: String, contract: String) -> Self {
        Self {
            client,
            rpc_url,
            contract,
        }
    }

    /// `eth_call`を発行してABIエンコード済みの戻り値を取得する
    async fn call_get_all_nodes(&self) -> SourceResult<Vec<u8>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": self.contract, "data": GET_ALL_NODES_SELECTOR },
                "latest"
            ],
        });

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(SourceError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| SourceError::Decode("response has neither result nor error".into()))?;

        let hex_data = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(hex_data).map_err(|e| SourceError::Decode(format!("invalid hex: {}", e)))
    }
}

#[async_trait]
impl EndpointSource for RegistryEndpointSource {
    async fn resolve(&self) -> SourceResult<HashSet<String>> {
        let data = self.call_get_all_nodes().await?;
        let nodes = decode_all_nodes(&data)?;

        let mut addresses = HashSet::new();
        for node in nodes {
            if !node.is_canonical {
                debug!(node_id = node.node_id, "Skipping non-canonical node");
                continue;
            }
            let address = normalize_address(&node.http_address);
            if address.is_empty() {
                debug!(node_id = node.node_id, "Skipping node with empty address");
                continue;
            }
            addresses.insert(address);
        }
        Ok(addresses)
    }
}

/// ABIワードを読み取る
fn read_word(data: &[u8], offset: usize) -> SourceResult<&[u8]> {
    data.get(offset..offset + WORD)
        .ok_or_else(|| SourceError::Decode(format!("truncated data at offset {}", offset)))
}

/// ABIワードをusizeとして読み取る
///
/// 上位バイトが立っている値はオフセット/長さとして不正なので拒否する。
fn read_usize(data: &[u8], offset: usize) -> SourceResult<usize> {
    let word = read_word(data, offset)?;
    if word[..WORD - 8].iter().any(|&b| b != 0) {
        return Err(SourceError::Decode(format!(
            "oversized integer at offset {}",
            offset
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(buf) as usize)
}

/// ABIワードをboolとして読み取る
fn read_bool(data: &[u8], offset: usize) -> SourceResult<bool> {
    Ok(read_usize(data, offset)? != 0)
}

/// 動的バイト列（bytes/string）を読み取る
fn read_dynamic(data: &[u8], offset: usize) -> SourceResult<&[u8]> {
    let len = read_usize(data, offset)?;
    data.get(offset + WORD..offset + WORD + len)
        .ok_or_else(|| SourceError::Decode(format!("truncated dynamic data at offset {}", offset)))
}

/// ABI stringを読み取る
fn read_string(data: &[u8], offset: usize) -> SourceResult<String> {
    let bytes = read_dynamic(data, offset)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| SourceError::Decode(format!("non-UTF-8 string at offset {}", offset)))
}

/// `getAllNodes()`の戻り値をデコードする
///
/// 戻り値型: `(uint32 nodeId, (bytes signingKeyPub, bool isCanonical,
/// uint256, string httpAddress) node)[]`。nodeタプルのヘッドは4ワードで、
/// 消費するのはワード1（isCanonical）とワード3（httpAddressオフセット）のみ。
pub fn decode_all_nodes(data: &[u8]) -> SourceResult<Vec<RegistryNode>> {
    // 戻り値全体のヘッド: 配列へのオフセット1ワード
    let array_off = read_usize(data, 0)?;
    let len = read_usize(data, array_off)?;
    if len > MAX_NODES {
        return Err(SourceError::Decode(format!(
            "node array length {} exceeds limit",
            len
        )));
    }

    // 要素は動的タプルなので、ヘッドには要素ごとのオフセットが並ぶ
    let elems_base = array_off + WORD;
    let mut nodes = Vec::with_capacity(len);
    for i in 0..len {
        let elem_off = read_usize(data, elems_base + i * WORD)?;
        let elem_base = elems_base + elem_off;

        let node_id = read_usize(data, elem_base)?;
        let node_id = u32::try_from(node_id)
            .map_err(|_| SourceError::Decode(format!("node id {} out of range", node_id)))?;

        // 内側のnodeタプルへのオフセットは要素タプル基点からの相対
        let node_off = read_usize(data, elem_base + WORD)?;
        let node_base = elem_base + node_off;

        // nodeタプル: ワード0（bytesオフセット）とワード2は読み飛ばす
        let is_canonical = read_bool(data, node_base + WORD)?;
        let http_off = read_usize(data, node_base + 3 * WORD)?;
        let http_address = read_string(data, node_base + http_off)?;

        nodes.push(RegistryNode {
            node_id,
            http_address,
            is_canonical,
        });
    }
    Ok(nodes)
}

/// レジストリのHTTPアドレスをgRPCターゲット`host:port`へ正規化する
///
/// スキームと末尾スラッシュを除去し、ポート指定がなければ`:443`を補う。
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme.trim_end_matches('/');
    if host.is_empty() {
        return String::new();
    }
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:443", host)
    }
}
