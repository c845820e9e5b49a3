//! メタデータAPIクライアント
//!
//! バージョン照会RPC `GetVersion` のメッセージ型と呼び出しヘルパー。
//! メッセージ本体が空リクエスト/文字列1フィールドのみのため、
//! protoコンパイルは行わずprost deriveで直接宣言する。

use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Request, Status};

/// GetVersionリクエスト（空メッセージ）
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVersionRequest {}

/// GetVersionレスポンス
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVersionResponse {
    /// ノードのソフトウェアバージョン文字列
    #[prost(string, tag = "1")]
    pub version: String,
}

/// 指定サービスの`GetVersion`を呼び出してバージョン文字列を取得する
///
/// `service`はフルサービス名（例: `xmtp.xmtpv4.metadata_api.MetadataApi`）。
pub async fn fetch_version(channel: Channel, service: &str) -> Result<String, Status> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Status::unknown(format!("service not ready: {}", e)))?;

    let codec: ProstCodec<GetVersionRequest, GetVersionResponse> = ProstCodec::default();
    let path = PathAndQuery::try_from(format!("/{}/GetVersion", service))
        .map_err(|e| Status::internal(format!("invalid method path: {}", e)))?;

    let response = grpc
        .unary(Request::new(GetVersionRequest {}), path, codec)
        .await?;
    Ok(response.into_inner().version)
}
