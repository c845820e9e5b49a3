//! gRPCプローブ
//!
//! ノード1台に対する到達性チェックを実装する。一次チェックは
//! gRPCリフレクション（v1alpha）の`list_services`で、サービス一覧が
//! 返れば到達可能と判定する。到達可能な場合のみ、メタデータAPIの
//! `GetVersion`でバージョン文字列を取得する（ベストエフォート）。

pub mod metadata;

use crate::types::node::ProbeResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Status};
use tonic_reflection::pb::v1alpha::server_reflection_client::ServerReflectionClient;
use tonic_reflection::pb::v1alpha::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1alpha::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1alpha::ServerReflectionRequest;
use tracing::debug;

/// バージョン照会対象サービス名に含まれるパターン
const VERSION_SERVICE_PATTERN: &str = "metadata_api.MetadataApi";

/// ノード1台を検査するプローブの抽象
#[async_trait]
pub trait Prober: Send + Sync {
    /// 指定アドレス（`host:port`）のノードを検査する
    ///
    /// プローブは失敗してもエラーを返さない。あらゆる結果は
    /// `ProbeResult`のステータスとして表現される。
    async fn probe(&self, address: &str) -> ProbeResult;
}

/// プローブ内部の失敗分類
enum ProbeFailure {
    /// アドレスがURIとして不正
    BadAddress(String),
    /// トランスポート接続の失敗
    Connect(String),
    /// gRPC呼び出しがステータスエラーで失敗
    Rpc(Status),
}

/// gRPCリフレクションベースのプローブ実装
pub struct GrpcProber {
    probe_timeout: Duration,
    version_timeout: Duration,
}

impl GrpcProber {
    /// 新しいプローブを作成
    pub fn new(probe_timeout: Duration, version_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            version_timeout,
        }
    }

    /// TLSチャネルを確立してサービス一覧を取得する
    async fn discover(&self, address: &str) -> Result<(Channel, Vec<String>), ProbeFailure> {
        let endpoint = Endpoint::from_shared(format!("https://{}", address))
            .map_err(|e| ProbeFailure::BadAddress(e.to_string()))?
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| ProbeFailure::BadAddress(e.to_string()))?
            .connect_timeout(self.probe_timeout)
            .timeout(self.probe_timeout);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?;

        let mut client = ServerReflectionClient::new(channel.clone());
        let request = ServerReflectionRequest {
            host: String::new(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut stream = client
            .server_reflection_info(tokio_stream::iter(vec![request]))
            .await
            .map_err(ProbeFailure::Rpc)?
            .into_inner();

        let mut services = Vec::new();
        while let Some(response) = stream.message().await.map_err(ProbeFailure::Rpc)? {
            if let Some(MessageResponse::ListServicesResponse(list)) = response.message_response {
                services.extend(list.service.into_iter().map(|s| s.name));
            }
        }
        Ok((channel, services))
    }

    /// メタデータAPIからバージョン文字列を取得する（ベストエフォート）
    async fn query_version(&self, channel: Channel, services: &[String], address: &str) -> Option<String> {
        let service = services
            .iter()
            .find(|name| name.contains(VERSION_SERVICE_PATTERN))?;

        match timeout(
            self.version_timeout,
            metadata::fetch_version(channel, service),
        )
        .await
        {
            Ok(Ok(version)) => Some(version),
            Ok(Err(status)) => {
                debug!(address, code = ?status.code(), "Version lookup failed");
                None
            }
            Err(_) => {
                debug!(address, "Version lookup timed out");
                None
            }
        }
    }
}

#[async_trait]
impl Prober for GrpcProber {
    async fn probe(&self, address: &str) -> ProbeResult {
        let discovered = match timeout(self.probe_timeout, self.discover(address)).await {
            Ok(Ok(discovered)) => discovered,
            Ok(Err(failure)) => return classify_failure(failure),
            Err(_) => return ProbeResult::timed_out("Probe timed out"),
        };

        let (channel, services) = discovered;
        if services.is_empty() {
            return ProbeResult::unreachable();
        }

        let version = self.query_version(channel, &services, address).await;
        ProbeResult::reachable(version)
    }
}

/// プローブ失敗を公開ステータスへ分類する
fn classify_failure(failure: ProbeFailure) -> ProbeResult {
    match failure {
        ProbeFailure::BadAddress(detail) => ProbeResult::internal_error(&detail),
        // 接続自体が成立しないケースはUNAVAILABLE相当として扱う
        ProbeFailure::Connect(detail) => ProbeResult::protocol_error("UNAVAILABLE", &detail),
        ProbeFailure::Rpc(status) => match status.code() {
            Code::DeadlineExceeded | Code::Cancelled => ProbeResult::timed_out(status.message()),
            code => ProbeResult::protocol_error(code_name(code), status.message()),
        },
    }
}

/// gRPCステータスコードの標準名（UPPER_SNAKE_CASE）
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}
