//! RPC client for plugin processes
//!
//! [`PluginClient`] is the seam between the supervisor and a plugin's gRPC
//! server. The production implementation drives `tonic`'s generic client
//! directly with the prost messages from `call-assist-plugin-api`; tests
//! substitute a scripted client through [`PluginConnector`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use call_assist_plugin_api::{
    CallEndRequest, CallEndResponse, CallStartRequest, CallStartResponse, Empty, HealthResponse,
    PluginConfig, PluginStatus, paths,
};

use crate::errors::{PluginError, PluginResult};

/// Remote operations a plugin exposes
#[async_trait]
pub trait PluginClient: Send + Sync {
    async fn health(&self) -> PluginResult<HealthResponse>;

    async fn initialize(&self, config: PluginConfig) -> PluginResult<PluginStatus>;

    async fn start_call(&self, request: CallStartRequest) -> PluginResult<CallStartResponse>;

    async fn end_call(&self, request: CallEndRequest) -> PluginResult<CallEndResponse>;

    async fn shutdown(&self) -> PluginResult<()>;
}

/// Factory for clients bound to a local plugin port
pub trait PluginConnector: Send + Sync {
    fn connect(&self, port: u16) -> PluginResult<Arc<dyn PluginClient>>;
}

/// Run an RPC future under a time budget
pub async fn with_timeout<T, F>(budget: Duration, fut: F) -> PluginResult<T>
where
    F: Future<Output = PluginResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(PluginError::Timeout(budget)),
    }
}

// =============================================================================
// gRPC implementation
// =============================================================================

/// tonic-backed plugin client over a lazily connected channel
#[derive(Debug, Clone)]
pub struct GrpcPluginClient {
    channel: Channel,
}

impl GrpcPluginClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    async fn unary<Req, Resp>(&self, path: &'static str, message: Req) -> PluginResult<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());

        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("Service not ready: {e}")))?;

        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        let response = grpc
            .unary(Request::new(message), PathAndQuery::from_static(path), codec)
            .await?;

        Ok(response.into_inner())
    }
}

#[async_trait]
impl PluginClient for GrpcPluginClient {
    async fn health(&self) -> PluginResult<HealthResponse> {
        self.unary(paths::GET_HEALTH, Empty {}).await
    }

    async fn initialize(&self, config: PluginConfig) -> PluginResult<PluginStatus> {
        self.unary(paths::INITIALIZE, config).await
    }

    async fn start_call(&self, request: CallStartRequest) -> PluginResult<CallStartResponse> {
        self.unary(paths::START_CALL, request).await
    }

    async fn end_call(&self, request: CallEndRequest) -> PluginResult<CallEndResponse> {
        self.unary(paths::END_CALL, request).await
    }

    async fn shutdown(&self) -> PluginResult<()> {
        let _: Empty = self.unary(paths::SHUTDOWN, Empty {}).await?;
        Ok(())
    }
}

/// Connects to plugins listening on the loopback interface
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl PluginConnector for GrpcConnector {
    fn connect(&self, port: u16) -> PluginResult<Arc<dyn PluginClient>> {
        let channel = Endpoint::from_shared(format!("http://127.0.0.1:{port}"))?
            .connect_timeout(self.connect_timeout)
            .connect_lazy();

        Ok(Arc::new(GrpcPluginClient::new(channel)))
    }
}
