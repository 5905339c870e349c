//! Transport seam between the session and gRPC.
//!
//! [`P4RuntimeTransport`] covers the four RPCs a session issues. The gRPC
//! implementation is [`GrpcTransport`]; [`RequestLogger`](crate::request_log::RequestLogger)
//! decorates any transport; tests supply in-memory mocks.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

use sonic_p4rt_proto::v1::{
    ReadRequest, ReadResponse, SetForwardingPipelineConfigRequest,
    SetForwardingPipelineConfigResponse, StreamMessageRequest, StreamMessageResponse,
    WriteRequest, WriteResponse,
};
use sonic_p4rt_proto::P4RuntimeClient;

use crate::config::TlsSettings;
use crate::error::{P4rtError, P4rtResult};

/// Outbound half of the control stream.
pub type OutboundStream = BoxStream<'static, StreamMessageRequest>;

/// Inbound half of the control stream.
pub type InboundStream = BoxStream<'static, Result<StreamMessageResponse, Status>>;

/// Server-streamed read responses.
pub type ReadResponseStream = BoxStream<'static, Result<ReadResponse, Status>>;

/// The P4Runtime calls a session makes.
#[async_trait]
pub trait P4RuntimeTransport: Send + Sync {
    /// Opens the bidirectional control stream, fed by `outbound`.
    async fn stream_channel(&self, outbound: OutboundStream) -> Result<InboundStream, Status>;

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<SetForwardingPipelineConfigResponse, Status>;

    async fn write(&self, request: WriteRequest) -> Result<WriteResponse, Status>;

    async fn read(&self, request: ReadRequest) -> Result<ReadResponseStream, Status>;
}

/// Channel settings for [`GrpcTransport`].
#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub connect_timeout: Option<Duration>,
    pub tls: Option<TlsSettings>,
}

/// P4Runtime over a tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    client: P4RuntimeClient<Channel>,
}

impl GrpcTransport {
    /// Creates a transport for `address` (`host:port`).
    ///
    /// The channel connects lazily on first use, so an unreachable device
    /// surfaces as a transport error on the first call rather than here.
    pub fn connect_lazy(address: &str, settings: &ChannelSettings) -> P4rtResult<Self> {
        let endpoint = Self::endpoint(address, settings)?;
        debug!(address, tls = settings.tls.is_some(), "Creating P4Runtime channel");
        Ok(Self::from_channel(endpoint.connect_lazy()))
    }

    /// Wraps an existing channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: P4RuntimeClient::new(channel).max_decoding_message_size(usize::MAX),
        }
    }

    fn endpoint(address: &str, settings: &ChannelSettings) -> P4rtResult<Endpoint> {
        let invalid = |message: String| P4rtError::InvalidAddress {
            address: address.to_string(),
            message,
        };

        let scheme = if settings.tls.is_some() { "https" } else { "http" };
        let mut endpoint = Endpoint::from_shared(format!("{}://{}", scheme, address))
            .map_err(|e| invalid(e.to_string()))?
            .tcp_nodelay(true);

        if let Some(timeout) = settings.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        if let Some(tls) = &settings.tls {
            endpoint = apply_tls(endpoint, tls)?;
        }

        Ok(endpoint)
    }
}

#[cfg(feature = "tls")]
fn apply_tls(endpoint: Endpoint, tls: &TlsSettings) -> P4rtResult<Endpoint> {
    use tonic::transport::{Certificate, ClientTlsConfig};

    let mut config = ClientTlsConfig::new();
    if let Some(ca) = &tls.ca_certificate {
        let pem = std::fs::read(ca)?;
        config = config.ca_certificate(Certificate::from_pem(pem));
    }
    if let Some(domain) = &tls.domain_name {
        config = config.domain_name(domain.clone());
    }
    endpoint
        .tls_config(config)
        .map_err(|e| P4rtError::Config(format!("TLS setup failed: {}", e)))
}

#[cfg(not(feature = "tls"))]
fn apply_tls(_endpoint: Endpoint, _tls: &TlsSettings) -> P4rtResult<Endpoint> {
    Err(P4rtError::Config(
        "TLS requested but sonic-p4rt was built without the `tls` feature".to_string(),
    ))
}

#[async_trait]
impl P4RuntimeTransport for GrpcTransport {
    async fn stream_channel(&self, outbound: OutboundStream) -> Result<InboundStream, Status> {
        // tonic needs a `Sync` request stream; forward through a channel
        // receiver. The forwarder ends with the outbound stream or the RPC.
        let (tx, rx) = futures::channel::mpsc::unbounded();
        tokio::spawn(outbound.map(Ok).forward(tx));

        let mut client = self.client.clone();
        let response = client.stream_channel(rx).await?;
        Ok(response.into_inner().boxed())
    }

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<SetForwardingPipelineConfigResponse, Status> {
        let mut client = self.client.clone();
        Ok(client.set_forwarding_pipeline_config(request).await?.into_inner())
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResponse, Status> {
        let mut client = self.client.clone();
        Ok(client.write(request).await?.into_inner())
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResponseStream, Status> {
        let mut client = self.client.clone();
        let response = client.read(request).await?;
        Ok(response.into_inner().boxed())
    }
}
