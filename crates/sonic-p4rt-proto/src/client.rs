//! Client stub for the `p4.v1.P4Runtime` service.
//!
//! Same shape as the `tonic-build` client: a thin wrapper over
//! [`tonic::client::Grpc`] with one method per RPC the session layer uses.

use tonic::codegen::http::uri::PathAndQuery;
use tonic::codegen::*;

use crate::v1::{
    ReadRequest, ReadResponse, SetForwardingPipelineConfigRequest,
    SetForwardingPipelineConfigResponse, StreamMessageRequest, StreamMessageResponse,
    WriteRequest, WriteResponse,
};
use crate::SERVICE_NAME;

#[derive(Debug, Clone)]
pub struct P4RuntimeClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl P4RuntimeClient<tonic::transport::Channel> {
    /// Attempt to create a new client by connecting to a given endpoint.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<tonic::transport::Endpoint>,
        D::Error: Into<StdError>,
    {
        let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(conn))
    }
}

impl<T> P4RuntimeClient<T>
where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
{
    pub fn new(inner: T) -> Self {
        let inner = tonic::client::Grpc::new(inner);
        Self { inner }
    }

    /// Limits the maximum size of a decoded message. Read responses for large
    /// tables can exceed the 4MB default.
    #[must_use]
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_decoding_message_size(limit);
        self
    }

    /// Limits the maximum size of an encoded message.
    #[must_use]
    pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_encoding_message_size(limit);
        self
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
        })
    }

    pub async fn write(
        &mut self,
        request: impl tonic::IntoRequest<WriteRequest>,
    ) -> std::result::Result<tonic::Response<WriteResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(crate::methods::WRITE);
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "Write"));
        self.inner.unary(req, path, codec).await
    }

    pub async fn read(
        &mut self,
        request: impl tonic::IntoRequest<ReadRequest>,
    ) -> std::result::Result<tonic::Response<tonic::codec::Streaming<ReadResponse>>, tonic::Status>
    {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(crate::methods::READ);
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "Read"));
        self.inner.server_streaming(req, path, codec).await
    }

    pub async fn set_forwarding_pipeline_config(
        &mut self,
        request: impl tonic::IntoRequest<SetForwardingPipelineConfigRequest>,
    ) -> std::result::Result<tonic::Response<SetForwardingPipelineConfigResponse>, tonic::Status>
    {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(crate::methods::SET_FORWARDING_PIPELINE_CONFIG);
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "SetForwardingPipelineConfig"));
        self.inner.unary(req, path, codec).await
    }

    pub async fn stream_channel(
        &mut self,
        request: impl tonic::IntoStreamingRequest<Message = StreamMessageRequest>,
    ) -> std::result::Result<
        tonic::Response<tonic::codec::Streaming<StreamMessageResponse>>,
        tonic::Status,
    > {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(crate::methods::STREAM_CHANNEL);
        let mut req = request.into_streaming_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "StreamChannel"));
        self.inner.streaming(req, path, codec).await
    }
}
