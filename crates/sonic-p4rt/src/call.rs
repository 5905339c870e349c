//! Per-call options and outcomes.
//!
//! Every session operation takes a [`CallOptions`]. With `dry_run` set the
//! operation builds its request and returns it as a [`RenderedRequest`]
//! without touching the transport; otherwise the request is sent, subject to
//! the optional deadline and cancellation token.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sonic_p4rt_proto::methods;
use sonic_p4rt_proto::v1::{
    ReadRequest, SetForwardingPipelineConfigRequest, StreamMessageRequest, WriteRequest,
};

use crate::error::{P4rtError, P4rtResult};

/// Options applied to a single session operation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Build and return the request without sending it.
    pub dry_run: bool,
    /// Deadline for the call (for streaming reads, per received message).
    pub timeout: Option<Duration>,
    /// Caller-owned cancellation.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Options for a real call with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a dry run.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Sets a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs `fut` for `operation` on `session` under this call's deadline
    /// and cancellation token.
    pub(crate) async fn run<F>(
        &self,
        operation: &'static str,
        session: &str,
        fut: F,
    ) -> P4rtResult<F::Output>
    where
        F: Future,
    {
        let cancel = self.cancel.clone().unwrap_or_default();
        let guarded = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
                    P4rtError::DeadlineExceeded {
                        operation,
                        session: session.to_string(),
                        timeout,
                    }
                }),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(P4rtError::cancelled(operation, session)),
            result = guarded => result,
        }
    }
}

/// Result of a session operation: either the response, or the request that
/// would have been sent.
#[derive(Debug)]
pub enum Outcome<T> {
    Sent(T),
    DryRun(RenderedRequest),
}

impl<T> Outcome<T> {
    /// Returns the response of a sent call.
    pub fn sent(self) -> Option<T> {
        match self {
            Outcome::Sent(value) => Some(value),
            Outcome::DryRun(_) => None,
        }
    }

    /// Returns the rendering of a dry run.
    pub fn rendered(&self) -> Option<&RenderedRequest> {
        match self {
            Outcome::Sent(_) => None,
            Outcome::DryRun(rendered) => Some(rendered),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Outcome::DryRun(_))
    }
}

/// A request built by a session operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Arbitration(StreamMessageRequest),
    SetForwardingPipelineConfig(SetForwardingPipelineConfigRequest),
    Write(WriteRequest),
    Read(ReadRequest),
}

impl RequestBody {
    /// The gRPC method this request travels on.
    pub fn method(&self) -> &'static str {
        match self {
            RequestBody::Arbitration(_) => methods::STREAM_CHANNEL,
            RequestBody::SetForwardingPipelineConfig(_) => methods::SET_FORWARDING_PIPELINE_CONFIG,
            RequestBody::Write(_) => methods::WRITE,
            RequestBody::Read(_) => methods::READ,
        }
    }
}

/// Structured rendering of a request that was not sent.
///
/// Deterministic: identical inputs always produce equal values and equal
/// `Display` output.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    /// Protocol operation label (e.g., "MasterArbitrationUpdate").
    pub operation: &'static str,
    /// The request itself.
    pub body: RequestBody,
}

impl RenderedRequest {
    pub(crate) fn new(operation: &'static str, body: RequestBody) -> Self {
        Self { operation, body }
    }

    pub fn method(&self) -> &'static str {
        self.body.method()
    }
}

impl fmt::Display for RenderedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P4Runtime {}: ", self.operation)?;
        match &self.body {
            RequestBody::Arbitration(req) => write!(f, "{:#?}", req),
            RequestBody::SetForwardingPipelineConfig(req) => write!(f, "{:#?}", req),
            RequestBody::Write(req) => write!(f, "{:#?}", req),
            RequestBody::Read(req) => write!(f, "{:#?}", req),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_without_limits() {
        let opts = CallOptions::new();
        let value = opts.run("Write", "s1", async { 5 }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_exceeded() {
        let opts = CallOptions::new().with_timeout(Duration::from_millis(10));
        let result = opts
            .run("Write", "s1", tokio::time::sleep(Duration::from_secs(60)))
            .await;
        assert!(matches!(
            result,
            Err(P4rtError::DeadlineExceeded { operation: "Write", ref session, .. }) if session == "s1"
        ));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let opts = CallOptions::new().with_cancellation(token);
        let result = opts.run("Read", "s1", std::future::pending::<()>()).await;
        assert!(matches!(result, Err(P4rtError::Cancelled { operation: "Read", .. })));
    }

    #[test]
    fn test_rendered_display_is_stable() {
        let rendered = RenderedRequest::new("Read", RequestBody::Read(ReadRequest::default()));
        assert_eq!(rendered.to_string(), rendered.clone().to_string());
        assert!(rendered.to_string().starts_with("P4Runtime Read: ReadRequest"));
        assert_eq!(rendered.method(), "/p4.v1.P4Runtime/Read");
    }

    #[test]
    fn test_outcome_accessors() {
        let sent: Outcome<u32> = Outcome::Sent(1);
        assert!(!sent.is_dry_run());
        assert_eq!(sent.sent(), Some(1));

        let dry: Outcome<u32> = Outcome::DryRun(RenderedRequest::new(
            "Write",
            RequestBody::Write(WriteRequest::default()),
        ));
        assert!(dry.is_dry_run());
        assert!(dry.rendered().is_some());
    }
}
