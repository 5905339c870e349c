//! P4Runtime switch session.
//!
//! A [`SwitchConnection`] is one control-plane session to one device. On
//! creation it opens the StreamChannel RPC, fed by an [`OutboundQueue`], and
//! registers itself with a [`SessionRegistry`]. The caller then claims
//! mastership with [`master_arbitration_update`](SwitchConnection::master_arbitration_update)
//! and programs the device through the unary and read operations.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AC-3: Access Enforcement - Election id on every mutating request
//! - AU-12: Audit Record Generation - Optional request log of every outbound call
//! - SC-8: Transmission Confidentiality - Optional TLS channel
//!
//! # Stream handling
//!
//! The StreamChannel call is opened by a background task at construction.
//! The session keeps the resulting inbound stream and reads it only on
//! demand: arbitration enqueues exactly one request and then takes exactly
//! one inbound message. Anything else the device sends stays unread in the
//! transport, subject to its flow control. Shutdown closes the queue (ending
//! the outbound half) and drops the inbound half, which cancels the RPC.
//! Readers blocked on the stream wake up with [`P4rtError::Cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, info, warn};

use sonic_p4rt_proto::rpc::CODE_OK;
use sonic_p4rt_proto::v1::{
    set_forwarding_pipeline_config_request, stream_message_request, update, CounterEntry,
    Entity, ForwardingPipelineConfig, Index, MasterArbitrationUpdate, ReadRequest, ReadResponse,
    SetForwardingPipelineConfigRequest, SetForwardingPipelineConfigResponse,
    StreamMessageRequest, StreamMessageResponse, TableEntry, Uint128, Update, WriteRequest,
    WriteResponse,
};

use crate::call::{CallOptions, Outcome, RenderedRequest, RequestBody};
use crate::config::{ElectionId, SessionConfig};
use crate::device_config::{DeviceConfigBuilder, DeviceConfigParams};
use crate::error::{P4rtError, P4rtResult};
use crate::queue::OutboundQueue;
use crate::registry::{ManagedSession, SessionRegistry};
use crate::request_log::RequestLogger;
use crate::transport::{GrpcTransport, InboundStream, P4RuntimeTransport};

const OP_ARBITRATION: &str = "MasterArbitrationUpdate";
const OP_SET_PIPELINE: &str = "SetForwardingPipelineConfig";
const OP_WRITE: &str = "Write";
const OP_READ_TABLE: &str = "ReadTableEntries";
const OP_READ_COUNTERS: &str = "ReadCounters";

/// Wildcard table/counter id: read everything.
pub const WILDCARD_ID: u32 = 0;

/// Encoded `p4.config.v1.P4Info` describing the installed pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineInfo(Vec<u8>);

impl PipelineInfo {
    /// Wraps an encoded P4Info message.
    pub fn from_encoded(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Loads a binary-encoded P4Info file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> P4rtResult<Self> {
        Ok(Self(std::fs::read(path)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Server-streamed read results.
///
/// Finite and not restartable. An abnormal end is yielded as a final
/// [`P4rtError::StreamTerminated`] item.
pub type ReadStream = BoxStream<'static, P4rtResult<ReadResponse>>;

/// Returns true if an arbitration response grants mastership to this client.
pub fn is_primary(response: &StreamMessageResponse) -> bool {
    response
        .arbitration()
        .map(|update| update.status.as_ref().map_or(true, |s| s.code == CODE_OK))
        .unwrap_or(false)
}

/// One P4Runtime session to one device.
pub struct SwitchConnection {
    name: String,
    address: String,
    device_id: u64,
    election_id: ElectionId,
    pipeline_info: RwLock<Option<PipelineInfo>>,
    transport: Arc<dyn P4RuntimeTransport>,
    device_config: Arc<dyn DeviceConfigBuilder>,
    requests: OutboundQueue<StreamMessageRequest>,
    inbound: Mutex<Inbound>,
    shutdown_token: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for SwitchConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchConnection")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("device_id", &self.device_id)
            .field("election_id", &self.election_id)
            .field("device_family", &self.device_config.family())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SwitchConnection {
    /// Opens a session over a plaintext (or TLS) gRPC channel.
    ///
    /// Must be called within a Tokio runtime. The channel connects lazily;
    /// the control stream is opened immediately in the background.
    pub fn open(
        config: SessionConfig,
        device_config: Arc<dyn DeviceConfigBuilder>,
        registry: &SessionRegistry,
    ) -> P4rtResult<Arc<Self>> {
        config.validate()?;
        let transport = GrpcTransport::connect_lazy(&config.address, &config.channel_settings())?;
        Self::with_transport(config, Arc::new(transport), device_config, registry)
    }

    /// Opens a session over a caller-supplied transport.
    ///
    /// If `config.proto_dump_file` is set, the transport is wrapped in a
    /// [`RequestLogger`] and the log file is truncated.
    pub fn with_transport(
        config: SessionConfig,
        transport: Arc<dyn P4RuntimeTransport>,
        device_config: Arc<dyn DeviceConfigBuilder>,
        registry: &SessionRegistry,
    ) -> P4rtResult<Arc<Self>> {
        let name = config.display_name();
        let transport: Arc<dyn P4RuntimeTransport> = match &config.proto_dump_file {
            Some(path) => Arc::new(RequestLogger::new(transport, path)?),
            None => transport,
        };

        let requests = OutboundQueue::new();
        let outbound = requests
            .take_stream()
            .ok_or_else(|| P4rtError::Config("Outbound queue already consumed".to_string()))?;
        let shutdown_token = CancellationToken::new();
        let opening = tokio::spawn(open_stream_channel(
            name.clone(),
            transport.clone(),
            outbound,
            shutdown_token.clone(),
        ));

        let session = Arc::new(Self {
            name,
            address: config.address,
            device_id: config.device_id,
            election_id: config.election_id,
            pipeline_info: RwLock::new(None),
            transport,
            device_config,
            requests,
            inbound: Mutex::new(Inbound::Opening(opening)),
            shutdown_token,
            closed: AtomicBool::new(false),
        });

        registry.register(&session);
        info!(
            session = %session.name,
            address = %session.address,
            device_id = session.device_id,
            family = session.device_config.family(),
            "Opened P4Runtime session"
        );
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    /// The pipeline descriptor the caller recorded as installed.
    pub fn pipeline_info(&self) -> Option<PipelineInfo> {
        self.pipeline_info.read().clone()
    }

    pub fn set_pipeline_info(&self, info: PipelineInfo) {
        *self.pipeline_info.write() = Some(info);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn election(&self) -> Option<Uint128> {
        Some(self.election_id.into())
    }

    fn ensure_open(&self) -> P4rtResult<()> {
        if self.is_closed() {
            Err(P4rtError::SessionClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn dry_run(&self, operation: &'static str, body: RequestBody) -> RenderedRequest {
        let rendered = RenderedRequest::new(operation, body);
        debug!(session = %self.name, "{}", rendered);
        rendered
    }

    /// Builds the arbitration request for this session.
    pub fn arbitration_request(&self) -> StreamMessageRequest {
        StreamMessageRequest {
            update: Some(stream_message_request::Update::Arbitration(
                MasterArbitrationUpdate {
                    device_id: self.device_id,
                    election_id: self.election(),
                    status: None,
                },
            )),
        }
    }

    /// Claims mastership over the device.
    ///
    /// Sends one arbitration request on the control stream and returns the
    /// next inbound message. Further messages are left unread on the stream.
    /// If the stream ends or fails first, returns
    /// [`P4rtError::ArbitrationFailure`].
    pub async fn master_arbitration_update(
        &self,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<StreamMessageResponse>> {
        let request = self.arbitration_request();
        if opts.dry_run {
            return Ok(Outcome::DryRun(
                self.dry_run(OP_ARBITRATION, RequestBody::Arbitration(request)),
            ));
        }
        self.ensure_open()?;

        // Hold the inbound stream across the send so concurrent arbitrations
        // pair each request with its own reply.
        let mut inbound = self.inbound.lock().await;
        if self.requests.put(request).is_err() {
            self.ensure_open()?;
            // The stream consumed and dropped the queue: the RPC has ended.
            return Err(P4rtError::arbitration(
                &self.name,
                "control stream closed before the request was sent",
                None,
            ));
        }
        debug!(session = %self.name, device_id = self.device_id, "Sent arbitration request");

        let shutdown = self.shutdown_token.clone();
        let received = opts
            .run(OP_ARBITRATION, &self.name, async {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    msg = inbound.next_message() => Some(msg),
                }
            })
            .await?;

        match received {
            None => {
                // Shutdown could not take the stream while this call held it.
                *inbound = Inbound::Closed;
                Err(P4rtError::cancelled(OP_ARBITRATION, &self.name))
            }
            Some(Some(Ok(response))) => {
                info!(
                    session = %self.name,
                    primary = is_primary(&response),
                    "Received arbitration response"
                );
                Ok(Outcome::Sent(response))
            }
            Some(Some(Err(status))) => {
                warn!(session = %self.name, error = %status, "Control stream failed during arbitration");
                Err(P4rtError::arbitration(
                    &self.name,
                    "control stream failed before a response",
                    Some(status),
                ))
            }
            Some(None) => {
                warn!(session = %self.name, "Control stream closed during arbitration");
                Err(P4rtError::arbitration(
                    &self.name,
                    "control stream closed before a response",
                    None,
                ))
            }
        }
    }

    /// Builds the pipeline config request. Fails before any network call if
    /// the device config cannot be built.
    pub fn pipeline_config_request(
        &self,
        pipeline_info: &PipelineInfo,
        params: &DeviceConfigParams,
    ) -> P4rtResult<SetForwardingPipelineConfigRequest> {
        let device_config = self.device_config.build(params)?;
        Ok(SetForwardingPipelineConfigRequest {
            device_id: self.device_id,
            election_id: self.election(),
            action: set_forwarding_pipeline_config_request::Action::VerifyAndCommit as i32,
            config: Some(ForwardingPipelineConfig {
                p4info: pipeline_info.as_bytes().to_vec(),
                p4_device_config: device_config,
            }),
        })
    }

    /// Installs a forwarding pipeline (VERIFY_AND_COMMIT).
    pub async fn set_forwarding_pipeline_config(
        &self,
        pipeline_info: &PipelineInfo,
        params: &DeviceConfigParams,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<SetForwardingPipelineConfigResponse>> {
        let request = self.pipeline_config_request(pipeline_info, params)?;
        if opts.dry_run {
            return Ok(Outcome::DryRun(self.dry_run(
                OP_SET_PIPELINE,
                RequestBody::SetForwardingPipelineConfig(request),
            )));
        }
        self.ensure_open()?;

        let response = opts
            .run(
                OP_SET_PIPELINE,
                &self.name,
                self.transport.set_forwarding_pipeline_config(request),
            )
            .await?
            .map_err(|status| P4rtError::transport(OP_SET_PIPELINE, &self.name, status))?;
        info!(session = %self.name, family = self.device_config.family(), "Pipeline config committed");
        Ok(Outcome::Sent(response))
    }

    /// Builds a write request carrying a single update.
    pub fn write_request(&self, update_type: update::Type, entry: TableEntry) -> WriteRequest {
        WriteRequest {
            device_id: self.device_id,
            election_id: self.election(),
            updates: vec![Update {
                r#type: update_type as i32,
                entity: Some(Entity::table_entry(entry)),
            }],
        }
    }

    /// Inserts one table entry.
    pub async fn write_table_entry(
        &self,
        entry: TableEntry,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<WriteResponse>> {
        self.write_update(update::Type::Insert, entry, opts).await
    }

    /// Writes one table entry with the given update type.
    ///
    /// `update::Type::Unspecified` is rejected before anything is sent.
    pub async fn write_update(
        &self,
        update_type: update::Type,
        entry: TableEntry,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<WriteResponse>> {
        if update_type == update::Type::Unspecified {
            return Err(P4rtError::Config(format!(
                "Write on session '{}' needs an INSERT, MODIFY or DELETE update",
                self.name
            )));
        }
        let request = self.write_request(update_type, entry);
        if opts.dry_run {
            return Ok(Outcome::DryRun(
                self.dry_run(OP_WRITE, RequestBody::Write(request)),
            ));
        }
        self.ensure_open()?;

        let response = opts
            .run(OP_WRITE, &self.name, self.transport.write(request))
            .await?
            .map_err(|status| P4rtError::transport(OP_WRITE, &self.name, status))?;
        debug!(session = %self.name, update = update_type.as_str_name(), "Table entry written");
        Ok(Outcome::Sent(response))
    }

    /// Builds a read request for one table, or all tables when `table_id` is `None`.
    pub fn read_table_request(&self, table_id: Option<u32>) -> ReadRequest {
        ReadRequest {
            device_id: self.device_id,
            entities: vec![Entity::table_entry(TableEntry {
                table_id: table_id.unwrap_or(WILDCARD_ID),
                ..Default::default()
            })],
        }
    }

    /// Reads table entries.
    pub async fn read_table_entries(
        &self,
        table_id: Option<u32>,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<ReadStream>> {
        let request = self.read_table_request(table_id);
        self.read(OP_READ_TABLE, request, opts).await
    }

    /// Builds a read request for a counter, optionally a single cell.
    pub fn read_counters_request(&self, counter_id: Option<u32>, index: Option<i64>) -> ReadRequest {
        ReadRequest {
            device_id: self.device_id,
            entities: vec![Entity::counter_entry(CounterEntry {
                counter_id: counter_id.unwrap_or(WILDCARD_ID),
                index: index.map(|index| Index { index }),
                data: None,
            })],
        }
    }

    /// Reads counters.
    pub async fn read_counters(
        &self,
        counter_id: Option<u32>,
        index: Option<i64>,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<ReadStream>> {
        let request = self.read_counters_request(counter_id, index);
        self.read(OP_READ_COUNTERS, request, opts).await
    }

    async fn read(
        &self,
        operation: &'static str,
        request: ReadRequest,
        opts: &CallOptions,
    ) -> P4rtResult<Outcome<ReadStream>> {
        if opts.dry_run {
            return Ok(Outcome::DryRun(
                self.dry_run(operation, RequestBody::Read(request)),
            ));
        }
        self.ensure_open()?;

        let inner = opts
            .run(operation, &self.name, self.transport.read(request))
            .await?
            .map_err(|status| P4rtError::transport(operation, &self.name, status))?;

        let state = ReadState {
            inner: Some(inner),
            operation,
            session: self.name.clone(),
            opts: opts.clone(),
            shutdown: self.shutdown_token.child_token(),
        };
        Ok(Outcome::Sent(
            stream::unfold(state, ReadState::next).fuse().boxed(),
        ))
    }

    /// Closes the outbound queue and cancels the control stream.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(session = %self.name, "Session already shut down");
            return;
        }
        self.requests.close();
        self.shutdown_token.cancel();
        // An arbitration in progress holds the stream and drops it on
        // cancellation instead.
        if let Ok(mut inbound) = self.inbound.try_lock() {
            *inbound = Inbound::Closed;
        }
        info!(session = %self.name, "P4Runtime session shut down");
    }
}

impl ManagedSession for SwitchConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn shutdown(&self) -> P4rtResult<()> {
        SwitchConnection::shutdown(self);
        Ok(())
    }
}

impl Drop for SwitchConnection {
    fn drop(&mut self) {
        self.requests.close();
        self.shutdown_token.cancel();
    }
}

/// The session's view of the inbound half of the control stream.
enum Inbound {
    /// The StreamChannel call is still being opened.
    Opening(JoinHandle<Result<InboundStream, Status>>),
    Open(InboundStream),
    /// Ended, failed or dropped by shutdown.
    Closed,
}

impl Inbound {
    /// Reads the next inbound message, waiting for the call to open first.
    ///
    /// Cancel safe. Returns `None` once the stream has ended.
    async fn next_message(&mut self) -> Option<Result<StreamMessageResponse, Status>> {
        if let Inbound::Opening(task) = self {
            let opened = match task.await {
                Ok(opened) => opened,
                Err(e) => Err(Status::cancelled(format!("control stream task ended: {}", e))),
            };
            match opened {
                Ok(stream) => *self = Inbound::Open(stream),
                Err(status) => {
                    *self = Inbound::Closed;
                    return Some(Err(status));
                }
            }
        }

        match self {
            Inbound::Open(stream) => {
                let item = stream.next().await;
                if !matches!(item, Some(Ok(_))) {
                    *self = Inbound::Closed;
                }
                item
            }
            Inbound::Opening(_) | Inbound::Closed => None,
        }
    }
}

/// State threaded through a [`ReadStream`].
struct ReadState {
    /// `None` once the stream has ended.
    inner: Option<crate::transport::ReadResponseStream>,
    operation: &'static str,
    session: String,
    opts: CallOptions,
    shutdown: CancellationToken,
}

impl ReadState {
    async fn next(mut self) -> Option<(P4rtResult<ReadResponse>, Self)> {
        let inner = self.inner.as_mut()?;
        let shutdown = self.shutdown.clone();
        let operation = self.operation;
        let session = self.session.as_str();
        let item = self
            .opts
            .run(operation, session, async {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => Err(P4rtError::cancelled(operation, session)),
                    item = inner.next() => Ok(item),
                }
            })
            .await
            .and_then(|inner_result| inner_result);

        match item {
            Ok(Some(Ok(response))) => Some((Ok(response), self)),
            Ok(None) => None,
            Ok(Some(Err(status))) => {
                warn!(session = %self.session, operation, error = %status, "Read stream terminated");
                self.inner = None;
                let err = P4rtError::stream_terminated(operation, &self.session, status);
                Some((Err(err), self))
            }
            Err(err) => {
                self.inner = None;
                Some((Err(err), self))
            }
        }
    }
}

/// Opens the StreamChannel RPC unless the session shuts down first.
async fn open_stream_channel(
    session: String,
    transport: Arc<dyn P4RuntimeTransport>,
    outbound: crate::transport::OutboundStream,
    shutdown: CancellationToken,
) -> Result<InboundStream, Status> {
    let opened = tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(Status::cancelled("session shut down")),
        opened = transport.stream_channel(outbound) => opened,
    };

    match &opened {
        Ok(_) => debug!(session = %session, "Control stream open"),
        Err(status) => warn!(session = %session, error = %status, "Failed to open control stream"),
    }
    opened
}
