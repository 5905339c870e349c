//! In-memory P4Runtime device for session tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tonic::{Code, Status};

use sonic_p4rt::proto::rpc;
use sonic_p4rt::proto::v1::{
    stream_message_request, stream_message_response, CounterEntry, Entity, MasterArbitrationUpdate,
    PacketIn, ReadRequest, ReadResponse, SetForwardingPipelineConfigRequest,
    SetForwardingPipelineConfigResponse, StreamMessageRequest, StreamMessageResponse, TableEntry,
    WriteRequest, WriteResponse,
};
use sonic_p4rt::transport::{InboundStream, OutboundStream, ReadResponseStream};

/// Inbound buffer of the flooding control stream.
pub const FLOOD_BUFFER: usize = 8;
use sonic_p4rt::P4RuntimeTransport;

/// How the mock answers the control stream.
#[derive(Debug, Clone, Copy)]
pub enum StreamMode {
    /// Reply to each arbitration request with this many responses.
    Echo(usize),
    /// Accept the stream but never reply.
    Silent,
    /// End the inbound stream right away.
    CloseImmediately,
    /// Fail the StreamChannel call.
    FailToOpen,
    /// Push this many PacketIns through a bounded inbound buffer, unprompted.
    Flood(usize),
}

pub struct MockDevice {
    pub stream_mode: StreamMode,
    pub table_entries: Vec<TableEntry>,
    pub counter_entries: Vec<CounterEntry>,
    /// Fail reads with INTERNAL after this many responses.
    pub read_error_after: Option<usize>,
    /// Fail unary calls with this code.
    pub unary_error: Option<Code>,
    /// Leave reads open after the last response.
    pub read_stall: bool,

    pub stream_opened: AtomicBool,
    pub outbound_closed: Arc<AtomicBool>,
    /// PacketIns accepted by the flooding stream's buffer.
    pub inbound_sent: Arc<AtomicUsize>,
    pub stream_requests: Arc<Mutex<Vec<StreamMessageRequest>>>,
    pub pipeline_configs: Mutex<Vec<SetForwardingPipelineConfigRequest>>,
    pub writes: Mutex<Vec<WriteRequest>>,
    pub reads: Mutex<Vec<ReadRequest>>,
}

impl MockDevice {
    pub fn new(stream_mode: StreamMode) -> Self {
        Self {
            stream_mode,
            table_entries: Vec::new(),
            counter_entries: Vec::new(),
            read_error_after: None,
            unary_error: None,
            read_stall: false,
            stream_opened: AtomicBool::new(false),
            outbound_closed: Arc::new(AtomicBool::new(false)),
            inbound_sent: Arc::new(AtomicUsize::new(0)),
            stream_requests: Arc::new(Mutex::new(Vec::new())),
            pipeline_configs: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table_entries(mut self, entries: Vec<TableEntry>) -> Self {
        self.table_entries = entries;
        self
    }

    pub fn with_counter_entries(mut self, entries: Vec<CounterEntry>) -> Self {
        self.counter_entries = entries;
        self
    }

    pub fn with_read_error_after(mut self, count: usize) -> Self {
        self.read_error_after = Some(count);
        self
    }

    pub fn with_unary_error(mut self, code: Code) -> Self {
        self.unary_error = Some(code);
        self
    }

    pub fn with_read_stall(mut self) -> Self {
        self.read_stall = true;
        self
    }

    /// Number of unary and read calls received.
    pub fn rpc_count(&self) -> usize {
        self.pipeline_configs.lock().len() + self.writes.lock().len() + self.reads.lock().len()
    }

    fn unary_result(&self) -> Result<(), Status> {
        match self.unary_error {
            Some(code) => Err(Status::new(code, "device rejected request")),
            None => Ok(()),
        }
    }

    fn table_responses(&self, filter: &TableEntry) -> Vec<ReadResponse> {
        self.table_entries
            .iter()
            .filter(|e| filter.table_id == 0 || e.table_id == filter.table_id)
            .map(|e| ReadResponse {
                entities: vec![Entity::table_entry(e.clone())],
            })
            .collect()
    }

    fn counter_responses(&self, filter: &CounterEntry) -> Vec<ReadResponse> {
        self.counter_entries
            .iter()
            .filter(|c| filter.counter_id == 0 || c.counter_id == filter.counter_id)
            .filter(|c| filter.index.is_none() || c.index == filter.index)
            .map(|c| ReadResponse {
                entities: vec![Entity::counter_entry(c.clone())],
            })
            .collect()
    }
}

/// Arbitration reply tagged so tests can tell replies apart.
pub fn arbitration_reply(request: &MasterArbitrationUpdate, tag: String) -> StreamMessageResponse {
    StreamMessageResponse {
        update: Some(stream_message_response::Update::Arbitration(
            MasterArbitrationUpdate {
                device_id: request.device_id,
                election_id: request.election_id,
                status: Some(rpc::Status {
                    code: rpc::CODE_OK,
                    message: tag,
                }),
            },
        )),
    }
}

/// Returns the tag of an arbitration reply.
pub fn reply_tag(response: &StreamMessageResponse) -> String {
    response
        .arbitration()
        .and_then(|a| a.status.as_ref())
        .map(|s| s.message.clone())
        .unwrap_or_default()
}

/// Waits until `condition` holds, or fails after a second.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 1s");
}

/// Waits until `flag` is set, or fails after a second.
pub async fn wait_for(flag: &AtomicBool) {
    wait_until(|| flag.load(Ordering::SeqCst)).await;
}

#[async_trait]
impl P4RuntimeTransport for MockDevice {
    async fn stream_channel(&self, mut outbound: OutboundStream) -> Result<InboundStream, Status> {
        self.stream_opened.store(true, Ordering::SeqCst);

        let echo = match self.stream_mode {
            StreamMode::FailToOpen => return Err(Status::unavailable("device unreachable")),
            StreamMode::CloseImmediately => return Ok(stream::empty().boxed()),
            StreamMode::Echo(count) => count,
            StreamMode::Silent | StreamMode::Flood(_) => 0,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let seen = self.stream_requests.clone();
        let closed = self.outbound_closed.clone();
        tokio::spawn(async move {
            let mut index = 0;
            while let Some(request) = outbound.next().await {
                seen.lock().push(request.clone());
                if let Some(stream_message_request::Update::Arbitration(update)) = &request.update {
                    for k in 0..echo {
                        let reply = arbitration_reply(update, format!("reply {}-{}", index, k));
                        let _ = tx.send(Ok(reply));
                    }
                }
                index += 1;
            }
            closed.store(true, Ordering::SeqCst);
        });

        if let StreamMode::Flood(count) = self.stream_mode {
            let (ftx, frx) = mpsc::channel(FLOOD_BUFFER);
            let sent = self.inbound_sent.clone();
            tokio::spawn(async move {
                for i in 0..count {
                    let packet = StreamMessageResponse {
                        update: Some(stream_message_response::Update::Packet(PacketIn {
                            payload: vec![(i % 256) as u8],
                            ..Default::default()
                        })),
                    };
                    if ftx.send(Ok(packet)).await.is_err() {
                        break;
                    }
                    sent.fetch_add(1, Ordering::SeqCst);
                }
            });
            return Ok(ReceiverStream::new(frx).boxed());
        }

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<SetForwardingPipelineConfigResponse, Status> {
        self.pipeline_configs.lock().push(request);
        self.unary_result()?;
        Ok(SetForwardingPipelineConfigResponse {})
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResponse, Status> {
        self.writes.lock().push(request);
        self.unary_result()?;
        Ok(WriteResponse {})
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResponseStream, Status> {
        self.reads.lock().push(request.clone());
        self.unary_result()?;

        let mut responses = Vec::new();
        for entity in &request.entities {
            if let Some(filter) = entity.as_table_entry() {
                responses.extend(self.table_responses(filter));
            }
            if let Some(filter) = entity.as_counter_entry() {
                responses.extend(self.counter_responses(filter));
            }
        }

        let mut items: Vec<Result<ReadResponse, Status>> = responses.into_iter().map(Ok).collect();
        if let Some(limit) = self.read_error_after {
            items.truncate(limit);
            items.push(Err(Status::internal("read aborted by device")));
        }
        if self.read_stall {
            return Ok(stream::iter(items).chain(stream::pending()).boxed());
        }
        Ok(stream::iter(items).boxed())
    }
}
