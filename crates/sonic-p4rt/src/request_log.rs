//! P4Runtime request logging.
//!
//! [`RequestLogger`] sits between a session and its transport. Before each
//! unary call and each server-streaming read it appends a record to the
//! request log, then forwards the call untouched. The control stream is not
//! logged.
//!
//! Record format:
//!
//! ```text
//!
//! [2024-01-01 12:00:00.123] /p4.v1.P4Runtime/Write
//! ---
//! <request>
//! ---
//! ```
//!
//! Requests whose rendering exceeds [`MSG_LOG_MAX_LEN`] characters are
//! replaced by an omission notice carrying the byte length.
//!
//! Logging is best effort: a failed write is reported once through
//! `tracing` and never fails the call.

use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tonic::Status;
use tracing::warn;

use sonic_p4rt_proto::methods;
use sonic_p4rt_proto::v1::{
    ReadRequest, SetForwardingPipelineConfigRequest, SetForwardingPipelineConfigResponse,
    WriteRequest, WriteResponse,
};

use crate::error::P4rtResult;
use crate::transport::{InboundStream, OutboundStream, P4RuntimeTransport, ReadResponseStream};

/// Longest request rendering written in full.
pub const MSG_LOG_MAX_LEN: usize = 1024;

/// Append-only request log file.
#[derive(Debug)]
pub struct RequestLog {
    path: PathBuf,
    file: Mutex<File>,
    write_failures: AtomicUsize,
}

impl RequestLog {
    /// Creates the log, truncating any existing file.
    pub fn create(path: impl AsRef<Path>) -> P4rtResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        File::create(&path)?;
        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            write_failures: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records that could not be written.
    pub fn write_failures(&self) -> usize {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Appends a record for `request` sent on `method`.
    pub fn log_message<M: Debug>(&self, method: &str, request: &M) {
        self.log_rendered(method, &format!("{:#?}", request));
    }

    /// Appends a record for an already-rendered request body.
    pub fn log_rendered(&self, method: &str, body: &str) {
        let record = format_record(Utc::now(), method, body);
        let result = {
            let mut file = self.file.lock();
            file.write_all(record.as_bytes()).and_then(|()| file.flush())
        };

        if let Err(e) = result {
            if self.write_failures.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to write P4Runtime request log; further failures are not reported"
                );
            }
        }
    }
}

/// Formats one log record.
pub fn format_record(timestamp: DateTime<Utc>, method: &str, body: &str) -> String {
    let ts = timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
    let mut record = format!("\n[{}] {}\n---\n", ts, method);
    if body.chars().count() <= MSG_LOG_MAX_LEN {
        record.push_str(body);
        if !body.ends_with('\n') {
            record.push('\n');
        }
    } else {
        record.push_str(&format!(
            "Message too long ({} bytes)! Skipping log...\n",
            body.len()
        ));
    }
    record.push_str("---\n");
    record
}

/// Transport decorator that logs requests before forwarding them.
pub struct RequestLogger {
    inner: Arc<dyn P4RuntimeTransport>,
    log: RequestLog,
}

impl RequestLogger {
    /// Wraps `inner`, truncating the log file at `path`.
    pub fn new(inner: Arc<dyn P4RuntimeTransport>, path: impl AsRef<Path>) -> P4rtResult<Self> {
        Ok(Self {
            inner,
            log: RequestLog::create(path)?,
        })
    }

    pub fn log(&self) -> &RequestLog {
        &self.log
    }
}

#[async_trait]
impl P4RuntimeTransport for RequestLogger {
    async fn stream_channel(&self, outbound: OutboundStream) -> Result<InboundStream, Status> {
        self.inner.stream_channel(outbound).await
    }

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<SetForwardingPipelineConfigResponse, Status> {
        self.log
            .log_message(methods::SET_FORWARDING_PIPELINE_CONFIG, &request);
        self.inner.set_forwarding_pipeline_config(request).await
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResponse, Status> {
        self.log.log_message(methods::WRITE, &request);
        self.inner.write(request).await
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResponseStream, Status> {
        self.log.log_message(methods::READ, &request);
        self.inner.read(request).await
    }
}
