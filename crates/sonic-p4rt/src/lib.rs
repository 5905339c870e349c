//! P4Runtime session management for SONiC.
//!
//! This crate manages the control-plane connection to a programmable
//! forwarding device over P4Runtime:
//!
//! - [`SwitchConnection`]: one session to one device (mastership arbitration,
//!   pipeline push, table writes, table and counter reads)
//! - [`OutboundQueue`]: the closable queue feeding the StreamChannel RPC
//! - [`RequestLogger`]: optional request log around every outbound call
//! - [`DeviceConfigBuilder`]: per device family pipeline blob construction
//! - [`SessionRegistry`]: live sessions and bulk shutdown
//!
//! # Architecture
//!
//! ```text
//!  caller ──▶ SwitchConnection ──▶ RequestLogger? ──▶ GrpcTransport ──▶ device
//!                │      ▲                                   │
//!                │      └──────── inbound stream ◀──────────┤ StreamChannel
//!                └──▶ OutboundQueue ─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sonic_p4rt::{
//!     Bmv2DeviceConfig, CallOptions, DeviceConfigParams, PipelineInfo, SessionConfig,
//!     SessionRegistry, SwitchConnection,
//! };
//!
//! let registry = SessionRegistry::new();
//! let config = SessionConfig::new("127.0.0.1:50051", 0)
//!     .with_name("s1")
//!     .with_proto_dump_file("logs/s1-p4runtime-requests.txt");
//! let s1 = SwitchConnection::open(config, Arc::new(Bmv2DeviceConfig), &registry)?;
//!
//! s1.master_arbitration_update(&CallOptions::new()).await?;
//! let p4info = PipelineInfo::from_file("build/basic.p4info.bin")?;
//! let params = DeviceConfigParams::new().with("bmv2_json", "build/basic.json");
//! s1.set_forwarding_pipeline_config(&p4info, &params, &CallOptions::new()).await?;
//! s1.set_pipeline_info(p4info);
//!
//! registry.shutdown_all();
//! ```

pub mod call;
pub mod config;
pub mod device_config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod request_log;
pub mod session;
pub mod transport;

pub use call::{CallOptions, Outcome, RenderedRequest, RequestBody};
pub use config::{ElectionId, SessionConfig, TlsSettings};
pub use device_config::{
    Bmv2DeviceConfig, ConfigBuildError, DeviceConfigBuilder, DeviceConfigParams,
    PassthroughDeviceConfig,
};
pub use error::{P4rtError, P4rtResult};
pub use queue::OutboundQueue;
pub use registry::{ManagedSession, SessionRegistry, ShutdownReport};
pub use request_log::{RequestLog, RequestLogger, MSG_LOG_MAX_LEN};
pub use session::{is_primary, PipelineInfo, ReadStream, SwitchConnection, WILDCARD_ID};
pub use transport::{GrpcTransport, P4RuntimeTransport};

// Re-export the protocol crate for callers building table entries.
pub use sonic_p4rt_proto as proto;
