//! P4Runtime v1 protocol definitions for SONiC.
//!
//! This crate carries the subset of the `p4.v1` schema that the P4RT session
//! layer populates, together with a client stub for the `p4.v1.P4Runtime`
//! service. The types mirror what `prost-build`/`tonic-build` emit for the
//! upstream `p4runtime.proto`, with identical field tags, so they interoperate
//! with any P4Runtime server (BMv2 `simple_switch_grpc`, Stratum, etc).
//!
//! The code is checked in rather than generated so the workspace builds
//! without `protoc`.
//!
//! # Modules
//!
//! - [`v1`]: Message types (`WriteRequest`, `ReadRequest`, `StreamMessageRequest`, ...)
//! - [`client`]: `P4RuntimeClient`, the gRPC stub
//! - [`rpc`]: `google.rpc.Status` as carried in arbitration updates
//! - [`tmp`]: `P4DeviceConfig`, the BMv2 device configuration envelope
//!
//! # Wire notes
//!
//! `ForwardingPipelineConfig.p4info` is modelled as raw bytes. A nested
//! message and a `bytes` field with the same tag share the length-delimited
//! wire encoding, so an already-encoded `p4.config.v1.P4Info` can be passed
//! through without this crate owning the P4Info schema.

#![allow(clippy::derive_partial_eq_without_eq)]

pub mod client;
pub mod rpc;
pub mod tmp;
pub mod v1;

pub use client::P4RuntimeClient;

/// Fully qualified gRPC service name.
pub const SERVICE_NAME: &str = "p4.v1.P4Runtime";

/// gRPC method paths, as seen by client-side observers.
pub mod methods {
    pub const WRITE: &str = "/p4.v1.P4Runtime/Write";
    pub const READ: &str = "/p4.v1.P4Runtime/Read";
    pub const SET_FORWARDING_PIPELINE_CONFIG: &str =
        "/p4.v1.P4Runtime/SetForwardingPipelineConfig";
    pub const STREAM_CHANNEL: &str = "/p4.v1.P4Runtime/StreamChannel";
}
