//! `p4.tmp` messages.
//!
//! BMv2 still expects its target configuration wrapped in the transitional
//! `P4DeviceConfig` envelope.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct P4DeviceConfig {
    #[prost(bool, tag = "1")]
    pub reassign: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub device_data: Vec<u8>,
}
