//! `google.rpc` types referenced by P4Runtime.

/// `google.rpc.Status`, without the `details` field.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// `google.rpc.Code::OK`.
pub const CODE_OK: i32 = 0;
