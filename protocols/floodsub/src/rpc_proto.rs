// Wire types of the pubsub RPC (`rpc.proto`), kept in prost-derive form so
// no protoc run is needed at build time.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rpc {
    #[prost(message, repeated, tag = "1")]
    pub subscriptions: ::prost::alloc::vec::Vec<SubOpts>,
    #[prost(message, repeated, tag = "2")]
    pub publish: ::prost::alloc::vec::Vec<Message>,
    #[prost(message, optional, tag = "3")]
    pub control: ::core::option::Option<ControlMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubOpts {
    /// Whether to subscribe (true) or unsubscribe (false).
    #[prost(bool, optional, tag = "1")]
    pub subscribe: ::core::option::Option<bool>,
    #[prost(string, optional, tag = "2")]
    pub topic_id: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub from: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub seqno: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(string, repeated, tag = "4")]
    pub topic_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Present for wire compatibility with gossip-capable routers; the flood
/// router never acts on it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControlMessage {}
