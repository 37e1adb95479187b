// Wire type of the Noise handshake payload (`payload.proto`), kept in
// prost-derive form so no protoc run is needed at build time.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NoiseHandshakePayload {
    #[prost(bytes = "vec", tag = "1")]
    pub libp2p_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub noise_static_key_signature: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub libp2p_data: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub libp2p_data_signature: ::prost::alloc::vec::Vec<u8>,
}
