// Wire types of the SECIO handshake (`secio.proto`), kept in prost-derive
// form so no protoc run is needed at build time.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Propose {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub rand: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub pubkey: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub exchanges: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "4")]
    pub ciphers: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "5")]
    pub hashes: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Exchange {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub epubkey: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub signature: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}
