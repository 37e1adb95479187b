//! RPC framing: every RPC is a varint length-prefixed protobuf.

use crate::error::FloodsubError;
use crate::rpc_proto;
use meshlink_core::varint;
use meshlink_traits::{ReadEx, WriteEx};
use prost::Message;

/// An RPC larger than this is treated as a protocol violation.
pub(crate) const MAX_RPC_SIZE: u64 = 1 << 20;

pub async fn read_rpc<T: ReadEx + Unpin>(io: &mut T) -> Result<rpc_proto::Rpc, FloodsubError> {
    let len = varint::read_u64(io).await?;
    if len > MAX_RPC_SIZE {
        return Err(FloodsubError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("rpc of {} bytes", len),
        )));
    }
    let mut buf = vec![0u8; len as usize];
    io.read_exact2(&mut buf).await?;
    Ok(rpc_proto::Rpc::decode(&buf[..])?)
}

pub async fn write_rpc<T: WriteEx + Unpin>(
    io: &mut T,
    rpc: &rpc_proto::Rpc,
) -> Result<(), FloodsubError> {
    let mut buf = Vec::with_capacity(rpc.encoded_len());
    rpc.encode(&mut buf).expect("Vec<u8> provides capacity as needed");
    varint::write_u64(io, buf.len() as u64).await?;
    io.write_all2(&buf).await?;
    io.flush2().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::task;
    use meshlink_core::transport::memory::Channel;

    #[test]
    fn rpc_framing_round_trip() {
        task::block_on(async {
            let (mut a, mut b) = Channel::pair();
            let rpc = rpc_proto::Rpc {
                subscriptions: vec![rpc_proto::SubOpts {
                    subscribe: Some(true),
                    topic_id: Some("news".into()),
                }],
                publish: vec![rpc_proto::Message {
                    from: Some(vec![1, 2, 3]),
                    data: Some(b"payload".to_vec()),
                    seqno: Some(vec![0, 0, 0, 0, 0, 0, 0, 9]),
                    topic_ids: vec!["news".into()],
                }],
                control: None,
            };
            write_rpc(&mut a, &rpc).await.unwrap();
            let decoded = read_rpc(&mut b).await.unwrap();
            assert_eq!(decoded, rpc);
        });
    }
}
