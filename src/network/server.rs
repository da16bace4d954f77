//! TCP server and connection handling
//!
//! A connection answers unary requests in order until the peer opens a
//! gossip stream. From then on it carries that stream until either side
//! goes away.

use crate::network::gossip::GossipHandler;
use crate::network::message::{Frame, GossipItem, Request, RpcError, MAGIC, MAX_FRAME_SIZE};
use crate::network::peer::PeerError;
use crate::network::service::NodeService;
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

const HEADER_LEN: usize = 8;

/// Length-prefixed JSON framing: magic, big-endian length, payload
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item.to_bytes().map_err(|e| invalid_data(e.to_string()))?;
        if data.len() > MAX_FRAME_SIZE {
            return Err(invalid_data(format!(
                "{} frame of {} bytes exceeds limit",
                item.type_name(),
                data.len()
            )));
        }

        dst.reserve(HEADER_LEN + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);

        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(invalid_data("Invalid magic bytes"));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(invalid_data(format!("Frame of {} bytes exceeds limit", len)));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let data = src.split_to(len);

        let frame = Frame::from_bytes(&data).map_err(|e| invalid_data(e.to_string()))?;
        Ok(Some(frame))
    }
}

type FrameWriter = SplitSink<Framed<TcpStream, FrameCodec>, Frame>;
type FrameReader = SplitStream<Framed<TcpStream, FrameCodec>>;

/// TCP server for accepting peer connections
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Server listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever, one task per connection
    pub async fn serve(self, service: NodeService) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    log::info!("Incoming connection from {}", addr);

                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, service).await {
                            log::warn!("Connection error with {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Connect to a peer
pub async fn connect_to_peer(addr: &str) -> Result<(TcpStream, SocketAddr), PeerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(format!("{}: {}", addr, e)))?;

    let peer_addr = stream
        .peer_addr()
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

    Ok((stream, peer_addr))
}

/// Serve one inbound connection
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    service: NodeService,
) -> Result<(), PeerError> {
    let (mut writer, mut reader) = Framed::new(stream, FrameCodec).split();

    loop {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(PeerError::IoError(e)),
            None => {
                log::debug!("Peer {} disconnected", addr);
                return Ok(());
            }
        };

        match frame {
            Frame::Request(request) => {
                let worker = service.clone();
                let reply = tokio::task::spawn_blocking(move || reply_for(&worker, request))
                    .await
                    .unwrap_or_else(|e| Frame::Error(RpcError::Internal(e.to_string())));
                if let Frame::Error(e) = &reply {
                    log::debug!("Request from {} failed: {}", addr, e);
                }
                writer.send(reply).await?;
            }
            Frame::OpenTransactionStream => {
                let (tx, rx) = mpsc::channel(service.peer_queue());
                let handler = service.stream_transactions(Some(addr), tx).await;
                return drive_stream(handler, reader, writer, rx, addr).await;
            }
            Frame::OpenBlockStream => {
                let (tx, rx) = mpsc::channel(service.peer_queue());
                let handler = service.stream_blocks(Some(addr), tx).await;
                return drive_stream(handler, reader, writer, rx, addr).await;
            }
            other => return Err(PeerError::UnexpectedFrame(other.type_name())),
        }
    }
}

/// Answer one unary request with a frame that fits on the wire
///
/// A response too large for one frame becomes an error so the caller
/// can ask for less without losing the connection.
fn reply_for(service: &NodeService, request: Request) -> Frame {
    let reply = match service.handle(request) {
        Ok(response) => Frame::Response(response),
        Err(e) => return Frame::Error(e),
    };

    match reply.to_bytes() {
        Ok(data) if data.len() <= MAX_FRAME_SIZE => reply,
        Ok(data) => Frame::Error(RpcError::InvalidArgument(format!(
            "reply of {} bytes exceeds the frame limit of {} bytes",
            data.len(),
            MAX_FRAME_SIZE
        ))),
        Err(e) => Frame::Error(RpcError::Internal(e.to_string())),
    }
}

/// Pump one gossip stream until the peer leaves
///
/// Inbound frames go to the handler one at a time. Outbound gossip is
/// drained from the peer's queue by a separate writer task so a slow
/// socket never holds up the handler.
async fn drive_stream<H: GossipHandler>(
    mut handler: H,
    mut reader: FrameReader,
    mut writer: FrameWriter,
    mut outbound: mpsc::Receiver<H::Item>,
    addr: SocketAddr,
) -> Result<(), PeerError> {
    let channel = <H::Item as GossipItem>::CHANNEL;
    log::info!("{} opened the {} stream", addr, channel);

    let write_handle = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            if writer.send(item.into_frame()).await.is_err() {
                break;
            }
        }
        let _ = writer.close().await;
    });

    let result = loop {
        let fault = match reader.next().await {
            Some(Ok(frame)) => match <H::Item as GossipItem>::from_frame(frame) {
                Ok(item) => {
                    let outcome = handler.on_message(item).await;
                    log::debug!("{} from {}: {:?}", channel, addr, outcome);
                    continue;
                }
                Err(other) => PeerError::UnexpectedFrame(other.type_name()),
            },
            Some(Err(e)) => PeerError::IoError(e),
            None => {
                handler.on_close().await;
                break Ok(());
            }
        };

        handler.on_error(&fault).await;
        break Err(fault);
    };

    log::info!("{} left the {} stream", addr, channel);
    drop(handler);

    match result {
        // registry entry is gone, so the writer drains what is queued and exits
        Ok(()) => {
            let _ = write_handle.await;
        }
        Err(_) => write_handle.abort(),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, Ledger, Network};
    use crate::network::message::{BlockRequest, PartialChainRequest, Response};
    use crate::network::service::tests::{chain_of, service_with};

    #[test]
    fn test_frame_codec() {
        let mut codec = FrameCodec;
        let frame = Frame::Request(Request::GetBlock(BlockRequest {
            network: Network::Test,
            hash: "ab".repeat(32),
        }));

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..4], &MAGIC);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut codec = FrameCodec;
        let mut full = BytesMut::new();
        codec
            .encode(Frame::Block(Block::genesis(Network::Main)), &mut full)
            .unwrap();

        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[full.len() - 1..]);
        assert!(matches!(codec.decode(&mut buf).unwrap(), Some(Frame::Block(_))));
    }

    #[test]
    fn test_bad_magic_and_oversize() {
        let mut codec = FrameCodec;

        let mut bad_magic = BytesMut::from(&b"XXXX\x00\x00\x00\x02{}"[..]);
        assert!(codec.decode(&mut bad_magic).is_err());

        let mut oversize = BytesMut::new();
        oversize.put_slice(&MAGIC);
        oversize.put_u32(MAX_FRAME_SIZE as u32 + 1);
        assert!(codec.decode(&mut oversize).is_err());
    }

    #[test]
    fn test_reply_for_passes_through_results() {
        let chain = chain_of(3);
        let service = service_with(chain.clone());

        let reply = reply_for(
            &service,
            Request::GetBlock(BlockRequest {
                network: Network::Test,
                hash: chain.latest_block().hash,
            }),
        );
        match reply {
            Frame::Response(Response::Block(found)) => {
                assert_eq!(found.block, chain.latest_block())
            }
            other => panic!("Wrong frame: {:?}", other),
        }

        let reply = reply_for(
            &service,
            Request::GetPartialChain(PartialChainRequest {
                network: Network::Test,
                start_index: 0,
                end_index: 3,
            }),
        );
        assert!(matches!(reply, Frame::Error(RpcError::InvalidArgument(_))));
    }
}
