//! Outbound connections to other nodes
//!
//! [`PeerClient`] issues unary calls over one connection. Opening a gossip
//! stream consumes the client and turns the connection into a
//! [`GossipStream`].

use crate::core::{Block, Network, Transaction};
use crate::network::message::{
    BlockRequest, BlockResponse, Frame, GossipItem, PartialChainRequest, PartialChainResponse,
    PeerType, Request, Response, RpcError, UtxoRequest, UtxoResponse, WelcomeRequest,
    WelcomeResponse,
};
use crate::network::peer::PeerError;
use crate::network::server::{connect_to_peer, FrameCodec};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Client-side errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Remote error: {0}")]
    Remote(#[from] RpcError),
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(&'static str),
    #[error("Connection closed by peer")]
    Closed,
}

/// Request/response connection to one peer
pub struct PeerClient {
    framed: Framed<TcpStream, FrameCodec>,
    addr: SocketAddr,
}

impl PeerClient {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let (stream, addr) = connect_to_peer(addr).await?;
        log::debug!("Connected to {}", addr);

        Ok(Self {
            framed: Framed::new(stream, FrameCodec),
            addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn call(&mut self, request: Request) -> Result<Response, ClientError> {
        self.framed.send(Frame::Request(request)).await?;

        match self.framed.next().await {
            Some(Ok(Frame::Response(response))) => Ok(response),
            Some(Ok(Frame::Error(e))) => Err(ClientError::Remote(e)),
            Some(Ok(other)) => Err(ClientError::UnexpectedReply(other.type_name())),
            Some(Err(e)) => Err(ClientError::IoError(e)),
            None => Err(ClientError::Closed),
        }
    }

    pub async fn welcome(&mut self, peer_type: PeerType) -> Result<WelcomeResponse, ClientError> {
        match self.call(Request::Welcome(WelcomeRequest { peer_type })).await? {
            Response::Welcome(welcome) => Ok(welcome),
            _ => Err(ClientError::UnexpectedReply("Response")),
        }
    }

    pub async fn get_block(
        &mut self,
        network: Network,
        hash: &str,
    ) -> Result<BlockResponse, ClientError> {
        let request = Request::GetBlock(BlockRequest {
            network,
            hash: hash.to_string(),
        });
        match self.call(request).await? {
            Response::Block(block) => Ok(block),
            _ => Err(ClientError::UnexpectedReply("Response")),
        }
    }

    pub async fn get_partial_chain(
        &mut self,
        network: Network,
        start_index: u64,
        end_index: u64,
    ) -> Result<PartialChainResponse, ClientError> {
        let request = Request::GetPartialChain(PartialChainRequest {
            network,
            start_index,
            end_index,
        });
        match self.call(request).await? {
            Response::PartialChain(chain) => Ok(chain),
            _ => Err(ClientError::UnexpectedReply("Response")),
        }
    }

    pub async fn get_utxos(
        &mut self,
        network: Network,
        address: &str,
    ) -> Result<UtxoResponse, ClientError> {
        let request = Request::GetUtxos(UtxoRequest {
            network,
            address: address.to_string(),
        });
        match self.call(request).await? {
            Response::Utxos(utxos) => Ok(utxos),
            _ => Err(ClientError::UnexpectedReply("Response")),
        }
    }

    pub async fn open_transaction_stream(self) -> Result<GossipStream<Transaction>, ClientError> {
        self.open_stream(Frame::OpenTransactionStream).await
    }

    pub async fn open_block_stream(self) -> Result<GossipStream<Block>, ClientError> {
        self.open_stream(Frame::OpenBlockStream).await
    }

    async fn open_stream<T: GossipItem>(
        mut self,
        open: Frame,
    ) -> Result<GossipStream<T>, ClientError> {
        self.framed.send(open).await?;
        log::debug!("Opened {} stream to {}", T::CHANNEL, self.addr);

        Ok(GossipStream {
            framed: self.framed,
            addr: self.addr,
            _item: PhantomData,
        })
    }
}

/// Client end of a gossip stream
pub struct GossipStream<T> {
    framed: Framed<TcpStream, FrameCodec>,
    addr: SocketAddr,
    _item: PhantomData<fn() -> T>,
}

impl<T: GossipItem> GossipStream<T> {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn send(&mut self, item: T) -> Result<(), ClientError> {
        self.framed.send(item.into_frame()).await?;
        Ok(())
    }

    /// Next gossip item from the peer, `None` once it has closed the stream
    pub async fn next(&mut self) -> Option<Result<T, ClientError>> {
        match self.framed.next().await? {
            Ok(frame) => Some(
                T::from_frame(frame)
                    .map_err(|other| ClientError::UnexpectedReply(other.type_name())),
            ),
            Err(e) => Some(Err(ClientError::IoError(e))),
        }
    }

    /// Stop sending; items already in flight can still be read
    pub async fn close(&mut self) -> Result<(), ClientError> {
        SinkExt::<Frame>::close(&mut self.framed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ledger, LedgerError, TransactionBuilder, Utxo};
    use crate::crypto::KeyPair;
    use crate::mining::{Miner, ProofOfWorkMiner};
    use crate::network::message::MAX_FRAME_SIZE;
    use crate::network::peer::PeerRegistry;
    use crate::network::server::Server;
    use crate::network::service::tests::{chain_of, service_with};
    use crate::network::service::{ChainSet, NodeService};
    use crate::wallet::Wallet;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Read-only ledger of blocks stuffed with reward transactions
    struct BulkyLedger {
        blocks: Vec<Block>,
    }

    impl BulkyLedger {
        fn new(length: u64, transactions_per_block: usize) -> Self {
            let mut blocks: Vec<Block> = Vec::new();
            for index in 0..length {
                let previous = blocks
                    .last()
                    .map(|b| b.hash.clone())
                    .unwrap_or_else(|| "00".repeat(32));
                let reward = Transaction::reward(
                    Network::Test,
                    &Network::Test.charity_address(),
                    50,
                    index,
                );
                let transactions = vec![reward; transactions_per_block];
                blocks.push(Block::new(Network::Test, index, previous, transactions, 0));
            }
            Self { blocks }
        }
    }

    impl Ledger for BulkyLedger {
        fn network(&self) -> Network {
            Network::Test
        }

        fn latest_block(&self) -> Block {
            self.blocks[self.blocks.len() - 1].clone()
        }

        fn block(&self, hash: &str) -> Option<Block> {
            self.blocks.iter().find(|b| b.hash == hash).cloned()
        }

        fn length(&self) -> u64 {
            self.blocks.len() as u64
        }

        fn difficulty(&self) -> u32 {
            0
        }

        fn reward(&self) -> u64 {
            50
        }

        fn utxos_for_address(&self, _address: &str) -> Result<Vec<Utxo>, LedgerError> {
            Ok(Vec::new())
        }

        fn append_block(&self, _candidate: Block) -> bool {
            false
        }
    }

    async fn start(service: NodeService) -> String {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr().to_string();
        tokio::spawn(server.serve(service));
        addr
    }

    async fn wait_for_peers<T: GossipItem>(registry: &PeerRegistry<T>, expected: usize) {
        for _ in 0..200 {
            if registry.len().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} registry never reached {} peers", T::CHANNEL, expected);
    }

    #[tokio::test]
    async fn test_unary_calls_over_tcp() {
        let chain = chain_of(6);
        let addr = start(service_with(chain.clone())).await;
        let mut client = PeerClient::connect(&addr).await.unwrap();

        let welcome = client.welcome(PeerType::Wallet).await.unwrap();
        assert_eq!(welcome.welcomes[0].latest_block, chain.latest_block());

        let partial = client.get_partial_chain(Network::Test, 2, 4).await.unwrap();
        let indices: Vec<u64> = partial.blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);

        match client.get_partial_chain(Network::Test, 0, 6).await {
            Err(ClientError::Remote(RpcError::InvalidArgument(_))) => {}
            other => panic!("expected range error, got {:?}", other.map(|r| r.blocks.len())),
        }

        let latest = chain.latest_block();
        let found = client.get_block(Network::Test, &latest.hash).await.unwrap();
        assert_eq!(found.block, latest);
        assert!(matches!(
            client.get_block(Network::Test, "missing").await,
            Err(ClientError::Remote(RpcError::NotFound(_)))
        ));

        // errors do not end the connection
        let utxos = client
            .get_utxos(Network::Test, &Network::Test.charity_address())
            .await
            .unwrap();
        assert_eq!(utxos.utxos.len(), 6);
    }

    #[tokio::test]
    async fn test_block_gossip_over_tcp() {
        let chain = chain_of(2);
        let service = service_with(chain.clone());
        let addr = start(service.clone()).await;

        let mut sender = PeerClient::connect(&addr)
            .await
            .unwrap()
            .open_block_stream()
            .await
            .unwrap();
        let mut listener = PeerClient::connect(&addr)
            .await
            .unwrap()
            .open_block_stream()
            .await
            .unwrap();
        wait_for_peers(service.block_peers(), 2).await;

        let latest = chain.latest_block();
        let reward = crate::core::Transaction::reward(
            Network::Test,
            &Network::Test.charity_address(),
            chain.reward(),
            latest.index + 1,
        );
        let block = ProofOfWorkMiner.find_block(
            Network::Test,
            latest.index + 1,
            &latest.hash,
            vec![reward],
            chain.difficulty(),
        );

        sender.send(block.clone()).await.unwrap();

        assert_eq!(listener.next().await.unwrap().unwrap(), block);
        assert_eq!(sender.next().await.unwrap().unwrap(), block);
        assert_eq!(chain.length(), 3);

        sender.close().await.unwrap();
        assert!(sender.next().await.is_none());
        wait_for_peers(service.block_peers(), 1).await;

        drop(listener);
        wait_for_peers(service.block_peers(), 0).await;
    }

    #[tokio::test]
    async fn test_transaction_gossip_echoes_to_sender() {
        let chain = chain_of(1);
        let service = service_with(chain.clone());
        let addr = start(service.clone()).await;

        let kp = KeyPair::generate();
        let utxo = crate::core::Utxo {
            tx_id: "ab".repeat(32),
            output_index: 0,
            output: crate::core::TransactionOutput {
                amount: 10,
                recipient: kp.address(Network::Test.address_version()),
            },
        };
        let tx = TransactionBuilder::new(Network::Test)
            .add_input(&utxo)
            .add_output(&Network::Test.charity_address(), 10)
            .build_and_sign(&kp)
            .unwrap();

        let mut stream = PeerClient::connect(&addr)
            .await
            .unwrap()
            .open_transaction_stream()
            .await
            .unwrap();
        stream.send(tx.clone()).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), tx);

        stream.close().await.unwrap();
        assert!(stream.next().await.is_none());
        wait_for_peers(service.transaction_peers(), 0).await;
        // spends an unknown output, so the mined block was refused
        assert_eq!(chain.length(), 1);
    }

    #[tokio::test]
    async fn test_oversize_reply_is_an_error_and_connection_survives() {
        let ledger = Arc::new(BulkyLedger::new(6, 6000));
        let tip = ledger.latest_block();
        let mut chains: ChainSet = BTreeMap::new();
        chains.insert(Network::Test, ledger);
        let service = NodeService::new(
            chains,
            Arc::new(ProofOfWorkMiner),
            Arc::new(Wallet::empty()),
        );
        let addr = start(service).await;
        let mut client = PeerClient::connect(&addr).await.unwrap();

        match client.get_partial_chain(Network::Test, 0, 5).await {
            Err(ClientError::Remote(RpcError::InvalidArgument(message))) => {
                assert!(message.contains(&MAX_FRAME_SIZE.to_string()))
            }
            other => panic!("expected size error, got {:?}", other.map(|r| r.blocks.len())),
        }

        // a range that fits is still served on the same connection
        let one = client.get_partial_chain(Network::Test, 5, 5).await.unwrap();
        assert_eq!(one.blocks, vec![tip.clone()]);
        let welcome = client.welcome(PeerType::Node).await.unwrap();
        assert_eq!(welcome.welcomes[0].latest_block, tip);
    }
}
