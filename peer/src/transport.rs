//! TCP transport: listening, outbound connects, the peer hello and discovery.
//!
//! Right after a stream opens both ends send one hello frame carrying their
//! [`PeerInfo`] and read the other side's, so every connection is keyed by a
//! stable [`PeerAddress`] rather than an ephemeral socket address.

use crate::error::NetError;
use crate::events::PeerInfo;
use log::{debug, info};
use shared::codec::{frame_bytes, read_len, LEN_SIZE};
use shared::PeerAddress;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Upper bound for the hello exchange on a freshly opened stream.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Hello frames are tiny; anything bigger is not a peer of ours.
const MAX_HELLO_LEN: usize = 4096;

pub async fn bind(address: &str) -> Result<TcpListener, NetError> {
    let listener = TcpListener::bind(address).await?;
    info!("Listening for players on {}", listener.local_addr()?);
    Ok(listener)
}

/// Sends our hello and reads the remote one.
pub async fn handshake<S>(stream: &mut S, local: &PeerInfo) -> Result<PeerInfo, NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        let hello = bincode::serialize(local).map_err(|e| NetError::Handshake(e.to_string()))?;
        stream.write_all(&frame_bytes(&hello)).await?;
        stream.flush().await?;

        let mut prefix = [0u8; LEN_SIZE];
        stream.read_exact(&mut prefix).await?;
        let len = read_len(prefix)?;
        if len > MAX_HELLO_LEN {
            return Err(NetError::Handshake(format!("hello of {} bytes", len)));
        }
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        let remote: PeerInfo =
            bincode::deserialize(&payload).map_err(|e| NetError::Handshake(e.to_string()))?;
        if remote.address.is_empty() {
            return Err(NetError::Handshake("peer sent an empty address".to_string()));
        }
        Ok::<PeerInfo, NetError>(remote)
    };

    match tokio::time::timeout(HANDSHAKE_TIMEOUT, exchange).await {
        Ok(Err(NetError::Io(e))) => Err(NetError::Handshake(e.to_string())),
        Ok(result) => result,
        Err(_) => Err(NetError::Handshake("timed out".to_string())),
    }
}

/// Waits for the next incoming stream. Only a failure of the listener
/// itself is reported here; the hello happens in [`greet`].
pub async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), NetError> {
    let (stream, addr) = listener.accept().await?;
    debug!("Incoming stream from {}", addr);
    Ok((stream, addr))
}

/// Completes the hello on a freshly opened stream.
pub async fn greet(
    mut stream: TcpStream,
    local: &PeerInfo,
) -> Result<(TcpStream, PeerInfo), NetError> {
    stream
        .set_nodelay(true)
        .map_err(|e| NetError::Handshake(e.to_string()))?;
    let remote = handshake(&mut stream, local).await?;
    Ok((stream, remote))
}

/// Opens a stream to `address` and completes the hello on it.
pub async fn connect(
    address: &PeerAddress,
    local: &PeerInfo,
) -> Result<(TcpStream, PeerInfo), NetError> {
    let stream = TcpStream::connect(address.as_str())
        .await
        .map_err(|source| NetError::ConnectFailed {
            address: address.to_string(),
            source,
        })?;
    greet(stream, local).await
}

/// Source of nearby peers.
///
/// `start` reports every peer it finds on `found` and ends by dropping the
/// sender, which tells the caller the search is over.
pub trait Discovery: Send + Sync {
    fn start(&self, found: mpsc::UnboundedSender<PeerInfo>) -> JoinHandle<()>;
}

/// Discovery over a fixed list of peers, reported one at a time.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    peers: Vec<PeerInfo>,
    delay: Duration,
}

impl StaticDiscovery {
    pub fn new(peers: Vec<PeerInfo>) -> Self {
        Self {
            peers,
            delay: Duration::from_millis(50),
        }
    }

    /// Pause between two reported peers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Discovery for StaticDiscovery {
    fn start(&self, found: mpsc::UnboundedSender<PeerInfo>) -> JoinHandle<()> {
        let peers = self.peers.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            for peer in peers {
                tokio::time::sleep(delay).await;
                if found.send(peer).is_err() {
                    break;
                }
            }
        })
    }
}
