//! One established stream to a remote peer.
//!
//! A [`PeerConnection`] owns a read task that turns the stream into frames on
//! the shared inbound queue, and the write half used by the coordinator. When
//! the read task fails it reports the peer's address on the `lost` channel
//! and exits; it never calls back into the coordinator itself.

use crate::error::NetError;
use crate::events::PeerInfo;
use log::{debug, trace, warn};
use shared::codec::{read_len, LEN_SIZE};
use shared::{ByteBufferPool, PeerAddress};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Raw payload read from a peer, waiting for the dispatch worker.
#[derive(Debug)]
pub struct InboundFrame {
    pub from: PeerAddress,
    /// Leased from the buffer pool; the consumer recycles it.
    pub payload: Vec<u8>,
}

/// Reads one frame and returns its payload in a pooled buffer.
///
/// Short reads are retried until the declared size is reached; end of stream
/// before that is a lost connection.
pub async fn read_frame<R>(reader: &mut R, pool: &ByteBufferPool) -> Result<Vec<u8>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_SIZE];
    reader.read_exact(&mut prefix).await.map_err(lost)?;
    let len = read_len(prefix)?;

    let mut payload = pool.get(len);
    if let Err(e) = reader.read_exact(&mut payload).await {
        pool.recycle(payload);
        return Err(lost(e));
    }
    Ok(payload)
}

fn lost(e: std::io::Error) -> NetError {
    match e.kind() {
        ErrorKind::UnexpectedEof => NetError::ConnectionLost("stream closed".to_string()),
        _ => NetError::ConnectionLost(e.to_string()),
    }
}

pub struct PeerConnection {
    info: PeerInfo,
    writer: Mutex<Option<Writer>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl PeerConnection {
    /// Wraps `stream` and starts its read task.
    pub fn spawn<S>(
        stream: S,
        info: PeerInfo,
        inbound: mpsc::UnboundedSender<InboundFrame>,
        lost_tx: mpsc::UnboundedSender<PeerAddress>,
        pool: Arc<ByteBufferPool>,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut read_half, write_half) = tokio::io::split(stream);
        let closed = Arc::new(AtomicBool::new(false));

        let reader = {
            let from = info.address.clone();
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                loop {
                    match read_frame(&mut read_half, &pool).await {
                        Ok(payload) => {
                            trace!("Frame of {} bytes from {}", payload.len(), from);
                            let frame = InboundFrame {
                                from: from.clone(),
                                payload,
                            };
                            if let Err(e) = inbound.send(frame) {
                                debug!("Inbound queue closed, stopping reader for {}", from);
                                pool.recycle(e.0.payload);
                                break;
                            }
                        }
                        Err(e) => {
                            if !closed.load(Ordering::Acquire) {
                                warn!("Read from {} failed: {}", from, e);
                                let _ = lost_tx.send(from.clone());
                            }
                            break;
                        }
                    }
                }
            })
        };

        Arc::new(Self {
            info,
            writer: Mutex::new(Some(Box::new(write_half))),
            reader: std::sync::Mutex::new(Some(reader)),
            closed,
        })
    }

    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub fn address(&self) -> &PeerAddress {
        &self.info.address
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes one complete frame.
    pub async fn write(&self, frame: &[u8]) -> Result<(), NetError> {
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(NetError::ConnectionLost(format!(
                "connection to {} is closed",
                self.info.address
            )));
        };
        stream.write_all(frame).await.map_err(lost)?;
        stream.flush().await.map_err(lost)?;
        Ok(())
    }

    /// Stops the read task and shuts the stream down. Safe to call repeatedly.
    pub async fn cancel(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing connection to {}", self.info.address);
        if let Some(reader) = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            reader.abort();
        }
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish()
    }
}
