//! Loopback transport between the bridge and the engine.
//!
//! The bridge listens, the engine connects. Binding has to finish before the
//! engine is launched because the engine learns the port from its command
//! line. Exactly one peer is accepted; the listening socket is released as
//! soon as it connects.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::bridge::codec;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Listening endpoint the engine connects back to.
pub struct EngineListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl EngineListener {
    /// Bind an OS-assigned port on loopback.
    pub async fn bind() -> Result<Self, NetError> {
        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(bind_addr)
            .await
            .bind_context("127.0.0.1:0")?;
        let addr = listener.local_addr().bind_context("127.0.0.1:0")?;
        tracing::debug!(port = addr.port(), "engine listener bound");
        Ok(Self { listener, addr })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept the engine's connection and release the listening socket.
    ///
    /// An engine that does not connect within `timeout` is treated as
    /// unavailable.
    pub async fn accept(
        self,
        timeout: Duration,
    ) -> Result<(TransportReader, TransportWriter), NetError> {
        let (stream, peer) = tokio::time::timeout(timeout, self.listener.accept())
            .await
            .map_err(|_| {
                tracing::error!(port = self.addr.port(), "engine did not connect in time");
                NetError::EngineUnavailable
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "accepting engine connection failed");
                NetError::ConnectionFailed
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not disable Nagle on engine connection");
        }
        tracing::debug!(peer = %peer, "engine connected");

        let (read, write) = stream.into_split();
        Ok((TransportReader::new(read), TransportWriter::new(write)))
    }
}

/// Split any bidirectional stream into transport halves.
pub fn split_stream<S>(stream: S) -> (TransportReader, TransportWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read, write) = tokio::io::split(stream);
    (TransportReader::new(read), TransportWriter::new(write))
}

/// Receiving half. Owned by the dispatch loop alone.
pub struct TransportReader {
    inner: BoxedReader,
}

impl TransportReader {
    pub fn new<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self {
            inner: Box::new(reader),
        }
    }

    /// Suspend until exactly `n` bytes have arrived.
    pub async fn receive_exact(&mut self, n: usize) -> Result<Bytes, NetError> {
        let mut buf = vec![0u8; n];
        self.inner
            .read_exact(&mut buf)
            .await
            .transport_context("receive")?;
        Ok(Bytes::from(buf))
    }

    /// Next frame payload.
    pub async fn read_frame(&mut self) -> Result<Bytes, NetError> {
        codec::read_frame(&mut self.inner).await
    }
}

/// Frames waiting for the writer task.
const WRITE_QUEUE_DEPTH: usize = 256;

enum WriteCommand {
    Frame(Bytes, oneshot::Sender<Result<(), NetError>>),
    Shutdown(oneshot::Sender<Result<(), NetError>>),
}

/// Sending half. Clones share one connection.
///
/// The socket belongs to a single writer task; `send` only queues a whole
/// frame and waits for the task's acknowledgement. A caller that stops
/// waiting never leaves half a frame on the wire: a queued frame is written
/// in full regardless.
#[derive(Clone)]
pub struct TransportWriter {
    queue: mpsc::Sender<WriteCommand>,
}

impl TransportWriter {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        let (queue, commands) = mpsc::channel(WRITE_QUEUE_DEPTH);
        tokio::spawn(write_loop(Box::new(writer), commands));
        Self { queue }
    }

    /// Write `frame` in full and flush.
    pub async fn send(&self, frame: Bytes) -> Result<(), NetError> {
        let (ack, done) = oneshot::channel();
        self.submit(WriteCommand::Frame(frame, ack), done).await
    }

    /// Close the write direction once queued frames are written.
    pub async fn shutdown(&self) -> Result<(), NetError> {
        let (ack, done) = oneshot::channel();
        self.submit(WriteCommand::Shutdown(ack), done).await
    }

    async fn submit(
        &self,
        command: WriteCommand,
        done: oneshot::Receiver<Result<(), NetError>>,
    ) -> Result<(), NetError> {
        self.queue
            .send(command)
            .await
            .map_err(|_| NetError::TransportClosed)?;
        done.await.map_err(|_| NetError::TransportClosed)?
    }
}

/// Owns the write half. Ends on the first write error, on shutdown, or when
/// every `TransportWriter` is gone; later sends then fail with
/// `TransportClosed`.
async fn write_loop(mut writer: BoxedWriter, mut commands: mpsc::Receiver<WriteCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Frame(frame, ack) => {
                let result = write_whole(&mut writer, &frame).await;
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    break;
                }
            }
            WriteCommand::Shutdown(ack) => {
                let _ = ack.send(writer.shutdown().await.transport_context("shutdown"));
                break;
            }
        }
    }
    tracing::debug!("engine writer stopped");
}

async fn write_whole(writer: &mut BoxedWriter, frame: &[u8]) -> Result<(), NetError> {
    writer.write_all(frame).await.transport_context("send")?;
    writer.flush().await.transport_context("flush")
}
