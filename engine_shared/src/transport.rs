//! Transport endpoint.
//!
//! Binds one reliable-stream listener and one datagram socket on the same
//! port (server), or opens one outgoing stream plus one datagram socket
//! "connected" to the server so the kernel filters foreign senders (client).
//!
//! I/O threads/tasks only decode and enqueue; they never mutate game state.

use std::net::SocketAddr;

use anyhow::Context;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream, UdpSocket,
    },
};
use tracing::warn;

use crate::wire::{self, CodecError, NetMsg, MAX_DATAGRAM_RECV};

/// Resource/lifecycle errors surfaced from the transport layer. Never raised
/// into game code; callers log and drop per spec §7.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Sends one message as a length-prefixed frame. Refuses oversized frames
    /// before writing anything to the socket.
    pub async fn send(&mut self, msg: &NetMsg) -> Result<(), TransportError> {
        let payload = wire::encode(msg)?;
        let framed = wire::frame_reliable(&payload)?;
        self.stream.write_all(&framed).await?;
        Ok(())
    }

    /// Reads exactly one length-prefixed frame and decodes it.
    pub async fn recv(&mut self) -> Result<NetMsg, TransportError> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await?;
        let len = wire::validate_frame_len(u32::from_be_bytes(len_buf))?;

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(wire::decode(&payload)?)
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independent read/write halves so a dedicated inbound
    /// pipeline task can own the reader while the game thread owns the
    /// writer, per spec §4.B.
    pub fn into_split(self) -> (ReliableReader, ReliableWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (ReliableReader { read_half }, ReliableWriter { write_half })
    }
}

/// Read half of a split reliable connection. Owned by the per-connection
/// inbound pipeline task: decode frame, deliver variant, nothing else.
#[derive(Debug)]
pub struct ReliableReader {
    read_half: OwnedReadHalf,
}

impl ReliableReader {
    /// Reads exactly one length-prefixed frame and decodes it.
    pub async fn recv(&mut self) -> Result<NetMsg, TransportError> {
        let mut len_buf = [0u8; 4];
        self.read_half.read_exact(&mut len_buf).await?;
        let len = wire::validate_frame_len(u32::from_be_bytes(len_buf))?;

        let mut payload = vec![0u8; len];
        self.read_half.read_exact(&mut payload).await?;
        Ok(wire::decode(&payload)?)
    }
}

/// Write half of a split reliable connection. Owned by the game thread; all
/// sends happen from dispatch/tick code, never from the inbound pipeline.
#[derive(Debug)]
pub struct ReliableWriter {
    write_half: OwnedWriteHalf,
}

impl ReliableWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> Result<(), TransportError> {
        let payload = wire::encode(msg)?;
        let framed = wire::frame_reliable(&payload)?;
        self.write_half.write_all(&framed).await?;
        Ok(())
    }

    /// Closes the write half, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.write_half.shutdown().await?;
        Ok(())
    }
}

/// Unreliable channel over UDP. On the client this is "connected" to the
/// server address so the kernel filters foreign senders; on the server it is
/// a plain bound socket addressed per-send.
#[derive(Debug)]
pub struct UnreliableConn {
    socket: UdpSocket,
}

impl UnreliableConn {
    pub async fn bind(bind_addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.context("udp bind")?;
        Ok(Self { socket })
    }

    /// Binds an ephemeral socket and logically connects it to `peer`.
    pub async fn connect(bind_addr: SocketAddr, peer: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.context("udp bind")?;
        socket.connect(peer).await.context("udp connect")?;
        Ok(Self { socket })
    }

    /// Sends to the connected peer. Drops oversized payloads with a warning
    /// rather than raising, per spec §4.B.
    pub async fn send(&self, msg: &NetMsg) -> Result<(), TransportError> {
        let payload = wire::encode(msg)?;
        if let Err(e) = wire::validate_datagram_send(&payload) {
            warn!(error = %e, "dropping oversized outbound datagram");
            return Ok(());
        }
        self.socket.send(&payload).await?;
        Ok(())
    }

    /// Sends to an explicit address (server fan-out / per-client reply).
    pub async fn send_to(&self, msg: &NetMsg, addr: SocketAddr) -> Result<(), TransportError> {
        let payload = wire::encode(msg)?;
        if let Err(e) = wire::validate_datagram_send(&payload) {
            warn!(error = %e, %addr, "dropping oversized outbound datagram");
            return Ok(());
        }
        self.socket.send_to(&payload, addr).await?;
        Ok(())
    }

    /// Receives one datagram and decodes it. Returns `Ok(None)` if the
    /// received size is nonsensical for a decoded payload (can't happen for
    /// in-domain payloads, but guards against platform-level oddities rather
    /// than panicking on a zero-length read).
    pub async fn recv(&self) -> Result<(NetMsg, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_RECV];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        Ok((wire::decode(&buf[..n])?, from))
    }

    /// Non-blocking receive attempt; returns `Ok(None)` when nothing is
    /// pending. Used by the server's per-tick drain and the client's poll.
    pub fn try_recv(&self) -> Result<Option<(NetMsg, SocketAddr)>, TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_RECV];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, from)) => Ok(Some((wire::decode(&buf[..n])?, from))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
