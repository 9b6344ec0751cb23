//! 전송 계층 추상화
//!
//! 프로토콜 엔진은 "한 번의 수신 = 하나의 유닛"만 가정한다.
//! - TcpTransport: 실제 TCP 연결
//! - MemoryTransport: 같은 프로세스 안의 채널 쌍 (테스트, 시뮬레이션)

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// 유닛 단위 송수신 인터페이스
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// 유닛 하나 전송
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// 유닛 하나 수신 (최대 `max_len` 바이트)
    ///
    /// 스트림 전송에서는 연달아 보낸 유닛이 한 번에 올 수 있다.
    ///
    /// 상대가 연결을 닫으면 `Error::TransportClosed`.
    async fn recv(&mut self, max_len: usize) -> Result<Bytes>;
}

/// TCP 스트림 전송
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Result<Self> {
        // 작은 ACK/컨트롤 프레임이 지연 없이 나가도록
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Self { stream, peer })
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// 쓰기 방향 종료 (flush 포함)
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(Error::from_transport)
    }
}

impl Transport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(Error::from_transport)
    }

    async fn recv(&mut self, max_len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_len);
        let n = self
            .stream
            .read(&mut buf)
            .await
            .map_err(Error::from_transport)?;
        if n == 0 {
            return Err(Error::TransportClosed);
        }
        buf.truncate(n);
        Ok(buf.freeze())
    }
}

/// 인메모리 전송 (양방향 채널 쌍)
///
/// `max_len`보다 큰 유닛은 잘라서 주고 나머지는 다음 수신으로 남긴다.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    pending: Option<Bytes>,
}

impl MemoryTransport {
    /// 서로 연결된 두 끝점 생성
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Self {
            tx: a_tx,
            rx: a_rx,
            pending: None,
        };
        let b = Self {
            tx: b_tx,
            rx: b_rx,
            pending: None,
        };
        (a, b)
    }
}

impl Transport for MemoryTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| Error::TransportClosed)
    }

    async fn recv(&mut self, max_len: usize) -> Result<Bytes> {
        let mut unit = match self.pending.take() {
            Some(unit) => unit,
            None => self.rx.recv().await.ok_or(Error::TransportClosed)?,
        };
        if unit.len() > max_len {
            let head = unit.split_to(max_len);
            self.pending = Some(unit);
            return Ok(head);
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_memory_pair_roundtrip() {
        let (mut a, mut b) = MemoryTransport::pair();

        a.send(b"hello").await.unwrap();
        b.send(b"ACK").await.unwrap();

        assert_eq!(b.recv(1024).await.unwrap().as_ref(), b"hello");
        assert_eq!(a.recv(1024).await.unwrap().as_ref(), b"ACK");
    }

    #[tokio::test]
    async fn test_memory_split_oversized_unit() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(b".mp3    DATAFRAME").await.unwrap();

        assert_eq!(b.recv(8).await.unwrap().as_ref(), b".mp3    ");
        assert_eq!(b.recv(1024).await.unwrap().as_ref(), b"DATAFRAME");
    }

    #[tokio::test]
    async fn test_memory_closed() {
        let (mut a, b) = MemoryTransport::pair();
        drop(b);

        assert!(matches!(a.send(b"x").await, Err(Error::TransportClosed)));
        assert!(matches!(a.recv(16).await, Err(Error::TransportClosed)));
    }

    #[tokio::test]
    async fn test_tcp_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = TcpTransport::new(stream).unwrap();

            let unit = transport.recv(64).await.unwrap();
            transport.send(b"ACK: CRC32 valid").await.unwrap();

            // 클라이언트 종료 후
            assert!(matches!(transport.recv(64).await, Err(Error::TransportClosed)));
            unit
        });

        let mut client = TcpTransport::connect(addr).await.unwrap();
        client.send(b"__EOT__").await.unwrap();
        assert_eq!(client.recv(1024).await.unwrap().as_ref(), b"ACK: CRC32 valid");
        client.shutdown().await.unwrap();
        drop(client);

        assert_eq!(server.await.unwrap().as_ref(), b"__EOT__");
    }
}
