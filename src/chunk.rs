//! 페이로드와 청크 정의
//!
//! - Payload: 한 번의 전송 단위 (텍스트 또는 파일)
//! - Chunk: 고정 크기로 잘린 페이로드 조각, 마지막 청크만 짧을 수 있음

use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::{Error, Result};

/// 청크 순번 (0부터 시작)
pub type ChunkIndex = u64;

/// 청크 (송신 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 페이로드 내 순번
    pub index: ChunkIndex,

    /// 실제 데이터
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 전송할 페이로드
#[derive(Debug, Clone)]
pub enum Payload {
    /// 메모리 상의 바이트열 (텍스트 포함)
    Bytes(Bytes),

    /// 순차적으로 읽을 파일
    File(PathBuf),
}

impl Payload {
    /// 텍스트 페이로드 (UTF-8 인코딩)
    pub fn text(text: &str) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Payload::Bytes(data.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Payload::File(path.into())
    }

    /// 파일 페이로드의 확장자 (소문자, '.' 포함)
    pub fn extension(&self) -> Option<String> {
        match self {
            Payload::Bytes(_) => None,
            Payload::File(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{}", ext.to_ascii_lowercase())),
        }
    }

    /// 로그용 설명
    pub fn describe(&self) -> String {
        match self {
            Payload::Bytes(data) => format!("{} bytes (memory)", data.len()),
            Payload::File(path) => format!("{}", path.display()),
        }
    }

    /// 청크 분할기 생성
    ///
    /// 파일은 여기서 열리고, 분할기가 drop될 때 닫힌다.
    pub async fn open(&self, chunk_size: usize) -> Result<Chunker<PayloadReader>> {
        let reader = match self {
            Payload::Bytes(data) => PayloadReader::Memory(Cursor::new(data.clone())),
            Payload::File(path) => PayloadReader::File(open_file(path).await?),
        };
        Chunker::new(reader, chunk_size)
    }
}

async fn open_file(path: &Path) -> Result<File> {
    File::open(path).await.map_err(Error::Io)
}

/// 페이로드 소스 리더
#[derive(Debug)]
pub enum PayloadReader {
    Memory(Cursor<Bytes>),
    File(File),
}

impl AsyncRead for PayloadReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PayloadReader::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            PayloadReader::File(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

/// 청크 분할기
///
/// 소스를 앞에서부터 한 번만 읽는다. 다시 분할하려면 새 소스로 만들어야 한다.
#[derive(Debug)]
pub struct Chunker<R> {
    reader: R,
    chunk_size: usize,
    next_index: ChunkIndex,
    bytes_read: u64,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    pub fn new(reader: R, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        Ok(Self {
            reader,
            chunk_size,
            next_index: 0,
            bytes_read: 0,
            exhausted: false,
        })
    }

    /// 다음 청크 읽기
    ///
    /// 청크가 가득 차거나 EOF에 닿을 때까지 읽는다. EOF 이후에는 `None`.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        while buf.len() < self.chunk_size {
            let remaining = self.chunk_size - buf.len();
            let n = (&mut self.reader)
                .take(remaining as u64)
                .read_buf(&mut buf)
                .await?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
        }

        if buf.is_empty() {
            return Ok(None);
        }

        self.bytes_read += buf.len() as u64;
        let chunk = Chunk {
            index: self.next_index,
            data: buf.freeze(),
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// 지금까지 읽은 바이트 수 (EOF 이후에는 전체 길이)
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// 지금까지 만든 청크 수
    pub fn chunks_produced(&self) -> u64 {
        self.next_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// 메모리 데이터를 청크들로 분할
pub fn split(data: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    data.chunks(chunk_size.max(1))
}
