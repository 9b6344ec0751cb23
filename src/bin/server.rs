//! SWARQ 서버 (수신자)
//!
//! 연결마다 수신 태스크 하나를 띄워 세션을 처리한다.
//! - 텍스트 페이로드는 로그로 출력
//! - 바이너리 페이로드는 `<output>/received_file<ext>`로 저장
//!
//! 사용법:
//!   cargo run --release --bin swarq-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin swarq-server -- --bind 0.0.0.0:65432 --output ./received

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swarq::sink::{ReceivedPayload, Role, SessionId, SessionSink};
use swarq::{
    Config, ConnectionSummary, Error, MetricsSnapshot, Receiver, TcpTransport, DEFAULT_PORT,
};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    output_dir: PathBuf,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            output_dir: PathBuf::from("."),
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    config.config.chunk_size = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"SWARQ Server - Stop-and-Wait ARQ 수신 서버

청크마다 CRC32를 검증하고 ACK/NACK로 응답한다.

사용법:
  cargo run --release --bin swarq-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:65432)
  --chunk-size <SIZE>     청크 크기 바이트 (기본: 1024, 클라이언트와 같아야 함)
  -o, --output <DIR>      바이너리 저장 디렉터리 (기본: .)
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG로 조절 (예: RUST_LOG=swarq=trace)
"#
                );
                std::process::exit(0);
            }
            other => warn!("Unknown argument: {}", other),
        }
        i += 1;
    }

    config.config.validate()?;
    Ok(config)
}

/// 연결 하나의 출력: 텍스트는 로그, 바이너리는 파일
struct ConnectionSink {
    peer: SocketAddr,
    output_dir: PathBuf,
}

impl SessionSink for ConnectionSink {
    fn session_started(&mut self, _role: Role, session: SessionId) {
        info!("[{}] Session {} started", self.peer, session);
    }

    fn payload_received(&mut self, session: SessionId, payload: ReceivedPayload) {
        if let Some(text) = payload.as_text() {
            info!("[{}] Session {} message: {}", self.peer, session, text);
            return;
        }

        let extension = payload.classification.extension().unwrap_or(".bin");
        let path = self.output_dir.join(format!("received_file{}", extension));
        // 런타임 워커를 막지 않도록 블로킹 구간으로 표시
        match tokio::task::block_in_place(|| std::fs::write(&path, &payload.data)) {
            Ok(()) => info!(
                "[{}] Session {} saved {} bytes to {}",
                self.peer,
                session,
                payload.data.len(),
                path.display()
            ),
            Err(e) => warn!("[{}] Failed to save {}: {}", self.peer, path.display(), e),
        }
    }

    fn metrics(&mut self, _role: Role, session: SessionId, metrics: &MetricsSnapshot) {
        for line in metrics.lines() {
            info!("[{}] Session {} {}", self.peer, session, line);
        }
    }

    fn session_completed(&mut self, _role: Role, session: SessionId) {
        info!("[{}] Session {} completed", self.peer, session);
    }

    fn session_failed(&mut self, _role: Role, session: SessionId, reason: &Error) {
        warn!("[{}] Session {} failed: {}", self.peer, session, reason);
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Config,
    output_dir: PathBuf,
) -> swarq::Result<ConnectionSummary> {
    let transport = TcpTransport::new(stream)?;
    let mut receiver = Receiver::new(transport, config)?;
    let mut sink = ConnectionSink { peer, output_dir };
    receiver.run(&mut sink).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_config = parse_args()?;

    info!("SWARQ Server starting...");
    info!("Chunk size: {} bytes", server_config.config.chunk_size);
    info!("Output directory: {}", server_config.output_dir.display());

    std::fs::create_dir_all(&server_config.output_dir)?;

    let listener = TcpListener::bind(server_config.bind_addr).await?;
    info!("Server listening on {}", server_config.bind_addr);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        info!("Connected by {}", peer);

        let config = server_config.config.clone();
        let output_dir = server_config.output_dir.clone();

        tokio::spawn(async move {
            match handle_connection(stream, peer, config, output_dir).await {
                Ok(summary) => info!(
                    "[{}] Connection closed ({:?}): {} completed, {} failed",
                    peer, summary.end, summary.sessions_completed, summary.sessions_failed
                ),
                Err(e) => warn!("[{}] Connection error: {}", peer, e),
            }
        });
    }
}
