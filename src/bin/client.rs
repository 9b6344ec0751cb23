//! SWARQ 클라이언트 (송신자)
//!
//! 표준 입력에서 한 줄씩 읽어 전송한다.
//! - 존재하는 파일 경로면 파일 전송, 아니면 텍스트 전송
//! - `END` 입력 시 (대소문자 무관) 종료 신호 전송 후 끝냄
//!
//! 사용법:
//!   cargo run --release --bin swarq-client -- [OPTIONS]
//!
//! 예시:
//!   # 10% 확률로 비트 에러 삽입
//!   cargo run --release --bin swarq-client -- --server 127.0.0.1:65432 --error-prob 0.1

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swarq::{Config, Payload, Sender, SessionOutcome, TcpTransport, TracingSink, DEFAULT_PORT};

/// 클라이언트 설정
struct ClientConfig {
    server_addr: SocketAddr,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    config.config.chunk_size = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--error-prob" | "-p" => {
                if i + 1 < args.len() {
                    config.config.corruption_probability = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--timeout-ms" => {
                if i + 1 < args.len() {
                    config.config.ack_timeout_ms = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    config.config.rng_seed = Some(args[i + 1].parse()?);
                    i += 1;
                }
            }
            "--no-tag" => {
                config.config.send_extension_tag = false;
            }
            "--help" | "-h" => {
                println!(
                    r#"SWARQ Client - Stop-and-Wait ARQ 송신 클라이언트

한 줄씩 입력받아 전송한다. 파일 경로면 파일, 아니면 텍스트.
END 입력 시 종료 (대소문자 무관).

사용법:
  cargo run --release --bin swarq-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>     서버 주소 (기본: 127.0.0.1:65432)
  --chunk-size <SIZE>     청크 크기 바이트 (기본: 1024)
  -p, --error-prob <P>    비트 에러 삽입 확률 0.0~1.0 (기본: 0.0)
  --timeout-ms <MS>       ACK 대기 타임아웃 (기본: 3000)
  --seed <N>              비트 에러 난수 시드
  --no-tag                파일 확장자 태그 전송 안 함
  -h, --help              이 도움말 출력
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

fn prompt() -> std::io::Result<()> {
    print!("Enter message or file path (END to finish): ");
    std::io::stdout().flush()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client_config = parse_args()?;

    info!("SWARQ Client starting...");
    info!("Server: {}", client_config.server_addr);
    info!("Chunk size: {} bytes", client_config.config.chunk_size);
    info!(
        "Error probability: {:.2}",
        client_config.config.corruption_probability
    );

    let transport = TcpTransport::connect(client_config.server_addr).await?;
    let mut sender = Sender::new(transport, client_config.config)?;
    let mut sink = TracingSink;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if input.eq_ignore_ascii_case("END") {
            sender.end_session().await?;
            break;
        }

        let payload = if Path::new(input).is_file() {
            Payload::file(input)
        } else {
            Payload::text(input)
        };

        let report = sender.send_payload(&payload, &mut sink).await?;
        match &report.outcome {
            SessionOutcome::Completed => println!(
                "Sent {} ({} chunks)",
                payload.describe(),
                report.chunks_acked
            ),
            SessionOutcome::Failed(reason) => println!("Transmission failed: {}", reason),
        }
        for metric in report.metrics.lines() {
            println!("  {}", metric);
        }

        prompt()?;
    }

    info!("Client finished");
    Ok(())
}
