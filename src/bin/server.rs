//! RFT 서버
//!
//! 기본 디렉터리의 파일을 요청한 클라이언트에게 전송
//!
//! 사용법:
//!   cargo run --release --bin rft-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 실행 (0.0.0.0:5000, ./archivos)
//!   cargo run --release --bin rft-server
//!
//!   # 손실 시뮬레이션 5%
//!   cargo run --release --bin rft-server -- --dir ./files --loss 0.05

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::{Config, Server, DEFAULT_PORT};

/// 서버 실행 설정
struct ServerArgs {
    bind_addr: SocketAddr,
    config: Config,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ServerArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    parsed.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    parsed.config.base_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--workers" | "-w" => {
                if i + 1 < args.len() {
                    parsed.config.workers = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--interval-us" => {
                if i + 1 < args.len() {
                    parsed.config.send_interval_us = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--session-ttl" => {
                if i + 1 < args.len() {
                    parsed.config.session_ttl_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--loss" => {
                if i + 1 < args.len() {
                    parsed.config.simulated_loss_rate =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"RFT Server - UDP 파일 전송 서버

사용법:
  cargo run --release --bin rft-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>        바인드 주소 (기본: 0.0.0.0:5000)
  -d, --dir <PATH>         파일 디렉터리 (기본: ./archivos)
  -w, --workers <N>        워커 수 (기본: 5)
  --interval-us <US>       패킷 간 전송 간격 마이크로초 (기본: 1000)
  --session-ttl <MS>       유휴 세션 만료 시간 밀리초 (기본: 60000)
  --loss <RATE>            첫 전송 손실 시뮬레이션 0.0~1.0 (기본: 0.0)
  -h, --help               이 도움말 출력

로그 레벨은 RUST_LOG 환경 변수로 조정 (예: RUST_LOG=rft=debug)
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();

    info!("RFT Server starting...");
    info!("Workers: {}", args.config.workers);
    info!("Send interval: {:?}", args.config.send_interval());
    if args.config.simulated_loss_rate > 0.0 {
        info!(
            "Simulated loss: {:.1}%",
            args.config.simulated_loss_rate * 100.0
        );
    }

    let server = Arc::new(Server::bind(args.config, args.bind_addr).await?);

    let ctrl_c = {
        let server = server.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                server.stop();
            }
        })
    };

    server.run().await?;
    ctrl_c.abort();
    Ok(())
}
