//! RFT 클라이언트
//!
//! 서버에서 파일 하나를 받아 저장
//!
//! 사용법:
//!   cargo run --release --bin rft-client -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin rft-client -- --server 127.0.0.1:5000 --file datos.txt
//!
//!   # 파일명을 생략하면 표준 입력으로 물어봄
//!   cargo run --release --bin rft-client -- -s 192.168.0.10:5000 -o copia.bin

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::{Completion, Config, Error, FileClient, DEFAULT_PORT};

/// 기본 저장 경로
const DEFAULT_OUTPUT: &str = "archivo_recibido";

/// 클라이언트 실행 설정
struct ClientArgs {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    filename: Option<String>,
    output_path: PathBuf,
    config: Config,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            filename: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ClientArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    parsed.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    parsed.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    parsed.filename = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    parsed.output_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"RFT Client - UDP 파일 전송 클라이언트

사용법:
  cargo run --release --bin rft-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>      서버 주소 (기본: 127.0.0.1:5000)
  -b, --bind <ADDR>        바인드 주소 (기본: 0.0.0.0:0)
  -f, --file <NAME>        요청할 파일명 (생략 시 입력받음)
  -o, --output <PATH>      저장 경로 (기본: archivo_recibido)
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

fn prompt_filename() -> std::io::Result<String> {
    print!("파일명: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
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
    let filename = match args.filename {
        Some(name) => name,
        None => prompt_filename()?,
    };

    info!("RFT Client starting...");
    info!("Server address: {}", args.server_addr);

    let mut client = FileClient::connect(args.config, args.bind_addr, args.server_addr).await?;
    info!("Bound to local address: {}", client.local_addr()?);

    let fetched = match client.fetch(&filename).await {
        Ok(fetched) => fetched,
        Err(Error::FileNotFound(name)) => {
            error!("서버에 파일 없음: {:?}", name);
            std::process::exit(1);
        }
        Err(e) => {
            error!("전송 실패: {}", e);
            std::process::exit(1);
        }
    };

    tokio::fs::write(&args.output_path, &fetched.data).await?;

    match &fetched.completion {
        Completion::Full => info!("전송 완료"),
        Completion::Partial { missing } => warn!(
            "부분 완료: {} packets 누락 ({:?} 저장)",
            missing.len(),
            args.output_path
        ),
    }
    info!("  Saved: {:?}", args.output_path);
    info!("  Size: {} bytes", fetched.data.len());
    info!("  CRC32: {:08x}", fetched.crc32());
    info!("  {}", fetched.stats.summary());

    Ok(())
}
