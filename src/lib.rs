//! # RFT (Reliable File Transfer)
//!
//! UDP 위 시퀀스 번호 + 재전송 요청 기반 파일 전송
//!
//! ## 핵심 특징
//! - **일괄 전송**: 서버가 파일 전체를 먼저 보내고 FIN으로 종료
//! - **재전송 요청**: 클라이언트가 누락 번호만 배치로 요청
//! - **지수 백오프**: 실패한 라운드마다 수신 타임아웃 2배 (상한 있음)
//! - **부분 완료**: 타임아웃 시 수신률이 임계값을 넘으면 누락을 감수
//! - **세션 캐시**: 클라이언트 주소별 패킷 캐시, 유휴 TTL로 정리
//! - **워커 풀**: 수신 루프는 고정 크기 워커 풀로 분배

pub mod assembly;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod files;
pub mod handler;
pub mod message;
pub mod packet;
pub mod server;
pub mod session;
pub mod stats;

pub use assembly::AssemblyBuffer;
pub use backoff::Backoff;
pub use client::{Completion, FetchedFile, FileClient};
pub use config::Config;
pub use error::{Error, Result};
pub use files::FileStore;
pub use message::{Message, MessageType};
pub use packet::{DataPacket, Metadata, SequenceNumber};
pub use server::Server;
pub use session::{SessionStore, TransferSession};
pub use stats::{ServerStats, TransferStats};

/// 패킷당 최대 페이로드 (바이트)
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// 기본 파일 디렉터리
pub const DEFAULT_BASE_DIR: &str = "./archivos";

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 5000;
