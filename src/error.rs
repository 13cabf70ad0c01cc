//! 에러 타입 정의

use std::net::SocketAddr;

use thiserror::Error;

/// RFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("잘못된 패킷: 최소 {expected} 바이트 필요, {got} 바이트 수신")]
    MalformedPacket { expected: usize, got: usize },

    #[error("알 수 없는 메시지 타입: {0:#04X}")]
    UnknownMessageType(u8),

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("파일을 찾을 수 없음: {0}")]
    FileNotFound(String),

    #[error("서버 응답 없음: {attempts}회 시도")]
    NoResponseFromServer { attempts: u32 },

    #[error("수신된 데이터 없음")]
    NoDataReceived,

    #[error("세션 없음: {0}")]
    SessionNotFound(SocketAddr),

    #[error("채널 에러")]
    ChannelError,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
