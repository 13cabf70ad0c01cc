//! 프로토콜 메시지 정의
//!
//! 모든 데이터그램은 1바이트 메시지 타입으로 시작함.
//! 제어 메시지 본문은 사람이 읽을 수 있는 ASCII 텍스트를 유지하지만
//! 메시지 구분은 항상 타입 바이트로만 함 (본문 내용으로 추측하지 않음)

use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::{DataPacket, Metadata, SequenceNumber};
use crate::{Error, Result};

/// 파일 없음 응답 본문
pub const NOT_FOUND_TEXT: &str = "ERROR: Archivo no encontrado";

/// 전송 종료 본문
pub const END_OF_TRANSFER_TEXT: &str = "FIN";

/// 재전송 요청 접두사
pub const RESEND_PREFIX: &str = "REENVIAR:";

/// 전송 완료 알림 본문
pub const TRANSFER_COMPLETE_TEXT: &str = "COMPLETADO";

/// 세션 없음 응답 본문
pub const SESSION_NOT_FOUND_TEXT: &str = "ERROR: Sesión no encontrada";

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// 파일 요청 (클라이언트 → 서버)
    Request = 1,

    /// 파일 없음 (서버 → 클라이언트)
    NotFound = 2,

    /// 메타데이터 (서버 → 클라이언트)
    Metadata = 3,

    /// 데이터 패킷 (서버 → 클라이언트)
    Data = 4,

    /// 전송 종료 (서버 → 클라이언트)
    EndOfTransfer = 5,

    /// 재전송 요청 (클라이언트 → 서버)
    Resend = 6,

    /// 전송 완료 알림 (클라이언트 → 서버)
    TransferComplete = 7,

    /// 세션 없음 (서버 → 클라이언트)
    SessionNotFound = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => MessageType::Request,
            2 => MessageType::NotFound,
            3 => MessageType::Metadata,
            4 => MessageType::Data,
            5 => MessageType::EndOfTransfer,
            6 => MessageType::Resend,
            7 => MessageType::TransferComplete,
            8 => MessageType::SessionNotFound,
            other => return Err(Error::UnknownMessageType(other)),
        })
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(String),
    NotFound,
    Metadata(Metadata),
    Data(DataPacket),
    EndOfTransfer,
    Resend(Vec<SequenceNumber>),
    TransferComplete,
    SessionNotFound,
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Request(_) => MessageType::Request,
            Message::NotFound => MessageType::NotFound,
            Message::Metadata(_) => MessageType::Metadata,
            Message::Data(_) => MessageType::Data,
            Message::EndOfTransfer => MessageType::EndOfTransfer,
            Message::Resend(_) => MessageType::Resend,
            Message::TransferComplete => MessageType::TransferComplete,
            Message::SessionNotFound => MessageType::SessionNotFound,
        }
    }

    /// 타입 바이트를 붙여 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.msg_type() as u8);

        match self {
            Message::Request(filename) => buf.put_slice(filename.as_bytes()),
            Message::NotFound => buf.put_slice(NOT_FOUND_TEXT.as_bytes()),
            Message::Metadata(metadata) => buf.put_slice(&metadata.to_bytes()),
            Message::Data(packet) => packet.encode(&mut buf),
            Message::EndOfTransfer => buf.put_slice(END_OF_TRANSFER_TEXT.as_bytes()),
            Message::Resend(seqs) => {
                buf.put_slice(RESEND_PREFIX.as_bytes());
                let csv = seqs
                    .iter()
                    .map(|seq| seq.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                buf.put_slice(csv.as_bytes());
            }
            Message::TransferComplete => buf.put_slice(TRANSFER_COMPLETE_TEXT.as_bytes()),
            Message::SessionNotFound => buf.put_slice(SESSION_NOT_FOUND_TEXT.as_bytes()),
        }

        buf.freeze()
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or(Error::MalformedPacket { expected: 1, got: 0 })?;

        Ok(match MessageType::try_from(tag)? {
            MessageType::Request => {
                let filename = std::str::from_utf8(body)
                    .map_err(|_| Error::InvalidFilename(String::from_utf8_lossy(body).into()))?;
                Message::Request(filename.trim().to_string())
            }
            MessageType::NotFound => Message::NotFound,
            MessageType::Metadata => Message::Metadata(Metadata::from_bytes(body)?),
            MessageType::Data => Message::Data(DataPacket::from_bytes(body)?),
            MessageType::EndOfTransfer => Message::EndOfTransfer,
            MessageType::Resend => Message::Resend(parse_resend_list(body)?),
            MessageType::TransferComplete => Message::TransferComplete,
            MessageType::SessionNotFound => Message::SessionNotFound,
        })
    }
}

/// `REENVIAR:1,2,3` 본문 파싱
///
/// 숫자로 읽을 수 없는 항목은 건너뜀
fn parse_resend_list(body: &[u8]) -> Result<Vec<SequenceNumber>> {
    let list = body
        .strip_prefix(RESEND_PREFIX.as_bytes())
        .ok_or(Error::MalformedPacket {
            expected: RESEND_PREFIX.len(),
            got: body.len(),
        })?;

    Ok(String::from_utf8_lossy(list)
        .split(',')
        .filter_map(|item| item.trim().parse().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::METADATA_LEN;

    #[test]
    fn test_control_messages_keep_text_body() {
        assert_eq!(&Message::EndOfTransfer.to_bytes()[..], b"\x05FIN");
        assert_eq!(&Message::TransferComplete.to_bytes()[..], b"\x07COMPLETADO");
        assert_eq!(
            &Message::NotFound.to_bytes()[1..],
            NOT_FOUND_TEXT.as_bytes()
        );
        assert_eq!(
            &Message::Resend(vec![1, 20, 300]).to_bytes()[..],
            b"\x06REENVIAR:1,20,300"
        );
    }

    #[test]
    fn test_metadata_message_length() {
        let bytes = Message::Metadata(Metadata::new(1, 1)).to_bytes();
        assert_eq!(bytes.len(), 1 + METADATA_LEN);
    }

    #[test]
    fn test_data_payload_resembling_control_text() {
        // 페이로드가 "FIN"으로 시작해도 데이터 패킷으로 해석됨
        let packet = DataPacket::new(0, 1, Bytes::from_static(b"FIN"));
        let mut bytes = BytesMut::new();
        bytes.put_u8(MessageType::Data as u8);
        bytes.put_slice(&packet.to_bytes());

        assert_eq!(Message::from_bytes(&bytes).unwrap(), Message::Data(packet));
    }

    #[test]
    fn test_request_is_trimmed() {
        let message = Message::from_bytes(b"\x01  report.txt\n").unwrap();
        assert_eq!(message, Message::Request("report.txt".into()));
    }

    #[test]
    fn test_resend_skips_malformed_numbers() {
        let message = Message::from_bytes(b"\x06REENVIAR:1,x,3,,-4,99999999999").unwrap();
        assert_eq!(message, Message::Resend(vec![1, 3]));
    }

    #[test]
    fn test_resend_without_prefix_is_malformed() {
        assert!(Message::from_bytes(b"\x06RESEND:1,2").is_err());
    }

    #[test]
    fn test_empty_and_unknown_datagrams() {
        assert!(matches!(
            Message::from_bytes(&[]),
            Err(Error::MalformedPacket { .. })
        ));
        assert!(matches!(
            Message::from_bytes(b"FIN"),
            Err(Error::UnknownMessageType(b'F'))
        ));
    }

    #[test]
    fn test_short_data_packet_is_malformed() {
        assert!(matches!(
            Message::from_bytes(&[4, 0, 0, 0, 1]),
            Err(Error::MalformedPacket { expected: 8, got: 4 })
        ));
    }
}
