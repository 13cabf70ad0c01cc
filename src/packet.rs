//! 메타데이터/데이터 패킷 정의
//!
//! - Metadata: 총 패킷 수 + 파일 크기 (8바이트)
//! - DataPacket: 시퀀스 번호 + 총 패킷 수 + 페이로드
//!
//! 모든 정수는 빅엔디안

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 시퀀스 번호 (0부터 시작)
pub type SequenceNumber = u32;

/// 메타데이터 패킷 크기
pub const METADATA_LEN: usize = 8;

/// 데이터 패킷 헤더 크기
pub const DATA_HEADER_LEN: usize = 8;

/// 파일 크기에 필요한 패킷 수 (올림)
///
/// 패킷 수가 u32 범위를 넘으면 None
pub fn packet_count(file_size: u64, max_payload_size: usize) -> Option<u32> {
    let max_payload_size = max_payload_size.max(1) as u64;
    u32::try_from(file_size.div_ceil(max_payload_size)).ok()
}

/// 전송 메타데이터 (서버 → 클라이언트, 최초 응답)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// 총 패킷 수
    pub total_packets: u32,

    /// 파일 크기 (바이트)
    pub file_size: u32,
}

impl Metadata {
    pub fn new(total_packets: u32, file_size: u32) -> Self {
        Self {
            total_packets,
            file_size,
        }
    }

    /// 8바이트로 직렬화
    pub fn to_bytes(&self) -> [u8; METADATA_LEN] {
        let mut buf = [0u8; METADATA_LEN];
        buf[..4].copy_from_slice(&self.total_packets.to_be_bytes());
        buf[4..].copy_from_slice(&self.file_size.to_be_bytes());
        buf
    }

    /// 정확히 8바이트여야 함
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() != METADATA_LEN {
            return Err(Error::MalformedPacket {
                expected: METADATA_LEN,
                got: bytes.len(),
            });
        }

        Ok(Self {
            total_packets: bytes.get_u32(),
            file_size: bytes.get_u32(),
        })
    }
}

/// 데이터 패킷 (최초 전송과 재전송이 같은 형식)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// 시퀀스 번호
    pub seq: SequenceNumber,

    /// 총 패킷 수
    pub total_packets: u32,

    /// 파일 조각
    pub payload: Bytes,
}

impl DataPacket {
    pub fn new(seq: SequenceNumber, total_packets: u32, payload: Bytes) -> Self {
        Self {
            seq,
            total_packets,
            payload,
        }
    }

    /// 직렬화된 길이
    pub fn encoded_len(&self) -> usize {
        DATA_HEADER_LEN + self.payload.len()
    }

    /// 버퍼에 헤더와 페이로드 기록
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32(self.seq);
        buf.put_u32(self.total_packets);
        buf.put_slice(&self.payload);
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    ///
    /// 헤더보다 짧으면 MalformedPacket
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATA_HEADER_LEN {
            return Err(Error::MalformedPacket {
                expected: DATA_HEADER_LEN,
                got: bytes.len(),
            });
        }

        let seq = bytes.get_u32();
        let total_packets = bytes.get_u32();

        Ok(Self {
            seq,
            total_packets,
            payload: Bytes::copy_from_slice(bytes),
        })
    }
}
