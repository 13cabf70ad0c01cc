//! 클라이언트측 조립 버퍼
//!
//! 시퀀스 번호 → 페이로드 맵. 누락 계산과 최종 조립을 담당

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::packet::{DataPacket, Metadata, SequenceNumber};

/// 패킷 삽입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// 새 패킷
    New,
    /// 이미 받은 패킷 (같은 내용으로 덮어씀)
    Duplicate,
    /// 범위 밖이거나 다른 전송의 패킷
    Rejected,
}

/// 조립 버퍼
#[derive(Debug)]
pub struct AssemblyBuffer {
    metadata: Metadata,
    packets: BTreeMap<SequenceNumber, Bytes>,
}

impl AssemblyBuffer {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            packets: BTreeMap::new(),
        }
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn expected_total(&self) -> u32 {
        self.metadata.total_packets
    }

    /// 데이터 패킷 삽입
    ///
    /// 맵은 항상 [0, total_packets) 범위만 담음
    pub fn insert(&mut self, packet: DataPacket) -> Insert {
        if packet.total_packets != self.metadata.total_packets
            || packet.seq >= self.metadata.total_packets
        {
            return Insert::Rejected;
        }

        match self.packets.insert(packet.seq, packet.payload) {
            None => Insert::New,
            Some(_) => Insert::Duplicate,
        }
    }

    /// 받은 패킷 수
    pub fn received(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.packets.len() as u64 >= self.metadata.total_packets as u64
    }

    /// 누락된 시퀀스 번호 (오름차순)
    pub fn missing(&self) -> Vec<SequenceNumber> {
        (0..self.metadata.total_packets)
            .filter(|seq| !self.packets.contains_key(seq))
            .collect()
    }

    /// 수신률 (0.0 ~ 1.0)
    pub fn received_ratio(&self) -> f64 {
        if self.metadata.total_packets == 0 {
            return 1.0;
        }
        self.packets.len() as f64 / self.metadata.total_packets as f64
    }

    /// 수신 수가 total * threshold를 초과하는지
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.packets.len() as f64 > self.metadata.total_packets as f64 * threshold
    }

    /// 페이로드를 순서대로 이어붙임
    ///
    /// 결과 길이는 min(받은 페이로드 합, 선언된 파일 크기)
    pub fn assemble(&self) -> Bytes {
        let received_len: usize = self.packets.values().map(Bytes::len).sum();
        let final_len = received_len.min(self.metadata.file_size as usize);

        let mut buf = BytesMut::with_capacity(final_len);
        for payload in self.packets.values() {
            let remaining = final_len - buf.len();
            if remaining == 0 {
                break;
            }
            buf.extend_from_slice(&payload[..payload.len().min(remaining)]);
        }
        buf.freeze()
    }
}
