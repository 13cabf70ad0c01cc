//! 서버측 전송 세션과 세션 저장소
//!
//! - TransferSession: 클라이언트 하나의 진행 중 전송. 이미 보낸 패킷을 재전송용으로 보관
//! - SessionStore: 클라이언트 주소 → 세션. 유휴 세션은 TTL 경과 후 제거

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::packet::{Metadata, SequenceNumber};

/// 전송 세션 (세션 저장소 항목)
#[derive(Debug)]
pub struct TransferSession {
    /// 전송 중인 파일
    path: PathBuf,

    /// 메타데이터 (총 패킷 수, 파일 크기)
    metadata: Metadata,

    /// 이미 만든 패킷 페이로드 (재전송 시 파일을 다시 읽지 않음)
    packets: RwLock<HashMap<SequenceNumber, Bytes>>,

    /// 생성 시간
    created_at: Instant,

    /// 마지막 활동 시간
    last_activity: Mutex<Instant>,
}

impl TransferSession {
    pub fn new(path: PathBuf, metadata: Metadata) -> Self {
        let now = Instant::now();
        Self {
            path,
            metadata,
            packets: RwLock::new(HashMap::with_capacity(metadata.total_packets as usize)),
            created_at: now,
            last_activity: Mutex::new(now),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn total_packets(&self) -> u32 {
        self.metadata.total_packets
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 페이로드 보관
    ///
    /// 범위 밖 번호는 무시
    pub fn store_packet(&self, seq: SequenceNumber, payload: Bytes) -> bool {
        if seq >= self.metadata.total_packets {
            return false;
        }
        self.packets.write().insert(seq, payload);
        self.touch();
        true
    }

    /// 보관된 페이로드 조회
    pub fn packet(&self, seq: SequenceNumber) -> Option<Bytes> {
        self.packets.read().get(&seq).cloned()
    }

    /// 보관된 패킷 수
    pub fn stored_count(&self) -> usize {
        self.packets.read().len()
    }

    /// 활동 시간 갱신
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// 마지막 활동 이후 경과 시간
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.idle_for() > ttl
    }
}

/// 세션 저장소
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SocketAddr, Arc<TransferSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 세션 등록 (같은 주소의 기존 세션은 교체)
    pub fn insert(
        &self,
        addr: SocketAddr,
        session: Arc<TransferSession>,
    ) -> Option<Arc<TransferSession>> {
        self.sessions.insert(addr, session)
    }

    /// 세션 조회
    ///
    /// 만료된 세션은 이 시점에 제거하고 없는 것으로 취급
    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<TransferSession>> {
        let session = self.sessions.get(addr).map(|entry| entry.value().clone())?;

        if session.is_expired(self.ttl) {
            self.sessions
                .remove_if(addr, |_, current| Arc::ptr_eq(current, &session));
            debug!("만료된 세션 조회: {}", addr);
            return None;
        }

        Some(session)
    }

    /// 세션 제거
    pub fn remove(&self, addr: &SocketAddr) -> Option<Arc<TransferSession>> {
        self.sessions.remove(addr).map(|(_, session)| session)
    }

    /// 유휴 세션 정리, 제거된 수 반환
    pub fn sweep_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(self.ttl));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
