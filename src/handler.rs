//! 서버측 전송 세션 핸들러
//!
//! 데이터그램 하나를 클라이언트 주소 기준으로 처리
//! - 파일 요청: 메타데이터 → 전체 패킷 → FIN
//! - 재전송 요청: 세션에 보관된 패킷만 다시 전송
//! - 완료 알림: 세션 제거

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::files::{read_full, FileStore};
use crate::message::Message;
use crate::packet::{packet_count, DataPacket, Metadata, SequenceNumber};
use crate::session::{SessionStore, TransferSession};
use crate::stats::ServerStats;
use crate::{Config, Error, Result};

/// 세션 핸들러 (워커들이 공유)
pub struct SessionHandler {
    config: Config,
    socket: Arc<UdpSocket>,
    sessions: Arc<SessionStore>,
    files: FileStore,
    stats: Arc<ServerStats>,
}

impl SessionHandler {
    pub fn new(
        config: Config,
        socket: Arc<UdpSocket>,
        sessions: Arc<SessionStore>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            files: FileStore::new(config.base_dir.clone()),
            config,
            socket,
            sessions,
            stats,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// 수신 데이터그램 처리
    pub async fn handle(&self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        let message = match Message::from_bytes(datagram) {
            Ok(message) => message,
            Err(Error::InvalidFilename(name)) => {
                return self.reject_request(&name, addr).await;
            }
            Err(e) => {
                debug!("데이터그램 무시 ({}): {}", addr, e);
                return Ok(());
            }
        };

        match message {
            Message::Request(name) => self.handle_request(&name, addr).await,
            Message::Resend(seqs) => self.handle_resend(&seqs, addr).await,
            Message::TransferComplete => {
                self.handle_complete(addr);
                Ok(())
            }
            other => {
                debug!("서버로 온 {:?} 메시지 무시 ({})", other.msg_type(), addr);
                Ok(())
            }
        }
    }

    /// 파일 요청 처리
    async fn handle_request(&self, name: &str, addr: SocketAddr) -> Result<()> {
        let resolved = match self.files.resolve(name).await {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("파일 해석 실패 {:?}: {}", name, e);
                return self.reject_request(name, addr).await;
            }
        };

        let Ok(file_size) = u32::try_from(resolved.len) else {
            warn!(
                "메타데이터로 표현할 수 없는 파일 크기: {:?} ({} bytes)",
                name, resolved.len
            );
            return self.reject_request(name, addr).await;
        };
        let Some(total_packets) = packet_count(resolved.len, self.config.max_payload_size) else {
            return self.reject_request(name, addr).await;
        };

        let mut file = match resolved.open().await {
            Ok(file) => file,
            Err(e) => {
                self.reject_request(name, addr).await?;
                return Err(e.into());
            }
        };

        let metadata = Metadata::new(total_packets, file_size);
        self.send(&Message::Metadata(metadata), addr).await?;

        let session = Arc::new(TransferSession::new(resolved.path.clone(), metadata));
        if self.sessions.insert(addr, session.clone()).is_some() {
            debug!("기존 세션 교체: {}", addr);
        }
        ServerStats::add(&self.stats.sessions_opened, 1);

        info!(
            "전송 시작 {} → {}: {} bytes, {} packets",
            name, addr, file_size, total_packets
        );

        self.stream_file(&session, &mut file, addr).await?;
        self.send(&Message::EndOfTransfer, addr).await?;

        Ok(())
    }

    /// 파일 전체를 순서대로 전송
    ///
    /// 페이로드는 전송 전에 세션에 먼저 보관함
    async fn stream_file(
        &self,
        session: &TransferSession,
        file: &mut File,
        addr: SocketAddr,
    ) -> Result<()> {
        let total_packets = session.total_packets();
        let interval = self.config.send_interval();
        let mut buf = vec![0u8; self.config.max_payload_size.max(1)];
        let mut hasher = crc32fast::Hasher::new();

        for seq in 0..total_packets {
            let n = read_full(file, &mut buf).await?;
            if n == 0 {
                warn!(
                    "파일이 예상보다 짧음: {:?}, {}/{} packets",
                    session.path(),
                    seq,
                    total_packets
                );
                break;
            }

            let payload = Bytes::copy_from_slice(&buf[..n]);
            hasher.update(&payload);
            session.store_packet(seq, payload.clone());

            if self.should_drop() {
                ServerStats::add(&self.stats.packets_dropped, 1);
            } else {
                let packet = DataPacket::new(seq, total_packets, payload);
                self.send(&Message::Data(packet), addr).await?;
                ServerStats::add(&self.stats.packets_sent, 1);
            }

            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        info!(
            "초기 전송 완료 → {}: {} packets, crc32={:08X}",
            addr,
            total_packets,
            hasher.finalize()
        );

        Ok(())
    }

    /// 재전송 요청 처리
    ///
    /// 보관되지 않은 번호는 조용히 건너뜀
    async fn handle_resend(&self, seqs: &[SequenceNumber], addr: SocketAddr) -> Result<()> {
        let Some(session) = self.sessions.get(&addr) else {
            debug!("재전송 요청에 해당하는 세션 없음: {}", addr);
            return self.send(&Message::SessionNotFound, addr).await;
        };

        let total_packets = session.total_packets();
        let mut resent = 0u64;

        for &seq in seqs {
            if let Some(payload) = session.packet(seq) {
                let packet = DataPacket::new(seq, total_packets, payload);
                self.send(&Message::Data(packet), addr).await?;
                resent += 1;
            }
        }

        session.touch();
        ServerStats::add(&self.stats.packets_resent, resent);

        debug!(
            "재전송 → {}: {}/{} packets",
            addr,
            resent,
            seqs.len()
        );

        Ok(())
    }

    /// 완료 알림 처리
    fn handle_complete(&self, addr: SocketAddr) {
        match self.sessions.remove(&addr) {
            Some(session) => {
                ServerStats::add(&self.stats.sessions_completed, 1);
                info!(
                    "전송 완료 확인 {}: {:?} ({:.2}s)",
                    addr,
                    session.path(),
                    session.created_at().elapsed().as_secs_f64()
                );
            }
            None => debug!("완료 알림에 해당하는 세션 없음: {}", addr),
        }
    }

    async fn reject_request(&self, name: &str, addr: SocketAddr) -> Result<()> {
        ServerStats::add(&self.stats.not_found, 1);
        info!("파일 없음 {:?} ({})", name, addr);
        self.send(&Message::NotFound, addr).await
    }

    fn should_drop(&self) -> bool {
        let rate = self.config.simulated_loss_rate;
        rate > 0.0 && rand::thread_rng().gen_bool(rate.min(1.0))
    }

    async fn send(&self, message: &Message, addr: SocketAddr) -> Result<()> {
        self.socket.send_to(&message.to_bytes(), addr).await?;
        Ok(())
    }
}
