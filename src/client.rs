//! 클라이언트 전송 세션
//!
//! 파일 요청 → 메타데이터 → 일괄 수신 → 누락 계산 → 재전송 요청(백오프) 반복.
//! 내부 동시성 없이 순차적으로 진행하며, 수신 타임아웃이 유일한 중단 지점

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::assembly::{AssemblyBuffer, Insert};
use crate::backoff::Backoff;
use crate::message::Message;
use crate::packet::{DataPacket, Metadata, SequenceNumber};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 전송 완료 형태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// 모든 패킷 수신
    Full,

    /// 수신률이 임계값을 넘어 누락을 감수하고 종료
    Partial { missing: Vec<SequenceNumber> },
}

/// 수신 완료된 파일
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub data: Bytes,
    pub metadata: Metadata,
    pub completion: Completion,
    pub stats: TransferStats,
}

impl FetchedFile {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Full
    }

    /// 누락된 패킷 번호 (완전 수신이면 빈 슬라이스)
    pub fn missing(&self) -> &[SequenceNumber] {
        match &self.completion {
            Completion::Full => &[],
            Completion::Partial { missing } => missing,
        }
    }

    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.data)
    }
}

/// 수신 라운드 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseEnd {
    /// 서버가 FIN 전송
    EndOfTransfer,
    /// 타임아웃
    TimedOut,
    /// 모든 패킷 수신
    Complete,
    /// 서버에 세션이 없음
    SessionLost,
}

/// 파일 클라이언트
pub struct FileClient {
    config: Config,
    socket: UdpSocket,
    server_addr: SocketAddr,
    buf: Vec<u8>,
}

impl FileClient {
    /// 소켓 바인딩
    pub async fn connect(
        config: Config,
        bind_addr: SocketAddr,
        server_addr: SocketAddr,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self::with_socket(config, socket, server_addr))
    }

    pub fn with_socket(config: Config, socket: UdpSocket, server_addr: SocketAddr) -> Self {
        Self {
            buf: vec![0u8; config.recv_buffer_size],
            config,
            socket,
            server_addr,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 파일 하나를 끝까지 수신
    ///
    /// 실패: FileNotFound, NoResponseFromServer, NoDataReceived (또는 소켓 에러)
    pub async fn fetch(&mut self, filename: &str) -> Result<FetchedFile> {
        let mut stats = TransferStats::new();
        let mut early = Vec::new();

        let metadata = self.request_metadata(filename, &mut early, &mut stats).await?;
        info!(
            "파일 확인 {:?}: {} packets, {} bytes",
            filename, metadata.total_packets, metadata.file_size
        );

        let mut assembly = AssemblyBuffer::new(metadata);
        for packet in early {
            record(&mut assembly, packet, &mut stats);
        }

        let mut backoff = Backoff::new(self.config.initial_timeout(), self.config.max_timeout());

        // 재요청 후 새 메타데이터가 올 때까지 남은 SessionNotFound는 무시
        let mut restart_pending = false;

        let completion = loop {
            let end = self
                .receive_phase(
                    filename,
                    &mut assembly,
                    backoff.current(),
                    &mut restart_pending,
                    &mut stats,
                )
                .await?;

            if end == PhaseEnd::SessionLost {
                self.restart(filename, &mut stats).await?;
                restart_pending = true;
                backoff.reset();
                continue;
            }

            if end == PhaseEnd::TimedOut {
                // 재요청이 유실된 경우 다음 SessionNotFound로 다시 요청
                restart_pending = false;
            }

            let missing = assembly.missing();
            if missing.is_empty() {
                break Completion::Full;
            }

            if end == PhaseEnd::TimedOut {
                if assembly.is_empty() {
                    warn!("수신된 패킷 없음, 중단");
                    return Err(Error::NoDataReceived);
                }

                if assembly.exceeds(self.config.completion_threshold) {
                    warn!(
                        "타임아웃, {:.1}% 수신으로 부분 완료 처리 ({} packets 누락)",
                        assembly.received_ratio() * 100.0,
                        missing.len()
                    );
                    break Completion::Partial { missing };
                }
            }

            info!(
                "누락 {}/{} packets, 재전송 요청 (timeout {:?})",
                missing.len(),
                metadata.total_packets,
                backoff.current()
            );
            self.request_resend(&missing, &mut stats).await?;
            stats.resend_rounds += 1;
            backoff.advance();
        };

        let data = assembly.assemble();
        self.notify_complete().await;

        info!("수신 완료 {:?}: {}", filename, stats.summary());

        Ok(FetchedFile {
            data,
            metadata,
            completion,
            stats,
        })
    }

    /// 파일 요청 후 메타데이터 대기
    ///
    /// 메타데이터보다 먼저 도착한 데이터 패킷은 early에 보관
    async fn request_metadata(
        &mut self,
        filename: &str,
        early: &mut Vec<DataPacket>,
        stats: &mut TransferStats,
    ) -> Result<Metadata> {
        let request = Message::Request(filename.to_string());
        let max_attempts = self.config.max_request_attempts.max(1);

        for attempt in 1..=max_attempts {
            self.send(&request).await?;
            stats.request_attempts += 1;

            let deadline = Instant::now() + self.config.initial_timeout();
            while let Some(message) = self.recv_until(deadline).await? {
                match message {
                    Message::Metadata(metadata) => return Ok(metadata),
                    Message::NotFound => {
                        info!("서버에 파일 없음: {:?}", filename);
                        return Err(Error::FileNotFound(filename.to_string()));
                    }
                    Message::Data(packet) => early.push(packet),
                    other => debug!("메타데이터 대기 중 {:?} 무시", other.msg_type()),
                }
            }

            warn!(
                "메타데이터 대기 시간 초과, 재요청 ({}/{})",
                attempt, max_attempts
            );
        }

        Err(Error::NoResponseFromServer {
            attempts: max_attempts,
        })
    }

    /// FIN, 타임아웃, 완료 중 하나가 될 때까지 수신
    async fn receive_phase(
        &mut self,
        filename: &str,
        assembly: &mut AssemblyBuffer,
        timeout: std::time::Duration,
        restart_pending: &mut bool,
        stats: &mut TransferStats,
    ) -> Result<PhaseEnd> {
        loop {
            if assembly.is_complete() {
                return Ok(PhaseEnd::Complete);
            }

            let Some(message) = self.recv_until(Instant::now() + timeout).await? else {
                return Ok(PhaseEnd::TimedOut);
            };

            match message {
                Message::Data(packet) => {
                    record(assembly, packet, stats);
                    if stats.packets_received % 100 == 0 {
                        debug!(
                            "진행률: {}/{} packets ({:.1}%)",
                            assembly.received(),
                            assembly.expected_total(),
                            assembly.received_ratio() * 100.0
                        );
                    }
                }
                Message::EndOfTransfer => {
                    debug!("서버 전송 종료 (FIN)");
                    return Ok(PhaseEnd::EndOfTransfer);
                }
                Message::NotFound => {
                    return Err(Error::FileNotFound(filename.to_string()));
                }
                Message::SessionNotFound if *restart_pending => {
                    debug!("재요청 처리 중, SessionNotFound 무시");
                }
                Message::SessionNotFound => {
                    return Ok(PhaseEnd::SessionLost);
                }
                Message::Metadata(metadata) if metadata == assembly.metadata() => {
                    *restart_pending = false;
                }
                Message::Metadata(metadata) => {
                    warn!("전송 중 메타데이터 변경 무시: {:?}", metadata);
                }
                _ => {}
            }
        }
    }

    /// 서버 세션이 사라진 경우 파일을 다시 요청
    async fn restart(&mut self, filename: &str, stats: &mut TransferStats) -> Result<()> {
        let max_attempts = self.config.max_request_attempts.max(1);
        if stats.request_attempts >= max_attempts {
            return Err(Error::NoResponseFromServer {
                attempts: stats.request_attempts,
            });
        }

        warn!("서버 세션 없음, 파일 재요청: {:?}", filename);
        self.send(&Message::Request(filename.to_string())).await?;
        stats.request_attempts += 1;
        Ok(())
    }

    /// 누락 번호를 배치로 나눠 재전송 요청
    async fn request_resend(
        &self,
        missing: &[SequenceNumber],
        stats: &mut TransferStats,
    ) -> Result<()> {
        let batch_size = self.config.resend_batch_size.max(1);
        let interval = self.config.resend_batch_interval();

        for (i, batch) in missing.chunks(batch_size).enumerate() {
            if i > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            self.send(&Message::Resend(batch.to_vec())).await?;
            stats.resend_requests += 1;
        }

        stats.requested_packets += missing.len() as u64;
        Ok(())
    }

    /// 완료 알림 (응답을 기다리지 않음)
    async fn notify_complete(&self) {
        if let Err(e) = self.send(&Message::TransferComplete).await {
            warn!("완료 알림 전송 실패: {}", e);
        }
    }

    /// 서버에서 온 메시지 하나 수신, 기한이 지나면 None
    async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Message>> {
        loop {
            let received =
                tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;
            let (len, addr) = match received {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };

            if addr != self.server_addr {
                debug!("알 수 없는 송신자 무시: {}", addr);
                continue;
            }

            match Message::from_bytes(&self.buf[..len]) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => debug!("잘못된 데이터그램 무시: {}", e),
            }
        }
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.socket
            .send_to(&message.to_bytes(), self.server_addr)
            .await?;
        Ok(())
    }
}

fn record(assembly: &mut AssemblyBuffer, packet: DataPacket, stats: &mut TransferStats) {
    let len = packet.payload.len() as u64;
    match assembly.insert(packet) {
        Insert::New => {
            stats.packets_received += 1;
            stats.bytes_received += len;
        }
        Insert::Duplicate => stats.duplicate_packets += 1,
        Insert::Rejected => stats.dropped_packets += 1,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn test_config() -> Config {
        Config {
            initial_timeout_ms: 100,
            max_timeout_ms: 400,
            max_request_attempts: 2,
            resend_batch_interval_ms: 0,
            ..Config::default()
        }
    }

    /// 스크립트로 응답하는 가짜 서버
    struct FakeServer {
        socket: UdpSocket,
        client: Option<SocketAddr>,
    }

    impl FakeServer {
        async fn bind() -> Self {
            Self {
                socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
                client: None,
            }
        }

        fn addr(&self) -> SocketAddr {
            self.socket.local_addr().unwrap()
        }

        async fn recv(&mut self) -> Message {
            let mut buf = [0u8; 4096];
            let (len, addr) =
                tokio::time::timeout(Duration::from_secs(5), self.socket.recv_from(&mut buf))
                    .await
                    .unwrap()
                    .unwrap();
            self.client = Some(addr);
            Message::from_bytes(&buf[..len]).unwrap()
        }

        async fn send(&self, message: Message) {
            self.socket
                .send_to(&message.to_bytes(), self.client.unwrap())
                .await
                .unwrap();
        }

        async fn send_data(&self, seq: u32, total: u32) {
            self.send(Message::Data(DataPacket::new(seq, total, payload(seq))))
                .await;
        }
    }

    fn payload(seq: u32) -> Bytes {
        Bytes::from(vec![seq as u8; 10])
    }

    async fn client_for(server: &FakeServer, config: Config) -> FileClient {
        FileClient::connect(config, "127.0.0.1:0".parse().unwrap(), server.addr())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_completion_above_threshold() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        assert_eq!(server.recv().await, Message::Request("f".into()));
        server.send(Message::Metadata(Metadata::new(100, 1000))).await;
        for seq in (0..100).filter(|&seq| seq != 42) {
            server.send_data(seq, 100).await;
        }

        let fetched = fetch.await.unwrap().unwrap();
        assert_eq!(fetched.completion, Completion::Partial { missing: vec![42] });
        assert_eq!(fetched.data.len(), 990);
        assert!(!fetched.is_complete());
        assert_eq!(server.recv().await, Message::TransferComplete);
    }

    #[tokio::test]
    async fn test_resend_requested_below_threshold() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(100, 1000))).await;
        for seq in 0..90 {
            server.send_data(seq, 100).await;
        }

        // 타임아웃 후 누락된 10개를 한 번에 요청
        let missing: Vec<u32> = (90..100).collect();
        assert_eq!(server.recv().await, Message::Resend(missing.clone()));

        for seq in missing {
            server.send_data(seq, 100).await;
        }

        let fetched = fetch.await.unwrap().unwrap();
        assert!(fetched.is_complete());
        let expected: Vec<u8> = (0..100u32).flat_map(|seq| payload(seq).to_vec()).collect();
        assert_eq!(&fetched.data[..], &expected[..]);
        assert_eq!(fetched.stats.resend_rounds, 1);
        assert_eq!(server.recv().await, Message::TransferComplete);
    }

    #[tokio::test]
    async fn test_resend_batches_respect_batch_size() {
        let mut server = FakeServer::bind().await;
        let config = Config {
            resend_batch_size: 4,
            ..test_config()
        };
        let mut client = client_for(&server, config).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(10, 100))).await;
        server.send(Message::EndOfTransfer).await;

        assert_eq!(server.recv().await, Message::Resend(vec![0, 1, 2, 3]));
        assert_eq!(server.recv().await, Message::Resend(vec![4, 5, 6, 7]));
        assert_eq!(server.recv().await, Message::Resend(vec![8, 9]));

        for seq in 0..10 {
            server.send_data(seq, 10).await;
        }
        assert!(fetch.await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_duplicates_and_reordering() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(3, 25))).await;
        for seq in [2, 0, 2, 1, 0] {
            server.send_data(seq, 3).await;
        }

        let fetched = fetch.await.unwrap().unwrap();
        assert!(fetched.is_complete());
        assert_eq!(fetched.data.len(), 25);
        assert_eq!(&fetched.data[..10], &payload(0)[..]);
        assert_eq!(&fetched.data[20..], &payload(2)[..5]);
        assert_eq!(fetched.stats.packets_received, 3);
    }

    #[tokio::test]
    async fn test_not_found() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("missing").await });

        server.recv().await;
        server.send(Message::NotFound).await;

        assert!(matches!(
            fetch.await.unwrap(),
            Err(Error::FileNotFound(name)) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn test_handshake_exhausted() {
        let server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        assert!(matches!(
            client.fetch("f").await,
            Err(Error::NoResponseFromServer { attempts: 2 })
        ));
    }

    #[tokio::test]
    async fn test_handshake_retries_after_lost_metadata() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        // 첫 요청은 무시
        assert_eq!(server.recv().await, Message::Request("f".into()));
        assert_eq!(server.recv().await, Message::Request("f".into()));
        server.send(Message::Metadata(Metadata::new(1, 10))).await;
        server.send_data(0, 1).await;

        let fetched = fetch.await.unwrap().unwrap();
        assert_eq!(fetched.stats.request_attempts, 2);
        assert!(fetched.is_complete());
    }

    #[tokio::test]
    async fn test_no_data_received() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(5, 50))).await;

        assert!(matches!(fetch.await.unwrap(), Err(Error::NoDataReceived)));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("empty").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(0, 0))).await;

        let fetched = fetch.await.unwrap().unwrap();
        assert!(fetched.is_complete());
        assert!(fetched.data.is_empty());
    }

    #[tokio::test]
    async fn test_session_lost_triggers_new_request() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(2, 20))).await;
        server.send_data(0, 2).await;
        server.send(Message::EndOfTransfer).await;

        assert_eq!(server.recv().await, Message::Resend(vec![1]));
        server.send(Message::SessionNotFound).await;

        assert_eq!(server.recv().await, Message::Request("f".into()));
        server.send(Message::Metadata(Metadata::new(2, 20))).await;
        server.send_data(0, 2).await;
        server.send_data(1, 2).await;

        let fetched = fetch.await.unwrap().unwrap();
        assert!(fetched.is_complete());
        assert_eq!(fetched.stats.request_attempts, 2);
    }

    #[tokio::test]
    async fn test_session_lost_on_every_batch_requests_once() {
        let mut server = FakeServer::bind().await;
        let mut client = client_for(&server, test_config()).await;

        let fetch = tokio::spawn(async move { client.fetch("f").await });

        server.recv().await;
        server.send(Message::Metadata(Metadata::new(300, 3000))).await;
        server.send_data(0, 300).await;
        server.send(Message::EndOfTransfer).await;

        // 누락 299개 → 50개씩 6개 배치, 모두 SessionNotFound로 응답
        let mut batches = 0;
        let mut requested = 0;
        while batches < 6 {
            match server.recv().await {
                Message::Resend(seqs) => {
                    batches += 1;
                    requested += seqs.len();
                    server.send(Message::SessionNotFound).await;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(requested, 299);

        // 재요청은 한 번만
        assert_eq!(server.recv().await, Message::Request("f".into()));
        server.send(Message::Metadata(Metadata::new(300, 3000))).await;
        for seq in 0..300 {
            server.send_data(seq, 300).await;
            if seq % 50 == 49 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        let fetched = fetch.await.unwrap().unwrap();
        assert!(fetched.is_complete());
        assert_eq!(fetched.data.len(), 3000);
        assert_eq!(fetched.stats.request_attempts, 2);
        assert_eq!(server.recv().await, Message::TransferComplete);
    }
}
