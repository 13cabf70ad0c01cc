//! 디스패치 루프 (서버측)
//!
//! - 소켓 하나에서 데이터그램 수신
//! - 고정 크기 워커 풀로 전달 (큐가 가득 차면 수신 대기)
//! - 주기적으로 유휴 세션 정리

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::handler::SessionHandler;
use crate::session::SessionStore;
use crate::stats::ServerStats;
use crate::{Config, Error, Result};

/// 워커로 넘기는 작업 (데이터그램, 송신자 주소)
type Job = (Bytes, SocketAddr);

/// 파일 서버
pub struct Server {
    config: Config,
    socket: Arc<UdpSocket>,
    handler: Arc<SessionHandler>,
    shutdown: Notify,
}

impl Server {
    /// 소켓 바인딩
    pub async fn bind(config: Config, bind_addr: SocketAddr) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let sessions = Arc::new(SessionStore::new(config.session_ttl()));
        let handler = Arc::new(SessionHandler::new(
            config.clone(),
            socket.clone(),
            sessions,
            Arc::new(ServerStats::new()),
        ));

        info!(
            "RFT Server bound on {} (base dir: {:?}, session ttl: {:?})",
            socket.local_addr()?,
            config.base_dir,
            handler.sessions().ttl()
        );

        Ok(Self {
            config,
            socket,
            handler,
            shutdown: Notify::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.handler.sessions()
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        self.handler.stats()
    }

    /// 수신 루프 실행 (stop 호출 시 종료)
    pub async fn run(&self) -> Result<()> {
        let workers = self.config.workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.config.dispatch_queue_capacity.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));

        let handles: Vec<_> = (0..workers)
            .map(|id| tokio::spawn(worker(id, self.handler.clone(), job_rx.clone())))
            .collect();

        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buf = vec![0u8; self.config.recv_buffer_size];

        info!("Listening with {} workers", workers);

        let result = loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, addr)) => {
                            let job = (Bytes::copy_from_slice(&buf[..len]), addr);
                            if job_tx.send(job).await.is_err() {
                                break Err(Error::ChannelError);
                            }
                        }
                        Err(e) => {
                            warn!("수신 에러: {}", e);
                        }
                    }
                }
                _ = sweep.tick() => {
                    let evicted = self.sessions().sweep_expired();
                    if evicted > 0 {
                        ServerStats::add(&self.stats().sessions_expired, evicted as u64);
                        warn!("유휴 세션 {}개 정리 (남은 세션: {})", evicted, self.sessions().len());
                    }
                }
                _ = self.shutdown.notified() => {
                    break Ok(());
                }
            }
        };

        // 큐를 닫고 처리 중인 작업이 끝날 때까지 대기
        drop(job_tx);
        for handle in handles {
            let _ = handle.await;
        }

        info!("Server stopped: {}", self.stats().summary());
        result
    }

    /// 정지
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

async fn worker(id: usize, handler: Arc<SessionHandler>, jobs: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some((datagram, addr)) = job else {
            break;
        };

        if let Err(e) = handler.handle(&datagram, addr).await {
            warn!("메시지 처리 에러 ({}): {}", addr, e);
        }
    }

    debug!("워커 {} 종료", id);
}
