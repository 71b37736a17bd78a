use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ReceiverConfig;
use crate::landmark::{LandmarkSnapshot, LandmarkStore};
use crate::protocol::decode_frames;

/// 停止フラグを確認する間隔（受信タイムアウト）
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 受信エラー後の待ち時間
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);
/// バインド失敗時の再試行間隔
const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(200);
const JOIN_POLL: Duration = Duration::from_millis(2);

/// 受信スレッドのカウンタ
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    frames: AtomicU64,
    decode_errors: AtomicU64,
    recv_errors: AtomicU64,
    bind_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams: u64,
    pub frames: u64,
    pub decode_errors: u64,
    pub recv_errors: u64,
    pub bind_errors: u64,
}

impl ReceiverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            bind_errors: self.bind_errors.load(Ordering::Relaxed),
        }
    }
}

/// 別スレッドでUDPデータグラムを受信し、最新ランドマークをストアに公開する
///
/// 1データグラム = 1メッセージ。デコードできないデータグラムはログを出して捨て、
/// 受信は続ける。ポートが使用中ならスレッド内でバインドを再試行する。
pub struct LandmarkReceiver {
    store: Arc<LandmarkStore>,
    stats: Arc<ReceiverStats>,
    running: Arc<AtomicBool>,
    bound: Arc<Mutex<Option<SocketAddr>>>,
    join_timeout: Duration,
    handle: Option<thread::JoinHandle<()>>,
}

impl LandmarkReceiver {
    pub fn start(config: &ReceiverConfig) -> Result<Self> {
        let addr = config.addr();
        let store = Arc::new(LandmarkStore::new());
        let stats = Arc::new(ReceiverStats::default());
        let running = Arc::new(AtomicBool::new(true));
        let bound = Arc::new(Mutex::new(None));

        let socket = match bind_socket(&addr) {
            Ok(socket) => {
                let local_addr = socket.local_addr()?;
                *bound.lock() = Some(local_addr);
                log::info!("Landmark receiver listening on {}", local_addr);
                Some(socket)
            }
            Err(e) => {
                stats.bind_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Failed to bind UDP {}: {}, retrying every {:?}",
                    addr,
                    e,
                    BIND_RETRY_INTERVAL
                );
                None
            }
        };

        let store_ref = store.clone();
        let stats_ref = stats.clone();
        let running_ref = running.clone();
        let bound_ref = bound.clone();
        let buffer_size = config.buffer_size.max(1);

        let handle = thread::Builder::new()
            .name("landmark-receiver".to_string())
            .spawn(move || {
                let socket = match socket {
                    Some(socket) => socket,
                    None => match bind_with_retry(&addr, &stats_ref, &running_ref) {
                        Some(socket) => socket,
                        None => return,
                    },
                };
                if let Ok(local_addr) = socket.local_addr() {
                    *bound_ref.lock() = Some(local_addr);
                }
                receive_loop(socket, &store_ref, &stats_ref, &running_ref, buffer_size)
            })
            .context("Failed to spawn receiver thread")?;

        Ok(Self {
            store,
            stats,
            running,
            bound,
            join_timeout: Duration::from_millis(config.join_timeout_ms),
            handle: Some(handle),
        })
    }

    /// 実際にバインドしたアドレス。バインド再試行中は None
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }

    pub fn store(&self) -> &Arc<LandmarkStore> {
        &self.store
    }

    pub fn snapshot(&self) -> LandmarkSnapshot {
        self.store.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 受信スレッドを止める。何度呼んでもよい
    ///
    /// `join_timeout` 以内に終わらなければ警告を出してスレッドを切り離す。
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        self.wake();

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                log::warn!("Landmark receiver thread panicked");
            }
        } else {
            log::warn!(
                "Landmark receiver did not stop within {:?}, detaching",
                self.join_timeout
            );
        }
    }

    /// ブロック中の recv を空データグラムで起こす
    fn wake(&self) {
        // 未バインドなら再試行の待ちで止まる
        let Some(local_addr) = self.local_addr() else {
            return;
        };
        let target = match local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local_addr.port())
            }
            IpAddr::V6(ip) if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local_addr.port())
            }
            _ => local_addr,
        };
        let bind: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let result = UdpSocket::bind(bind).and_then(|s| s.send_to(&[], target));
        if let Err(e) = result {
            log::debug!("Wake datagram to {} failed: {}", target, e);
        }
    }
}

impl Drop for LandmarkReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_socket(addr: &str) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    Ok(socket)
}

/// バインドできるか停止されるまで再試行する
fn bind_with_retry(addr: &str, stats: &ReceiverStats, running: &AtomicBool) -> Option<UdpSocket> {
    while running.load(Ordering::Acquire) {
        thread::sleep(BIND_RETRY_INTERVAL);
        if !running.load(Ordering::Acquire) {
            break;
        }
        match bind_socket(addr) {
            Ok(socket) => {
                log::info!(
                    "Landmark receiver listening on {} after {} failed binds",
                    addr,
                    stats.bind_errors.load(Ordering::Relaxed)
                );
                return Some(socket);
            }
            Err(e) => {
                stats.bind_errors.fetch_add(1, Ordering::Relaxed);
                log::debug!("Bind {} failed: {}", addr, e);
            }
        }
    }
    log::info!("Landmark receiver stopped before binding {}", addr);
    None
}

fn receive_loop(
    socket: UdpSocket,
    store: &LandmarkStore,
    stats: &ReceiverStats,
    running: &AtomicBool,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];

    while running.load(Ordering::Acquire) {
        let (len, src) = match socket.recv_from(&mut buffer) {
            Ok(result) => result,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                // Windows では送信先不在の ICMP が ConnectionReset として返る
                stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("UDP recv error: {}", e);
                thread::sleep(RECV_ERROR_BACKOFF);
                continue;
            }
        };

        if !running.load(Ordering::Acquire) {
            break;
        }
        stats.datagrams.fetch_add(1, Ordering::Relaxed);

        match decode_frames(&buffer[..len]) {
            Ok(frames) => {
                for frame in frames {
                    let kind = frame.kind();
                    let count = frame.landmarks().len();
                    let version = store.publish(frame);
                    stats.frames.fetch_add(1, Ordering::Relaxed);
                    log::trace!("{} frame v{}: {} landmarks", kind.as_str(), version, count);
                }
            }
            Err(e) => {
                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dropping {} byte datagram from {}: {}", len, src, e);
            }
        }
    }

    log::info!("Landmark receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;
    use crate::retarget::t_pose;

    fn loopback_config() -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            ..ReceiverConfig::default()
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_binds_ephemeral_port() {
        let receiver = LandmarkReceiver::start(&loopback_config()).unwrap();
        assert_ne!(receiver.local_addr().unwrap().port(), 0);
        assert!(receiver.is_running());
        assert_eq!(receiver.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut receiver = LandmarkReceiver::start(&loopback_config()).unwrap();
        let started = Instant::now();
        receiver.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!receiver.is_running());
        receiver.stop();
    }

    #[test]
    fn test_busy_port_is_retried_until_free() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let config = ReceiverConfig {
            port,
            ..loopback_config()
        };

        let mut receiver = LandmarkReceiver::start(&config).unwrap();
        assert!(receiver.is_running());
        assert_eq!(receiver.local_addr(), None);
        assert!(receiver.stats().bind_errors >= 1);

        drop(holder);
        assert!(wait_until(|| receiver.local_addr().is_some()));
        let addr = receiver.local_addr().unwrap();
        assert_eq!(addr.port(), port);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let payload = Frame::Pose(t_pose()).encode().unwrap();
        sender.send_to(&payload, addr).unwrap();
        assert!(wait_until(|| receiver.snapshot().pose.version == 1));
        assert_eq!(receiver.snapshot().pose.landmarks.len(), 33);

        receiver.stop();
        assert!(!receiver.is_running());
    }

    #[test]
    fn test_stop_while_waiting_for_port() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = ReceiverConfig {
            port: holder.local_addr().unwrap().port(),
            ..loopback_config()
        };
        let mut receiver = LandmarkReceiver::start(&config).unwrap();

        let started = Instant::now();
        receiver.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!receiver.is_running());
        assert_eq!(receiver.local_addr(), None);
    }
}
