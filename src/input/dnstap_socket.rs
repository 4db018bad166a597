//! Dnstap unix-domain-socket intake (§4.4/§5.1): a single-threaded
//! cooperative event loop, on its own OS thread, accepting concurrent
//! dnstap client connections. Each connection gets its own
//! [`FrameStreamCodec`] and receive buffer; a client disconnect closes only
//! its own handle. Shutdown is requested from another thread via a
//! `tokio::sync::Notify` wakeup, matching the original `uvw::AsyncHandle`
//! "stop the loop from outside" pattern.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dnstap_parser::{decode_chunk, FrameStreamCodec, FrameStreamEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{self, Result};
use crate::input::{InputSource, SharedSignals};

const READ_BUF_SIZE: usize = 16 * 1024;

pub struct DnstapSocketConfig {
    pub path: PathBuf,
}

pub struct DnstapSocket {
    config: DnstapSocketConfig,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    worker: Option<JoinHandle<()>>,
}

impl DnstapSocket {
    pub fn new(config: DnstapSocketConfig) -> Self {
        DnstapSocket {
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            worker: None,
        }
    }
}

async fn handle_connection(mut stream: tokio::net::UnixStream, signals: SharedSignals) {
    info!("dnstap client connected");
    let mut codec = FrameStreamCodec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "dnstap socket read error");
                break;
            }
        };

        match decode_chunk(&mut codec, &buf[..n]) {
            Ok(chunk) => {
                {
                    let mut signals = signals.lock().expect("signals mutex poisoned");
                    for message in chunk.messages {
                        signals.dnstap_signal.emit(&message);
                    }
                }
                for event in chunk.control {
                    if let FrameStreamEvent::ControlReady { content_types } = event {
                        let accept = FrameStreamCodec::encode_accept_frame(&content_types);
                        if let Err(e) = stream.write_all(&accept).await {
                            warn!(error = %e, "failed to write dnstap ACCEPT frame, closing connection");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "dnstap frame-stream session error, closing connection");
                break;
            }
        }
    }
    info!("dnstap client disconnected");
}

async fn accept_loop(listener: UnixListener, signals: SharedSignals, shutdown: Arc<Notify>) {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                let signals = Arc::clone(&signals);
                                tokio::task::spawn_local(handle_connection(stream, signals));
                            }
                            Err(e) => {
                                warn!(error = %e, "dnstap socket accept error");
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        debug!("dnstap socket io loop received shutdown notification");
                        break;
                    }
                }
            }
        })
        .await;
}

impl InputSource for DnstapSocket {
    fn start(&mut self, signals: SharedSignals) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Best-effort: a stale socket file from a previous unclean shutdown
        // must not prevent bind.
        let _ = std::fs::remove_file(&self.config.path);

        let path = self.config.path.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let running = Arc::clone(&self.running);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .map_err(|e| {
                error::IoSnafu {
                    context: "building dnstap socket io loop runtime".to_string(),
                    source: e,
                }
                .build()
            })?;

        let listener = runtime.block_on(async { UnixListener::bind(&path) }).map_err(|e| {
            error::CaptureOpenSnafu {
                iface: path.display().to_string(),
                message: e.to_string(),
            }
            .build()
        })?;

        self.running.store(true, Ordering::SeqCst);

        self.worker = Some(std::thread::spawn(move || {
            runtime.block_on(accept_loop(listener, signals, shutdown));
            running.store(false, Ordering::SeqCst);
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let _ = std::fs::remove_file(&self.config.path);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_running_before_start() {
        let source = DnstapSocket::new(DnstapSocketConfig {
            path: PathBuf::from("/tmp/netvisor-test-nonexistent.sock"),
        });
        assert!(!source.is_running());
    }

    #[test]
    fn stop_before_start_is_a_harmless_no_op() {
        let mut source = DnstapSocket::new(DnstapSocketConfig {
            path: PathBuf::from("/tmp/netvisor-test-nonexistent.sock"),
        });
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn start_and_stop_round_trip_on_a_temp_socket_path() {
        use std::sync::Mutex;

        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("dnstap.sock");

        let mut source = DnstapSocket::new(DnstapSocketConfig {
            path: sock_path.clone(),
        });
        let signals: SharedSignals = Arc::new(Mutex::new(crate::input::InputSignals::default()));
        source.start(signals).expect("socket should bind");
        assert!(source.is_running());
        assert!(sock_path.exists());

        source.stop();
        assert!(!source.is_running());
        assert!(!sock_path.exists());
    }
}
