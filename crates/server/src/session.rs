//! Per-connection session lifecycle.
//!
//! A session walks one device connection through identity ingest, the login
//! gate, and reading streaming. Every exit path funnels through a single
//! terminal transition: the caller deregisters the session and drops the
//! transport, which closes the socket without ever writing to it.

use std::io;
use std::sync::Arc;

use thermomatic_core::{imei, Error, Reading, Result, IMEI_LENGTH, LOGIN, READING_LENGTH};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::ratelimit::TokenBucket;

/// State published by the read loop and observed by the idle watchdog and
/// the HTTP surface. One lock guards both fields so a reading is always seen
/// whole, never torn mid-update.
#[derive(Debug, Clone, Copy)]
struct Published {
    last_read_at: Instant,
    last_reading: Reading,
}

/// Cloneable view of a live session. This is what the device registry stores
/// and what the query surface reads; none of its methods block the session
/// for more than a lock handoff.
#[derive(Clone)]
pub struct SessionHandle {
    imei: u64,
    published: Arc<Mutex<Published>>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// The device identity this session authenticated with.
    pub fn imei(&self) -> u64 {
        self.imei
    }

    /// Most recently published reading; the zero reading until the first
    /// frame is accepted.
    pub async fn last_reading(&self) -> Reading {
        self.published.lock().await.last_reading
    }

    /// Instant of the last accepted reading (session creation time before
    /// the first one).
    pub async fn last_read_at(&self) -> Instant {
        self.published.lock().await.last_read_at
    }

    /// Signals the session to terminate. Idempotent; returns immediately,
    /// the session task performs its own cleanup.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub(crate) fn detached(imei: u64) -> Self {
        Self {
            imei,
            published: Arc::new(Mutex::new(Published {
                last_read_at: Instant::now(),
                last_reading: Reading::default(),
            })),
            cancel: CancellationToken::new(),
        }
    }
}

/// A device connection past identity ingest.
///
/// Generic over the transport so tests can drive it with in-memory pipes;
/// the acceptor instantiates it with a `TcpStream`.
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    imei: u64,
    created_at: Instant,
    published: Arc<Mutex<Published>>,
    bucket: TokenBucket,
    cancel: CancellationToken,
    term_tx: mpsc::Sender<Error>,
    term_rx: mpsc::Receiver<Error>,
    config: ServerConfig,
}

impl<T> Session<T>
where
    T: AsyncRead + Unpin + Send,
{
    /// Reads and decodes the 15 identity bytes under the configured
    /// deadline. On success the session's IMEI is committed; the caller must
    /// pass the registry gate before driving [`Session::process_login`].
    pub async fn new(
        mut transport: T,
        cancel: CancellationToken,
        config: ServerConfig,
    ) -> Result<Self> {
        let created_at = Instant::now();

        let mut identity = [0u8; IMEI_LENGTH];
        let deadline = created_at + config.imei_deadline;
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            read = tokio::time::timeout_at(deadline, transport.read_exact(&mut identity)) => {
                match read {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(Error::Transport(e)),
                    Err(_) => {
                        return Err(Error::Transport(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "identity read deadline elapsed",
                        )))
                    }
                }
            }
        }

        let imei = imei::decode(&identity)?;
        info!("[imei {imei}] connection established");

        let (term_tx, term_rx) = mpsc::channel(4);
        Ok(Self {
            transport,
            imei,
            created_at,
            published: Arc::new(Mutex::new(Published {
                last_read_at: created_at,
                last_reading: Reading::default(),
            })),
            bucket: TokenBucket::new(config.bucket_ceiling, config.bucket_refill),
            cancel,
            term_tx,
            term_rx,
            config,
        })
    }

    /// The device identity this session authenticated with.
    pub fn imei(&self) -> u64 {
        self.imei
    }

    /// Cloneable handle for the registry and the query surface.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            imei: self.imei,
            published: Arc::clone(&self.published),
            cancel: self.cancel.clone(),
        }
    }

    /// Signals the session to terminate. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Drives the login gate: exactly five bytes equal to `login`, arriving
    /// within the window measured from session creation.
    pub async fn process_login(&mut self) -> Result<()> {
        let deadline = self.created_at + self.config.login_window;
        let mut buf = [0u8; LOGIN.len()];

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            res = tokio::time::timeout_at(deadline, read_login(&mut self.transport, &mut buf)) => res,
        };

        match outcome {
            Err(_) => {
                warn!("[imei {}] login window expired", self.imei);
                Err(Error::LoginExpired)
            }
            Ok(Err(e)) => Err(Error::Transport(e)),
            Ok(Ok(())) if buf == *LOGIN => {
                info!("[imei {}] logged in", self.imei);
                Ok(())
            }
            Ok(Ok(())) => Err(Error::LoginUnauthorized),
        }
    }

    /// Streams reading frames until cancellation, an idle timeout, or a
    /// transport failure.
    ///
    /// Each iteration waits for a token, reads one 40-byte frame, consumes a
    /// token, and decodes in place. An accepted frame is published and
    /// logged; a frame failing range validation is logged and dropped
    /// without tearing the session down.
    pub async fn process_readings(&mut self) -> Result<()> {
        let watchdog = self.spawn_watchdog();
        let result = self.read_loop().await;
        watchdog.abort();
        self.bucket.stop();
        result
    }

    async fn read_loop(&mut self) -> Result<()> {
        // The scratch frame and reading are reused across iterations; the
        // hot path performs no allocation.
        let mut frame = [0u8; READING_LENGTH];
        let mut reading = Reading::default();

        loop {
            if !self.bucket.acquire(&self.cancel).await {
                return Err(Error::Cancelled);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                reason = self.term_rx.recv() => {
                    return Err(reason.unwrap_or(Error::Cancelled));
                }
                read = self.transport.read_exact(&mut frame) => {
                    if let Err(e) = read {
                        return Err(Error::Transport(e));
                    }
                    if !self.bucket.try_consume() {
                        continue;
                    }
                    match reading.decode(&frame) {
                        Ok(()) => {
                            self.publish(reading).await;
                            info!("[imei {}] reading {}", self.imei, reading);
                        }
                        Err(err) => {
                            warn!("[imei {}] dropped frame: {}", self.imei, err);
                        }
                    }
                }
            }
        }
    }

    async fn publish(&self, reading: Reading) {
        let mut published = self.published.lock().await;
        published.last_read_at = Instant::now();
        published.last_reading = reading;
    }

    /// Arms the idle watchdog: polls the publication timestamp and requests
    /// termination once the idle limit is exceeded. Armed only while
    /// streaming; never during the login phase.
    fn spawn_watchdog(&self) -> tokio::task::JoinHandle<()> {
        let published = Arc::clone(&self.published);
        let term_tx = self.term_tx.clone();
        let cancel = self.cancel.clone();
        let idle_limit = self.config.idle_limit;
        let period = self.config.watchdog_period;
        let imei = self.imei;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let last_read_at = published.lock().await.last_read_at;
                        if last_read_at.elapsed() > idle_limit {
                            warn!("[imei {imei}] no readings for {idle_limit:?}, closing");
                            let _ = term_tx.send(Error::IdleTimeout).await;
                            return;
                        }
                    }
                }
            }
        })
    }
}

/// Reads the five login bytes. On EOF the peer can send nothing more, so
/// the call parks and lets the login window decide the outcome.
async fn read_login<T>(transport: &mut T, buf: &mut [u8; LOGIN.len()]) -> io::Result<()>
where
    T: AsyncRead + Unpin,
{
    match transport.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => std::future::pending().await,
        Err(e) => Err(e),
    }
}
