//! Server configuration.

use std::time::Duration;

/// Tunables for the ingest server and its sessions.
///
/// The defaults match the deployed fleet: devices identify and log in within
/// a second, send at most a burst of ten readings, and are dropped after two
/// silent seconds.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port devices connect to.
    pub tcp_port: u16,
    /// HTTP port for the query surface.
    pub http_port: u16,
    /// Deadline for the 15 identity bytes, measured from accept.
    pub imei_deadline: Duration,
    /// Window for the login payload, measured from session creation.
    pub login_window: Duration,
    /// Longest gap between accepted readings before a session is dropped.
    pub idle_limit: Duration,
    /// Idle watchdog poll cadence.
    pub watchdog_period: Duration,
    /// Token bucket ceiling.
    pub bucket_ceiling: u64,
    /// One token is restored per refill period, up to the ceiling.
    pub bucket_refill: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_port: 1337,
            http_port: 1338,
            imei_deadline: Duration::from_secs(1),
            login_window: Duration::from_secs(1),
            idle_limit: Duration::from_secs(2),
            watchdog_period: Duration::from_millis(500),
            bucket_ceiling: 10,
            bucket_refill: Duration::from_millis(20),
        }
    }
}
