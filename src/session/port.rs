//! Dynamic port allocation for ephemeral listeners.

use rand::Rng;
use tokio::net::TcpListener;

/// Probes a configured port range for a bindable port.
///
/// Allocation is probe-then-release: the port is bound to verify
/// availability and immediately dropped. Another process can grab it
/// between the probe and the real listener bind; that race is benign
/// because the listener bind surfaces its own error and the registry
/// fails the session cleanly.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    host: String,
    start_port: u16,
    range_size: u16,
}

/// Bounds of the degraded-mode fallback range.
const FALLBACK_LOW: u16 = 9000;
const FALLBACK_HIGH: u16 = 9999;

impl PortAllocator {
    /// Creates an allocator probing `range_size` ports from `start_port`.
    #[must_use]
    pub fn new(host: impl Into<String>, start_port: u16, range_size: u16) -> Self {
        Self {
            host: host.into(),
            start_port,
            range_size,
        }
    }

    /// Finds a bindable port.
    ///
    /// Probes `start_port..start_port + range_size` in order and returns
    /// the first port that binds. When the whole range is exhausted,
    /// falls back to a pseudo-random port in 9000-9999 without probing.
    /// The fallback is a degraded mode: the subsequent real bind may
    /// still fail, and the caller handles that.
    pub async fn allocate(&self) -> u16 {
        let end = self.start_port.saturating_add(self.range_size);
        for port in self.start_port..end {
            if self.probe(port).await {
                return port;
            }
        }

        let fallback = rand::rng().random_range(FALLBACK_LOW..=FALLBACK_HIGH);
        tracing::warn!(
            start_port = self.start_port,
            range_size = self.range_size,
            fallback,
            "port range exhausted, falling back to unprobed random port"
        );
        fallback
    }

    async fn probe(&self, port: u16) -> bool {
        TcpListener::bind((self.host.as_str(), port)).await.is_ok()
    }
}
