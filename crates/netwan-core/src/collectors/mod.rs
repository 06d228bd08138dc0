//! Collectors (C3) — per-class metric samplers. Each collector's `collect`
//! call carries its own hard timeout and never propagates an error past
//! this module: a failed collection becomes a degraded [`MetricSample`]
//! (`reachable=false`, no fresh metrics) rather than an error the scheduler
//! has to special-case.

mod cellular;
mod generic;
mod starlink;
mod wifi;

pub use cellular::CellularCollector;
pub use generic::GenericCollector;
pub use starlink::StarlinkCollector;
pub use wifi::WifiCollector;

use std::net::ToSocketAddrs;
use std::time::Duration;

use async_trait::async_trait;
use netwan_types::models::Member;
use netwan_types::models::MetricSample;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Must respect `timeout` and must not panic; any internal failure is
    /// folded into a degraded sample.
    async fn collect(&self, member: &Member, timeout: Duration) -> MetricSample;
}

/// TCP-connect reachability probe shared by the generic/LAN collector and
/// used as the Starlink collector's fallback path. `target` is a
/// `host:port` pair; DNS resolution and the connect attempt both count
/// against `timeout`.
pub async fn tcp_probe(target: &str, timeout: Duration) -> Option<Duration> {
    let target = target.to_string();
    let resolved = tokio::task::spawn_blocking(move || {
        target.to_socket_addrs().ok().and_then(|mut it| it.next())
    })
    .await
    .ok()
    .flatten()?;

    let started = std::time::Instant::now();
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(resolved)).await {
        Ok(Ok(_stream)) => Some(started.elapsed()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_probe_unreachable_address_times_out_quickly() {
        // TEST-NET-1, reserved for documentation, never routable.
        let result = tcp_probe("192.0.2.1:9", Duration::from_millis(200)).await;
        assert!(result.is_none());
    }
}
