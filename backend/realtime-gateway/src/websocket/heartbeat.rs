/// Heartbeat / liveness monitor
///
/// Every interval, each registered connection is inspected once:
/// 1. If it did not answer the previous probe it is terminated and unregistered.
/// 2. Otherwise its liveness flag is cleared and a new probe is queued.
///
/// A connection is therefore evicted on the second sweep after its last pong. Probe
/// send failures leave the flag cleared, so they are handled by the next sweep too.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::registry::ConnectionRegistry;
use super::{ConnectionCleanup, Plane};
use crate::metrics;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

#[derive(Clone)]
pub struct HeartbeatMonitor {
    registry: ConnectionRegistry,
    interval: Duration,
    plane: Plane,
    cleanup: Option<Arc<dyn ConnectionCleanup>>,
}

impl HeartbeatMonitor {
    pub fn new(registry: ConnectionRegistry, interval: Duration, plane: Plane) -> Self {
        Self {
            registry,
            interval,
            plane,
            cleanup: None,
        }
    }

    /// Run extra per-connection cleanup (room memberships) on eviction
    pub fn with_cleanup(mut self, cleanup: Arc<dyn ConnectionCleanup>) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    /// Perform a single sweep over the current connections
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for connection in self.registry.snapshot().await {
            if !connection.take_alive() {
                tracing::warn!(
                    plane = self.plane.as_str(),
                    user_id = %connection.user_id(),
                    connection_id = %connection.id(),
                    "no pong since last sweep, terminating connection"
                );
                connection.terminate();
                self.registry.unregister(connection.id()).await;
                if let Some(cleanup) = &self.cleanup {
                    cleanup.on_disconnect(&connection).await;
                }
                metrics::record_eviction(self.plane);
                report.evicted += 1;
                continue;
            }

            if let Err(e) = connection.probe() {
                tracing::debug!(
                    plane = self.plane.as_str(),
                    connection_id = %connection.id(),
                    error = %e,
                    "probe send failed, will evict on next sweep"
                );
            }
            report.probed += 1;
        }

        report
    }

    /// Run sweeps on a fixed interval until a shutdown signal arrives
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so fresh connections get a full window.
            ticker.tick().await;

            tracing::info!(
                plane = self.plane.as_str(),
                interval_secs = self.interval.as_secs(),
                "heartbeat monitor started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!(plane = self.plane.as_str(), "heartbeat monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.sweep().await;
                        if report.evicted > 0 {
                            tracing::info!(
                                plane = self.plane.as_str(),
                                probed = report.probed,
                                evicted = report.evicted,
                                "heartbeat sweep complete"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::{Connection, OutboundFrame, UserId};

    fn monitor(registry: &ConnectionRegistry) -> HeartbeatMonitor {
        HeartbeatMonitor::new(registry.clone(), Duration::from_secs(30), Plane::Notification)
    }

    #[tokio::test]
    async fn test_silent_connection_evicted_on_second_sweep() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = Connection::new(UserId::parse("u1").unwrap());
        registry.register(conn.clone()).await;
        let monitor = monitor(&registry);

        let first = monitor.sweep().await;
        assert_eq!(first, SweepReport { probed: 1, evicted: 0 });
        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));
        assert_eq!(registry.total_connections().await, 1);

        let second = monitor.sweep().await;
        assert_eq!(second, SweepReport { probed: 0, evicted: 1 });
        assert_eq!(rx.recv().await, Some(OutboundFrame::Close));
        assert_eq!(registry.total_connections().await, 0);
    }

    #[tokio::test]
    async fn test_responsive_connection_survives() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = Connection::new(UserId::parse("u1").unwrap());
        registry.register(conn.clone()).await;
        let monitor = monitor(&registry);

        for _ in 0..5 {
            monitor.sweep().await;
            conn.mark_alive();
        }

        assert_eq!(registry.total_connections().await, 1);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_failed_probe_evicted_next_sweep() {
        let registry = ConnectionRegistry::new();
        let (conn, rx) = Connection::new(UserId::parse("u1").unwrap());
        registry.register(conn).await;
        drop(rx);
        let monitor = monitor(&registry);

        assert_eq!(monitor.sweep().await.evicted, 0);
        assert_eq!(monitor.sweep().await.evicted, 1);
        assert_eq!(registry.total_connections().await, 0);
    }

    #[tokio::test]
    async fn test_spawned_monitor_stops_on_shutdown() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = broadcast::channel(1);
        let handle = monitor(&registry).spawn(rx);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
