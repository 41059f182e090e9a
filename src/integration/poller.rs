//! Periodic refresh of loaded entries.

use super::registry::{EntryRegistry, LoadedEntry};
use crate::entities::ActionOutcome;
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Counts from one refresh round of a single entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub applied: usize,
    pub unavailable: usize,
}

impl PollSummary {
    pub fn all_ok(&self) -> bool {
        self.unavailable == 0
    }
}

/// Poll every entity of `loaded` once.
///
/// The controller serializes the exchanges, so this is one round-trip per
/// entity in whatever order the lock is granted.
pub async fn poll_once(loaded: &LoadedEntry) -> PollSummary {
    let entities = loaded.entities();
    let outcomes = join_all(entities.iter().map(|entity| entity.poll())).await;

    let mut summary = PollSummary::default();
    for outcome in outcomes {
        match outcome {
            ActionOutcome::Applied => summary.applied += 1,
            ActionOutcome::Unavailable => summary.unavailable += 1,
            ActionOutcome::Ignored => {}
        }
    }
    summary
}

/// Poll every loaded entry once. Entries run side by side, so a silent matrix
/// only delays its own entities.
pub async fn poll_all(registry: &EntryRegistry) -> Vec<(String, PollSummary)> {
    let loaded = registry.loaded();
    join_all(loaded.iter().map(|entry| async move {
        (entry.entry.entry_id.clone(), poll_once(entry).await)
    }))
    .await
}

/// Spawn a task that refreshes every loaded entry on `period` until `cancel`
/// fires.
pub fn spawn_poller(
    registry: Arc<EntryRegistry>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[Poll] Refreshing every {:?}", period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let round = tokio::select! {
                _ = cancel.cancelled() => break,
                round = poll_all(&registry) => round,
            };
            for (entry_id, summary) in round {
                if summary.all_ok() {
                    debug!("[Poll] {}: {} entities refreshed", entry_id, summary.applied);
                } else {
                    warn!(
                        "[Poll] {}: {} of {} entities unavailable",
                        entry_id,
                        summary.unavailable,
                        summary.applied + summary.unavailable
                    );
                }
            }
        }
        info!("[Poll] Stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Entity;
    use crate::error::Result;
    use crate::integration::ConfigEntry;
    use crate::matrix::commands;
    use crate::naming::NameMap;
    use crate::transport::{
        Connector, MemoryConnector, MemoryTransport, TcpConnector, Transport, fake_matrix,
    };
    use async_trait::async_trait;

    async fn loaded() -> (Arc<EntryRegistry>, Arc<LoadedEntry>, Arc<MemoryTransport>) {
        let sim = Arc::new(MemoryTransport::new());
        let connector = Arc::new(MemoryConnector::new(sim.clone()));
        let registry = Arc::new(EntryRegistry::new(connector, Duration::from_secs(1)));
        let loaded = registry
            .setup_entry(ConfigEntry::new("10.0.0.50", 4001, NameMap::default()))
            .await
            .unwrap();
        (registry, loaded, sim)
    }

    /// Routes each host to its own simulated matrix.
    struct TwoMatrices {
        silent: MemoryConnector,
        healthy: MemoryConnector,
    }

    #[async_trait]
    impl Connector for TwoMatrices {
        async fn connect(&self, url: &str, timeout: Duration) -> Result<Arc<dyn Transport>> {
            if url.contains("10.0.0.1:") {
                self.silent.connect(url, timeout).await
            } else {
                self.healthy.connect(url, timeout).await
            }
        }
    }

    #[tokio::test]
    async fn test_poll_once_refreshes_everything() {
        let (_registry, loaded, sim) = loaded().await;
        sim.set_route(3, 7);

        let summary = poll_once(&loaded).await;
        assert_eq!(
            summary,
            PollSummary {
                applied: 9,
                unavailable: 0
            }
        );
        assert_eq!(loaded.power.is_on(), Some(true));
        assert_eq!(
            loaded.select(3).unwrap().current_option().as_deref(),
            Some("Input 7")
        );
    }

    #[tokio::test]
    async fn test_poll_once_reports_unreachable_device() {
        let (_registry, loaded, sim) = loaded().await;
        sim.set_failing(true);

        let summary = poll_once(&loaded).await;
        assert_eq!(summary.unavailable, 9);
        assert!(!summary.all_ok());
        assert!(loaded.entities().iter().all(|e| !e.available()));
    }

    #[tokio::test]
    async fn test_tcp_poll_fits_short_timeout() {
        let url = fake_matrix(|command| {
            let routes: Vec<String> = (1..=8).map(|o| commands::route_line(o, o)).collect();
            let routes = routes.join("\r\n");
            match command {
                commands::STATUS => Some(format!("Power ON!\r\n{}\r\n", routes)),
                commands::VIDEO_STATUS => Some(format!("{}\r\n", routes)),
                _ => Some("Command Error!\r\n".to_string()),
            }
        })
        .await;
        let port: u16 = url.rsplit(':').next().unwrap().parse().unwrap();

        // Nine exchanges of at least one idle window each take longer than
        // one timeout in total.
        let registry = EntryRegistry::new(Arc::new(TcpConnector::new()), Duration::from_secs(1));
        let loaded = registry
            .setup_entry(ConfigEntry::new("127.0.0.1", port, NameMap::default()))
            .await
            .unwrap();

        let summary = poll_once(&loaded).await;
        assert_eq!(summary.unavailable, 0);
        assert_eq!(summary.applied, 9);
    }

    #[tokio::test]
    async fn test_silent_matrix_does_not_hold_up_others() {
        let silent = Arc::new(MemoryTransport::new());
        silent.set_latency(Duration::from_secs(60));
        let healthy = Arc::new(MemoryTransport::new());
        healthy.set_route(1, 4);

        let connector = Arc::new(TwoMatrices {
            silent: MemoryConnector::new(silent),
            healthy: MemoryConnector::new(healthy),
        });
        let registry = Arc::new(EntryRegistry::new(connector, Duration::from_millis(500)));
        // Sorted first, so a sequential round would wait on it.
        registry
            .setup_entry(ConfigEntry::new("10.0.0.1", 4001, NameMap::default()))
            .await
            .unwrap();
        let healthy_entry = registry
            .setup_entry(ConfigEntry::new("10.0.0.2", 4001, NameMap::default()))
            .await
            .unwrap();

        let round_registry = registry.clone();
        let round = tokio::spawn(async move { poll_all(&round_registry).await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            healthy_entry.select(1).unwrap().current_option().as_deref(),
            Some("Input 4")
        );
        assert!(!round.is_finished());
        round.abort();
    }

    #[tokio::test]
    async fn test_poller_runs_until_cancelled() {
        let (registry, loaded, sim) = loaded().await;
        sim.set_route(8, 2);

        let cancel = CancellationToken::new();
        let handle = spawn_poller(registry, Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(
            loaded.select(8).unwrap().current_option().as_deref(),
            Some("Input 2")
        );
        let sent = sim.sent_count();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sim.sent_count(), sent);
    }
}
