//! Background certificate-expiry watcher.
//!
//! Periodically sweeps all contexts of a [`MutualTlsManager`] and emits one
//! expiry-warning event per sweep per certificate inside the warning
//! threshold. Advisory only: the rotation scheduler owns triggering.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::tls::manager::MutualTlsManager;

/// Handle to the running expiry sweep task.
pub struct ExpiryWatcher {
    handle: JoinHandle<()>,
}

impl ExpiryWatcher {
    /// Start sweeping at the manager's configured interval.
    pub fn start(manager: Arc<MutualTlsManager>, interval: std::time::Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A missed sweep must not cause a burst of catch-up sweeps.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let warnings = manager.scan_expiring().await;
                if warnings > 0 {
                    tracing::debug!(warnings, "Certificate expiry sweep completed");
                }
            }
        });
        Self { handle }
    }

    /// Stop the sweep task.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ExpiryWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use crate::events::{EventBus, TrustEventKind};
    use crate::secrets::memory::MemorySecretStore;
    use std::time::Duration;

    #[tokio::test]
    async fn watcher_emits_warning_for_expiring_certificate() {
        let events = EventBus::new();
        let store = Arc::new(MemorySecretStore::new(events.clone()));
        let config = TlsConfig { certificate_ttl_hours: 24, ..TlsConfig::default() };
        let manager = MutualTlsManager::new(store, config, events.clone());

        manager.issue_and_store("tls/w", "w.internal", vec![]).await.unwrap();
        manager.create_context("w", Some("tls/w"), None, None).await.unwrap();

        let mut rx = events.subscribe();
        let watcher = ExpiryWatcher::start(manager, Duration::from_millis(20));

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.kind == TrustEventKind::CertificateExpiring {
                    return event;
                }
            }
        })
        .await
        .expect("expiry warning within the sweep interval");

        assert_eq!(event.subject, "w/server");
        watcher.stop();
    }
}
