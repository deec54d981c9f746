//! Background drain of pending platform work.
//!
//! # Data Flow
//! ```text
//! every `interval_secs` (first tick after one interval):
//!     1. WalletRegistry::repair_pending_sync
//!     2. fetch_pending_deploys          → TransactionBuilder::deploy
//!     3. fetch_pending_transactions     → TransactionBuilder::submit
//!     4. fetch_pending_wallet_approvals → WalletRegistry::approve_wallet
//! ```
//!
//! # Design Decisions
//! - One owned task, stopped through the `Shutdown` broadcast
//! - No retry or backoff; failed records come back from the platform
//! - A failing class or record never stops the rest of the tick

mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::blockchain::TransactionBuilder;
use crate::config::SchedulerConfig;
use crate::platform::PlatformGateway;
use crate::wallet::{RepairReport, WalletRegistry};

/// Outcome for one record class within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassReport {
    pub succeeded: usize,
    pub failed: usize,
    /// The class was skipped because its fetch failed.
    pub fetch_failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub repair: RepairReport,
    pub deploys: ClassReport,
    pub transactions: ClassReport,
    pub approvals: ClassReport,
}

pub struct Scheduler {
    registry: Arc<WalletRegistry>,
    builder: Arc<TransactionBuilder>,
    platform: Arc<dyn PlatformGateway>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        registry: Arc<WalletRegistry>,
        builder: Arc<TransactionBuilder>,
        platform: Arc<dyn PlatformGateway>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            builder,
            platform,
            config,
        }
    }

    /// Start the poll loop. The task ends when `shutdown` fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Scheduler starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    tracing::debug!(?report, "Scheduler tick finished");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one full pass over pending work.
    pub async fn tick(&self) -> TickReport {
        let repair = match self.registry.repair_pending_sync().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Pending-sync repair failed");
                RepairReport::default()
            }
        };

        TickReport {
            repair,
            deploys: self.process_deploys().await,
            transactions: self.process_transactions().await,
            approvals: self.process_approvals().await,
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("enabled", &self.config.enabled)
            .field("interval_secs", &self.config.interval_secs)
            .finish()
    }
}
