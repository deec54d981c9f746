//! Per-class processing of pending platform records.

use std::future::Future;

use serde::de::DeserializeOwned;

use crate::blockchain::{DeployIntent, TransactionIntent};
use crate::error::{KmsError, KmsResult};
use crate::observability::metrics;
use crate::platform::types::raw_reference;
use crate::platform::{
    FailureReport, PendingDeploy, PendingTransaction, PendingWalletApproval, PlatformGateway,
    PlatformResult, RawRecord, RecordClass,
};

use super::{ClassReport, Scheduler};

impl Scheduler {
    pub(super) async fn process_deploys(&self) -> ClassReport {
        let fetched = self.platform.fetch_pending_deploys().await;
        self.drain(RecordClass::Deploy, fetched, |record: PendingDeploy| async move {
            self.builder.deploy(&DeployIntent::from(record)).await.map(|_| ())
        })
        .await
    }

    pub(super) async fn process_transactions(&self) -> ClassReport {
        let fetched = self.platform.fetch_pending_transactions().await;
        self.drain(RecordClass::Transaction, fetched, |record: PendingTransaction| async move {
            self.builder.submit(&TransactionIntent::from(record)).await.map(|_| ())
        })
        .await
    }

    pub(super) async fn process_approvals(&self) -> ClassReport {
        let fetched = self.platform.fetch_pending_wallet_approvals().await;
        self.drain(RecordClass::Wallet, fetched, |record: PendingWalletApproval| async move {
            self.registry.approve_wallet(&record).await.map(|_| ())
        })
        .await
    }

    /// Process one fetched batch. A fetch error skips the class; a record
    /// that fails to parse or to process is logged, counted and reported,
    /// and the batch continues.
    async fn drain<R, F, Fut>(
        &self,
        class: RecordClass,
        fetched: PlatformResult<Vec<RawRecord>>,
        mut process: F,
    ) -> ClassReport
    where
        R: DeserializeOwned,
        F: FnMut(R) -> Fut,
        Fut: Future<Output = KmsResult<()>>,
    {
        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(class = class.as_str(), error = %e, "Failed to fetch pending records");
                return ClassReport {
                    fetch_failed: true,
                    ..ClassReport::default()
                };
            }
        };

        let mut report = ClassReport::default();
        for raw in records {
            let reference_id = raw_reference(&raw, class);
            let result = match parse_record::<R>(class, raw) {
                Ok(record) => process(record).await,
                Err(e) => Err(e),
            };
            metrics::record_scheduler_record(class.as_str(), result.is_ok());

            let error = match result {
                Ok(()) => {
                    report.succeeded += 1;
                    continue;
                }
                Err(e) => e,
            };
            report.failed += 1;
            tracing::error!(
                class = class.as_str(),
                reference_id = reference_id.as_deref().unwrap_or("-"),
                error = %error,
                "Pending record failed"
            );
            match reference_id {
                Some(reference_id) if should_report(&error) => {
                    report_failure(self.platform.as_ref(), class, reference_id, &error).await;
                }
                _ => {}
            }
        }
        report
    }
}

fn parse_record<R: DeserializeOwned>(class: RecordClass, raw: RawRecord) -> KmsResult<R> {
    serde_json::from_value(raw)
        .map_err(|e| KmsError::Validation(format!("malformed {} record: {}", class.as_str(), e)))
}

/// Failures after a side effect already happened are not reported: the
/// broadcast went out, or the wallet exists and awaits pending-sync repair.
fn should_report(error: &KmsError) -> bool {
    !matches!(
        error,
        KmsError::AcknowledgeFailed { .. } | KmsError::WalletNotSynced { .. }
    )
}

async fn report_failure(
    platform: &dyn PlatformGateway,
    class: RecordClass,
    reference_id: String,
    error: &KmsError,
) {
    let report = FailureReport {
        reference_id,
        class,
        message: error.to_string(),
    };
    if let Err(e) = platform.report_failure(&report).await {
        tracing::warn!(
            reference_id = %report.reference_id,
            error = %e,
            "Failed to report record failure to platform"
        );
    }
}
