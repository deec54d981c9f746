//! Wallet creation and lookup.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use super::types::{parse_wallet_id, PendingSync, RepairReport, Wallet};
use crate::error::{KmsError, KmsResult};
use crate::platform::{AddWalletRequest, PendingWalletApproval, PlatformGateway};
use crate::secrets::{SecretError, SecretStore};
use crate::signing::{Algorithm, WalletSigner};
use crate::store::{get_json, set_json, KeyValueStore};

pub const WALLET_NAMESPACE: &str = "wallet";
pub const NAME_INDEX_NAMESPACE: &str = "wallet_name";
pub const PENDING_SYNC_NAMESPACE: &str = "wallet_pending_sync";

/// Owns wallet records and keeps the platform informed of them.
pub struct WalletRegistry {
    store: Arc<dyn KeyValueStore>,
    secrets: Arc<dyn SecretStore>,
    platform: Arc<dyn PlatformGateway>,
}

impl WalletRegistry {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        secrets: Arc<dyn SecretStore>,
        platform: Arc<dyn PlatformGateway>,
    ) -> Self {
        Self {
            store,
            secrets,
            platform,
        }
    }

    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Create a wallet and its key pair, then register it with the platform.
    ///
    /// The wallet is kept even if registration fails; the error then carries
    /// its id and the next scheduler tick retries the registration.
    pub async fn create_wallet(&self, name: &str, algorithm: &str) -> KmsResult<Wallet> {
        let algorithm = algorithm
            .parse::<Algorithm>()
            .map_err(|_| KmsError::InvalidAlgorithm(algorithm.to_string()))?;
        self.create(name, algorithm, None).await
    }

    /// Materialize a wallet approved on the platform.
    ///
    /// Re-delivery of an approval whose name already exists re-announces the
    /// existing wallet instead of failing.
    pub async fn approve_wallet(&self, approval: &PendingWalletApproval) -> KmsResult<Wallet> {
        let algorithm = approval
            .algorithm
            .parse::<Algorithm>()
            .map_err(|_| KmsError::InvalidAlgorithm(approval.algorithm.clone()))?;

        if let Some(existing) = self.lookup_by_name(&approval.wallet_name)? {
            if existing.algorithm != algorithm {
                return Err(KmsError::Conflict(format!(
                    "wallet '{}' already exists as {}",
                    existing.name, existing.algorithm
                )));
            }
            tracing::info!(
                wallet_id = %existing.wallet_id,
                reference_id = %approval.unique_id,
                "Approval re-delivered for existing wallet, re-announcing"
            );
            let pending = PendingSync {
                reference_id: Some(approval.unique_id.clone()),
            };
            self.announce(&existing, &pending).await?;
            return Ok(existing);
        }

        self.create(&approval.wallet_name, algorithm, Some(approval.unique_id.clone()))
            .await
    }

    pub fn lookup(&self, wallet_id: Uuid) -> KmsResult<Wallet> {
        get_json::<Wallet>(self.store.as_ref(), WALLET_NAMESPACE, wallet_id.as_bytes())?
            .ok_or_else(|| KmsError::NotFound(wallet_id.to_string()))
    }

    /// Resolve a caller-supplied wallet id. The id acts as a bearer
    /// capability, so an unknown id is `Unauthorized` rather than `NotFound`.
    pub fn authorize(&self, raw_wallet_id: &str) -> KmsResult<Wallet> {
        let wallet_id = parse_wallet_id(raw_wallet_id)?;
        match self.lookup(wallet_id) {
            Err(KmsError::NotFound(_)) => Err(KmsError::Unauthorized(wallet_id)),
            other => other,
        }
    }

    /// Signer bound to `wallet` and this registry's secret backend.
    pub fn signer(&self, wallet: Wallet) -> WalletSigner {
        WalletSigner::new(wallet, self.secrets.clone())
    }

    pub fn lookup_by_name(&self, name: &str) -> KmsResult<Option<Wallet>> {
        let Some(id_bytes) = self.store.get(NAME_INDEX_NAMESPACE, name.as_bytes())? else {
            return Ok(None);
        };
        let wallet_id = Uuid::from_slice(&id_bytes).map_err(|e| crate::store::StoreError::Corrupt {
            namespace: NAME_INDEX_NAMESPACE.to_string(),
            message: e.to_string(),
        })?;
        match self.lookup(wallet_id) {
            Ok(wallet) => Ok(Some(wallet)),
            Err(KmsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Re-send registration for every wallet the platform has not acknowledged.
    pub async fn repair_pending_sync(&self) -> KmsResult<RepairReport> {
        let mut report = RepairReport::default();

        for key in self.store.keys(PENDING_SYNC_NAMESPACE)? {
            let Ok(wallet_id) = Uuid::from_slice(&key) else {
                tracing::warn!("Dropping malformed pending-sync marker");
                self.store.remove(PENDING_SYNC_NAMESPACE, &key)?;
                continue;
            };
            let pending: PendingSync =
                get_json(self.store.as_ref(), PENDING_SYNC_NAMESPACE, &key)?.unwrap_or_default();

            let wallet = match self.lookup(wallet_id) {
                Ok(wallet) => wallet,
                Err(KmsError::NotFound(_)) => {
                    self.store.remove(PENDING_SYNC_NAMESPACE, &key)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.announce(&wallet, &pending).await {
                Ok(()) => report.repaired += 1,
                Err(e) => {
                    tracing::warn!(wallet_id = %wallet_id, error = %e, "Wallet still not synced");
                    report.still_pending += 1;
                }
            }
        }

        if report.repaired > 0 || report.still_pending > 0 {
            tracing::info!(
                repaired = report.repaired,
                still_pending = report.still_pending,
                "Pending wallet sync pass finished"
            );
        }
        Ok(report)
    }

    async fn create(
        &self,
        name: &str,
        algorithm: Algorithm,
        reference_id: Option<String>,
    ) -> KmsResult<Wallet> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KmsError::Validation("wallet name must not be empty".into()));
        }

        match self.secrets.get_secret(name).await {
            Ok(_) => {
                return Err(KmsError::Conflict(format!(
                    "a secret named '{}' already exists",
                    name
                )))
            }
            Err(SecretError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let public_key = self.secrets.generate_key(name, algorithm).await?;
        let wallet = Wallet {
            wallet_id: self.fresh_wallet_id()?,
            name: name.to_string(),
            algorithm,
            address: public_key.address(),
            public_key: public_key.to_hex(),
            created_at: unix_now(),
        };

        let pending = PendingSync { reference_id };
        let store = self.store.as_ref();
        set_json(store, WALLET_NAMESPACE, wallet.wallet_id.as_bytes(), &wallet)?;
        store.set(NAME_INDEX_NAMESPACE, name.as_bytes(), wallet.wallet_id.as_bytes())?;
        set_json(store, PENDING_SYNC_NAMESPACE, wallet.wallet_id.as_bytes(), &pending)?;

        tracing::info!(
            wallet_id = %wallet.wallet_id,
            algorithm = %algorithm,
            backend = self.secrets.backend(),
            "Wallet created"
        );

        self.announce(&wallet, &pending).await?;
        Ok(wallet)
    }

    /// Notify the platform and clear the pending marker on success.
    async fn announce(&self, wallet: &Wallet, pending: &PendingSync) -> KmsResult<()> {
        let request = AddWalletRequest {
            wallet_id: wallet.wallet_id,
            address: wallet.platform_address(),
            name: wallet.name.clone(),
            algorithm: wallet.algorithm,
            reference_id: pending.reference_id.clone(),
        };

        if let Err(source) = self.platform.add_wallet(&request).await {
            // Keep (or restore) the marker so the repair pass picks it up.
            set_json(
                self.store.as_ref(),
                PENDING_SYNC_NAMESPACE,
                wallet.wallet_id.as_bytes(),
                pending,
            )?;
            return Err(KmsError::WalletNotSynced {
                wallet_id: wallet.wallet_id,
                source,
            });
        }

        self.store
            .remove(PENDING_SYNC_NAMESPACE, wallet.wallet_id.as_bytes())?;
        Ok(())
    }

    fn fresh_wallet_id(&self) -> KmsResult<Uuid> {
        loop {
            let id = Uuid::new_v4();
            if self.store.get(WALLET_NAMESPACE, id.as_bytes())?.is_none() {
                return Ok(id);
            }
        }
    }
}

impl std::fmt::Debug for WalletRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletRegistry")
            .field("secrets", &self.secrets.backend())
            .finish()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
