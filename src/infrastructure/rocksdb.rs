use super::{check_unique, check_version};
use crate::domain::escrow::{Escrow, ProviderBalance, Withdrawal};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{LedgerStore, LedgerWrite};
use crate::domain::project::Project;
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CF_PROJECTS: &str = "project";
pub const CF_ESCROWS: &str = "escrow";
pub const CF_PAYMENTS: &str = "payment";
pub const CF_PROVIDER_BALANCES: &str = "provider_balance";
pub const CF_WITHDRAWALS: &str = "withdrawal";
/// proposal id -> project id
pub const CF_PROJECT_BY_PROPOSAL: &str = "project_by_proposal";
/// project id -> escrow id
pub const CF_ESCROW_BY_PROJECT: &str = "escrow_by_project";
/// external payment id -> payment id
pub const CF_PAYMENT_BY_EXTERNAL_ID: &str = "payment_by_external_id";
/// project id ++ payment id -> ()
pub const CF_PAYMENTS_BY_PROJECT: &str = "payments_by_project";

const COLUMN_FAMILIES: [&str; 9] = [
    CF_PROJECTS,
    CF_ESCROWS,
    CF_PAYMENTS,
    CF_PROVIDER_BALANCES,
    CF_WITHDRAWALS,
    CF_PROJECT_BY_PROPOSAL,
    CF_ESCROW_BY_PROJECT,
    CF_PAYMENT_BY_EXTERNAL_ID,
    CF_PAYMENTS_BY_PROJECT,
];

/// A persistent ledger backed by RocksDB.
///
/// Each table and each unique index lives in its own column family.
/// Commits are serialized by `commit_lock`: the version and index checks
/// run under the lock and the whole batch is written with one `WriteBatch`,
/// so a commit is all-or-nothing even across a crash.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBLedgerStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBLedgerStore {
    /// Opens or creates a RocksDB instance at `path` with all ledger column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SettlementError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_id(&self, cf: &str, key: &[u8]) -> Result<Option<Uuid>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Uuid::from_slice(&bytes).map(Some).map_err(|e| {
                SettlementError::InternalError(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Corrupt index entry in {cf}: {e}"),
                )))
            }),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn put_json<T: Serialize>(&self, batch: &mut WriteBatch, cf: &str, key: &[u8], value: &T) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn validate(&self, writes: &[LedgerWrite]) -> Result<()> {
        let mut claimed = HashMap::new();
        for write in writes {
            match write {
                LedgerWrite::Project(p) => {
                    let stored: Option<Project> = self.get_json(CF_PROJECTS, p.id.as_bytes())?;
                    check_version("project", p.id, stored.map(|s| s.version), p.version)?;
                    let owner = self.get_id(CF_PROJECT_BY_PROPOSAL, p.accepted_proposal_id.as_bytes())?;
                    check_unique(
                        "project for proposal",
                        &p.accepted_proposal_id,
                        owner.as_ref(),
                        p.id,
                        &mut claimed,
                    )?;
                }
                LedgerWrite::Escrow(e) => {
                    let stored: Option<Escrow> = self.get_json(CF_ESCROWS, e.id.as_bytes())?;
                    check_version("escrow", e.id, stored.map(|s| s.version), e.version)?;
                    let owner = self.get_id(CF_ESCROW_BY_PROJECT, e.project_id.as_bytes())?;
                    check_unique("escrow for project", &e.project_id, owner.as_ref(), e.id, &mut claimed)?;
                }
                LedgerWrite::Payment(p) => {
                    let stored: Option<Payment> = self.get_json(CF_PAYMENTS, p.id.as_bytes())?;
                    check_version("payment", p.id, stored.map(|s| s.version), p.version)?;
                    if let Some(external_id) = &p.external_payment_id {
                        let owner = self.get_id(CF_PAYMENT_BY_EXTERNAL_ID, external_id.as_bytes())?;
                        check_unique(
                            "payment with external id",
                            external_id,
                            owner.as_ref(),
                            p.id,
                            &mut claimed,
                        )?;
                    }
                }
                LedgerWrite::ProviderBalance(w) => {
                    let stored: Option<ProviderBalance> =
                        self.get_json(CF_PROVIDER_BALANCES, w.provider_profile_id.as_bytes())?;
                    check_version(
                        "provider balance",
                        w.provider_profile_id,
                        stored.map(|s| s.version),
                        w.version,
                    )?;
                }
                LedgerWrite::Withdrawal(w) => {
                    let stored: Option<Withdrawal> = self.get_json(CF_WITHDRAWALS, w.id.as_bytes())?;
                    check_version("withdrawal", w.id, stored.map(|s| s.version), w.version)?;
                }
            }
        }
        Ok(())
    }

    fn stage(&self, batch: &mut WriteBatch, write: &LedgerWrite) -> Result<()> {
        match write {
            LedgerWrite::Project(p) => {
                self.put_json(batch, CF_PROJECTS, p.id.as_bytes(), p)?;
                batch.put_cf(
                    self.cf(CF_PROJECT_BY_PROPOSAL)?,
                    p.accepted_proposal_id.as_bytes(),
                    p.id.as_bytes(),
                );
            }
            LedgerWrite::Escrow(e) => {
                self.put_json(batch, CF_ESCROWS, e.id.as_bytes(), e)?;
                batch.put_cf(self.cf(CF_ESCROW_BY_PROJECT)?, e.project_id.as_bytes(), e.id.as_bytes());
            }
            LedgerWrite::Payment(p) => {
                self.put_json(batch, CF_PAYMENTS, p.id.as_bytes(), p)?;
                if let Some(external_id) = &p.external_payment_id {
                    batch.put_cf(
                        self.cf(CF_PAYMENT_BY_EXTERNAL_ID)?,
                        external_id.as_bytes(),
                        p.id.as_bytes(),
                    );
                }
                batch.put_cf(self.cf(CF_PAYMENTS_BY_PROJECT)?, project_payment_key(p.project_id, p.id), b"");
            }
            LedgerWrite::ProviderBalance(w) => {
                self.put_json(batch, CF_PROVIDER_BALANCES, w.provider_profile_id.as_bytes(), w)?;
            }
            LedgerWrite::Withdrawal(w) => {
                self.put_json(batch, CF_WITHDRAWALS, w.id.as_bytes(), w)?;
            }
        }
        Ok(())
    }
}

fn project_payment_key(project_id: Uuid, payment_id: Uuid) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(project_id.as_bytes());
    key[16..].copy_from_slice(payment_id.as_bytes());
    key
}

#[async_trait]
impl LedgerStore for RocksDBLedgerStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>> {
        self.get_json(CF_PROJECTS, id.as_bytes())
    }

    async fn project_by_proposal(&self, proposal_id: Uuid) -> Result<Option<Project>> {
        match self.get_id(CF_PROJECT_BY_PROPOSAL, proposal_id.as_bytes())? {
            Some(id) => self.get_json(CF_PROJECTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn escrow(&self, id: Uuid) -> Result<Option<Escrow>> {
        self.get_json(CF_ESCROWS, id.as_bytes())
    }

    async fn escrow_for_project(&self, project_id: Uuid) -> Result<Option<Escrow>> {
        match self.get_id(CF_ESCROW_BY_PROJECT, project_id.as_bytes())? {
            Some(id) => self.get_json(CF_ESCROWS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn payment(&self, id: Uuid) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, id.as_bytes())
    }

    async fn payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        match self.get_id(CF_PAYMENT_BY_EXTERNAL_ID, external_id.as_bytes())? {
            Some(id) => self.get_json(CF_PAYMENTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn payments_for_project(&self, project_id: Uuid) -> Result<Vec<Payment>> {
        let prefix: &[u8] = project_id.as_bytes();
        let index = self.cf(CF_PAYMENTS_BY_PROJECT)?;
        let mut payments = Vec::new();
        for item in self
            .db
            .iterator_cf(index, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(payment) = self.get_json(CF_PAYMENTS, &key[16..])? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }

    async fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        Ok(payments.into_iter().filter(|p| p.status == status).collect())
    }

    async fn provider_balance(&self, provider_profile_id: Uuid) -> Result<Option<ProviderBalance>> {
        self.get_json(CF_PROVIDER_BALANCES, provider_profile_id.as_bytes())
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>> {
        self.get_json(CF_WITHDRAWALS, id.as_bytes())
    }

    async fn withdrawals_for_provider(&self, provider_profile_id: Uuid) -> Result<Vec<Withdrawal>> {
        let withdrawals: Vec<Withdrawal> = self.scan(CF_WITHDRAWALS)?;
        Ok(withdrawals
            .into_iter()
            .filter(|w| w.provider_profile_id == provider_profile_id)
            .collect())
    }

    async fn commit(&self, writes: Vec<LedgerWrite>) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        self.validate(&writes)?;

        let mut batch = WriteBatch::default();
        for write in &writes {
            self.stage(&mut batch, write)?;
        }
        self.db.write(batch)?;
        Ok(())
    }
}
