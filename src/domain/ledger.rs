use super::escrow::{Escrow, ProviderBalance, Withdrawal};
use super::payment::Payment;
use super::ports::{LedgerStore, LedgerWrite};
use super::project::Project;
use crate::error::{Result, SettlementError};
use std::future::Future;
use uuid::Uuid;

/// How many times a transition is re-evaluated after losing a write race.
pub const MAX_COMMIT_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Project,
    Escrow,
    Payment,
    ProviderBalance,
    Withdrawal,
}

/// The unit of work behind one state transition.
///
/// Reads see this transaction's own staged records first, then the
/// committed state of the store. Writes are staged and
/// applied together by `commit`; the version bump performed when a record is
/// staged is what lets the store detect that someone else committed in
/// between. Dropping a `LedgerTx` without committing discards its writes.
pub struct LedgerTx<'a> {
    store: &'a dyn LedgerStore,
    keys: Vec<(RecordKind, Uuid)>,
    writes: Vec<LedgerWrite>,
}

impl<'a> LedgerTx<'a> {
    pub fn begin(store: &'a dyn LedgerStore) -> Self {
        Self {
            store,
            keys: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub async fn project(&self, id: Uuid) -> Result<Project> {
        if let Some(LedgerWrite::Project(p)) = self.staged(RecordKind::Project, id) {
            return Ok(p.clone());
        }
        self.store
            .project(id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Project", id))
    }

    pub async fn escrow(&self, id: Uuid) -> Result<Escrow> {
        if let Some(LedgerWrite::Escrow(e)) = self.staged(RecordKind::Escrow, id) {
            return Ok(e.clone());
        }
        self.store
            .escrow(id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Escrow", id))
    }

    pub async fn escrow_for_project(&self, project_id: Uuid) -> Result<Escrow> {
        self.find_escrow_for_project(project_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Escrow for project", project_id))
    }

    pub async fn find_escrow_for_project(&self, project_id: Uuid) -> Result<Option<Escrow>> {
        let staged = self.writes.iter().find_map(|w| match w {
            LedgerWrite::Escrow(e) if e.project_id == project_id => Some(e.clone()),
            _ => None,
        });
        match staged {
            Some(escrow) => Ok(Some(escrow)),
            None => self.store.escrow_for_project(project_id).await,
        }
    }

    pub async fn payment(&self, id: Uuid) -> Result<Option<Payment>> {
        if let Some(LedgerWrite::Payment(p)) = self.staged(RecordKind::Payment, id) {
            return Ok(Some(p.clone()));
        }
        self.store.payment(id).await
    }

    pub async fn payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        self.store.payment_by_external_id(external_id).await
    }

    pub async fn provider_balance(&self, provider_profile_id: Uuid) -> Result<Option<ProviderBalance>> {
        if let Some(LedgerWrite::ProviderBalance(w)) =
            self.staged(RecordKind::ProviderBalance, provider_profile_id)
        {
            return Ok(Some(w.clone()));
        }
        self.store.provider_balance(provider_profile_id).await
    }

    pub async fn withdrawal(&self, id: Uuid) -> Result<Withdrawal> {
        if let Some(LedgerWrite::Withdrawal(w)) = self.staged(RecordKind::Withdrawal, id) {
            return Ok(w.clone());
        }
        self.store
            .withdrawal(id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Withdrawal", id))
    }

    pub fn put_project(&mut self, project: &mut Project) {
        let key = (RecordKind::Project, project.id);
        self.bump(key, &mut project.version);
        self.stage(key, LedgerWrite::Project(project.clone()));
    }

    pub fn put_escrow(&mut self, escrow: &mut Escrow) {
        let key = (RecordKind::Escrow, escrow.id);
        self.bump(key, &mut escrow.version);
        self.stage(key, LedgerWrite::Escrow(escrow.clone()));
    }

    pub fn put_payment(&mut self, payment: &mut Payment) {
        let key = (RecordKind::Payment, payment.id);
        self.bump(key, &mut payment.version);
        self.stage(key, LedgerWrite::Payment(payment.clone()));
    }

    pub fn put_provider_balance(&mut self, wallet: &mut ProviderBalance) {
        let key = (RecordKind::ProviderBalance, wallet.provider_profile_id);
        self.bump(key, &mut wallet.version);
        self.stage(key, LedgerWrite::ProviderBalance(wallet.clone()));
    }

    pub fn put_withdrawal(&mut self, withdrawal: &mut Withdrawal) {
        let key = (RecordKind::Withdrawal, withdrawal.id);
        self.bump(key, &mut withdrawal.version);
        self.stage(key, LedgerWrite::Withdrawal(withdrawal.clone()));
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.store.commit(self.writes).await
    }

    fn staged(&self, kind: RecordKind, id: Uuid) -> Option<&LedgerWrite> {
        self.keys
            .iter()
            .position(|k| *k == (kind, id))
            .map(|pos| &self.writes[pos])
    }

    // A record staged twice in one transaction is bumped only once.
    fn bump(&self, key: (RecordKind, Uuid), version: &mut u64) {
        if !self.keys.contains(&key) {
            *version += 1;
        }
    }

    fn stage(&mut self, key: (RecordKind, Uuid), write: LedgerWrite) {
        if let Some(pos) = self.keys.iter().position(|k| *k == key) {
            self.writes[pos] = write;
        } else {
            self.keys.push(key);
            self.writes.push(write);
        }
    }
}

/// Runs `attempt` until it commits or fails with something other than a stale write.
pub async fn retry_stale<T, F, Fut>(operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(SettlementError::StaleWrite(record)) if tries < MAX_COMMIT_ATTEMPTS => {
                tracing::debug!(operation, %record, tries, "stale write, re-reading ledger");
            }
            other => return other,
        }
    }
}
