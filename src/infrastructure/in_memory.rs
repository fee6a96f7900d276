use super::{check_unique, check_version};
use crate::domain::escrow::{Escrow, ProviderBalance, Withdrawal};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{LedgerStore, LedgerWrite};
use crate::domain::project::Project;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    escrows: HashMap<Uuid, Escrow>,
    payments: HashMap<Uuid, Payment>,
    wallets: HashMap<Uuid, ProviderBalance>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    project_by_proposal: HashMap<Uuid, Uuid>,
    escrow_by_project: HashMap<Uuid, Uuid>,
    payment_by_external_id: HashMap<String, Uuid>,
}

impl Tables {
    fn validate(&self, writes: &[LedgerWrite]) -> Result<()> {
        let mut claimed: HashMap<String, Uuid> = HashMap::new();
        for write in writes {
            match write {
                LedgerWrite::Project(p) => {
                    check_version("project", p.id, self.projects.get(&p.id).map(|s| s.version), p.version)?;
                    check_unique(
                        "project for proposal",
                        &p.accepted_proposal_id,
                        self.project_by_proposal.get(&p.accepted_proposal_id),
                        p.id,
                        &mut claimed,
                    )?;
                }
                LedgerWrite::Escrow(e) => {
                    check_version("escrow", e.id, self.escrows.get(&e.id).map(|s| s.version), e.version)?;
                    check_unique(
                        "escrow for project",
                        &e.project_id,
                        self.escrow_by_project.get(&e.project_id),
                        e.id,
                        &mut claimed,
                    )?;
                }
                LedgerWrite::Payment(p) => {
                    check_version("payment", p.id, self.payments.get(&p.id).map(|s| s.version), p.version)?;
                    if let Some(external_id) = &p.external_payment_id {
                        check_unique(
                            "payment with external id",
                            external_id,
                            self.payment_by_external_id.get(external_id),
                            p.id,
                            &mut claimed,
                        )?;
                    }
                }
                LedgerWrite::ProviderBalance(w) => {
                    check_version(
                        "provider balance",
                        w.provider_profile_id,
                        self.wallets.get(&w.provider_profile_id).map(|s| s.version),
                        w.version,
                    )?;
                }
                LedgerWrite::Withdrawal(w) => {
                    check_version(
                        "withdrawal",
                        w.id,
                        self.withdrawals.get(&w.id).map(|s| s.version),
                        w.version,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: LedgerWrite) {
        match write {
            LedgerWrite::Project(p) => {
                self.project_by_proposal.insert(p.accepted_proposal_id, p.id);
                self.projects.insert(p.id, p);
            }
            LedgerWrite::Escrow(e) => {
                self.escrow_by_project.insert(e.project_id, e.id);
                self.escrows.insert(e.id, e);
            }
            LedgerWrite::Payment(p) => {
                if let Some(external_id) = &p.external_payment_id {
                    self.payment_by_external_id.insert(external_id.clone(), p.id);
                }
                self.payments.insert(p.id, p);
            }
            LedgerWrite::ProviderBalance(w) => {
                self.wallets.insert(w.provider_profile_id, w);
            }
            LedgerWrite::Withdrawal(w) => {
                self.withdrawals.insert(w.id, w);
            }
        }
    }
}

/// A thread-safe in-memory ledger.
///
/// All tables sit behind one `RwLock`, so a commit validates and applies
/// its whole batch while holding the write lock. Used for tests and for
/// running the service without the `storage-rocksdb` feature.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>> {
        let tables = self.tables.read().await;
        Ok(tables.projects.get(&id).cloned())
    }

    async fn project_by_proposal(&self, proposal_id: Uuid) -> Result<Option<Project>> {
        let tables = self.tables.read().await;
        Ok(tables
            .project_by_proposal
            .get(&proposal_id)
            .and_then(|id| tables.projects.get(id))
            .cloned())
    }

    async fn escrow(&self, id: Uuid) -> Result<Option<Escrow>> {
        let tables = self.tables.read().await;
        Ok(tables.escrows.get(&id).cloned())
    }

    async fn escrow_for_project(&self, project_id: Uuid) -> Result<Option<Escrow>> {
        let tables = self.tables.read().await;
        Ok(tables
            .escrow_by_project
            .get(&project_id)
            .and_then(|id| tables.escrows.get(id))
            .cloned())
    }

    async fn payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_by_external_id
            .get(external_id)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn payments_for_project(&self, project_id: Uuid) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.id);
        Ok(payments)
    }

    async fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.id);
        Ok(payments)
    }

    async fn provider_balance(&self, provider_profile_id: Uuid) -> Result<Option<ProviderBalance>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.get(&provider_profile_id).cloned())
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>> {
        let tables = self.tables.read().await;
        Ok(tables.withdrawals.get(&id).cloned())
    }

    async fn withdrawals_for_provider(&self, provider_profile_id: Uuid) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read().await;
        let mut withdrawals: Vec<Withdrawal> = tables
            .withdrawals
            .values()
            .filter(|w| w.provider_profile_id == provider_profile_id)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.id);
        Ok(withdrawals)
    }

    async fn commit(&self, writes: Vec<LedgerWrite>) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.validate(&writes)?;
        for write in writes {
            tables.apply(write);
        }
        Ok(())
    }
}
