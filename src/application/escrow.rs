use crate::domain::escrow::{Escrow, ProviderBalance, Withdrawal};
use crate::domain::ledger::{LedgerTx, retry_stale};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::LedgerStoreRef;
use crate::error::{Result, SettlementError};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Smallest amount a provider may withdraw in one request.
pub const MIN_WITHDRAWAL: Decimal = dec!(10);

/// Owns every escrow and provider-wallet write.
///
/// The transactional operations stage their writes into the caller's
/// `LedgerTx` so they land in the same commit as the project and payment
/// changes that caused them. Wallet queries and withdrawals run their own
/// transactions.
#[derive(Clone)]
pub struct EscrowManager {
    store: LedgerStoreRef,
}

impl EscrowManager {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LedgerStoreRef {
        &self.store
    }

    pub async fn create_escrow(
        &self,
        tx: &mut LedgerTx<'_>,
        project_id: Uuid,
        deposit_amount: Balance,
    ) -> Result<Escrow> {
        if let Some(existing) = tx.find_escrow_for_project(project_id).await? {
            return Err(SettlementError::AlreadyExists(format!(
                "escrow {} for project {}",
                existing.id, project_id
            )));
        }
        let mut escrow = Escrow::new(project_id, deposit_amount, Utc::now());
        tx.put_escrow(&mut escrow);
        Ok(escrow)
    }

    pub async fn credit(&self, tx: &mut LedgerTx<'_>, escrow_id: Uuid, amount: Amount) -> Result<Escrow> {
        let mut escrow = tx.escrow(escrow_id).await?;
        escrow.credit(amount, Utc::now())?;
        tx.put_escrow(&mut escrow);
        Ok(escrow)
    }

    /// Moves the whole escrow balance to the provider's wallet.
    pub async fn release(
        &self,
        tx: &mut LedgerTx<'_>,
        escrow_id: Uuid,
        provider_profile_id: Uuid,
    ) -> Result<Balance> {
        let now = Utc::now();
        let mut escrow = tx.escrow(escrow_id).await?;
        let released = escrow.release(now)?;
        tx.put_escrow(&mut escrow);

        let mut wallet = tx
            .provider_balance(provider_profile_id)
            .await?
            .unwrap_or_else(|| ProviderBalance::new(provider_profile_id, now));
        wallet.credit(released, now);
        tx.put_provider_balance(&mut wallet);

        tracing::info!(%escrow_id, %provider_profile_id, amount = %released, "escrow released");
        Ok(released)
    }

    pub async fn refund(&self, tx: &mut LedgerTx<'_>, escrow_id: Uuid) -> Result<Balance> {
        let mut escrow = tx.escrow(escrow_id).await?;
        let refunded = escrow.refund(Utc::now())?;
        tx.put_escrow(&mut escrow);

        tracing::info!(%escrow_id, amount = %refunded, "escrow refunded");
        Ok(refunded)
    }

    /// A provider that never had a release gets an empty wallet.
    pub async fn provider_balance(&self, provider_profile_id: Uuid) -> Result<ProviderBalance> {
        Ok(self
            .store
            .provider_balance(provider_profile_id)
            .await?
            .unwrap_or_else(|| ProviderBalance::new(provider_profile_id, Utc::now())))
    }

    pub async fn request_withdrawal(&self, provider_profile_id: Uuid, amount: Decimal) -> Result<Withdrawal> {
        let amount = Amount::new(amount)?;
        if amount.value() < MIN_WITHDRAWAL {
            return Err(SettlementError::BelowMinimum {
                minimum: MIN_WITHDRAWAL,
            });
        }

        let withdrawal = retry_stale("request_withdrawal", move || async move {
            let now = Utc::now();
            let mut tx = LedgerTx::begin(self.store.as_ref());
            let mut wallet = tx
                .provider_balance(provider_profile_id)
                .await?
                .unwrap_or_else(|| ProviderBalance::new(provider_profile_id, now));
            wallet.withdraw(amount, now)?;

            let mut withdrawal = Withdrawal::pending(provider_profile_id, amount, now);
            tx.put_provider_balance(&mut wallet);
            tx.put_withdrawal(&mut withdrawal);
            tx.commit().await?;
            Ok(withdrawal)
        })
        .await?;

        tracing::info!(
            withdrawal_id = %withdrawal.id,
            %provider_profile_id,
            amount = %withdrawal.amount,
            "withdrawal requested"
        );
        Ok(withdrawal)
    }

    pub async fn withdrawals(&self, provider_profile_id: Uuid) -> Result<Vec<Withdrawal>> {
        self.store.withdrawals_for_provider(provider_profile_id).await
    }

    /// Approves or rejects a pending withdrawal. Rejection returns the funds.
    pub async fn review_withdrawal(&self, withdrawal_id: Uuid, approve: bool) -> Result<Withdrawal> {
        let withdrawal = retry_stale("review_withdrawal", move || async move {
            let now = Utc::now();
            let mut tx = LedgerTx::begin(self.store.as_ref());
            let mut withdrawal = tx.withdrawal(withdrawal_id).await?;
            withdrawal.review(approve, now)?;

            if !approve {
                let mut wallet = tx
                    .provider_balance(withdrawal.provider_profile_id)
                    .await?
                    .ok_or_else(|| {
                        SettlementError::not_found("Provider balance", withdrawal.provider_profile_id)
                    })?;
                wallet.restore(withdrawal.amount, now);
                tx.put_provider_balance(&mut wallet);
            }

            tx.put_withdrawal(&mut withdrawal);
            tx.commit().await?;
            Ok(withdrawal)
        })
        .await?;

        tracing::info!(%withdrawal_id, status = ?withdrawal.status, "withdrawal reviewed");
        Ok(withdrawal)
    }
}
