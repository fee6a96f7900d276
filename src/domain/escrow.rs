use super::money::{Amount, Balance};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Holding,
    Released,
    Refunded,
}

/// Funds held for a single project until release or refund.
///
/// `balance + released_amount + refunded_amount` always equals the sum of
/// the project's completed payments.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Escrow {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Snapshot of the project's total price at creation.
    pub deposit_amount: Balance,
    pub balance: Balance,
    pub status: EscrowStatus,
    pub released_amount: Balance,
    pub refunded_amount: Balance,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Escrow {
    /// Opens an escrow with a zero balance. Funds arrive only through `credit`.
    pub fn new(project_id: Uuid, deposit_amount: Balance, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            project_id,
            deposit_amount,
            balance: Balance::ZERO,
            status: EscrowStatus::Holding,
            released_amount: Balance::ZERO,
            refunded_amount: Balance::ZERO,
            released_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_holding(&self) -> bool {
        self.status == EscrowStatus::Holding
    }

    pub fn credit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        if !self.is_holding() {
            return Err(SettlementError::InvalidState(format!(
                "escrow {} is {:?} and cannot be credited",
                self.id, self.status
            )));
        }
        self.balance += amount.into();
        self.updated_at = now;
        Ok(())
    }

    /// Empties the escrow towards the provider and returns the amount moved.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<Balance> {
        if !self.is_holding() {
            return Err(SettlementError::AlreadyReleased);
        }
        let released = self.balance;
        self.released_amount += released;
        self.balance = Balance::ZERO;
        self.status = EscrowStatus::Released;
        self.released_at = Some(now);
        self.updated_at = now;
        Ok(released)
    }

    /// Empties the escrow back to the client and returns the amount moved.
    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<Balance> {
        match self.status {
            EscrowStatus::Holding => {}
            EscrowStatus::Released => return Err(SettlementError::AlreadyReleased),
            EscrowStatus::Refunded => {
                return Err(SettlementError::InvalidState(format!(
                    "escrow {} was already refunded",
                    self.id
                )));
            }
        }
        let refunded = self.balance;
        self.refunded_amount += refunded;
        self.balance = Balance::ZERO;
        self.status = EscrowStatus::Refunded;
        self.updated_at = now;
        Ok(refunded)
    }
}

/// A provider's earnings wallet, credited by escrow releases.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBalance {
    pub provider_profile_id: Uuid,
    pub available: Balance,
    pub total_earned: Balance,
    pub total_withdrawn: Balance,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl ProviderBalance {
    pub fn new(provider_profile_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            provider_profile_id,
            available: Balance::ZERO,
            total_earned: Balance::ZERO,
            total_withdrawn: Balance::ZERO,
            updated_at: now,
            version: 0,
        }
    }

    pub fn credit(&mut self, amount: Balance, now: DateTime<Utc>) {
        self.available += amount;
        self.total_earned += amount;
        self.updated_at = now;
    }

    /// Returns a rejected withdrawal to the available balance.
    pub fn restore(&mut self, amount: Amount, now: DateTime<Utc>) {
        let restored: Balance = amount.into();
        self.available += restored;
        self.total_withdrawn -= restored;
        self.updated_at = now;
    }

    pub fn withdraw(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        let requested: Balance = amount.into();
        if requested > self.available {
            return Err(SettlementError::InsufficientFunds {
                requested: requested.value(),
                available: self.available.value(),
            });
        }
        self.available -= requested;
        self.total_withdrawn += requested;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Waiting for manual review; no payout has been triggered.
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: Uuid,
    pub provider_profile_id: Uuid,
    pub amount: Amount,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Withdrawal {
    pub fn pending(provider_profile_id: Uuid, amount: Amount, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider_profile_id,
            amount,
            status: WithdrawalStatus::Pending,
            requested_at: now,
            reviewed_at: None,
            version: 0,
        }
    }

    pub fn review(&mut self, approve: bool, now: DateTime<Utc>) -> Result<()> {
        if self.status != WithdrawalStatus::Pending {
            return Err(SettlementError::InvalidState(format!(
                "withdrawal {} was already reviewed",
                self.id
            )));
        }
        self.status = if approve {
            WithdrawalStatus::Approved
        } else {
            WithdrawalStatus::Rejected
        };
        self.reviewed_at = Some(now);
        Ok(())
    }
}
