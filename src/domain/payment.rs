use super::money::Amount;
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Full,
    Initial,
    Final,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    /// Money arrived after the escrow closed and must be returned by the provider.
    Refunded,
    Cancelled,
}

/// One payment attempt against a project.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub payer_id: Uuid,
    pub amount: Amount,
    pub currency: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    /// The provider's intent id; unique across all payments.
    pub external_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Payment {
    pub fn pending(
        project_id: Uuid,
        payer_id: Uuid,
        amount: Amount,
        currency: &str,
        payment_type: PaymentType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            project_id,
            payer_id,
            amount,
            currency: currency.to_lowercase(),
            payment_type,
            status: PaymentStatus::Pending,
            external_payment_id: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status != PaymentStatus::Pending
    }

    pub fn attach_external_id(&mut self, external_id: &str, now: DateTime<Utc>) -> Result<()> {
        match &self.external_payment_id {
            Some(existing) if existing == external_id => Ok(()),
            Some(existing) => Err(SettlementError::InvalidState(format!(
                "payment {} is already bound to intent {}",
                self.id, existing
            ))),
            None => {
                self.external_payment_id = Some(external_id.to_string());
                self.updated_at = now;
                Ok(())
            }
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.resolve(PaymentStatus::Completed, now)?;
        self.paid_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.resolve(PaymentStatus::Cancelled, now)
    }

    pub fn refund_late(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.resolve(PaymentStatus::Refunded, now)?;
        self.paid_at = Some(now);
        Ok(())
    }

    fn resolve(&mut self, status: PaymentStatus, now: DateTime<Utc>) -> Result<()> {
        if self.is_resolved() {
            return Err(SettlementError::InvalidState(format!(
                "payment {} is already {:?}",
                self.id, self.status
            )));
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}

/// A verified, provider-independent payment outcome.
///
/// `payment_id` is the correlation id we attached to the intent metadata;
/// it lets an event be matched before the intent id has been stored.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PaymentEvent {
    Succeeded {
        external_id: String,
        payment_id: Option<Uuid>,
    },
    Failed {
        external_id: String,
        payment_id: Option<Uuid>,
    },
}

impl PaymentEvent {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Succeeded { external_id, .. } | Self::Failed { external_id, .. } => external_id,
        }
    }

    pub fn payment_id(&self) -> Option<Uuid> {
        match self {
            Self::Succeeded { payment_id, .. } | Self::Failed { payment_id, .. } => *payment_id,
        }
    }
}
