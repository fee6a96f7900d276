use super::money::{Amount, Balance};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    PendingPayment,
    InProgress,
    /// Delivered by the provider, awaiting client confirmation.
    Completed,
    Confirmed,
    Cancelled,
}

impl ProjectStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

/// Outcome of a user action on a project.
///
/// `Unchanged` means the project was already in the action's target state,
/// so repeat calls succeed without side effects.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Transition {
    Applied,
    Unchanged,
}

/// One engagement between a client and a provider profile, created from
/// exactly one accepted proposal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_profile_id: Uuid,
    pub accepted_proposal_id: Uuid,
    pub status: ProjectStatus,
    /// Fixed at creation.
    pub total_price: Balance,
    /// Only grows, and only through verified payments.
    pub paid_amount: Balance,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Project {
    pub fn new(
        accepted_proposal_id: Uuid,
        client_id: Uuid,
        provider_profile_id: Uuid,
        total_price: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            client_id,
            provider_profile_id,
            accepted_proposal_id,
            status: ProjectStatus::PendingPayment,
            total_price: total_price.into(),
            paid_amount: Balance::ZERO,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_client(&self, user_id: Uuid) -> bool {
        self.client_id == user_id
    }

    pub fn is_provider(&self, provider_profile_id: Uuid) -> bool {
        self.provider_profile_id == provider_profile_id
    }

    /// What is still owed before the project can start.
    pub fn outstanding(&self) -> Balance {
        if self.paid_amount >= self.total_price {
            Balance::ZERO
        } else {
            self.total_price - self.paid_amount
        }
    }

    /// Adds a verified payment to `paid_amount`.
    ///
    /// Returns `true` when this payment is the one that moved the project
    /// from `PendingPayment` to `InProgress`.
    pub fn record_payment(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<bool> {
        if self.status.is_terminal() {
            return Err(SettlementError::InvalidState(format!(
                "project {} is {:?} and cannot take payments",
                self.id, self.status
            )));
        }

        self.paid_amount += amount.into();
        self.updated_at = now;

        if self.status == ProjectStatus::PendingPayment && self.paid_amount >= self.total_price {
            self.status = ProjectStatus::InProgress;
            self.started_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn mark_complete(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.status {
            ProjectStatus::Completed => Ok(Transition::Unchanged),
            ProjectStatus::InProgress => {
                self.status = ProjectStatus::Completed;
                self.completed_at = Some(now);
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            other => Err(self.invalid("mark complete", other)),
        }
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.status {
            ProjectStatus::Confirmed => Ok(Transition::Unchanged),
            ProjectStatus::Completed => {
                self.status = ProjectStatus::Confirmed;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            other => Err(self.invalid("confirm", other)),
        }
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.status {
            ProjectStatus::Cancelled => Ok(Transition::Unchanged),
            ProjectStatus::PendingPayment | ProjectStatus::InProgress => {
                self.status = ProjectStatus::Cancelled;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            other => Err(self.invalid("cancel", other)),
        }
    }

    fn invalid(&self, action: &str, status: ProjectStatus) -> SettlementError {
        SettlementError::InvalidState(format!(
            "cannot {} project {} while {:?}",
            action, self.id, status
        ))
    }
}
