use crate::domain::payment::{Payment, PaymentType};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

/// One unresolved payment, as it appears in the reconciliation report.
#[derive(Debug, Serialize, PartialEq)]
pub struct PendingPaymentRow {
    pub payment_id: Uuid,
    pub project_id: Uuid,
    pub payer_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_type: PaymentType,
    /// Empty when the intent was never created (provider timeout).
    pub external_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub age_mins: i64,
}

impl PendingPaymentRow {
    pub fn new(payment: &Payment, now: DateTime<Utc>) -> Self {
        Self {
            payment_id: payment.id,
            project_id: payment.project_id,
            payer_id: payment.payer_id,
            amount: payment.amount.value(),
            currency: payment.currency.clone(),
            payment_type: payment.payment_type,
            external_payment_id: payment.external_payment_id.clone(),
            created_at: payment.created_at,
            age_mins: (now - payment.created_at).num_minutes(),
        }
    }
}

/// Writes `PENDING` payments that never resolved as CSV, header included.
pub struct PendingPaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PendingPaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
        Self { writer }
    }

    /// The header is written even when there is nothing to report.
    pub fn write_payments(&mut self, payments: &[Payment], now: DateTime<Utc>) -> Result<()> {
        self.writer.write_record([
            "payment_id",
            "project_id",
            "payer_id",
            "amount",
            "currency",
            "payment_type",
            "external_payment_id",
            "created_at",
            "age_mins",
        ])?;
        for payment in payments {
            self.writer.serialize(PendingPaymentRow::new(payment, now))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
