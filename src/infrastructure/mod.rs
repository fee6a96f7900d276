//! Adapters behind the domain ports: ledger stores, payment providers,
//! webhook signatures and notification sinks.

pub mod in_memory;
pub mod notifier;
pub mod provider;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod signature;

use crate::error::{Result, SettlementError};
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;

/// Checks that a staged record is exactly one version ahead of what is stored.
pub(crate) fn check_version(kind: &str, id: Uuid, stored: Option<u64>, staged: u64) -> Result<()> {
    let expected = stored.unwrap_or(0) + 1;
    if staged == expected {
        Ok(())
    } else {
        Err(SettlementError::StaleWrite(format!(
            "{kind} {id} (stored version {}, staged {staged})",
            stored.unwrap_or(0)
        )))
    }
}

/// Checks a unique index entry against the stored owner and the rest of the batch.
pub(crate) fn check_unique<K: Display + ?Sized>(
    index: &str,
    key: &K,
    owner: Option<&Uuid>,
    id: Uuid,
    claimed: &mut HashMap<String, Uuid>,
) -> Result<()> {
    let taken = |other: &Uuid| *other != id;
    if owner.is_some_and(taken) {
        return Err(SettlementError::AlreadyExists(format!("{index} {key}")));
    }
    let entry = claimed.entry(format!("{index}:{key}")).or_insert(id);
    if taken(&*entry) {
        return Err(SettlementError::AlreadyExists(format!("{index} {key}")));
    }
    Ok(())
}
