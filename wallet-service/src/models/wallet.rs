//! Append-only teacher wallet transactions.

use super::month::Month;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What produced a wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    Accrual,
    Disbursement,
    Reversal,
}

impl WalletTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTransactionKind::Accrual => "accrual",
            WalletTransactionKind::Disbursement => "disbursement",
            WalletTransactionKind::Reversal => "reversal",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "accrual" => Some(WalletTransactionKind::Accrual),
            "disbursement" => Some(WalletTransactionKind::Disbursement),
            "reversal" => Some(WalletTransactionKind::Reversal),
            _ => None,
        }
    }
}

impl std::fmt::Display for WalletTransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signed wallet movement attributable to one ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub transaction_id: Uuid,
    pub teacher_id: Uuid,
    pub entry_id: Uuid,
    pub invoice_id: Uuid,
    pub kind: WalletTransactionKind,
    pub amount: Decimal,
    pub month: Option<Month>,
    pub created_utc: DateTime<Utc>,
}

/// A wallet movement that has not been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletDelta {
    pub kind: WalletTransactionKind,
    pub amount: Decimal,
    pub month: Option<Month>,
}

impl WalletDelta {
    /// `None` for a zero amount: nothing to record.
    pub fn new(kind: WalletTransactionKind, amount: Decimal, month: Option<Month>) -> Option<Self> {
        (!amount.is_zero()).then_some(Self {
            kind,
            amount,
            month,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WalletTransactionRow {
    pub transaction_id: Uuid,
    pub teacher_id: Uuid,
    pub entry_id: Uuid,
    pub invoice_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub month: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl TryFrom<WalletTransactionRow> for WalletTransaction {
    type Error = anyhow::Error;

    fn try_from(row: WalletTransactionRow) -> Result<Self, Self::Error> {
        let kind = WalletTransactionKind::from_string(&row.kind).ok_or_else(|| {
            anyhow::anyhow!(
                "Wallet transaction {} has unknown kind '{}'",
                row.transaction_id,
                row.kind
            )
        })?;
        let month = row
            .month
            .as_deref()
            .map(str::parse::<Month>)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Wallet transaction {}: {}", row.transaction_id, e))?;

        Ok(Self {
            transaction_id: row.transaction_id,
            teacher_id: row.teacher_id,
            entry_id: row.entry_id,
            invoice_id: row.invoice_id,
            kind,
            amount: row.amount,
            month,
            created_utc: row.created_utc,
        })
    }
}

/// Teacher balance with its supporting transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStatement {
    pub teacher_id: Uuid,
    pub balance: Decimal,
    pub transactions: Vec<WalletTransaction>,
}
