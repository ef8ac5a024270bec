//! In-process `PaymentStore` with the same atomicity and conflict semantics
//! as the PostgreSQL store. Backs tests and `WALLET_DATABASE_URL=in-memory`.

use super::store::{EntryWrite, PaymentStore};
use crate::models::{
    Invoice, Membership, Month, Offer, TeacherPayment, WalletTransaction,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    invoices: HashMap<Uuid, Invoice>,
    memberships: HashMap<Uuid, Membership>,
    offers: HashMap<Uuid, Offer>,
    teachers: HashSet<Uuid>,
    entries: HashMap<Uuid, TeacherPayment>,
    entry_keys: HashMap<(Uuid, Uuid), Uuid>,
    wallet: Vec<WalletTransaction>,
    failing_commits: usize,
    failing_invoice_loads: HashSet<Uuid>,
}

impl State {
    fn sorted(mut entries: Vec<TeacherPayment>) -> Vec<TeacherPayment> {
        entries.sort_by(|a, b| {
            a.created_utc
                .cmp(&b.created_utc)
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        entries
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_teacher(&self, teacher_id: Uuid) {
        self.state.lock().await.teachers.insert(teacher_id);
    }

    pub async fn insert_offer(&self, offer: Offer) {
        self.state.lock().await.offers.insert(offer.offer_id, offer);
    }

    pub async fn insert_membership(&self, membership: Membership) {
        self.state
            .lock()
            .await
            .memberships
            .insert(membership.membership_id, membership);
    }

    /// Insert or replace an invoice (invoice edits overwrite in place).
    pub async fn upsert_invoice(&self, invoice: Invoice) {
        self.state
            .lock()
            .await
            .invoices
            .insert(invoice.invoice_id, invoice);
    }

    /// Make the next `count` calls to `commit_entry` fail with a database error.
    pub async fn fail_next_commits(&self, count: usize) {
        self.state.lock().await.failing_commits = count;
    }

    /// Make every later `entries_for_invoice(invoice_id)` call fail with a database error.
    pub async fn fail_entry_loads_for(&self, invoice_id: Uuid) {
        self.state
            .lock()
            .await
            .failing_invoice_loads
            .insert(invoice_id);
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.state.lock().await.invoices.get(&invoice_id).cloned())
    }

    async fn invoices_for_membership(&self, membership_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let state = self.state.lock().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.membership_id == membership_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|i| (i.created_utc, i.invoice_id));
        Ok(invoices)
    }

    async fn get_membership(&self, membership_id: Uuid) -> Result<Option<Membership>, AppError> {
        Ok(self.state.lock().await.memberships.get(&membership_id).cloned())
    }

    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, AppError> {
        Ok(self.state.lock().await.offers.get(&offer_id).cloned())
    }

    async fn teacher_exists(&self, teacher_id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.lock().await.teachers.contains(&teacher_id))
    }

    async fn find_entry(
        &self,
        teacher_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<TeacherPayment>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .entry_keys
            .get(&(teacher_id, invoice_id))
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<TeacherPayment>, AppError> {
        Ok(self.state.lock().await.entries.get(&entry_id).cloned())
    }

    async fn entries_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<TeacherPayment>, AppError> {
        let state = self.state.lock().await;
        if state.failing_invoice_loads.contains(&invoice_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Injected load failure for invoice {}",
                invoice_id
            )));
        }
        Ok(State::sorted(
            state
                .entries
                .values()
                .filter(|e| e.invoice_id == invoice_id)
                .cloned()
                .collect(),
        ))
    }

    async fn entries_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<TeacherPayment>, AppError> {
        let state = self.state.lock().await;
        Ok(State::sorted(
            state
                .entries
                .values()
                .filter(|e| e.teacher_id == teacher_id)
                .cloned()
                .collect(),
        ))
    }

    async fn entries_due(&self, month: Month) -> Result<Vec<TeacherPayment>, AppError> {
        let state = self.state.lock().await;
        Ok(State::sorted(
            state
                .entries
                .values()
                .filter(|e| e.is_due(month))
                .cloned()
                .collect(),
        ))
    }

    async fn commit_entry(&self, write: EntryWrite) -> Result<TeacherPayment, AppError> {
        let mut state = self.state.lock().await;

        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Injected commit failure"
            )));
        }

        let now = Utc::now();
        let mut entry = write.entry;
        let key = (entry.teacher_id, entry.invoice_id);

        match write.expected_version {
            None => {
                if state.entry_keys.contains_key(&key) {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Entry for teacher {} and invoice {} already exists",
                        entry.teacher_id,
                        entry.invoice_id
                    )));
                }
                entry.version = 1;
                entry.created_utc = now;
            }
            Some(expected) => {
                let stored = state.entries.get(&entry.entry_id).ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Entry {} not found", entry.entry_id))
                })?;
                if stored.version != expected {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Entry {} changed concurrently (expected version {}, found {})",
                        entry.entry_id,
                        expected,
                        stored.version
                    )));
                }
                entry.version = expected + 1;
                entry.created_utc = stored.created_utc;
            }
        }
        entry.updated_utc = now;

        if let Some(delta) = write.wallet_delta {
            state.wallet.push(WalletTransaction {
                transaction_id: Uuid::new_v4(),
                teacher_id: entry.teacher_id,
                entry_id: entry.entry_id,
                invoice_id: entry.invoice_id,
                kind: delta.kind,
                amount: delta.amount,
                month: delta.month,
                created_utc: now,
            });
        }

        state.entry_keys.insert(key, entry.entry_id);
        state.entries.insert(entry.entry_id, entry.clone());

        Ok(entry)
    }

    async fn deactivate_entry(&self, entry_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let entry = state.entries.get_mut(&entry_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Entry {} not found", entry_id))
        })?;
        entry.is_active = false;
        entry.months_rest_not_paid_yet.clear();
        entry.version += 1;
        entry.updated_utc = Utc::now();
        Ok(())
    }

    async fn wallet_balance(&self, teacher_id: Uuid) -> Result<Decimal, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .wallet
            .iter()
            .filter(|t| t.teacher_id == teacher_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn wallet_total_for_entry(&self, entry_id: Uuid) -> Result<Decimal, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .wallet
            .iter()
            .filter(|t| t.entry_id == entry_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn wallet_transactions(
        &self,
        teacher_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .wallet
            .iter()
            .filter(|t| t.teacher_id == teacher_id)
            .cloned()
            .collect())
    }
}
