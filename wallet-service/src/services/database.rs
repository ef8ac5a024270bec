//! PostgreSQL store for wallet-service.

use super::store::{EntryWrite, PaymentStore};
use crate::models::{
    month_tokens, Invoice, InvoiceRow, Membership, MembershipRow, Month, Offer, OfferRow,
    TeacherPayment, TeacherPaymentRow, WalletTransaction, WalletTransactionRow,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn entries_from_rows(rows: Vec<TeacherPaymentRow>) -> Result<Vec<TeacherPayment>, AppError> {
    rows.into_iter()
        .map(|row| TeacherPayment::try_from(row).map_err(AppError::DatabaseError))
        .collect()
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "wallet-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests use a per-schema pool).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Back-office records
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    pub async fn upsert_teacher(&self, teacher_id: Uuid, display_name: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO teachers (teacher_id, display_name)
            VALUES ($1, $2)
            ON CONFLICT (teacher_id) DO UPDATE SET display_name = EXCLUDED.display_name
            "#,
        )
        .bind(teacher_id)
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert teacher", e))?;
        Ok(())
    }

    #[instrument(skip(self, offer), fields(offer_id = %offer.offer_id))]
    pub async fn upsert_offer(&self, offer: &Offer) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO offers (offer_id, name, percentage)
            VALUES ($1, $2, $3)
            ON CONFLICT (offer_id) DO UPDATE SET name = EXCLUDED.name, percentage = EXCLUDED.percentage
            "#,
        )
        .bind(offer.offer_id)
        .bind(&offer.name)
        .bind(Json(&offer.percentage))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert offer", e))?;
        Ok(())
    }

    #[instrument(skip(self, membership), fields(membership_id = %membership.membership_id))]
    pub async fn upsert_membership(&self, membership: &Membership) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, student_id, offer_id, teachers)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (membership_id) DO UPDATE
            SET student_id = EXCLUDED.student_id, offer_id = EXCLUDED.offer_id, teachers = EXCLUDED.teachers
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.student_id)
        .bind(membership.offer_id)
        .bind(Json(&membership.teachers))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert membership", e))?;
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    pub async fn upsert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (invoice_id, membership_id, total_amount, amount_paid, selected_months,
                                  include_partial_month, partial_month_amount, bill_date, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (invoice_id) DO UPDATE
            SET total_amount = EXCLUDED.total_amount,
                amount_paid = EXCLUDED.amount_paid,
                selected_months = EXCLUDED.selected_months,
                include_partial_month = EXCLUDED.include_partial_month,
                partial_month_amount = EXCLUDED.partial_month_amount,
                bill_date = EXCLUDED.bill_date
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.membership_id)
        .bind(invoice.total_amount)
        .bind(invoice.amount_paid)
        .bind(month_tokens(&invoice.selected_months))
        .bind(invoice.include_partial_month)
        .bind(invoice.partial_month_amount)
        .bind(invoice.bill_date)
        .bind(invoice.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert invoice", e))?;
        Ok(())
    }

    async fn query_entries(
        &self,
        operation: &str,
        sql: &str,
        key: Uuid,
    ) -> Result<Vec<TeacherPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let rows = sqlx::query_as::<_, TeacherPaymentRow>(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load entries", e))?;

        timer.observe_duration();

        entries_from_rows(rows)
    }
}

#[async_trait]
impl PaymentStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT invoice_id, membership_id, total_amount, amount_paid, selected_months,
                   include_partial_month, partial_month_amount, bill_date, created_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get invoice", e))?;

        timer.observe_duration();

        row.map(Invoice::try_from)
            .transpose()
            .map_err(AppError::DatabaseError)
    }

    #[instrument(skip(self), fields(membership_id = %membership_id))]
    async fn invoices_for_membership(&self, membership_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoices_for_membership"])
            .start_timer();

        let rows = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT invoice_id, membership_id, total_amount, amount_paid, selected_months,
                   include_partial_month, partial_month_amount, bill_date, created_utc
            FROM invoices
            WHERE membership_id = $1
            ORDER BY created_utc, invoice_id
            "#,
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list invoices", e))?;

        timer.observe_duration();

        rows.into_iter()
            .map(|row| Invoice::try_from(row).map_err(AppError::DatabaseError))
            .collect()
    }

    #[instrument(skip(self), fields(membership_id = %membership_id))]
    async fn get_membership(&self, membership_id: Uuid) -> Result<Option<Membership>, AppError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT membership_id, student_id, offer_id, teachers
            FROM memberships
            WHERE membership_id = $1
            "#,
        )
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get membership", e))?;

        Ok(row.map(Membership::from))
    }

    #[instrument(skip(self), fields(offer_id = %offer_id))]
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, AppError> {
        let row = sqlx::query_as::<_, OfferRow>(
            "SELECT offer_id, name, percentage FROM offers WHERE offer_id = $1",
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get offer", e))?;

        Ok(row.map(Offer::from))
    }

    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    async fn teacher_exists(&self, teacher_id: Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM teachers WHERE teacher_id = $1)")
            .bind(teacher_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to check teacher", e))
    }

    #[instrument(skip(self), fields(teacher_id = %teacher_id, invoice_id = %invoice_id))]
    async fn find_entry(
        &self,
        teacher_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<TeacherPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_entry"])
            .start_timer();

        let row = sqlx::query_as::<_, TeacherPaymentRow>(
            r#"
            SELECT entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                   payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                   monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                   version, created_utc, updated_utc
            FROM teacher_payments
            WHERE teacher_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(teacher_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find entry", e))?;

        timer.observe_duration();

        row.map(TeacherPayment::try_from)
            .transpose()
            .map_err(AppError::DatabaseError)
    }

    #[instrument(skip(self), fields(entry_id = %entry_id))]
    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<TeacherPayment>, AppError> {
        let row = sqlx::query_as::<_, TeacherPaymentRow>(
            r#"
            SELECT entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                   payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                   monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                   version, created_utc, updated_utc
            FROM teacher_payments
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get entry", e))?;

        row.map(TeacherPayment::try_from)
            .transpose()
            .map_err(AppError::DatabaseError)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn entries_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<TeacherPayment>, AppError> {
        self.query_entries(
            "entries_for_invoice",
            r#"
            SELECT entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                   payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                   monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                   version, created_utc, updated_utc
            FROM teacher_payments
            WHERE invoice_id = $1
            ORDER BY created_utc, entry_id
            "#,
            invoice_id,
        )
        .await
    }

    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    async fn entries_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<TeacherPayment>, AppError> {
        self.query_entries(
            "entries_for_teacher",
            r#"
            SELECT entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                   payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                   monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                   version, created_utc, updated_utc
            FROM teacher_payments
            WHERE teacher_id = $1
            ORDER BY created_utc, entry_id
            "#,
            teacher_id,
        )
        .await
    }

    #[instrument(skip(self), fields(month = %month))]
    async fn entries_due(&self, month: Month) -> Result<Vec<TeacherPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["entries_due"])
            .start_timer();

        let rows = sqlx::query_as::<_, TeacherPaymentRow>(
            r#"
            SELECT entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                   payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                   monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                   version, created_utc, updated_utc
            FROM teacher_payments
            WHERE is_active
              AND $1 = ANY(selected_months)
              AND $1 = ANY(months_rest_not_paid_yet)
            ORDER BY created_utc, entry_id
            "#,
        )
        .bind(month.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load due entries", e))?;

        timer.observe_duration();

        entries_from_rows(rows)
    }

    #[instrument(
        skip(self, write),
        fields(entry_id = %write.entry.entry_id, teacher_id = %write.entry.teacher_id, invoice_id = %write.entry.invoice_id)
    )]
    async fn commit_entry(&self, write: EntryWrite) -> Result<TeacherPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_entry"])
            .start_timer();

        let EntryWrite {
            entry,
            expected_version,
            wallet_delta,
        } = write;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let result = match expected_version {
            None => {
                sqlx::query_as::<_, TeacherPaymentRow>(
                    r#"
                    INSERT INTO teacher_payments (
                        entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                        payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                        monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active, version
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 1)
                    ON CONFLICT (teacher_id, invoice_id) DO NOTHING
                    RETURNING entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                              payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                              monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                              version, created_utc, updated_utc
                    "#,
                )
                .bind(entry.entry_id)
                .bind(entry.teacher_id)
                .bind(entry.invoice_id)
                .bind(entry.membership_id)
                .bind(&entry.subject)
                .bind(entry.teacher_percentage)
                .bind(entry.payment_percentage)
                .bind(month_tokens(&entry.selected_months))
                .bind(month_tokens(&entry.months_rest_not_paid_yet))
                .bind(entry.total_teacher_amount)
                .bind(entry.monthly_teacher_amount)
                .bind(entry.immediate_wallet_amount)
                .bind(entry.total_paid_to_teacher)
                .bind(entry.is_active)
                .fetch_optional(&mut *tx)
                .await
            }
            Some(version) => {
                sqlx::query_as::<_, TeacherPaymentRow>(
                    r#"
                    UPDATE teacher_payments
                    SET subject = $2,
                        teacher_percentage = $3,
                        payment_percentage = $4,
                        selected_months = $5,
                        months_rest_not_paid_yet = $6,
                        total_teacher_amount = $7,
                        monthly_teacher_amount = $8,
                        immediate_wallet_amount = $9,
                        total_paid_to_teacher = $10,
                        is_active = $11,
                        version = version + 1,
                        updated_utc = NOW()
                    WHERE entry_id = $1 AND version = $12
                    RETURNING entry_id, teacher_id, invoice_id, membership_id, subject, teacher_percentage,
                              payment_percentage, selected_months, months_rest_not_paid_yet, total_teacher_amount,
                              monthly_teacher_amount, immediate_wallet_amount, total_paid_to_teacher, is_active,
                              version, created_utc, updated_utc
                    "#,
                )
                .bind(entry.entry_id)
                .bind(&entry.subject)
                .bind(entry.teacher_percentage)
                .bind(entry.payment_percentage)
                .bind(month_tokens(&entry.selected_months))
                .bind(month_tokens(&entry.months_rest_not_paid_yet))
                .bind(entry.total_teacher_amount)
                .bind(entry.monthly_teacher_amount)
                .bind(entry.immediate_wallet_amount)
                .bind(entry.total_paid_to_teacher)
                .bind(entry.is_active)
                .bind(version)
                .fetch_optional(&mut *tx)
                .await
            }
        };

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => {
                tx.rollback().await.ok();
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Entry for teacher {} and invoice {} was written concurrently",
                    entry.teacher_id,
                    entry.invoice_id
                )));
            }
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Entry {} already exists",
                    entry.entry_id
                )));
            }
            Err(e) => return Err(db_error("Failed to write entry", e)),
        };

        if let Some(delta) = wallet_delta {
            sqlx::query(
                r#"
                INSERT INTO wallet_transactions (transaction_id, teacher_id, entry_id, invoice_id, kind, amount, month)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(entry.teacher_id)
            .bind(entry.entry_id)
            .bind(entry.invoice_id)
            .bind(delta.kind.as_str())
            .bind(delta.amount)
            .bind(delta.month.map(|m| m.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to insert wallet transaction", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        timer.observe_duration();

        TeacherPayment::try_from(row).map_err(AppError::DatabaseError)
    }

    #[instrument(skip(self), fields(entry_id = %entry_id))]
    async fn deactivate_entry(&self, entry_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE teacher_payments
            SET is_active = FALSE,
                months_rest_not_paid_yet = '{}',
                version = version + 1,
                updated_utc = NOW()
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to deactivate entry", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Entry {} not found",
                entry_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    async fn wallet_balance(&self, teacher_id: Uuid) -> Result<Decimal, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["wallet_balance"])
            .start_timer();

        let balance: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM wallet_transactions WHERE teacher_id = $1",
        )
        .bind(teacher_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get wallet balance", e))?;

        timer.observe_duration();

        Ok(balance)
    }

    #[instrument(skip(self), fields(entry_id = %entry_id))]
    async fn wallet_total_for_entry(&self, entry_id: Uuid) -> Result<Decimal, AppError> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM wallet_transactions WHERE entry_id = $1",
        )
        .bind(entry_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to sum entry transactions", e))
    }

    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    async fn wallet_transactions(
        &self,
        teacher_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let rows = sqlx::query_as::<_, WalletTransactionRow>(
            r#"
            SELECT transaction_id, teacher_id, entry_id, invoice_id, kind, amount, month, created_utc
            FROM wallet_transactions
            WHERE teacher_id = $1
            ORDER BY created_utc, transaction_id
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list wallet transactions", e))?;

        rows.into_iter()
            .map(|row| WalletTransaction::try_from(row).map_err(AppError::DatabaseError))
            .collect()
    }
}
