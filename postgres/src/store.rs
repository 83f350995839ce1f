//! `PostgreSQL` implementation of [`SeatStore`].
//!
//! Every transaction sets a local `lock_timeout`. Row locks carry the
//! concurrency rules:
//!
//! - `lock_priority_list` takes `FOR UPDATE` on all of an offering's
//!   `offering_locations` rows in rank order, so reservations on one
//!   offering are serialized.
//! - `reserve` is a conditional `UPDATE ... WHERE occupancy < capacity`.
//! - `lock_registration` takes `FOR UPDATE` on the registration row, so
//!   notices for one registration apply one at a time.

use crate::rows::{self, db_int};
use chrono::{DateTime, Utc};
use exam_seating_core::capacity::{self, LocationSlot, PriorityList};
use exam_seating_core::lifecycle::NoticeOutcome;
use exam_seating_core::store::{SeatStore, SeatTransaction, StoreError, StoreFuture};
use exam_seating_core::types::{
    Exam, ExamId, Location, LocationId, NotificationRequest, Offering, OfferingId, PaymentNotice,
    Registration, RegistrationId, RevenueEntry, RevenueLedger, StudentId,
};
use exam_seating_core::verification::NoticeAuditEntry;
use sqlx::postgres::{PgArguments, PgPool, Postgres};
use sqlx::types::Json;
use sqlx::{Executor, Transaction};
use std::time::Duration;

/// Default `lock_timeout` for store transactions.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Maps a driver error to a [`StoreError`].
///
/// Lock timeouts, serialization failures and deadlocks all become
/// [`StoreError::LockTimeout`] so callers retry them the same way.
pub(crate) fn db_error(context: &str, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &error {
        match db_err.code().as_deref() {
            Some("55P03" | "40001" | "40P01") => return StoreError::LockTimeout,
            Some("23505") => {
                return StoreError::UniqueViolation(
                    db_err.constraint().unwrap_or(context).to_string(),
                )
            }
            _ => {}
        }
    }
    StoreError::Database(format!("Failed to {context}: {error}"))
}

async fn fetch_registration<'e, E>(
    executor: E,
    id: RegistrationId,
    for_update: bool,
) -> Result<Option<Registration>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM registrations WHERE id = $1{}",
        rows::REGISTRATION_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row: Option<rows::RegistrationRow> = sqlx::query_as(&sql)
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error("load registration", e))?;
    row.map(rows::registration).transpose()
}

async fn fetch_priority_list<'e, E>(
    executor: E,
    offering_id: OfferingId,
    for_update: bool,
) -> Result<PriorityList, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT ol.location_id, ol.rank, l.capacity, ol.occupancy
         FROM offering_locations ol
         JOIN locations l ON l.id = ol.location_id
         WHERE ol.offering_id = $1
         ORDER BY ol.rank, ol.location_id{}",
        if for_update { " FOR UPDATE OF ol" } else { "" }
    );
    let rows: Vec<(sqlx::types::Uuid, i32, i32, i32)> = sqlx::query_as(&sql)
        .bind(offering_id.as_uuid())
        .fetch_all(executor)
        .await
        .map_err(|e| db_error("load priority list", e))?;

    let slots = rows
        .into_iter()
        .map(|(location_id, rank, capacity, occupancy)| {
            Ok(LocationSlot {
                location_id: LocationId::from_uuid(location_id),
                rank: db_int(rank, "offering_locations.rank")?,
                capacity: db_int(capacity, "locations.capacity")?,
                occupancy: db_int(occupancy, "offering_locations.occupancy")?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(PriorityList::new(offering_id, slots))
}

async fn insert_audit<'e, E>(executor: E, entry: &NoticeAuditEntry) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO notice_audit_log
             (id, registration_id, transaction_id, status_code, outcome, detail, payload, received_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(entry.id)
    .bind(entry.registration_id.map(|id| *id.as_uuid()))
    .bind(&entry.transaction_id)
    .bind(&entry.status_code)
    .bind(entry.outcome.as_str())
    .bind(&entry.detail)
    .bind(Json(&entry.payload))
    .bind(entry.received_at)
    .execute(executor)
    .await
    .map_err(|e| db_error("record notice audit entry", e))?;
    Ok(())
}

/// `PostgreSQL`-backed seat store.
///
/// # Example
///
/// ```no_run
/// use exam_seating_postgres::PostgresSeatStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresSeatStore::connect("postgres://localhost/exam_seating").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresSeatStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresSeatStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Connects with default pool settings.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| db_error("connect to database", e))?;
        Ok(Self::from_pool(pool))
    }

    /// Sets the `lock_timeout` applied to every transaction.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// The connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Audit outcomes recorded for a registration, oldest first.
    ///
    /// # Errors
    ///
    /// Any database failure.
    pub async fn audit_outcomes(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Vec<NoticeOutcome>, StoreError> {
        let outcomes: Vec<(String,)> = sqlx::query_as(
            "SELECT outcome FROM notice_audit_log
             WHERE registration_id = $1
             ORDER BY received_at, id",
        )
        .bind(registration_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load audit log", e))?;
        outcomes.iter().map(|(value,)| rows::outcome(value)).collect()
    }

    /// Current occupancy of one (offering, location) pair.
    ///
    /// # Errors
    ///
    /// Any database failure.
    pub async fn occupancy(
        &self,
        offering_id: OfferingId,
        location_id: LocationId,
    ) -> Result<u32, StoreError> {
        let occupancy: Option<(i32,)> = sqlx::query_as(
            "SELECT occupancy FROM offering_locations WHERE offering_id = $1 AND location_id = $2",
        )
        .bind(offering_id.as_uuid())
        .bind(location_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("load occupancy", e))?;
        occupancy.map_or(Ok(0), |(value,)| db_int(value, "offering_locations.occupancy"))
    }

    /// Revenue entries booked for a registration.
    ///
    /// # Errors
    ///
    /// Any database failure.
    pub async fn revenue_entries(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Vec<RevenueEntry>, StoreError> {
        let entries: Vec<rows::RevenueRow> = sqlx::query_as(
            "SELECT id, registration_id, organization_id, exam_id,
                    gross_cents, commission_cents, net_cents, status, transaction_date
             FROM revenue_entries
             WHERE registration_id = $1
             ORDER BY transaction_date, id",
        )
        .bind(registration_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load revenue entries", e))?;
        entries.into_iter().map(rows::revenue_entry).collect()
    }
}

impl SeatStore for PostgresSeatStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn SeatTransaction>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("begin transaction", e))?;
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", self.lock_timeout.as_millis()))
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("set lock_timeout", e))?;
            Ok(Box::new(PostgresSeatTransaction { tx }) as Box<dyn SeatTransaction>)
        })
    }

    fn registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move { fetch_registration(&self.pool, id, false).await })
    }

    fn priority_list(&self, offering_id: OfferingId) -> StoreFuture<'_, PriorityList> {
        Box::pin(async move { fetch_priority_list(&self.pool, offering_id, false).await })
    }

    fn record_audit(&self, entry: NoticeAuditEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move { insert_audit(&self.pool, &entry).await })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("ping database", e))?;
            Ok(())
        })
    }
}

/// An open `PostgreSQL` transaction. Dropped without commit, it rolls back.
pub struct PostgresSeatTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresSeatTransaction {
    async fn execute(
        &mut self,
        context: &str,
        query: sqlx::query::Query<'_, Postgres, PgArguments>,
    ) -> Result<u64, StoreError> {
        query
            .execute(&mut *self.tx)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| db_error(context, e))
    }

    /// Locks a location and every counter using it, returning the
    /// counters' occupancies.
    async fn lock_location(&mut self, location_id: LocationId) -> Result<Vec<u32>, StoreError> {
        let found: Option<(sqlx::types::Uuid,)> =
            sqlx::query_as("SELECT id FROM locations WHERE id = $1 FOR UPDATE")
                .bind(location_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| db_error("lock location", e))?;
        if found.is_none() {
            return Err(StoreError::NotFound(format!("location {location_id}")));
        }

        let occupancies: Vec<(i32,)> = sqlx::query_as(
            "SELECT occupancy FROM offering_locations
             WHERE location_id = $1
             ORDER BY offering_id
             FOR UPDATE",
        )
        .bind(location_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("lock location counters", e))?;
        occupancies
            .into_iter()
            .map(|(value,)| db_int(value, "offering_locations.occupancy"))
            .collect()
    }
}

impl SeatTransaction for PostgresSeatTransaction {
    fn offering(&mut self, id: OfferingId) -> StoreFuture<'_, Option<Offering>> {
        Box::pin(async move {
            let row: Option<rows::OfferingRow> = sqlx::query_as(
                "SELECT id, exam_id, starts_at, status FROM exam_offerings WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("load offering", e))?;
            row.map(rows::offering).transpose()
        })
    }

    fn exam(&mut self, id: ExamId) -> StoreFuture<'_, Option<Exam>> {
        Box::pin(async move {
            let row: Option<rows::ExamRow> = sqlx::query_as(
                "SELECT id, organization_id, title, fee_cents, commission_bps
                 FROM exams WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("load exam", e))?;
            row.map(rows::exam).transpose()
        })
    }

    fn insert_location<'a>(&'a mut self, location: &'a Location) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            capacity::check_capacity_change(location.capacity, 0)?;
            let query = sqlx::query(
                "INSERT INTO locations (id, organization_id, name, capacity) VALUES ($1, $2, $3, $4)",
            )
            .bind(location.id.as_uuid())
            .bind(location.organization_id.as_uuid())
            .bind(&location.name)
            .bind(db_int::<u32, i32>(location.capacity, "capacity")?);
            self.execute("insert location", query).await?;
            Ok(())
        })
    }

    fn insert_exam<'a>(&'a mut self, exam: &'a Exam) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let commission_bps = match exam.commission_rate {
                Some(rate) => Some(db_int::<u32, i32>(rate.basis_points(), "commission_bps")?),
                None => None,
            };
            let query = sqlx::query(
                "INSERT INTO exams (id, organization_id, title, fee_cents, commission_bps)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(exam.id.as_uuid())
            .bind(exam.organization_id.as_uuid())
            .bind(&exam.title)
            .bind(db_int::<u64, i64>(exam.fee.cents(), "fee_cents")?)
            .bind(commission_bps);
            self.execute("insert exam", query).await?;
            Ok(())
        })
    }

    fn insert_offering<'a>(&'a mut self, offering: &'a Offering) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = sqlx::query(
                "INSERT INTO exam_offerings (id, exam_id, starts_at, status) VALUES ($1, $2, $3, $4)",
            )
            .bind(offering.id.as_uuid())
            .bind(offering.exam_id.as_uuid())
            .bind(offering.starts_at)
            .bind(offering.status.as_str());
            self.execute("insert offering", query).await?;
            Ok(())
        })
    }

    fn attach_location(
        &mut self,
        offering_id: OfferingId,
        location_id: LocationId,
        rank: u32,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let query = sqlx::query(
                "INSERT INTO offering_locations (offering_id, location_id, rank) VALUES ($1, $2, $3)",
            )
            .bind(offering_id.as_uuid())
            .bind(location_id.as_uuid())
            .bind(db_int::<u32, i32>(rank, "rank")?);
            match self.execute("attach location", query).await {
                // Foreign key violation: unknown offering or location
                Err(StoreError::Database(message)) if message.contains("foreign key") => Err(
                    StoreError::NotFound(format!("offering {offering_id} or location {location_id}")),
                ),
                other => other.map(|_| ()),
            }
        })
    }

    fn lock_priority_list(&mut self, offering_id: OfferingId) -> StoreFuture<'_, PriorityList> {
        Box::pin(async move { fetch_priority_list(&mut *self.tx, offering_id, true).await })
    }

    fn reserve(&mut self, offering_id: OfferingId, location_id: LocationId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let query = sqlx::query(
                "UPDATE offering_locations ol
                 SET occupancy = ol.occupancy + 1
                 FROM locations l
                 WHERE l.id = ol.location_id
                   AND ol.offering_id = $1
                   AND ol.location_id = $2
                   AND ol.occupancy < l.capacity",
            )
            .bind(offering_id.as_uuid())
            .bind(location_id.as_uuid());
            let reserved = self.execute("reserve seat", query).await? == 1;
            tracing::debug!(%offering_id, %location_id, reserved, "Reserve");
            Ok(reserved)
        })
    }

    fn release(&mut self, offering_id: OfferingId, location_id: LocationId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let query = sqlx::query(
                "UPDATE offering_locations
                 SET occupancy = GREATEST(occupancy - 1, 0)
                 WHERE offering_id = $1 AND location_id = $2",
            )
            .bind(offering_id.as_uuid())
            .bind(location_id.as_uuid());
            self.execute("release seat", query).await?;
            tracing::debug!(%offering_id, %location_id, "Release");
            Ok(())
        })
    }

    fn set_capacity(&mut self, location_id: LocationId, capacity: u32) -> StoreFuture<'_, Location> {
        Box::pin(async move {
            let occupancies = self.lock_location(location_id).await?;
            let max_occupancy = occupancies.into_iter().max().unwrap_or(0);
            capacity::check_capacity_change(capacity, max_occupancy)?;

            let row: rows::LocationRow = sqlx::query_as(
                "UPDATE locations SET capacity = $2 WHERE id = $1
                 RETURNING id, organization_id, name, capacity",
            )
            .bind(location_id.as_uuid())
            .bind(db_int::<u32, i32>(capacity, "capacity")?)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| db_error("update capacity", e))?;
            rows::location(row)
        })
    }

    fn delete_location(&mut self, location_id: LocationId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let occupancies = self.lock_location(location_id).await?;
            capacity::check_deletable(occupancies.into_iter().sum())?;
            let query = sqlx::query("DELETE FROM locations WHERE id = $1").bind(location_id.as_uuid());
            self.execute("delete location", query).await?;
            Ok(())
        })
    }

    fn find_registration(
        &mut self,
        student_id: StudentId,
        offering_id: OfferingId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM registrations WHERE student_id = $1 AND offering_id = $2",
                rows::REGISTRATION_COLUMNS
            );
            let row: Option<rows::RegistrationRow> = sqlx::query_as(&sql)
                .bind(student_id.as_uuid())
                .bind(offering_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| db_error("find registration", e))?;
            row.map(rows::registration).transpose()
        })
    }

    fn lock_registration(&mut self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move { fetch_registration(&mut *self.tx, id, true).await })
    }

    fn next_index_sequence(&mut self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (value,): (i64,) = sqlx::query_as("SELECT nextval('registration_index_seq')")
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| db_error("draw index number", e))?;
            db_int(value, "registration_index_seq")
        })
    }

    fn insert_registration<'a>(&'a mut self, registration: &'a Registration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = sqlx::query(
                "INSERT INTO registrations
                     (id, student_id, exam_id, offering_id, assigned_location, index_number,
                      status, attended, result, rescheduled_from, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(registration.id.as_uuid())
            .bind(registration.student_id.as_uuid())
            .bind(registration.exam_id.as_uuid())
            .bind(registration.offering_id.as_uuid())
            .bind(registration.assigned_location.map(|id| *id.as_uuid()))
            .bind(registration.index_number.as_str())
            .bind(registration.status.as_str())
            .bind(registration.attended)
            .bind(&registration.result)
            .bind(registration.rescheduled_from.map(|id| *id.as_uuid()))
            .bind(registration.created_at)
            .bind(registration.updated_at);
            self.execute("insert registration", query).await?;
            Ok(())
        })
    }

    fn update_registration<'a>(&'a mut self, registration: &'a Registration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = sqlx::query(
                "UPDATE registrations
                 SET offering_id = $2, assigned_location = $3, status = $4, attended = $5,
                     result = $6, rescheduled_from = $7, updated_at = $8
                 WHERE id = $1",
            )
            .bind(registration.id.as_uuid())
            .bind(registration.offering_id.as_uuid())
            .bind(registration.assigned_location.map(|id| *id.as_uuid()))
            .bind(registration.status.as_str())
            .bind(registration.attended)
            .bind(&registration.result)
            .bind(registration.rescheduled_from.map(|id| *id.as_uuid()))
            .bind(registration.updated_at);
            if self.execute("update registration", query).await? == 0 {
                return Err(StoreError::NotFound(format!("registration {}", registration.id)));
            }
            Ok(())
        })
    }

    fn pending_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<RegistrationId>> {
        Box::pin(async move {
            let ids: Vec<(sqlx::types::Uuid,)> = sqlx::query_as(
                "SELECT id FROM registrations
                 WHERE status = 'pending' AND created_at <= $1
                 ORDER BY created_at",
            )
            .bind(cutoff)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| db_error("list expired pending registrations", e))?;
            Ok(ids.into_iter().map(|(id,)| RegistrationId::from_uuid(id)).collect())
        })
    }

    fn complete_past_offerings(&mut self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let query = sqlx::query(
                "UPDATE exam_offerings SET status = 'completed'
                 WHERE status = 'upcoming' AND starts_at <= $1",
            )
            .bind(now);
            self.execute("complete past offerings", query).await
        })
    }

    fn insert_payment_notice<'a>(&'a mut self, notice: &'a PaymentNotice) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let query = sqlx::query(
                "INSERT INTO payment_notices
                     (id, registration_id, transaction_id, amount_cents, currency, status_code,
                      signature, method, message, received_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (registration_id, transaction_id, status_code) DO NOTHING",
            )
            .bind(notice.id.as_uuid())
            .bind(notice.registration_id.as_uuid())
            .bind(&notice.transaction_id)
            .bind(db_int::<u64, i64>(notice.amount.cents(), "amount_cents")?)
            .bind(&notice.currency)
            .bind(notice.status_code)
            .bind(&notice.signature)
            .bind(&notice.method)
            .bind(&notice.message)
            .bind(notice.received_at);
            Ok(self.execute("insert payment notice", query).await? == 1)
        })
    }

    fn revenue_ledger(&mut self, registration_id: RegistrationId) -> StoreFuture<'_, RevenueLedger> {
        Box::pin(async move {
            let entries: Vec<rows::RevenueRow> = sqlx::query_as(
                "SELECT id, registration_id, organization_id, exam_id,
                        gross_cents, commission_cents, net_cents, status, transaction_date
                 FROM revenue_entries WHERE registration_id = $1",
            )
            .bind(registration_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| db_error("load revenue ledger", e))?;
            let entries = entries
                .into_iter()
                .map(rows::revenue_entry)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RevenueLedger::from_entries(entries))
        })
    }

    fn insert_revenue<'a>(&'a mut self, entry: &'a RevenueEntry) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let query = sqlx::query(
                "INSERT INTO revenue_entries
                     (id, registration_id, organization_id, exam_id, gross_cents,
                      commission_cents, net_cents, status, transaction_date)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (registration_id, status) DO NOTHING",
            )
            .bind(entry.id.as_uuid())
            .bind(entry.registration_id.as_uuid())
            .bind(entry.organization_id.as_uuid())
            .bind(entry.exam_id.as_uuid())
            .bind(db_int::<u64, i64>(entry.gross.cents(), "gross_cents")?)
            .bind(db_int::<u64, i64>(entry.commission.cents(), "commission_cents")?)
            .bind(db_int::<u64, i64>(entry.net.cents(), "net_cents")?)
            .bind(entry.status.as_str())
            .bind(entry.transaction_date);
            Ok(self.execute("insert revenue entry", query).await? == 1)
        })
    }

    fn enqueue_notification<'a>(
        &'a mut self,
        request: &'a NotificationRequest,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = sqlx::query(
                "INSERT INTO notification_outbox
                     (id, student_id, registration_id, title, message, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(request.id.as_uuid())
            .bind(request.student_id.as_uuid())
            .bind(request.registration_id.as_uuid())
            .bind(&request.title)
            .bind(&request.message)
            .bind(request.created_at);
            self.execute("enqueue notification", query).await?;
            Ok(())
        })
    }

    fn record_audit<'a>(&'a mut self, entry: &'a NoticeAuditEntry) -> StoreFuture<'a, ()> {
        Box::pin(async move { insert_audit(&mut *self.tx, entry).await })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.tx
                .commit()
                .await
                .map_err(|e| db_error("commit transaction", e))
        })
    }
}
