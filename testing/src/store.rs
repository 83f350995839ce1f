//! In-memory [`SeatStore`] for tests.
//!
//! All data sits behind one async mutex. A transaction holds the mutex for
//! its whole lifetime and works on a copy of the data that replaces the
//! shared copy on commit; dropping the transaction discards the copy. The
//! mutex is acquired with a timeout, so contention surfaces as
//! [`StoreError::LockTimeout`] just like a database lock timeout.
//!
//! The audit log sits behind its own mutex, like an append-only table that
//! no row lock covers. Audit entries written inside a transaction are
//! appended on commit.

use chrono::{DateTime, Utc};
use exam_seating_core::capacity::{self, LocationSlot, PriorityList};
use exam_seating_core::store::{SeatStore, SeatTransaction, StoreError, StoreFuture};
use exam_seating_core::types::{
    Exam, ExamId, Location, LocationId, NotificationRequest, Offering, OfferingId, OfferingStatus,
    PaymentNotice, Registration, RegistrationId, RegistrationStatus, RevenueEntry, RevenueLedger,
    StudentId,
};
use exam_seating_core::verification::NoticeAuditEntry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default bound on waiting for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug)]
struct SeatRow {
    rank: u32,
    occupancy: u32,
}

#[derive(Clone, Debug, Default)]
struct Data {
    locations: HashMap<LocationId, Location>,
    exams: HashMap<ExamId, Exam>,
    offerings: HashMap<OfferingId, Offering>,
    seats: BTreeMap<(OfferingId, LocationId), SeatRow>,
    registrations: HashMap<RegistrationId, Registration>,
    payment_notices: Vec<PaymentNotice>,
    revenue: Vec<RevenueEntry>,
    outbox: Vec<NotificationRequest>,
    index_sequence: u64,
}

impl Data {
    fn priority_list(&self, offering_id: OfferingId) -> PriorityList {
        let slots = self
            .seats
            .iter()
            .filter(|((offering, _), _)| *offering == offering_id)
            .filter_map(|((_, location_id), row)| {
                self.locations.get(location_id).map(|location| LocationSlot {
                    location_id: *location_id,
                    rank: row.rank,
                    capacity: location.capacity,
                    occupancy: row.occupancy,
                })
            })
            .collect();
        PriorityList::new(offering_id, slots)
    }

    fn occupancies_at(&self, location_id: LocationId) -> impl Iterator<Item = u32> + '_ {
        self.seats
            .iter()
            .filter(move |((_, location), _)| *location == location_id)
            .map(|(_, row)| row.occupancy)
    }

    fn has_registration(
        &self,
        student_id: StudentId,
        offering_id: OfferingId,
        except: Option<RegistrationId>,
    ) -> bool {
        self.registrations.values().any(|r| {
            r.student_id == student_id && r.offering_id == offering_id && Some(r.id) != except
        })
    }
}

/// In-memory seat store.
///
/// Cloning shares the underlying data.
#[derive(Clone, Debug)]
pub struct InMemorySeatStore {
    data: Arc<Mutex<Data>>,
    audit: Arc<Mutex<Vec<NoticeAuditEntry>>>,
    lock_timeout: Duration,
}

impl Default for InMemorySeatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySeatStore {
    /// Creates an empty store with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates an empty store with a custom lock timeout.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            data: Arc::new(Mutex::new(Data::default())),
            audit: Arc::new(Mutex::new(Vec::new())),
            lock_timeout,
        }
    }

    async fn lock(&self) -> Result<OwnedMutexGuard<Data>, StoreError> {
        tokio::time::timeout(self.lock_timeout, Arc::clone(&self.data).lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)
    }

    /// Holds the store lock until the returned guard is dropped.
    ///
    /// Lets tests simulate a long-running transaction. The audit log stays
    /// writable.
    pub async fn hold_lock(&self) -> impl Send {
        Arc::clone(&self.data).lock_owned().await
    }

    // ========== Inspection helpers ==========

    /// Current occupancy of an (offering, location) pair.
    pub async fn occupancy(&self, offering_id: OfferingId, location_id: LocationId) -> u32 {
        self.data
            .lock()
            .await
            .seats
            .get(&(offering_id, location_id))
            .map_or(0, |row| row.occupancy)
    }

    /// All registrations.
    pub async fn registrations(&self) -> Vec<Registration> {
        self.data.lock().await.registrations.values().cloned().collect()
    }

    /// All stored payment notices.
    pub async fn payment_notices(&self) -> Vec<PaymentNotice> {
        self.data.lock().await.payment_notices.clone()
    }

    /// All revenue entries.
    pub async fn revenue_entries(&self) -> Vec<RevenueEntry> {
        self.data.lock().await.revenue.clone()
    }

    /// All outbox notification requests.
    pub async fn notifications(&self) -> Vec<NotificationRequest> {
        self.data.lock().await.outbox.clone()
    }

    /// All audit entries.
    pub async fn audit_log(&self) -> Vec<NoticeAuditEntry> {
        self.audit.lock().await.clone()
    }

    /// Looks up a location.
    pub async fn location(&self, location_id: LocationId) -> Option<Location> {
        self.data.lock().await.locations.get(&location_id).cloned()
    }

    /// Looks up an offering.
    pub async fn offering(&self, offering_id: OfferingId) -> Option<Offering> {
        self.data.lock().await.offerings.get(&offering_id).cloned()
    }
}

impl SeatStore for InMemorySeatStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn SeatTransaction>> {
        Box::pin(async move {
            let guard = self.lock().await?;
            let working = guard.clone();
            Ok(Box::new(InMemoryTransaction {
                guard,
                working,
                audit: Arc::clone(&self.audit),
                pending_audit: Vec::new(),
            }) as Box<dyn SeatTransaction>)
        })
    }

    fn registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move { Ok(self.lock().await?.registrations.get(&id).cloned()) })
    }

    fn priority_list(&self, offering_id: OfferingId) -> StoreFuture<'_, PriorityList> {
        Box::pin(async move { Ok(self.lock().await?.priority_list(offering_id)) })
    }

    fn record_audit(&self, entry: NoticeAuditEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.audit.lock().await.push(entry);
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.lock().await.map(|_| ()) })
    }
}

/// Open in-memory transaction.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<Data>,
    working: Data,
    audit: Arc<Mutex<Vec<NoticeAuditEntry>>>,
    pending_audit: Vec<NoticeAuditEntry>,
}

impl SeatTransaction for InMemoryTransaction {
    fn offering(&mut self, id: OfferingId) -> StoreFuture<'_, Option<Offering>> {
        let offering = self.working.offerings.get(&id).cloned();
        Box::pin(async move { Ok(offering) })
    }

    fn exam(&mut self, id: ExamId) -> StoreFuture<'_, Option<Exam>> {
        let exam = self.working.exams.get(&id).cloned();
        Box::pin(async move { Ok(exam) })
    }

    fn insert_location<'a>(&'a mut self, location: &'a Location) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if location.capacity == 0 {
                return Err(capacity::CapacityError::InvalidCapacity.into());
            }
            self.working.locations.insert(location.id, location.clone());
            Ok(())
        })
    }

    fn insert_exam<'a>(&'a mut self, exam: &'a Exam) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.working.exams.insert(exam.id, exam.clone());
            Ok(())
        })
    }

    fn insert_offering<'a>(&'a mut self, offering: &'a Offering) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.working.exams.contains_key(&offering.exam_id) {
                return Err(StoreError::NotFound(format!("exam {}", offering.exam_id)));
            }
            self.working.offerings.insert(offering.id, offering.clone());
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
            if !self.working.offerings.contains_key(&offering_id) {
                return Err(StoreError::NotFound(format!("offering {offering_id}")));
            }
            if !self.working.locations.contains_key(&location_id) {
                return Err(StoreError::NotFound(format!("location {location_id}")));
            }
            if self.working.seats.contains_key(&(offering_id, location_id)) {
                return Err(StoreError::UniqueViolation("offering_locations".to_string()));
            }
            self.working
                .seats
                .insert((offering_id, location_id), SeatRow { rank, occupancy: 0 });
            Ok(())
        })
    }

    fn lock_priority_list(&mut self, offering_id: OfferingId) -> StoreFuture<'_, PriorityList> {
        let list = self.working.priority_list(offering_id);
        Box::pin(async move { Ok(list) })
    }

    fn reserve(&mut self, offering_id: OfferingId, location_id: LocationId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let capacity = self
                .working
                .locations
                .get(&location_id)
                .map_or(0, |location| location.capacity);
            match self.working.seats.get_mut(&(offering_id, location_id)) {
                Some(row) if row.occupancy < capacity => {
                    row.occupancy += 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn release(&mut self, offering_id: OfferingId, location_id: LocationId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(row) = self.working.seats.get_mut(&(offering_id, location_id)) {
                row.occupancy = row.occupancy.saturating_sub(1);
            }
            Ok(())
        })
    }

    fn set_capacity(&mut self, location_id: LocationId, capacity: u32) -> StoreFuture<'_, Location> {
        Box::pin(async move {
            let max_occupancy = self.working.occupancies_at(location_id).max().unwrap_or(0);
            let location = self
                .working
                .locations
                .get_mut(&location_id)
                .ok_or_else(|| StoreError::NotFound(format!("location {location_id}")))?;
            capacity::check_capacity_change(capacity, max_occupancy)?;
            location.capacity = capacity;
            Ok(location.clone())
        })
    }

    fn delete_location(&mut self, location_id: LocationId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if !self.working.locations.contains_key(&location_id) {
                return Err(StoreError::NotFound(format!("location {location_id}")));
            }
            let occupied: u32 = self.working.occupancies_at(location_id).sum();
            capacity::check_deletable(occupied)?;
            self.working.locations.remove(&location_id);
            self.working.seats.retain(|(_, location), _| *location != location_id);
            Ok(())
        })
    }

    fn find_registration(
        &mut self,
        student_id: StudentId,
        offering_id: OfferingId,
    ) -> StoreFuture<'_, Option<Registration>> {
        let found = self
            .working
            .registrations
            .values()
            .find(|r| r.student_id == student_id && r.offering_id == offering_id)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn lock_registration(&mut self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        let found = self.working.registrations.get(&id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn next_index_sequence(&mut self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.working.index_sequence += 1;
            Ok(self.working.index_sequence)
        })
    }

    fn insert_registration<'a>(&'a mut self, registration: &'a Registration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self
                .working
                .has_registration(registration.student_id, registration.offering_id, None)
            {
                return Err(StoreError::UniqueViolation(
                    "registrations (student_id, offering_id)".to_string(),
                ));
            }
            self.working
                .registrations
                .insert(registration.id, registration.clone());
            Ok(())
        })
    }

    fn update_registration<'a>(&'a mut self, registration: &'a Registration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.working.registrations.contains_key(&registration.id) {
                return Err(StoreError::NotFound(format!("registration {}", registration.id)));
            }
            if self.working.has_registration(
                registration.student_id,
                registration.offering_id,
                Some(registration.id),
            ) {
                return Err(StoreError::UniqueViolation(
                    "registrations (student_id, offering_id)".to_string(),
                ));
            }
            self.working
                .registrations
                .insert(registration.id, registration.clone());
            Ok(())
        })
    }

    fn pending_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<RegistrationId>> {
        let mut pending: Vec<&Registration> = self
            .working
            .registrations
            .values()
            .filter(|r| r.status == RegistrationStatus::Pending && r.created_at <= cutoff)
            .collect();
        pending.sort_by_key(|r| r.created_at);
        let ids = pending.into_iter().map(|r| r.id).collect();
        Box::pin(async move { Ok(ids) })
    }

    fn complete_past_offerings(&mut self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut completed = 0;
            for offering in self.working.offerings.values_mut() {
                if offering.status == OfferingStatus::Upcoming && offering.starts_at <= now {
                    offering.status = OfferingStatus::Completed;
                    completed += 1;
                }
            }
            Ok(completed)
        })
    }

    fn insert_payment_notice<'a>(&'a mut self, notice: &'a PaymentNotice) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let seen = self.working.payment_notices.iter().any(|n| {
                n.registration_id == notice.registration_id
                    && n.transaction_id == notice.transaction_id
                    && n.status_code == notice.status_code
            });
            if seen {
                return Ok(false);
            }
            self.working.payment_notices.push(notice.clone());
            Ok(true)
        })
    }

    fn revenue_ledger(&mut self, registration_id: RegistrationId) -> StoreFuture<'_, RevenueLedger> {
        let ledger = RevenueLedger::from_entries(
            self.working
                .revenue
                .iter()
                .filter(|e| e.registration_id == registration_id)
                .cloned(),
        );
        Box::pin(async move { Ok(ledger) })
    }

    fn insert_revenue<'a>(&'a mut self, entry: &'a RevenueEntry) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let exists = self
                .working
                .revenue
                .iter()
                .any(|e| e.registration_id == entry.registration_id && e.status == entry.status);
            if exists {
                return Ok(false);
            }
            self.working.revenue.push(entry.clone());
            Ok(true)
        })
    }

    fn enqueue_notification<'a>(
        &'a mut self,
        request: &'a NotificationRequest,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.working.outbox.push(request.clone());
            Ok(())
        })
    }

    fn record_audit<'a>(&'a mut self, entry: &'a NoticeAuditEntry) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.pending_audit.push(entry.clone());
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let Self {
            mut guard,
            working,
            audit,
            pending_audit,
        } = *self;
        *guard = working;
        drop(guard);
        Box::pin(async move {
            audit.lock().await.extend(pending_audit);
            Ok(())
        })
    }
}
