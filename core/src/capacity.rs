//! Capacity snapshots and the location priority list.
//!
//! A [`PriorityList`] is an ordered snapshot of every location attached to an
//! offering with its capacity and live occupancy. Selection over the
//! snapshot is pure; the actual reservation is a single store call at the
//! chosen location.

use crate::types::{LocationId, OfferingId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One (offering, location) pair in a priority list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSlot {
    /// Location
    pub location_id: LocationId,
    /// Priority rank (1 = first choice)
    pub rank: u32,
    /// Total seats at the location
    pub capacity: u32,
    /// Seats currently held for this offering
    pub occupancy: u32,
}

impl LocationSlot {
    /// Seats still free.
    #[must_use]
    pub const fn spare(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy)
    }

    /// Whether at least one seat is free.
    #[must_use]
    pub const fn has_spare(&self) -> bool {
        self.occupancy < self.capacity
    }
}

/// Locations of an offering in ascending rank order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityList {
    offering_id: OfferingId,
    slots: Vec<LocationSlot>,
}

impl PriorityList {
    /// Builds a list, ordering slots by rank and then by location id so that
    /// equal ranks always come out in the same order.
    #[must_use]
    pub fn new(offering_id: OfferingId, mut slots: Vec<LocationSlot>) -> Self {
        slots.sort_by(|a, b| (a.rank, a.location_id).cmp(&(b.rank, b.location_id)));
        Self { offering_id, slots }
    }

    /// Offering the list belongs to
    #[must_use]
    pub const fn offering_id(&self) -> OfferingId {
        self.offering_id
    }

    /// Slots in priority order
    #[must_use]
    pub fn slots(&self) -> &[LocationSlot] {
        &self.slots
    }

    /// Index of the first slot with a free seat.
    #[must_use]
    pub fn first_fit(&self) -> Option<usize> {
        first_fit(&self.slots)
    }

    /// Slots with spare capacity, in the order the allocator tries them.
    pub fn candidates(&self) -> impl Iterator<Item = &LocationSlot> {
        self.slots.iter().filter(|slot| slot.has_spare())
    }

    /// Whether every location is full (or none is attached).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.first_fit().is_none()
    }

    /// Sum of seats across all locations.
    #[must_use]
    pub fn total_capacity(&self) -> u64 {
        self.slots.iter().map(|slot| u64::from(slot.capacity)).sum()
    }

    /// Sum of held seats across all locations.
    #[must_use]
    pub fn total_occupancy(&self) -> u64 {
        self.slots.iter().map(|slot| u64::from(slot.occupancy)).sum()
    }
}

/// First slot, in the given order, whose occupancy is below capacity.
#[must_use]
pub fn first_fit(slots: &[LocationSlot]) -> Option<usize> {
    slots.iter().position(LocationSlot::has_spare)
}

/// Violations of the location administration rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// Capacity must be a positive number of seats
    #[error("capacity must be positive")]
    InvalidCapacity,

    /// Lowering capacity would leave an offering over capacity
    #[error("capacity {requested} is below current occupancy {occupancy}")]
    CapacityBelowOccupancy {
        /// Requested capacity
        requested: u32,
        /// Highest occupancy of any offering at the location
        occupancy: u32,
    },

    /// The location still holds seats for some offering
    #[error("location still has {occupancy} occupied seats")]
    LocationOccupied {
        /// Seats held across all offerings
        occupancy: u32,
    },
}

/// Checks a capacity change against the highest occupancy of any offering
/// using the location.
///
/// # Errors
///
/// Returns [`CapacityError::InvalidCapacity`] for zero and
/// [`CapacityError::CapacityBelowOccupancy`] when seats would be oversold.
pub const fn check_capacity_change(requested: u32, max_occupancy: u32) -> Result<(), CapacityError> {
    if requested == 0 {
        return Err(CapacityError::InvalidCapacity);
    }
    if requested < max_occupancy {
        return Err(CapacityError::CapacityBelowOccupancy {
            requested,
            occupancy: max_occupancy,
        });
    }
    Ok(())
}

/// Checks that a location can be deleted.
///
/// # Errors
///
/// Returns [`CapacityError::LocationOccupied`] while any seat is held.
pub const fn check_deletable(total_occupancy: u32) -> Result<(), CapacityError> {
    if total_occupancy > 0 {
        Err(CapacityError::LocationOccupied {
            occupancy: total_occupancy,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn slot(n: u128, rank: u32, capacity: u32, occupancy: u32) -> LocationSlot {
        LocationSlot {
            location_id: LocationId::from_uuid(Uuid::from_u128(n)),
            rank,
            capacity,
            occupancy,
        }
    }

    #[test]
    fn list_is_sorted_by_rank_then_location() {
        let list = PriorityList::new(
            OfferingId::new(),
            vec![slot(3, 2, 10, 0), slot(2, 1, 10, 0), slot(1, 2, 10, 0)],
        );
        let order: Vec<u32> = list.slots().iter().map(|s| s.rank).collect();
        assert_eq!(order, vec![1, 2, 2]);
        assert_eq!(list.slots()[1].location_id, LocationId::from_uuid(Uuid::from_u128(1)));
        assert_eq!(list.slots()[2].location_id, LocationId::from_uuid(Uuid::from_u128(3)));
    }

    #[test]
    fn first_fit_skips_full_locations() {
        let list = PriorityList::new(
            OfferingId::new(),
            vec![slot(1, 1, 2, 2), slot(2, 2, 1, 0), slot(3, 3, 5, 0)],
        );
        assert_eq!(list.first_fit(), Some(1));
        assert_eq!(list.candidates().count(), 2);
        assert_eq!(list.total_capacity(), 8);
        assert_eq!(list.total_occupancy(), 2);
    }

    #[test]
    fn empty_or_full_list_is_exhausted() {
        assert!(PriorityList::new(OfferingId::new(), vec![]).is_exhausted());
        assert!(PriorityList::new(OfferingId::new(), vec![slot(1, 1, 1, 1)]).is_exhausted());
    }

    #[test]
    fn capacity_cannot_drop_below_occupancy() {
        assert_eq!(check_capacity_change(0, 0), Err(CapacityError::InvalidCapacity));
        assert_eq!(
            check_capacity_change(3, 4),
            Err(CapacityError::CapacityBelowOccupancy {
                requested: 3,
                occupancy: 4
            })
        );
        assert!(check_capacity_change(4, 4).is_ok());
    }

    #[test]
    fn occupied_location_cannot_be_deleted() {
        assert_eq!(check_deletable(1), Err(CapacityError::LocationOccupied { occupancy: 1 }));
        assert!(check_deletable(0).is_ok());
    }

    fn slots_strategy() -> impl Strategy<Value = Vec<LocationSlot>> {
        prop::collection::vec((1u32..5, 0u32..4, 0u32..4), 0..8).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (rank, capacity, taken))| {
                    slot(i as u128 + 1, rank, capacity, taken.min(capacity))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn first_fit_picks_first_location_with_spare_capacity(slots in slots_strategy()) {
            let list = PriorityList::new(OfferingId::new(), slots);
            match list.first_fit() {
                Some(index) => {
                    prop_assert!(list.slots()[index].has_spare());
                    prop_assert!(list.slots()[..index].iter().all(|s| !s.has_spare()));
                }
                None => prop_assert!(list.slots().iter().all(|s| !s.has_spare())),
            }
        }

        #[test]
        fn filling_by_first_fit_never_oversells(slots in slots_strategy(), requests in 0usize..40) {
            let mut list = PriorityList::new(OfferingId::new(), slots);
            let free_before: u64 = list.slots().iter().map(|s| u64::from(s.spare())).sum();
            let mut placed = 0u64;
            for _ in 0..requests {
                let Some(index) = list.first_fit() else { break };
                list.slots[index].occupancy += 1;
                placed += 1;
            }
            prop_assert!(list.slots().iter().all(|s| s.occupancy <= s.capacity));
            prop_assert_eq!(placed, free_before.min(requests as u64));
        }
    }
}
