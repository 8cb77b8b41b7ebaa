// Staff Selector
//
// Auto-assigns a staff member when the customer does not name one: keeps the
// active staff of the salon who are not excluded for the menu or any option,
// asks the slot allocator which of them are free, and ranks the rest by
// priority (higher first) with the lower id winning ties.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;

use crate::booking::error::{BookingError, BookingResult};
use crate::booking::models::{Menu, MenuOption, SalonSettings, StaffMember};
use crate::booking::slots::SlotAllocator;
use crate::booking::store::CatalogRepository;
use crate::booking::types::SalonId;

/// Whether the staff member may perform the menu and every option.
/// Menu and option exclusion lists are independent of each other.
pub fn is_qualified(staff: &StaffMember, menu: &Menu, options: &[MenuOption]) -> bool {
    !menu.excluded_staff_ids.contains(&staff.id)
        && options
            .iter()
            .all(|option| !option.excluded_staff_ids.contains(&staff.id))
}

/// Sort most preferred first: highest priority, then lowest id
pub fn rank(staff: &mut [StaffMember]) {
    staff.sort_by_key(|s| (Reverse(s.priority), s.id));
}

/// A staff member together with their free start times for one date
#[derive(Debug, Clone)]
pub struct StaffAvailability {
    pub staff: StaffMember,
    pub slots: Vec<NaiveTime>,
}

pub struct StaffSelector {
    catalog: Arc<dyn CatalogRepository>,
    slots: Arc<SlotAllocator>,
}

impl StaffSelector {
    pub fn new(catalog: Arc<dyn CatalogRepository>, slots: Arc<SlotAllocator>) -> Self {
        Self { catalog, slots }
    }

    /// Active, qualified staff of the salon in preference order
    pub async fn qualified_staff(
        &self,
        salon_id: SalonId,
        menu: &Menu,
        options: &[MenuOption],
    ) -> BookingResult<Vec<StaffMember>> {
        let mut staff: Vec<StaffMember> = self
            .catalog
            .salon_staff(salon_id)
            .await?
            .into_iter()
            .filter(|s| s.salon_id == salon_id && s.lifecycle().is_active())
            .filter(|s| is_qualified(s, menu, options))
            .collect();

        rank(&mut staff);
        Ok(staff)
    }

    /// Qualified staff with at least one free slot after `now`, in preference order
    pub async fn available_staff(
        &self,
        settings: &SalonSettings,
        menu: &Menu,
        options: &[MenuOption],
        date: NaiveDate,
        required_minutes: i32,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<StaffAvailability>> {
        let candidates = self
            .qualified_staff(settings.salon_id, menu, options)
            .await?;

        let mut available = Vec::with_capacity(candidates.len());
        for staff in candidates {
            let slots = self
                .slots
                .free_slots(settings, staff.id, date, required_minutes, now)
                .await?;
            if !slots.is_empty() {
                available.push(StaffAvailability { staff, slots });
            }
        }

        tracing::debug!(
            salon_id = settings.salon_id,
            menu_id = menu.id,
            %date,
            available = available.len(),
            "Computed staff availability"
        );
        Ok(available)
    }

    /// The single most preferred staff member with any free slot
    pub async fn pick_staff(
        &self,
        settings: &SalonSettings,
        menu: &Menu,
        options: &[MenuOption],
        date: NaiveDate,
        required_minutes: i32,
        now: DateTime<Utc>,
    ) -> BookingResult<StaffMember> {
        self.available_staff(settings, menu, options, date, required_minutes, now)
            .await?
            .into_iter()
            .next()
            .map(|a| a.staff)
            .ok_or_else(|| {
                BookingError::no_availability(format!(
                    "no staff member can take menu {} on {}",
                    menu.id, date
                ))
            })
    }

    /// The most preferred staff member whose free slots include `slot_start`
    pub async fn pick_staff_for_slot(
        &self,
        settings: &SalonSettings,
        menu: &Menu,
        options: &[MenuOption],
        date: NaiveDate,
        required_minutes: i32,
        slot_start: NaiveTime,
        now: DateTime<Utc>,
    ) -> BookingResult<StaffMember> {
        self.available_staff(settings, menu, options, date, required_minutes, now)
            .await?
            .into_iter()
            .find(|a| a.slots.contains(&slot_start))
            .map(|a| a.staff)
            .ok_or_else(|| {
                BookingError::no_availability(format!(
                    "no staff member is free at {} on {}",
                    slot_start.format("%H:%M"),
                    date
                ))
            })
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property 3: Ranking is independent of input order
        #[test]
        fn prop_rank_is_order_independent(
            priorities in prop::collection::vec(0..5i32, 1..12),
            seed in any::<u64>(),
        ) {
            let staff: Vec<StaffMember> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| StaffMember {
                    id: i as i64 + 1,
                    salon_id: 1,
                    display_name: String::new(),
                    priority: *p,
                    extra_charge: 0,
                    archived_at: None,
                })
                .collect();

            let mut forward = staff.clone();
            let mut shuffled = staff;
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            rank(&mut forward);
            rank(&mut shuffled);

            prop_assert_eq!(forward[0].id, shuffled[0].id);
            let best = forward.iter().map(|s| s.priority).max().unwrap();
            prop_assert_eq!(forward[0].priority, best);
        }
    }
}
