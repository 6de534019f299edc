//! Time-slot grid and per-slot availability

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::types::{hhmm, AppointmentBook, Department, DepartmentCapacity};

/// Clock constants of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
    /// First slot start of the day
    #[serde(with = "hhmm")]
    pub opening: NaiveTime,
    /// Non-emergency appointments starting before this are moved to the next day
    #[serde(with = "hhmm")]
    pub emergency_only_until: NaiveTime,
    /// Last slot start of the day (inclusive)
    #[serde(with = "hhmm")]
    pub last_slot: NaiveTime,
    pub slot_minutes: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            opening: hm(9, 0),
            emergency_only_until: hm(9, 0),
            last_slot: hm(21, 0),
            slot_minutes: 30,
        }
    }
}

impl SchedulePolicy {
    /// Every slot start of the day, opening through last slot inclusive
    pub fn slot_times(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(i64::from(self.slot_minutes.max(1)));
        let mut times = Vec::new();
        let mut current = self.opening;
        while current <= self.last_slot {
            times.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            current = next;
        }
        times
    }

    /// Grid slots starting at or after `from`
    pub fn slots_from(&self, from: NaiveTime) -> Vec<NaiveTime> {
        self.slot_times().into_iter().filter(|t| *t >= from).collect()
    }

    pub fn in_emergency_window(&self, start: NaiveTime) -> bool {
        start < self.emergency_only_until
    }

    pub fn slot_duration(&self) -> u32 {
        self.slot_minutes.max(1)
    }
}

/// One grid slot annotated with its occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub occupancy: usize,
    pub capacity: u32,
    pub available: bool,
}

impl SlotAvailability {
    /// Picker label, e.g. `10:30 (1/2 booked)` or `10:30 (Full)`
    pub fn label(&self) -> String {
        let time = self.time.format("%H:%M");
        if self.available {
            format!("{} ({}/{} booked)", time, self.occupancy, self.capacity)
        } else {
            format!("{} (Full)", time)
        }
    }
}

/// Annotate every grid slot for a department/date.
///
/// A slot is available when fewer than `capacity` appointments overlap the
/// interval `[slot, slot + duration)`, the same rule `submit` applies.
pub fn slot_availability(
    policy: &SchedulePolicy,
    book: &AppointmentBook,
    capacities: &DepartmentCapacity,
    department: Department,
    date: NaiveDate,
    duration_minutes: u32,
    exclude: Option<&str>,
) -> Vec<SlotAvailability> {
    let capacity = capacities.get(department);
    policy
        .slot_times()
        .into_iter()
        .map(|time| {
            let occupancy = book
                .overlapping(department, date, time, duration_minutes, exclude)
                .len();
            SlotAvailability {
                time,
                occupancy,
                capacity,
                available: occupancy < capacity as usize,
            }
        })
        .collect()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
