//! Overcrowding detection
//!
//! Groups a day's appointments by (start time, department) and reports every
//! group holding more patients than the department has doctors, together with
//! the patients that should move and the slots they could move to.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::engine::SchedulingEngine;
use super::slots::SlotAvailability;
use super::types::{hhmm, Appointment, AppointmentBook, Department, DepartmentCapacity};

/// Hours treated as peak load when building recommendations
pub const PEAK_HOURS: [u32; 4] = [9, 10, 14, 15];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub department: Department,
    pub predicted: usize,
    pub capacity: u32,
}

impl SlotDescriptor {
    pub fn overflow(&self) -> usize {
        self.predicted.saturating_sub(self.capacity as usize)
    }

    pub fn is_peak_hour(&self) -> bool {
        PEAK_HOURS.contains(&self.time.hour())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvercrowdedSlot {
    pub slot: SlotDescriptor,
    /// Non-exempt patients seated past the slot's capacity, in arrival order
    pub excess: Vec<Appointment>,
    /// Every non-exempt patient in the slot
    pub relocatable: Vec<Appointment>,
    /// Other grid slots of the same department and date with room left
    pub spare_slots: Vec<SlotAvailability>,
}

impl OvercrowdedSlot {
    /// Operator hints for this slot
    pub fn recommendations(&self) -> Vec<String> {
        let mut hints = vec![format!(
            "Consider rescheduling {} non-critical appointments",
            self.excess.len().max(self.slot.overflow())
        )];
        if self.slot.is_peak_hour() {
            hints.push("Peak hour detected - consider extending operating hours".to_string());
        }
        if self.spare_slots.is_empty() {
            hints.push("Notify department heads and prepare additional resources".to_string());
        }
        hints
    }
}

impl SchedulingEngine {
    /// Report every (time, department) group on `date` holding more patients
    /// than capacity. Output is ordered by time, then department.
    ///
    /// Critical-priority and Emergency-type patients always keep their seats.
    /// The remaining seats go to other patients in arrival order; whoever is
    /// left over is excess.
    pub fn detect_overcrowding(
        &self,
        book: &AppointmentBook,
        capacities: &DepartmentCapacity,
        date: NaiveDate,
    ) -> Vec<OvercrowdedSlot> {
        let mut groups: BTreeMap<(NaiveTime, Department), Vec<&Appointment>> = BTreeMap::new();
        for appointment in book.on_date(date) {
            groups
                .entry((appointment.start_time, appointment.department))
                .or_default()
                .push(appointment);
        }

        groups
            .into_iter()
            .filter_map(|((time, department), members)| {
                let capacity = capacities.get(department);
                if members.len() <= capacity as usize {
                    return None;
                }

                let exempt = members.iter().filter(|a| a.is_exempt()).count();
                let open_seats = (capacity as usize).saturating_sub(exempt);
                let relocatable: Vec<Appointment> = members
                    .iter()
                    .filter(|a| !a.is_exempt())
                    .map(|a| (*a).clone())
                    .collect();
                let excess = relocatable.iter().skip(open_seats).cloned().collect();

                let duration = self.policy().slot_duration();
                let spare_slots = self
                    .available_slots(book, capacities, department, date, duration, None)
                    .into_iter()
                    .filter(|s| s.time != time && s.available)
                    .collect();

                Some(OvercrowdedSlot {
                    slot: SlotDescriptor {
                        date,
                        time,
                        department,
                        predicted: members.len(),
                        capacity,
                    },
                    excess,
                    relocatable,
                    spare_slots,
                })
            })
            .collect()
    }
}
