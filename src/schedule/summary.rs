//! Per-department load summary for a day

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::engine::SchedulingEngine;
use super::types::{Appointment, AppointmentBook, Department, DepartmentCapacity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentLoad {
    pub department: Department,
    pub appointments: usize,
    pub flagged: usize,
    pub capacity: u32,
    /// Most appointments running at the same instant
    pub peak_concurrency: usize,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub date: NaiveDate,
    pub departments: Vec<DepartmentLoad>,
    pub total_appointments: usize,
    pub total_flagged: usize,
    pub overcrowded_slots: usize,
}

impl ScheduleSummary {
    pub fn busiest(&self) -> Option<&DepartmentLoad> {
        self.departments
            .iter()
            .max_by(|a, b| a.utilization_percent.total_cmp(&b.utilization_percent))
    }
}

/// Highest number of half-open intervals covering a single instant
fn peak_concurrency<'a>(appointments: impl Iterator<Item = &'a Appointment>) -> usize {
    let mut events: Vec<(NaiveDateTime, i32)> = Vec::new();
    for appointment in appointments {
        events.push((appointment.starts_at(), 1));
        events.push((appointment.ends_at(), -1));
    }
    // Ends sort before starts at the same instant
    events.sort();

    let mut current = 0i32;
    let mut peak = 0i32;
    for (_, delta) in events {
        current += delta;
        peak = peak.max(current);
    }
    peak.max(0) as usize
}

impl SchedulingEngine {
    pub fn schedule_summary(
        &self,
        book: &AppointmentBook,
        capacities: &DepartmentCapacity,
        date: NaiveDate,
    ) -> ScheduleSummary {
        let departments: Vec<DepartmentLoad> = Department::ALL
            .iter()
            .map(|department| {
                let members: Vec<&Appointment> = book
                    .on_date(date)
                    .filter(|a| a.department == *department)
                    .collect();
                let capacity = capacities.get(*department);
                let peak = peak_concurrency(members.iter().copied());
                DepartmentLoad {
                    department: *department,
                    appointments: members.len(),
                    flagged: members.iter().filter(|a| a.needs_rescheduling).count(),
                    capacity,
                    peak_concurrency: peak,
                    utilization_percent: peak as f64 / f64::from(capacity) * 100.0,
                }
            })
            .collect();

        ScheduleSummary {
            date,
            total_appointments: departments.iter().map(|d| d.appointments).sum(),
            total_flagged: departments.iter().map(|d| d.flagged).sum(),
            overcrowded_slots: self.detect_overcrowding(book, capacities, date).len(),
            departments,
        }
    }
}
