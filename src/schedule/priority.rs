//! Priority-based batch rescheduling
//!
//! Re-seats a whole day from a given time onward so that higher-priority
//! patients get the earliest slots. Planning is a pure recomputation;
//! `apply_plan` commits the result through the regular reschedule path.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::engine::{RescheduleOutcome, SchedulingEngine};
use super::error::{ScheduleError, ScheduleResult};
use super::types::{hhmm, Appointment, AppointmentBook, Department, DepartmentCapacity, Priority};

pub const PRIORITY_RESCHEDULE_REASON: &str = "priority-based reschedule";

/// One move proposed by [`SchedulingEngine::auto_reschedule_priority`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduledPatient {
    pub id: String,
    pub name: String,
    pub priority: Priority,
    pub department: Department,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub old_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub new_time: NaiveTime,
    pub reason: String,
}

struct Placement {
    department: Department,
    start: NaiveTime,
    duration_minutes: u32,
}

impl Placement {
    fn of(appointment: &Appointment, start: NaiveTime) -> Self {
        Self {
            department: appointment.department,
            start,
            duration_minutes: appointment.duration_minutes,
        }
    }

    fn overlaps(&self, date: NaiveDate, department: Department, start: NaiveTime, minutes: u32) -> bool {
        if self.department != department {
            return false;
        }
        let own_start = date.and_time(self.start);
        let own_end = own_start + Duration::minutes(i64::from(self.duration_minutes));
        let other_start = date.and_time(start);
        let other_end = other_start + Duration::minutes(i64::from(minutes));
        own_start < other_end && other_start < own_end
    }
}

impl SchedulingEngine {
    /// Plan a priority-ordered re-seating of `date` from `from_time` onward.
    ///
    /// Patients are taken by priority (highest first, ties by original start)
    /// and each gets the earliest grid slot in their department with room
    /// left among those already seated in this pass, plus earlier bookings
    /// that run past `from_time`. Patients who keep their time are left out.
    /// Nothing is mutated.
    pub fn auto_reschedule_priority(
        &self,
        book: &AppointmentBook,
        capacities: &DepartmentCapacity,
        date: NaiveDate,
        from_time: NaiveTime,
    ) -> Vec<RescheduledPatient> {
        let mut queue: Vec<&Appointment> = book
            .on_date(date)
            .filter(|a| a.start_time >= from_time)
            .collect();
        queue.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.start_time.cmp(&b.start_time))
        });

        let slots = self.policy().slots_from(from_time);

        // Earlier bookings still running at `from_time` hold their seats
        let cutover = date.and_time(from_time);
        let mut placed: Vec<Placement> = book
            .on_date(date)
            .filter(|a| a.start_time < from_time && a.ends_at() > cutover)
            .map(|a| Placement::of(a, a.start_time))
            .collect();
        let mut plan = Vec::new();

        for appointment in queue {
            let capacity = capacities.get(appointment.department) as usize;
            let seat = slots.iter().copied().find(|slot| {
                placed
                    .iter()
                    .filter(|p| {
                        p.overlaps(
                            date,
                            appointment.department,
                            *slot,
                            appointment.duration_minutes,
                        )
                    })
                    .count()
                    < capacity
            });

            match seat {
                Some(new_time) => {
                    placed.push(Placement::of(appointment, new_time));
                    if new_time != appointment.start_time {
                        plan.push(RescheduledPatient {
                            id: appointment.id.clone(),
                            name: appointment.patient_name.clone(),
                            priority: appointment.priority,
                            department: appointment.department,
                            date,
                            old_time: appointment.start_time,
                            new_time,
                            reason: PRIORITY_RESCHEDULE_REASON.to_string(),
                        });
                    }
                }
                None => {
                    warn!(
                        id = %appointment.id,
                        department = %appointment.department,
                        "No free slot left in priority pass, keeping original time"
                    );
                    placed.push(Placement::of(appointment, appointment.start_time));
                }
            }
        }

        debug!(%date, moves = plan.len(), "Priority reschedule planned");
        plan
    }

    /// Commit a plan. Every id is checked before anything moves.
    pub fn apply_plan(
        &self,
        book: &mut AppointmentBook,
        plan: &[RescheduledPatient],
        now: chrono::NaiveDateTime,
    ) -> ScheduleResult<Vec<RescheduleOutcome>> {
        if let Some(missing) = plan.iter().find(|p| !book.contains(&p.id)) {
            return Err(ScheduleError::NotFound(missing.id.clone()));
        }

        plan.iter()
            .map(|p| self.reschedule(&p.id, p.date, p.new_time, &p.reason, book, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn add(book: &mut AppointmentBook, id: &str, dept: Department, time: NaiveTime, priority: Priority) {
        book.push(Appointment::new(id, dept, date(), time).id(id).priority(priority));
    }

    #[test]
    fn test_critical_takes_earliest_slot() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        add(&mut book, "critical", Department::Neurology, hm(10, 0), Priority::Critical);
        add(&mut book, "low", Department::Neurology, hm(9, 30), Priority::Low);

        let plan = engine.auto_reschedule_priority(
            &book,
            &DepartmentCapacity::default(),
            date(),
            hm(9, 0),
        );

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "critical");
        assert_eq!(plan[0].old_time, hm(10, 0));
        assert_eq!(plan[0].new_time, hm(9, 0));
        assert_eq!(plan[0].reason, PRIORITY_RESCHEDULE_REASON);
        // Planning leaves the book alone
        assert_eq!(book.get("critical").unwrap().start_time, hm(10, 0));
    }

    #[test]
    fn test_ties_broken_by_start_time() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        add(&mut book, "late", Department::Neurology, hm(11, 0), Priority::High);
        add(&mut book, "early", Department::Neurology, hm(10, 30), Priority::High);

        let plan = engine.auto_reschedule_priority(
            &book,
            &DepartmentCapacity::default(),
            date(),
            hm(10, 0),
        );

        let moves: Vec<(&str, NaiveTime)> =
            plan.iter().map(|p| (p.id.as_str(), p.new_time)).collect();
        assert_eq!(moves, vec![("early", hm(10, 0)), ("late", hm(10, 30))]);
    }

    #[test]
    fn test_departments_do_not_share_capacity() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        add(&mut book, "n", Department::Neurology, hm(9, 0), Priority::Low);
        add(&mut book, "c", Department::Cardiology, hm(9, 0), Priority::Critical);

        let plan = engine.auto_reschedule_priority(
            &book,
            &DepartmentCapacity::default(),
            date(),
            hm(9, 0),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_earlier_appointments_untouched() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        add(&mut book, "before", Department::General, hm(9, 0), Priority::Critical);
        add(&mut book, "after", Department::General, hm(15, 0), Priority::Low);

        let plan = engine.auto_reschedule_priority(
            &book,
            &DepartmentCapacity::default(),
            date(),
            hm(12, 0),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "after");
        assert_eq!(plan[0].new_time, hm(12, 0));
    }

    #[test]
    fn test_booking_running_past_cutover_keeps_its_seat() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(
            Appointment::new("running", Department::Neurology, date(), hm(8, 45))
                .id("running")
                .duration(60),
        );
        add(&mut book, "late", Department::Neurology, hm(11, 0), Priority::Low);

        let plan = engine.auto_reschedule_priority(
            &book,
            &DepartmentCapacity::default(),
            date(),
            hm(9, 0),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "late");
        assert_eq!(plan[0].new_time, hm(10, 0));
    }

    #[test]
    fn test_apply_plan() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        add(&mut book, "critical", Department::Neurology, hm(10, 0), Priority::Critical);
        add(&mut book, "low", Department::Neurology, hm(9, 30), Priority::Low);
        let now = date().and_time(hm(8, 0));

        let plan = engine.auto_reschedule_priority(
            &book,
            &DepartmentCapacity::default(),
            date(),
            hm(9, 0),
        );
        let outcomes = engine.apply_plan(&mut book, &plan, now).unwrap();

        assert_eq!(outcomes.len(), 1);
        let moved = book.get("critical").unwrap();
        assert_eq!(moved.start_time, hm(9, 0));
        assert_eq!(moved.reschedule_reason.as_deref(), Some(PRIORITY_RESCHEDULE_REASON));
    }

    #[test]
    fn test_apply_plan_rejects_unknown_id_without_moving() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        add(&mut book, "a", Department::General, hm(10, 0), Priority::Low);
        let plan = vec![
            RescheduledPatient {
                id: "a".to_string(),
                name: "a".to_string(),
                priority: Priority::Low,
                department: Department::General,
                date: date(),
                old_time: hm(10, 0),
                new_time: hm(9, 0),
                reason: PRIORITY_RESCHEDULE_REASON.to_string(),
            },
            RescheduledPatient {
                id: "gone".to_string(),
                name: "gone".to_string(),
                priority: Priority::Low,
                department: Department::General,
                date: date(),
                old_time: hm(11, 0),
                new_time: hm(9, 30),
                reason: PRIORITY_RESCHEDULE_REASON.to_string(),
            },
        ];

        let err = engine
            .apply_plan(&mut book, &plan, date().and_time(hm(8, 0)))
            .unwrap_err();
        assert_eq!(err, ScheduleError::NotFound("gone".to_string()));
        assert_eq!(book.get("a").unwrap().start_time, hm(10, 0));
    }
}
