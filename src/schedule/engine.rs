//! Scheduling engine
//!
//! The engine is a pure computation over an explicit [`AppointmentBook`]:
//! - `submit`: validate a candidate against capacity rules and record it
//! - `reschedule` / `reschedule_to_available`: move an existing appointment
//! - `delete`: explicit removal
//! - `expire_completed`: end-of-appointment cleanup
//! - `available_slots`: grid annotated with occupancy for pickers
//!
//! Overcrowding detection, priority rescheduling and the load summary live in
//! sibling modules as further `impl SchedulingEngine` blocks.
//!
//! Every operation takes `now` explicitly. Callers sharing a book between
//! tasks must serialize calls themselves (see `store::AppointmentStore`).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::alert::{Alert, Severity};
use super::error::{ScheduleError, ScheduleResult};
use super::slots::{slot_availability, SchedulePolicy, SlotAvailability};
use super::types::{
    format_instant, hhmm, Appointment, AppointmentBook, AppointmentKind, Department,
    DepartmentCapacity,
};

/// Reason attached when a non-emergency booking lands in the emergency-only window
pub const EMERGENCY_WINDOW_REASON: &str =
    "Rescheduled to tomorrow — only emergency cases after 12 AM";

/// Default reason for availability-checked reschedules
pub const SMART_RESCHEDULE_REASON: &str = "Smart rescheduling based on doctor availability";

/// Default reason for operator-driven reschedules
pub const MANUAL_RESCHEDULE_REASON: &str = "Manual reschedule";

/// Whether the submitted appointment was admitted within capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitStatus {
    Admitted,
    NeedsRescheduling,
}

/// Non-fatal conditions raised while recording an appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// The slot was already full; the appointment is recorded but flagged
    CapacityExceeded {
        department: Department,
        date: NaiveDate,
        #[serde(with = "hhmm")]
        time: NaiveTime,
        occupancy: usize,
        capacity: u32,
    },
    /// A non-emergency booking before opening was moved to the next day
    EmergencyWindowViolation {
        requested: NaiveDateTime,
        shifted_to: NaiveDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    /// The appointment as recorded, after any shift or flagging
    pub appointment: Appointment,
    pub advisories: Vec<Advisory>,
    pub alerts: Vec<Alert>,
}

impl SubmitOutcome {
    pub fn is_admitted(&self) -> bool {
        self.status == SubmitStatus::Admitted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleOutcome {
    pub appointment: Appointment,
    pub previous: NaiveDateTime,
    pub alert: Alert,
}

/// Capacity and reschedule rules over an appointment book
#[derive(Debug, Clone, Default)]
pub struct SchedulingEngine {
    policy: SchedulePolicy,
}

impl SchedulingEngine {
    pub fn new(policy: SchedulePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Validate and record a new appointment.
    ///
    /// Hard failures leave the book untouched. Otherwise the appointment is
    /// always appended; an over-capacity slot only flags it.
    pub fn submit(
        &self,
        mut candidate: Appointment,
        book: &mut AppointmentBook,
        capacities: &DepartmentCapacity,
        now: NaiveDateTime,
    ) -> ScheduleResult<SubmitOutcome> {
        if !candidate.has_valid_duration() {
            return Err(ScheduleError::InvalidDuration(candidate.duration_minutes));
        }
        if book.contains(&candidate.id) {
            return Err(ScheduleError::DuplicateId(candidate.id));
        }
        let requested = candidate.starts_at();
        if requested < now {
            return Err(ScheduleError::PastAppointment {
                start: requested,
                now,
            });
        }

        let mut advisories = Vec::new();
        let mut alerts = Vec::new();

        if candidate.kind != AppointmentKind::Emergency
            && self.policy.in_emergency_window(candidate.start_time)
        {
            let next_day = candidate
                .date
                .succ_opt()
                .ok_or(ScheduleError::DateOutOfRange(candidate.date))?;
            candidate.date = next_day;
            candidate.start_time = self.policy.opening;
            candidate.reschedule_reason = Some(EMERGENCY_WINDOW_REASON.to_string());

            let shifted_to = candidate.starts_at();
            info!(
                id = %candidate.id,
                from = %format_instant(requested),
                to = %format_instant(shifted_to),
                "Moved non-emergency booking out of emergency-only window"
            );
            alerts.push(Alert::new(
                Severity::Medium,
                format!(
                    "{} moved from {} to {}: only emergency cases before {}",
                    candidate.patient_name,
                    format_instant(requested),
                    format_instant(shifted_to),
                    self.policy.emergency_only_until.format("%H:%M")
                ),
                now,
            ));
            advisories.push(Advisory::EmergencyWindowViolation {
                requested,
                shifted_to,
            });
        }

        let capacity = capacities.get(candidate.department);
        let occupancy = book
            .overlapping(
                candidate.department,
                candidate.date,
                candidate.start_time,
                candidate.duration_minutes,
                None,
            )
            .len();

        let status = if occupancy >= capacity as usize {
            candidate.needs_rescheduling = true;
            warn!(
                id = %candidate.id,
                department = %candidate.department,
                occupancy,
                capacity,
                "Slot over capacity, appointment flagged for rescheduling"
            );
            alerts.push(Alert::new(
                Severity::High,
                format!(
                    "{} over capacity at {} ({}/{} doctors booked): {} needs rescheduling",
                    candidate.department,
                    format_instant(candidate.starts_at()),
                    occupancy + 1,
                    capacity,
                    candidate.patient_name
                ),
                now,
            ));
            advisories.push(Advisory::CapacityExceeded {
                department: candidate.department,
                date: candidate.date,
                time: candidate.start_time,
                occupancy: occupancy + 1,
                capacity,
            });
            SubmitStatus::NeedsRescheduling
        } else {
            debug!(id = %candidate.id, occupancy, capacity, "Appointment admitted");
            SubmitStatus::Admitted
        };

        book.push(candidate.clone());

        Ok(SubmitOutcome {
            status,
            appointment: candidate,
            advisories,
            alerts,
        })
    }

    /// Move an appointment without re-checking capacity. May overbook.
    pub fn reschedule(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
        reason: &str,
        book: &mut AppointmentBook,
        now: NaiveDateTime,
    ) -> ScheduleResult<RescheduleOutcome> {
        let appointment = book
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;

        let previous = appointment.starts_at();
        appointment.date = new_date;
        appointment.start_time = new_start;
        appointment.reschedule_reason = Some(reason.to_string());

        let current = appointment.starts_at();
        info!(
            id,
            from = %format_instant(previous),
            to = %format_instant(current),
            reason,
            "Appointment rescheduled"
        );

        let alert = Alert::new(
            Severity::Medium,
            format!(
                "{} rescheduled from {} to {}",
                appointment.patient_name,
                format_instant(previous),
                format_instant(current)
            ),
            now,
        );

        Ok(RescheduleOutcome {
            appointment: appointment.clone(),
            previous,
            alert,
        })
    }

    /// Move an appointment only if the target slot has room for it.
    ///
    /// The appointment itself does not count against the target. On success
    /// the over-capacity flag is cleared.
    #[allow(clippy::too_many_arguments)]
    pub fn reschedule_to_available(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
        reason: Option<&str>,
        book: &mut AppointmentBook,
        capacities: &DepartmentCapacity,
        now: NaiveDateTime,
    ) -> ScheduleResult<RescheduleOutcome> {
        let existing = book
            .get(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;

        let target = new_date.and_time(new_start);
        if target < now {
            return Err(ScheduleError::PastAppointment { start: target, now });
        }

        let department = existing.department;
        let occupancy = book
            .overlapping(
                department,
                new_date,
                new_start,
                existing.duration_minutes,
                Some(id),
            )
            .len();
        if occupancy >= capacities.get(department) as usize {
            return Err(ScheduleError::SlotUnavailable {
                department,
                date: new_date,
                time: new_start,
            });
        }

        let mut outcome = self.reschedule(
            id,
            new_date,
            new_start,
            reason.unwrap_or(SMART_RESCHEDULE_REASON),
            book,
            now,
        )?;
        if let Some(appointment) = book.get_mut(id) {
            appointment.needs_rescheduling = false;
        }
        outcome.appointment.needs_rescheduling = false;
        Ok(outcome)
    }

    pub fn delete(&self, id: &str, book: &mut AppointmentBook) -> ScheduleResult<Appointment> {
        let removed = book
            .remove(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        info!(id, patient = %removed.patient_name, "Appointment deleted");
        Ok(removed)
    }

    /// Remove appointments whose window has fully elapsed.
    pub fn expire_completed(
        &self,
        book: &mut AppointmentBook,
        now: NaiveDateTime,
    ) -> Vec<Appointment> {
        let removed = book.remove_where(|a| now > a.ends_at());
        if !removed.is_empty() {
            info!(count = removed.len(), "Expired completed appointments");
        }
        removed
    }

    /// LOW alert listing expired patients, if any were removed
    pub fn completion_alert(&self, removed: &[Appointment], now: NaiveDateTime) -> Option<Alert> {
        if removed.is_empty() {
            return None;
        }
        let names: Vec<&str> = removed.iter().map(|a| a.patient_name.as_str()).collect();
        Some(Alert::new(
            Severity::Low,
            format!(
                "{} appointment(s) completed and removed: {}",
                removed.len(),
                names.join(", ")
            ),
            now,
        ))
    }

    /// Grid slots for a department/date annotated with occupancy
    pub fn available_slots(
        &self,
        book: &AppointmentBook,
        capacities: &DepartmentCapacity,
        department: Department,
        date: NaiveDate,
        duration_minutes: u32,
        exclude: Option<&str>,
    ) -> Vec<SlotAvailability> {
        slot_availability(
            &self.policy,
            book,
            capacities,
            department,
            date,
            duration_minutes,
            exclude,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::types::Priority;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn now() -> NaiveDateTime {
        day(1).and_time(hm(0, 30))
    }

    #[test]
    fn test_third_cardiology_patient_needs_rescheduling() {
        let engine = SchedulingEngine::default();
        let caps = DepartmentCapacity::default();
        let mut book = AppointmentBook::new();

        for name in ["A", "B"] {
            let outcome = engine
                .submit(
                    Appointment::new(name, Department::Cardiology, day(1), hm(10, 0)),
                    &mut book,
                    &caps,
                    now(),
                )
                .unwrap();
            assert!(outcome.is_admitted());
            assert!(outcome.alerts.is_empty());
        }

        let outcome = engine
            .submit(
                Appointment::new("C", Department::Cardiology, day(1), hm(10, 0)),
                &mut book,
                &caps,
                now(),
            )
            .unwrap();

        assert_eq!(outcome.status, SubmitStatus::NeedsRescheduling);
        assert!(outcome.appointment.needs_rescheduling);
        assert_eq!(book.len(), 3);
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].severity, Severity::High);
        assert!(outcome.alerts[0].message.contains("3/2"));
        assert!(matches!(
            outcome.advisories[0],
            Advisory::CapacityExceeded {
                occupancy: 3,
                capacity: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_past_submission_rejected_without_mutation() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        let now = day(2).and_time(hm(12, 0));

        let err = engine
            .submit(
                Appointment::new("Late", Department::General, day(2), hm(11, 0)),
                &mut book,
                &DepartmentCapacity::default(),
                now,
            )
            .unwrap_err();

        assert!(matches!(err, ScheduleError::PastAppointment { .. }));
        assert!(book.is_empty());
    }

    #[test]
    fn test_non_emergency_before_opening_moves_to_next_day() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();

        let outcome = engine
            .submit(
                Appointment::new("Night", Department::General, day(1), hm(2, 0)),
                &mut book,
                &DepartmentCapacity::default(),
                now(),
            )
            .unwrap();

        assert!(outcome.is_admitted());
        assert_eq!(outcome.appointment.date, day(2));
        assert_eq!(outcome.appointment.start_time, hm(9, 0));
        assert_eq!(
            outcome.appointment.reschedule_reason.as_deref(),
            Some(EMERGENCY_WINDOW_REASON)
        );
        assert!(matches!(
            outcome.advisories[0],
            Advisory::EmergencyWindowViolation { .. }
        ));
        assert_eq!(outcome.alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn test_emergency_type_keeps_night_slot() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();

        let outcome = engine
            .submit(
                Appointment::new("Trauma", Department::Emergency, day(1), hm(2, 0))
                    .kind(AppointmentKind::Emergency),
                &mut book,
                &DepartmentCapacity::default(),
                now(),
            )
            .unwrap();

        assert_eq!(outcome.appointment.date, day(1));
        assert_eq!(outcome.appointment.start_time, hm(2, 0));
        assert!(outcome.advisories.is_empty());
    }

    #[test]
    fn test_shifted_booking_is_checked_at_new_slot() {
        let engine = SchedulingEngine::default();
        let caps = DepartmentCapacity::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("Morning", Department::Neurology, day(2), hm(9, 0)));

        let outcome = engine
            .submit(
                Appointment::new("Night", Department::Neurology, day(1), hm(3, 0)),
                &mut book,
                &caps,
                now(),
            )
            .unwrap();

        assert_eq!(outcome.status, SubmitStatus::NeedsRescheduling);
        assert_eq!(outcome.advisories.len(), 2);
    }

    #[test]
    fn test_invalid_duration_and_duplicate_id() {
        let engine = SchedulingEngine::default();
        let caps = DepartmentCapacity::default();
        let mut book = AppointmentBook::new();

        let err = engine
            .submit(
                Appointment::new("Long", Department::General, day(1), hm(10, 0)).duration(180),
                &mut book,
                &caps,
                now(),
            )
            .unwrap_err();
        assert_eq!(err, ScheduleError::InvalidDuration(180));

        let appt = Appointment::new("Once", Department::General, day(1), hm(10, 0)).id("P1");
        engine.submit(appt.clone(), &mut book, &caps, now()).unwrap();
        let err = engine.submit(appt, &mut book, &caps, now()).unwrap_err();
        assert_eq!(err, ScheduleError::DuplicateId("P1".to_string()));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_reschedule_preserves_other_fields() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(
            Appointment::new("John", Department::Cardiology, day(1), hm(10, 0))
                .id("P1")
                .priority(Priority::High)
                .health_note("ECG"),
        );

        let outcome = engine
            .reschedule("P1", day(3), hm(14, 30), "Doctor unavailable", &mut book, now())
            .unwrap();

        let updated = book.get("P1").unwrap();
        assert_eq!(updated.date, day(3));
        assert_eq!(updated.start_time, hm(14, 30));
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.health_note.as_deref(), Some("ECG"));
        assert_eq!(updated.reschedule_reason.as_deref(), Some("Doctor unavailable"));
        assert_eq!(outcome.alert.severity, Severity::Medium);
        assert_eq!(
            outcome.alert.message,
            "John rescheduled from 2024-01-01 10:00 to 2024-01-03 14:30"
        );
    }

    #[test]
    fn test_reschedule_unknown_id() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("John", Department::General, day(1), hm(10, 0)));
        let before = book.clone();

        let err = engine
            .reschedule("missing", day(2), hm(10, 0), "x", &mut book, now())
            .unwrap_err();
        assert_eq!(err, ScheduleError::NotFound("missing".to_string()));
        assert_eq!(book, before);
    }

    #[test]
    fn test_reschedule_may_overbook() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("A", Department::Neurology, day(1), hm(10, 0)).id("A"));
        book.push(Appointment::new("B", Department::Neurology, day(1), hm(11, 0)).id("B"));

        engine
            .reschedule("B", day(1), hm(10, 0), "manual", &mut book, now())
            .unwrap();
        assert_eq!(
            book.overlapping(Department::Neurology, day(1), hm(10, 0), 30, None)
                .len(),
            2
        );
    }

    #[test]
    fn test_reschedule_to_available_checks_target() {
        let engine = SchedulingEngine::default();
        let caps = DepartmentCapacity::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("A", Department::Neurology, day(1), hm(10, 0)).id("A"));
        let mut flagged = Appointment::new("B", Department::Neurology, day(1), hm(10, 0)).id("B");
        flagged.needs_rescheduling = true;
        book.push(flagged);

        let err = engine
            .reschedule_to_available("B", day(1), hm(10, 15), None, &mut book, &caps, now())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::SlotUnavailable { .. }));
        assert_eq!(book.get("B").unwrap().start_time, hm(10, 0));

        let outcome = engine
            .reschedule_to_available("B", day(1), hm(10, 30), None, &mut book, &caps, now())
            .unwrap();
        assert!(!outcome.appointment.needs_rescheduling);
        assert!(!book.get("B").unwrap().needs_rescheduling);
        assert_eq!(
            book.get("B").unwrap().reschedule_reason.as_deref(),
            Some(SMART_RESCHEDULE_REASON)
        );
    }

    #[test]
    fn test_reschedule_to_available_rejects_past_target() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("A", Department::General, day(2), hm(14, 0)).id("A"));
        let now = day(2).and_time(hm(12, 0));

        let err = engine
            .reschedule_to_available(
                "A",
                day(2),
                hm(11, 0),
                None,
                &mut book,
                &DepartmentCapacity::default(),
                now,
            )
            .unwrap_err();

        assert_eq!(
            err,
            ScheduleError::PastAppointment {
                start: day(2).and_time(hm(11, 0)),
                now,
            }
        );
        let unchanged = book.get("A").unwrap();
        assert_eq!(unchanged.date, day(2));
        assert_eq!(unchanged.start_time, hm(14, 0));
        assert!(unchanged.reschedule_reason.is_none());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_shift_past_last_date_is_out_of_range() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();

        let err = engine
            .submit(
                Appointment::new("Far", Department::General, NaiveDate::MAX, hm(8, 0)),
                &mut book,
                &DepartmentCapacity::default(),
                now(),
            )
            .unwrap_err();

        assert_eq!(err, ScheduleError::DateOutOfRange(NaiveDate::MAX));
        assert!(book.is_empty());
    }

    #[test]
    fn test_reschedule_to_available_ignores_itself() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("A", Department::Neurology, day(1), hm(10, 0)).id("A"));

        let outcome = engine.reschedule_to_available(
            "A",
            day(1),
            hm(10, 15),
            Some("later"),
            &mut book,
            &DepartmentCapacity::default(),
            now(),
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_delete() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("A", Department::General, day(1), hm(10, 0)).id("A"));

        assert_eq!(engine.delete("A", &mut book).unwrap().id, "A");
        assert!(book.is_empty());
        assert!(matches!(
            engine.delete("A", &mut book),
            Err(ScheduleError::NotFound(_))
        ));
    }

    #[test]
    fn test_expire_completed_is_idempotent() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("Done", Department::General, day(1), hm(9, 0)));
        book.push(Appointment::new("Running", Department::General, day(1), hm(9, 30)).duration(60));
        book.push(Appointment::new("Later", Department::General, day(1), hm(15, 0)));

        let now = day(1).and_time(hm(10, 0));
        let removed = engine.expire_completed(&mut book, now);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].patient_name, "Done");
        assert_eq!(book.len(), 2);

        let alert = engine.completion_alert(&removed, now).unwrap();
        assert_eq!(alert.severity, Severity::Low);
        assert!(alert.message.contains("Done"));

        assert!(engine.expire_completed(&mut book, now).is_empty());
        assert!(engine.completion_alert(&[], now).is_none());
    }

    #[test]
    fn test_appointment_ending_exactly_now_is_kept() {
        let engine = SchedulingEngine::default();
        let mut book = AppointmentBook::new();
        book.push(Appointment::new("Edge", Department::General, day(1), hm(9, 0)));

        let removed = engine.expire_completed(&mut book, day(1).and_time(hm(9, 30)));
        assert!(removed.is_empty());
    }
}
