//! Scheduling engine error types
//!
//! Only hard failures live here. Over-capacity admissions and emergency-window
//! shifts are reported as [`Advisory`](super::Advisory) values instead, because
//! the appointment is still recorded.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use super::types::{Department, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};

/// Errors that can occur in the scheduling engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Candidate start time has already elapsed
    #[error("Appointment start {start} is in the past (now {now})")]
    PastAppointment {
        start: NaiveDateTime,
        now: NaiveDateTime,
    },

    /// Target appointment id is not in the book
    #[error("Appointment not found: {0}")]
    NotFound(String),

    /// An appointment with the same id is already booked
    #[error("Duplicate appointment id: {0}")]
    DuplicateId(String),

    /// Duration outside the bookable range
    #[error(
        "Invalid duration: {0} minutes (must be between {} and {})",
        MIN_DURATION_MINUTES,
        MAX_DURATION_MINUTES
    )]
    InvalidDuration(u32),

    /// Requested slot has no spare capacity
    #[error("No capacity left in {department} on {date} at {}", .time.format("%H:%M"))]
    SlotUnavailable {
        department: Department,
        date: NaiveDate,
        time: NaiveTime,
    },

    /// Shifting the booking would run past the last representable date
    #[error("No calendar day after {0}")]
    DateOutOfRange(NaiveDate),

    /// Doctor count below one
    #[error("Invalid capacity for {department}: {count} (must be at least 1)")]
    InvalidCapacity { department: Department, count: u32 },

    /// Field value could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for scheduling operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScheduleError::NotFound("P001".to_string());
        assert_eq!(err.to_string(), "Appointment not found: P001");

        let err = ScheduleError::InvalidDuration(200);
        assert_eq!(
            err.to_string(),
            "Invalid duration: 200 minutes (must be between 15 and 120)"
        );

        let err = ScheduleError::DateOutOfRange(NaiveDate::MAX);
        assert!(err.to_string().starts_with("No calendar day after"));
    }

    #[test]
    fn test_slot_unavailable_formats_minutes() {
        let err = ScheduleError::SlotUnavailable {
            department: Department::Cardiology,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "No capacity left in Cardiology on 2024-01-01 at 10:30"
        );
    }
}
