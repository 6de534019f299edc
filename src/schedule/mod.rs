//! Clinicflow Scheduling Engine
//!
//! This module decides when a time slot is full, which patients must move,
//! and where they move to:
//!
//! - **types**: Core data structures (Appointment, Department, AppointmentBook)
//! - **slots**: The 30-minute slot grid and per-slot availability
//! - **engine**: Submit, reschedule, delete and expiry
//! - **overcrowding**: Over-capacity slot detection
//! - **priority**: Priority-ordered batch rescheduling
//! - **summary**: Per-department load report
//! - **alert**: Severity-tagged alert records
//! - **error**: Error types
//!
//! # Capacity model
//!
//! Each department has a doctor count. A slot is full when the number of
//! same-department, same-date appointments overlapping the candidate's
//! `[start, start + duration)` interval reaches that count.
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::{Local, NaiveTime};
//! use clinicflow::schedule::*;
//!
//! let engine = SchedulingEngine::default();
//! let capacities = DepartmentCapacity::default();
//! let mut book = AppointmentBook::new();
//! let now = Local::now().naive_local();
//!
//! let tomorrow = now.date().succ_opt().unwrap();
//! let candidate = Appointment::new(
//!     "John Doe",
//!     Department::Cardiology,
//!     tomorrow,
//!     NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
//! )
//! .priority(Priority::High);
//!
//! let outcome = engine.submit(candidate, &mut book, &capacities, now).unwrap();
//! assert!(outcome.is_admitted());
//!
//! for slot in engine.detect_overcrowding(&book, &capacities, tomorrow) {
//!     println!("{:?} needs {} moves", slot.slot, slot.excess.len());
//! }
//! ```

pub mod alert;
pub mod engine;
pub mod error;
pub mod overcrowding;
pub mod priority;
pub mod slots;
pub mod summary;
pub mod types;

// Re-export commonly used types
pub use alert::{
    severity_for_load, Alert, AlertLog, AlertSummary, Severity, MAX_ALERT_RETENTION_HOURS,
};
pub use engine::{
    Advisory, RescheduleOutcome, SchedulingEngine, SubmitOutcome, SubmitStatus,
    EMERGENCY_WINDOW_REASON, MANUAL_RESCHEDULE_REASON, SMART_RESCHEDULE_REASON,
};
pub use error::{ScheduleError, ScheduleResult};
pub use overcrowding::{OvercrowdedSlot, SlotDescriptor, PEAK_HOURS};
pub use priority::{RescheduledPatient, PRIORITY_RESCHEDULE_REASON};
pub use slots::{SchedulePolicy, SlotAvailability};
pub use summary::{DepartmentLoad, ScheduleSummary};
pub use types::{
    format_instant, parse_date, parse_time, Appointment, AppointmentBook, AppointmentKind,
    Department, DepartmentCapacity, Priority, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
