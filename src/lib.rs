//! # Clinicflow
//!
//! Hospital appointment capacity and reschedule engine: decides when a time
//! slot is full, which patients must move, and where they move to.
//!
//! ## Features
//!
//! - **Capacity rules**: per-department doctor counts with interval overlap
//! - **Overcrowding detection**: excess patients plus free alternative slots
//! - **Priority rescheduling**: Critical patients never lose a slot to lower priorities
//! - **Shared store**: one mutation lock shared with the background sweep
//! - **Persistence**: JSON snapshots with a local fallback
//!
//! ## Modules
//!
//! - [`schedule`]: Pure scheduling engine
//! - [`store`]: Async appointment store and persistence seam
//! - [`import`]: CSV bulk import
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::{Local, NaiveTime};
//! use clinicflow::schedule::{Appointment, Department, Priority};
//! use clinicflow::store::{AppointmentStore, MemoryRepository, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = AppointmentStore::open(
//!         StoreConfig::default(),
//!         Arc::new(MemoryRepository::new()),
//!     )
//!     .await?;
//!
//!     let tomorrow = Local::now().date_naive().succ_opt().unwrap();
//!     let at_ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
//!
//!     let outcome = store
//!         .submit(
//!             Appointment::new("John Doe", Department::Cardiology, tomorrow, at_ten)
//!                 .priority(Priority::High)
//!                 .health_note("Chest pain, requires ECG"),
//!         )
//!         .await?;
//!     println!("{:?}", outcome.status);
//!
//!     for slot in store.detect_overcrowding(tomorrow).await {
//!         println!("{} excess patients", slot.excess.len());
//!     }
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod import;
pub mod schedule;
pub mod store;

// Re-export top-level types for convenience
pub use schedule::{
    Alert, Appointment, AppointmentBook, AppointmentKind, Department, DepartmentCapacity,
    OvercrowdedSlot, Priority, RescheduledPatient, ScheduleError, ScheduleResult,
    SchedulePolicy, SchedulingEngine, Severity, SubmitOutcome, SubmitStatus,
};

pub use store::{
    AppointmentStore, FallbackRepository, JsonFileRepository, MemoryRepository, Repository,
    StoreConfig, StoreError, StoreResult,
};

pub use config::{Config, ConfigError, LoggingConfig};

pub use import::{CsvImporter, ImportError, ImportReport};
