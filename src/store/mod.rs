//! Clinicflow Appointment Store
//!
//! Wraps the scheduling engine as a shared service:
//!
//! - **appointment_store**: Single mutation path plus the periodic sweep
//! - **repository**: Persistence collaborator seam with file and fallback backends
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clinicflow::store::{AppointmentStore, JsonFileRepository, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = Arc::new(JsonFileRepository::new("appointments.json"));
//!     let store = Arc::new(AppointmentStore::open(StoreConfig::default(), repository).await?);
//!
//!     let sweep = store.start_background_sweep();
//!     let mut alerts = store.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(alert) = alerts.recv().await {
//!             println!("[{}] {}", alert.severity, alert.message);
//!         }
//!     });
//!
//!     store.shutdown().await?;
//!     sweep.await?;
//!     Ok(())
//! }
//! ```

pub mod appointment_store;
pub mod error;
pub mod repository;

pub use appointment_store::{AppointmentStore, StoreConfig, SweepReport};
pub use error::{RepositoryError, RepositoryResult, StoreError, StoreResult};
pub use repository::{
    FallbackRepository, JsonFileRepository, MemoryRepository, Repository, Snapshot,
};
