//! CSV Import
//!
//! Bulk appointment import for clinicflow. Every row goes through the regular
//! `submit` path, so capacity rules and the emergency-only window apply.
//!
//! Expected columns (header required):
//! `name,department,priority,type,date,time,duration,note`

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::schedule::{
    parse_date, parse_time, Appointment, AppointmentKind, Department, Priority, ScheduleResult,
    SubmitStatus,
};
use crate::store::AppointmentStore;

/// Error lines kept in a report before the rest are summarized
const MAX_REPORTED_ERRORS: usize = 100;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One CSV row as written
#[derive(Debug, Deserialize)]
struct AppointmentRecord {
    #[serde(default)]
    id: Option<String>,
    name: String,
    department: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    date: String,
    time: String,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default)]
    note: Option<String>,
}

impl AppointmentRecord {
    fn into_appointment(self, default_duration: u32) -> ScheduleResult<Appointment> {
        let department: Department = self.department.parse()?;
        let date = parse_date(&self.date)?;
        let time = parse_time(&self.time)?;

        let mut appointment = Appointment::new(self.name.trim(), department, date, time)
            .duration(self.duration.unwrap_or(default_duration));
        if let Some(id) = non_empty(self.id) {
            appointment = appointment.id(id);
        }
        if let Some(priority) = non_empty(self.priority) {
            appointment = appointment.priority(priority.parse::<Priority>()?);
        }
        if let Some(kind) = non_empty(self.kind) {
            appointment = appointment.kind(kind.parse::<AppointmentKind>()?);
        }
        if let Some(note) = non_empty(self.note) {
            appointment = appointment.health_note(note);
        }
        Ok(appointment)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Rows parsed from a CSV source, before submission
#[derive(Debug, Default)]
pub struct ParsedImport {
    pub appointments: Vec<(usize, Appointment)>,
    pub rows_failed: usize,
    pub errors: Vec<String>,
}

/// Outcome of importing a file into a store
#[derive(Debug, Default, serde::Serialize)]
pub struct ImportReport {
    pub rows_processed: usize,
    pub admitted: usize,
    pub needs_rescheduling: usize,
    pub rows_failed: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn record_error(&mut self, line: usize, error: impl std::fmt::Display) {
        self.rows_failed += 1;
        self.errors.push(format!("Line {}: {}", line, error));
    }

    fn truncate_errors(&mut self) {
        if self.errors.len() > MAX_REPORTED_ERRORS {
            let total = self.errors.len();
            self.errors.truncate(MAX_REPORTED_ERRORS);
            self.errors
                .push(format!("... and {} more errors", total - MAX_REPORTED_ERRORS));
        }
    }
}

/// CSV appointment importer
pub struct CsvImporter {
    /// Used when a row leaves `duration` empty
    default_duration: u32,
    delimiter: u8,
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvImporter {
    pub fn new() -> Self {
        Self {
            default_duration: crate::schedule::types::DEFAULT_DURATION_MINUTES,
            delimiter: b',',
        }
    }

    /// Set the duration used for rows without one
    pub fn with_default_duration(mut self, minutes: u32) -> Self {
        self.default_duration = minutes;
        self
    }

    /// Set the field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Parse rows from any reader. Bad rows are reported, not fatal.
    pub fn parse_reader<R: Read>(&self, source: R) -> Result<ParsedImport, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);

        let mut parsed = ParsedImport::default();
        for (idx, result) in reader.deserialize::<AppointmentRecord>().enumerate() {
            // Header is line 1
            let line = idx + 2;
            let outcome = result
                .map_err(|e| e.to_string())
                .and_then(|record| {
                    record
                        .into_appointment(self.default_duration)
                        .map_err(|e| e.to_string())
                });

            match outcome {
                Ok(appointment) => parsed.appointments.push((line, appointment)),
                Err(e) => {
                    parsed.rows_failed += 1;
                    parsed.errors.push(format!("Line {}: {}", line, e));
                }
            }
        }
        Ok(parsed)
    }

    pub fn parse_path(&self, path: &Path) -> Result<ParsedImport, ImportError> {
        let file = std::fs::File::open(path)?;
        self.parse_reader(file)
    }

    /// Import from a CSV string (useful for testing)
    pub fn parse_str(&self, csv_data: &str) -> Result<ParsedImport, ImportError> {
        self.parse_reader(csv_data.as_bytes())
    }

    /// Submit parsed rows into `store` in file order
    pub async fn submit_all(
        &self,
        parsed: ParsedImport,
        store: &AppointmentStore,
        now: NaiveDateTime,
    ) -> ImportReport {
        let mut report = ImportReport {
            rows_failed: parsed.rows_failed,
            errors: parsed.errors,
            ..Default::default()
        };

        for (line, appointment) in parsed.appointments {
            match store.submit_at(appointment, now).await {
                Ok(outcome) => {
                    report.rows_processed += 1;
                    match outcome.status {
                        SubmitStatus::Admitted => report.admitted += 1,
                        SubmitStatus::NeedsRescheduling => report.needs_rescheduling += 1,
                    }
                }
                Err(e) => report.record_error(line, e),
            }
        }

        report.truncate_errors();
        tracing::info!(
            "Import finished: {} processed, {} flagged, {} failed",
            report.rows_processed,
            report.needs_rescheduling,
            report.rows_failed
        );
        report
    }

    /// Parse `path` and submit every row into `store`
    pub async fn import_into(
        &self,
        path: &Path,
        store: &AppointmentStore,
        now: NaiveDateTime,
    ) -> Result<ImportReport, ImportError> {
        let parsed = self.parse_path(path)?;
        Ok(self.submit_all(parsed, store, now).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRepository, StoreConfig};
    use chrono::{NaiveDate, NaiveTime};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "name,department,priority,type,date,time,duration,note
John Doe,Cardiology,high,Scheduled,2024-01-01,10:00,30,Chest pain
Jane Smith,cardiology,Medium,scheduled,2024-01-01,10:00,45,
Bob Lee,CARDIOLOGY,low,,2024-01-01,10:15,,
Bad Row,Dermatology,low,Scheduled,2024-01-01,10:00,30,
Night Owl,General,low,Scheduled,2024-01-01,02:00,30,";

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_rows() {
        let parsed = CsvImporter::new().parse_str(SAMPLE).unwrap();

        assert_eq!(parsed.appointments.len(), 4);
        assert_eq!(parsed.rows_failed, 1);
        assert!(parsed.errors[0].starts_with("Line 5:"));

        let (line, john) = &parsed.appointments[0];
        assert_eq!(*line, 2);
        assert_eq!(john.priority, Priority::High);
        assert_eq!(john.health_note.as_deref(), Some("Chest pain"));

        let (_, bob) = &parsed.appointments[2];
        assert_eq!(bob.duration_minutes, 30);
        assert_eq!(bob.kind, AppointmentKind::Scheduled);
        assert_eq!(bob.start_time, NaiveTime::from_hms_opt(10, 15, 0).unwrap());
    }

    #[tokio::test]
    async fn test_import_into_store() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let store = AppointmentStore::open(StoreConfig::default(), Arc::new(MemoryRepository::new()))
            .await
            .unwrap();
        let report = CsvImporter::new()
            .import_into(file.path(), &store, now())
            .await
            .unwrap();

        assert_eq!(report.rows_processed, 4);
        // Third Cardiology patient overlaps both 10:00 bookings
        assert_eq!(report.needs_rescheduling, 1);
        assert_eq!(report.admitted, 3);
        assert_eq!(report.rows_failed, 1);

        let night = store
            .appointments()
            .await
            .into_iter()
            .find(|a| a.patient_name == "Night Owl")
            .unwrap();
        assert_eq!(night.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[tokio::test]
    async fn test_submit_errors_are_per_line() {
        let csv_data = "name,department,priority,type,date,time,duration,note
Too Long,General,low,Scheduled,2024-01-01,10:00,300,";

        let store = AppointmentStore::open(StoreConfig::default(), Arc::new(MemoryRepository::new()))
            .await
            .unwrap();
        let importer = CsvImporter::new();
        let parsed = importer.parse_str(csv_data).unwrap();
        let report = importer.submit_all(parsed, &store, now()).await;

        assert_eq!(report.rows_processed, 0);
        assert_eq!(report.rows_failed, 1);
        assert!(report.errors[0].contains("Invalid duration"));
    }
}
