//! Core data types for the clinicflow scheduling engine
//!
//! This module defines the fundamental types used throughout the engine:
//! - `Appointment`: a single booked patient visit
//! - `Department`, `Priority` and `AppointmentKind`: classification enums
//! - `DepartmentCapacity`: doctor count per department
//! - `AppointmentBook`: the explicit appointment set handed to every engine call

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::{ScheduleError, ScheduleResult};

/// Shortest bookable appointment
pub const MIN_DURATION_MINUTES: u32 = 15;
/// Longest bookable appointment
pub const MAX_DURATION_MINUTES: u32 = 120;
/// Duration used when the caller does not give one
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

/// Hospital department
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    General,
    Cardiology,
    Orthopedics,
    Neurology,
    Emergency,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::General,
        Department::Cardiology,
        Department::Orthopedics,
        Department::Neurology,
        Department::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::General => "General",
            Department::Cardiology => "Cardiology",
            Department::Orthopedics => "Orthopedics",
            Department::Neurology => "Neurology",
            Department::Emergency => "Emergency",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(Department::General),
            "cardiology" => Ok(Department::Cardiology),
            "orthopedics" => Ok(Department::Orthopedics),
            "neurology" => Ok(Department::Neurology),
            "emergency" => Ok(Department::Emergency),
            other => Err(ScheduleError::Parse(format!("unknown department: {}", other))),
        }
    }
}

/// Clinical priority. Ordering is `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(ScheduleError::Parse(format!("unknown priority: {}", other))),
        }
    }
}

/// Whether the visit was booked ahead or is an emergency case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AppointmentKind {
    #[default]
    Scheduled,
    Emergency,
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentKind::Scheduled => f.write_str("Scheduled"),
            AppointmentKind::Emergency => f.write_str("Emergency"),
        }
    }
}

impl FromStr for AppointmentKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" => Ok(AppointmentKind::Scheduled),
            "emergency" => Ok(AppointmentKind::Emergency),
            other => Err(ScheduleError::Parse(format!(
                "unknown appointment type: {}",
                other
            ))),
        }
    }
}

/// A single patient appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_name: String,
    pub department: Department,
    pub priority: Priority,
    #[serde(rename = "type", default)]
    pub kind: AppointmentKind,
    pub date: NaiveDate,
    /// Minute resolution, serialized as `HH:MM`
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_note: Option<String>,
    /// Set whenever the engine or a user moves the appointment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reschedule_reason: Option<String>,
    /// Recorded over capacity; visible but not admitted
    #[serde(default)]
    pub needs_rescheduling: bool,
}

impl Appointment {
    /// Create a Medium-priority scheduled appointment with the default duration
    pub fn new(
        patient_name: impl Into<String>,
        department: Department,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Self {
        Self {
            id: format!("P{}", uuid::Uuid::new_v4().simple()),
            patient_name: patient_name.into(),
            department,
            priority: Priority::Medium,
            kind: AppointmentKind::Scheduled,
            date,
            start_time: truncate_to_minute(start_time),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            health_note: None,
            reschedule_reason: None,
            needs_rescheduling: false,
        }
    }

    /// Builder: set id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder: set priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set appointment type
    pub fn kind(mut self, kind: AppointmentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: set duration in minutes
    pub fn duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Builder: attach a health note
    pub fn health_note(mut self, note: impl Into<String>) -> Self {
        self.health_note = Some(note.into());
        self
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open interval overlap: `[start, end)`
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.starts_at() < end && start < self.ends_at()
    }

    /// Critical-priority and Emergency-type patients are never auto-relocated
    pub fn is_exempt(&self) -> bool {
        self.priority == Priority::Critical || self.kind == AppointmentKind::Emergency
    }

    pub fn has_valid_duration(&self) -> bool {
        (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&self.duration_minutes)
    }
}

/// Doctor count per department; each doctor sees one patient at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentCapacity {
    doctors: BTreeMap<Department, u32>,
}

impl Default for DepartmentCapacity {
    fn default() -> Self {
        let doctors = [
            (Department::General, 3),
            (Department::Cardiology, 2),
            (Department::Orthopedics, 2),
            (Department::Neurology, 1),
            (Department::Emergency, 5),
        ]
        .into_iter()
        .collect();
        Self { doctors }
    }
}

impl DepartmentCapacity {
    /// Doctor count for a department. Unconfigured departments get one doctor.
    pub fn get(&self, department: Department) -> u32 {
        self.doctors.get(&department).copied().unwrap_or(1).max(1)
    }

    /// Change a department's doctor count
    pub fn set(&mut self, department: Department, count: u32) -> ScheduleResult<()> {
        if count < 1 {
            return Err(ScheduleError::InvalidCapacity { department, count });
        }
        self.doctors.insert(department, count);
        Ok(())
    }

    /// Builder: set a doctor count, clamped to at least one
    pub fn with(mut self, department: Department, count: u32) -> Self {
        self.doctors.insert(department, count.max(1));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Department, u32)> + '_ {
        Department::ALL.into_iter().map(move |d| (d, self.get(d)))
    }
}

/// The appointment set, kept in arrival order.
///
/// Arrival order matters: when a slot is over capacity, whoever was booked
/// first keeps it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentBook {
    appointments: Vec<Appointment>,
}

impl AppointmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_appointments(appointments: Vec<Appointment>) -> Self {
        Self { appointments }
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter()
    }

    pub fn as_slice(&self) -> &[Appointment] {
        &self.appointments
    }

    pub fn into_vec(self) -> Vec<Appointment> {
        self.appointments
    }

    pub fn get(&self, id: &str) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Append in arrival order
    pub fn push(&mut self, appointment: Appointment) {
        self.appointments.push(appointment);
    }

    pub fn remove(&mut self, id: &str) -> Option<Appointment> {
        let idx = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(idx))
    }

    /// Remove every appointment matching `pred`, keeping the rest in order
    pub fn remove_where<F>(&mut self, pred: F) -> Vec<Appointment>
    where
        F: FnMut(&Appointment) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.appointments).into_iter().partition(pred);
        self.appointments = kept;
        removed
    }

    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter().filter(move |a| a.date == date)
    }

    /// Appointments in `department` on `date` overlapping
    /// `[start, start + duration)`, optionally ignoring one id.
    pub fn overlapping(
        &self,
        department: Department,
        date: NaiveDate,
        start: NaiveTime,
        duration_minutes: u32,
        exclude: Option<&str>,
    ) -> Vec<&Appointment> {
        let window_start = date.and_time(start);
        let window_end = window_start + Duration::minutes(i64::from(duration_minutes));

        self.appointments
            .iter()
            .filter(|a| a.department == department && a.date == date)
            .filter(|a| exclude.map_or(true, |id| a.id != id))
            .filter(|a| a.overlaps(window_start, window_end))
            .collect()
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`, seconds dropped)
pub fn parse_time(raw: &str) -> ScheduleResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(truncate_to_minute)
        .map_err(|_| ScheduleError::Parse(format!("invalid time of day: {}", raw)))
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> ScheduleResult<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ScheduleError::Parse(format!("invalid date: {}", raw)))
}

/// Format an instant as `YYYY-MM-DD HH:MM`
pub fn format_instant(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Serde adapter for `HH:MM` time-of-day fields
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}
