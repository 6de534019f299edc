//! Appointment store
//!
//! Shared-service wrapper around the scheduling engine. All mutations and
//! sweeps go through one async mutex over the appointment book, so a
//! read-check-write in `submit` can never interleave with another.
//!
//! Lock order: book, then capacities, then alert log.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::{interval, Duration};

use super::error::StoreResult;
use super::repository::{Repository, Snapshot};
use crate::schedule::{
    severity_for_load, Alert, AlertLog, AlertSummary, Appointment, AppointmentBook, Department,
    DepartmentCapacity, OvercrowdedSlot, RescheduleOutcome, RescheduledPatient, SchedulePolicy,
    ScheduleSummary, SchedulingEngine, SlotAvailability, SubmitOutcome, MAX_ALERT_RETENTION_HOURS,
};

/// Configuration for the appointment store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Seconds between background sweeps (default: 60)
    pub sweep_interval_secs: u64,
    /// Hours an alert stays active (default: 4, clamped to at most a year)
    pub alert_retention_hours: i64,
    /// Buffered alerts per subscriber before old ones are dropped
    pub alert_channel_capacity: usize,
    /// Used when the snapshot carries no capacities of its own
    pub capacities: DepartmentCapacity,
    pub policy: SchedulePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            alert_retention_hours: 4,
            alert_channel_capacity: 256,
            capacities: DepartmentCapacity::default(),
            policy: SchedulePolicy::default(),
        }
    }
}

/// What one background sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired: usize,
    pub overcrowded_slots: usize,
    pub alerts_raised: usize,
    pub alerts_pruned: usize,
    pub flushed: bool,
}

type SlotKey = (NaiveDate, NaiveTime, Department);

pub struct AppointmentStore {
    config: StoreConfig,
    engine: SchedulingEngine,
    book: Mutex<AppointmentBook>,
    capacities: RwLock<DepartmentCapacity>,
    alerts: Mutex<AlertLog>,
    alert_tx: broadcast::Sender<Alert>,
    /// Overcrowded slots already announced by the sweep
    reported: Mutex<HashSet<SlotKey>>,
    repository: Arc<dyn Repository>,
    dirty: AtomicBool,
    /// Capacities differ from config and belong in the snapshot
    capacities_overridden: AtomicBool,
    shutdown: watch::Sender<bool>,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl AppointmentStore {
    /// Open a store over `repository`, loading its latest snapshot
    pub async fn open(config: StoreConfig, repository: Arc<dyn Repository>) -> StoreResult<Self> {
        let snapshot = repository.load().await?;
        tracing::info!(
            "Loaded {} appointments from {} repository",
            snapshot.appointments.len(),
            repository.name()
        );

        let capacities_overridden = snapshot.capacities.is_some();
        let capacities = snapshot
            .capacities
            .unwrap_or_else(|| config.capacities.clone());

        let retention_hours = config
            .alert_retention_hours
            .clamp(1, MAX_ALERT_RETENTION_HOURS);
        let mut alert_log = AlertLog::new(chrono::Duration::hours(retention_hours));
        alert_log.extend(snapshot.alerts);

        let (alert_tx, _) = broadcast::channel(config.alert_channel_capacity.max(1));

        Ok(Self {
            engine: SchedulingEngine::new(config.policy),
            book: Mutex::new(AppointmentBook::from_appointments(snapshot.appointments)),
            capacities: RwLock::new(capacities),
            alerts: Mutex::new(alert_log),
            alert_tx,
            reported: Mutex::new(HashSet::new()),
            repository,
            dirty: AtomicBool::new(false),
            capacities_overridden: AtomicBool::new(capacities_overridden),
            shutdown: watch::channel(false).0,
            config,
        })
    }

    pub fn engine(&self) -> &SchedulingEngine {
        &self.engine
    }

    /// Receive every alert the store raises from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.alert_tx.subscribe()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    async fn publish(&self, alerts: Vec<Alert>) {
        if alerts.is_empty() {
            return;
        }
        let mut log = self.alerts.lock().await;
        for alert in alerts {
            // No receivers is fine
            let _ = self.alert_tx.send(alert.clone());
            log.push(alert);
        }
        self.mark_dirty();
    }

    // ---- Mutations ----

    pub async fn submit(&self, candidate: Appointment) -> StoreResult<SubmitOutcome> {
        self.submit_at(candidate, local_now()).await
    }

    pub async fn submit_at(
        &self,
        candidate: Appointment,
        now: NaiveDateTime,
    ) -> StoreResult<SubmitOutcome> {
        let mut book = self.book.lock().await;
        let outcome = {
            let capacities = self.capacities.read().await;
            self.engine.submit(candidate, &mut book, &capacities, now)?
        };
        self.mark_dirty();
        self.publish(outcome.alerts.clone()).await;
        Ok(outcome)
    }

    pub async fn reschedule(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
        reason: &str,
    ) -> StoreResult<RescheduleOutcome> {
        self.reschedule_at(id, new_date, new_start, reason, local_now())
            .await
    }

    pub async fn reschedule_at(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
        reason: &str,
        now: NaiveDateTime,
    ) -> StoreResult<RescheduleOutcome> {
        let mut book = self.book.lock().await;
        let outcome = self
            .engine
            .reschedule(id, new_date, new_start, reason, &mut book, now)?;
        self.mark_dirty();
        self.publish(vec![outcome.alert.clone()]).await;
        Ok(outcome)
    }

    pub async fn reschedule_to_available(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
        reason: Option<&str>,
    ) -> StoreResult<RescheduleOutcome> {
        self.reschedule_to_available_at(id, new_date, new_start, reason, local_now())
            .await
    }

    pub async fn reschedule_to_available_at(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> StoreResult<RescheduleOutcome> {
        let mut book = self.book.lock().await;
        let outcome = {
            let capacities = self.capacities.read().await;
            self.engine.reschedule_to_available(
                id,
                new_date,
                new_start,
                reason,
                &mut book,
                &capacities,
                now,
            )?
        };
        self.mark_dirty();
        self.publish(vec![outcome.alert.clone()]).await;
        Ok(outcome)
    }

    pub async fn delete(&self, id: &str) -> StoreResult<Appointment> {
        let mut book = self.book.lock().await;
        let removed = self.engine.delete(id, &mut book)?;
        self.mark_dirty();
        Ok(removed)
    }

    pub async fn expire_completed(&self) -> Vec<Appointment> {
        self.expire_completed_at(local_now()).await
    }

    pub async fn expire_completed_at(&self, now: NaiveDateTime) -> Vec<Appointment> {
        let mut book = self.book.lock().await;
        let removed = self.engine.expire_completed(&mut book, now);
        if let Some(alert) = self.engine.completion_alert(&removed, now) {
            self.mark_dirty();
            self.publish(vec![alert]).await;
        }
        removed
    }

    /// Plan and commit a priority reschedule in one critical section
    pub async fn apply_priority_reschedule_at(
        &self,
        date: NaiveDate,
        from_time: NaiveTime,
        now: NaiveDateTime,
    ) -> StoreResult<Vec<RescheduledPatient>> {
        let mut book = self.book.lock().await;
        let plan = {
            let capacities = self.capacities.read().await;
            self.engine
                .auto_reschedule_priority(&book, &capacities, date, from_time)
        };
        let outcomes = self.engine.apply_plan(&mut book, &plan, now)?;
        if !outcomes.is_empty() {
            self.mark_dirty();
            tracing::info!("Applied priority reschedule: {} patients moved", outcomes.len());
        }
        self.publish(outcomes.into_iter().map(|o| o.alert).collect())
            .await;
        Ok(plan)
    }

    pub async fn set_capacity(&self, department: Department, count: u32) -> StoreResult<()> {
        self.capacities.write().await.set(department, count)?;
        self.capacities_overridden.store(true, Ordering::SeqCst);
        self.mark_dirty();
        tracing::info!("Capacity for {} set to {}", department, count);
        Ok(())
    }

    // ---- Reads ----

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.book.lock().await.iter().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Appointment> {
        self.book.lock().await.get(id).cloned()
    }

    pub async fn capacities(&self) -> DepartmentCapacity {
        self.capacities.read().await.clone()
    }

    pub async fn detect_overcrowding(&self, date: NaiveDate) -> Vec<OvercrowdedSlot> {
        let book = self.book.lock().await;
        let capacities = self.capacities.read().await;
        self.engine.detect_overcrowding(&book, &capacities, date)
    }

    pub async fn plan_priority_reschedule(
        &self,
        date: NaiveDate,
        from_time: NaiveTime,
    ) -> Vec<RescheduledPatient> {
        let book = self.book.lock().await;
        let capacities = self.capacities.read().await;
        self.engine
            .auto_reschedule_priority(&book, &capacities, date, from_time)
    }

    pub async fn available_slots(
        &self,
        department: Department,
        date: NaiveDate,
        duration_minutes: u32,
        exclude: Option<&str>,
    ) -> Vec<SlotAvailability> {
        let book = self.book.lock().await;
        let capacities = self.capacities.read().await;
        self.engine.available_slots(
            &book,
            &capacities,
            department,
            date,
            duration_minutes,
            exclude,
        )
    }

    pub async fn summary(&self, date: NaiveDate) -> ScheduleSummary {
        let book = self.book.lock().await;
        let capacities = self.capacities.read().await;
        self.engine.schedule_summary(&book, &capacities, date)
    }

    pub async fn active_alerts_at(&self, now: NaiveDateTime) -> Vec<Alert> {
        self.alerts
            .lock()
            .await
            .active(now)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn alert_summary_at(&self, now: NaiveDateTime) -> AlertSummary {
        self.alerts.lock().await.summary(now)
    }

    // ---- Persistence ----

    /// Save a snapshot through the repository if anything changed
    pub async fn flush(&self) -> StoreResult<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = {
            let book = self.book.lock().await;
            let capacities = self.capacities.read().await;
            let alerts = self.alerts.lock().await;
            Snapshot {
                appointments: book.iter().cloned().collect(),
                capacities: self
                    .capacities_overridden
                    .load(Ordering::SeqCst)
                    .then(|| capacities.clone()),
                alerts: alerts.all().to_vec(),
            }
        };

        tracing::debug!(
            "Flushing {} appointments to {} repository",
            snapshot.appointments.len(),
            self.repository.name()
        );
        if let Err(e) = self.repository.save(&snapshot).await {
            self.mark_dirty();
            return Err(e.into());
        }
        Ok(())
    }

    /// Expire finished appointments and announce newly overcrowded slots
    /// for today. Flushes when anything changed.
    pub async fn sweep_at(&self, now: NaiveDateTime) -> StoreResult<SweepReport> {
        let mut report = SweepReport::default();
        {
            let mut book = self.book.lock().await;

            let expired = self.engine.expire_completed(&mut book, now);
            report.expired = expired.len();
            let mut raised: Vec<Alert> = self
                .engine
                .completion_alert(&expired, now)
                .into_iter()
                .collect();

            let overcrowded = {
                let capacities = self.capacities.read().await;
                self.engine
                    .detect_overcrowding(&book, &capacities, now.date())
            };
            report.overcrowded_slots = overcrowded.len();

            let mut reported = self.reported.lock().await;
            let current: HashSet<SlotKey> = overcrowded
                .iter()
                .map(|s| (s.slot.date, s.slot.time, s.slot.department))
                .collect();
            for slot in &overcrowded {
                let key = (slot.slot.date, slot.slot.time, slot.slot.department);
                if reported.contains(&key) {
                    continue;
                }
                let severity = severity_for_load(slot.slot.predicted, slot.slot.capacity);
                tracing::warn!(
                    "{} overcrowded at {}: {}/{}",
                    slot.slot.department,
                    slot.slot.time.format("%H:%M"),
                    slot.slot.predicted,
                    slot.slot.capacity
                );
                raised.push(Alert::new(
                    severity,
                    format!(
                        "{} overcrowded at {}: {} patients for {} doctors, {} to relocate",
                        slot.slot.department,
                        slot.slot.time.format("%H:%M"),
                        slot.slot.predicted,
                        slot.slot.capacity,
                        slot.excess.len()
                    ),
                    now,
                ));
            }
            // Slots that recovered may be announced again later
            *reported = current;
            drop(reported);

            if report.expired > 0 {
                self.mark_dirty();
            }
            report.alerts_raised = raised.len();
            self.publish(raised).await;

            let pruned = self.alerts.lock().await.clear_older_than(now);
            if pruned > 0 {
                self.mark_dirty();
            }
            report.alerts_pruned = pruned;
        }

        if self.is_dirty() {
            self.flush().await?;
            report.flushed = true;
        }

        tracing::debug!(?report, "Sweep complete");
        Ok(report)
    }

    /// Start the periodic sweep task. It stops after `shutdown`.
    pub fn start_background_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let sweep_interval = Duration::from_secs(store.config.sweep_interval_secs.max(1));

        let mut shutdown_rx = store.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                if let Err(e) = store.sweep_at(local_now()).await {
                    tracing::error!("Background sweep failed: {}", e);
                }
            }

            // Final flush on shutdown
            if let Err(e) = store.flush().await {
                tracing::error!("Final flush failed: {}", e);
            }
        })
    }

    /// Stop the background sweep and flush pending changes
    pub async fn shutdown(&self) -> StoreResult<()> {
        self.shutdown.send_replace(true);
        self.flush().await
    }
}
