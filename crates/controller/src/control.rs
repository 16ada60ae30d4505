//! The fixed-period control loop: sample -> evaluate -> actuate -> alert ->
//! log -> sleep. Every per-iteration failure is recorded and logged; none of
//! them stops the loop.

use bloom_hardware::Power;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use time::{Date, OffsetDateTime, Time};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::actuators::ActuatorBank;
use crate::alerts::{detect_alerts, AlertDispatcher, AlertEvent, AlertKind, Delivery, Severity};
use crate::config::{Config, IrrigationGuard, Mode};
use crate::db::{Db, IrrigationEvent};
use crate::evaluator::evaluate;
use crate::health::{health_alerts, HealthMonitor};
use crate::model::{ActuatorState, SensorSnapshot};
use crate::sensors::{FaultTracker, SensorSuite};
use crate::state::SystemState;

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Paces the loop. `tick` resolves when the next iteration should run, or
/// returns `false` once the loop should stop.
pub(crate) trait Ticker {
    async fn tick(&mut self) -> bool;
}

/// Production ticker: a tokio interval raced against a shutdown future.
pub struct IntervalTicker {
    interval: Interval,
    shutdown: Pin<Box<dyn Future<Output = ()> + Send>>,
    stopped: bool,
}

impl IntervalTicker {
    pub fn new(period: Duration, shutdown: impl Future<Output = ()> + Send + 'static) -> Self {
        let mut interval = tokio::time::interval(period);
        // An overrunning iteration delays the schedule instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            shutdown: Box::pin(shutdown),
            stopped: false,
        }
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        tokio::select! {
            biased;
            _ = &mut self.shutdown => {
                info!("shutdown requested");
                self.stopped = true;
                false
            }
            _ = self.interval.tick() => true,
        }
    }
}

pub type Clock = Box<dyn FnMut() -> OffsetDateTime + Send>;

// ---------------------------------------------------------------------------
// Irrigation guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    /// Pump held off until `until` after a forced stop.
    Resting { until: i64 },
    /// Pump has run for `ran_secs`, at or past the cap.
    CutOff { ran_secs: i64 },
}

/// Caps a continuous pump run and enforces a rest period after a forced stop.
pub struct PumpGuard {
    max_run: i64,
    rest: i64,
    running_since: Option<i64>,
    rest_until: Option<i64>,
}

impl PumpGuard {
    pub fn new(cfg: &IrrigationGuard) -> Self {
        Self {
            max_run: cfg.max_run_secs as i64,
            rest: cfg.rest_secs as i64,
            running_since: None,
            rest_until: None,
        }
    }

    /// Filter the evaluator's pump decision at time `now`. A run the
    /// evaluator is already ending is a normal stop, not a cutoff.
    pub fn check(&mut self, desired: Power, now: i64) -> (Power, GuardVerdict) {
        if let Some(since) = self.running_since.filter(|_| desired.is_on()) {
            let ran = now - since;
            if ran >= self.max_run {
                self.rest_until = Some(now + self.rest);
                return (Power::Off, GuardVerdict::CutOff { ran_secs: ran });
            }
        }
        match self.rest_until {
            Some(until) if now < until => {
                if desired.is_on() {
                    return (Power::Off, GuardVerdict::Resting { until });
                }
            }
            Some(_) => self.rest_until = None,
            None => {}
        }
        (desired, GuardVerdict::Allow)
    }

    /// Record the pump's actual state after actuation.
    pub fn observe(&mut self, actual: Power, now: i64) {
        match (actual, self.running_since) {
            (Power::On, None) => self.running_since = Some(now),
            (Power::Off, Some(_)) => self.running_since = None,
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Daily report scheduling
// ---------------------------------------------------------------------------

/// True once per UTC day, at or after `at`.
pub(crate) fn report_due(now: OffsetDateTime, last: Option<Date>, at: Time) -> bool {
    now.time() >= at && last != Some(now.date())
}

fn due(last: Option<i64>, now: i64, every_secs: u64) -> bool {
    last.map_or(true, |l| now - l >= every_secs as i64)
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// What one iteration saw and did.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub snapshot: SensorSnapshot,
    pub desired: ActuatorState,
    pub actual: ActuatorState,
    pub sent: Vec<AlertKind>,
    pub suppressed: Vec<AlertKind>,
    pub errors: u64,
    pub logged: bool,
}

struct PumpRun {
    started_ts: i64,
    reason: String,
}

pub struct ControlLoop {
    cfg: Config,
    report_at: Option<Time>,
    sensors: SensorSuite,
    actuators: ActuatorBank,
    dispatcher: AlertDispatcher,
    db: Db,
    health: HealthMonitor,
    faults: FaultTracker,
    guard: PumpGuard,
    state: SystemState,
    clock: Clock,
    last_rain: Option<bool>,
    last_log_ts: Option<i64>,
    last_health_ts: Option<i64>,
    last_report_day: Option<Date>,
    report_primed: bool,
    pump_run: Option<PumpRun>,
}

impl ControlLoop {
    pub fn new(
        cfg: Config,
        sensors: SensorSuite,
        actuators: ActuatorBank,
        dispatcher: AlertDispatcher,
        db: Db,
    ) -> Self {
        Self {
            report_at: cfg.daily_report_time(),
            faults: FaultTracker::new(cfg.alerts.sensor_fault_after),
            guard: PumpGuard::new(&cfg.irrigation),
            state: SystemState::new(&cfg.farm_name, cfg.mode),
            cfg,
            sensors,
            actuators,
            dispatcher,
            db,
            health: HealthMonitor::new(),
            clock: Box::new(OffsetDateTime::now_utc),
            last_rain: None,
            last_log_ts: None,
            last_health_ts: None,
            last_report_day: None,
            report_primed: false,
            pump_run: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Run until the ticker stops, then shut down cleanly.
    pub(crate) async fn run<T: Ticker>(&mut self, ticker: &mut T) {
        self.startup().await;

        let period = Duration::from_secs(self.cfg.timing.sensor_read_interval_secs);
        while ticker.tick().await {
            let started = Instant::now();
            let report = self.run_iteration().await;
            let elapsed = started.elapsed();
            if elapsed > period {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_secs = period.as_secs(),
                    "iteration overran its period"
                );
            }
            debug!(
                loop_count = self.state.loop_count,
                errors = report.errors,
                logged = report.logged,
                "iteration complete"
            );
        }

        self.shutdown().await;
    }

    pub async fn startup(&mut self) {
        let ts = (self.clock)().unix_timestamp();
        info!(farm = %self.cfg.farm_name, mode = %self.cfg.mode, zones = self.sensors.zone_count(), "controller starting");
        self.state.record_system(ts, "controller started".into());

        for e in self.actuators.safe_state() {
            self.fail(ts, e.to_string());
        }

        let ev = AlertEvent::new(
            AlertKind::Startup,
            Severity::Info,
            ts,
            json!({
                "farm": self.cfg.farm_name,
                "mode": self.cfg.mode.to_string(),
                "zones": self.sensors.zone_count(),
            }),
        );
        self.dispatch(vec![ev]).await;
    }

    pub async fn run_iteration(&mut self) -> IterationReport {
        let now = (self.clock)();
        let ts = now.unix_timestamp();
        let errors_before = self.state.error_count;
        let mut alerts = Vec::new();

        // ── Sample ──────────────────────────────────────────
        let sample = self.sensors.sample(ts);
        let failed = sample.failures().count();
        if failed > 0 {
            debug!(failed, "snapshot has unknown readings");
        }
        for f in self.faults.observe(&sample.outcomes) {
            alerts.push(
                AlertEvent::new(
                    AlertKind::SensorFault,
                    Severity::Critical,
                    ts,
                    json!({"streak": f.streak, "error": f.error.to_string()}),
                )
                .about(f.sensor),
            );
        }
        let snapshot = sample.snapshot;

        // ── Evaluate + guard ────────────────────────────────
        let current = self.actuators.state();
        let mut desired = evaluate(&snapshot, &self.cfg.thresholds, &current);
        let (pump, verdict) = self.guard.check(desired.pump, ts);
        desired.pump = pump;

        let mut stop_result = None;
        match verdict {
            GuardVerdict::CutOff { ran_secs } => {
                let rest_secs = self.cfg.irrigation.rest_secs;
                warn!(ran_secs, rest_secs, "irrigation run cap reached, forcing pump off");
                alerts.push(AlertEvent::new(
                    AlertKind::IrrigationCutoff,
                    Severity::Warning,
                    ts,
                    json!({"duration_secs": ran_secs, "rest_secs": rest_secs}),
                ));
                stop_result = Some("cutoff");
            }
            GuardVerdict::Resting { until } => {
                debug!(remaining_secs = until - ts, "pump resting after cutoff");
            }
            GuardVerdict::Allow => {}
        }

        // ── Actuate ─────────────────────────────────────────
        match self.cfg.mode {
            Mode::Auto => {
                for e in self.actuators.apply(&desired) {
                    alerts.push(
                        AlertEvent::new(
                            AlertKind::ActuatorFault,
                            Severity::Warning,
                            ts,
                            json!({"error": e.to_string()}),
                        )
                        .about(e.actuator()),
                    );
                    self.fail(ts, e.to_string());
                }
            }
            Mode::Monitor => {
                if desired != current {
                    debug!(?desired, "monitor mode, actuators left unchanged");
                }
            }
        }

        let actual = self.actuators.state();
        self.guard.observe(actual.pump, ts);
        let stop_result = stop_result
            .or((snapshot.rain_detected == Some(true)).then_some("rain"))
            .unwrap_or("completed");
        self.track_pump(actual.pump, ts, stop_result, snapshot.mean_soil_moisture(), &mut alerts)
            .await;

        // ── Alerts ──────────────────────────────────────────
        alerts.extend(detect_alerts(&snapshot, self.last_rain, &self.cfg.thresholds));
        if snapshot.rain_detected.is_some() {
            self.last_rain = snapshot.rain_detected;
        }
        let (mut sent, mut suppressed) = self.dispatch(alerts).await;

        // ── Data log ────────────────────────────────────────
        let mut logged = false;
        if due(self.last_log_ts, ts, self.cfg.timing.data_log_interval_secs) {
            match self.db.append_snapshot(&snapshot).await {
                Ok(()) => {
                    self.last_log_ts = Some(ts);
                    logged = true;
                }
                Err(e) => self.fail(ts, format!("{e:#}")),
            }
        }

        // ── Health ──────────────────────────────────────────
        if due(self.last_health_ts, ts, self.cfg.timing.health_check_interval_secs) {
            self.last_health_ts = Some(ts);
            let report = self.health.check();
            debug!(?report, "health check");
            let (s, q) = self
                .dispatch(health_alerts(&report, &self.cfg.health, ts))
                .await;
            sent.extend(s);
            suppressed.extend(q);
        }

        // ── Daily report ────────────────────────────────────
        if let Some(ev) = self.daily_report(now).await {
            let (s, _) = self.dispatch(vec![ev]).await;
            sent.extend(s);
        }

        // ── Status ──────────────────────────────────────────
        self.state.record_iteration(snapshot.clone(), actual);
        self.publish_status();
        if self.state.loop_count % self.cfg.timing.status_every_loops == 0 {
            info!(
                loops = self.state.loop_count,
                uptime_secs = self.state.uptime_secs(),
                errors = self.state.error_count,
                "status"
            );
        }

        IterationReport {
            snapshot,
            desired,
            actual,
            sent,
            suppressed,
            errors: self.state.error_count - errors_before,
            logged,
        }
    }

    /// Actuators to the safe state, close any open irrigation run, send the
    /// shutdown alert and log final statistics.
    pub async fn shutdown(&mut self) {
        let ts = (self.clock)().unix_timestamp();
        info!("controller stopping");

        for e in self.actuators.safe_state() {
            self.fail(ts, e.to_string());
        }

        let mut alerts = Vec::new();
        let pump = self.actuators.state().pump;
        self.guard.observe(pump, ts);
        self.track_pump(pump, ts, "shutdown", None, &mut alerts).await;

        alerts.push(AlertEvent::new(
            AlertKind::Shutdown,
            Severity::Info,
            ts,
            json!({
                "loops": self.state.loop_count,
                "errors": self.state.error_count,
                "uptime_secs": self.state.uptime_secs(),
            }),
        ));
        self.dispatch(alerts).await;

        self.state.actuators = self.actuators.state();
        self.state.record_system(ts, "controller stopped".into());
        self.publish_status();

        info!(
            loops = self.state.loop_count,
            errors = self.state.error_count,
            uptime_secs = self.state.uptime_secs(),
            "final statistics"
        );
    }

    // -- helpers ------------------------------------------------------------

    fn fail(&mut self, ts: i64, detail: String) {
        warn!(ts, "{detail}");
        self.state.record_error(ts, detail);
    }

    /// Open or close the irrigation run record on pump transitions.
    async fn track_pump(
        &mut self,
        pump: Power,
        ts: i64,
        stop_result: &str,
        moisture: Option<f32>,
        alerts: &mut Vec<AlertEvent>,
    ) {
        match (pump, self.pump_run.take()) {
            (Power::On, None) => {
                let reason = match moisture {
                    Some(m) => format!("soil moisture {m:.0}%"),
                    None => "soil moisture unknown".to_string(),
                };
                info!(%reason, "irrigation started");
                alerts.push(AlertEvent::new(
                    AlertKind::IrrigationStarted,
                    Severity::Info,
                    ts,
                    json!({"moisture": moisture}),
                ));
                self.pump_run = Some(PumpRun {
                    started_ts: ts,
                    reason,
                });
            }
            (Power::On, Some(run)) => self.pump_run = Some(run),
            (Power::Off, Some(run)) => {
                let duration = ts - run.started_ts;
                info!(duration_secs = duration, result = stop_result, "irrigation stopped");
                let event = IrrigationEvent {
                    ts_start: run.started_ts,
                    ts_end: ts,
                    reason: run.reason,
                    result: stop_result.to_string(),
                };
                if let Err(e) = self.db.insert_irrigation_event(&event).await {
                    self.fail(ts, format!("{e:#}"));
                }
                alerts.push(AlertEvent::new(
                    AlertKind::IrrigationStopped,
                    Severity::Info,
                    ts,
                    json!({"duration_secs": duration, "result": stop_result}),
                ));
            }
            (Power::Off, None) => {}
        }
    }

    /// Deliver each alert once; record delivered ones in the DB and the
    /// event ring.
    async fn dispatch(&mut self, alerts: Vec<AlertEvent>) -> (Vec<AlertKind>, Vec<AlertKind>) {
        let mut sent = Vec::new();
        let mut suppressed = Vec::new();
        for ev in alerts {
            match self.dispatcher.notify(&ev) {
                Ok(Delivery::Sent) => {
                    sent.push(ev.kind);
                    self.state.record_alert(ev.ts, ev.message());
                    if let Err(e) = self.db.insert_alert(&ev).await {
                        self.fail(ev.ts, format!("{e:#}"));
                    }
                }
                Ok(Delivery::Suppressed) => {
                    debug!(alert = ev.kind.as_str(), "alert suppressed (cooldown)");
                    suppressed.push(ev.kind);
                }
                Err(e) => self.fail(ev.ts, format!("alert {} not delivered: {e}", ev.kind)),
            }
        }
        (sent, suppressed)
    }

    /// Summary of the previous UTC day, once per day at the configured time.
    /// A controller started after the report time waits for the next day.
    async fn daily_report(&mut self, now: OffsetDateTime) -> Option<AlertEvent> {
        let at = self.report_at?;
        if !self.report_primed {
            self.report_primed = true;
            if now.time() >= at {
                self.last_report_day = Some(now.date());
            }
        }
        if !report_due(now, self.last_report_day, at) {
            return None;
        }
        self.last_report_day = Some(now.date());

        let day = now.date().previous_day().unwrap_or(now.date());
        let stats = match self.db.daily_statistics(day).await {
            Ok(s) => s,
            Err(e) => {
                self.fail(now.unix_timestamp(), format!("{e:#}"));
                return None;
            }
        };
        info!(day = %stats.day, samples = stats.samples, irrigation_runs = stats.irrigation_runs, "daily report");
        let payload = serde_json::to_value(&stats).unwrap_or_else(|_| json!({}));
        Some(AlertEvent::new(
            AlertKind::DailyReport,
            Severity::Info,
            now.unix_timestamp(),
            payload,
        ))
    }

    fn publish_status(&mut self) {
        let Some(path) = self.cfg.storage.status_file.clone() else {
            return;
        };
        if let Err(e) = self.state.write_status_file(std::path::Path::new(&path)) {
            let ts = self.state.latest.as_ref().map_or(0, |s| s.ts);
            self.fail(ts, format!("{e:#}"));
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
