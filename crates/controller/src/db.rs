//! SQLite data logger: sensor snapshots, alert history, irrigation runs.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use time::Date;

use crate::alerts::AlertEvent;
use crate::model::SensorSnapshot;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationEvent {
    pub ts_start: i64,
    pub ts_end: i64,
    pub reason: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredAlert {
    pub ts: i64,
    pub kind: String,
    pub severity: String,
    pub subject: Option<String>,
    pub message: String,
}

/// Aggregates over one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub day: String, // YYYY-MM-DD
    pub samples: i64,
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_soil_moisture: Option<f64>,
    pub min_soil_moisture: Option<f64>,
    pub rain_samples: i64,
    pub irrigation_runs: i64,
    pub irrigation_secs: i64,
    pub alerts: i64,
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/bloom/bloom.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Each in-memory connection is its own database; pin it to one.
        let pool = if db_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        }
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ----------------------------
    // Snapshots
    // ----------------------------

    pub async fn append_snapshot(&self, s: &SensorSnapshot) -> Result<()> {
        let soil = serde_json::to_string(&s.soil_moisture).context("encode soil_moisture")?;
        sqlx::query(
            r#"
            INSERT INTO snapshots (
              ts, temperature, humidity, soil_moisture, soil_mean, light_level, rain_detected
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(s.ts)
        .bind(s.temperature.map(f64::from))
        .bind(s.humidity.map(f64::from))
        .bind(soil)
        .bind(s.mean_soil_moisture().map(f64::from))
        .bind(s.light_level.map(f64::from))
        .bind(s.rain_detected)
        .execute(&self.pool)
        .await
        .context("append_snapshot failed")?;
        Ok(())
    }

    pub async fn latest_snapshot(&self) -> Result<Option<SensorSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT ts, temperature, humidity, soil_moisture, light_level, rain_detected
            FROM snapshots
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("latest_snapshot failed")?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// Newest first.
    pub async fn recent_snapshots(&self, n: i64) -> Result<Vec<SensorSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT ts, temperature, humidity, soil_moisture, light_level, rain_detected
            FROM snapshots
            ORDER BY ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await
        .context("recent_snapshots failed")?;

        rows.iter().map(snapshot_from_row).collect()
    }

    // ----------------------------
    // Alerts
    // ----------------------------

    pub async fn insert_alert(&self, a: &AlertEvent) -> Result<()> {
        let payload = serde_json::to_string(&a.payload).context("encode alert payload")?;
        sqlx::query(
            r#"
            INSERT INTO alerts (ts, kind, severity, subject, message, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(a.ts)
        .bind(a.kind.as_str())
        .bind(a.severity.as_str())
        .bind(a.subject.as_deref())
        .bind(a.message())
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("insert_alert failed")?;
        Ok(())
    }

    /// Newest first.
    pub async fn recent_alerts(&self, n: i64) -> Result<Vec<StoredAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT ts, kind, severity, subject, message
            FROM alerts
            ORDER BY ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await
        .context("recent_alerts failed")?;

        rows.iter()
            .map(|r| -> Result<StoredAlert, sqlx::Error> {
                Ok(StoredAlert {
                    ts: r.try_get("ts")?,
                    kind: r.try_get("kind")?,
                    severity: r.try_get("severity")?,
                    subject: r.try_get("subject")?,
                    message: r.try_get("message")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .context("decode alert row")
    }

    // ----------------------------
    // Irrigation events
    // ----------------------------

    pub async fn insert_irrigation_event(&self, e: &IrrigationEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO irrigation_events (ts_start, ts_end, reason, result)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(e.ts_start)
        .bind(e.ts_end)
        .bind(&e.reason)
        .bind(&e.result)
        .execute(&self.pool)
        .await
        .context("insert_irrigation_event failed")?;
        Ok(())
    }

    // ----------------------------
    // Daily statistics
    // ----------------------------

    pub async fn daily_statistics(&self, day: Date) -> Result<DailyStats> {
        let start = day.midnight().assume_utc().unix_timestamp();
        let end = start + 86_400;

        let snaps = sqlx::query(
            r#"
            SELECT COUNT(*) AS samples,
                   AVG(temperature) AS avg_t,
                   AVG(humidity) AS avg_h,
                   AVG(soil_mean) AS avg_m,
                   MIN(soil_mean) AS min_m,
                   COALESCE(SUM(rain_detected = 1), 0) AS rain
            FROM snapshots
            WHERE ts >= ? AND ts < ?
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .context("daily_statistics (snapshots) failed")?;

        let runs = sqlx::query(
            r#"
            SELECT COUNT(*) AS runs, COALESCE(SUM(ts_end - ts_start), 0) AS secs
            FROM irrigation_events
            WHERE ts_start >= ? AND ts_start < ?
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .context("daily_statistics (irrigation) failed")?;

        let alerts: i64 = sqlx::query("SELECT COUNT(*) FROM alerts WHERE ts >= ? AND ts < ?")
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await
            .context("daily_statistics (alerts) failed")?
            .try_get(0)?;

        Ok(DailyStats {
            day: format!("{:04}-{:02}-{:02}", day.year(), day.month() as u8, day.day()),
            samples: snaps.try_get("samples")?,
            avg_temperature: snaps.try_get("avg_t")?,
            avg_humidity: snaps.try_get("avg_h")?,
            avg_soil_moisture: snaps.try_get("avg_m")?,
            min_soil_moisture: snaps.try_get("min_m")?,
            rain_samples: snaps.try_get("rain")?,
            irrigation_runs: runs.try_get("runs")?,
            irrigation_secs: runs.try_get("secs")?,
            alerts,
        })
    }
}

fn snapshot_from_row(r: &SqliteRow) -> Result<SensorSnapshot> {
    let soil: String = r.try_get("soil_moisture")?;
    let soil_moisture: Vec<Option<f32>> =
        serde_json::from_str(&soil).with_context(|| format!("bad soil_moisture json: {soil}"))?;
    let f = |col: &str| -> Result<Option<f32>> {
        Ok(r.try_get::<Option<f64>, _>(col)?.map(|v| v as f32))
    };
    Ok(SensorSnapshot {
        ts: r.try_get("ts")?,
        temperature: f("temperature")?,
        humidity: f("humidity")?,
        soil_moisture,
        light_level: f("light_level")?,
        rain_detected: r.try_get("rain_detected")?,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
