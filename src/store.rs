//! ==============================================================================
//! store.rs - append-only sqlite reading table
//! ==============================================================================
//!
//! purpose:
//!     persists flattened readings to a single local sqlite file and answers
//!     the two history queries the dashboard needs.
//!
//! connection model:
//!     no connection is held between calls. every operation opens the file,
//!     does its work and drops the handle. concurrent writers (poller) and
//!     readers (api) are serialized by sqlite itself; busy_timeout covers the
//!     short lock windows.
//!
//! timestamps:
//!     stored as `YYYY-MM-DDTHH:MM:SSZ` (utc). the vendor's compact form
//!     `20250705T011804Z` is rewritten on the way in so that string order is
//!     time order and the `timestamp >= cutoff` filter works in sql.
//!
//! relationships:
//!     - used by: poller.rs (append), server.rs (history queries)
//!     - blocking: async callers go through Store::run (spawn_blocking)
//!
//! ==============================================================================

use crate::domain::{ChartPoint, Reading, RecentRow};
use crate::error::StoreError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const VENDOR_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS sensor_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT,
        temperature REAL,
        humidity REAL,
        vis_b REAL, vis_g REAL, vis_o REAL, vis_r REAL, vis_v REAL, vis_y REAL,
        nir_r REAL, nir_s REAL, nir_t REAL, nir_u REAL, nir_v REAL, nir_w REAL,
        DW REAL, SC REAL,
        "L*" REAL, "a*" REAL, "b*" REAL,
        "L/B" REAL, BI REAL
    )
"#;

#[derive(Clone, Debug)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// run a store operation on the blocking pool
    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }

    /// create the reading table if it does not exist yet
    pub fn init(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = self.connect()?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(())
    }

    /// insert one reading, returning its row id.
    ///
    /// absent measurements are written as 0.0, and a reading without an
    /// event time is stamped with the current time.
    pub fn append(&self, reading: &Reading) -> Result<i64, StoreError> {
        let timestamp = reading
            .timestamp
            .as_deref()
            .map(normalize_timestamp)
            .unwrap_or_else(|| Utc::now().format(STORED_TIMESTAMP_FORMAT).to_string());
        let z = |v: Option<f64>| v.unwrap_or(0.0);
        let vis = |i: usize| reading.vis.get(i).unwrap_or(0.0);
        let nir = |i: usize| reading.nir.get(i).unwrap_or(0.0);

        let conn = self.connect()?;
        conn.execute(
            r#"INSERT INTO sensor_data (
                timestamp, temperature, humidity,
                vis_v, vis_b, vis_g, vis_y, vis_o, vis_r,
                nir_r, nir_s, nir_t, nir_u, nir_v, nir_w,
                DW, SC, "L*", "a*", "b*", "L/B", BI
            ) VALUES (?1, ?2, ?3,
                      ?4, ?5, ?6, ?7, ?8, ?9,
                      ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22)"#,
            params![
                timestamp,
                z(reading.temperature),
                z(reading.humidity),
                vis(0),
                vis(1),
                vis(2),
                vis(3),
                vis(4),
                vis(5),
                nir(0),
                nir(1),
                nir(2),
                nir(3),
                nir(4),
                nir(5),
                z(reading.dw),
                z(reading.sc),
                z(reading.l_star),
                z(reading.a_star),
                z(reading.b_star),
                z(reading.lb),
                z(reading.bi),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))?;
        Ok(count)
    }

    /// rows from the trailing `window`, oldest first
    pub fn query_recent(&self, window: Duration) -> Result<Vec<RecentRow>, StoreError> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.query_recent_since(cutoff)
    }

    pub fn query_recent_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecentRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, temperature, humidity
             FROM sensor_data
             WHERE timestamp >= ?1
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(
                params![cutoff.format(STORED_TIMESTAMP_FORMAT).to_string()],
                |row| {
                    Ok(RecentRow {
                        timestamp: row.get(0)?,
                        temperature: row.get(1)?,
                        humidity: row.get(2)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// thin the newest `scan_limit` rows into at most `max_points` chart
    /// points at least `min_gap` apart, oldest first
    pub fn query_recent_distinct_points(
        &self,
        max_points: usize,
        min_gap: Duration,
        scan_limit: usize,
    ) -> Result<Vec<ChartPoint>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, timestamp, "L/B", BI
               FROM sensor_data
               ORDER BY id DESC
               LIMIT ?1"#,
        )?;
        let newest_first = stmt
            .query_map(params![i64::try_from(scan_limit).unwrap_or(i64::MAX)], |row| {
                Ok(ChartPoint {
                    id: row.get(0)?,
                    timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    lb: row.get(2)?,
                    bi: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decimate(newest_first, max_points, min_gap))
    }
}

/// greedy thinning over rows given newest first. the first parseable row is
/// kept; each later row is kept only if it is at least `min_gap` older than
/// the last kept one. output is oldest first.
fn decimate(newest_first: Vec<ChartPoint>, max_points: usize, min_gap: Duration) -> Vec<ChartPoint> {
    let mut kept: Vec<ChartPoint> = Vec::new();
    let mut last_kept: Option<NaiveDateTime> = None;

    for point in newest_first {
        if kept.len() >= max_points {
            break;
        }
        let Some(ts) = parse_stored_timestamp(&point.timestamp) else {
            tracing::debug!(id = point.id, timestamp = %point.timestamp, "skipping row with unparseable timestamp");
            continue;
        };
        let keep = match last_kept {
            None => true,
            Some(last) => (last - ts).to_std().map(|gap| gap >= min_gap).unwrap_or(false),
        };
        if keep {
            last_kept = Some(ts);
            kept.push(point);
        }
    }

    kept.reverse();
    kept
}

/// rewrite vendor / rfc3339 times into the stored sortable form
pub fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, VENDOR_TIMESTAMP_FORMAT) {
        return ts.format(STORED_TIMESTAMP_FORMAT).to_string();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return ts.with_timezone(&Utc).format(STORED_TIMESTAMP_FORMAT).to_string();
    }
    trimmed.to_string()
}

fn parse_stored_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, STORED_TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SpectralBands;
    use chrono::TimeZone;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data").join("sensor_data.db"));
        store.init().unwrap();
        (dir, store)
    }

    fn at(base: DateTime<Utc>, offset_secs: i64) -> String {
        (base + chrono::Duration::seconds(offset_secs))
            .format(STORED_TIMESTAMP_FORMAT)
            .to_string()
    }

    fn reading_at(timestamp: &str, lb: f64) -> Reading {
        Reading {
            timestamp: Some(timestamp.to_string()),
            temperature: Some(20.0),
            humidity: Some(50.0),
            lb: Some(lb),
            bi: Some(lb * 10.0),
            ..Default::default()
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 5, 1, 0, 0).unwrap()
    }

    #[test]
    fn init_is_idempotent() {
        let (_dir, store) = temp_store();
        store.init().unwrap();
        store.init().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn init_fails_when_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let store = Store::new(blocker.join("sensor_data.db"));
        assert!(matches!(store.init(), Err(StoreError::Io(_))));
    }

    #[test]
    fn append_coerces_absent_fields_to_zero() {
        let (_dir, store) = temp_store();
        let reading = Reading {
            timestamp: Some("20250705T011804Z".to_string()),
            vis: SpectralBands([Some(1.0), Some(2.0), Some(3.0), None, None, None]),
            ..Default::default()
        };

        let id = store.append(&reading).unwrap();
        assert_eq!(id, 1);

        let conn = Connection::open(store.path()).unwrap();
        let (timestamp, temperature, humidity, vis_v, vis_g, vis_r, nir_w, lb): (
            String,
            Option<f64>,
            Option<f64>,
            f64,
            f64,
            f64,
            f64,
            Option<f64>,
        ) = conn
            .query_row(
                r#"SELECT timestamp, temperature, humidity, vis_v, vis_g, vis_r, nir_w, "L/B"
                   FROM sensor_data WHERE id = ?1"#,
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .unwrap();

        assert_eq!(timestamp, "2025-07-05T01:18:04Z");
        assert_eq!(temperature, Some(0.0));
        assert_eq!(humidity, Some(0.0));
        assert_eq!(vis_v, 1.0);
        assert_eq!(vis_g, 3.0);
        assert_eq!(vis_r, 0.0);
        assert_eq!(nir_w, 0.0);
        assert_eq!(lb, Some(0.0));
    }

    #[test]
    fn append_without_event_time_stamps_now() {
        let (_dir, store) = temp_store();
        store.append(&Reading::default()).unwrap();

        let rows = store.query_recent(Duration::from_secs(3600)).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(parse_stored_timestamp(&rows[0].timestamp).is_some());
    }

    #[test]
    fn ids_increase_monotonically() {
        let (_dir, store) = temp_store();
        let a = store.append(&reading_at("20250705T010000Z", 1.0)).unwrap();
        let b = store.append(&reading_at("20250705T010005Z", 1.0)).unwrap();
        let c = store.append(&reading_at("20250705T010010Z", 1.0)).unwrap();
        assert!(a < b && b < c);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn recent_filters_by_cutoff_and_sorts_ascending() {
        let (_dir, store) = temp_store();
        // inserted out of order on purpose
        for offset in [300, -7200, 0, 120, -30] {
            store.append(&reading_at(&at(base(), offset), 1.0)).unwrap();
        }

        let cutoff = base() - chrono::Duration::seconds(60);
        let rows = store.query_recent_since(cutoff).unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.timestamp.clone()).collect();
        assert_eq!(
            stamps,
            vec![at(base(), -30), at(base(), 0), at(base(), 120), at(base(), 300)]
        );
        assert_eq!(rows[0].temperature, Some(20.0));
    }

    #[test]
    fn distinct_points_over_minute_spaced_rows() {
        let (_dir, store) = temp_store();
        for i in 0..50 {
            store.append(&reading_at(&at(base(), i * 60), i as f64)).unwrap();
        }

        let points = store
            .query_recent_distinct_points(10, Duration::from_secs(60), 50)
            .unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(points.first().unwrap().timestamp, at(base(), 40 * 60));
        assert_eq!(points.last().unwrap().timestamp, at(base(), 49 * 60));
        assert_eq!(points.last().unwrap().lb, Some(49.0));
        assert_eq!(points.last().unwrap().bi, Some(490.0));

        let first = parse_stored_timestamp(&points[0].timestamp).unwrap();
        let last = parse_stored_timestamp(&points[9].timestamp).unwrap();
        assert!((last - first).num_seconds() >= 9 * 60);
    }

    #[test]
    fn distinct_points_are_limited_by_the_scan_window() {
        let (_dir, store) = temp_store();
        for i in 0..50 {
            store.append(&reading_at(&at(base(), i * 10), 1.0)).unwrap();
        }

        // 50 rows at 10s only cover 490s, so a 60s gap fits 9 points
        let points = store
            .query_recent_distinct_points(10, Duration::from_secs(60), 50)
            .unwrap();
        assert_eq!(points.len(), 9);
        assert_eq!(points.last().unwrap().timestamp, at(base(), 490));
        assert_eq!(points.first().unwrap().timestamp, at(base(), 10));

        // a wider scan reaches further back only when there are more rows
        for i in 50..200 {
            store.append(&reading_at(&at(base(), i * 10), 1.0)).unwrap();
        }
        let wide = store
            .query_recent_distinct_points(10, Duration::from_secs(60), 200)
            .unwrap();
        assert_eq!(wide.len(), 10);
    }

    #[test]
    fn decimation_never_keeps_close_points() {
        let (_dir, store) = temp_store();
        // irregular spacing: bursts of close samples with occasional gaps
        let mut offset = 0;
        for i in 0..120 {
            offset += match i % 7 {
                0 => 95,
                3 => 61,
                _ => 7,
            };
            store.append(&reading_at(&at(base(), offset), 1.0)).unwrap();
        }

        let gap = Duration::from_secs(60);
        let points = store.query_recent_distinct_points(10, gap, 120).unwrap();
        assert!(points.len() <= 10);
        assert!(!points.is_empty());
        for pair in points.windows(2) {
            let a = parse_stored_timestamp(&pair[0].timestamp).unwrap();
            let b = parse_stored_timestamp(&pair[1].timestamp).unwrap();
            assert!(a < b, "points must be oldest first");
            assert!((b - a).num_seconds() >= 60);
        }
    }

    #[test]
    fn decimation_skips_unparseable_timestamps() {
        let rows = vec![
            ChartPoint { timestamp: "garbage".into(), lb: None, bi: None, id: 3 },
            ChartPoint { timestamp: at(base(), 120), lb: None, bi: None, id: 2 },
            ChartPoint { timestamp: at(base(), 0), lb: None, bi: None, id: 1 },
        ];
        let kept = decimate(rows, 10, Duration::from_secs(60));
        let ids: Vec<_> = kept.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn normalize_handles_known_formats() {
        assert_eq!(normalize_timestamp("20250705T011804Z"), "2025-07-05T01:18:04Z");
        assert_eq!(
            normalize_timestamp("2025-07-05T09:18:04+08:00"),
            "2025-07-05T01:18:04Z"
        );
        assert_eq!(normalize_timestamp(" something-else "), "something-else");
    }

    #[tokio::test]
    async fn run_executes_on_blocking_pool() {
        let (_dir, store) = temp_store();
        let id = store
            .run(|s| s.append(&reading_at("20250705T010000Z", 2.0)))
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.run(|s| s.count()).await.unwrap(), 1);
    }
}
