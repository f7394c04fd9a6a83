use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rp_types::{
    AlertRecord, AlertStore, AssetRunStats, Observation, PortfolioReturnSeries,
    PortfolioRunRecord, SinkError,
};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS portfolio (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        date_run TEXT NOT NULL,
        total_return REAL,
        volatility REAL
    );

    CREATE TABLE IF NOT EXISTS portfolio_assets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        portfolio_id INTEGER NOT NULL,
        asset TEXT NOT NULL,
        weight REAL,
        mean_return REAL,
        variance REAL,
        FOREIGN KEY(portfolio_id) REFERENCES portfolio(id)
    );

    CREATE INDEX IF NOT EXISTS idx_portfolio_assets_portfolio ON portfolio_assets(portfolio_id);

    CREATE TABLE IF NOT EXISTS alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rule TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS portfolio_returns (
        date TEXT PRIMARY KEY,
        portfolio_return REAL
    );";

/// A portfolio run header as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPortfolio {
    pub id: i64,
    pub name: String,
    pub date_run: DateTime<Utc>,
    pub total_return: f64,
    pub volatility: Option<f64>,
}

/// SQLite-backed store for portfolio runs, alerts and the latest portfolio
/// return series.
///
/// Every operation opens its own connection and drops it before returning.
/// Writers are serialized so the strategy workers can share one store.
#[derive(Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

fn persistence<E: std::fmt::Display>(e: E) -> SinkError {
    SinkError::Persistence {
        message: e.to_string(),
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and ensure the
    /// schema exists.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, SinkError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persistence)?;
        }

        let store = Self {
            db_path,
            write_lock: Mutex::new(()),
        };
        store.connect()?.execute_batch(SCHEMA).map_err(persistence)?;

        tracing::debug!("Opened SQLite store at {}", store.db_path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, SinkError> {
        let conn = Connection::open(&self.db_path).map_err(persistence)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(persistence)?;
        Ok(conn)
    }

    /// Insert a run header and its per-asset rows atomically. Returns the new
    /// portfolio id.
    pub fn store_portfolio(&self, record: &PortfolioRunRecord) -> Result<i64, SinkError> {
        let _guard = self.write_lock.lock();
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(persistence)?;

        tx.execute(
            "INSERT INTO portfolio (name, date_run, total_return, volatility) VALUES (?1, ?2, ?3, ?4)",
            params![record.name, record.date_run, record.total_return, record.volatility],
        )
        .map_err(persistence)?;
        let portfolio_id = tx.last_insert_rowid();

        for asset in &record.assets {
            tx.execute(
                "INSERT INTO portfolio_assets (portfolio_id, asset, weight, mean_return, variance)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    portfolio_id,
                    asset.asset,
                    asset.weight,
                    asset.mean_return,
                    asset.variance
                ],
            )
            .map_err(persistence)?;
        }
        tx.commit().map_err(persistence)?;

        tracing::debug!(portfolio_id, name = %record.name, "Stored portfolio run");
        Ok(portfolio_id)
    }

    pub fn fetch_portfolios(&self) -> Result<Vec<StoredPortfolio>, SinkError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, name, date_run, total_return, volatility FROM portfolio ORDER BY id")
            .map_err(persistence)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredPortfolio {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    date_run: row.get(2)?,
                    total_return: row.get(3)?,
                    volatility: row.get(4)?,
                })
            })
            .map_err(persistence)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(persistence)
    }

    pub fn fetch_portfolio_assets(&self, portfolio_id: i64) -> Result<Vec<AssetRunStats>, SinkError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT asset, weight, mean_return, variance FROM portfolio_assets
                 WHERE portfolio_id = ?1 ORDER BY id",
            )
            .map_err(persistence)?;
        let rows = stmt
            .query_map([portfolio_id], |row| {
                Ok(AssetRunStats {
                    asset: row.get(0)?,
                    weight: row.get(1)?,
                    mean_return: row.get(2)?,
                    variance: row.get(3)?,
                })
            })
            .map_err(persistence)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(persistence)
    }

    pub fn add_alert(&self, alert: &AlertRecord) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO alerts (rule, message, timestamp) VALUES (?1, ?2, ?3)",
            params![alert.rule, alert.message, alert.timestamp],
        )
        .map_err(persistence)?;
        Ok(())
    }

    pub fn fetch_alerts(&self) -> Result<Vec<AlertRecord>, SinkError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT rule, message, timestamp FROM alerts ORDER BY id")
            .map_err(persistence)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AlertRecord {
                    rule: row.get(0)?,
                    message: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })
            .map_err(persistence)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(persistence)
    }

    /// Replace the stored portfolio return series with `series`.
    pub fn save_portfolio_returns(&self, series: &PortfolioReturnSeries) -> Result<usize, SinkError> {
        let _guard = self.write_lock.lock();
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(persistence)?;

        tx.execute("DELETE FROM portfolio_returns", [])
            .map_err(persistence)?;
        for point in &series.points {
            tx.execute(
                "INSERT INTO portfolio_returns (date, portfolio_return) VALUES (?1, ?2)",
                params![point.date, point.value],
            )
            .map_err(persistence)?;
        }
        tx.commit().map_err(persistence)?;

        tracing::info!(rows = series.len(), "Saved portfolio returns to {}", self.db_path.display());
        Ok(series.len())
    }

    pub fn fetch_portfolio_returns(&self) -> Result<PortfolioReturnSeries, SinkError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT date, portfolio_return FROM portfolio_returns ORDER BY date")
            .map_err(persistence)?;
        let rows = stmt
            .query_map([], |row| Ok(Observation::new(row.get(0)?, row.get(1)?)))
            .map_err(persistence)?;
        let points = rows.collect::<Result<Vec<_>, _>>().map_err(persistence)?;
        Ok(PortfolioReturnSeries::new(points))
    }
}

impl AlertStore for SqliteStore {
    fn record_alert(&self, alert: &AlertRecord) -> Result<(), SinkError> {
        self.add_alert(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn run_record(name: &str) -> PortfolioRunRecord {
        PortfolioRunRecord {
            name: name.to_string(),
            date_run: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            total_return: 0.0012,
            volatility: Some(0.031),
            assets: vec![
                AssetRunStats {
                    asset: "BTC".to_string(),
                    weight: 0.6,
                    mean_return: 0.001,
                    variance: Some(0.0004),
                },
                AssetRunStats {
                    asset: "ETH".to_string(),
                    weight: 0.4,
                    mean_return: 0.0015,
                    variance: None,
                },
            ],
        }
    }

    #[test]
    fn test_portfolio_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("runs.db")).unwrap();

        let id = store.store_portfolio(&run_record("equal")).unwrap();
        let portfolios = store.fetch_portfolios().unwrap();
        assert_eq!(portfolios.len(), 1);
        assert_eq!(portfolios[0].id, id);
        assert_eq!(portfolios[0].name, "equal");
        assert_eq!(portfolios[0].date_run, run_record("equal").date_run);

        let assets = store.fetch_portfolio_assets(id).unwrap();
        assert_eq!(assets, run_record("equal").assets);
    }

    #[test]
    fn test_undefined_volatility_is_stored_as_null() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("runs.db")).unwrap();

        let mut record = run_record("equal");
        record.volatility = None;
        store.store_portfolio(&record).unwrap();
        store.store_portfolio(&run_record("rule")).unwrap();

        let portfolios = store.fetch_portfolios().unwrap();
        assert_eq!(portfolios.len(), 2);
        assert_eq!(portfolios[0].volatility, None);
        assert_eq!(portfolios[1].volatility, Some(0.031));
    }

    #[test]
    fn test_alerts_append() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("alerts.db")).unwrap();
        let alert = AlertRecord {
            rule: "volatility".to_string(),
            message: "Volatility 0.62 above threshold 0.5".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        };

        store.record_alert(&alert).unwrap();
        store.record_alert(&alert).unwrap();
        let alerts = store.fetch_alerts().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0], alert);
    }

    #[test]
    fn test_portfolio_returns_are_replaced() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("returns.db")).unwrap();
        let d = |n| Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap();

        let first = PortfolioReturnSeries::new(vec![
            Observation::new(d(1), 0.01),
            Observation::new(d(2), -0.02),
        ]);
        let second = PortfolioReturnSeries::new(vec![Observation::new(d(3), 0.05)]);

        assert_eq!(store.save_portfolio_returns(&first).unwrap(), 2);
        assert_eq!(store.fetch_portfolio_returns().unwrap(), first);
        store.save_portfolio_returns(&second).unwrap();
        assert_eq!(store.fetch_portfolio_returns().unwrap(), second);
    }

    #[test]
    fn test_concurrent_writers() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("concurrent.db")).unwrap();

        std::thread::scope(|s| {
            for name in ["equal", "rule", "performance"] {
                let store = &store;
                s.spawn(move || store.store_portfolio(&run_record(name)).unwrap());
            }
        });

        let mut names: Vec<String> = store
            .fetch_portfolios()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["equal", "performance", "rule"]);
        for p in store.fetch_portfolios().unwrap() {
            assert_eq!(store.fetch_portfolio_assets(p.id).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_open_fails_on_directory_path() {
        let temp_dir = tempdir().unwrap();
        let result = SqliteStore::open(temp_dir.path());
        assert!(matches!(result, Err(SinkError::Persistence { .. })));
    }
}
