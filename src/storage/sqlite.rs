use crate::analyzer::{
    LongTailTable, PopularityRow, PopularityTable, RegionPopularityTable, StatsTable,
    TimeSeriesTable,
};
use crate::model::StorageError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Metadata of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub input_path: String,
    pub record_count: i64,
}

/// SQLite store holding the output tables of every run.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database and ensures the schema exists.
    /// `":memory:"` gives a throwaway store.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                input_path TEXT NOT NULL,
                record_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS popularity (
                run_id INTEGER NOT NULL REFERENCES runs(id),
                rank INTEGER NOT NULL,
                product_key TEXT NOT NULL,
                metric TEXT NOT NULL,
                total REAL NOT NULL,
                PRIMARY KEY (run_id, rank)
            );

            CREATE TABLE IF NOT EXISTS summary_stats (
                run_id INTEGER NOT NULL REFERENCES runs(id),
                group_key TEXT NOT NULL,
                metric TEXT NOT NULL,
                count INTEGER NOT NULL,
                mean REAL NOT NULL,
                median REAL NOT NULL,
                std REAL,
                min REAL NOT NULL,
                q1 REAL NOT NULL,
                q3 REAL NOT NULL,
                max REAL NOT NULL,
                PRIMARY KEY (run_id, group_key, metric)
            );

            CREATE TABLE IF NOT EXISTS long_tail (
                run_id INTEGER NOT NULL REFERENCES runs(id),
                rank INTEGER NOT NULL,
                product_key TEXT NOT NULL,
                total REAL NOT NULL,
                cumulative_total REAL NOT NULL,
                cumulative_share REAL NOT NULL,
                segment TEXT NOT NULL,
                PRIMARY KEY (run_id, rank)
            );

            CREATE TABLE IF NOT EXISTS time_series (
                run_id INTEGER NOT NULL REFERENCES runs(id),
                period_start TEXT NOT NULL,
                group_key TEXT,
                metric TEXT NOT NULL,
                total REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS region_popularity (
                run_id INTEGER NOT NULL REFERENCES runs(id),
                region TEXT NOT NULL,
                product_key TEXT NOT NULL,
                metric TEXT NOT NULL,
                total REAL NOT NULL,
                PRIMARY KEY (run_id, region, product_key)
            );
            ",
        )?;

        Ok(Self { conn })
    }

    /// Registers a new run and returns its id.
    pub fn begin_run(
        &self,
        started_at: DateTime<Utc>,
        input_path: &str,
        record_count: usize,
    ) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO runs (started_at, input_path, record_count) VALUES (?1, ?2, ?3)",
            params![started_at.to_rfc3339(), input_path, to_i64(record_count)?],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Registers a run and writes its tables in one transaction.
    ///
    /// `write` receives the new run id. If it fails, the run row and every row
    /// written so far are rolled back.
    pub fn save_run<F>(
        &self,
        started_at: DateTime<Utc>,
        input_path: &str,
        record_count: usize,
        write: F,
    ) -> Result<i64, StorageError>
    where
        F: FnOnce(&Self, i64) -> Result<(), StorageError>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let run_id = self.begin_run(started_at, input_path, record_count)?;
        write(self, run_id)?;
        tx.commit()?;
        Ok(run_id)
    }

    pub fn save_popularity(&self, run_id: i64, table: &PopularityTable) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO popularity (run_id, rank, product_key, metric, total)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let metric = table.metric.to_string();
        for (rank, row) in table.rows.iter().enumerate() {
            stmt.execute(params![run_id, to_i64(rank + 1)?, row.product_key, metric, row.total])?;
        }
        Ok(())
    }

    pub fn save_summary_stats(&self, run_id: i64, table: &StatsTable) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO summary_stats
                (run_id, group_key, metric, count, mean, median, std, min, q1, q3, max)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for row in &table.rows {
            for c in &row.columns {
                stmt.execute(params![
                    run_id,
                    row.group_key,
                    c.field.header(),
                    to_i64(c.count)?,
                    c.mean,
                    c.median,
                    c.std,
                    c.min,
                    c.q1,
                    c.q3,
                    c.max,
                ])?;
            }
        }
        Ok(())
    }

    pub fn save_long_tail(&self, run_id: i64, table: &LongTailTable) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO long_tail
                (run_id, rank, product_key, total, cumulative_total, cumulative_share, segment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (rank, row) in table.rows.iter().enumerate() {
            stmt.execute(params![
                run_id,
                to_i64(rank + 1)?,
                row.product_key,
                row.total,
                row.cumulative_total,
                row.cumulative_share,
                row.segment.to_string(),
            ])?;
        }
        Ok(())
    }

    /// Stores one row per (period, group, metric).
    pub fn save_time_series(&self, run_id: i64, table: &TimeSeriesTable) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO time_series (run_id, period_start, group_key, metric, total)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in &table.rows {
            for (field, total) in table.metric_fields.iter().zip(&row.totals) {
                stmt.execute(params![
                    run_id,
                    row.period_start,
                    row.group_key,
                    field.header(),
                    total,
                ])?;
            }
        }
        Ok(())
    }

    pub fn save_region_popularity(
        &self,
        run_id: i64,
        table: &RegionPopularityTable,
    ) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO region_popularity (run_id, region, product_key, metric, total)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let metric = table.metric.to_string();
        for row in &table.rows {
            stmt.execute(params![run_id, row.region, row.product_key, metric, row.total])?;
        }
        Ok(())
    }

    /// Returns the most recent run, if any.
    pub fn latest_run(&self) -> Result<Option<RunInfo>, StorageError> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, input_path, record_count FROM runs ORDER BY id DESC LIMIT 1",
                [],
                Self::map_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Returns the `limit` best ranked products of a run.
    pub fn get_top_products(&self, run_id: i64, limit: usize) -> Result<Vec<PopularityRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT product_key, total FROM popularity WHERE run_id = ?1 ORDER BY rank ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![run_id, to_i64(limit)?], |row| {
            Ok(PopularityRow {
                product_key: row.get(0)?,
                total: row.get(1)?,
            })
        })?;

        let mut products = Vec::new();
        for row in rows {
            products.push(row?);
        }
        Ok(products)
    }

    /// Returns `(period_start, total)` for one metric of an ungrouped series.
    pub fn get_series(&self, run_id: i64, metric: &str) -> Result<Vec<(NaiveDate, f64)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT period_start, total FROM time_series
             WHERE run_id = ?1 AND metric = ?2 AND group_key IS NULL
             ORDER BY period_start ASC",
        )?;
        let rows = stmt.query_map(params![run_id, metric], |row| {
            Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut series = Vec::new();
        for row in rows {
            series.push(row?);
        }
        Ok(series)
    }

    fn map_run(row: &Row) -> Result<RunInfo, rusqlite::Error> {
        let started_at_str: String = row.get(1)?;
        let started_at = DateTime::parse_from_rfc3339(&started_at_str)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(RunInfo {
            id: row.get(0)?,
            started_at,
            input_path: row.get(2)?,
            record_count: row.get(3)?,
        })
    }
}

fn to_i64(value: usize) -> Result<i64, StorageError> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidValue(format!("{} does not fit in an INTEGER column", value)))
}
