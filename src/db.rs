use std::collections::BTreeSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::parser::{Anomaly, RankedEntry};

/// Calendar-day format used for snapshot dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Item - A tracked offering
/// Identity (`id`) never changes; everything else is refreshed per batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub context_length: i64,
    pub description: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Item {
    /// Item as observed in a batch at `now`
    /// `first_seen` is only honored on insert; the store keeps the original
    pub fn observed(entry: &RankedEntry, now: DateTime<Utc>) -> Self {
        Item {
            id: entry.entry.id.clone(),
            display_name: entry.entry.display_name.clone(),
            provider: entry.entry.provider.clone(),
            context_length: entry.entry.context_length,
            description: String::new(),
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Snapshot - One dated, ranked observation of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub item_id: String,
    pub date: NaiveDate,
    pub rank: u32,
    pub weekly_metric: f64,
    pub price_in: f64,
    pub price_out: f64,
}

impl Snapshot {
    pub fn from_ranked(entry: &RankedEntry, date: NaiveDate) -> Self {
        Snapshot {
            item_id: entry.entry.id.clone(),
            date,
            rank: entry.rank,
            weekly_metric: entry.weekly_metric(),
            price_in: entry.entry.price_in,
            price_out: entry.entry.price_out,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    New,
    Anomaly,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::New => "new",
            EventKind::Anomaly => "anomaly",
        }
    }

    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "new" => Some(EventKind::New),
            "anomaly" => Some(EventKind::Anomaly),
            _ => None,
        }
    }
}

/// Event for the audit trail (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub item_id: String,
    pub kind: EventKind,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, item_id: &str, detail: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            kind,
            detail: detail.to_string(),
            timestamp,
        }
    }
}

/// Top-N row: a snapshot joined with its item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopEntry {
    pub rank: u32,
    pub weekly_metric: f64,
    pub price_in: f64,
    pub price_out: f64,
    pub item: Item,
}

/// What one committed batch wrote
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWrite {
    pub created: Vec<String>,
    pub updated: usize,
    pub snapshots: usize,
    pub anomalies: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Extra attempts after a lock conflict
    pub max_retries: u32,
    /// Linear backoff step between attempts
    pub retry_backoff_ms: u64,
    /// SQLite busy handler timeout per attempt
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_retries: 3,
            retry_backoff_ms: 100,
            busy_timeout_ms: 30_000,
        }
    }
}

impl StoreConfig {
    /// Run `op`, retrying lock conflicts with linear backoff
    fn with_retry<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            match op() {
                Err(err) if err.is_busy() => {
                    if attempt == attempts {
                        break;
                    }
                    let wait = self.retry_backoff_ms * attempt as u64;
                    warn!(what, attempt, wait_ms = wait, "store locked, retrying");
                    thread::sleep(Duration::from_millis(wait));
                }
                other => return other,
            }
        }
        Err(TrackerError::StoreBusy { attempts })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL lets readers proceed while one batch writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            provider TEXT NOT NULL,
            context_length INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL REFERENCES items(id),
            date TEXT NOT NULL,
            rank INTEGER NOT NULL,
            weekly_metric REAL NOT NULL,
            price_in REAL NOT NULL,
            price_out REAL NOT NULL,
            UNIQUE(item_id, date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            item_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            detail TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_date ON snapshots(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_rank ON snapshots(rank, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_item ON events(item_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

const SNAPSHOT_COLUMNS: &str = "item_id, date, rank, weekly_metric, price_in, price_out";

fn snapshot_row(row: &Row) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        item_id: row.get(0)?,
        date: date_column(row, 1)?,
        rank: row.get(2)?,
        weekly_metric: row.get(3)?,
        price_in: row.get(4)?,
        price_out: row.get(5)?,
    })
}

const ITEM_COLUMNS: &str =
    "id, display_name, provider, context_length, description, first_seen, last_seen";

fn item_row(row: &Row, offset: usize) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(offset)?,
        display_name: row.get(offset + 1)?,
        provider: row.get(offset + 2)?,
        context_length: row.get(offset + 3)?,
        description: row.get(offset + 4)?,
        first_seen: timestamp_column(row, offset + 5)?,
        last_seen: timestamp_column(row, offset + 6)?,
    })
}

// ============================================================================
// WRITES
// ============================================================================

/// Create or merge an item. Returns true when the item is new.
///
/// A new item gets its one `new` event here; `first_seen` is never touched
/// on update.
pub fn upsert_item(conn: &Connection, item: &Item) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)",
        [&item.id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO items (id, display_name, provider, context_length, description, first_seen, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            provider = excluded.provider,
            context_length = excluded.context_length,
            description = excluded.description,
            last_seen = excluded.last_seen",
        params![
            item.id,
            item.display_name,
            item.provider,
            item.context_length,
            item.description,
            item.first_seen.to_rfc3339(),
            item.last_seen.to_rfc3339(),
        ],
    )?;

    if !exists {
        let event = Event::new(
            EventKind::New,
            &item.id,
            &format!("New item added: {}", item.display_name),
            item.first_seen,
        );
        insert_event(conn, &event)?;
    }

    Ok(!exists)
}

/// Write a snapshot, replacing any existing one for the same (item, date).
pub fn record_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshots (item_id, date, rank, weekly_metric, price_in, price_out)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(item_id, date) DO UPDATE SET
            rank = excluded.rank,
            weekly_metric = excluded.weekly_metric,
            price_in = excluded.price_in,
            price_out = excluded.price_out",
        params![
            snapshot.item_id,
            date_key(snapshot.date),
            snapshot.rank,
            snapshot.weekly_metric,
            snapshot.price_in,
            snapshot.price_out,
        ],
    )?;
    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (event_id, item_id, kind, detail, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.item_id,
            event.kind.as_str(),
            event.detail,
            event.timestamp.to_rfc3339(),
        ],
    )?;

    Ok(())
}

// ============================================================================
// READS
// ============================================================================

pub fn all_item_ids(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT id FROM items")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(ids)
}

/// Every snapshot of the latest stored date that is <= `threshold`.
///
/// The closest earlier day is used, so a skipped run still compares against
/// the last one that happened. Empty when no date qualifies.
pub fn latest_snapshots_at_or_before(
    conn: &Connection,
    threshold: NaiveDate,
) -> Result<Vec<Snapshot>> {
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(date) FROM snapshots WHERE date <= ?1",
        [date_key(threshold)],
        |row| row.get(0),
    )?;

    let Some(latest) = latest else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE date = ?1 ORDER BY rank"
    ))?;
    let snapshots = stmt
        .query_map([latest], snapshot_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(snapshots)
}

pub fn top_n_for_date(conn: &Connection, date: NaiveDate, limit: usize) -> Result<Vec<TopEntry>> {
    let mut stmt = conn.prepare(
        "SELECT s.rank, s.weekly_metric, s.price_in, s.price_out,
                i.id, i.display_name, i.provider, i.context_length, i.description,
                i.first_seen, i.last_seen
         FROM snapshots s
         JOIN items i ON s.item_id = i.id
         WHERE s.date = ?1
         ORDER BY s.rank
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![date_key(date), limit as i64], |row| {
            Ok(TopEntry {
                rank: row.get(0)?,
                weekly_metric: row.get(1)?,
                price_in: row.get(2)?,
                price_out: row.get(3)?,
                item: item_row(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn get_item(conn: &Connection, id: &str) -> Result<Option<Item>> {
    let item = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            [id],
            |row| item_row(row, 0),
        )
        .optional()?;
    Ok(item)
}

/// Dated snapshots of one item, oldest first
pub fn rank_history(conn: &Connection, item_id: &str) -> Result<Vec<Snapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE item_id = ?1 ORDER BY date"
    ))?;
    let history = stmt
        .query_map([item_id], snapshot_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(history)
}

pub fn get_events_for_item(conn: &Connection, item_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, item_id, kind, detail, timestamp
         FROM events
         WHERE item_id = ?1
         ORDER BY id",
    )?;

    let events = stmt
        .query_map([item_id], |row| {
            let kind: String = row.get(2)?;
            Ok(Event {
                event_id: row.get(0)?,
                item_id: row.get(1)?,
                kind: EventKind::parse(&kind).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        Type::Text,
                        format!("unknown event kind {kind:?}").into(),
                    )
                })?,
                detail: row.get(3)?,
                timestamp: timestamp_column(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

pub fn item_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
    Ok(count)
}

pub fn snapshot_count_for_date(conn: &Connection, date: NaiveDate) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM snapshots WHERE date = ?1",
        [date_key(date)],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// Store - One connection, scoped to a batch
///
/// The connection closes when the handle drops, on every exit path.
pub struct Store {
    conn: Connection,
    config: StoreConfig,
}

impl Store {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = config.with_retry("open", || {
            let conn = Connection::open(path)?;
            conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
            setup_database(&conn)?;
            Ok(conn)
        })?;

        debug!(path = %path.display(), "store opened");
        Ok(Store {
            conn,
            config: config.clone(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Store {
            conn,
            config: StoreConfig::default(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn upsert_item(&self, item: &Item) -> Result<bool> {
        upsert_item(&self.conn, item)
    }

    pub fn record_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        record_snapshot(&self.conn, snapshot)
    }

    pub fn insert_event(&self, event: &Event) -> Result<()> {
        insert_event(&self.conn, event)
    }

    /// Known ids. Must be captured before the batch upserts anything, or every
    /// item in the batch reads as already known.
    ///
    /// Read outside any write lock; a concurrent run may change the set
    /// before this one commits. Batches use [`Store::commit_diffed`].
    pub fn known_ids_before_batch(&self) -> Result<BTreeSet<String>> {
        all_item_ids(&self.conn)
    }

    pub fn latest_snapshots_at_or_before(&self, threshold: NaiveDate) -> Result<Vec<Snapshot>> {
        latest_snapshots_at_or_before(&self.conn, threshold)
    }

    pub fn top_n_for_date(&self, date: NaiveDate, limit: usize) -> Result<Vec<TopEntry>> {
        top_n_for_date(&self.conn, date, limit)
    }

    pub fn item(&self, id: &str) -> Result<Option<Item>> {
        get_item(&self.conn, id)
    }

    pub fn rank_history(&self, item_id: &str) -> Result<Vec<Snapshot>> {
        rank_history(&self.conn, item_id)
    }

    pub fn events_for_item(&self, item_id: &str) -> Result<Vec<Event>> {
        get_events_for_item(&self.conn, item_id)
    }

    pub fn item_count(&self) -> Result<i64> {
        item_count(&self.conn)
    }

    pub fn snapshot_count_for_date(&self, date: NaiveDate) -> Result<i64> {
        snapshot_count_for_date(&self.conn, date)
    }

    /// Persist a whole batch atomically.
    ///
    /// The day's snapshot set is replaced by this batch, so rank stays dense
    /// and unique per date even when a re-run drops an item. Lock conflicts
    /// roll back and retry the whole transaction.
    pub fn commit_batch(
        &mut self,
        date: NaiveDate,
        now: DateTime<Utc>,
        ranked: &[RankedEntry],
        anomalies: &[Anomaly],
    ) -> Result<BatchWrite> {
        let (_, write) =
            self.commit_with(date, now, ranked, anomalies, &mut |_: &Connection| Ok(()))?;
        Ok(write)
    }

    /// Like [`Store::commit_batch`], but first reads the known ids and the
    /// prior snapshot set (latest date <= `threshold`) under the same write
    /// lock, and hands them to `diff`.
    ///
    /// Two overlapping runs therefore never diff against the same state.
    /// `diff` runs again if the transaction is retried.
    pub fn commit_diffed<T>(
        &mut self,
        date: NaiveDate,
        now: DateTime<Utc>,
        ranked: &[RankedEntry],
        anomalies: &[Anomaly],
        threshold: NaiveDate,
        mut diff: impl FnMut(&BTreeSet<String>, &[Snapshot]) -> T,
    ) -> Result<(T, BatchWrite)> {
        let mut read_prior = |conn: &Connection| -> Result<T> {
            let known = all_item_ids(conn)?;
            let prior = latest_snapshots_at_or_before(conn, threshold)?;
            Ok(diff(&known, &prior))
        };
        self.commit_with(date, now, ranked, anomalies, &mut read_prior)
    }

    fn commit_with<T>(
        &mut self,
        date: NaiveDate,
        now: DateTime<Utc>,
        ranked: &[RankedEntry],
        anomalies: &[Anomaly],
        before_write: &mut dyn FnMut(&Connection) -> Result<T>,
    ) -> Result<(T, BatchWrite)> {
        let config = self.config.clone();
        let conn = &mut self.conn;
        let (value, write) = config.with_retry("commit", || {
            write_batch(conn, date, now, ranked, anomalies, &mut *before_write)
        })?;

        info!(
            date = %date,
            created = write.created.len(),
            updated = write.updated,
            snapshots = write.snapshots,
            anomalies = write.anomalies,
            "batch committed"
        );
        Ok((value, write))
    }
}

fn write_batch<T>(
    conn: &mut Connection,
    date: NaiveDate,
    now: DateTime<Utc>,
    ranked: &[RankedEntry],
    anomalies: &[Anomaly],
    before_write: &mut dyn FnMut(&Connection) -> Result<T>,
) -> Result<(T, BatchWrite)> {
    // IMMEDIATE takes the write lock up front, so conflicts surface here
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = before_write(&*tx)?;
    let mut write = BatchWrite::default();

    tx.execute("DELETE FROM snapshots WHERE date = ?1", [date_key(date)])?;

    for entry in ranked {
        if upsert_item(&tx, &Item::observed(entry, now))? {
            write.created.push(entry.id().to_string());
        } else {
            write.updated += 1;
        }
        record_snapshot(&tx, &Snapshot::from_ranked(entry, date))?;
        write.snapshots += 1;
    }

    for anomaly in anomalies {
        let detail = format!("line {}: {}", anomaly.line_number, anomaly.detail);
        insert_event(&tx, &Event::new(EventKind::Anomaly, &anomaly.item_id, &detail, now))?;
        write.anomalies += 1;
    }

    tx.commit()?;
    Ok((value, write))
}
