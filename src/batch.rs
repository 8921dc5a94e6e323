// 🔁 Batch pipeline
// fetch → parse → normalize (rank) → diff → persist → report, strictly in order.
// Nothing is written until every earlier stage has succeeded.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, info_span};

use crate::comparison::{compare, Report};
use crate::db::{BatchWrite, Store};
use crate::error::{Result, TrackerError};
use crate::notify::Notifier;
use crate::parser::{parse_document, rank_entries, ParseOptions};
use crate::source::DocumentSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Fetched,
    Parsed,
    Normalized,
    Diffed,
    Persisted,
    Reported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub date: NaiveDate,
    pub top_n: usize,
    pub lookback_days: u32,
    pub parse: ParseOptions,
}

impl BatchOptions {
    pub fn new(date: NaiveDate) -> Self {
        BatchOptions {
            date,
            top_n: 5,
            lookback_days: 1,
            parse: ParseOptions::strict(),
        }
    }

    /// Latest date whose snapshots count as "previous".
    pub fn threshold_date(&self) -> NaiveDate {
        self.date
            .checked_sub_days(Days::new(self.lookback_days as u64))
            .unwrap_or(NaiveDate::MIN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    /// SHA-256 of the fetched document
    pub source_digest: String,
    pub write: BatchWrite,
    pub report: Report,
}

pub fn document_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Run one batch against an open store.
///
/// Any failure before `Persisted` leaves the store untouched. A notifier
/// failure is returned as `TrackerError::Notify`; the batch stays committed.
pub fn run_batch(
    source: &dyn DocumentSource,
    store: &mut Store,
    notifier: &dyn Notifier,
    options: &BatchOptions,
    now: DateTime<Utc>,
) -> Result<BatchOutcome> {
    let mut reached = None;
    run_batch_tracked(source, store, notifier, options, now, &mut reached)
}

/// [`run_batch`], recording the last stage that completed in `reached`.
///
/// On error `reached` tells whether anything was persisted: `None` when the
/// fetch itself failed, `Some(Stage::Persisted)` when only the notifier did.
pub fn run_batch_tracked(
    source: &dyn DocumentSource,
    store: &mut Store,
    notifier: &dyn Notifier,
    options: &BatchOptions,
    now: DateTime<Utc>,
    reached: &mut Option<Stage>,
) -> Result<BatchOutcome> {
    let batch_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("batch", id = %batch_id, date = %options.date);
    let _guard = span.enter();

    *reached = None;
    let result = run_stages(source, store, notifier, options, now, batch_id, reached);
    if let Err(err) = &result {
        error!(error = %err, reached = ?reached, "batch aborted");
    }
    result
}

fn run_stages(
    source: &dyn DocumentSource,
    store: &mut Store,
    notifier: &dyn Notifier,
    options: &BatchOptions,
    now: DateTime<Utc>,
    batch_id: String,
    reached: &mut Option<Stage>,
) -> Result<BatchOutcome> {
    let text = source.fetch()?;
    let source_digest = document_digest(&text);
    info!(source = %source.describe(), bytes = text.len(), digest = %source_digest, "fetched");
    *reached = Some(Stage::Fetched);

    // Cells are normalized while parsing
    let outcome = parse_document(&text, &options.parse)?;
    info!(rows = outcome.entries.len(), skipped = outcome.anomalies.len(), "parsed");
    *reached = Some(Stage::Parsed);

    let ranked = rank_entries(outcome.entries);
    *reached = Some(Stage::Normalized);

    // Known ids and the prior set are read under the write lock, before
    // anything is upserted
    let (report, write) = store.commit_diffed(
        options.date,
        now,
        &ranked,
        &outcome.anomalies,
        options.threshold_date(),
        |known_ids, prior| {
            *reached = Some(Stage::Diffed);
            compare(options.date, &ranked, known_ids, prior, options.top_n)
        },
    )?;
    info!(
        new = report.summary.new_count,
        compared_with = ?report.compared_with,
        "diffed and persisted"
    );
    *reached = Some(Stage::Persisted);

    notifier.notify(&report).map_err(|err| match err {
        TrackerError::Notify(msg) => TrackerError::Notify(format!("{msg} (batch already persisted)")),
        other => TrackerError::Notify(format!("{other} (batch already persisted)")),
    })?;
    info!("reported");
    *reached = Some(Stage::Reported);

    Ok(BatchOutcome {
        batch_id,
        source_digest,
        write,
        report,
    })
}
