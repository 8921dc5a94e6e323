// 🏗️ Listing Parser
// Loosely structured listing text → ordered raw entries (source order = rank order)

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NormalizationError, Result, TrackerError};
use crate::normalizer;

/// Provider when the display name carries no `Provider: Model` prefix.
pub const UNKNOWN_PROVIDER: &str = "Unknown";

// ============================================================================
// CORE TYPES
// ============================================================================

/// ListingFormat - Which grammar a document is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingFormat {
    /// `| Model | Input | Output | Context |` markdown table
    Table,
    /// `* [Name](url) 2.94B tokens` bullet list (legacy)
    Bullets,
}

impl ListingFormat {
    pub fn name(&self) -> &str {
        match self {
            ListingFormat::Table => "table",
            ListingFormat::Bullets => "bullets",
        }
    }
}

/// RawEntry - One extracted row, before ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub context_length: i64,
    pub price_in: f64,
    pub price_out: f64,

    /// Weekly token count in millions. Only the bullet format carries one.
    pub weekly_metric: Option<f64>,

    // Provenance
    pub line_number: usize, // 1-based line in the source document
}

/// RankedEntry - RawEntry with its batch rank (1-based, dense)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: u32,
    pub entry: RawEntry,
}

impl RankedEntry {
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    /// Metric as persisted. Absent metrics are stored as zero, never synthesized.
    pub fn weekly_metric(&self) -> f64 {
        self.entry.weekly_metric.unwrap_or(0.0)
    }
}

/// A row dropped in lenient mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub line_number: usize,
    pub item_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Skip rows with unparseable numbers instead of rejecting the batch.
    pub lenient: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        ParseOptions { lenient: false }
    }

    pub fn lenient() -> Self {
        ParseOptions { lenient: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub entries: Vec<RawEntry>,
    pub anomalies: Vec<Anomaly>,
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// ListingParser - One implementation per listing grammar
pub trait ListingParser: Send + Sync {
    /// Parse a whole document into entries in source order.
    ///
    /// Fails with `TrackerError::Parse` when nothing is extracted and with
    /// `TrackerError::Anomaly` when an identifier repeats.
    fn parse(&self, text: &str, options: &ParseOptions) -> Result<ParseOutcome>;

    fn format(&self) -> ListingFormat;

    /// Parser version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the listing grammar from document content.
///
/// A header-looking `|` row wins over bullet links, so a table page with a
/// bulleted navigation block still parses as a table.
pub fn detect_format(text: &str) -> Result<ListingFormat> {
    if text.trim().is_empty() {
        return Err(TrackerError::Parse("empty document".to_string()));
    }

    if text.lines().any(|line| header_columns(line.trim()).is_some()) {
        return Ok(ListingFormat::Table);
    }

    if text.lines().any(|line| bullet_body(line.trim()).is_some()) {
        return Ok(ListingFormat::Bullets);
    }

    Err(TrackerError::Parse(
        "no table header or bullet list found".to_string(),
    ))
}

pub fn get_parser(format: ListingFormat) -> Box<dyn ListingParser> {
    match format {
        ListingFormat::Table => Box::new(TableParser::new()),
        ListingFormat::Bullets => Box::new(BulletParser::new()),
    }
}

/// Detect the grammar and parse with it.
pub fn parse_document(text: &str, options: &ParseOptions) -> Result<ParseOutcome> {
    let format = detect_format(text)?;
    debug!(format = format.name(), "detected listing format");
    get_parser(format).parse(text, options)
}

/// Assign ranks: descending weekly metric, ties kept in source order.
pub fn rank_entries(entries: Vec<RawEntry>) -> Vec<RankedEntry> {
    let mut entries = entries;
    // sort_by is stable, so equal (or absent) metrics keep source order
    entries.sort_by(|a, b| {
        b.weekly_metric
            .unwrap_or(0.0)
            .total_cmp(&a.weekly_metric.unwrap_or(0.0))
    });

    entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| RankedEntry {
            rank: idx as u32 + 1,
            entry,
        })
        .collect()
}

// ============================================================================
// TABLE PARSER
// ============================================================================

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    name: usize,
    price_in: usize,
    price_out: usize,
    context: usize,
    arity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    SeekHeader,
    SeekSeparator(ColumnMap),
    ReadRow(ColumnMap),
    Done,
}

pub struct TableParser;

impl TableParser {
    pub fn new() -> Self {
        TableParser
    }
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingParser for TableParser {
    fn parse(&self, text: &str, options: &ParseOptions) -> Result<ParseOutcome> {
        let mut state = TableState::SeekHeader;
        let mut outcome = ParseOutcome::default();
        let mut header_seen = false;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_number = idx + 1;
            let line = raw_line.trim();

            state = match state {
                TableState::SeekHeader => match header_columns(line) {
                    Some(columns) => {
                        header_seen = true;
                        TableState::SeekSeparator(columns)
                    }
                    None => TableState::SeekHeader,
                },

                TableState::SeekSeparator(columns) => {
                    if line.is_empty() {
                        TableState::SeekSeparator(columns)
                    } else if is_separator(line) {
                        TableState::ReadRow(columns)
                    } else if line.starts_with('|') {
                        // Divider missing; treat the line as the first data row
                        read_row(line, line_number, &columns, options, &mut outcome)?;
                        TableState::ReadRow(columns)
                    } else {
                        TableState::SeekHeader
                    }
                }

                TableState::ReadRow(columns) => {
                    if line.starts_with('|') {
                        read_row(line, line_number, &columns, options, &mut outcome)?;
                        TableState::ReadRow(columns)
                    } else if outcome.entries.is_empty() && outcome.anomalies.is_empty() {
                        // That table held nothing usable; keep looking for another
                        TableState::SeekHeader
                    } else {
                        TableState::Done
                    }
                }

                TableState::Done => break,
            };
        }

        if !header_seen {
            return Err(TrackerError::Parse("no table header found".to_string()));
        }

        finish(outcome)
    }

    fn format(&self) -> ListingFormat {
        ListingFormat::Table
    }
}

/// Split a `| a | b |` row into trimmed cells.
fn split_cells(line: &str) -> Vec<&str> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(str::trim).collect()
}

fn is_separator(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && split_cells(line)
            .iter()
            .all(|cell| cell.chars().all(|c| matches!(c, '-' | ':' | ' ')))
}

fn is_name_column(cell: &str) -> bool {
    cell.contains("model") || cell.contains("name") || cell == "id"
}

/// Recognize a header row and map its columns.
fn header_columns(line: &str) -> Option<ColumnMap> {
    if !line.starts_with('|') || is_separator(line) {
        return None;
    }

    let cells = split_cells(line);
    // Data rows carry links; headers do not
    if cells.iter().any(|c| c.contains("](")) {
        return None;
    }

    let (mut name, mut price_in, mut price_out, mut context) = (None, None, None, None);
    for (idx, cell) in cells.iter().enumerate() {
        let cell = cell.to_lowercase();
        if is_name_column(&cell) {
            name.get_or_insert(idx);
        } else if cell.contains("input")
            || cell.contains("prompt")
            || (cell.contains("price") && !cell.contains("output"))
        {
            price_in.get_or_insert(idx);
        } else if cell.contains("output") || cell.contains("completion") {
            price_out.get_or_insert(idx);
        } else if cell.contains("context") || cell.contains("length") {
            context.get_or_insert(idx);
        }
    }

    let columns = ColumnMap {
        name: name?,
        price_in: price_in.unwrap_or(1),
        price_out: price_out.unwrap_or(2),
        context: context.unwrap_or(3),
        arity: cells.len(),
    };

    // A narrow table (site navigation etc.) cannot hold every column
    let widest = columns
        .name
        .max(columns.price_in)
        .max(columns.price_out)
        .max(columns.context);
    if widest >= columns.arity {
        return None;
    }

    Some(columns)
}

fn row_numbers(
    cells: &[&str],
    columns: &ColumnMap,
) -> std::result::Result<(i64, f64, f64), NormalizationError> {
    Ok((
        normalizer::context_length(cells[columns.context])?,
        normalizer::price(cells[columns.price_in])?,
        normalizer::price(cells[columns.price_out])?,
    ))
}

fn read_row(
    line: &str,
    line_number: usize,
    columns: &ColumnMap,
    options: &ParseOptions,
    outcome: &mut ParseOutcome,
) -> Result<()> {
    let cells = split_cells(line);
    if cells.len() != columns.arity {
        debug!(
            line_number,
            expected = columns.arity,
            found = cells.len(),
            "skipping row with unexpected cell count"
        );
        return Ok(());
    }

    let Some(name) = extract_name(cells[columns.name]) else {
        debug!(line_number, "skipping row without an item identifier");
        return Ok(());
    };

    match row_numbers(&cells, columns) {
        Ok((context_length, price_in, price_out)) => {
            outcome.entries.push(name.into_entry(context_length, price_in, price_out, None, line_number));
            Ok(())
        }
        Err(err) => reject_or_skip(err, line_number, name.id, options, outcome),
    }
}

// ============================================================================
// BULLET PARSER (legacy)
// ============================================================================

pub struct BulletParser;

impl BulletParser {
    pub fn new() -> Self {
        BulletParser
    }
}

impl Default for BulletParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingParser for BulletParser {
    fn parse(&self, text: &str, options: &ParseOptions) -> Result<ParseOutcome> {
        let mut outcome = ParseOutcome::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_number = idx + 1;
            let Some(body) = bullet_body(raw_line.trim()) else {
                continue;
            };

            let Some(name) = extract_name(body) else {
                debug!(line_number, "skipping bullet without an item identifier");
                continue;
            };

            let Some(phrase) = token_phrase(body) else {
                debug!(line_number, id = %name.id, "skipping bullet without a token count");
                continue;
            };

            match normalizer::token_magnitude(phrase) {
                Ok(metric) => outcome
                    .entries
                    .push(name.into_entry(0, 0.0, 0.0, Some(metric), line_number)),
                Err(err) => reject_or_skip(err, line_number, name.id, options, &mut outcome)?,
            }
        }

        finish(outcome)
    }

    fn format(&self) -> ListingFormat {
        ListingFormat::Bullets
    }
}

/// `*   [Name](url) 2.94B tokens` → text after the bullet marker
fn bullet_body(line: &str) -> Option<&str> {
    let body = line
        .strip_prefix('*')
        .or_else(|| line.strip_prefix('-'))?
        .trim_start();
    if body.starts_with('[') && body.contains("](") {
        Some(body)
    } else {
        None
    }
}

/// The number word right before "tokens", after the link.
fn token_phrase(body: &str) -> Option<&str> {
    let link = body.find("](")?;
    let after_link = &body[link + body[link..].find(')')? + 1..];
    let lower = after_link.to_ascii_lowercase();
    let end = lower.find("tokens")?;
    after_link[..end].split_whitespace().last()
}

// ============================================================================
// CELL EXTRACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct NameCell {
    id: String,
    display_name: String,
    provider: String,
}

impl NameCell {
    fn into_entry(
        self,
        context_length: i64,
        price_in: f64,
        price_out: f64,
        weekly_metric: Option<f64>,
        line_number: usize,
    ) -> RawEntry {
        RawEntry {
            id: self.id,
            display_name: self.display_name,
            provider: self.provider,
            context_length,
            price_in,
            price_out,
            weekly_metric,
            line_number,
        }
    }
}

/// Identifier from a URL: the path after the host, e.g.
/// `https://openrouter.ai/openai/gpt-4o` → `openai/gpt-4o`.
fn id_from_url(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let (_host, path) = rest.split_once('/')?;
    let path = path.split(['?', '#']).next().unwrap_or("").trim_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// `[Name](url)` → (name, url)
fn markdown_link(cell: &str) -> Option<(&str, &str)> {
    let open = cell.find('[')?;
    let mid = open + cell[open..].find("](")?;
    let close = mid + 2 + cell[mid + 2..].find(')')?;
    Some((&cell[open + 1..mid], &cell[mid + 2..close]))
}

/// A bare `https://...` token inside the cell
fn bare_url(cell: &str) -> Option<&str> {
    cell.split_whitespace()
        .find(|word| word.starts_with("http://") || word.starts_with("https://"))
        .map(|word| word.trim_end_matches([')', ']', ',']))
}

fn backtick_id(cell: &str) -> Option<&str> {
    let start = cell.find('`')? + 1;
    let len = cell[start..].find('`')?;
    let id = cell[start..start + len].trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn extract_name(cell: &str) -> Option<NameCell> {
    let (mut display, link_id) = match markdown_link(cell) {
        Some((text, url)) => (text.trim().to_string(), id_from_url(url)),
        None => match bare_url(cell) {
            Some(url) => {
                let cleaned = cell
                    .replace(url, "")
                    .replace(['[', ']', '(', ')'], "");
                (cleaned, id_from_url(url))
            }
            None => (cell.to_string(), None),
        },
    };

    // An explicit `id` outranks the link path
    let explicit = backtick_id(cell);
    if let Some(id) = explicit {
        display = display.replace(&format!("`{}`", id), "");
    }
    let id = explicit.map(str::to_string).or(link_id)?;

    let display = display.trim();
    let (provider, display_name) = match display.split_once(':') {
        Some((provider, rest)) if !provider.trim().is_empty() => {
            (provider.trim().to_string(), rest.trim().to_string())
        }
        _ => (UNKNOWN_PROVIDER.to_string(), display.to_string()),
    };

    Some(NameCell {
        id,
        display_name,
        provider,
    })
}

// ============================================================================
// SHARED RULES
// ============================================================================

fn reject_or_skip(
    err: NormalizationError,
    line_number: usize,
    item_id: String,
    options: &ParseOptions,
    outcome: &mut ParseOutcome,
) -> Result<()> {
    if !options.lenient {
        return Err(err.into());
    }

    warn!(line_number, id = %item_id, error = %err, "skipping row in lenient mode");
    outcome.anomalies.push(Anomaly {
        line_number,
        item_id,
        detail: err.to_string(),
    });
    Ok(())
}

/// Zero rows and repeated identifiers reject the batch in every mode.
fn finish(outcome: ParseOutcome) -> Result<ParseOutcome> {
    if outcome.entries.is_empty() {
        return Err(TrackerError::Parse("no rows extracted".to_string()));
    }

    let mut seen = BTreeSet::new();
    for entry in &outcome.entries {
        if !seen.insert(entry.id.as_str()) {
            return Err(TrackerError::Anomaly(format!(
                "duplicate identifier {} (line {})",
                entry.id, entry.line_number
            )));
        }
    }

    Ok(outcome)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
Title: Models | OpenRouter

Some intro text.

| Model Name & ID | Input ($/1M tokens) | Output ($/1M tokens) | Context (tokens) |
| --- | --- | --- | --- |
| [Alpha: Model A](https://openrouter.ai/alpha/model-a) | $0.10 | $0.40 | 128K |
| [Beta: Model B](https://openrouter.ai/beta/model-b) | $0 | $0 | 32K |
| [Model C](https://openrouter.ai/gamma/model-c) | free | free | 4096 |

Footer text.
";

    #[test]
    fn test_table_rows_in_source_order() {
        let outcome = TableParser::new().parse(TABLE, &ParseOptions::strict()).unwrap();
        let ids: Vec<&str> = outcome.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha/model-a", "beta/model-b", "gamma/model-c"]);

        let ranked = rank_entries(outcome.entries);
        for (i, entry) in ranked.iter().enumerate() {
            assert_eq!(entry.rank, i as u32 + 1);
        }
    }

    #[test]
    fn test_table_cells_normalized() {
        let outcome = TableParser::new().parse(TABLE, &ParseOptions::strict()).unwrap();
        let contexts: Vec<i64> = outcome.entries.iter().map(|e| e.context_length).collect();
        assert_eq!(contexts, vec![131072, 32768, 4096]);

        let first = &outcome.entries[0];
        assert_eq!(first.provider, "Alpha");
        assert_eq!(first.display_name, "Model A");
        assert_eq!(first.price_in, 0.10);
        assert_eq!(first.price_out, 0.40);
        assert_eq!(first.weekly_metric, None);
        assert_eq!(first.line_number, 7);

        assert_eq!(outcome.entries[2].provider, UNKNOWN_PROVIDER);
        assert_eq!(outcome.entries[2].display_name, "Model C");
    }

    #[test]
    fn test_backtick_id_takes_precedence() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [Acme: Turbo](https://openrouter.ai/acme/turbo) `acme/turbo:free` | $0 | $0 | 8K |
";
        let outcome = TableParser::new().parse(text, &ParseOptions::strict()).unwrap();
        assert_eq!(outcome.entries[0].id, "acme/turbo:free");
        assert_eq!(outcome.entries[0].display_name, "Turbo");
        assert_eq!(outcome.entries[0].provider, "Acme");
    }

    #[test]
    fn test_header_columns_reordered() {
        let text = "\
| Context | Model | Output | Input |
|:-:|:--|--:|---|
| 16K | [X: One](https://openrouter.ai/x/one) | $2 | $1 |
";
        let outcome = TableParser::new().parse(text, &ParseOptions::strict()).unwrap();
        let entry = &outcome.entries[0];
        assert_eq!(entry.context_length, 16384);
        assert_eq!(entry.price_in, 1.0);
        assert_eq!(entry.price_out, 2.0);
    }

    #[test]
    fn test_row_with_wrong_arity_is_skipped() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [A](https://openrouter.ai/p/a) | $0 | $0 | 4K |
| [B](https://openrouter.ai/p/b) | $0 | 4K |
| [C](https://openrouter.ai/p/c) | $0 | $0 | 8K |
";
        let outcome = TableParser::new().parse(text, &ParseOptions::strict()).unwrap();
        let ids: Vec<&str> = outcome.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p/a", "p/c"]);
    }

    #[test]
    fn test_table_stops_at_first_non_table_line() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [A](https://openrouter.ai/p/a) | $0 | $0 | 4K |
end of table
| [B](https://openrouter.ai/p/b) | $0 | $0 | 4K |
";
        let outcome = TableParser::new().parse(text, &ParseOptions::strict()).unwrap();
        assert_eq!(outcome.entries.len(), 1);
    }

    #[test]
    fn test_empty_table_is_parse_failure() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
";
        let err = TableParser::new().parse(text, &ParseOptions::strict()).unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
    }

    #[test]
    fn test_missing_header_is_parse_failure() {
        let err = TableParser::new()
            .parse("nothing to see here", &ParseOptions::strict())
            .unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
    }

    #[test]
    fn test_duplicate_id_is_anomaly() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [A](https://openrouter.ai/p/a) | $0 | $0 | 4K |
| [A again](https://openrouter.ai/p/a) | $0 | $0 | 4K |
";
        let err = TableParser::new().parse(text, &ParseOptions::lenient()).unwrap_err();
        assert!(matches!(err, TrackerError::Anomaly(_)));
    }

    #[test]
    fn test_bad_number_is_fatal_in_strict_mode() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [A](https://openrouter.ai/p/a) | $0 | $0 | 4K |
| [B](https://openrouter.ai/p/b) | $0 | $0 | huge |
";
        let err = TableParser::new().parse(text, &ParseOptions::strict()).unwrap_err();
        match err {
            TrackerError::Normalization(e) => {
                assert_eq!(e.field, "context_length");
                assert_eq!(e.input, "huge");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_number_is_skipped_in_lenient_mode() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [A](https://openrouter.ai/p/a) | $0 | $0 | 4K |
| [B](https://openrouter.ai/p/b) | $x | $0 | 4K |
";
        let outcome = TableParser::new().parse(text, &ParseOptions::lenient()).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.anomalies.len(), 1);
        assert_eq!(outcome.anomalies[0].item_id, "p/b");
        assert_eq!(outcome.anomalies[0].line_number, 4);
    }

    #[test]
    fn test_lenient_mode_still_rejects_empty_batch() {
        let text = "\
| Model | Input | Output | Context |
|---|---|---|---|
| [B](https://openrouter.ai/p/b) | $x | $0 | 4K |
";
        let err = TableParser::new().parse(text, &ParseOptions::lenient()).unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
    }

    #[test]
    fn test_bullet_list() {
        let text = "\
# Top this week

*   [Meta: Llama](https://openrouter.ai/meta/llama)   600M tokens
*   [Google: Gemini](https://openrouter.ai/google/gemini)   2.94B tokens
*   [Small](https://openrouter.ai/misc/small) 1,200 tokens
";
        let outcome = BulletParser::new().parse(text, &ParseOptions::strict()).unwrap();
        let metrics: Vec<Option<f64>> = outcome.entries.iter().map(|e| e.weekly_metric).collect();
        assert_eq!(metrics, vec![Some(600.0), Some(2940.0), Some(1200.0)]);
        assert_eq!(outcome.entries[1].provider, "Google");

        let ranked = rank_entries(outcome.entries);
        let order: Vec<&str> = ranked.iter().map(|e| e.id()).collect();
        assert_eq!(order, vec!["google/gemini", "misc/small", "meta/llama"]);
    }

    #[test]
    fn test_rank_ties_keep_source_order() {
        let text = "\
* [A](https://x.io/p/a) 5M tokens
* [B](https://x.io/p/b) 9M tokens
* [C](https://x.io/p/c) 5M tokens
";
        let ranked = rank_entries(parse_document(text, &ParseOptions::strict()).unwrap().entries);
        let order: Vec<(&str, u32)> = ranked.iter().map(|e| (e.id(), e.rank)).collect();
        assert_eq!(order, vec![("p/b", 1), ("p/a", 2), ("p/c", 3)]);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(TABLE).unwrap(), ListingFormat::Table);
        assert_eq!(
            detect_format("* [A](https://x.io/p/a) 5M tokens").unwrap(),
            ListingFormat::Bullets
        );
        assert!(detect_format("").is_err());
        assert!(detect_format("plain prose").is_err());
    }

    #[test]
    fn test_narrow_table_before_listing_is_skipped() {
        let text = "\
| Home | Models |
|---|---|
| [Home](https://openrouter.ai/) | [Models](https://openrouter.ai/models) |

| Model | Input | Output | Context |
|---|---|---|---|
| [A](https://openrouter.ai/p/a) | $0 | $0 | 4K |
";
        assert!(header_columns("| Home | Models |").is_none());

        let outcome = parse_document(text, &ParseOptions::strict()).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].id, "p/a");
        assert_eq!(outcome.entries[0].context_length, 4096);
    }

    #[test]
    fn test_narrow_table_alone_is_parse_failure() {
        let text = "\
| Name | Link |
|---|---|
| [Docs](https://openrouter.ai/docs) | [Docs](https://openrouter.ai/docs) |
";
        let err = TableParser::new().parse(text, &ParseOptions::strict()).unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
    }

    #[test]
    fn test_extract_name_bare_url() {
        let name = extract_name("Vendor: Thing https://openrouter.ai/vendor/thing").unwrap();
        assert_eq!(name.id, "vendor/thing");
        assert_eq!(name.provider, "Vendor");
        assert_eq!(name.display_name, "Thing");
    }

    #[test]
    fn test_extract_name_without_id() {
        assert!(extract_name("Just text").is_none());
        assert!(extract_name("[Home](https://openrouter.ai/)").is_none());
    }
}
