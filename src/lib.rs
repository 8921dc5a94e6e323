// Rank Tracker - Core Library
// Listing parser, unit normalizer, snapshot store and rank comparator

pub mod batch;
pub mod comparison;
pub mod config;
pub mod db;
pub mod error;
pub mod normalizer;
pub mod notify;
pub mod parser;
pub mod source;

// Re-export commonly used types
pub use batch::{run_batch, run_batch_tracked, BatchOptions, BatchOutcome, Stage};
pub use comparison::{compare, Movement, RankDelta, Report, ReportItem, Summary};
pub use config::Config;
pub use db::{
    BatchWrite, Event, EventKind, Item, Snapshot, Store, StoreConfig, TopEntry,
    setup_database,
};
pub use error::{NormalizationError, Result, TrackerError};
pub use normalizer::{context_length, price, token_magnitude};
pub use notify::{JsonNotifier, Notifier};
pub use parser::{
    detect_format, get_parser, parse_document, rank_entries,
    Anomaly, BulletParser, ListingFormat, ListingParser, ParseOptions, ParseOutcome,
    RankedEntry, RawEntry, TableParser,
};
pub use source::{DocumentSource, FileSource, TextSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
