// 📊 Comparison - rank deltas, new items, batch summary
//
// Pure function of (current ranked batch, known ids before the batch, prior
// snapshot set). Holds no state between batches.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::Snapshot;
use crate::parser::RankedEntry;

/// Item fields carried in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub context_length: i64,
    pub weekly_metric: f64,
    pub price_in: f64,
    pub price_out: f64,
}

impl From<&RankedEntry> for ReportItem {
    fn from(entry: &RankedEntry) -> Self {
        ReportItem {
            id: entry.entry.id.clone(),
            display_name: entry.entry.display_name.clone(),
            provider: entry.entry.provider.clone(),
            context_length: entry.entry.context_length,
            weekly_metric: entry.weekly_metric(),
            price_in: entry.entry.price_in,
            price_out: entry.entry.price_out,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", content = "places", rename_all = "lowercase")]
pub enum Movement {
    Improved(u32),
    Declined(u32),
    Unchanged,
}

/// One row of the rank-delta view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankDelta {
    pub rank: u32,
    /// None when the item is absent from the prior snapshot set
    pub previous_rank: Option<u32>,
    pub item: ReportItem,
}

impl RankDelta {
    /// Prior rank, falling back to the current rank.
    ///
    /// Known limitation: an item new to the top N reads as unchanged here.
    /// Check `previous_rank` to tell the two apart.
    pub fn effective_previous_rank(&self) -> u32 {
        self.previous_rank.unwrap_or(self.rank)
    }

    pub fn movement(&self) -> Movement {
        let previous = self.effective_previous_rank();
        if previous > self.rank {
            Movement::Improved(previous - self.rank)
        } else if previous < self.rank {
            Movement::Declined(self.rank - previous)
        } else {
            Movement::Unchanged
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub item_count: usize,
    pub total_metric: f64,
    pub new_count: usize,
}

/// Payload handed to the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub date: NaiveDate,
    /// Date of the prior snapshot set compared against, if any
    pub compared_with: Option<NaiveDate>,
    pub top_n: Vec<RankDelta>,
    pub new_items: Vec<ReportItem>,
    pub summary: Summary,
}

/// Build the comparison for one batch.
///
/// `known_ids` must be the set read before this batch wrote anything.
pub fn compare(
    date: NaiveDate,
    ranked: &[RankedEntry],
    known_ids: &BTreeSet<String>,
    prior: &[Snapshot],
    top_n: usize,
) -> Report {
    let previous: HashMap<&str, u32> = prior
        .iter()
        .map(|snap| (snap.item_id.as_str(), snap.rank))
        .collect();

    let top_n: Vec<RankDelta> = ranked
        .iter()
        .take(top_n)
        .map(|entry| RankDelta {
            rank: entry.rank,
            previous_rank: previous.get(entry.id()).copied(),
            item: ReportItem::from(entry),
        })
        .collect();

    let new_items: Vec<ReportItem> = ranked
        .iter()
        .filter(|entry| !known_ids.contains(entry.id()))
        .map(ReportItem::from)
        .collect();

    let summary = Summary {
        item_count: ranked.len(),
        total_metric: ranked.iter().map(RankedEntry::weekly_metric).sum(),
        new_count: new_items.len(),
    };

    Report {
        date,
        compared_with: prior.iter().map(|snap| snap.date).max(),
        top_n,
        new_items,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{rank_entries, RawEntry};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn batch(items: &[(&str, Option<f64>)]) -> Vec<RankedEntry> {
        let entries = items
            .iter()
            .enumerate()
            .map(|(i, (id, metric))| RawEntry {
                id: id.to_string(),
                display_name: id.to_string(),
                provider: "P".to_string(),
                context_length: 1024,
                price_in: 0.0,
                price_out: 0.0,
                weekly_metric: *metric,
                line_number: i + 1,
            })
            .collect();
        rank_entries(entries)
    }

    fn snaps(date: NaiveDate, order: &[&str]) -> Vec<Snapshot> {
        order
            .iter()
            .enumerate()
            .map(|(i, id)| Snapshot {
                item_id: id.to_string(),
                date,
                rank: i as u32 + 1,
                weekly_metric: 0.0,
                price_in: 0.0,
                price_out: 0.0,
            })
            .collect()
    }

    fn known(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rank_deltas() {
        let current = batch(&[("b", None), ("a", None), ("c", None)]);
        let prior = snaps(day(1), &["a", "b", "c"]);

        let report = compare(day(2), &current, &known(&["a", "b", "c"]), &prior, 5);
        let moves: Vec<(&str, Movement)> = report
            .top_n
            .iter()
            .map(|d| (d.item.id.as_str(), d.movement()))
            .collect();

        assert_eq!(
            moves,
            vec![
                ("b", Movement::Improved(1)),
                ("a", Movement::Declined(1)),
                ("c", Movement::Unchanged),
            ]
        );
        assert_eq!(report.compared_with, Some(day(1)));
    }

    #[test]
    fn test_missing_prior_falls_back_to_current_rank() {
        let current = batch(&[("new", None), ("a", None)]);
        let prior = snaps(day(1), &["a"]);

        let report = compare(day(2), &current, &known(&["a"]), &prior, 5);
        let fresh = &report.top_n[0];
        assert_eq!(fresh.previous_rank, None);
        assert_eq!(fresh.effective_previous_rank(), 1);
        assert_eq!(fresh.movement(), Movement::Unchanged);

        assert_eq!(report.top_n[1].previous_rank, Some(1));
        assert_eq!(report.top_n[1].movement(), Movement::Declined(1));
    }

    #[test]
    fn test_new_items_against_known_set() {
        let current = batch(&[("a", None), ("b", None), ("c", None)]);

        let first = compare(day(1), &current, &known(&[]), &[], 5);
        assert_eq!(first.new_items.len(), 3);
        assert_eq!(first.compared_with, None);

        let second = compare(day(1), &current, &known(&["a", "b", "c"]), &[], 5);
        assert!(second.new_items.is_empty());
        assert_eq!(second.summary.new_count, 0);
    }

    #[test]
    fn test_top_n_limit_and_summary() {
        let current = batch(&[("a", Some(10.0)), ("b", Some(30.0)), ("c", Some(20.5))]);

        let report = compare(day(1), &current, &known(&["a"]), &[], 2);
        assert_eq!(report.top_n.len(), 2);
        assert_eq!(report.top_n[0].item.id, "b");
        assert_eq!(report.summary.item_count, 3);
        assert_eq!(report.summary.total_metric, 60.5);
        assert_eq!(report.summary.new_count, 2);
    }

    #[test]
    fn test_report_json_shape() {
        let current = batch(&[("a", None)]);
        let report = compare(day(4), &current, &known(&[]), &[], 5);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["date"], "2025-03-04");
        assert_eq!(json["top_n"][0]["rank"], 1);
        assert!(json["top_n"][0]["previous_rank"].is_null());
        assert_eq!(json["top_n"][0]["item"]["id"], "a");
        assert_eq!(json["summary"]["new_count"], 1);
    }
}
