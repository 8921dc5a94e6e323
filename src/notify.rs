// 📣 Report delivery
// The core hands over a structured Report; message layout and rate limiting
// belong to whatever sits behind a Notifier.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use tracing::info;

use crate::comparison::Report;
use crate::error::{Result, TrackerError};

pub trait Notifier {
    fn notify(&self, report: &Report) -> Result<()>;
}

/// Writes the report as JSON to stdout or a file.
pub struct JsonNotifier {
    target: Option<PathBuf>,
    pretty: bool,
}

impl JsonNotifier {
    pub fn stdout() -> Self {
        JsonNotifier {
            target: None,
            pretty: true,
        }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        JsonNotifier {
            target: Some(path.into()),
            pretty: true,
        }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn write_to(&self, out: &mut dyn Write, report: &Report) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, report)?;
        } else {
            serde_json::to_writer(&mut *out, report)?;
        }
        writeln!(out).map_err(|e| TrackerError::Notify(e.to_string()))?;
        out.flush().map_err(|e| TrackerError::Notify(e.to_string()))
    }
}

impl Notifier for JsonNotifier {
    fn notify(&self, report: &Report) -> Result<()> {
        match &self.target {
            Some(path) => {
                let file = File::create(path)
                    .map_err(|e| TrackerError::Notify(format!("{}: {e}", path.display())))?;
                self.write_to(&mut BufWriter::new(file), report)?;
                info!(path = %path.display(), "report written");
            }
            None => {
                let stdout = std::io::stdout();
                self.write_to(&mut stdout.lock(), report)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::Summary;
    use chrono::NaiveDate;

    fn report() -> Report {
        Report {
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            compared_with: None,
            top_n: Vec::new(),
            new_items: Vec::new(),
            summary: Summary {
                item_count: 0,
                total_metric: 0.0,
                new_count: 0,
            },
        }
    }

    #[test]
    fn test_json_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        JsonNotifier::to_file(&path).compact().notify(&report()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: Report = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report());
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_unwritable_target_is_notify_error() {
        let err = JsonNotifier::to_file("/no/such/dir/report.json")
            .notify(&report())
            .unwrap_err();
        assert!(matches!(err, TrackerError::Notify(_)));
    }
}
