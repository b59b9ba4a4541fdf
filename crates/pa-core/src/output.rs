//! Flagged-purchase output writer.
//!
//! One JSON object per line, in detection order, with amounts formatted
//! to two decimals:
//!
//! ```text
//! {"event_type":"purchase", "timestamp":"2017-01-01 13:00:05", "id": "1", "amount": "1601.83", "mean": "29.90", "sd": "12.10"}
//! ```

use pa_common::Result;
use std::io::Write;
use std::path::Path;

use crate::ingest::TIMESTAMP_FORMAT;
use crate::processor::AnomalyReport;

/// Append-only writer for anomaly notifications.
pub struct AnomalyWriter<W: Write> {
    writer: W,
}

impl<W: Write> AnomalyWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one flagged purchase.
    pub fn write(&mut self, report: &AnomalyReport) -> Result<()> {
        writeln!(self.writer, "{}", format_report(report))?;
        Ok(())
    }

    /// Write a batch of reports in order.
    pub fn write_all(&mut self, reports: &[AnomalyReport]) -> Result<()> {
        for report in reports {
            self.write(report)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl AnomalyWriter<std::io::BufWriter<std::fs::File>> {
    /// Create (truncating) the flagged-purchases file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(std::io::BufWriter::new(file)))
    }
}

fn format_report(report: &AnomalyReport) -> String {
    format!(
        r#"{{"event_type":"purchase", "timestamp":"{}", "id": "{}", "amount": "{:.2}", "mean": "{:.2}", "sd": "{:.2}"}}"#,
        report.timestamp.format(TIMESTAMP_FORMAT),
        report.id,
        report.amount,
        report.mean,
        report.stdev,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pa_common::UserId;

    fn report() -> AnomalyReport {
        AnomalyReport {
            id: UserId::from("1"),
            timestamp: NaiveDate::from_ymd_opt(2017, 1, 1)
                .unwrap()
                .and_hms_opt(13, 0, 5)
                .unwrap(),
            amount: 1601.83,
            mean: 29.9,
            stdev: 12.1034,
        }
    }

    #[test]
    fn test_two_decimal_formatting() {
        let line = format_report(&report());
        assert_eq!(
            line,
            r#"{"event_type":"purchase", "timestamp":"2017-01-01 13:00:05", "id": "1", "amount": "1601.83", "mean": "29.90", "sd": "12.10"}"#
        );
    }

    #[test]
    fn test_writer_emits_one_line_per_report() {
        let mut buf = Vec::new();
        {
            let mut writer = AnomalyWriter::new(&mut buf);
            writer.write_all(&[report(), report()]).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
