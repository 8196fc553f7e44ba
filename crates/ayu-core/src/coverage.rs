//! Per-file coverage for the latest run.
//!
//! The whole table is swapped on every COVERAGE event; there are no partial
//! updates.

use std::collections::BTreeMap;

use crate::event::{CoveragePayload, FileCoverage, LineRange};

/// Coverage of a single source file.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRecord {
    pub statements_total: u64,
    pub statements_missed: u64,
    pub percent_covered: f64,
    /// Ordered, inclusive ranges of uncovered lines.
    pub missing_line_ranges: Vec<LineRange>,
}

impl CoverageRecord {
    pub fn statements_covered(&self) -> u64 {
        self.statements_total.saturating_sub(self.statements_missed)
    }

    pub fn is_line_missing(&self, line: u32) -> bool {
        self.missing_line_ranges.iter().any(|range| range.contains(line))
    }
}

impl From<&FileCoverage> for CoverageRecord {
    fn from(file: &FileCoverage) -> Self {
        let mut missing_line_ranges = file.lines_missing.clone();
        missing_line_ranges.sort_by_key(|range| (range.start, range.end));
        Self {
            statements_total: file.n_statements,
            statements_missed: file.n_missed,
            percent_covered: file.percent_covered,
            missing_line_ranges,
        }
    }
}

/// Totals across every file in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoverageSummary {
    pub files: usize,
    pub statements_total: u64,
    pub statements_missed: u64,
    /// Statement-weighted coverage; 100 when there are no statements.
    pub percent_covered: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CoverageTable {
    records: BTreeMap<String, CoverageRecord>,
}

impl CoverageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a complete new record set.
    pub fn replace(&mut self, records: BTreeMap<String, CoverageRecord>) {
        self.records = records;
    }

    /// Replace the table with the contents of a COVERAGE payload.
    pub fn replace_from_payload(&mut self, payload: &CoveragePayload) {
        let records = payload
            .coverage_dict
            .iter()
            .map(|(path, file)| (path.clone(), CoverageRecord::from(file)))
            .collect();
        self.replace(records);
    }

    pub fn records_for(&self, path: &str) -> Option<&CoverageRecord> {
        self.records.get(path)
    }

    /// Records in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoverageRecord)> {
        self.records.iter().map(|(path, record)| (path.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> CoverageSummary {
        let (total, missed) = self
            .records
            .values()
            .fold((0u64, 0u64), |(total, missed), record| {
                (
                    total.saturating_add(record.statements_total),
                    missed.saturating_add(record.statements_missed),
                )
            });
        let percent_covered = if total == 0 {
            100.0
        } else {
            total.saturating_sub(missed) as f64 * 100.0 / total as f64
        };
        CoverageSummary {
            files: self.records.len(),
            statements_total: total,
            statements_missed: missed,
            percent_covered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(total: u64, missed: u64, ranges: &[(u32, u32)]) -> FileCoverage {
        FileCoverage {
            n_statements: total,
            n_missed: missed,
            percent_covered: (total - missed) as f64 * 100.0 / total as f64,
            lines_missing: ranges.iter().map(|r| LineRange::from(*r)).collect(),
        }
    }

    fn payload(entries: Vec<(&str, FileCoverage)>) -> CoveragePayload {
        CoveragePayload {
            coverage_dict: entries
                .into_iter()
                .map(|(path, file)| (path.to_string(), file))
                .collect(),
        }
    }

    #[test]
    fn empty_table() {
        let table = CoverageTable::new();
        assert!(table.is_empty());
        assert!(table.records_for("src/app.py").is_none());
        assert_eq!(table.summary().percent_covered, 100.0);
    }

    #[test]
    fn replace_from_payload_maps_fields() {
        let mut table = CoverageTable::new();
        table.replace_from_payload(&payload(vec![("src/app.py", file(10, 2, &[(8, 9)]))]));

        let record = table.records_for("src/app.py").unwrap();
        assert_eq!(record.statements_total, 10);
        assert_eq!(record.statements_missed, 2);
        assert_eq!(record.statements_covered(), 8);
        assert_eq!(record.percent_covered, 80.0);
        assert_eq!(record.missing_line_ranges, vec![LineRange::new(8, 9)]);
        assert!(record.is_line_missing(9));
        assert!(!record.is_line_missing(10));
    }

    #[test]
    fn replace_is_wholesale() {
        let mut table = CoverageTable::new();
        table.replace_from_payload(&payload(vec![
            ("src/a.py", file(10, 0, &[])),
            ("src/b.py", file(10, 5, &[(1, 5)])),
        ]));
        assert_eq!(table.len(), 2);

        table.replace_from_payload(&payload(vec![("src/c.py", file(4, 1, &[(2, 2)]))]));
        assert_eq!(table.len(), 1);
        assert!(table.records_for("src/a.py").is_none());
        assert!(table.records_for("src/c.py").is_some());
    }

    #[test]
    fn missing_ranges_are_ordered() {
        let mut table = CoverageTable::new();
        table.replace_from_payload(&payload(vec![("src/a.py", file(20, 6, &[(15, 17), (2, 4)]))]));
        let ranges = &table.records_for("src/a.py").unwrap().missing_line_ranges;
        assert_eq!(ranges, &vec![LineRange::new(2, 4), LineRange::new(15, 17)]);
    }

    #[test]
    fn summary_weights_by_statements() {
        let mut table = CoverageTable::new();
        table.replace_from_payload(&payload(vec![
            ("src/a.py", file(30, 0, &[])),
            ("src/b.py", file(10, 10, &[(1, 10)])),
        ]));
        let summary = table.summary();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.statements_total, 40);
        assert_eq!(summary.statements_missed, 10);
        assert_eq!(summary.percent_covered, 75.0);

        let paths: Vec<&str> = table.iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["src/a.py", "src/b.py"]);
    }

    #[test]
    fn summary_saturates_on_huge_counts() {
        let mut table = CoverageTable::new();
        table.replace_from_payload(&payload(vec![
            ("src/a.py", file(u64::MAX, 0, &[])),
            ("src/b.py", file(u64::MAX, u64::MAX, &[(1, u32::MAX)])),
        ]));
        let summary = table.summary();
        assert_eq!(summary.statements_total, u64::MAX);
        assert_eq!(summary.statements_missed, u64::MAX);
        assert_eq!(summary.percent_covered, 0.0);
    }
}
