//! # Peerscope Aligner Crate
//!
//! Turns the outcomes of a batch into display-ready tables: one table per metric, rows
//! reindexed to the classification's canonical label order, one column per comparison
//! universe.
//!
//! ## Architectural Principles
//!
//! - **Stateless Calculation:** `ResultAligner` only reads a `BatchReport`; it performs
//!   no I/O and never fails once constructed.
//! - **Explicit Gaps:** A failed request, or a reply without a numeric value, leaves a
//!   `None` cell. Rows and columns are never dropped because of a failure, and the number
//!   of failed requests travels with the tables.
//!
//! ## Public API
//!
//! - `ResultAligner` / `align`: Reindexes a batch report.
//! - `AlignedTable` / `AlignedTables`: The aligned output.
//! - `RowAxis`: Align on bucket labels or on time-offset tags.
//! - `GridAligner` / `GridAxis`: Pivot rows grouped by two keys into one table.
//! - `AlignError`: The specific error types that can be returned from this crate.

pub mod align;
pub mod error;
pub mod grid;
pub mod table;

pub use align::{ResultAligner, RowAxis, align};
pub use error::AlignError;
pub use grid::{GridAligner, GridAxis};
pub use table::{AlignedTable, AlignedTables};

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{
        ALL_LABEL, Expression, Provenance, RequestDescriptor, ResultRow, ResultTable, Selection,
        Value,
    };
    use executor::{BatchOutcome, BatchReport, RequestFailure};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn descriptor(index: usize, selection: Selection, universe: &str, offset: &str) -> RequestDescriptor {
        RequestDescriptor::new(
            format!("request-{index}"),
            Expression::reference("UNIV"),
            vec![("OAS".to_string(), Expression::formula("SPREAD()"))],
            Provenance {
                index,
                classification: "Maturity Bucket".to_string(),
                selection,
                universe_name: universe.to_string(),
                universe_label: universe.to_string(),
                metrics: vec!["OAS".to_string()],
                offset: offset.to_string(),
            },
        )
    }

    fn success(index: usize, selection: Selection, universe: &str, value: i64) -> BatchOutcome {
        BatchOutcome::Success {
            descriptor: descriptor(index, selection, universe, "current"),
            table: ResultTable::single("row", [("OAS".to_string(), Value::from(Decimal::from(value)))]),
        }
    }

    fn failure(index: usize, selection: Selection, universe: &str) -> BatchOutcome {
        BatchOutcome::Failure {
            descriptor: descriptor(index, selection, universe, "current"),
            cause: RequestFailure::Aborted("scripted".to_string()),
        }
    }

    fn bucket(label: &str) -> Selection {
        Selection::Bucket(label.to_string())
    }

    fn canonical() -> Vec<String> {
        vec!["0-5".to_string(), "5-10".to_string(), "10+".to_string()]
    }

    #[test]
    fn rows_follow_the_canonical_order_with_explicit_gaps() {
        // Replies arrive for buckets out of canonical order; "10+" never answers.
        let report = BatchReport::from_outcomes(vec![
            success(0, bucket("5-10"), "Sector", 2),
            success(1, bucket("0-5"), "Sector", 1),
            failure(2, bucket("10+"), "Sector"),
        ]);

        let tables = align(&report, &canonical()).unwrap();
        let oas = tables.get("OAS").unwrap();

        assert_eq!(oas.rows, canonical());
        assert_eq!(oas.columns, vec!["Sector".to_string()]);
        assert_eq!(oas.cell("0-5", "Sector"), Some(Decimal::from(1)));
        assert_eq!(oas.cell("5-10", "Sector"), Some(Decimal::from(2)));
        assert_eq!(oas.cell("10+", "Sector"), None);
        assert_eq!(oas.empty_cells(), 1);
        assert_eq!(tables.failed(), 1);
        assert_eq!(tables.submitted(), 3);
    }

    #[test]
    fn failure_only_universe_still_gets_a_column() {
        let report = BatchReport::from_outcomes(vec![
            success(0, bucket("0-5"), "Sector", 1),
            failure(1, bucket("0-5"), "Rating"),
        ]);

        let oas = align(&report, &canonical()).unwrap().get("OAS").cloned().unwrap();
        assert_eq!(oas.columns, vec!["Sector".to_string(), "Rating".to_string()]);
        assert_eq!(oas.cells()[0], vec![Some(Decimal::from(1)), None]);
    }

    #[test]
    fn unknown_labels_are_dropped_and_all_row_is_appended() {
        let report = BatchReport::from_outcomes(vec![
            success(0, bucket("0-5"), "Sector", 1),
            success(1, bucket("30+"), "Sector", 9),
            success(2, Selection::All, "Sector", 5),
        ]);

        let oas = align(&report, &canonical()).unwrap().get("OAS").cloned().unwrap();
        assert_eq!(oas.rows.last().map(String::as_str), Some(ALL_LABEL));
        assert_eq!(oas.rows.len(), 4);
        assert!(!oas.rows.iter().any(|r| r == "30+"));
        assert_eq!(oas.cell(ALL_LABEL, "Sector"), Some(Decimal::from(5)));
    }

    #[test]
    fn no_all_row_without_unfiltered_requests() {
        let report = BatchReport::from_outcomes(vec![success(0, bucket("0-5"), "Sector", 1)]);
        let oas = align(&report, &canonical()).unwrap().get("OAS").cloned().unwrap();
        assert_eq!(oas.rows, canonical());
    }

    #[test]
    fn grouped_replies_are_spread_over_rows() {
        let values = |v: i64| BTreeMap::from([("OAS".to_string(), Value::from(Decimal::from(v)))]);
        let table = ResultTable::new(vec![
            ResultRow { label: "10+".to_string(), values: values(3) },
            ResultRow { label: "0-5".to_string(), values: values(1) },
            ResultRow { label: "0-5".to_string(), values: values(7) },
            ResultRow {
                label: "5-10".to_string(),
                values: BTreeMap::from([("OAS".to_string(), Value::Missing)]),
            },
        ]);
        let report = BatchReport::from_outcomes(vec![BatchOutcome::Success {
            descriptor: descriptor(0, Selection::Grouped, "Sector", "current"),
            table,
        }]);

        let oas = align(&report, &canonical()).unwrap().get("OAS").cloned().unwrap();
        assert_eq!(
            oas.cells(),
            &[
                vec![Some(Decimal::from(1))],
                vec![None],
                vec![Some(Decimal::from(3))],
            ]
        );
    }

    #[test]
    fn offset_axis_uses_time_offset_tags() {
        let outcome = |index: usize, offset: &str, value: i64| BatchOutcome::Success {
            descriptor: descriptor(index, Selection::All, "Sector", offset),
            table: ResultTable::single("row", [("OAS".to_string(), Value::from(Decimal::from(value)))]),
        };
        let report = BatchReport::from_outcomes(vec![outcome(0, "-1M", 110), outcome(1, "-0D", 100)]);
        let tags = vec!["-0D".to_string(), "-1W".to_string(), "-1M".to_string()];

        let aligner = ResultAligner::on_offsets(tags.clone()).unwrap();
        assert_eq!(aligner.axis(), RowAxis::Offset);
        let oas = aligner.align(&report).get("OAS").cloned().unwrap();
        assert_eq!(oas.rows, tags);
        assert_eq!(oas.cell("-0D", "Sector"), Some(Decimal::from(100)));
        assert_eq!(oas.cell("-1W", "Sector"), None);
        assert_eq!(oas.cell("-1M", "Sector"), Some(Decimal::from(110)));
    }

    #[test]
    fn duplicate_canonical_labels_are_rejected() {
        let labels = vec!["0-5".to_string(), "0-5".to_string()];
        assert_eq!(
            ResultAligner::new(labels).unwrap_err(),
            AlignError::DuplicateLabel("0-5".to_string())
        );
    }

    #[test]
    fn empty_report_gives_no_tables() {
        let tables = align(&BatchReport::from_outcomes(Vec::new()), &canonical()).unwrap();
        assert!(tables.is_empty());
        assert_eq!(tables.failed(), 0);
    }
}
