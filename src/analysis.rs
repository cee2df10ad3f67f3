//! Analysis kinds and their entry points.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{
    config::Settings,
    document::Document,
    environmental, financial,
    rows::Table,
    template::{ENVIRONMENTAL, FINANCIAL, SECR, Template},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Energy, emissions, waste and water heuristics
    Environmental,
    /// Revenue, cost and balance-sheet heuristics
    Financial,
    /// SECR report; filled entirely by the field completer
    Secr,
}

impl AnalysisKind {
    pub fn template(self) -> &'static Template {
        match self {
            AnalysisKind::Environmental => &ENVIRONMENTAL,
            AnalysisKind::Financial => &FINANCIAL,
            AnalysisKind::Secr => &SECR,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.template().name
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic partial analysis of one table. Fields the heuristics cannot
/// determine are left null for the field completer.
pub fn analyze(kind: AnalysisKind, table: &Table, settings: &Settings) -> Document {
    match kind {
        AnalysisKind::Environmental => {
            environmental::analyze(table, settings.environmental_keywords())
        }
        AnalysisKind::Financial => financial::analyze(table, settings.financial_keywords()),
        AnalysisKind::Secr => secr_skeleton(table),
    }
}

fn secr_skeleton(table: &Table) -> Document {
    let mut report = SECR.skeleton();
    report.insert("category", SECR.name);
    report.insert("file_count", 1_i64);
    report.insert("record_count", table.row_count() as i64);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;

    #[test]
    fn secr_analysis_is_a_counted_skeleton() {
        let mut table = Table::new(vec!["anything".into()]);
        table.push_row(vec![Value::Integer(1)]).unwrap();
        let doc = analyze(AnalysisKind::Secr, &table, &Settings::default());
        assert_eq!(doc.get("record_count"), Some(&Value::Integer(1)));
        assert_eq!(
            doc.at(&["compliance", "reporting_standard"]),
            Some(&Value::Null)
        );
    }

    #[test]
    fn kinds_name_their_templates() {
        assert_eq!(AnalysisKind::Environmental.to_string(), "environmental");
        assert_eq!(AnalysisKind::Secr.template().name, "secr");
    }
}
