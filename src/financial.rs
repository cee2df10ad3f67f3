//! Financial analysis: keyword totals, margin ratios, a numeric overview and
//! monthly revenue/cost trends.
//!
//! Unlike the environmental categories, a matched financial key reports its
//! total even when it sums to zero; a zero balance is a real figure here.

use std::collections::BTreeMap;

use chrono::Datelike;
use log::debug;

use crate::{
    aggregate::{ColumnTally, ratio},
    document::{Document, Value, round2},
    matcher::{ColumnMatches, KeywordTable, match_columns},
    rows::{Table, cell_date},
    stats::numeric_overview,
    template::FINANCIAL,
};

pub fn analyze(table: &Table, keywords: &KeywordTable) -> Document {
    let matches = match_columns(table.columns(), keywords);
    let mut analysis = FINANCIAL.skeleton();
    analysis.insert("category", FINANCIAL.name);
    analysis.insert("file_count", 1_i64);
    analysis.insert("record_count", table.row_count() as i64);
    if table.is_empty() {
        debug!("Financial upload has no rows; leaving figures empty");
        return analysis;
    }

    analysis.insert("numeric_overview", numeric_overview(table));

    let totals = key_totals(table, &matches, keywords);
    let total = |key: &str| totals.get(key).copied();
    let mut financials = analysis
        .get("financials")
        .and_then(Value::as_document)
        .cloned()
        .unwrap_or_default();
    for (key, value) in &totals {
        financials.insert(format!("total_{key}"), *value);
    }

    let revenue = total("revenue");
    let cost = total("cost");
    if let (Some(revenue), Some(cost)) = (revenue, cost) {
        financials.insert("gross_margin", Value::from(round2(revenue - cost)));
        financials.insert(
            "gross_margin_pct",
            Value::from(percentage(revenue - cost, revenue)),
        );
    }
    if let (Some(profit), Some(revenue)) = (total("profit"), revenue) {
        financials.insert(
            "net_margin_pct",
            Value::from(percentage(profit, revenue)),
        );
    }
    if let (Some(debt), Some(equity)) = (total("debt"), total("equity")) {
        financials.insert("debt_to_equity", Value::from(ratio(Some(debt), Some(equity))));
    }
    analysis.insert("financials", financials);

    let mut trend_columns = matches.get("revenue").to_vec();
    trend_columns.extend(matches.get("cost").iter().cloned());
    analysis.insert("monthly_trends", Value::List(monthly_trends(table, &trend_columns)));
    analysis
}

fn percentage(part: f64, whole: f64) -> Option<f64> {
    round2(part / whole * 100.0)
}

fn key_totals(
    table: &Table,
    matches: &ColumnMatches,
    keywords: &KeywordTable,
) -> BTreeMap<String, f64> {
    keywords
        .categories()
        .filter_map(|key| {
            let columns = matches.get(key);
            if columns.is_empty() {
                return None;
            }
            let sum: f64 = columns
                .iter()
                .filter_map(|column| ColumnTally::of(table, column))
                .map(|tally| tally.sum)
                .sum();
            round2(sum).map(|total| (key.to_string(), total))
        })
        .collect()
}

/// First column that looks like a date by name and has at least one parseable
/// date cell.
fn time_column(table: &Table) -> Option<usize> {
    table.columns().iter().enumerate().find_map(|(idx, name)| {
        let named = name.to_lowercase().contains("date");
        (named && table.column_values(idx).any(|v| cell_date(v).is_some())).then_some(idx)
    })
}

/// Per-month sums of `columns`, ordered by month. Rows whose date does not
/// parse are skipped.
pub fn monthly_trends(table: &Table, columns: &[String]) -> Vec<Value> {
    let Some(time_idx) = time_column(table) else {
        return Vec::new();
    };
    let indices = columns
        .iter()
        .filter_map(|column| table.column_index(column).map(|idx| (column, idx)))
        .collect::<Vec<_>>();
    if indices.is_empty() {
        return Vec::new();
    }

    let mut buckets: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for row in table.rows() {
        let Some(date) = row.get(time_idx).and_then(cell_date) else {
            continue;
        };
        let sums = buckets
            .entry((date.year(), date.month()))
            .or_insert_with(|| vec![0.0; indices.len()]);
        for (slot, (_, idx)) in sums.iter_mut().zip(&indices) {
            if let Some(number) = row.get(*idx).and_then(Value::as_f64) {
                *slot += number;
            }
        }
    }

    buckets
        .into_iter()
        .map(|((year, month), sums)| {
            let mut entry = Document::new();
            entry.insert("month", format!("{year:04}-{month:02}"));
            for ((column, _), sum) in indices.iter().zip(sums) {
                entry.insert((*column).clone(), Value::rounded(sum));
            }
            Value::Document(entry)
        })
        .collect()
}
