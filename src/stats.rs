use crate::{
    aggregate::ColumnTally,
    document::{Document, Value},
    rows::Table,
};

/// Summary statistics for every numeric column, keyed by column name:
/// `count`, `mean`, `std`, `min`, `25%`, `50%`, `75%`, `max`.
///
/// Columns holding any text are left out, as are columns with no numbers at
/// all. Every statistic is rounded to two places; ones that cannot be
/// computed (std of a single value) are null.
pub fn numeric_overview(table: &Table) -> Document {
    let mut overview = Document::new();
    for (idx, column) in table.columns().iter().enumerate() {
        let Some(tally) = ColumnTally::of(table, column) else {
            continue;
        };
        if tally.numeric == 0 || tally.text > 0 {
            continue;
        }
        let mut stats = ColumnStats::default();
        for value in table.column_values(idx) {
            if let Some(number) = value.as_f64() {
                stats.add_value(number);
            }
        }
        overview.insert(column.clone(), stats.to_document());
    }
    overview
}

#[derive(Debug, Default)]
struct ColumnStats {
    values: Vec<f64>,
    sum: f64,
    sum_squares: f64,
}

impl ColumnStats {
    fn add_value(&mut self, numeric: f64) {
        if !numeric.is_finite() {
            return;
        }
        self.sum += numeric;
        self.sum_squares += numeric * numeric;
        self.values.push(numeric);
    }

    fn count(&self) -> usize {
        self.values.len()
    }

    fn mean(&self) -> Option<f64> {
        if self.count() > 0 {
            Some(self.sum / self.count() as f64)
        } else {
            None
        }
    }

    fn std_dev(&self) -> Option<f64> {
        let count = self.count();
        if count < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = (self.sum_squares - count as f64 * mean * mean) / (count as f64 - 1.0);
        Some(variance.max(0.0).sqrt())
    }

    /// Linear interpolation between closest ranks.
    fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
        if sorted.is_empty() {
            return None;
        }
        let position = q * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let weight = position - lower as f64;
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
    }

    fn to_document(&self) -> Document {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let rounded = |metric: Option<f64>| metric.map(Value::rounded).unwrap_or(Value::Null);
        let mut doc = Document::new();
        doc.insert("count", self.count() as i64);
        doc.insert("mean", rounded(self.mean()));
        doc.insert("std", rounded(self.std_dev()));
        doc.insert("min", rounded(sorted.first().copied()));
        doc.insert("25%", rounded(Self::quantile(&sorted, 0.25)));
        doc.insert("50%", rounded(Self::quantile(&sorted, 0.5)));
        doc.insert("75%", rounded(Self::quantile(&sorted, 0.75)));
        doc.insert("max", rounded(sorted.last().copied()));
        doc
    }
}
