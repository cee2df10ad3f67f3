//! Per-category sums and averages over matched columns.
//!
//! Only numeric cells count. Text cells in a matched column are skipped, not
//! coerced, and nulls contribute nothing to a sum. Every number that leaves
//! this module is rounded to two decimal places and finite. A combined total
//! of zero is reported as null: "no data" and "measured zero" stay distinct.

use std::fmt;

use crate::{
    document::{Document, Value, round2},
    matcher::{ColumnMatches, refine},
    rows::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Energy,
    Emissions,
    Waste,
    WaterUsage,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Energy,
        Category::Emissions,
        Category::Waste,
        Category::WaterUsage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Energy => "energy",
            Category::Emissions => "emissions",
            Category::Waste => "waste",
            Category::WaterUsage => "water_usage",
        }
    }

    /// Name of the combined scalar in the category's document.
    pub fn scalar_field(self) -> &'static str {
        match self {
            Category::Energy => "total_energy_kwh",
            Category::Emissions => "total_emissions_kg",
            Category::Waste => "total_waste_kg",
            Category::WaterUsage => "total_liters",
        }
    }

    fn publishes_breakdown(self) -> bool {
        matches!(self, Category::Energy | Category::Emissions)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryOutcome {
    /// The table had no rows.
    NoData { matched_columns: Vec<String> },
    Measured(CategoryAggregate),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoryAggregate {
    pub matched_columns: Vec<String>,
    pub totals: Vec<(String, f64)>,
    pub averages: Vec<(String, f64)>,
    pub combined: Option<f64>,
    pub hazardous: Option<f64>,
    pub recycled: Option<f64>,
}

impl CategoryOutcome {
    pub fn matched_columns(&self) -> &[String] {
        match self {
            CategoryOutcome::NoData { matched_columns } => matched_columns,
            CategoryOutcome::Measured(aggregate) => &aggregate.matched_columns,
        }
    }

    pub fn combined(&self) -> Option<f64> {
        match self {
            CategoryOutcome::NoData { .. } => None,
            CategoryOutcome::Measured(aggregate) => aggregate.combined,
        }
    }

    /// Fields for the category's sub-document of the environmental template.
    pub fn to_document(&self, category: Category) -> Document {
        let empty = CategoryAggregate::default();
        let aggregate = match self {
            CategoryOutcome::NoData { .. } => &empty,
            CategoryOutcome::Measured(aggregate) => aggregate,
        };
        let mut doc = Document::new();
        doc.insert(
            "matched_columns",
            Value::from(self.matched_columns().to_vec()),
        );
        doc.insert(category.scalar_field(), aggregate.combined);
        if category.publishes_breakdown() {
            doc.insert("total", pairs_to_document(&aggregate.totals));
            doc.insert("average", pairs_to_document(&aggregate.averages));
        }
        if category == Category::Waste {
            doc.insert("hazardous_waste_kg", aggregate.hazardous);
            doc.insert("recycled_waste_kg", aggregate.recycled);
        }
        doc
    }
}

fn pairs_to_document(pairs: &[(String, f64)]) -> Document {
    pairs
        .iter()
        .map(|(column, value)| (column.clone(), Value::float(*value)))
        .collect()
}

/// Running tally for one column.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnTally {
    pub sum: f64,
    pub numeric: usize,
    pub text: usize,
}

impl ColumnTally {
    pub fn of(table: &Table, column: &str) -> Option<Self> {
        let idx = table.column_index(column)?;
        let mut tally = ColumnTally::default();
        for value in table.column_values(idx) {
            tally.add(value);
        }
        Some(tally)
    }

    fn add(&mut self, value: &Value) {
        match value {
            Value::Integer(_) | Value::Float(_) => {
                if let Some(number) = value.as_f64().filter(|n| n.is_finite()) {
                    self.sum += number;
                    self.numeric += 1;
                }
            }
            Value::Null => {}
            _ => self.text += 1,
        }
    }

    /// Columns with at least one number, or with nothing but nulls, take part
    /// in numeric aggregation.
    pub fn is_numeric(&self) -> bool {
        self.numeric > 0 || self.text == 0
    }

    pub fn mean(&self) -> Option<f64> {
        if self.numeric > 0 {
            Some(self.sum / self.numeric as f64)
        } else {
            None
        }
    }
}

pub fn aggregate(table: &Table, matched: &ColumnMatches, category: Category) -> CategoryOutcome {
    let matched_columns = matched.get(category.key()).to_vec();
    if table.is_empty() {
        return CategoryOutcome::NoData { matched_columns };
    }

    let mut aggregate = CategoryAggregate {
        matched_columns: matched_columns.clone(),
        ..CategoryAggregate::default()
    };
    let mut combined = 0.0;
    let mut contributed = false;
    for column in &matched_columns {
        let Some(tally) = ColumnTally::of(table, column) else {
            continue;
        };
        if !tally.is_numeric() {
            continue;
        }
        contributed |= tally.numeric > 0;
        if let Some(total) = round2(tally.sum) {
            combined += total;
            aggregate.totals.push((column.clone(), total));
        }
        if let Some(mean) = tally.mean().and_then(round2) {
            aggregate.averages.push((column.clone(), mean));
        }
    }
    aggregate.combined = if contributed {
        non_zero_total(combined)
    } else {
        None
    };

    if category == Category::Waste {
        aggregate.hazardous = refined_total(table, &matched_columns, "hazardous");
        aggregate.recycled = refined_total(table, &matched_columns, "recycled");
    }
    CategoryOutcome::Measured(aggregate)
}

fn non_zero_total(sum: f64) -> Option<f64> {
    round2(sum).filter(|total| *total != 0.0)
}

fn refined_total(table: &Table, matched: &[String], needle: &str) -> Option<f64> {
    let columns = refine(matched, needle);
    if columns.is_empty() {
        return None;
    }
    let sum: f64 = columns
        .iter()
        .filter_map(|column| ColumnTally::of(table, column))
        .map(|tally| tally.sum)
        .sum();
    non_zero_total(sum)
}

/// `numerator / denominator` rounded, or null when either side is missing or
/// the quotient is not finite.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (numerator, denominator) = (numerator?, denominator?);
    round2(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{KeywordTable, match_columns};

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row).unwrap();
        }
        table
    }

    fn run(table: &Table, category: Category) -> CategoryOutcome {
        let matches = match_columns(table.columns(), &KeywordTable::environmental());
        aggregate(table, &matches, category)
    }

    #[test]
    fn totals_and_averages_skip_nulls() {
        let t = table(
            &["co2_kg"],
            vec![
                vec![Value::Integer(10)],
                vec![Value::Integer(20)],
                vec![Value::Null],
            ],
        );
        let CategoryOutcome::Measured(agg) = run(&t, Category::Emissions) else {
            panic!("expected measured outcome");
        };
        assert_eq!(agg.totals, vec![("co2_kg".to_string(), 30.0)]);
        assert_eq!(agg.averages, vec![("co2_kg".to_string(), 15.0)]);
        assert_eq!(agg.combined, Some(30.0));
    }

    #[test]
    fn all_null_column_yields_null_combined_and_no_average() {
        let t = table(
            &["Electricity_kWh"],
            vec![vec![Value::Null], vec![Value::Null]],
        );
        let CategoryOutcome::Measured(agg) = run(&t, Category::Energy) else {
            panic!("expected measured outcome");
        };
        assert_eq!(agg.combined, None);
        assert!(agg.averages.is_empty());
        assert_eq!(agg.totals, vec![("Electricity_kWh".to_string(), 0.0)]);
    }

    #[test]
    fn combined_total_adds_the_published_column_totals() {
        let t = table(
            &["co2_kg", "ghg_scope1_kg"],
            vec![vec![Value::Float(0.006), Value::Float(0.006)]],
        );
        let CategoryOutcome::Measured(agg) = run(&t, Category::Emissions) else {
            panic!("expected measured outcome");
        };
        assert_eq!(
            agg.totals,
            vec![
                ("co2_kg".to_string(), 0.01),
                ("ghg_scope1_kg".to_string(), 0.01)
            ]
        );
        assert_eq!(agg.combined, Some(0.02));
    }

    #[test]
    fn zero_sum_is_reported_as_null() {
        let t = table(&["fuel_kwh"], vec![vec![Value::Integer(0)]]);
        assert_eq!(run(&t, Category::Energy).combined(), None);
    }

    #[test]
    fn text_cells_are_excluded_not_coerced() {
        let t = table(
            &["co2_kg", "carbon_notes"],
            vec![
                vec![Value::Float(1.5), Value::text("estimated")],
                vec![Value::text("12"), Value::text("metered")],
                vec![Value::Float(2.25), Value::Null],
            ],
        );
        let CategoryOutcome::Measured(agg) = run(&t, Category::Emissions) else {
            panic!("expected measured outcome");
        };
        assert_eq!(agg.matched_columns, vec!["co2_kg", "carbon_notes"]);
        assert_eq!(agg.totals, vec![("co2_kg".to_string(), 3.75)]);
        assert_eq!(agg.averages, vec![("co2_kg".to_string(), 1.88)]);
        assert_eq!(agg.combined, Some(3.75));
    }

    #[test]
    fn waste_computes_hazardous_and_recycled_separately() {
        let t = table(
            &["Hazardous_Waste_kg", "Recycled_Waste_kg", "Landfill_kg"],
            vec![
                vec![Value::Float(1.111), Value::Integer(4), Value::Integer(10)],
                vec![Value::Float(2.222), Value::Null, Value::Integer(5)],
            ],
        );
        let outcome = run(&t, Category::Waste);
        let doc = outcome.to_document(Category::Waste);
        assert_eq!(doc.number_at(&["hazardous_waste_kg"]), Some(3.33));
        assert_eq!(doc.number_at(&["recycled_waste_kg"]), Some(4.0));
        assert_eq!(doc.number_at(&["total_waste_kg"]), Some(22.33));
        assert!(!doc.contains_key("total"));
    }

    #[test]
    fn water_publishes_only_the_combined_total() {
        let t = table(
            &["RainwaterTank_Litres", "Mains_Water_Litres"],
            vec![vec![Value::Integer(100), Value::Float(50.5)]],
        );
        let doc = run(&t, Category::WaterUsage).to_document(Category::WaterUsage);
        assert_eq!(doc.number_at(&["total_liters"]), Some(150.5));
        assert!(!doc.contains_key("total"));
        assert!(!doc.contains_key("average"));
    }

    #[test]
    fn empty_table_is_no_data() {
        let t = table(&["co2_kg"], vec![]);
        let outcome = run(&t, Category::Emissions);
        assert_eq!(
            outcome,
            CategoryOutcome::NoData {
                matched_columns: vec!["co2_kg".to_string()]
            }
        );
        let doc = outcome.to_document(Category::Emissions);
        assert_eq!(doc.get("total_emissions_kg"), Some(&Value::Null));
    }

    #[test]
    fn ratio_guards_division_by_zero() {
        assert_eq!(ratio(Some(10.0), Some(4.0)), Some(2.5));
        assert_eq!(ratio(Some(10.0), Some(0.0)), None);
        assert_eq!(ratio(None, Some(1.0)), None);
    }
}
