//! Environmental analysis: keyword matching and aggregation over energy,
//! emissions, waste and water columns, assembled into the environmental
//! template.

use log::debug;

use crate::{
    aggregate::{Category, aggregate, ratio},
    document::{Document, Value},
    matcher::{KeywordTable, match_columns},
    rows::Table,
    template::ENVIRONMENTAL,
};

pub fn analyze(table: &Table, keywords: &KeywordTable) -> Document {
    let matches = match_columns(table.columns(), keywords);
    let mut insights = ENVIRONMENTAL.skeleton();
    insights.insert("category", ENVIRONMENTAL.name);
    insights.insert("file_count", 1_i64);
    insights.insert("record_count", table.row_count() as i64);

    let mut outcomes = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        let outcome = aggregate(table, &matches, category);
        debug!(
            "Category '{category}' matched {} column(s), combined total {:?}",
            outcome.matched_columns().len(),
            outcome.combined()
        );
        for (field, value) in outcome.to_document(category) {
            insights.set_at(&["partial_analysis", category.key(), field.as_str()], value);
        }
        outcomes.push((category, outcome));
    }

    let combined = |wanted: Category| {
        outcomes
            .iter()
            .find(|(category, _)| *category == wanted)
            .and_then(|(_, outcome)| outcome.combined())
    };
    insights.set_at(
        &["partial_analysis", "derived_metrics", "emissions_per_kwh"],
        Value::from(ratio(
            combined(Category::Emissions),
            combined(Category::Energy),
        )),
    );
    insights
}
