//! Keyword-containment column matching.
//!
//! A [`KeywordTable`] maps a category to keyword substrings. A column belongs
//! to a category when its lowercased (and optionally normalized) name contains
//! any of the category's keywords. Matching is deliberately loose: `water`
//! matches `rainwater_capture`.

use std::collections::BTreeMap;

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const ENVIRONMENTAL_KEYWORDS: &[(&str, &[&str])] = &[
    ("energy", &["energy", "electricity", "fuel", "kwh"]),
    ("emissions", &["emission", "co2", "carbon", "ghg", "ch4", "n2o"]),
    (
        "waste",
        &["waste", "landfill", "recycled", "incinerated", "hazardous"],
    ),
    ("water_usage", &["water", "h2o", "water use", "water consumption"]),
];

pub const FINANCIAL_KEYWORDS: &[(&str, &[&str])] = &[
    ("revenue", &["revenue", "sales", "income", "turnover"]),
    ("cost", &["cost", "expense", "spend", "expenditure"]),
    ("profit", &["profit", "netincome", "gain"]),
    ("loss", &["loss", "deficit", "negativeincome"]),
    ("tax", &["tax"]),
    ("debt", &["debt", "liability", "loan"]),
    ("cash", &["cash", "cashflow"]),
    ("asset", &["asset"]),
    ("equity", &["equity", "networth"]),
];

/// How column names are prepared before keyword tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameNormalization {
    /// Lowercase only.
    #[default]
    Lowercase,
    /// Drop everything but ASCII letters, then lowercase (`Net Income ($)` → `netincome`).
    LettersOnly,
}

impl NameNormalization {
    pub fn apply(self, name: &str) -> String {
        match self {
            NameNormalization::Lowercase => name.to_lowercase(),
            NameNormalization::LettersOnly => letters_only(name),
        }
    }
}

fn letters_only(name: &str) -> String {
    thread_local! {
        static NON_LETTERS: Regex = Regex::new(r"[^a-zA-Z]").expect("valid pattern");
    }
    NON_LETTERS.with(|re| re.replace_all(name, "").to_lowercase())
}

/// Immutable category → keyword table. Keywords are stored lowercased and
/// categories keep their declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    categories: Vec<(String, Vec<String>)>,
    normalization: NameNormalization,
}

impl KeywordTable {
    pub fn new<C, K, S>(entries: C, normalization: NameNormalization) -> Self
    where
        C: IntoIterator<Item = (S, K)>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let categories = entries
            .into_iter()
            .map(|(category, keywords)| {
                (
                    category.as_ref().to_string(),
                    keywords
                        .into_iter()
                        .map(|kw| kw.as_ref().to_lowercase())
                        .filter(|kw| !kw.is_empty())
                        .unique()
                        .collect(),
                )
            })
            .collect();
        Self {
            categories,
            normalization,
        }
    }

    pub fn environmental() -> Self {
        Self::from_static(ENVIRONMENTAL_KEYWORDS, NameNormalization::Lowercase)
    }

    pub fn financial() -> Self {
        Self::from_static(FINANCIAL_KEYWORDS, NameNormalization::LettersOnly)
    }

    fn from_static(entries: &[(&str, &[&str])], normalization: NameNormalization) -> Self {
        Self::new(
            entries
                .iter()
                .map(|(category, keywords)| (*category, keywords.iter().copied())),
            normalization,
        )
    }

    /// Replaces the keyword lists of the named categories; unknown names add
    /// new categories at the end.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        let mut categories = self.categories.clone();
        for (category, keywords) in overrides {
            let lowered = keywords
                .iter()
                .map(|kw| kw.to_lowercase())
                .filter(|kw| !kw.is_empty())
                .unique()
                .collect::<Vec<_>>();
            match categories.iter_mut().find(|(name, _)| name == category) {
                Some((_, existing)) => *existing = lowered,
                None => categories.push((category.clone(), lowered)),
            }
        }
        Self {
            categories,
            normalization: self.normalization,
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    pub fn keywords(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, keywords)| keywords.as_slice())
    }

    pub fn normalization(&self) -> NameNormalization {
        self.normalization
    }
}

/// Matched columns per category. Every category of the table is present,
/// possibly with an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMatches {
    by_category: BTreeMap<String, Vec<String>>,
}

impl ColumnMatches {
    pub fn get(&self, category: &str) -> &[String] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.by_category.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.values().all(Vec::is_empty)
    }
}

pub fn match_columns(columns: &[String], table: &KeywordTable) -> ColumnMatches {
    let normalized = columns
        .iter()
        .map(|column| table.normalization.apply(column))
        .collect::<Vec<_>>();
    let by_category = table
        .categories
        .iter()
        .map(|(category, keywords)| {
            let matched = columns
                .iter()
                .zip(&normalized)
                .filter(|(_, name)| keywords.iter().any(|kw| name.contains(kw.as_str())))
                .map(|(original, _)| original.clone())
                .collect();
            (category.clone(), matched)
        })
        .collect();
    ColumnMatches { by_category }
}

/// Columns from `matched` whose lowercase name contains `needle`.
pub fn refine(matched: &[String], needle: &str) -> Vec<String> {
    let needle = needle.to_lowercase();
    matched
        .iter()
        .filter(|column| column.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn substring_matching_is_loose() {
        let table = KeywordTable::environmental();
        let matches = match_columns(&cols(&["RainwaterTank_Litres"]), &table);
        assert_eq!(matches.get("water_usage"), ["RainwaterTank_Litres"]);
    }

    #[test]
    fn columns_can_match_several_categories_in_original_order() {
        let table = KeywordTable::environmental();
        let columns = cols(&[
            "Site",
            "Fuel_CO2_kg",
            "Electricity_kWh",
            "Recycled_Waste_kg",
            "Hazardous_Waste_kg",
        ]);
        let matches = match_columns(&columns, &table);
        assert_eq!(matches.get("energy"), ["Fuel_CO2_kg", "Electricity_kWh"]);
        assert_eq!(matches.get("emissions"), ["Fuel_CO2_kg"]);
        assert_eq!(
            matches.get("waste"),
            ["Recycled_Waste_kg", "Hazardous_Waste_kg"]
        );
        assert!(matches.get("water_usage").is_empty());
    }

    #[test]
    fn unmatched_categories_are_present_and_empty() {
        let table = KeywordTable::environmental();
        let matches = match_columns(&cols(&["Site"]), &table);
        assert_eq!(matches.iter().count(), 4);
        assert!(matches.is_empty());
        assert!(matches.get("unknown").is_empty());
    }

    #[test]
    fn letters_only_normalization_joins_words() {
        let table = KeywordTable::financial();
        let matches = match_columns(&cols(&["Net Income ($)", "Loan-Balance"]), &table);
        assert_eq!(matches.get("profit"), ["Net Income ($)"]);
        assert_eq!(matches.get("revenue"), ["Net Income ($)"]);
        assert_eq!(matches.get("debt"), ["Loan-Balance"]);
    }

    #[test]
    fn overrides_replace_and_extend_categories() {
        let mut overrides = BTreeMap::new();
        overrides.insert("energy".to_string(), vec!["MWh".to_string()]);
        overrides.insert("biodiversity".to_string(), vec!["habitat".to_string()]);
        let table = KeywordTable::environmental().with_overrides(&overrides);
        assert_eq!(table.keywords("energy").unwrap(), ["mwh"]);
        assert_eq!(table.categories().last(), Some("biodiversity"));
    }

    #[test]
    fn refine_filters_by_lowercase_substring() {
        let matched = cols(&["Hazardous_Waste_kg", "General_Waste_kg"]);
        assert_eq!(refine(&matched, "hazardous"), ["Hazardous_Waste_kg"]);
    }
}
