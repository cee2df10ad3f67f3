//! Recursive merge of an incoming analysis into cumulative state.
//!
//! The merge walks the incoming document depth-first:
//!
//! - incoming nulls are skipped and never erase existing data;
//! - numbers accumulate: `existing + incoming`, or `incoming` when nothing is
//!   there yet;
//! - nested documents merge recursively;
//! - text, booleans and lists fill vacant slots only. An existing non-null
//!   value stays put.
//!
//! Fields present only in the existing document are kept. The merge is not
//! commutative: on non-numeric fields the existing side wins.
//!
//! When the two sides disagree on the kind of a field (a number on one side,
//! a document on the other, say) the existing value is kept and the conflict
//! is logged and recorded in the [`MergeReport`].

use log::warn;

use crate::document::{Document, Value, round2};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConflict {
    /// Dotted path of the field.
    pub path: String,
    pub existing: &'static str,
    pub incoming: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub conflicts: Vec<TypeConflict>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

pub fn merge(existing: &Document, incoming: &Document) -> Document {
    merge_with_report(existing, incoming).0
}

pub fn merge_with_report(existing: &Document, incoming: &Document) -> (Document, MergeReport) {
    let mut merged = existing.clone();
    let mut report = MergeReport::default();
    merge_into(&mut merged, incoming, "", &mut report);
    (merged, report)
}

fn merge_into(merged: &mut Document, incoming: &Document, prefix: &str, report: &mut MergeReport) {
    for (key, value) in incoming.iter() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let existing = merged.get(key).cloned().unwrap_or(Value::Null);
        if let Some(next) = merge_value(existing, value, &path, report) {
            merged.insert(key.clone(), next);
        }
    }
}

/// The new value for a field, or `None` to leave the slot as it was.
fn merge_value(
    existing: Value,
    incoming: &Value,
    path: &str,
    report: &mut MergeReport,
) -> Option<Value> {
    match (existing, incoming) {
        (_, Value::Null) => None,

        (Value::Null, Value::Document(sub)) => {
            let mut nested = Document::new();
            merge_into(&mut nested, sub, path, report);
            (!nested.is_empty()).then_some(Value::Document(nested))
        }
        (Value::Document(mut current), Value::Document(sub)) => {
            merge_into(&mut current, sub, path, report);
            Some(Value::Document(current))
        }

        (Value::Null, number @ (Value::Integer(_) | Value::Float(_))) => Some(number.clone()),
        (current @ (Value::Integer(_) | Value::Float(_)), Value::Integer(_) | Value::Float(_)) => {
            Some(add_numbers(&current, incoming, path))
        }

        (Value::Null, other) => Some(other.clone()),
        (Value::List(items), Value::List(incoming_items)) if items.is_empty() => {
            Some(Value::List(incoming_items.clone()))
        }

        (current, other) => {
            if current.kind() != other.kind() {
                warn!(
                    "Type conflict at '{path}': keeping existing {} over incoming {}",
                    current.kind(),
                    other.kind()
                );
                report.conflicts.push(TypeConflict {
                    path: path.to_string(),
                    existing: current.kind(),
                    incoming: other.kind(),
                });
            }
            None
        }
    }
}

fn add_numbers(existing: &Value, incoming: &Value, path: &str) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (existing, incoming)
        && let Some(sum) = a.checked_add(*b)
    {
        return Value::Integer(sum);
    }
    let (Some(a), Some(b)) = (existing.as_f64(), incoming.as_f64()) else {
        return existing.clone();
    };
    match round2(a + b) {
        Some(sum) => Value::Float(sum),
        None => {
            warn!("Sum at '{path}' is not finite; keeping existing value");
            existing.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn numbers_accumulate_and_fill_nulls() {
        let existing = doc! { "a" => 10.5, "b" => Value::Null, "n" => 2_i64 };
        let incoming = doc! { "a" => 4.25, "b" => 3.0, "n" => 5_i64 };
        let merged = merge(&existing, &incoming);
        assert_eq!(merged.get("a"), Some(&Value::Float(14.75)));
        assert_eq!(merged.get("b"), Some(&Value::Float(3.0)));
        assert_eq!(merged.get("n"), Some(&Value::Integer(7)));
    }

    #[test]
    fn mixed_integer_and_float_sum_is_float() {
        let merged = merge(&doc! { "x" => 1_i64 }, &doc! { "x" => 0.5 });
        assert_eq!(merged.get("x"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        let merged = merge(&doc! { "x" => i64::MAX }, &doc! { "x" => 1_i64 });
        assert!(matches!(merged.get("x"), Some(Value::Float(_))));
    }

    #[test]
    fn incoming_nulls_never_erase() {
        let existing = doc! { "site" => "North", "total" => 8.0 };
        let incoming = doc! { "site" => Value::Null, "total" => Value::Null };
        assert_eq!(merge(&existing, &incoming), existing);
    }

    #[test]
    fn existing_text_wins() {
        let merged = merge(
            &doc! { "standard" => "GHG Protocol" },
            &doc! { "standard" => "ISO 14064", "body" => "BSI" },
        );
        assert_eq!(merged.get("standard"), Some(&Value::text("GHG Protocol")));
        assert_eq!(merged.get("body"), Some(&Value::text("BSI")));
    }

    #[test]
    fn empty_lists_are_filled_and_populated_lists_kept() {
        let existing = doc! {
            "a" => Value::List(vec![]),
            "b" => vec!["x".to_string()],
        };
        let incoming = doc! {
            "a" => vec!["new".to_string()],
            "b" => vec!["y".to_string()],
        };
        let merged = merge(&existing, &incoming);
        assert_eq!(merged.get("a"), Some(&Value::from(vec!["new".to_string()])));
        assert_eq!(merged.get("b"), Some(&Value::from(vec!["x".to_string()])));
    }

    #[test]
    fn nested_documents_merge_recursively() {
        let existing = doc! {
            "scopes" => doc! { "scope_1" => doc! { "total" => 5_i64 } },
        };
        let incoming = doc! {
            "scopes" => doc! {
                "scope_1" => doc! { "total" => 3_i64 },
                "scope_2" => doc! { "total" => 7_i64 },
            },
        };
        let expected = doc! {
            "scopes" => doc! {
                "scope_1" => doc! { "total" => 8_i64 },
                "scope_2" => doc! { "total" => 7_i64 },
            },
        };
        assert_eq!(merge(&existing, &incoming), expected);
    }

    #[test]
    fn all_null_subdocuments_do_not_create_fields() {
        let existing = doc! { "keep" => 1_i64 };
        let incoming = doc! { "new" => doc! { "inner" => Value::Null } };
        assert_eq!(merge(&existing, &incoming), existing);
    }

    #[test]
    fn type_conflicts_keep_existing_and_are_reported() {
        let existing = doc! { "total" => 4.0, "meta" => doc! { "a" => 1_i64 } };
        let incoming = doc! { "total" => doc! { "x" => 1.0 }, "meta" => "flat" };
        let (merged, report) = merge_with_report(&existing, &incoming);
        assert_eq!(merged, existing);
        assert_eq!(
            report.conflicts,
            vec![
                TypeConflict {
                    path: "meta".into(),
                    existing: "document",
                    incoming: "text",
                },
                TypeConflict {
                    path: "total".into(),
                    existing: "number",
                    incoming: "document",
                },
            ]
        );
    }

    #[test]
    fn merge_is_not_commutative_for_text() {
        let a = doc! { "name" => "A" };
        let b = doc! { "name" => "B" };
        assert_ne!(merge(&a, &b), merge(&b, &a));
    }

    #[test]
    fn float_sums_are_rounded() {
        let merged = merge(&doc! { "x" => 0.1 }, &doc! { "x" => 0.2 });
        assert_eq!(merged.get("x"), Some(&Value::Float(0.3)));
    }
}
