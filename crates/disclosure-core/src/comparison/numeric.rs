//! Numerical diffing (§4.10): matches financial-fact items by canonical
//! name across mapped sections, normalizes units via a small factor
//! table, and computes the difference and significance flag.

use crate::model::{FinancialFact, NumericalDifference, SectionMapping, ValueOrMap};
use std::collections::HashMap;

pub const SIGNIFICANCE_PCT_THRESHOLD: f64 = 0.05;

/// Yen-denominated unit factors relative to one base yen, used to
/// normalize both sides onto a common unit before diffing.
fn unit_factor(unit: &str) -> Option<f64> {
    match unit.trim() {
        "百万円" => Some(1_000_000.0),
        "億円" => Some(100_000_000.0),
        "千円" => Some(1_000.0),
        "円" => Some(1.0),
        _ => None,
    }
}

fn canonicalize_item_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn scalar_value(value: &ValueOrMap) -> Option<f64> {
    match value {
        ValueOrMap::Scalar(s) => parse_numeric(s),
        ValueOrMap::Map(_) => None,
    }
}

fn parse_numeric(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '¥' | '%')).collect();
    cleaned.trim().parse::<f64>().ok()
}

/// Normalizes `value` expressed in `unit` (if the unit is recognized)
/// into the same basis as `other_unit`, returning the normalized value
/// and the unit it ended up in.
fn normalize_pair(
    value1: f64,
    unit1: Option<&str>,
    value2: f64,
    unit2: Option<&str>,
) -> (f64, f64, Option<String>) {
    let factor1 = unit1.and_then(unit_factor);
    let factor2 = unit2.and_then(unit_factor);
    match (factor1, factor2) {
        (Some(f1), Some(f2)) if (f1 - f2).abs() > f64::EPSILON => {
            // Normalize both onto the smaller unit's basis so the
            // resulting magnitudes stay in a human-legible range.
            if f1 < f2 {
                (value1, value2 * (f2 / f1), unit1.map(str::to_string))
            } else {
                (value1 * (f1 / f2), value2, unit2.map(str::to_string))
            }
        }
        _ => (value1, value2, unit1.or(unit2).map(str::to_string)),
    }
}

/// Finds matching financial-fact items between the two sides of each
/// mapped section and computes a `NumericalDifference` per match.
pub fn diff_financial_facts(
    mappings: &[SectionMapping],
    side_a_facts: &HashMap<String, Vec<FinancialFact>>,
    side_b_facts: &HashMap<String, Vec<FinancialFact>>,
) -> Vec<NumericalDifference> {
    let mut out = Vec::new();

    for mapping in mappings {
        let Some(facts_a) = side_a_facts.get(&mapping.doc1_section) else {
            continue;
        };
        let Some(facts_b) = side_b_facts.get(&mapping.doc2_section) else {
            continue;
        };

        let index_b: HashMap<String, &FinancialFact> = facts_b
            .iter()
            .map(|f| (canonicalize_item_name(&f.item), f))
            .collect();

        for fact_a in facts_a {
            let key = canonicalize_item_name(&fact_a.item);
            let Some(fact_b) = index_b.get(&key) else {
                continue;
            };
            let (Some(v1), Some(v2)) = (scalar_value(&fact_a.value), scalar_value(&fact_b.value))
            else {
                continue;
            };
            if !v1.is_finite() || !v2.is_finite() {
                continue;
            }

            let (norm_v1, norm_v2, normalized_unit) =
                normalize_pair(v1, fact_a.unit.as_deref(), v2, fact_b.unit.as_deref());

            let difference = norm_v2 - norm_v1;
            let difference_pct = if norm_v1 != 0.0 {
                Some(difference / norm_v1.abs())
            } else {
                None
            };

            let order_of_magnitude_diff = norm_v1 != 0.0
                && norm_v2 != 0.0
                && (norm_v1.abs().log10() - norm_v2.abs().log10()).abs() >= 1.0;
            let is_significant = difference_pct
                .map(|pct| pct.abs() >= SIGNIFICANCE_PCT_THRESHOLD)
                .unwrap_or(false)
                || order_of_magnitude_diff;

            out.push(NumericalDifference {
                section: mapping.doc1_section.clone(),
                item_name: fact_a.item.clone(),
                value1: norm_v1,
                value2: norm_v2,
                difference,
                difference_pct,
                unit1: fact_a.unit.clone(),
                unit2: fact_b.unit.clone(),
                normalized_unit,
                is_significant,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MappingMethod;

    fn fact(item: &str, value: &str, unit: Option<&str>) -> FinancialFact {
        FinancialFact {
            item: item.to_string(),
            value: ValueOrMap::Scalar(value.to_string()),
            unit: unit.map(str::to_string),
            period: None,
            context: None,
        }
    }

    #[test]
    fn matches_items_by_canonicalized_name() {
        assert_eq!(canonicalize_item_name("Net Sales!"), "net sales");
        assert_eq!(canonicalize_item_name("net-sales"), "net sales");
    }

    #[test]
    fn normalizes_million_yen_against_hundred_million_yen() {
        let (v1, v2, unit) = normalize_pair(500.0, Some("百万円"), 6.0, Some("億円"));
        assert_eq!(unit, Some("百万円".to_string()));
        assert!((v2 - 600.0).abs() < 1e-6);
        assert!((v1 - 500.0).abs() < 1e-6);
    }

    #[test]
    fn computes_difference_and_significance() {
        let mappings = vec![SectionMapping {
            doc1_section: "overview".into(),
            doc2_section: "overview".into(),
            confidence_score: 1.0,
            mapping_method: MappingMethod::Exact,
        }];
        let mut a = HashMap::new();
        a.insert("overview".to_string(), vec![fact("net sales", "1000", Some("百万円"))]);
        let mut b = HashMap::new();
        b.insert("overview".to_string(), vec![fact("Net Sales", "1100", Some("百万円"))]);

        let diffs = diff_financial_facts(&mappings, &a, &b);
        assert_eq!(diffs.len(), 1);
        assert!((diffs[0].difference - 100.0).abs() < 1e-6);
        assert!(diffs[0].is_significant);
    }

    #[test]
    fn unmatched_items_produce_no_diff() {
        let mappings = vec![SectionMapping {
            doc1_section: "overview".into(),
            doc2_section: "overview".into(),
            confidence_score: 1.0,
            mapping_method: MappingMethod::Exact,
        }];
        let mut a = HashMap::new();
        a.insert("overview".to_string(), vec![fact("net sales", "1000", None)]);
        let mut b = HashMap::new();
        b.insert("overview".to_string(), vec![fact("operating profit", "200", None)]);

        let diffs = diff_financial_facts(&mappings, &a, &b);
        assert!(diffs.is_empty());
    }
}
