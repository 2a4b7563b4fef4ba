//! Property-based tests for numerical fact diffing (§4.10): identical
//! values under any recognized unit must never be flagged significant,
//! and a large order-of-magnitude gap must always be flagged.

use disclosure_core::model::{FinancialFact, MappingMethod, SectionMapping, ValueOrMap};
use proptest::prelude::*;
use std::collections::HashMap;

fn section_mapping() -> SectionMapping {
    SectionMapping {
        doc1_section: "balance_sheet".into(),
        doc2_section: "balance_sheet".into(),
        confidence_score: 1.0,
        mapping_method: MappingMethod::Exact,
    }
}

fn fact(item: &str, value: f64, unit: &str) -> FinancialFact {
    FinancialFact {
        item: item.into(),
        value: ValueOrMap::Scalar(format!("{value}")),
        unit: Some(unit.into()),
        period: None,
        context: None,
    }
}

fn facts_map(section: &str, facts: Vec<FinancialFact>) -> HashMap<String, Vec<FinancialFact>> {
    let mut m = HashMap::new();
    m.insert(section.to_string(), facts);
    m
}

proptest! {
    #[test]
    fn identical_values_same_unit_are_never_significant(v in 1.0f64..1_000_000.0, unit_idx in 0..4usize) {
        let units = ["百万円", "億円", "千円", "円"];
        let unit = units[unit_idx];
        let mapping = section_mapping();
        let a = facts_map("balance_sheet", vec![fact("net sales", v, unit)]);
        let b = facts_map("balance_sheet", vec![fact("Net Sales", v, unit)]);

        let diffs = disclosure_core::comparison::numeric::diff_financial_facts(&[mapping], &a, &b);
        prop_assert_eq!(diffs.len(), 1);
        prop_assert!(!diffs[0].is_significant);
    }

    #[test]
    fn order_of_magnitude_gap_is_always_significant(v in 1.0f64..1_000.0) {
        let mapping = section_mapping();
        let a = facts_map("balance_sheet", vec![fact("net sales", v, "百万円")]);
        let b = facts_map("balance_sheet", vec![fact("net sales", v * 50.0, "百万円")]);

        let diffs = disclosure_core::comparison::numeric::diff_financial_facts(&[mapping], &a, &b);
        prop_assert_eq!(diffs.len(), 1);
        prop_assert!(diffs[0].is_significant);
    }
}
