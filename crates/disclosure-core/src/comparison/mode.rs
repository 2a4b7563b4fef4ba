//! Mode selection (§4.10): a deterministic function of the input
//! documents' snapshots, never an LLM call.

use crate::model::{ComparisonMode, DocumentInfo};

/// Selects the comparison mode for a set of document snapshots.
///
/// More than two inputs always yields `multi_document`. For exactly two,
/// the mode follows company/type/year agreement; `diff_analysis_company`
/// is the fallback when none of the named conditions match.
pub fn select_mode(documents: &[DocumentInfo]) -> ComparisonMode {
    if documents.len() > 2 {
        return ComparisonMode::MultiDocument;
    }
    let (Some(a), Some(b)) = (documents.first(), documents.get(1)) else {
        return ComparisonMode::DiffAnalysisCompany;
    };

    let same_company = companies_match(a, b);
    let same_type = a.document_type == b.document_type;
    let same_year = fiscal_years_match(a, b);

    if same_company && !same_type {
        ComparisonMode::ConsistencyCheck
    } else if same_company && same_type && !same_year {
        ComparisonMode::DiffAnalysisYear
    } else if !same_company && same_type {
        ComparisonMode::DiffAnalysisCompany
    } else {
        ComparisonMode::DiffAnalysisCompany
    }
}

fn companies_match(a: &DocumentInfo, b: &DocumentInfo) -> bool {
    match (&a.company_name, &b.company_name) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

fn fiscal_years_match(a: &DocumentInfo, b: &DocumentInfo) -> bool {
    match (&a.fiscal_year, &b.fiscal_year) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentType;

    fn doc(company: &str, ty: DocumentType, year: &str) -> DocumentInfo {
        DocumentInfo {
            document_id: "d".into(),
            filename: "f.pdf".into(),
            document_type: ty,
            company_name: Some(company.to_string()),
            fiscal_year: Some(year.to_string()),
            extraction_confidence: 1.0,
        }
    }

    #[test]
    fn same_company_different_type_is_consistency_check() {
        let docs = vec![
            doc("Acme", DocumentType::SecuritiesReport, "2024"),
            doc("Acme", DocumentType::EarningsReport, "2024"),
        ];
        assert_eq!(select_mode(&docs), ComparisonMode::ConsistencyCheck);
    }

    #[test]
    fn same_company_same_type_different_year_is_diff_analysis_year() {
        let docs = vec![
            doc("Acme", DocumentType::SecuritiesReport, "2023"),
            doc("Acme", DocumentType::SecuritiesReport, "2024"),
        ];
        assert_eq!(select_mode(&docs), ComparisonMode::DiffAnalysisYear);
    }

    #[test]
    fn different_company_same_type_is_diff_analysis_company() {
        let docs = vec![
            doc("Acme", DocumentType::SecuritiesReport, "2024"),
            doc("Globex", DocumentType::SecuritiesReport, "2024"),
        ];
        assert_eq!(select_mode(&docs), ComparisonMode::DiffAnalysisCompany);
    }

    #[test]
    fn more_than_two_documents_is_multi_document() {
        let docs = vec![
            doc("Acme", DocumentType::SecuritiesReport, "2024"),
            doc("Globex", DocumentType::SecuritiesReport, "2024"),
            doc("Initech", DocumentType::SecuritiesReport, "2024"),
        ];
        assert_eq!(select_mode(&docs), ComparisonMode::MultiDocument);
    }

    #[test]
    fn unknown_companies_fall_back_to_diff_analysis_company() {
        let docs = vec![
            DocumentInfo {
                document_id: "a".into(),
                filename: "a.pdf".into(),
                document_type: DocumentType::SecuritiesReport,
                company_name: None,
                fiscal_year: None,
                extraction_confidence: 0.0,
            },
            DocumentInfo {
                document_id: "b".into(),
                filename: "b.pdf".into(),
                document_type: DocumentType::SecuritiesReport,
                company_name: None,
                fiscal_year: None,
                extraction_confidence: 0.0,
            },
        ];
        assert_eq!(select_mode(&docs), ComparisonMode::DiffAnalysisCompany);
    }
}
