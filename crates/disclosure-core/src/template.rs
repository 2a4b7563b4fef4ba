//! Template Registry (§4.1): loads per-document-type schemas once at
//! startup from a directory of template files and serves them read-only
//! thereafter. Mirrors the teacher's immutable-registry design note
//! (§9): loaded once, no cyclic dependency on the stores that use it.

use crate::error::{CoreError, Result};
use crate::model::DocumentTemplate;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, DocumentTemplate>,
}

impl TemplateRegistry {
    /// Load every `*.json` template file in `dir`. Each file's
    /// `document_type` key determines its registry slot; a duplicate key
    /// overwrites the earlier one (last file wins, sorted by filename).
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut templates = HashMap::new();
        if !dir.exists() {
            return Ok(Self { templates });
        }
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        for path in entries {
            let contents = std::fs::read_to_string(&path)?;
            let template: DocumentTemplate = serde_json::from_str(&contents).map_err(|e| {
                CoreError::Config(format!("invalid template file {}: {e}", path.display()))
            })?;
            templates.insert(template.document_type.clone(), template);
        }
        Ok(Self { templates })
    }

    pub fn from_templates(templates: Vec<DocumentTemplate>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|t| (t.document_type.clone(), t))
                .collect(),
        }
    }

    /// Unknown types return a degenerate template with no expected
    /// sections, never an error.
    pub fn load(&self, doc_type: &str) -> DocumentTemplate {
        self.templates
            .get(doc_type)
            .cloned()
            .unwrap_or_else(|| DocumentTemplate::empty(doc_type))
    }

    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.templates.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplateSection;

    fn sample_template(doc_type: &str) -> DocumentTemplate {
        DocumentTemplate {
            document_type: doc_type.to_string(),
            display_name: doc_type.to_string(),
            description: String::new(),
            sections: vec![TemplateSection {
                id: "risk".into(),
                name: "事業等のリスク".into(),
                required: true,
                alternative_names: vec!["リスク要因".into()],
                subsections: vec![],
            }],
            important_sections: vec!["risk".into()],
            keywords_for_detection: vec!["有価証券報告書".into()],
        }
    }

    #[test]
    fn unknown_type_returns_empty_template() {
        let registry = TemplateRegistry::default();
        let template = registry.load("securities_report");
        assert!(template.sections.is_empty());
        assert_eq!(template.document_type, "securities_report");
    }

    #[test]
    fn known_type_round_trips() {
        let registry =
            TemplateRegistry::from_templates(vec![sample_template("securities_report")]);
        let template = registry.load("securities_report");
        assert_eq!(template.sections.len(), 1);
        assert_eq!(registry.list_types(), vec!["securities_report"]);
    }

    #[test]
    fn load_from_dir_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let template = sample_template("earnings_report");
        std::fs::write(
            dir.path().join("earnings_report.json"),
            serde_json::to_string(&template).unwrap(),
        )
        .unwrap();

        let registry = TemplateRegistry::load_from_dir(dir.path()).unwrap();
        assert_eq!(registry.list_types(), vec!["earnings_report"]);
    }

    #[test]
    fn load_from_missing_dir_is_empty_not_error() {
        let registry = TemplateRegistry::load_from_dir(Path::new("/no/such/dir")).unwrap();
        assert!(registry.list_types().is_empty());
    }
}
