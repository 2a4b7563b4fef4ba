//! Integration test exercising the full store-plus-sweeper path across
//! process-like boundaries: create documents and a comparison through
//! the public store APIs, run one sweep, reload from disk.

use chrono::Utc;
use disclosure_core::model::{Comparison, ComparisonMode, Document, DocumentInfo, DocumentType};
use disclosure_daemon::{ComparisonStore, MetadataStore, RetentionSweeper};

#[tokio::test]
async fn expired_document_and_its_comparison_are_swept_on_disk() {
    let meta_dir = tempfile::tempdir().unwrap();
    let cmp_dir = tempfile::tempdir().unwrap();
    let pdfs_dir = tempfile::tempdir().unwrap();

    std::fs::write(pdfs_dir.path().join("doc-1.pdf"), b"%PDF-1.4 stub").unwrap();

    let metadata = MetadataStore::new(meta_dir.path()).unwrap();
    let mut expired = Document::new("doc-1".into(), "doc-1.pdf".into(), 8, 1);
    expired.retention_deadline = Utc::now() - chrono::Duration::hours(1);
    metadata.create(expired).await.unwrap();

    let comparisons = ComparisonStore::new(cmp_dir.path()).unwrap();
    comparisons
        .save(&Comparison::new(
            "cmp-1".into(),
            ComparisonMode::DiffAnalysisYear,
            vec![DocumentInfo {
                document_id: "doc-1".into(),
                filename: "doc-1.pdf".into(),
                document_type: DocumentType::SecuritiesReport,
                company_name: Some("Acme".into()),
                fiscal_year: Some("2024".into()),
                extraction_confidence: 0.9,
            }],
        ))
        .await
        .unwrap();

    let sweeper = RetentionSweeper::new(metadata, comparisons, pdfs_dir.path());
    let report = sweeper.sweep().await.unwrap();

    assert_eq!(report.documents_deleted, 1);
    assert_eq!(report.comparisons_deleted, 1);
    assert!(!pdfs_dir.path().join("doc-1.pdf").exists());
    assert!(!meta_dir.path().join("doc-1.json").exists());
    assert!(!cmp_dir.path().join("cmp-1.json").exists());
}

#[tokio::test]
async fn reopening_stores_after_restart_still_sees_persisted_records() {
    let meta_dir = tempfile::tempdir().unwrap();

    {
        let metadata = MetadataStore::new(meta_dir.path()).unwrap();
        metadata
            .create(Document::new("doc-2".into(), "doc-2.pdf".into(), 8, 999_999))
            .await
            .unwrap();
    }

    let reopened = MetadataStore::new(meta_dir.path()).unwrap();
    let loaded = reopened.load(&"doc-2".to_string()).await.unwrap();
    assert!(loaded.is_some());
}
