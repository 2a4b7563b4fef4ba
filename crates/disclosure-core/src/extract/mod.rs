//! The four leaf extraction stages of the structuring pipeline (§4.2-§4.6).

pub mod content;
pub mod sections;
pub mod tables;
pub mod text;
pub mod vision;

pub use content::SectionContentExtractor;
pub use sections::SectionDetector;
pub use tables::TableExtractor;
pub use text::TextExtractor;
pub use vision::VisionExtractor;
