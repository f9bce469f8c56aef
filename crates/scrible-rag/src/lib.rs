//! Ingestion, retrieval and answer synthesis over a [`scrible_vector::VectorIndex`].

pub mod answer;
pub mod engine;
pub mod extractor;
pub mod insights;
pub mod llm;
pub mod system;

pub use engine::RetrievalEngine;
pub use extractor::{discover_documents, FileExtractor};
pub use llm::OpenAiCompatibleClient;
pub use system::{Corpus, PreparedDocument, RagSystem};
