pub mod document_processor;
pub mod embedding;
pub mod semantic_search;
pub mod vector_store;

pub use embedding::{Embedder, EmbeddingConfig, OpenAiEmbedder};
pub use semantic_search::KnowledgeRetriever;
pub use vector_store::{
    cosine_similarity, KnowledgeStats, KnowledgeStore, SampleFilter, SearchFilter,
    SqliteKnowledgeStore, Visibility,
};
