pub mod embedding_queue;
pub mod knowledge;
pub mod long_term;
pub mod manager;
pub mod optimizer;
pub mod providers;
pub mod ranker;
pub mod session_context;
pub mod short_term;
pub mod summarizer;

pub use embedding_queue::{EmbeddingQueue, QueueConfig};
pub use knowledge::KnowledgeBase;
pub use long_term::LongTermStore;
pub use manager::{MemoryManager, StoreHealth, StoreOutcome};
pub use optimizer::ContextOptimizer;
pub use providers::{
    EmbeddingProvider, KeyValueStore, MetadataFilter, Outcome, TextGenerator, VectorDatabase,
};
pub use session_context::SessionContextStore;
pub use short_term::{ItemFilter, ShortTermStore};
pub use summarizer::Summarizer;
