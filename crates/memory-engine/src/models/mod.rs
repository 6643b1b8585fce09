pub mod chat;
pub mod context;
pub mod knowledge;
pub mod memory;

pub use chat::ChatMessage;
pub use context::{OptimizeRequest, OptimizedContext, RelevantMemory, DEFAULT_MAX_TOKENS};
pub use knowledge::{KnowledgeHit, StoredVector};
pub use memory::{
    memory_id, ConversationTurn, JsonMap, MemoryDocument, MemoryItem, MemoryType,
    ScoredDocument, SessionMemory, RESERVED_ITEM_METADATA,
};
