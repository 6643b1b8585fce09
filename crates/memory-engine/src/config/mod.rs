pub mod settings;

pub use settings::{
    DatabaseConfig, EmbeddingConfig, KvBackend, LlmConfig, MemoryConfig, RedisConfig,
    SecurityConfig, ServerConfig, Settings, VectorBackend,
};
