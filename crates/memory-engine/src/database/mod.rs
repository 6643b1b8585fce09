pub mod in_memory;
pub mod models;
pub mod pool;
pub mod repository;

pub use in_memory::InMemoryVectorDatabase;
pub use models::VectorRow;
pub use pool::DbPool;
pub use repository::PgVectorRepository;
