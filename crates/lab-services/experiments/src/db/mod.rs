pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub use memory::InMemoryLabStore;
pub use pool::DbPool;
pub use postgres::PgLabStore;
pub use store::LabStore;
