pub mod db;
pub mod model;
pub mod schema;
pub mod store;

pub use db::Db;
pub use model::{AlertState, Direction, PriceObservation, Track};
pub use store::memory::InMemoryStore;
pub use store::sqlite_store::SqliteStore;
pub use store::{AlertStateStore, InstrumentRegistry, PriceHistoryStore};
