pub mod dbhistory;

pub use dbhistory::PgHistoryStore;
