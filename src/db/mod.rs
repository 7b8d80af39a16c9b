pub mod models;
pub mod repository;
pub mod store;

pub use models::{Blockchain, Currency, Deposit, DepositStatus, Wallet, WatchedAddress};
pub use repository::PgStore;
pub use store::Store;
