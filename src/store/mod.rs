//! Persistence layer — `Database` trait and libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{AppChat, AppTurn, FarmerCrop, PeerChat, UserProfile};
pub use traits::{Database, OtpRecord};
