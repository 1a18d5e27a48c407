pub mod models;

pub use models::config;
pub use models::*;
