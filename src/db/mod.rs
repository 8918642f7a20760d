pub mod entries;
pub mod models;
pub mod profiles;

pub use models::*;
