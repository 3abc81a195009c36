pub mod client;
pub mod commerce;
pub mod error;
pub mod events;
pub mod models;

pub use client::ApiClient;
pub use error::ApiError;
