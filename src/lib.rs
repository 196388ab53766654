pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod forum;
pub mod ingest;
pub mod models;
pub mod query;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AppError, FetchError, Result};
