pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod training;

#[cfg(test)]
mod test_support;

pub use config::{Config, EngineConfig};
pub use error::{AppError, AppResult, ErrorKind};
