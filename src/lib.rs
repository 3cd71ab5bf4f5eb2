pub mod commands;
pub mod config;
pub mod error;
pub mod ranking;
pub mod services;
pub mod session;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{BookmeetError, RankError};

pub type GenericError = Box<dyn std::error::Error + Send + Sync>;
