//! Vehicle sources: anything that can produce a [`VehicleReading`] on demand.

pub mod ioniq;
pub mod mock;
pub mod tesla;
pub mod token;

pub use ioniq::IoniqSource;
pub use tesla::TeslaSource;
pub use token::TokenManager;

use crate::vehicle::VehicleReading;
use async_trait::async_trait;
use thiserror::Error;

/// Vehicle source failures, classified so callers can log an `error_type`
/// and tell a sleeping vehicle apart from a broken API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Vehicle asleep: {0}")]
    Asleep(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

impl SourceError {
    /// Short kind name stored in the error log
    pub fn error_type(&self) -> &'static str {
        match self {
            SourceError::Authentication(_) => "authentication",
            SourceError::Api(_) => "api",
            SourceError::Asleep(_) => "asleep",
            SourceError::NotConfigured(_) => "not_configured",
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A vehicle the system can poll.
///
/// Implementations own their connection state (tokens, caches) and must be
/// safe to call from concurrent tasks.
#[async_trait]
pub trait VehicleSource: Send + Sync {
    /// Vehicle id used in readings, history and priority verdicts
    fn name(&self) -> &str;

    /// True when readings are fabricated
    fn is_mock(&self) -> bool;

    /// Establish API access. No-op in mock mode.
    async fn authenticate(&self) -> SourceResult<()>;

    /// Current reading for the vehicle
    async fn get_status(&self) -> SourceResult<VehicleReading>;

    /// Release connection state
    async fn close(&self);
}
