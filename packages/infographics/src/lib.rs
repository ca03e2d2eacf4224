#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-location accident infographics.
//!
//! A report is a ranked list of widgets. Each [`widget::Widget`] decides
//! whether it applies to a location, whether its output may be cached, and
//! how to compute and localize its items. The [`registry::WidgetRegistry`]
//! holds every widget in registration order; the
//! [`orchestrator::WidgetOrchestrator`] runs the relevant ones for a
//! [`accident_map_report_models::LocationContext`]; the
//! [`service::ReportService`] ties request resolution, the
//! [`cache::ReportCache`], live computation, and localization together.

pub mod cache;
pub mod localize;
pub mod location;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod widget;
pub mod widgets;

use accident_map_report_models::ContextError;

pub use widget::{DataSource, Widget, WidgetError};

/// Errors surfaced by the report read path.
#[derive(Debug, thiserror::Error)]
pub enum InfographicsError {
    /// The request does not name a location this system can report on.
    #[error("Unsupported location: {message}")]
    UnsupportedLocation {
        /// What was wrong with the request.
        message: String,
    },

    /// The lookback window is outside `[0, 100]` years.
    #[error("Lookback of {years} years is outside [0, 100]")]
    InvalidLookback {
        /// The rejected value.
        years: i64,
    },

    /// A referenced news item does not exist.
    #[error("News item {id} not found")]
    NotFound {
        /// The news item id.
        id: i64,
    },

    /// A name in the request matches nothing in the reference tables.
    #[error("Location not found: {message}")]
    LocationNotFound {
        /// The identifier that could not be resolved.
        message: String,
    },

    /// Statistics or lookup query failed.
    #[error("Statistics error: {0}")]
    Statistics(#[from] accident_map_statistics::StatisticsError),

    /// Cache storage failed.
    #[error("Cache error: {0}")]
    Cache(#[from] accident_map_database::DbError),

    /// A report could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ContextError> for InfographicsError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::LookbackOutOfRange { years } => Self::InvalidLookback { years },
            ContextError::InvalidWindow { years, .. } => Self::InvalidLookback {
                years: i64::from(years),
            },
            ContextError::EmptyLocation | ContextError::IllegalField { .. } => {
                Self::UnsupportedLocation {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use accident_map_accident_models::ResolutionKind;
    use accident_map_report_models::LocationField;

    use super::*;

    #[test]
    fn context_errors_map_to_caller_facing_errors() {
        assert!(matches!(
            InfographicsError::from(ContextError::LookbackOutOfRange { years: 101 }),
            InfographicsError::InvalidLookback { years: 101 }
        ));
        assert!(matches!(
            InfographicsError::from(ContextError::EmptyLocation),
            InfographicsError::UnsupportedLocation { .. }
        ));
        assert!(matches!(
            InfographicsError::from(ContextError::IllegalField {
                resolution: ResolutionKind::City,
                field: LocationField::Road1,
            }),
            InfographicsError::UnsupportedLocation { .. }
        ));
    }
}
