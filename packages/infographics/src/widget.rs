//! The widget capability.

use accident_map_report_models::LocationContext;
use accident_map_statistics::{LocationLookup, StatisticsError, StatisticsSource};
use async_trait::async_trait;
use serde_json::Value;

/// Everything a widget may query: counts, records, and reference lookups.
pub trait DataSource: StatisticsSource + LocationLookup {}

impl<T: StatisticsSource + LocationLookup + ?Sized> DataSource for T {}

/// Failure of one widget's compute or localize step. Never aborts a report;
/// the widget is omitted (compute) or left unlocalized (localize).
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    /// A query failed.
    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),

    /// Items did not have the shape the widget expects.
    #[error("Unexpected items shape: {message}")]
    Shape {
        /// What was wrong.
        message: String,
    },

    /// Anything else the widget considers fatal for itself.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// One independently computable statistic over a location and window.
///
/// Widgets are stateless; one instance serves every request.
#[async_trait]
pub trait Widget: Send + Sync {
    /// Unique name, also the key of its title and information labels.
    fn name(&self) -> &'static str;

    /// Display order; lower first.
    fn rank(&self) -> i32;

    /// Whether the widget's output is precomputed by the cache rebuild.
    fn is_cacheable(&self) -> bool {
        true
    }

    /// Whether the widget applies to `ctx`. Evaluated before computing.
    fn is_relevant(&self, ctx: &LocationContext) -> bool;

    /// Computes the unlocalized items.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError`] if a query fails or the data is unusable.
    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError>;

    /// Whether computed items belong in the report. Empty arrays, empty
    /// objects, and nulls do not.
    fn is_included(&self, items: &Value) -> bool {
        !is_empty_items(items)
    }

    /// Adds language-dependent labels to `items`, leaving the data as is.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError`] if `items` do not have the expected shape.
    fn localize(&self, ctx: &LocationContext, items: Value) -> Result<Value, WidgetError> {
        let _ = ctx;
        Ok(items)
    }
}

/// Whether `items` carry no data.
#[must_use]
pub fn is_empty_items(items: &Value) -> bool {
    match items {
        Value::Null => true,
        Value::Array(values) => values.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_items_are_detected() {
        assert!(is_empty_items(&json!(null)));
        assert!(is_empty_items(&json!([])));
        assert!(is_empty_items(&json!({})));
        assert!(!is_empty_items(&json!([{"count": 0}])));
        assert!(!is_empty_items(&json!({"image_src": "x"})));
        assert!(!is_empty_items(&json!(0)));
    }
}
