//! Report payload types.
//!
//! Field names and nesting match the JSON document the dashboard consumes:
//!
//! ```json
//! {
//!   "meta": {
//!     "location_info": {"resolution": "...", "road1": 90},
//!     "location_text": "...",
//!     "dates_comment": {"date_range": [2016, 2020], "last_update": 1592179200}
//!   },
//!   "widgets": [
//!     {"name": "...", "data": {"items": [], "text": {}}, "meta": {"rank": 1, "information": "..."}}
//!   ]
//! }
//! ```

use accident_map_accident_models::ResolutionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{LocationContext, LocationFields};

/// An assembled report: ordered widget results plus location metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Location and date metadata.
    pub meta: ReportMeta,
    /// Widget results in display order.
    pub widgets: Vec<WidgetResult>,
}

impl Report {
    /// Creates a report for `ctx` with the given widgets, in the given order.
    #[must_use]
    pub fn new(ctx: &LocationContext, location_text: String, widgets: Vec<WidgetResult>) -> Self {
        Self {
            meta: ReportMeta {
                location_info: LocationInfo {
                    resolution: ctx.resolution,
                    fields: ctx.fields.clone(),
                },
                location_text,
                dates_comment: DatesComment {
                    date_range: ctx.year_range(),
                    last_update: ctx.end_epoch_seconds(),
                },
            },
            widgets,
        }
    }

    /// Serializes the report into the cache payload format.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if an item value cannot be serialized.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a cache payload.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload is not a valid report.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Looks up a widget result by name.
    #[must_use]
    pub fn widget(&self, name: &str) -> Option<&WidgetResult> {
        self.widgets.iter().find(|w| w.name == name)
    }

    /// Names of the included widgets, in display order.
    #[must_use]
    pub fn widget_names(&self) -> Vec<&str> {
        self.widgets.iter().map(|w| w.name.as_str()).collect()
    }
}

/// Report-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Resolution and location fields of the request.
    pub location_info: LocationInfo,
    /// Human-readable location description.
    pub location_text: String,
    /// Covered date range.
    pub dates_comment: DatesComment,
}

/// Resolution kind plus location fields, flattened into one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// Granularity of the location.
    pub resolution: ResolutionKind,
    /// Location fields.
    #[serde(flatten)]
    pub fields: LocationFields,
}

/// Years covered by the report and the dataset recency it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatesComment {
    /// `[start_year, end_year]`.
    pub date_range: [i32; 2],
    /// Latest record date, seconds since the Unix epoch.
    pub last_update: i64,
}

/// Output of a single widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetResult {
    /// Unique widget name.
    pub name: String,
    /// Items and localized text.
    pub data: WidgetData,
    /// Display metadata.
    pub meta: WidgetMeta,
}

impl WidgetResult {
    /// Creates an unlocalized widget result.
    #[must_use]
    pub fn new(name: impl Into<String>, rank: i32, items: Value, digest: String) -> Self {
        Self {
            name: name.into(),
            data: WidgetData {
                items,
                text: Value::Object(serde_json::Map::new()),
            },
            meta: WidgetMeta {
                rank,
                information: String::new(),
                digest,
            },
        }
    }
}

/// Widget payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetData {
    /// Widget-specific items (object or array).
    pub items: Value,
    /// Localized captions; empty until the localization pass runs.
    pub text: Value,
}

/// Widget display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetMeta {
    /// Display order; lower first.
    pub rank: i32,
    /// Localized explanation of the widget; empty until localized.
    pub information: String,
    /// Hex SHA-256 of the unlocalized items.
    #[serde(default)]
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use accident_map_accident_models::Language;
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::LocationField;

    fn ctx() -> LocationContext {
        LocationContext::new(
            ResolutionKind::SuburbanRoad,
            LocationFields::new()
                .with(LocationField::Road1, 90)
                .with(LocationField::RoadSegmentId, 900_010),
            5,
            NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            Language::En,
        )
        .unwrap()
    }

    fn sample() -> Report {
        Report::new(
            &ctx(),
            "Road 90".to_string(),
            vec![
                WidgetResult::new(
                    "accident_count_by_severity",
                    1,
                    json!({"total_accidents_count": 12, "severity_fatal_count": 1}),
                    "ab".to_string(),
                ),
                WidgetResult::new(
                    "most_severe_accidents",
                    3,
                    json!([{"latitude": 31.5, "longitude": 35.4}]),
                    "cd".to_string(),
                ),
            ],
        )
    }

    #[test]
    fn payload_round_trip_preserves_order_and_items() {
        let report = sample();
        let payload = report.to_payload().unwrap();
        let back = Report::from_payload(&payload).unwrap();

        assert_eq!(back, report);
        assert_eq!(
            back.widget_names(),
            vec!["accident_count_by_severity", "most_severe_accidents"]
        );
    }

    #[test]
    fn json_shape_matches_dashboard_contract() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(
            value["meta"]["location_info"],
            json!({"resolution": "suburban_road", "road1": 90, "road_segment_id": 900_010})
        );
        assert_eq!(value["meta"]["dates_comment"]["date_range"], json!([2016, 2020]));
        assert_eq!(value["meta"]["dates_comment"]["last_update"], json!(1_592_179_200));
        assert_eq!(value["widgets"][0]["name"], json!("accident_count_by_severity"));
        assert_eq!(
            value["widgets"][0]["data"]["items"]["total_accidents_count"],
            json!(12)
        );
        assert_eq!(value["widgets"][0]["data"]["text"], json!({}));
        assert_eq!(value["widgets"][1]["meta"]["rank"], json!(3));
        assert_eq!(value["widgets"][1]["meta"]["information"], json!(""));
    }
}
