#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Location context and report payload types.
//!
//! A [`LocationContext`] is the normalized form of a report request: a
//! resolution kind, the location fields legal for that kind, a lookback
//! window anchored to the dataset's latest record, and an output language.
//! A [`Report`] is what the widget pipeline produces for a context; the same
//! type is both the cache payload and the JSON document served to the
//! dashboard.

pub mod report;

use std::collections::BTreeMap;
use std::fmt;

use accident_map_accident_models::{Language, ResolutionKind};
use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use report::{
    DatesComment, LocationInfo, Report, ReportMeta, WidgetData, WidgetMeta, WidgetResult,
};

/// Smallest accepted lookback window, in years.
pub const MIN_LOOKBACK_YEARS: i64 = 0;

/// Largest accepted lookback window, in years.
pub const MAX_LOOKBACK_YEARS: i64 = 100;

/// Errors raised while building a [`LocationContext`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The lookback window is outside `[0, 100]`.
    #[error("lookback of {years} years is outside [0, 100]")]
    LookbackOutOfRange {
        /// The rejected value.
        years: i64,
    },

    /// No location field carries a value.
    #[error("location has no fields")]
    EmptyLocation,

    /// A field is present that the resolution kind does not allow.
    #[error("field {field} is not valid for resolution {resolution}")]
    IllegalField {
        /// The resolution kind of the context.
        resolution: ResolutionKind,
        /// The offending field.
        field: LocationField,
    },

    /// The computed window start year is not representable.
    #[error("cannot compute a window start for {years} years before {latest}")]
    InvalidWindow {
        /// Lookback in years.
        years: u32,
        /// Latest record date the window was anchored to.
        latest: NaiveDate,
    },
}

/// A named location attribute.
///
/// Declaration order is the canonical order used for serialization and for
/// building cache keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocationField {
    /// Inter-city road number
    Road1,
    /// Second road number (junctions)
    Road2,
    /// Road segment identifier
    RoadSegmentId,
    /// Human-readable road segment name
    RoadSegmentName,
    /// City symbol
    YishuvSymbol,
    /// City name
    YishuvName,
    /// Street code within the city
    Street1,
    /// Street name
    Street1Hebrew,
    /// Second street code (urban junctions)
    Street2,
    /// Second street name
    Street2Hebrew,
    /// Non-urban junction identifier
    NonUrbanIntersection,
    /// Non-urban junction name
    NonUrbanIntersectionHebrew,
    /// Police district code
    District,
    /// Region code
    Region,
}

impl LocationField {
    /// Whether this field is a numeric identifier rather than a display
    /// name.
    #[must_use]
    pub const fn is_identifier(self) -> bool {
        self.identifier_for().is_none()
    }

    /// For name fields, the identifier field the name describes.
    #[must_use]
    pub const fn identifier_for(self) -> Option<Self> {
        match self {
            Self::RoadSegmentName => Some(Self::RoadSegmentId),
            Self::YishuvName => Some(Self::YishuvSymbol),
            Self::Street1Hebrew => Some(Self::Street1),
            Self::Street2Hebrew => Some(Self::Street2),
            Self::NonUrbanIntersectionHebrew => Some(Self::NonUrbanIntersection),
            _ => None,
        }
    }

    /// Fields that may legally appear for a resolution kind.
    #[must_use]
    pub const fn allowed_for(kind: ResolutionKind) -> &'static [Self] {
        match kind {
            ResolutionKind::SuburbanRoad => {
                &[Self::Road1, Self::RoadSegmentId, Self::RoadSegmentName]
            }
            ResolutionKind::UrbanJunction => &[
                Self::YishuvSymbol,
                Self::YishuvName,
                Self::Street1,
                Self::Street1Hebrew,
                Self::Street2,
                Self::Street2Hebrew,
            ],
            ResolutionKind::Street => &[
                Self::YishuvSymbol,
                Self::YishuvName,
                Self::Street1,
                Self::Street1Hebrew,
            ],
            ResolutionKind::SuburbanJunction => &[
                Self::NonUrbanIntersection,
                Self::NonUrbanIntersectionHebrew,
                Self::Road1,
                Self::Road2,
            ],
            ResolutionKind::City => &[Self::YishuvSymbol, Self::YishuvName],
            ResolutionKind::District => &[Self::District],
            ResolutionKind::Region => &[Self::Region],
        }
    }
}

/// Value of a location field: a numeric code or a display name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric identifier.
    Int(i64),
    /// Display name.
    Text(String),
}

impl FieldValue {
    /// Returns the integer value, if this is an identifier.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Returns the text value, if this is a name.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Text(s) => Some(s),
        }
    }

    /// Whether the value carries no information.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Int(_) => false,
            Self::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered mapping of location field to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationFields(BTreeMap<LocationField, FieldValue>);

impl LocationFields {
    /// Creates an empty field set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a field, ignoring blank values.
    pub fn insert(&mut self, field: LocationField, value: impl Into<FieldValue>) {
        let value = value.into();
        if !value.is_blank() {
            self.0.insert(field, value);
        }
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with(mut self, field: LocationField, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn get(&self, field: LocationField) -> Option<&FieldValue> {
        self.0.get(&field)
    }

    /// Returns the integer value of a field.
    #[must_use]
    pub fn int(&self, field: LocationField) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_int)
    }

    /// Returns the text value of a field.
    #[must_use]
    pub fn text(&self, field: LocationField) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Whether a field is present.
    #[must_use]
    pub fn contains(&self, field: LocationField) -> bool {
        self.0.contains_key(&field)
    }

    /// Removes a field.
    pub fn remove(&mut self, field: LocationField) -> Option<FieldValue> {
        self.0.remove(&field)
    }

    /// Whether no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (LocationField, &FieldValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Keeps only the fields legal for `kind`.
    #[must_use]
    pub fn restricted_to(&self, kind: ResolutionKind) -> Self {
        let allowed = LocationField::allowed_for(kind);
        Self(
            self.0
                .iter()
                .filter(|(k, _)| allowed.contains(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(LocationField, FieldValue)> for LocationFields {
    fn from_iter<T: IntoIterator<Item = (LocationField, FieldValue)>>(iter: T) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Identity of a cacheable location, independent of the lookback window.
///
/// Built from identifier fields, plus any name field whose identifier is
/// missing, so that two requests for the same place always map to the same
/// key regardless of how display names were spelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationKey {
    /// Resolution kind of the location.
    pub resolution: ResolutionKind,
    /// Identity fields of the location.
    pub fields: LocationFields,
}

impl LocationKey {
    /// Derives the key for a resolved location.
    #[must_use]
    pub fn new(resolution: ResolutionKind, fields: &LocationFields) -> Self {
        let identity = fields
            .iter()
            .filter(|(field, _)| {
                field
                    .identifier_for()
                    .is_none_or(|id_field| !fields.contains(id_field))
            })
            .map(|(field, value)| (field, value.clone()))
            .collect();
        Self {
            resolution,
            fields: identity,
        }
    }

    /// Canonical string form used as the cache primary key, e.g.
    /// `suburban_road|road1=90|road_segment_id=900010`.
    #[must_use]
    pub fn as_cache_key(&self) -> String {
        let mut key = self.resolution.as_ref().to_string();
        for (field, value) in self.fields.iter() {
            key.push('|');
            key.push_str(field.as_ref());
            key.push('=');
            key.push_str(&value.to_string());
        }
        key
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_cache_key())
    }
}

/// Normalized request parameters shared by every widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationContext {
    /// Granularity of the location.
    pub resolution: ResolutionKind,
    /// Location fields legal for `resolution`.
    pub fields: LocationFields,
    /// Lookback window in years.
    pub lookback_years: u32,
    /// First day of the window (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the window (inclusive); the latest record in the dataset.
    pub end_date: NaiveDate,
    /// Output language.
    pub language: Language,
}

impl LocationContext {
    /// Builds a validated context whose window ends at `latest_record`.
    ///
    /// # Errors
    ///
    /// * [`ContextError::LookbackOutOfRange`] if `lookback_years` is outside
    ///   `[0, 100]` (checked first, before anything else)
    /// * [`ContextError::EmptyLocation`] if `fields` is empty
    /// * [`ContextError::IllegalField`] if a field is not legal for
    ///   `resolution`
    pub fn new(
        resolution: ResolutionKind,
        fields: LocationFields,
        lookback_years: i64,
        latest_record: NaiveDate,
        language: Language,
    ) -> Result<Self, ContextError> {
        let years = validate_lookback(lookback_years)?;

        if fields.is_empty() {
            return Err(ContextError::EmptyLocation);
        }

        let allowed = LocationField::allowed_for(resolution);
        if let Some((field, _)) = fields.iter().find(|(f, _)| !allowed.contains(f)) {
            return Err(ContextError::IllegalField { resolution, field });
        }

        let (start_date, end_date) = date_window(latest_record, years)?;

        Ok(Self {
            resolution,
            fields,
            lookback_years: years,
            start_date,
            end_date,
            language,
        })
    }

    /// Cache identity of this context's location.
    #[must_use]
    pub fn location_key(&self) -> LocationKey {
        LocationKey::new(self.resolution, &self.fields)
    }

    /// `[start_year, end_year]` of the window.
    #[must_use]
    pub fn year_range(&self) -> [i32; 2] {
        [self.start_date.year(), self.end_date.year()]
    }

    /// The window end as seconds since the Unix epoch (midnight UTC).
    #[must_use]
    pub fn end_epoch_seconds(&self) -> i64 {
        self.end_date
            .and_hms_opt(0, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp())
    }
}

/// Validates a lookback window.
///
/// # Errors
///
/// Returns [`ContextError::LookbackOutOfRange`] if `years` is outside
/// `[0, 100]`.
pub fn validate_lookback(years: i64) -> Result<u32, ContextError> {
    if !(MIN_LOOKBACK_YEARS..=MAX_LOOKBACK_YEARS).contains(&years) {
        return Err(ContextError::LookbackOutOfRange { years });
    }
    u32::try_from(years).map_err(|_| ContextError::LookbackOutOfRange { years })
}

/// Computes `(start, end)` for a window anchored to the dataset's latest
/// record: the end is the latest record date, the start is January 1 of
/// `latest.year + 1 - years`.
///
/// A zero-year window starts after it ends and therefore matches nothing.
///
/// # Errors
///
/// Returns [`ContextError::InvalidWindow`] if the start year is not a valid
/// calendar year.
pub fn date_window(latest: NaiveDate, years: u32) -> Result<(NaiveDate, NaiveDate), ContextError> {
    let offset = i32::try_from(years).map_err(|_| ContextError::InvalidWindow { years, latest })?;
    let start_year = latest.year() + 1 - offset;
    let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
        .ok_or(ContextError::InvalidWindow { years, latest })?;
    Ok((start, latest))
}
