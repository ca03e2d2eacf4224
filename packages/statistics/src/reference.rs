//! Reference-table records returned by [`crate::LocationLookup`].

use accident_map_accident_models::ResolutionKind;
use accident_map_report_models::{LocationField, LocationFields};

/// A numbered stretch of an inter-city road.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    /// Segment id.
    pub segment_id: i64,
    /// Road number.
    pub road: i64,
    /// Position along the road.
    pub segment: i64,
    /// Kilometre mark where the segment starts.
    pub from_km: f64,
    /// Kilometre mark where the segment ends.
    pub to_km: f64,
    /// Display name.
    pub name: String,
}

impl RoadSegment {
    /// Segment length in kilometres.
    #[must_use]
    pub fn length_km(&self) -> f64 {
        (self.to_km - self.from_km).abs()
    }

    /// Identifying fields of this segment as a suburban-road location.
    #[must_use]
    pub fn location_fields(&self) -> LocationFields {
        LocationFields::new()
            .with(LocationField::Road1, self.road)
            .with(LocationField::RoadSegmentId, self.segment_id)
            .with(LocationField::RoadSegmentName, self.name.as_str())
    }
}

/// A junction of two inter-city roads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    /// Junction id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// First road.
    pub road1: i64,
    /// Second road.
    pub road2: i64,
}

impl Junction {
    /// Identifying fields of this junction as a suburban-junction location.
    #[must_use]
    pub fn location_fields(&self) -> LocationFields {
        LocationFields::new()
            .with(LocationField::NonUrbanIntersection, self.id)
            .with(LocationField::NonUrbanIntersectionHebrew, self.name.as_str())
            .with(LocationField::Road1, self.road1)
            .with(LocationField::Road2, self.road2)
    }
}

/// The location a news item is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsFlashLocation {
    /// News item id.
    pub id: i64,
    /// Resolution recorded on the item, if it was located at all.
    pub resolution: Option<ResolutionKind>,
    /// Location fields recorded on the item.
    pub fields: LocationFields,
}
