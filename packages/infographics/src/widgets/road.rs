//! Inter-city road widgets.

use std::cmp::Ordering;

use accident_map_accident_models::{AccidentSeverity, AccidentType, ResolutionKind};
use accident_map_report_models::{LocationContext, LocationField};
use accident_map_statistics::query::{Column, DateWindow, Entity, QueryResult, StatsQuery};
use accident_map_statistics::{LocationLookup as _, StatisticsSource as _};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::localize::label_items;
use crate::widget::{DataSource, Widget, WidgetError};
use crate::widgets::is_road_segment;

/// Number of segments listed by [`TopRoadSegmentsAccidentsPerKm`].
pub const TOP_SEGMENTS: usize = 5;

/// Road types of inter-city roads (non-junction and junction).
const INTER_CITY_ROAD_TYPES: [i64; 2] = [3, 4];

const FATAL_OR_SEVERE: [i64; 2] = [
    AccidentSeverity::Fatal as i64,
    AccidentSeverity::Severe as i64,
];

fn is_inter_city_road(ctx: &LocationContext) -> bool {
    ctx.resolution == ResolutionKind::SuburbanRoad
}

/// Placeholder imagery for a road segment. Served live.
pub struct StreetView;

#[async_trait]
impl Widget for StreetView {
    fn name(&self) -> &'static str {
        "street_view"
    }

    fn rank(&self) -> i32 {
        4
    }

    fn is_cacheable(&self) -> bool {
        false
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        is_inter_city_road(ctx)
    }

    async fn compute(
        &self,
        _ctx: &LocationContext,
        _source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        Ok(json!({
            "latitude": 31.769_723,
            "longitude": 35.193_141,
        }))
    }
}

/// Share of head-on collisions among fatal and severe accidents on the
/// segment, next to the same share over all inter-city roads.
pub struct HeadOnCollisionsComparison;

impl HeadOnCollisionsComparison {
    fn split(result: &QueryResult) -> Value {
        let frontal = result.count_for(AccidentType::CollisionFrontToFront.code());
        json!([
            {"desc": "frontal", "count": frontal},
            {"desc": "others", "count": result.total() - frontal},
        ])
    }
}

#[async_trait]
impl Widget for HeadOnCollisionsComparison {
    fn name(&self) -> &'static str {
        "head_on_collisions_comparison"
    }

    fn rank(&self) -> i32 {
        5
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        is_road_segment(ctx)
    }

    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let segment = StatsQuery::for_context(Entity::Accidents, ctx)
            .filter_any(Column::AccidentSeverity, FATAL_OR_SEVERE)
            .group_by(Column::AccidentType);
        let segment = source.query(&segment).await?;
        if segment.total() == 0 {
            return Ok(Value::Object(Map::new()));
        }

        let all_roads = StatsQuery::new(Entity::Accidents)
            .window(DateWindow::of(ctx))
            .filter_any(Column::RoadType, INTER_CITY_ROAD_TYPES)
            .filter_any(Column::AccidentSeverity, FATAL_OR_SEVERE)
            .group_by(Column::AccidentType);
        let all_roads = source.query(&all_roads).await?;

        Ok(json!({
            "specific_road_segment_fatal_accidents": Self::split(&segment),
            "all_roads_fatal_accidents": Self::split(&all_roads),
        }))
    }

    fn localize(&self, ctx: &LocationContext, items: Value) -> Result<Value, WidgetError> {
        let Value::Object(series) = items else {
            return Err(WidgetError::Shape {
                message: "expected an object of series".to_string(),
            });
        };
        series
            .into_iter()
            .map(|(name, values)| Ok((name, label_items(values, "desc", "head_on", ctx.language)?)))
            .collect::<Result<Map<_, _>, WidgetError>>()
            .map(Value::Object)
    }
}

/// Segments of the road with the most accidents per kilometre.
pub struct TopRoadSegmentsAccidentsPerKm;

#[async_trait]
impl Widget for TopRoadSegmentsAccidentsPerKm {
    fn name(&self) -> &'static str {
        "top_road_segments_accidents_per_km"
    }

    fn rank(&self) -> i32 {
        13
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        is_inter_city_road(ctx) && ctx.fields.contains(LocationField::Road1)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let Some(road) = ctx.fields.int(LocationField::Road1) else {
            return Ok(Value::Array(Vec::new()));
        };

        let query = StatsQuery::new(Entity::Accidents)
            .window(DateWindow::of(ctx))
            .filter(Column::Road1, road)
            .group_by(Column::RoadSegmentId);
        let counts = source.query(&query).await?;
        let segments = source.road_segments(road).await?;

        let mut ranked = segments
            .iter()
            .filter(|segment| segment.length_km() > 0.0)
            .filter_map(|segment| {
                let total = counts.count_for(segment.segment_id);
                (total > 0).then(|| {
                    let per_km = total as f64 / segment.length_km();
                    (segment, total, per_km)
                })
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        Ok(Value::Array(
            ranked
                .into_iter()
                .take(TOP_SEGMENTS)
                .map(|(segment, total, per_km)| {
                    json!({
                        "segment_id": segment.segment_id,
                        "segment_name": segment.name,
                        "total_accidents": total,
                        "accidents_per_km": (per_km * 100.0).round() / 100.0,
                    })
                })
                .collect(),
        ))
    }
}

/// Static explainer for 2+1 road layouts. Served live.
pub struct VisionZeroTwoPlusOne;

#[async_trait]
impl Widget for VisionZeroTwoPlusOne {
    fn name(&self) -> &'static str {
        "vision_zero_2_plus_1"
    }

    fn rank(&self) -> i32 {
        16
    }

    fn is_cacheable(&self) -> bool {
        false
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        is_inter_city_road(ctx)
    }

    async fn compute(
        &self,
        _ctx: &LocationContext,
        _source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        Ok(json!({ "image_src": "vision_zero_2_plus_1" }))
    }
}
