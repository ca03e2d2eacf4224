//! Widgets listing individual accidents.

use accident_map_accident_models::{AccidentSeverity, AccidentType};
use accident_map_report_models::LocationContext;
use accident_map_statistics::StatisticsSource as _;
use accident_map_statistics::query::{AccidentRecord, Column, RecordOrder, RecordQuery};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::localize::label_items;
use crate::widget::{DataSource, Widget, WidgetError};
use crate::widgets::{any_location, is_segment_or_street};

/// Number of accidents listed by the most-severe widgets.
pub const MOST_SEVERE_LIMIT: u32 = 10;

const FATAL_OR_SEVERE: [i64; 2] = [
    AccidentSeverity::Fatal as i64,
    AccidentSeverity::Severe as i64,
];

fn severity_key(record: &AccidentRecord) -> Value {
    AccidentSeverity::from_code(record.severity)
        .map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn accident_type_key(record: &AccidentRecord) -> Value {
    record
        .accident_type
        .and_then(AccidentType::from_code)
        .map_or(Value::Null, |t| Value::String(t.to_string()))
}

async fn most_severe(
    ctx: &LocationContext,
    source: &dyn DataSource,
) -> Result<Vec<AccidentRecord>, WidgetError> {
    let query = RecordQuery::for_context(ctx)
        .filter_any(Column::AccidentSeverity, FATAL_OR_SEVERE)
        .order(RecordOrder::MostSevere)
        .limit(MOST_SEVERE_LIMIT);
    Ok(source.fetch_accidents(&query).await?)
}

/// Fatal and severe accidents as table rows.
pub struct MostSevereAccidentsTable;

#[async_trait]
impl Widget for MostSevereAccidentsTable {
    fn name(&self) -> &'static str {
        "most_severe_accidents_table"
    }

    fn rank(&self) -> i32 {
        2
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        is_segment_or_street(ctx)
    }

    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let rows = most_severe(ctx, source)
            .await?
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "date": record.timestamp.format("%Y-%m-%d").to_string(),
                    "hour": record.timestamp.format("%H:%M").to_string(),
                    "accident_type": accident_type_key(record),
                    "severity": severity_key(record),
                })
            })
            .collect();
        Ok(Value::Array(rows))
    }

    fn localize(&self, ctx: &LocationContext, items: Value) -> Result<Value, WidgetError> {
        let items = label_items(items, "severity", "severity", ctx.language)?;
        label_items(items, "accident_type", "accident_type", ctx.language)
    }
}

/// Fatal and severe accidents as map markers.
pub struct MostSevereAccidents;

#[async_trait]
impl Widget for MostSevereAccidents {
    fn name(&self) -> &'static str {
        "most_severe_accidents"
    }

    fn rank(&self) -> i32 {
        3
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        is_segment_or_street(ctx)
    }

    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let markers = most_severe(ctx, source)
            .await?
            .iter()
            .filter_map(|record| {
                let (latitude, longitude) = (record.latitude?, record.longitude?);
                Some(json!({
                    "id": record.id,
                    "latitude": latitude,
                    "longitude": longitude,
                    "severity": severity_key(record),
                    "accident_type": accident_type_key(record),
                    "accident_timestamp": record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                }))
            })
            .collect();
        Ok(Value::Array(markers))
    }

    fn localize(&self, ctx: &LocationContext, items: Value) -> Result<Value, WidgetError> {
        let items = label_items(items, "severity", "severity", ctx.language)?;
        label_items(items, "accident_type", "accident_type", ctx.language)
    }
}

/// Coordinates of every accident at the location.
pub struct AccidentsHeatMap;

#[async_trait]
impl Widget for AccidentsHeatMap {
    fn name(&self) -> &'static str {
        "accidents_heat_map"
    }

    fn rank(&self) -> i32 {
        7
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        any_location(ctx)
    }

    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let query = RecordQuery::for_context(ctx).order(RecordOrder::Newest);
        let points = source
            .fetch_accidents(&query)
            .await?
            .into_iter()
            .filter_map(|record| {
                Some(json!({
                    "latitude": record.latitude?,
                    "longitude": record.longitude?,
                }))
            })
            .collect();
        Ok(Value::Array(points))
    }
}
