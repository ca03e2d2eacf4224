//! Per-year series.
//!
//! Every year of the window appears, zero-filled, so that charts share an
//! x-axis across locations. A location with nothing in the window gets no
//! series at all.

use std::collections::BTreeMap;

use accident_map_accident_models::{AccidentSeverity, InjurySeverity};
use accident_map_report_models::LocationContext;
use accident_map_statistics::StatisticsSource as _;
use accident_map_statistics::query::{Column, Entity, StatsQuery};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::widget::{DataSource, Widget, WidgetError};
use crate::widgets::any_location;

/// Counts per year, split by one coded column.
pub struct YearlyCounts {
    name: &'static str,
    rank: i32,
    entity: Entity,
    split: Column,
    series: &'static [(i64, &'static str)],
}

#[async_trait]
impl Widget for YearlyCounts {
    fn name(&self) -> &'static str {
        self.name
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        any_location(ctx)
    }

    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let query = StatsQuery::for_context(self.entity, ctx)
            .filter_any(self.split, self.series.iter().map(|(code, _)| *code))
            .group_by_pair(Column::AccidentYear, self.split);
        let result = source.query(&query).await?;
        if result.total() == 0 {
            return Ok(Value::Array(Vec::new()));
        }

        let empty = BTreeMap::new();
        let by_year = result.nested().unwrap_or(&empty);
        let [first, last] = ctx.year_range();

        Ok(Value::Array(
            (first..=last)
                .map(|year| {
                    let counts = by_year.get(&i64::from(year));
                    let mut item = Map::new();
                    item.insert("accident_year".to_string(), Value::from(year));
                    for (code, key) in self.series {
                        let count = counts.and_then(|c| c.get(code)).copied().unwrap_or(0);
                        item.insert((*key).to_string(), Value::from(count));
                    }
                    Value::Object(item)
                })
                .collect(),
        ))
    }
}

const SEVERITIES: &[(i64, &str)] = &[
    (AccidentSeverity::Fatal as i64, "fatal"),
    (AccidentSeverity::Severe as i64, "severe"),
    (AccidentSeverity::Light as i64, "light"),
];

const INJURIES: &[(i64, &str)] = &[
    (InjurySeverity::Killed as i64, "killed"),
    (InjurySeverity::SeverelyInjured as i64, "severely_injured"),
    (InjurySeverity::LightlyInjured as i64, "lightly_injured"),
];

/// Accidents per year by severity.
#[must_use]
pub const fn accident_count_by_accident_year() -> YearlyCounts {
    YearlyCounts {
        name: "accident_count_by_accident_year",
        rank: 8,
        entity: Entity::Accidents,
        split: Column::AccidentSeverity,
        series: SEVERITIES,
    }
}

/// Injured people per year by injury severity.
#[must_use]
pub const fn injured_count_by_accident_year() -> YearlyCounts {
    YearlyCounts {
        name: "injured_count_by_accident_year",
        rank: 9,
        entity: Entity::Involved,
        split: Column::InjurySeverity,
        series: INJURIES,
    }
}
