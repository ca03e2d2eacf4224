//! Read-time localization.
//!
//! Cached reports are language-neutral: items carry codes such as
//! `"fatal"`. The localization pass fills widget titles, information texts,
//! the location description, and per-item labels for the requested
//! language. A missing translation falls back to English, then to the key.

use accident_map_accident_models::{Language, ResolutionKind};
use accident_map_report_models::{LocationContext, LocationField, Report};
use serde_json::{Map, Value, json};

use crate::registry::WidgetRegistry;
use crate::widget::WidgetError;

/// `(key, hebrew, english)`. An empty string means "not translated".
const LABELS: &[(&str, &str, &str)] = &[
    // Widget titles
    ("accident_count_by_severity.title", "כמות תאונות לפי חומרה", "Accidents by severity"),
    ("most_severe_accidents_table.title", "התאונות החמורות ביותר", "Most severe accidents"),
    ("most_severe_accidents.title", "מפת התאונות החמורות", "Most severe accidents map"),
    ("street_view.title", "תצוגת רחוב", "Street view"),
    (
        "head_on_collisions_comparison.title",
        "התנגשויות חזית בחזית בהשוואה לכלל הכבישים",
        "Head-on collisions compared to all roads",
    ),
    ("accident_count_by_accident_type.title", "תאונות לפי סוג", "Accidents by type"),
    ("accidents_heat_map.title", "מפת חום של תאונות", "Accidents heat map"),
    ("accident_count_by_accident_year.title", "תאונות לפי שנה", "Accidents by year"),
    ("injured_count_by_accident_year.title", "נפגעים לפי שנה", "Injured by year"),
    ("accident_count_by_day_night.title", "תאונות ביום ובלילה", "Accidents by day and night"),
    ("accident_count_by_hour.title", "תאונות לפי שעה", "Accidents by hour"),
    ("accident_count_by_road_light.title", "תאונות לפי תאורה", "Accidents by lighting"),
    (
        "top_road_segments_accidents_per_km.title",
        "מקטעים עם הכי הרבה תאונות לק\"מ",
        "Road segments with the most accidents per km",
    ),
    ("injured_count_per_age_group.title", "נפגעים לפי קבוצת גיל", "Injured by age group"),
    ("accident_count_by_car_type.title", "תאונות לפי סוג רכב", "Accidents by vehicle type"),
    ("vision_zero_2_plus_1.title", "חזון אפס: כבישי 2+1", "Vision zero: 2+1 roads"),
    // Widget information texts
    (
        "accident_count_by_severity.information",
        "מספר התאונות במיקום בתקופה הנבחרת, לפי חומרה.",
        "Number of accidents at the location in the selected period, by severity.",
    ),
    (
        "most_severe_accidents_table.information",
        "",
        "Fatal and severe accidents at the location, most severe and most recent first.",
    ),
    (
        "most_severe_accidents.information",
        "",
        "Locations of fatal and severe accidents.",
    ),
    ("street_view.information", "", "Street-level imagery of the road segment."),
    (
        "head_on_collisions_comparison.information",
        "",
        "Share of head-on collisions among fatal and severe accidents on this segment, compared to all inter-city roads.",
    ),
    (
        "accident_count_by_accident_type.information",
        "",
        "Number of accidents at the location, by accident type.",
    ),
    (
        "accidents_heat_map.information",
        "",
        "Density of accidents at the location.",
    ),
    (
        "accident_count_by_accident_year.information",
        "",
        "Number of accidents per year, by severity.",
    ),
    (
        "injured_count_by_accident_year.information",
        "",
        "Number of injured people per year, by injury severity.",
    ),
    (
        "accident_count_by_day_night.information",
        "",
        "Number of accidents during the day and at night.",
    ),
    (
        "accident_count_by_hour.information",
        "",
        "Number of accidents by hour of day.",
    ),
    (
        "accident_count_by_road_light.information",
        "",
        "Number of accidents by lighting conditions.",
    ),
    (
        "top_road_segments_accidents_per_km.information",
        "",
        "Fatal and severe accidents per kilometre on the segments of this road.",
    ),
    (
        "injured_count_per_age_group.information",
        "",
        "Number of injured people by age group.",
    ),
    (
        "accident_count_by_car_type.information",
        "",
        "Number of accidents by type of vehicle involved.",
    ),
    (
        "vision_zero_2_plus_1.information",
        "",
        "A 2+1 road alternates a passing lane between directions and separates traffic with a barrier.",
    ),
    // Location description
    ("location.road", "כביש", "Road"),
    ("location.segment", "מקטע", "segment"),
    ("location.street", "רחוב", "Street"),
    ("location.junction", "צומת", "Junction"),
    ("location.and", " ו", " & "),
    ("location.district", "מחוז", "District"),
    ("location.region", "אזור", "Region"),
    // Codes
    ("severity.fatal", "קטלנית", "Fatal"),
    ("severity.severe", "קשה", "Severe"),
    ("severity.light", "קלה", "Light"),
    ("injury.killed", "הרוגים", "Killed"),
    ("injury.severely_injured", "פצועים קשה", "Severely injured"),
    ("injury.lightly_injured", "פצועים קל", "Lightly injured"),
    ("day_night.day", "יום", "Day"),
    ("day_night.night", "לילה", "Night"),
    ("road_light.day_normal_visibility", "", "Daylight, normal visibility"),
    ("road_light.day_limited_visibility", "", "Daylight, limited visibility"),
    ("road_light.night_lit", "", "Night, lit"),
    ("road_light.night_limited_visibility", "", "Night, limited visibility"),
    ("road_light.night_unlit", "", "Night, unlit"),
    ("age_group.age_0_14", "0-14", "0-14"),
    ("age_group.age_15_24", "15-24", "15-24"),
    ("age_group.age_25_64", "25-64", "25-64"),
    ("age_group.age_65_plus", "65+", "65+"),
    ("age_group.unknown", "לא ידוע", "Unknown"),
    ("vehicle.car", "רכב פרטי", "Car"),
    ("vehicle.truck", "משאית", "Truck"),
    ("vehicle.motorcycle", "אופנוע", "Motorcycle"),
    ("vehicle.bicycle", "אופניים", "Bicycle"),
    ("vehicle.bus", "אוטובוס", "Bus"),
    ("vehicle.other", "אחר", "Other"),
    ("head_on.frontal", "חזית בחזית", "Head-on"),
    ("head_on.others", "אחרות", "Others"),
    ("accident_type.pedestrian_injury", "פגיעה בהולך רגל", "Pedestrian injury"),
    ("accident_type.collision_front_to_side", "", "Front-to-side collision"),
    ("accident_type.collision_front_to_rear", "", "Front-to-rear collision"),
    ("accident_type.collision_side_to_side", "", "Side-to-side collision"),
    ("accident_type.collision_front_to_front", "חזית בחזית", "Head-on collision"),
    ("accident_type.collision_with_stopped_vehicle", "", "Collision with a stopped vehicle"),
    ("accident_type.collision_with_parked_vehicle", "", "Collision with a parked vehicle"),
    ("accident_type.collision_with_object", "", "Collision with an object"),
    ("accident_type.run_off_road", "ירידה מהכביש", "Run off road"),
    ("accident_type.rollover", "התהפכות", "Rollover"),
    ("accident_type.skid", "החלקה", "Skid"),
    ("accident_type.passenger_injury", "", "Passenger injury"),
    ("accident_type.fall_from_vehicle", "", "Fall from a moving vehicle"),
    ("accident_type.fire", "שריפה", "Fire"),
    ("accident_type.other", "אחר", "Other"),
    ("accident_type.collision_rear_to_front", "", "Rear-to-front collision"),
    ("accident_type.collision_with_animal", "", "Collision with an animal"),
    ("accident_type.cargo_damage", "", "Cargo damage"),
];

/// Label for `key` in `language`.
#[must_use]
pub fn label(key: &str, language: Language) -> String {
    let Some((_, he, en)) = LABELS.iter().find(|(k, _, _)| *k == key) else {
        return key.to_string();
    };

    let text = match language {
        Language::He if !he.is_empty() => he,
        // Arabic has no catalog of its own yet.
        Language::He | Language::En | Language::Ar => en,
    };
    if text.is_empty() {
        key.to_string()
    } else {
        (*text).to_string()
    }
}

/// Title of a widget.
#[must_use]
pub fn title(widget: &str, language: Language) -> String {
    label(&format!("{widget}.title"), language)
}

/// Information text of a widget.
#[must_use]
pub fn information(widget: &str, language: Language) -> String {
    label(&format!("{widget}.information"), language)
}

/// Human-readable description of the context's location.
#[must_use]
pub fn location_text(ctx: &LocationContext) -> String {
    let lang = ctx.language;
    let fields = &ctx.fields;
    let name = |name_field: LocationField, id_field: LocationField| {
        fields
            .text(name_field)
            .map(ToString::to_string)
            .or_else(|| fields.int(id_field).map(|id| id.to_string()))
    };
    let city = name(LocationField::YishuvName, LocationField::YishuvSymbol).unwrap_or_default();
    let street1 = name(LocationField::Street1Hebrew, LocationField::Street1).unwrap_or_default();
    let street2 = name(LocationField::Street2Hebrew, LocationField::Street2).unwrap_or_default();

    match ctx.resolution {
        ResolutionKind::SuburbanRoad => {
            let road = fields.int(LocationField::Road1);
            let segment = name(LocationField::RoadSegmentName, LocationField::RoadSegmentId);
            match (road, segment) {
                (Some(road), Some(segment)) => format!(
                    "{} {road}, {} {segment}",
                    label("location.road", lang),
                    label("location.segment", lang)
                ),
                (Some(road), None) => format!("{} {road}", label("location.road", lang)),
                (None, segment) => format!(
                    "{} {}",
                    label("location.segment", lang),
                    segment.unwrap_or_default()
                ),
            }
        }
        ResolutionKind::Street => {
            format!("{} {street1}, {city}", label("location.street", lang))
        }
        ResolutionKind::UrbanJunction => format!(
            "{} {street1}{}{street2}, {city}",
            label("location.junction", lang),
            label("location.and", lang)
        ),
        ResolutionKind::SuburbanJunction => {
            let junction = name(
                LocationField::NonUrbanIntersectionHebrew,
                LocationField::NonUrbanIntersection,
            )
            .unwrap_or_default();
            format!("{} {junction}", label("location.junction", lang))
        }
        ResolutionKind::City => city,
        ResolutionKind::District => format!(
            "{} {}",
            label("location.district", lang),
            fields.int(LocationField::District).unwrap_or_default()
        ),
        ResolutionKind::Region => format!(
            "{} {}",
            label("location.region", lang),
            fields.int(LocationField::Region).unwrap_or_default()
        ),
    }
}

/// Adds `"<field>_label"` next to `field` in every object of an items
/// array, translating the code under `prefix`.
///
/// # Errors
///
/// Returns [`WidgetError::Shape`] if `items` is not an array of objects.
pub fn label_items(
    items: Value,
    field: &str,
    prefix: &str,
    language: Language,
) -> Result<Value, WidgetError> {
    let Value::Array(entries) = items else {
        return Err(WidgetError::Shape {
            message: format!("expected an array to label by {field}"),
        });
    };

    entries
        .into_iter()
        .map(|entry| {
            let Value::Object(mut object) = entry else {
                return Err(WidgetError::Shape {
                    message: format!("expected objects to label by {field}"),
                });
            };
            if let Some(code) = object.get(field).and_then(Value::as_str) {
                let text = label(&format!("{prefix}.{code}"), language);
                object.insert(format!("{field}_label"), Value::String(text));
            }
            Ok(Value::Object(object))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Applies the localization pass to `report` for `ctx.language`.
///
/// Widget `localize` failures leave that widget's items as they were.
/// Widgets no longer present in the registry keep their items and still
/// get titles.
#[must_use]
pub fn localize_report(
    mut report: Report,
    ctx: &LocationContext,
    registry: &WidgetRegistry,
) -> Report {
    let lang = ctx.language;
    report.meta.location_text = location_text(ctx);

    for result in &mut report.widgets {
        let mut text = Map::new();
        text.insert("title".to_string(), json!(title(&result.name, lang)));
        result.data.text = Value::Object(text);
        result.meta.information = information(&result.name, lang);

        let Some(descriptor) = registry.get(&result.name) else {
            continue;
        };
        match descriptor.widget.localize(ctx, result.data.items.clone()) {
            Ok(items) => result.data.items = items,
            Err(e) => log::warn!(
                "Failed to localize widget {} for {}: {e}",
                result.name,
                ctx.location_key()
            ),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use accident_map_report_models::LocationFields;
    use chrono::NaiveDate;

    use super::*;

    fn ctx(
        resolution: ResolutionKind,
        fields: LocationFields,
        language: Language,
    ) -> LocationContext {
        LocationContext::new(
            resolution,
            fields,
            5,
            NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            language,
        )
        .unwrap()
    }

    #[test]
    fn falls_back_to_english_then_key() {
        assert_eq!(label("severity.fatal", Language::He), "קטלנית");
        assert_eq!(label("severity.fatal", Language::Ar), "Fatal");
        assert_eq!(
            label("road_light.night_unlit", Language::He),
            "Night, unlit"
        );
        assert_eq!(label("no.such.key", Language::En), "no.such.key");
    }

    #[test]
    fn describes_road_segments() {
        let fields = LocationFields::new()
            .with(LocationField::Road1, 90)
            .with(LocationField::RoadSegmentId, 900_010)
            .with(LocationField::RoadSegmentName, "Ein Gedi - Masada");

        let en = ctx(ResolutionKind::SuburbanRoad, fields.clone(), Language::En);
        assert_eq!(location_text(&en), "Road 90, segment Ein Gedi - Masada");

        let he = ctx(ResolutionKind::SuburbanRoad, fields, Language::He);
        assert_eq!(location_text(&he), "כביש 90, מקטע Ein Gedi - Masada");
    }

    #[test]
    fn describes_streets_with_codes_when_names_are_missing() {
        let fields = LocationFields::new()
            .with(LocationField::YishuvName, "Tel Aviv-Yafo")
            .with(LocationField::Street1, 418);
        let en = ctx(ResolutionKind::Street, fields, Language::En);
        assert_eq!(location_text(&en), "Street 418, Tel Aviv-Yafo");
    }

    #[test]
    fn labels_items_without_touching_data() {
        let items = json!([{"severity": "fatal", "count": 2}, {"count": 1}]);
        let labeled = label_items(items, "severity", "severity", Language::En).unwrap();
        assert_eq!(
            labeled,
            json!([
                {"severity": "fatal", "severity_label": "Fatal", "count": 2},
                {"count": 1}
            ])
        );

        assert!(matches!(
            label_items(json!({"a": 1}), "severity", "severity", Language::En),
            Err(WidgetError::Shape { .. })
        ));
    }
}
