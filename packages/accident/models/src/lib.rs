#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Accident taxonomy types shared across the accident map.
//!
//! The national accident dataset stores most attributes as small integer
//! codes. This crate maps those codes onto typed enums so that widgets,
//! queries, and the localization pass all agree on one vocabulary. Every
//! enum exposes a stable snake-case label key (via [`AsRef<str>`]) which is
//! what the report payload stores before localization.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity of an accident as a whole, from 1 (fatal) to 3 (light).
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
pub enum AccidentSeverity {
    /// At least one person was killed
    Fatal = 1,
    /// At least one person was severely injured
    Severe = 2,
    /// Only light injuries
    Light = 3,
}

impl AccidentSeverity {
    /// Returns the dataset code for this severity.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Maps a dataset code onto a severity.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Fatal),
            2 => Some(Self::Severe),
            3 => Some(Self::Light),
            _ => None,
        }
    }

    /// Returns all variants, most severe first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Fatal, Self::Severe, Self::Light]
    }
}

/// Injury severity of a single involved person.
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
pub enum InjurySeverity {
    /// Killed
    Killed = 1,
    /// Severely injured
    SeverelyInjured = 2,
    /// Lightly injured
    LightlyInjured = 3,
}

impl InjurySeverity {
    /// Returns the dataset code for this injury severity.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Maps a dataset code onto an injury severity.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Killed),
            2 => Some(Self::SeverelyInjured),
            3 => Some(Self::LightlyInjured),
            _ => None,
        }
    }

    /// Returns all variants, most severe first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Killed, Self::SeverelyInjured, Self::LightlyInjured]
    }
}

/// Accident type as classified by the national statistics bureau.
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
pub enum AccidentType {
    /// A pedestrian was hit
    PedestrianInjury = 1,
    /// Front of one vehicle into the side of another
    CollisionFrontToSide = 2,
    /// Front of one vehicle into the rear of another
    CollisionFrontToRear = 3,
    /// Side-swipe
    CollisionSideToSide = 4,
    /// Head-on collision
    CollisionFrontToFront = 5,
    /// Collision with a stopped, non-parked vehicle
    CollisionWithStoppedVehicle = 6,
    /// Collision with a parked vehicle
    CollisionWithParkedVehicle = 7,
    /// Collision with an inanimate object
    CollisionWithObject = 8,
    /// Vehicle left the road or the carriageway
    RunOffRoad = 9,
    /// Rollover
    Rollover = 10,
    /// Skid
    Skid = 11,
    /// A passenger was hurt inside the vehicle
    PassengerInjury = 12,
    /// Fall from a moving vehicle
    FallFromVehicle = 13,
    /// Vehicle fire
    Fire = 14,
    /// Anything not covered by other types
    Other = 15,
    /// Rear of one vehicle into the front of another
    CollisionRearToFront = 17,
    /// Collision with an animal
    CollisionWithAnimal = 18,
    /// Damage caused by cargo
    CargoDamage = 19,
}

impl AccidentType {
    /// Returns the dataset code for this accident type.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Maps a dataset code onto an accident type.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::PedestrianInjury),
            2 => Some(Self::CollisionFrontToSide),
            3 => Some(Self::CollisionFrontToRear),
            4 => Some(Self::CollisionSideToSide),
            5 => Some(Self::CollisionFrontToFront),
            6 => Some(Self::CollisionWithStoppedVehicle),
            7 => Some(Self::CollisionWithParkedVehicle),
            8 => Some(Self::CollisionWithObject),
            9 => Some(Self::RunOffRoad),
            10 => Some(Self::Rollover),
            11 => Some(Self::Skid),
            12 => Some(Self::PassengerInjury),
            13 => Some(Self::FallFromVehicle),
            14 => Some(Self::Fire),
            15 => Some(Self::Other),
            17 => Some(Self::CollisionRearToFront),
            18 => Some(Self::CollisionWithAnimal),
            19 => Some(Self::CargoDamage),
            _ => None,
        }
    }
}

/// Day or night, as recorded at the time of the accident.
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
pub enum DayNight {
    /// Daytime
    Day = 1,
    /// Nighttime
    Night = 5,
}

impl DayNight {
    /// Maps a dataset code onto day or night.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Day),
            5 => Some(Self::Night),
            _ => None,
        }
    }
}

/// Lighting conditions on the road.
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
pub enum RoadLight {
    /// Daylight, normal visibility
    DayNormalVisibility = 1,
    /// Daylight, limited visibility (fog, smoke, ...)
    DayLimitedVisibility = 2,
    /// Night, road lit
    NightLit = 3,
    /// Night, limited visibility
    NightLimitedVisibility = 5,
    /// Night, no lighting
    NightUnlit = 6,
}

impl RoadLight {
    /// Maps a dataset code onto a lighting condition.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::DayNormalVisibility),
            2 => Some(Self::DayLimitedVisibility),
            3 => Some(Self::NightLit),
            5 => Some(Self::NightLimitedVisibility),
            6 => Some(Self::NightUnlit),
            _ => None,
        }
    }
}

/// Coarse age bucket of an involved person.
///
/// The dataset stores five-year age groups (code 1 = 0-4 through code 18 =
/// 85+, 99 = unknown); widgets report these collapsed buckets.
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
pub enum AgeBucket {
    /// 0-14
    #[strum(serialize = "age_0_14")]
    #[serde(rename = "age_0_14")]
    Age0To14,
    /// 15-24
    #[strum(serialize = "age_15_24")]
    #[serde(rename = "age_15_24")]
    Age15To24,
    /// 25-64
    #[strum(serialize = "age_25_64")]
    #[serde(rename = "age_25_64")]
    Age25To64,
    /// 65 and above
    #[strum(serialize = "age_65_plus")]
    #[serde(rename = "age_65_plus")]
    Age65Plus,
    /// Age not recorded
    Unknown,
}

impl AgeBucket {
    /// Collapses a five-year age group code into a bucket.
    #[must_use]
    pub const fn from_age_group(code: i64) -> Self {
        match code {
            1..=3 => Self::Age0To14,
            4..=5 => Self::Age15To24,
            6..=13 => Self::Age25To64,
            14..=18 => Self::Age65Plus,
            _ => Self::Unknown,
        }
    }

    /// Returns all buckets in display order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Age0To14,
            Self::Age15To24,
            Self::Age25To64,
            Self::Age65Plus,
            Self::Unknown,
        ]
    }
}

/// Coarse vehicle category derived from the detailed vehicle type code.
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
pub enum VehicleCategory {
    /// Private car
    Car,
    /// Trucks of any weight class
    Truck,
    /// Motorcycles and scooters
    Motorcycle,
    /// Bicycles and e-bikes
    Bicycle,
    /// Buses and minibuses
    Bus,
    /// Anything else (tractors, trains, unknown)
    Other,
}

impl VehicleCategory {
    /// Collapses a detailed vehicle type code into a category.
    #[must_use]
    pub const fn from_vehicle_type(code: i64) -> Self {
        match code {
            1 => Self::Car,
            2..=4 | 24 | 25 => Self::Truck,
            8..=10 | 19 => Self::Motorcycle,
            15 | 21 | 23 => Self::Bicycle,
            11..=14 | 18 => Self::Bus,
            _ => Self::Other,
        }
    }

    /// Returns all categories in display order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Car,
            Self::Truck,
            Self::Motorcycle,
            Self::Bicycle,
            Self::Bus,
            Self::Other,
        ]
    }
}

/// The granularity at which a location is expressed.
///
/// Variants are declared in resolution priority order: when a request
/// carries identifiers for more than one kind, the earliest wins.
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
pub enum ResolutionKind {
    /// A segment of an inter-city road
    SuburbanRoad,
    /// A junction of two streets inside a city
    UrbanJunction,
    /// A street inside a city
    Street,
    /// A junction of two inter-city roads
    SuburbanJunction,
    /// A whole city
    City,
    /// A police district
    District,
    /// A region
    Region,
}

impl ResolutionKind {
    /// Returns all kinds in resolution priority order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SuburbanRoad,
            Self::UrbanJunction,
            Self::Street,
            Self::SuburbanJunction,
            Self::City,
            Self::District,
            Self::Region,
        ]
    }
}

/// Output language of a report.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    /// Hebrew
    #[default]
    He,
    /// English
    En,
    /// Arabic
    Ar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_codes_round_trip() {
        for severity in AccidentSeverity::all() {
            assert_eq!(AccidentSeverity::from_code(severity.code()), Some(*severity));
        }
        assert_eq!(AccidentSeverity::from_code(0), None);
        assert_eq!(AccidentSeverity::Fatal.as_ref(), "fatal");
    }

    #[test]
    fn accident_type_skips_unassigned_codes() {
        assert_eq!(AccidentType::from_code(16), None);
        assert_eq!(
            AccidentType::from_code(5),
            Some(AccidentType::CollisionFrontToFront)
        );
        assert_eq!(
            AccidentType::CollisionFrontToFront.as_ref(),
            "collision_front_to_front"
        );
    }

    #[test]
    fn age_groups_collapse_into_buckets() {
        assert_eq!(AgeBucket::from_age_group(1), AgeBucket::Age0To14);
        assert_eq!(AgeBucket::from_age_group(5), AgeBucket::Age15To24);
        assert_eq!(AgeBucket::from_age_group(13), AgeBucket::Age25To64);
        assert_eq!(AgeBucket::from_age_group(18), AgeBucket::Age65Plus);
        assert_eq!(AgeBucket::from_age_group(99), AgeBucket::Unknown);
        assert_eq!(AgeBucket::Age65Plus.as_ref(), "age_65_plus");
    }

    #[test]
    fn resolution_kind_parses_snake_case() {
        let kind: ResolutionKind = "suburban_road".parse().unwrap();
        assert_eq!(kind, ResolutionKind::SuburbanRoad);
        assert_eq!(
            serde_json::to_string(&ResolutionKind::UrbanJunction).unwrap(),
            "\"urban_junction\""
        );
    }

    #[test]
    fn language_defaults_to_hebrew() {
        assert_eq!(Language::default(), Language::He);
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
    }
}
