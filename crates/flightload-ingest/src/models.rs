//! Domain types produced by the loader

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Which end of the flight an airport lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirportRole {
    Origin,
    Destination,
}

impl std::fmt::Display for AirportRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AirportRole::Origin => write!(f, "origin"),
            AirportRole::Destination => write!(f, "destination"),
        }
    }
}

/// Why a flight was cancelled, from the single-letter source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    Carrier,
    Weather,
    #[serde(rename = "National Air System")]
    NationalAirSystem,
    Security,
}

impl CancellationReason {
    /// Map a source code; anything other than A-D has no reason
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(CancellationReason::Carrier),
            "B" => Some(CancellationReason::Weather),
            "C" => Some(CancellationReason::NationalAirSystem),
            "D" => Some(CancellationReason::Security),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::Carrier => "Carrier",
            CancellationReason::Weather => "Weather",
            CancellationReason::NationalAirSystem => "National Air System",
            CancellationReason::Security => "Security",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enriched flight document as stored in the index.
///
/// Field names follow the index mapping. Optional values serialize as `null`
/// when the source column was blank; timestamps serialize as RFC 3339 with the
/// airport's offset on the flight date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Airline name, empty when the carrier is not in the reference data
    pub airline: String,
    pub carrier: String,
    pub tail: Option<String>,
    pub number: String,

    pub origin: String,
    /// "latitude,longitude" as given by the airport extract
    pub origin_geo: String,
    pub origin_name: String,
    pub origin_city: String,
    pub origin_country: String,

    pub destination: String,
    pub destination_geo: String,
    pub destination_name: String,
    pub destination_city: String,
    pub destination_country: String,

    #[serde(rename = "scheduled_departure_time")]
    pub scheduled_dep_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "actual_departure_time")]
    pub actual_dep_time: Option<DateTime<FixedOffset>>,
    pub dep_delay_min: Option<i64>,
    pub taxi_out_min: Option<i64>,
    pub taxi_in_min: Option<i64>,
    #[serde(rename = "scheduled_arrival_time")]
    pub scheduled_arr_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "actual_arrival_time")]
    pub actual_arr_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "arrival_delay_min")]
    pub arr_delay_min: Option<i64>,

    pub canceled: bool,
    #[serde(rename = "cancelation_reason")]
    pub cancellation_reason: Option<CancellationReason>,
    pub diverted: bool,

    pub scheduled_elapsed_min: Option<i64>,
    pub actual_elapsed_min: Option<i64>,
    pub air_time_min: Option<i64>,

    pub flight_segments: i64,
    #[serde(rename = "distance_between_airports_miles")]
    pub distance_miles: i64,

    pub carrier_delay_min: Option<i64>,
    pub weather_delay_min: Option<i64>,
    pub national_air_system_delay_min: Option<i64>,
    pub security_delay_min: Option<i64>,
    pub late_aircraft_delay_min: Option<i64>,
}

/// A record together with the identity it is delivered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedFlight {
    pub id: String,
    pub record: FlightRecord,
}
