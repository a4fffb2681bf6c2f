//! Flight row -> enriched [`FlightRecord`]
//!
//! # Row layout
//!
//! | #  | column              | #  | column                  |
//! |----|---------------------|----|-------------------------|
//! | 0  | FL_DATE             | 14 | CANCELLED               |
//! | 1  | carrier             | 15 | CANCELLATION_CODE       |
//! | 2  | tail number         | 16 | DIVERTED                |
//! | 3  | flight number       | 17 | CRS_ELAPSED_TIME        |
//! | 4  | origin              | 18 | ACTUAL_ELAPSED_TIME     |
//! | 5  | destination         | 19 | AIR_TIME                |
//! | 6  | CRS_DEP_TIME        | 20 | FLIGHTS                 |
//! | 7  | DEP_TIME            | 21 | DISTANCE                |
//! | 8  | DEP_DELAY           | 22 | CARRIER_DELAY           |
//! | 9  | TAXI_OUT            | 23 | WEATHER_DELAY           |
//! | 10 | TAXI_IN             | 24 | NAS_DELAY               |
//! | 11 | CRS_ARR_TIME        | 25 | SECURITY_DELAY          |
//! | 12 | ARR_TIME            | 26 | LATE_AIRCRAFT_DELAY     |
//! | 13 | ARR_DELAY           |    |                         |
//!
//! Departure clocks use the origin's timezone, arrival clocks the
//! destination's.

use chrono::NaiveDate;
use chrono_tz::Tz;
use csv::StringRecord;

use crate::coerce::{cancellation_reason, indicator, optional_minutes, required_count};
use crate::error::{CoercionError, TransformError};
use crate::identity::FlightIdentity;
use crate::models::{AirportRole, FlightRecord, TransformedFlight};
use crate::reference::{AirportRef, ReferenceTables};
use crate::time::{normalize, resolve_timezone};

/// First column of a header row
pub const HEADER_TOKEN: &str = "FL_DATE";

/// Columns a flight row must have
pub const FLIGHT_FIELDS: usize = 27;

mod col {
    pub const DATE: usize = 0;
    pub const CARRIER: usize = 1;
    pub const TAIL: usize = 2;
    pub const NUMBER: usize = 3;
    pub const ORIGIN: usize = 4;
    pub const DESTINATION: usize = 5;
    pub const SCHED_DEP: usize = 6;
    pub const ACTUAL_DEP: usize = 7;
    pub const DEP_DELAY: usize = 8;
    pub const TAXI_OUT: usize = 9;
    pub const TAXI_IN: usize = 10;
    pub const SCHED_ARR: usize = 11;
    pub const ACTUAL_ARR: usize = 12;
    pub const ARR_DELAY: usize = 13;
    pub const CANCELED: usize = 14;
    pub const CANCELLATION_CODE: usize = 15;
    pub const DIVERTED: usize = 16;
    pub const SCHED_ELAPSED: usize = 17;
    pub const ACTUAL_ELAPSED: usize = 18;
    pub const AIR_TIME: usize = 19;
    pub const SEGMENTS: usize = 20;
    pub const DISTANCE: usize = 21;
    pub const CARRIER_DELAY: usize = 22;
    pub const WEATHER_DELAY: usize = 23;
    pub const NAS_DELAY: usize = 24;
    pub const SECURITY_DELAY: usize = 25;
    pub const LATE_AIRCRAFT_DELAY: usize = 26;
}

/// Turns flight rows into records using read-only reference tables
#[derive(Debug, Clone, Copy)]
pub struct RecordTransformer<'a> {
    tables: &'a ReferenceTables,
}

impl<'a> RecordTransformer<'a> {
    pub fn new(tables: &'a ReferenceTables) -> Self {
        Self { tables }
    }

    pub fn is_header(row: &StringRecord) -> bool {
        row.get(col::DATE) == Some(HEADER_TOKEN)
    }

    /// Transform one row.
    ///
    /// Returns `Ok(None)` for a header row. An unknown carrier only leaves the
    /// airline name empty; every other failure is returned as an error.
    pub fn transform(&self, row: &StringRecord) -> Result<Option<TransformedFlight>, TransformError> {
        if Self::is_header(row) {
            return Ok(None);
        }
        if row.len() < FLIGHT_FIELDS {
            return Err(TransformError::MalformedRow {
                expected: FLIGHT_FIELDS,
                actual: row.len(),
            });
        }

        let f = |i: usize| &row[i];

        let id = FlightIdentity {
            date: f(col::DATE),
            scheduled_departure: f(col::SCHED_DEP),
            carrier: f(col::CARRIER),
            number: f(col::NUMBER),
            tail: f(col::TAIL),
            origin: f(col::ORIGIN),
            destination: f(col::DESTINATION),
        }
        .to_string();

        let date = NaiveDate::parse_from_str(f(col::DATE).trim(), "%Y-%m-%d").map_err(|_| {
            TransformError::InvalidDate {
                id: id.clone(),
                value: f(col::DATE).to_string(),
            }
        })?;

        let origin = self.airport(&id, AirportRole::Origin, f(col::ORIGIN))?;
        let origin_tz = timezone(&id, origin)?;
        let destination = self.airport(&id, AirportRole::Destination, f(col::DESTINATION))?;
        let destination_tz = timezone(&id, destination)?;

        let at = |field: &'static str, i: usize, tz: Tz| {
            normalize(date, f(i), tz).map_err(|source| TransformError::InvalidTime {
                id: id.clone(),
                field,
                source,
            })
        };
        let coerced = |source: CoercionError| TransformError::Coercion {
            id: id.clone(),
            source,
        };
        let minutes =
            |field: &'static str, i: usize| optional_minutes(field, f(i)).map_err(coerced);

        let carrier = f(col::CARRIER);
        let tail = f(col::TAIL);

        let record = FlightRecord {
            airline: self
                .tables
                .airline(carrier)
                .map(|airline| airline.airline_name.clone())
                .unwrap_or_default(),
            carrier: carrier.to_string(),
            tail: (!tail.trim().is_empty()).then(|| tail.to_string()),
            number: f(col::NUMBER).to_string(),

            origin: origin.iata_code.clone(),
            origin_geo: origin.geo(),
            origin_name: origin.name.clone(),
            origin_city: origin.city.clone(),
            origin_country: origin.country.clone(),

            destination: destination.iata_code.clone(),
            destination_geo: destination.geo(),
            destination_name: destination.name.clone(),
            destination_city: destination.city.clone(),
            destination_country: destination.country.clone(),

            scheduled_dep_time: at("scheduled_departure_time", col::SCHED_DEP, origin_tz)?,
            actual_dep_time: at("actual_departure_time", col::ACTUAL_DEP, origin_tz)?,
            dep_delay_min: minutes("dep_delay_min", col::DEP_DELAY)?,
            taxi_out_min: minutes("taxi_out_min", col::TAXI_OUT)?,
            taxi_in_min: minutes("taxi_in_min", col::TAXI_IN)?,
            scheduled_arr_time: at("scheduled_arrival_time", col::SCHED_ARR, destination_tz)?,
            actual_arr_time: at("actual_arrival_time", col::ACTUAL_ARR, destination_tz)?,
            arr_delay_min: minutes("arrival_delay_min", col::ARR_DELAY)?,

            canceled: indicator("canceled", f(col::CANCELED)).map_err(coerced)?,
            cancellation_reason: cancellation_reason(f(col::CANCELLATION_CODE)),
            diverted: indicator("diverted", f(col::DIVERTED)).map_err(coerced)?,

            scheduled_elapsed_min: minutes("scheduled_elapsed_min", col::SCHED_ELAPSED)?,
            actual_elapsed_min: minutes("actual_elapsed_min", col::ACTUAL_ELAPSED)?,
            air_time_min: minutes("air_time_min", col::AIR_TIME)?,

            flight_segments: required_count("flight_segments", f(col::SEGMENTS))
                .map_err(coerced)?,
            distance_miles: required_count("distance_between_airports_miles", f(col::DISTANCE))
                .map_err(coerced)?,

            carrier_delay_min: minutes("carrier_delay_min", col::CARRIER_DELAY)?,
            weather_delay_min: minutes("weather_delay_min", col::WEATHER_DELAY)?,
            national_air_system_delay_min: minutes(
                "national_air_system_delay_min",
                col::NAS_DELAY,
            )?,
            security_delay_min: minutes("security_delay_min", col::SECURITY_DELAY)?,
            late_aircraft_delay_min: minutes("late_aircraft_delay_min", col::LATE_AIRCRAFT_DELAY)?,
        };

        Ok(Some(TransformedFlight { id, record }))
    }

    fn airport(
        &self,
        id: &str,
        role: AirportRole,
        code: &str,
    ) -> Result<&'a AirportRef, TransformError> {
        self.tables
            .airport(code)
            .ok_or_else(|| TransformError::UnknownAirport {
                id: id.to_string(),
                role,
                code: code.to_string(),
            })
    }
}

fn timezone(id: &str, airport: &AirportRef) -> Result<Tz, TransformError> {
    resolve_timezone(&airport.timezone_id).map_err(|_| TransformError::UnknownTimezone {
        id: id.to_string(),
        airport: airport.iata_code.clone(),
        timezone: airport.timezone_id.clone(),
    })
}
