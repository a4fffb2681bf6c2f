//! Reference extracts: airlines and airports
//!
//! Both extracts are header-less CSV in the OpenFlights layout. Only the
//! columns needed for the flight joins are kept:
//!
//! ```text
//! airlines: id, name, alias, IATA, ICAO, callsign, country, active
//!           -> name (1), carrier code (3)
//! airports: id, name, city, country, IATA, ICAO, lat, lon, alt, utc, dst, tz, ...
//!           -> name (1), city (2), country (3), IATA (4), lat (6), lon (7), tz (11)
//! ```
//!
//! A short or unparsable row aborts the load. Later rows win over earlier
//! ones with the same code. Rows without a code are left out.

use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

use crate::error::ReferenceError;

/// Minimum number of columns in an airline row
pub const AIRLINE_MIN_FIELDS: usize = 4;

/// Minimum number of columns in an airport row
pub const AIRPORT_MIN_FIELDS: usize = 12;

/// Null marker used by the extracts for missing values
const NULL_MARKER: &str = "\\N";

/// Airline known by its carrier code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirlineRef {
    pub carrier_code: String,
    pub airline_name: String,
}

/// Airport known by its IATA code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirportRef {
    pub iata_code: String,
    pub name: String,
    pub city: String,
    pub country: String,
    pub latitude: String,
    pub longitude: String,
    /// IANA timezone identifier, resolved when a flight needs it
    pub timezone_id: String,
}

impl AirportRef {
    /// Geo point in the "lat,lon" string form the index accepts
    pub fn geo(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

pub type AirlineTable = HashMap<String, AirlineRef>;
pub type AirportTable = HashMap<String, AirportRef>;

/// Lookup tables shared read-only by every transformation
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    airlines: AirlineTable,
    airports: AirportTable,
}

impl ReferenceTables {
    pub fn new(airlines: AirlineTable, airports: AirportTable) -> Self {
        Self { airlines, airports }
    }

    pub fn airline(&self, carrier_code: &str) -> Option<&AirlineRef> {
        self.airlines.get(carrier_code)
    }

    pub fn airport(&self, iata_code: &str) -> Option<&AirportRef> {
        self.airports.get(iata_code)
    }

    pub fn airline_count(&self) -> usize {
        self.airlines.len()
    }

    pub fn airport_count(&self) -> usize {
        self.airports.len()
    }
}

/// Builds lookup tables from reference extracts
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceLoader;

impl ReferenceLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load airlines from any reader; `source_name` labels errors
    pub fn load_airlines<R: Read>(
        &self,
        reader: R,
        source_name: &str,
    ) -> Result<AirlineTable, ReferenceError> {
        let mut airlines = AirlineTable::new();

        for_each_row(reader, source_name, AIRLINE_MIN_FIELDS, |row| {
            let code = &row[3];
            if is_missing(code) {
                return;
            }
            airlines.insert(
                code.to_string(),
                AirlineRef {
                    carrier_code: code.to_string(),
                    airline_name: row[1].to_string(),
                },
            );
        })?;

        info!(source = source_name, count = airlines.len(), "Airlines loaded");
        Ok(airlines)
    }

    /// Load airports from any reader; `source_name` labels errors
    pub fn load_airports<R: Read>(
        &self,
        reader: R,
        source_name: &str,
    ) -> Result<AirportTable, ReferenceError> {
        let mut airports = AirportTable::new();

        for_each_row(reader, source_name, AIRPORT_MIN_FIELDS, |row| {
            let code = &row[4];
            if is_missing(code) {
                return;
            }
            airports.insert(
                code.to_string(),
                AirportRef {
                    iata_code: code.to_string(),
                    name: row[1].to_string(),
                    city: row[2].to_string(),
                    country: row[3].to_string(),
                    latitude: row[6].to_string(),
                    longitude: row[7].to_string(),
                    timezone_id: row[11].to_string(),
                },
            );
        })?;

        info!(source = source_name, count = airports.len(), "Airports loaded");
        Ok(airports)
    }

    pub fn load_airlines_file(&self, path: &Path) -> Result<AirlineTable, ReferenceError> {
        let file = open(path)?;
        self.load_airlines(file, &path.display().to_string())
    }

    pub fn load_airports_file(&self, path: &Path) -> Result<AirportTable, ReferenceError> {
        let file = open(path)?;
        self.load_airports(file, &path.display().to_string())
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ReferenceError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ReferenceError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn is_missing(code: &str) -> bool {
    let code = code.trim();
    code.is_empty() || code == NULL_MARKER
}

/// Feed every row with at least `min_fields` columns to `on_row`
fn for_each_row<R, F>(
    reader: R,
    source_name: &str,
    min_fields: usize,
    mut on_row: F,
) -> Result<(), ReferenceError>
where
    R: Read,
    F: FnMut(&StringRecord),
{
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut row = StringRecord::new();

    loop {
        let line = csv.position().line();
        match csv.read_record(&mut row) {
            Ok(true) => {},
            Ok(false) => break,
            Err(source) => {
                return Err(ReferenceError::Csv {
                    source_name: source_name.to_string(),
                    line,
                    source,
                })
            },
        }

        if row.len() < min_fields {
            return Err(ReferenceError::ShortRow {
                source_name: source_name.to_string(),
                line: row.position().map(|p| p.line()).unwrap_or(line),
                expected: min_fields,
                actual: row.len(),
            });
        }

        on_row(&row);
    }

    Ok(())
}
