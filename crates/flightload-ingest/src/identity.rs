//! Deterministic document identity for a flight row
//!
//! ```text
//! 2017-01-31.1200.AA123.N1234.ORD.SFO
//! date       sched carrier+number tail origin destination
//! ```
//!
//! Built from raw source strings with no escaping, so the same row always maps
//! to the same id across runs. That id is the create-only key in the index.

use std::fmt;

/// The raw columns that make up a flight's identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightIdentity<'a> {
    pub date: &'a str,
    pub scheduled_departure: &'a str,
    pub carrier: &'a str,
    pub number: &'a str,
    /// May be empty; it still occupies its segment
    pub tail: &'a str,
    pub origin: &'a str,
    pub destination: &'a str,
}

impl fmt::Display for FlightIdentity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}{}.{}.{}.{}",
            self.date,
            self.scheduled_departure,
            self.carrier,
            self.number,
            self.tail,
            self.origin,
            self.destination
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlightIdentity<'static> {
        FlightIdentity {
            date: "2017-01-31",
            scheduled_departure: "1200",
            carrier: "AA",
            number: "123",
            tail: "N1234",
            origin: "ORD",
            destination: "SFO",
        }
    }

    #[test]
    fn test_identity_format() {
        assert_eq!(sample().to_string(), "2017-01-31.1200.AA123.N1234.ORD.SFO");
    }

    #[test]
    fn test_empty_tail_keeps_its_segment() {
        let id = FlightIdentity { tail: "", ..sample() };
        assert_eq!(id.to_string(), "2017-01-31.1200.AA123..ORD.SFO");
    }

    #[test]
    fn test_identity_is_stable() {
        assert_eq!(sample().to_string(), sample().to_string());
        let other = FlightIdentity { number: "124", ..sample() };
        assert_ne!(sample().to_string(), other.to_string());
    }
}
