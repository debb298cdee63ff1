//! Extracted flight data.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// The extraction strategy that produced a [`FlightRecord`].
///
/// Declared in priority order: the parser tries them top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    StructuredMarkup,
    TableLayout,
    TextHeuristic,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::StructuredMarkup,
        Strategy::TableLayout,
        Strategy::TextHeuristic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::StructuredMarkup => "structured-markup",
            Self::TableLayout => "table-layout",
            Self::TextHeuristic => "text-heuristic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An additional leg of the same booking (multi-segment itineraries).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FlightLeg {
    pub flight_number: Option<String>,
    pub departure_airport: Option<String>,
    pub arrival_airport: Option<String>,
    pub departure_time: Option<NaiveDateTime>,
    pub travel_date: Option<NaiveDate>,
}

/// Best-effort flight data extracted from one message.
///
/// Every field is optional; a partial record is still a valid record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FlightRecord {
    /// Strategy that produced the record.
    pub strategy: Strategy,
    /// Booking reference / PNR.
    pub booking_reference: Option<String>,
    pub flight_number: Option<String>,
    /// IATA code of the departure airport.
    pub departure_airport: Option<String>,
    /// IATA code of the arrival airport.
    pub arrival_airport: Option<String>,
    /// Local departure time as written by the airline.
    pub departure_time: Option<NaiveDateTime>,
    /// Local arrival time as written by the airline.
    pub arrival_time: Option<NaiveDateTime>,
    pub passenger_name: Option<String>,
    pub travel_date: Option<NaiveDate>,
    /// Legs after the first one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<FlightLeg>,
    /// Later strategies that filled gaps (only with partial-record merging on).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplemented_by: Vec<Strategy>,
}

impl FlightRecord {
    /// An empty record tagged with `strategy`.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            booking_reference: None,
            flight_number: None,
            departure_airport: None,
            arrival_airport: None,
            departure_time: None,
            arrival_time: None,
            passenger_name: None,
            travel_date: None,
            connections: Vec::new(),
            supplemented_by: Vec::new(),
        }
    }

    /// `true` when no field was extracted.
    pub fn is_empty(&self) -> bool {
        self.booking_reference.is_none()
            && self.flight_number.is_none()
            && self.departure_airport.is_none()
            && self.arrival_airport.is_none()
            && self.departure_time.is_none()
            && self.arrival_time.is_none()
            && self.passenger_name.is_none()
            && self.travel_date.is_none()
            && self.connections.is_empty()
    }

    /// Canonical form: codes upper-cased, junk values dropped, travel date
    /// derived from the departure time when missing.
    pub fn normalized(mut self) -> Self {
        self.booking_reference = self.booking_reference.as_deref().and_then(normalize_reference);
        self.flight_number = self.flight_number.as_deref().and_then(normalize_flight_number);
        self.departure_airport = self.departure_airport.as_deref().and_then(normalize_airport);
        self.arrival_airport = self.arrival_airport.as_deref().and_then(normalize_airport);
        self.passenger_name = self
            .passenger_name
            .map(|n| n.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|n| !n.is_empty());
        if self.travel_date.is_none() {
            self.travel_date = self.departure_time.map(|t| t.date());
        }
        for leg in &mut self.connections {
            leg.flight_number = leg.flight_number.as_deref().and_then(normalize_flight_number);
            leg.departure_airport = leg.departure_airport.as_deref().and_then(normalize_airport);
            leg.arrival_airport = leg.arrival_airport.as_deref().and_then(normalize_airport);
            if leg.travel_date.is_none() {
                leg.travel_date = leg.departure_time.map(|t| t.date());
            }
        }
        self
    }

    /// All flight numbers on the booking (primary leg first, no duplicates).
    pub fn flight_numbers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let legs = self.connections.iter().map(|l| l.flight_number.as_deref());
        for number in std::iter::once(self.flight_number.as_deref()).chain(legs).flatten() {
            if !out.contains(&number) {
                out.push(number);
            }
        }
        out
    }

    /// All travel dates on the booking (primary leg first, no duplicates).
    pub fn travel_dates(&self) -> Vec<NaiveDate> {
        let mut out: Vec<NaiveDate> = Vec::new();
        let legs = self.connections.iter().map(|l| l.travel_date);
        for date in std::iter::once(self.travel_date).chain(legs).flatten() {
            if !out.contains(&date) {
                out.push(date);
            }
        }
        out
    }

    /// `"SFO→JFK"` when both airports are known.
    pub fn route(&self) -> Option<String> {
        match (&self.departure_airport, &self.arrival_airport) {
            (Some(from), Some(to)) => Some(format!("{from}→{to}")),
            _ => None,
        }
    }

    /// Fill fields this record lacks from `other`, never overwriting.
    ///
    /// Returns `true` if anything was copied; `other.strategy` is then
    /// appended to `supplemented_by`.
    pub fn fill_missing(&mut self, other: &FlightRecord) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.booking_reference, &other.booking_reference);
        changed |= fill(&mut self.flight_number, &other.flight_number);
        changed |= fill(&mut self.passenger_name, &other.passenger_name);
        changed |= fill(&mut self.departure_time, &other.departure_time);
        changed |= fill(&mut self.arrival_time, &other.arrival_time);
        changed |= fill(&mut self.travel_date, &other.travel_date);
        // Airports only travel as a pair.
        if self.departure_airport.is_none() && self.arrival_airport.is_none() {
            changed |= fill(&mut self.departure_airport, &other.departure_airport);
            changed |= fill(&mut self.arrival_airport, &other.arrival_airport);
        }
        if changed && !self.supplemented_by.contains(&other.strategy) {
            self.supplemented_by.push(other.strategy);
        }
        changed
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, source: &Option<T>) -> bool {
    if slot.is_none() && source.is_some() {
        slot.clone_from(source);
        true
    } else {
        false
    }
}

/// Upper-case alphanumeric booking reference, or `None` if nothing remains.
pub fn normalize_reference(raw: &str) -> Option<String> {
    let code: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

/// `"ua 123"` / `"UA-123"` → `"UA123"`.
pub fn normalize_flight_number(raw: &str) -> Option<String> {
    let number: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if number.len() < 2 || !number.chars().any(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(number)
    }
}

/// Three-letter IATA code, upper-cased.
pub fn normalize_airport(raw: &str) -> Option<String> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}
