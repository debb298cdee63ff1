//! Label/value tables ("Confirmation number | ABC123").

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::html;
use crate::model::flight::{FlightRecord, Strategy};
use crate::parser::dates;

/// A table is only read when its own text mentions one of these.
const TABLE_KEYWORDS: &[&str] = &["flight", "booking", "departure", "arrival"];

static BOOKING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{5,8}\b").expect("valid booking regex"));

static FLIGHT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[A-Z]{2}|[A-Z]\d|\d[A-Z])\s?\d{1,4}\b").expect("valid flight regex")
});

static BRACKETED_AIRPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Z]{3})\)").expect("valid airport regex"));

static AIRPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3})\b").expect("valid airport regex"));

/// What a row label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowField {
    BookingReference,
    FlightNumber,
    Passenger,
    DepartureAirport,
    DepartureTime,
    ArrivalAirport,
    ArrivalTime,
    TravelDate,
}

/// Read the first qualifying table that yields any field.
pub fn extract(html_body: &str) -> Result<Option<FlightRecord>> {
    for table in html::elements_by_tag(html_body, "table") {
        let own = html::strip_elements(table.inner, "table");
        let text = html::inline_text(&own).to_lowercase();
        if !TABLE_KEYWORDS.iter().any(|k| text.contains(k)) {
            continue;
        }
        let record = read_rows(&own);
        if !record.is_empty() {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

fn read_rows(table: &str) -> FlightRecord {
    let mut record = FlightRecord::new(Strategy::TableLayout);

    for row in html::elements_by_tag(table, "tr") {
        let cells = html::find_elements(row.inner, |name, _| name == "td" || name == "th");
        let [label, value, ..] = cells.as_slice() else {
            continue;
        };
        let label = label.text().to_lowercase();
        let value = value.text();
        if value.is_empty() {
            continue;
        }
        if let Some(field) = classify_label(&label) {
            apply(&mut record, field, &value);
        }
    }

    record
}

fn classify_label(label: &str) -> Option<RowField> {
    let words: Vec<&str> = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |needle: &str| label.contains(needle);
    let word = |w: &str| words.contains(&w);

    let departure = has("depart") || word("from") || word("origin");
    let arrival = has("arriv") || has("destination") || word("to");
    let airport = has("airport") || has("city") || words.len() == 1;
    let when = has("time") || has("date");

    if has("booking")
        || has("confirmation")
        || has("pnr")
        || has("reference")
        || has("record locator")
    {
        Some(RowField::BookingReference)
    } else if has("flight") && (has("number") || word("no") || has("#")) {
        Some(RowField::FlightNumber)
    } else if has("passenger") || has("traveler") || has("traveller") || word("name") {
        Some(RowField::Passenger)
    } else if departure && when {
        Some(RowField::DepartureTime)
    } else if arrival && when {
        Some(RowField::ArrivalTime)
    } else if departure && airport {
        Some(RowField::DepartureAirport)
    } else if arrival && airport {
        Some(RowField::ArrivalAirport)
    } else if word("date") {
        Some(RowField::TravelDate)
    } else {
        None
    }
}

/// Store `value` in the record; the first row for a field wins.
fn apply(record: &mut FlightRecord, field: RowField, value: &str) {
    match field {
        RowField::BookingReference => {
            if record.booking_reference.is_none() {
                record.booking_reference = BOOKING_CODE.find(value).map(|m| m.as_str().to_string());
            }
        }
        RowField::FlightNumber => {
            if record.flight_number.is_none() {
                record.flight_number = FLIGHT_CODE.find(value).map(|m| m.as_str().to_string());
            }
        }
        RowField::Passenger => {
            if record.passenger_name.is_none() {
                record.passenger_name = Some(value.to_string());
            }
        }
        RowField::DepartureAirport => {
            if record.departure_airport.is_none() {
                record.departure_airport = airport_code(value);
            }
        }
        RowField::ArrivalAirport => {
            if record.arrival_airport.is_none() {
                record.arrival_airport = airport_code(value);
            }
        }
        RowField::DepartureTime => {
            let (timestamp, date) = dates::parse_loose(value);
            if record.departure_time.is_none() {
                record.departure_time = timestamp;
            }
            if record.travel_date.is_none() {
                record.travel_date = date;
            }
        }
        RowField::ArrivalTime => {
            if record.arrival_time.is_none() {
                record.arrival_time = dates::parse_loose(value).0;
            }
        }
        RowField::TravelDate => {
            if record.travel_date.is_none() {
                record.travel_date = dates::find_date(value);
            }
        }
    }
}

/// `"San Francisco (SFO)"` → `SFO`; otherwise the first three-letter code.
fn airport_code(value: &str) -> Option<String> {
    BRACKETED_AIRPORT
        .captures(value)
        .or_else(|| AIRPORT.captures(value))
        .map(|c| c[1].to_string())
}
