//! schema.org `FlightReservation` markup: JSON-LD blocks and microdata scopes.
//!
//! The classifier only asks whether a confirmed reservation is present; the
//! parser turns the reservations into a [`FlightRecord`].

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FlightError, Result};
use crate::html::{self, Element};
use crate::model::flight::{FlightLeg, FlightRecord, Strategy};
use crate::parser::dates::parse_timestamp;

/// Which markup flavour a reservation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupSource {
    JsonLd,
    Microdata,
}

/// `reservationStatus` as written in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Other(String),
    /// No status property at all.
    Unstated,
}

impl ReservationStatus {
    fn from_text(raw: Option<String>) -> Self {
        let Some(raw) = raw else {
            return Self::Unstated;
        };
        let lower = raw.to_ascii_lowercase();
        if lower.contains("cancel") {
            Self::Cancelled
        } else if lower.contains("confirm") {
            Self::Confirmed
        } else {
            Self::Other(raw)
        }
    }
}

/// One flight inside a reservation, with values as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupLeg {
    pub flight_number: Option<String>,
    pub departure_airport: Option<String>,
    pub arrival_airport: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
}

/// A `FlightReservation` found in an HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub source: MarkupSource,
    pub status: ReservationStatus,
    pub reservation_number: Option<String>,
    pub passenger_name: Option<String>,
    pub legs: Vec<MarkupLeg>,
}

impl Reservation {
    /// JSON-LD must say the booking is confirmed; microdata may also leave
    /// the status out. A cancelled reservation never confirms a booking.
    pub fn confirms_booking(&self) -> bool {
        match self.status {
            ReservationStatus::Confirmed => true,
            ReservationStatus::Unstated => self.source == MarkupSource::Microdata,
            ReservationStatus::Cancelled | ReservationStatus::Other(_) => false,
        }
    }
}

/// Every flight reservation in `html`, JSON-LD first, then microdata.
///
/// Malformed JSON-LD blocks are skipped. The call fails only when JSON-LD
/// blocks exist, none of them parses, and there is no microdata to fall
/// back on.
pub fn find_reservations(html: &str) -> Result<Vec<Reservation>> {
    let (mut reservations, broken_blocks) = json_ld_reservations(html);
    reservations.extend(microdata_reservations(html));

    match broken_blocks {
        Some(reason) if reservations.is_empty() => {
            Err(FlightError::strategy(Strategy::StructuredMarkup, reason))
        }
        _ => Ok(reservations),
    }
}

/// Build a record from the reservations in `html`.
///
/// The first leg fills the scalar fields; later legs become connections.
pub fn extract(html: &str) -> Result<Option<FlightRecord>> {
    let reservations = find_reservations(html)?;
    if reservations.is_empty() {
        return Ok(None);
    }

    let mut record = FlightRecord::new(Strategy::StructuredMarkup);
    record.booking_reference = reservations
        .iter()
        .find_map(|r| r.reservation_number.clone());
    record.passenger_name = reservations.iter().find_map(|r| r.passenger_name.clone());

    let mut legs: Vec<&MarkupLeg> = Vec::new();
    for leg in reservations.iter().flat_map(|r| &r.legs) {
        if !legs.contains(&leg) {
            legs.push(leg);
        }
    }

    let mut legs = legs.into_iter();
    if let Some(first) = legs.next() {
        record.flight_number = first.flight_number.clone();
        record.departure_airport = first.departure_airport.clone();
        record.arrival_airport = first.arrival_airport.clone();
        record.departure_time = first.departure_time.as_deref().and_then(parse_timestamp);
        record.arrival_time = first.arrival_time.as_deref().and_then(parse_timestamp);
    }
    record.connections = legs
        .map(|leg| FlightLeg {
            flight_number: leg.flight_number.clone(),
            departure_airport: leg.departure_airport.clone(),
            arrival_airport: leg.arrival_airport.clone(),
            departure_time: leg.departure_time.as_deref().and_then(parse_timestamp),
            travel_date: None,
        })
        .collect();

    Ok(if record.is_empty() { None } else { Some(record) })
}

// ── JSON-LD ─────────────────────────────────────────────────────

/// Reservations from `<script type="application/ld+json">` blocks, plus a
/// reason when every block that exists failed to parse.
fn json_ld_reservations(html: &str) -> (Vec<Reservation>, Option<String>) {
    let scripts = html::find_elements(html, |name, attrs| {
        name == "script"
            && attrs
                .iter()
                .any(|(k, v)| k == "type" && v.to_ascii_lowercase().contains("ld+json"))
    });

    let mut reservations = Vec::new();
    let mut parsed_any = false;
    let mut last_error = None;

    for script in &scripts {
        let body = script
            .inner
            .trim()
            .trim_start_matches("<!--")
            .trim_end_matches("-->")
            .trim();
        if body.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => {
                parsed_any = true;
                let mut found = Vec::new();
                collect_reservations(&value, &mut found);
                reservations.extend(found.into_iter().map(reservation_from_json));
            }
            Err(e) => {
                debug!(offset = script.start, error = %e, "Skipping malformed JSON-LD block");
                last_error = Some(format!("malformed JSON-LD: {e}"));
            }
        }
    }

    let broken = if parsed_any { None } else { last_error };
    (reservations, broken)
}

fn collect_reservations<'v>(value: &'v Value, out: &mut Vec<&'v Map<String, Value>>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_reservations(item, out)),
        Value::Object(map) if has_type(map, "FlightReservation") => out.push(map),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_reservations(graph, out);
            }
        }
        _ => {}
    }
}

/// `@type` equals `ty`, possibly as a URL or prefixed name, or lists it.
fn has_type(map: &Map<String, Value>, ty: &str) -> bool {
    let matches = |v: &Value| v.as_str().is_some_and(|s| type_name(s).eq_ignore_ascii_case(ty));
    match map.get("@type") {
        Some(Value::Array(types)) => types.iter().any(matches),
        Some(v) => matches(v),
        None => false,
    }
}

/// `"http://schema.org/Flight"` / `"schema:Flight"` → `"Flight"`.
fn type_name(raw: &str) -> &str {
    raw.trim()
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or_default()
}

/// Scalar text of a JSON-LD value.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => ["name", "@id", "@value"]
            .iter()
            .find_map(|k| map.get(*k).and_then(text_of)),
        Value::Array(items) => items.iter().find_map(text_of),
        _ => None,
    }
}

fn field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(text_of)
}

fn reservation_from_json(map: &Map<String, Value>) -> Reservation {
    let legs = match map.get("reservationFor") {
        Some(Value::Array(flights)) => flights
            .iter()
            .filter_map(Value::as_object)
            .map(leg_from_json)
            .collect(),
        Some(Value::Object(flight)) => vec![leg_from_json(flight)],
        _ => Vec::new(),
    };

    Reservation {
        source: MarkupSource::JsonLd,
        status: ReservationStatus::from_text(field(map, "reservationStatus")),
        reservation_number: field(map, "reservationNumber").or_else(|| field(map, "reservationId")),
        passenger_name: map.get("underName").and_then(text_of),
        legs,
    }
}

fn leg_from_json(flight: &Map<String, Value>) -> MarkupLeg {
    let airline = flight
        .get("airline")
        .and_then(Value::as_object)
        .and_then(|a| field(a, "iataCode"));
    let flight_number = field(flight, "flightNumber").map(|n| prefix_airline(n, airline.as_deref()));

    let departure = flight.get("departureAirport").and_then(airport_code);
    let arrival = flight.get("arrivalAirport").and_then(airport_code);
    let (departure_airport, arrival_airport) = match (departure, arrival) {
        (Some(d), Some(a)) => (Some(d), Some(a)),
        _ => (None, None),
    };

    MarkupLeg {
        flight_number,
        departure_airport,
        arrival_airport,
        departure_time: field(flight, "departureTime"),
        arrival_time: field(flight, "arrivalTime"),
    }
}

fn airport_code(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => field(map, "iataCode"),
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// `"123"` with airline `"UA"` → `"UA123"`.
fn prefix_airline(number: String, airline: Option<&str>) -> String {
    match airline {
        Some(code) if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}{number}", code.trim())
        }
        _ => number,
    }
}

// ── Microdata ───────────────────────────────────────────────────

fn microdata_reservations(html: &str) -> Vec<Reservation> {
    html::find_elements(html, |_, attrs| itemtype_is(attrs, "FlightReservation"))
        .iter()
        .map(reservation_from_scope)
        .collect()
}

fn itemtype_is(attrs: &[(String, String)], ty: &str) -> bool {
    attrs.iter().any(|(k, v)| {
        k == "itemtype" && v.split_whitespace().any(|t| type_name(t).eq_ignore_ascii_case(ty))
    })
}

fn has_itemprop(attrs: &[(String, String)], prop: &str) -> bool {
    attrs.iter().any(|(k, v)| {
        k == "itemprop" && v.split_whitespace().any(|p| p.eq_ignore_ascii_case(prop))
    })
}

/// Value of an itemprop element: `content`, `datetime`, `href`, then text.
fn element_value(element: &Element<'_>) -> Option<String> {
    ["content", "datetime", "href"]
        .iter()
        .find_map(|a| element.attr(a))
        .map(|v| v.trim().to_string())
        .or_else(|| Some(element.text()))
        .filter(|v| !v.is_empty())
}

/// First `itemprop="<prop>"` element under `scope`.
fn prop_element<'a>(scope: &'a str, prop: &str) -> Option<Element<'a>> {
    html::find_elements(scope, |_, attrs| has_itemprop(attrs, prop))
        .into_iter()
        .next()
}

fn prop(scope: &str, name: &str) -> Option<String> {
    prop_element(scope, name).as_ref().and_then(element_value)
}

fn reservation_from_scope(scope: &Element<'_>) -> Reservation {
    let inner = scope.inner;

    let passenger_name = prop_element(inner, "underName").and_then(|person| {
        prop(person.inner, "name").or_else(|| element_value(&person))
    });

    let flights = html::find_elements(inner, |_, attrs| itemtype_is(attrs, "Flight"));
    let legs = if flights.is_empty() {
        vec![leg_from_scope(inner)]
    } else {
        flights.iter().map(|f| leg_from_scope(f.inner)).collect()
    };

    Reservation {
        source: MarkupSource::Microdata,
        status: ReservationStatus::from_text(prop(inner, "reservationStatus")),
        reservation_number: prop(inner, "reservationNumber"),
        passenger_name,
        legs,
    }
}

fn leg_from_scope(flight: &str) -> MarkupLeg {
    let airline = prop_element(flight, "airline").and_then(|a| prop(a.inner, "iataCode"));
    let flight_number = prop(flight, "flightNumber").map(|n| prefix_airline(n, airline.as_deref()));

    let airports: Vec<String> = html::find_elements(flight, |_, attrs| itemtype_is(attrs, "Airport"))
        .iter()
        .filter_map(|a| prop(a.inner, "iataCode"))
        .collect();
    let (departure_airport, arrival_airport) = match airports.as_slice() {
        [from, to, ..] => (Some(from.clone()), Some(to.clone())),
        _ => (None, None),
    };

    MarkupLeg {
        flight_number,
        departure_airport,
        arrival_airport,
        departure_time: prop(flight, "departureTime"),
        arrival_time: prop(flight, "arrivalTime"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_LD: &str = r#"<html><head><script type="application/ld+json">
{
  "@context": "http://schema.org",
  "@type": "FlightReservation",
  "reservationNumber": "ABCD12",
  "reservationStatus": "http://schema.org/ReservationConfirmed",
  "underName": {"@type": "Person", "name": "Jane Doe"},
  "reservationFor": {
    "@type": "Flight",
    "flightNumber": "123",
    "airline": {"@type": "Airline", "iataCode": "UA"},
    "departureAirport": {"@type": "Airport", "iataCode": "SFO"},
    "arrivalAirport": {"@type": "Airport", "iataCode": "JFK"},
    "departureTime": "2024-10-14T08:30:00-07:00",
    "arrivalTime": "2024-10-14T17:05:00-04:00"
  }
}
</script></head><body>Thanks for flying</body></html>"#;

    const MICRODATA: &str = r#"<div itemscope itemtype="http://schema.org/FlightReservation">
  <meta itemprop="reservationNumber" content="QWERTY"/>
  <div itemprop="underName" itemscope itemtype="http://schema.org/Person">
    <meta itemprop="name" content="John Smith"/>
  </div>
  <div itemprop="reservationFor" itemscope itemtype="http://schema.org/Flight">
    <meta itemprop="flightNumber" content="DL405"/>
    <div itemprop="departureAirport" itemscope itemtype="http://schema.org/Airport">
      <meta itemprop="iataCode" content="ATL"/>
    </div>
    <div itemprop="arrivalAirport" itemscope itemtype="http://schema.org/Airport">
      <meta itemprop="iataCode" content="LAX"/>
    </div>
    <meta itemprop="departureTime" content="2024-11-02T09:15:00"/>
  </div>
</div>"#;

    #[test]
    fn test_json_ld_reservation() {
        let reservations = find_reservations(JSON_LD).unwrap();
        assert_eq!(reservations.len(), 1);
        let r = &reservations[0];
        assert_eq!(r.status, ReservationStatus::Confirmed);
        assert!(r.confirms_booking());
        assert_eq!(r.reservation_number.as_deref(), Some("ABCD12"));
        assert_eq!(r.passenger_name.as_deref(), Some("Jane Doe"));
        assert_eq!(r.legs[0].flight_number.as_deref(), Some("UA123"));
        assert_eq!(r.legs[0].departure_airport.as_deref(), Some("SFO"));
        assert_eq!(r.legs[0].arrival_airport.as_deref(), Some("JFK"));
    }

    #[test]
    fn test_extract_json_ld_record() {
        let record = extract(JSON_LD).unwrap().unwrap();
        assert_eq!(record.strategy, Strategy::StructuredMarkup);
        assert_eq!(record.booking_reference.as_deref(), Some("ABCD12"));
        assert_eq!(
            record.departure_time.map(|t| t.to_string()).as_deref(),
            Some("2024-10-14 08:30:00")
        );
        assert!(record.connections.is_empty());
    }

    #[test]
    fn test_json_ld_without_status_does_not_confirm() {
        let html = r#"<script type="application/ld+json">{"@type":"FlightReservation","reservationNumber":"AAA111"}</script>"#;
        let reservations = find_reservations(html).unwrap();
        assert_eq!(reservations[0].status, ReservationStatus::Unstated);
        assert!(!reservations[0].confirms_booking());
    }

    #[test]
    fn test_json_ld_graph_and_multiple_legs() {
        let html = r#"<script type="application/ld+json">{"@graph":[
            {"@type":"FlightReservation","reservationNumber":"XYZ789","reservationStatus":"Confirmed",
             "reservationFor":{"@type":"Flight","flightNumber":"AA100","departureAirport":"JFK","arrivalAirport":"LHR","departureTime":"2024-12-01T18:00:00"}},
            {"@type":["FlightReservation"],"reservationNumber":"XYZ789","reservationStatus":"Confirmed",
             "reservationFor":{"@type":"Flight","flightNumber":"AA200","departureAirport":"LHR","arrivalAirport":"CDG","departureTime":"2024-12-02T09:00:00"}}
        ]}</script>"#;
        let record = extract(html).unwrap().unwrap();
        assert_eq!(record.flight_number.as_deref(), Some("AA100"));
        assert_eq!(record.connections.len(), 1);
        assert_eq!(record.connections[0].flight_number.as_deref(), Some("AA200"));
        assert_eq!(record.connections[0].departure_airport.as_deref(), Some("LHR"));
    }

    #[test]
    fn test_single_airport_means_no_airports() {
        let html = r#"<script type="application/ld+json">[{"@type":"FlightReservation","reservationFor":{"flightNumber":"B6 615","departureAirport":{"iataCode":"BOS"}}}]</script>"#;
        let record = extract(html).unwrap().unwrap();
        assert_eq!(record.flight_number.as_deref(), Some("B6 615"));
        assert_eq!(record.departure_airport, None);
        assert_eq!(record.arrival_airport, None);
    }

    #[test]
    fn test_cancelled_reservation_does_not_confirm() {
        let html = r#"<script type="application/ld+json">{"@type":"FlightReservation","reservationStatus":"http://schema.org/ReservationCancelled"}</script>"#;
        let reservations = find_reservations(html).unwrap();
        assert_eq!(reservations[0].status, ReservationStatus::Cancelled);
        assert!(!reservations[0].confirms_booking());
    }

    #[test]
    fn test_microdata_reservation() {
        let reservations = find_reservations(MICRODATA).unwrap();
        assert_eq!(reservations.len(), 1);
        let r = &reservations[0];
        assert_eq!(r.source, MarkupSource::Microdata);
        assert!(r.confirms_booking());
        assert_eq!(r.reservation_number.as_deref(), Some("QWERTY"));
        assert_eq!(r.passenger_name.as_deref(), Some("John Smith"));
        let leg = &r.legs[0];
        assert_eq!(leg.flight_number.as_deref(), Some("DL405"));
        assert_eq!(leg.departure_airport.as_deref(), Some("ATL"));
        assert_eq!(leg.arrival_airport.as_deref(), Some("LAX"));
        assert_eq!(leg.departure_time.as_deref(), Some("2024-11-02T09:15:00"));
    }

    #[test]
    fn test_malformed_json_ld_is_an_error_without_fallback() {
        let html = r#"<script type="application/ld+json">{"@type": "FlightReservation",</script>"#;
        assert!(matches!(
            find_reservations(html),
            Err(FlightError::Strategy { strategy: Strategy::StructuredMarkup, .. })
        ));
    }

    #[test]
    fn test_malformed_block_skipped_when_another_parses() {
        let html = format!(
            r#"<script type="application/ld+json">{{ broken </script>{JSON_LD}"#
        );
        assert_eq!(find_reservations(&html).unwrap().len(), 1);
    }

    #[test]
    fn test_no_markup() {
        assert!(find_reservations("<p>Hello</p>").unwrap().is_empty());
        assert!(extract("<p>Hello</p>").unwrap().is_none());
    }
}
