//! Free-text heuristics over the flattened message body.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::flight::{FlightRecord, Strategy};
use crate::parser::dates;

/// Characters after a keyword searched for the booking code.
const BOOKING_WINDOW: usize = 30;

static BOOKING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:booking|confirmation|reservation|reference|record\s+locator|pnr)\b")
        .expect("valid keyword regex")
});

static CODE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{5,7}\b").expect("valid code regex"));

/// What may sit between a booking keyword and a letters-only code:
/// label words and `:`/`#` separators ("code: ", "number is ", "#").
static LABEL_GAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s:#]*(?:(?:code|number|no|is|locator|reference|ref)\b\.?[\s:#]*)*$")
        .expect("valid label regex")
});

static FLIGHT_SHAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}\d{3,4}$").expect("valid flight regex"));

static FLIGHT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2}|[A-Z]\d|\d[A-Z])\s?(\d{1,4})\b").expect("valid flight regex")
});

static AIRPORT_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{3})\s*(?:to|TO|→|->|-|–|—)\s*([A-Z]{3})\b").expect("valid route regex")
});

/// Upper-case words that look like a booking code but never are,
/// including carrier and agency names ("booking with UNITED").
const NOT_CODES: &[&str] = &[
    "NUMBER", "BOOKING", "RECORD", "LOCATOR", "CODE", "UNITED", "DELTA", "ALASKA", "SPIRIT",
    "JETBLUE", "AIRWAYS", "EXPEDIA", "KAYAK", "TRAVEL",
];

/// Two-letter words that precede numbers in prose ("TO 2024", "AT 10").
const NOT_AIRLINES: &[&str] = &[
    "AM", "AN", "AS", "AT", "BY", "IN", "IS", "IT", "NO", "OF", "ON", "OR", "PM", "TO", "UP",
];

/// Run the four independent extractions over `text`.
pub fn extract(text: &str) -> Option<FlightRecord> {
    let mut record = FlightRecord::new(Strategy::TextHeuristic);

    record.booking_reference = find_booking_reference(text);
    record.flight_number = find_flight_number(text, record.booking_reference.as_deref());
    if let Some((from, to)) = find_airport_pair(text) {
        record.departure_airport = Some(from);
        record.arrival_airport = Some(to);
    }
    record.travel_date = dates::find_date(text);

    if record.is_empty() {
        None
    } else {
        Some(record)
    }
}

/// First code-shaped token shortly after a booking keyword on the same line.
///
/// Tokens with a digit may appear anywhere in the window. Letters-only
/// tokens must follow the keyword directly, separated only by a label
/// (`Confirmation code: QWERTY`), so prose like "booking with UNITED"
/// yields nothing.
pub fn find_booking_reference(text: &str) -> Option<String> {
    BOOKING_KEYWORD.find_iter(text).find_map(|keyword| {
        let window: String = text[keyword.end()..]
            .chars()
            .take(BOOKING_WINDOW)
            .take_while(|c| *c != '\n')
            .collect();
        CODE_TOKEN
            .find_iter(&window)
            .find(|m| {
                let token = m.as_str();
                if NOT_CODES.contains(&token) || FLIGHT_SHAPED.is_match(token) {
                    return false;
                }
                token.bytes().any(|b| b.is_ascii_digit())
                    || LABEL_GAP.is_match(&window[..m.start()])
            })
            .map(|m| m.as_str().to_string())
    })
}

/// First flight-number token that is not the booking reference itself.
pub fn find_flight_number(text: &str, booking_reference: Option<&str>) -> Option<String> {
    FLIGHT_TOKEN.captures_iter(text).find_map(|caps| {
        let airline = caps.get(1)?.as_str();
        if NOT_AIRLINES.contains(&airline) {
            return None;
        }
        let token = caps.get(0)?.as_str();
        let compact = format!("{airline}{}", caps.get(2)?.as_str());
        match booking_reference {
            Some(reference) if reference == token || reference == compact => None,
            _ => Some(compact),
        }
    })
}

/// `SFO to JFK`, `SFO → JFK`, `SFO-JFK`, `SFO – JFK`.
pub fn find_airport_pair(text: &str) -> Option<(String, String)> {
    AIRPORT_PAIR
        .captures(text)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_extract_all_fields() {
        let text = "Your confirmation number: ABCD12\n\
                    Flight UA 123 from SFO to JFK\n\
                    Departing October 14, 2024 at 8:30 AM";
        let record = extract(text).unwrap();
        assert_eq!(record.strategy, Strategy::TextHeuristic);
        assert_eq!(record.booking_reference.as_deref(), Some("ABCD12"));
        assert_eq!(record.flight_number.as_deref(), Some("UA123"));
        assert_eq!(record.departure_airport.as_deref(), Some("SFO"));
        assert_eq!(record.arrival_airport.as_deref(), Some("JFK"));
        assert_eq!(record.travel_date, NaiveDate::from_ymd_opt(2024, 10, 14));
    }

    #[test]
    fn test_booking_reference_window() {
        assert_eq!(
            find_booking_reference("Your booking reference is QX7P2L.").as_deref(),
            Some("QX7P2L")
        );
        assert_eq!(
            find_booking_reference("CONFIRMATION NUMBER: HJ4K9Z").as_deref(),
            Some("HJ4K9Z")
        );
        assert_eq!(
            find_booking_reference("Reservation\nABC123 on the next line"),
            None
        );
        assert_eq!(
            find_booking_reference("Thank you for your reservation. We look forward to seeing you ABC123"),
            None
        );
    }

    #[test]
    fn test_letters_only_reference_needs_label() {
        assert_eq!(
            find_booking_reference("Confirmation code: QWERTY").as_deref(),
            Some("QWERTY")
        );
        assert_eq!(
            find_booking_reference("Your booking reference is HKLMNP.").as_deref(),
            Some("HKLMNP")
        );
        assert_eq!(find_booking_reference("PNR #XYZABC").as_deref(), Some("XYZABC"));
        assert_eq!(
            find_booking_reference("Reservation No. HKLMNQ").as_deref(),
            Some("HKLMNQ")
        );
        assert_eq!(find_booking_reference("Thank you for booking with UNITED."), None);
        assert_eq!(find_booking_reference("Your reservation with QANTAS is set"), None);
        assert_eq!(
            find_booking_reference("Thank you for booking with UNITED. Code 7KQ2ZP").as_deref(),
            Some("7KQ2ZP")
        );
    }

    #[test]
    fn test_flight_number_skips_booking_reference() {
        assert_eq!(find_flight_number("B61234 then DL 405", Some("B61234")).as_deref(), Some("DL405"));
        assert_eq!(find_flight_number("Gate 12 AT 10 flight B6 615", None).as_deref(), Some("B6615"));
    }

    #[test]
    fn test_airport_pair_separators() {
        for text in ["SFO to JFK", "SFO→JFK", "SFO - JFK", "SFO–JFK", "SFO -> JFK"] {
            assert_eq!(
                find_airport_pair(text),
                Some(("SFO".to_string(), "JFK".to_string())),
                "{text}"
            );
        }
        assert_eq!(find_airport_pair("THE AND FOR YOU"), None);
    }

    #[test]
    fn test_nothing_found() {
        assert!(extract("Thanks for subscribing to our newsletter").is_none());
    }
}
