//! Export grouped messages to CSV.
//!
//! Output is UTF-8 with BOM for Excel compatibility.

use std::io::Write;
use std::path::Path;

use crate::model::group::DuplicateGroup;
use crate::pipeline::{BatchReport, MessageOutcome};

const HEADER: &str = "Group,Representative,Message_ID,Score,Strategy,Booking_Reference,\
Flight_Number,Route,Departure_Time,Travel_Date,Passenger,Methods,Confidence";

/// Export every accepted message of `report` to a CSV file.
///
/// One row per message, grouped and numbered in report order. Returns the
/// number of rows written.
pub fn export_csv(report: &BatchReport, output_path: &Path) -> anyhow::Result<usize> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(output_path)?);
    let rows = write_csv(report, &mut file)?;
    file.flush()?;
    Ok(rows)
}

/// Write the CSV (BOM included) to any writer.
pub fn write_csv(report: &BatchReport, out: &mut impl Write) -> anyhow::Result<usize> {
    // UTF-8 BOM for Excel
    out.write_all(&[0xEF, 0xBB, 0xBF])?;
    writeln!(out, "{HEADER}")?;

    let mut rows = 0;
    for (number, group) in report.groups.iter().enumerate() {
        for id in &group.message_ids {
            let Some(outcome) = report.outcome(id) else {
                continue;
            };
            writeln!(out, "{}", row(number + 1, group, outcome))?;
            rows += 1;
        }
    }
    Ok(rows)
}

fn row(number: usize, group: &DuplicateGroup, outcome: &MessageOutcome) -> String {
    let record = outcome.record.as_ref();
    let text = |value: Option<&str>| csv_escape(value.unwrap_or(""));
    let methods = group
        .methods
        .iter()
        .map(|m| m.label())
        .collect::<Vec<_>>()
        .join("; ");

    [
        number.to_string(),
        (group.representative == outcome.message_id).to_string(),
        csv_escape(&outcome.message_id),
        outcome.classification.total_score.to_string(),
        record.map(|r| r.strategy.label()).unwrap_or("").to_string(),
        text(record.and_then(|r| r.booking_reference.as_deref())),
        text(record.and_then(|r| r.flight_number.as_deref())),
        text(record.and_then(|r| r.route()).as_deref()),
        record
            .and_then(|r| r.departure_time)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        record
            .and_then(|r| r.travel_date)
            .map(|d| d.to_string())
            .unwrap_or_default(),
        text(record.and_then(|r| r.passenger_name.as_deref())),
        csv_escape(&methods),
        group.confidence.to_string(),
    ]
    .join(",")
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::message::RawMessage;
    use crate::pipeline::Pipeline;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_one_row_per_accepted_message() {
        let html = r#"<script type="application/ld+json">
{"@type":"FlightReservation","reservationNumber":"ABCD12","reservationStatus":"Confirmed",
 "underName":{"name":"Doe, Jane"},
 "reservationFor":{"@type":"Flight","flightNumber":"UA123","departureAirport":{"iataCode":"SFO"},
 "arrivalAirport":{"iataCode":"JFK"},"departureTime":"2024-10-14T08:30:00"}}
</script>"#;
        let messages = vec![
            RawMessage::new("a", "notifications@united.com", "Flight confirmation").with_html(html),
            RawMessage::new("b", "friend@example.org", "Hello").with_text("hi"),
            RawMessage::new("c", "notifications@united.com", "Flight confirmation").with_html(html),
        ];
        let report = Pipeline::new(&Config::default()).unwrap().run(&messages);

        let mut buf = Vec::new();
        assert_eq!(write_csv(&report, &mut buf).unwrap(), 2);
        let text = String::from_utf8(buf).unwrap();
        let text = text.strip_prefix('\u{feff}').unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].starts_with("1,true,a,"));
        assert!(lines[1].contains("ABCD12,UA123,SFO→JFK,2024-10-14 08:30,2024-10-14,\"Doe, Jane\""));
        assert!(lines[2].starts_with("1,false,c,"));
    }

    #[test]
    fn test_export_to_file() {
        let report = Pipeline::new(&Config::default()).unwrap().run(&[]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert_eq!(export_csv(&report, &path).unwrap(), 0);
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
    }
}
