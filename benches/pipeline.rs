use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use flightmail::config::Config;
use flightmail::grouper::{GroupInput, Grouper};
use flightmail::model::flight::{FlightRecord, Strategy};
use flightmail::model::message::RawMessage;
use flightmail::pipeline::Pipeline;

fn fixture_messages() -> Vec<RawMessage> {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("bookings.mbox");
    flightmail::ingest::read_path(&fixture_path, None)
        .unwrap()
        .into_iter()
        .map(|m| m.message)
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let messages = fixture_messages();
    let pipeline = Pipeline::new(&Config::default()).unwrap();

    c.bench_function("classify_fixture", |b| {
        b.iter(|| {
            messages
                .iter()
                .filter(|m| pipeline.classifier().classify(m).is_confirmation)
                .count()
        })
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let messages = fixture_messages();
    let pipeline = Pipeline::new(&Config::default()).unwrap();

    c.bench_function("run_fixture", |b| b.iter(|| pipeline.run(&messages).stats));
}

fn bench_group(c: &mut Criterion) {
    // Sequential references, so many pairs fall inside the fuzzy edit budget.
    let mut inputs = Vec::new();
    for i in 0..2000u32 {
        let mut record = FlightRecord::new(Strategy::TableLayout);
        record.booking_reference = Some(format!("BK{i:04}X"));
        record.flight_number = Some(format!("UA{}", i % 700));
        record.travel_date = chrono::NaiveDate::from_ymd_opt(2024, 1 + i % 12, 1 + i % 28);
        inputs.push(GroupInput::new(format!("m{i}"), Some(record.clone())));
        if i % 4 == 0 {
            record.booking_reference = Some(format!("BK{i:04}Y"));
            inputs.push(GroupInput::new(format!("d{i}"), Some(record)));
        }
    }
    let grouper = Grouper::new(&Config::default().grouping);

    c.bench_function("group_2500", |b| b.iter(|| grouper.group(&inputs).len()));
}

criterion_group!(benches, bench_classify, bench_pipeline, bench_group);
criterion_main!(benches);
