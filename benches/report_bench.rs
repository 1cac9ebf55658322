use criterion::{criterion_group, criterion_main, Criterion};
use recipe_runner::core::report::{repair_stream, TestReport};
use std::hint::black_box;

/// A libtest stream with `suites` suites of `tests` tests each; every tenth
/// test fails.
fn synthetic_stream(suites: usize, tests: usize) -> String {
    let mut out = String::new();
    for s in 0..suites {
        out.push_str(&format!("{{ \"type\": \"suite\", \"event\": \"started\", \"test_count\": {tests} }}\n"));
        let mut failed = 0;
        for t in 0..tests {
            let name = format!("suite{s}::case{t}");
            out.push_str(&format!("{{ \"type\": \"test\", \"event\": \"started\", \"name\": \"{name}\" }}\n"));
            if t % 10 == 0 {
                failed += 1;
                out.push_str(&format!(
                    "{{ \"type\": \"test\", \"name\": \"{name}\", \"event\": \"failed\", \"stdout\": \"assertion failed at line {t}\\n\" }}\n"
                ));
            } else {
                out.push_str(&format!("{{ \"type\": \"test\", \"name\": \"{name}\", \"event\": \"ok\" }}\n"));
            }
        }
        out.push_str(&format!(
            "{{ \"type\": \"suite\", \"event\": \"ok\", \"passed\": {}, \"failed\": {failed}, \"ignored\": 0, \"measured\": 0, \"filtered_out\": 0, \"exec_time\": 1.5 }}\n",
            tests - failed
        ));
    }
    out
}

fn bench_report_processing(c: &mut Criterion) {
    let raw = synthetic_stream(20, 500);
    let repaired = repair_stream(&raw);

    c.bench_function("repair_stream", |b| {
        b.iter(|| repair_stream(black_box(&raw)));
    });

    c.bench_function("parse_and_summarize", |b| {
        b.iter(|| {
            let report = TestReport::from_json(black_box(&repaired)).unwrap();
            (report.stats(), report.fails().len())
        });
    });
}

criterion_group!(benches, bench_report_processing);
criterion_main!(benches);
