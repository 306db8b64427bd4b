use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use funcsuite::core::spec::{CodeLocation, Failure, SpecState, SpecSummary, SuiteSummary};
use funcsuite::reporters::xunit::{self, TestCase};

fn cases(count: usize) -> Vec<TestCase> {
    (0..count)
        .map(|i| {
            let (state, failure) = if i % 10 == 0 {
                (
                    SpecState::Failed,
                    Some(Failure::new(
                        format!("expected <{}> to equal \"ok\"", i),
                        CodeLocation { file: "templates.rs".to_string(), line: 42 },
                    )),
                )
            } else {
                (SpecState::Passed, None)
            };
            let spec = SpecSummary {
                component_texts: vec![format!("Template t{}.yaml", i), "should parse".to_string()],
                state,
                run_time: Duration::from_micros(i as u64),
                failure,
                skip_reason: None,
                slow: false,
                location: CodeLocation { file: "templates.rs".to_string(), line: 1 },
            };
            TestCase::from_spec(&spec, "Functional test suite")
        })
        .collect()
}

fn report_rendering_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("xunit_rendering");
    group.measurement_time(Duration::from_secs(5));

    let summary = SuiteSummary::new("Functional test suite", 0, 1000, 1000);
    let small = cases(50);
    let large = cases(1000);
    let properties = vec![
        ("polarion-project-id".to_string(), "CNV".to_string()),
        ("polarion-lookup-method".to_string(), "id".to_string()),
    ];

    group.bench_function("junit_50_cases", |b| {
        b.iter(|| black_box(xunit::render_suite(&summary, black_box(&small))))
    });

    group.bench_function("junit_1000_cases", |b| {
        b.iter(|| black_box(xunit::render_suite(&summary, black_box(&large))))
    });

    group.bench_function("polarion_1000_cases", |b| {
        b.iter(|| black_box(xunit::render_suites(&summary, black_box(&large), &properties)))
    });

    group.bench_function("escape", |b| {
        b.iter(|| black_box(xunit::escape(black_box("a <b> & \"c\" 'd' plain text tail"))))
    });

    group.finish();
}

criterion_group!(benches, report_rendering_benchmark);
criterion_main!(benches);
