use activity_harness::prelude::*;
use activity_harness::training::{DecisionTreeConfig, KnnConfig, RandomForestConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n_rows);
    let mut labels = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        let label = (i % 2) as i64;
        let shift = label as f64 * 1.5;
        rows.push((0..n_features).map(|_| rng.gen::<f64>() * 2.0 + shift).collect());
        labels.push(label);
    }

    Dataset::from_rows(rows, labels).unwrap()
}

fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .with(ModelSpec::from_family("knn", ModelFamily::Knn(KnnConfig::default()), 42))
        .unwrap()
        .with(ModelSpec::from_family(
            "tree",
            ModelFamily::DecisionTree(DecisionTreeConfig::default()),
            42,
        ))
        .unwrap()
        .with(ModelSpec::from_family(
            "forest",
            ModelFamily::RandomForest(RandomForestConfig {
                n_estimators: 20,
                ..Default::default()
            }),
            42,
        ))
        .unwrap()
}

fn bench_orchestration(c: &mut Criterion) {
    let mut group = c.benchmark_group("orchestration");
    group.sample_size(10); // Fewer samples for training benchmarks

    let registry = registry();
    for n_rows in [200, 1000].iter() {
        let dataset = create_classification_data(*n_rows, 10);
        let (train, test) = train_test_split(&dataset, 0.2, 42).unwrap();

        for parallel in [false, true] {
            let orchestrator =
                TrainingOrchestrator::new(OrchestratorConfig::default().with_parallel(parallel));
            let label = if parallel { "parallel" } else { "sequential" };

            group.bench_with_input(BenchmarkId::new(label, n_rows), &dataset, |b, _| {
                b.iter(|| orchestrator.run(black_box(&registry), &train, &test).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let dataset = create_classification_data(200, 10);
    let (train, test) = train_test_split(&dataset, 0.2, 42).unwrap();
    let run = TrainingOrchestrator::default().run(&registry(), &train, &test).unwrap();

    c.bench_function("select_and_render", |b| {
        b.iter(|| {
            let selection = ModelSelector::default().select(black_box(&run)).unwrap();
            ReportGenerator::new().render_with_selection(run.reports(), &selection)
        })
    });
}

criterion_group!(benches, bench_orchestration, bench_selection);
criterion_main!(benches);
