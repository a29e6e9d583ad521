use chrono::Utc;
use ldbench_runner::fakes::FakeCapturer;
use ldbench_runner::{
    delete_experiments, run_experiments, BenchError, ExperimentResult, Metrics, ResultStore,
    RunOptions, RunPlan,
};
use std::fs;
use std::path::PathBuf;

struct TempDb {
    root: PathBuf,
    path: PathBuf,
}

impl TempDb {
    fn new(tag: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "ldbench_it_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&root).expect("temp dir");
        let path = root.join("results.json");
        Self { root, path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn options(configs: &[(&str, &str)], repetitions: usize) -> RunOptions {
    RunOptions {
        configurations: configs
            .iter()
            .map(|(n, s)| (n.to_string(), s.to_string()))
            .collect(),
        repetitions,
        command: vec!["./workload".to_string()],
        ..RunOptions::default()
    }
}

fn seeded_result(name: &str) -> ExperimentResult {
    ExperimentResult::new(
        name,
        Metrics {
            real: 9.0,
            user: 8.0,
            sys: 1.0,
            mem_total_avg: 0,
            mem_max: 4096,
            exit: 0,
        },
    )
}

#[test]
fn second_invocation_runs_nothing_once_target_is_met() {
    let db = TempDb::new("idempotent");
    let opts = options(&[("none", ""), ("shadow", "malloc-shadow.so")], 3);

    let mut first = FakeCapturer::new();
    let summary = run_experiments(&opts, &db.path, &mut first).expect("first run");
    assert_eq!(summary.executed, 6);

    let mut second = FakeCapturer::new();
    let summary = run_experiments(&opts, &db.path, &mut second).expect("second run");
    assert_eq!(summary.scheduled, 0);
    assert!(second.invocations.is_empty());
    assert_eq!(ResultStore::open(&db.path).expect("reload").len(), 6);
}

#[test]
fn raising_the_target_tops_up_exactly_the_difference() {
    let db = TempDb::new("topup");
    let mut store = ResultStore::new();
    for _ in 0..3 {
        store.insert(seeded_result("foo"));
    }
    store.insert(seeded_result("retired"));
    store.sync(&db.path).expect("seed");

    let opts = options(&[("foo", "a.so\tb.so"), ("bar", "c.so x=y z=123")], 5);
    let mut capturer = FakeCapturer::new();
    let summary = run_experiments(&opts, &db.path, &mut capturer).expect("run");
    assert_eq!(summary.executed, 7);
    assert_eq!(summary.stored, 11);

    let foo_calls: Vec<_> = capturer
        .invocations
        .iter()
        .filter(|c| c.env.get("LD_PRELOAD").map(String::as_str) == Some("a.so b.so"))
        .collect();
    assert_eq!(foo_calls.len(), 2);
    let bar_calls: Vec<_> = capturer
        .invocations
        .iter()
        .filter(|c| c.env.get("LD_PRELOAD").map(String::as_str) == Some("c.so"))
        .collect();
    assert_eq!(bar_calls.len(), 5);
    for call in bar_calls {
        assert_eq!(call.env.get("x").map(String::as_str), Some("y"));
        assert_eq!(call.env.get("z").map(String::as_str), Some("123"));
    }

    let reloaded = ResultStore::open(&db.path).expect("reload");
    assert_eq!(reloaded.count_name("foo"), 5);
    assert_eq!(reloaded.count_name("bar"), 5);
    assert_eq!(reloaded.count_name("retired"), 1);
    let first: Vec<&str> = reloaded.all().take(4).map(|r| r.name.as_str()).collect();
    assert_eq!(first, vec!["foo", "foo", "foo", "retired"]);
}

#[test]
fn crash_after_n_items_leaves_exactly_n_results_and_resume_completes() {
    let db = TempDb::new("crash");
    let opts = options(&[("a", "a.so"), ("b", "b.so")], 4);

    let mut broken = FakeCapturer::failing_after(3);
    let err = run_experiments(&opts, &db.path, &mut broken).expect_err("facility breaks");
    assert!(matches!(err, BenchError::MeasurementFacility(_)));

    let after_crash = ResultStore::open(&db.path).expect("reload");
    assert_eq!(after_crash.len(), 3);
    let reals: Vec<f64> = after_crash.all().map(|r| r.real).collect();
    assert_eq!(reals, vec![1.0, 2.0, 3.0]);

    let mut healthy = FakeCapturer::new();
    let summary = run_experiments(&opts, &db.path, &mut healthy).expect("resume");
    assert_eq!(summary.executed, 5);

    let done = ResultStore::open(&db.path).expect("reload");
    assert_eq!(done.count_name("a"), 4);
    assert_eq!(done.count_name("b"), 4);
}

#[test]
fn malformed_database_stops_before_any_measurement() {
    let db = TempDb::new("malformed");
    fs::write(&db.path, r#"[{"name": "x"}]"#).expect("seed");

    let mut capturer = FakeCapturer::new();
    let err = run_experiments(&options(&[("a", "")], 1), &db.path, &mut capturer)
        .expect_err("malformed");
    assert!(matches!(err, BenchError::MalformedStore { .. }), "{}", err);
    assert!(capturer.invocations.is_empty());
    assert_eq!(
        fs::read_to_string(&db.path).expect("unchanged"),
        r#"[{"name": "x"}]"#
    );
}

#[test]
fn dry_plan_reflects_store_without_touching_it() {
    let db = TempDb::new("plan");
    let mut store = ResultStore::new();
    store.insert(seeded_result("a"));
    let plan = RunPlan::from_options(&options(&[("a", "a.so"), ("b", "")], 2), &store)
        .expect("plan");
    assert_eq!(plan.schedule.len(), 3);
    assert!(!db.path.exists());
}

#[test]
fn glob_delete_removes_only_matching_experiments() {
    let db = TempDb::new("delete");
    let mut store = ResultStore::new();
    for name in ["foo-1", "foo-2", "bar-1"] {
        store.insert(seeded_result(name));
    }
    store.sync(&db.path).expect("seed");

    assert_eq!(delete_experiments(&db.path, &["foo-*"]).expect("delete"), 2);
    let names: Vec<String> = ResultStore::open(&db.path)
        .expect("reload")
        .all()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(names, vec!["bar-1"]);

    assert_eq!(delete_experiments(&db.path, &["nothing*"]).expect("noop"), 0);
}
