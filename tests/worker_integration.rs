//! End-to-end runs of the classification worker against a scripted tool.
//!
//! The tool is `/bin/sh`; since the first argument of every invocation is
//! `run`, sh executes the script named `run` in the working directory. The
//! remaining arguments (`program:...`, `--deps...`) become `$1..$6`.

#![cfg(unix)]

use dnn_desktop::system::registry::RegisteredProcess;
use dnn_desktop::{
    AppConfig, ClassificationWorker, Dataset, ImageResult, Interruption, Model, ProcessRegistry,
    Program, ResultSink, RunOutcome, WorkerError, WorkerErrorKind, WorkerEvent, WorkerTimings,
};
use std::fs;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CLASSIFIER_EXE: &str = "dnn-desktop-test-classifier";

fn fast_timings() -> WorkerTimings {
    WorkerTimings {
        poll_interval: Duration::from_millis(10),
        kill_wait: Duration::from_secs(5),
    }
}

fn setup(script: &str) -> (TempDir, AppConfig) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("run"), script).unwrap();
    let config = AppConfig {
        ck_exe_name: "/bin/sh".to_string(),
        ck_bin_path: dir.path().to_string_lossy().to_string(),
        classification_startup_timeout_seconds: 10,
        ..AppConfig::default()
    };
    (dir, config)
}

fn program(output_file: &str) -> Program {
    Program {
        uoa: "caffe-classification".to_string(),
        title: "Caffe".to_string(),
        exe: CLASSIFIER_EXE.to_string(),
        output_file: output_file.to_string(),
    }
}

fn worker(config: &AppConfig, output_file: &str) -> (ClassificationWorker, Arc<ProcessRegistry>) {
    let registry = Arc::new(ProcessRegistry::new());
    let worker = ClassificationWorker::new(
        config,
        program(output_file),
        Model {
            uoa: "bvlc-alexnet".to_string(),
            title: "AlexNet".to_string(),
        },
        Dataset {
            aux_uoa: "imagenet-aux".to_string(),
            val_uoa: "imagenet-val".to_string(),
            title: "ImageNet".to_string(),
        },
        1,
    )
    .with_timings(fast_timings())
    .with_registry(Arc::clone(&registry));
    (worker, registry)
}

fn images(events: &[WorkerEvent]) -> Vec<&ImageResult> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::ImageResult(r) => Some(r),
            _ => None,
        })
        .collect()
}

fn errors(events: &[WorkerEvent]) -> Vec<(WorkerErrorKind, &str)> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::Error { kind, message } => Some((*kind, message.as_str())),
            _ => None,
        })
        .collect()
}

/// Forwards events to the test thread as they happen.
struct ChannelSink(mpsc::Sender<WorkerEvent>);

impl ResultSink for ChannelSink {
    fn image_result(&mut self, result: ImageResult) {
        let _ = self.0.send(WorkerEvent::ImageResult(result));
    }

    fn error(&mut self, error: WorkerError) {
        let _ = self.0.send(WorkerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn stopped(&mut self, outcome: RunOutcome) {
        let _ = self.0.send(WorkerEvent::Stopped(outcome));
    }
}

#[test]
fn test_streams_records_in_order() {
    let (_dir, config) = setup(
        r#"
printf 'File: a.jpg\nDuration: 0.5 sec\nCorrect label: cat\nPredictions: 2\n0.9 - "cat"\n0.1 - "dog"\n\n' > out.txt
sleep 0.2
printf 'File: b.jpg\nDuration: 0.25 sec\n' >> out.txt
sleep 0.2
printf 'Correct label: owl\nPredictions: 2\n0.7 - "cat"\n0.2 - "owl"' >> out.txt
"#,
    );
    let (worker, _registry) = worker(&config, "out.txt");
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    let outcome = worker.run(&mut events, &interruption);

    assert_eq!(outcome, RunOutcome::Completed { images: 2 });
    assert!(errors(&events).is_empty(), "unexpected errors: {:?}", errors(&events));

    let results = images(&events);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].image_file, "a.jpg");
    assert_eq!(results[0].duration, 0.5);
    assert_eq!(results[0].predictions.len(), 2);
    assert!(results[0].predictions[0].is_correct);

    // second record had no terminating blank line and no final newline
    assert_eq!(results[1].image_file, "b.jpg");
    assert_eq!(results[1].correct_label, "owl");
    assert_eq!(results[1].predictions.len(), 2);
    assert!(!results[1].predictions[0].is_correct);
    assert!(results[1].predictions[1].is_correct);

    assert_eq!(events.last(), Some(&WorkerEvent::Stopped(outcome)));
}

#[test]
fn test_receives_tool_arguments() {
    let (dir, config) = setup(r#"printf '%s\n' "$@" > args.txt; printf 'File: a.jpg\n\n' > out.txt"#);
    let (worker, _registry) = worker(&config, "out.txt");
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    worker.run(&mut events, &interruption);

    let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        args,
        vec![
            "program:caffe-classification",
            "--cmd_key=use_continuous",
            "--deps.caffemodel=bvlc-alexnet",
            "--deps.imagenet-aux=imagenet-aux",
            "--deps.imagenet-val=imagenet-val",
            "--env.CK_CAFFE_BATCH_SIZE=1",
        ]
    );
}

#[test]
fn test_malformed_prediction_is_skipped() {
    let (_dir, config) = setup(
        r#"printf 'File: a.jpg\nCorrect label: cat\nPredictions: 3\n0.6 - "cat"\nnot a prediction\n0.1 - "dog"\n\nFile: b.jpg\n\n' > out.txt"#,
    );
    let (worker, _registry) = worker(&config, "out.txt");
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    worker.run(&mut events, &interruption);

    let results = images(&events);
    assert_eq!(results.len(), 2);
    let labels: Vec<_> = results[0].predictions.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["cat", "dog"]);
    assert_eq!(results[1].image_file, "b.jpg");
}

#[test]
fn test_premature_exit_reports_command() {
    let (dir, config) = setup("exit 2\n");
    // a leftover file from an earlier run must not count as output
    fs::write(dir.path().join("out.txt"), "File: stale.jpg\n\n").unwrap();
    let (worker, _registry) = worker(&config, "out.txt");
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    let outcome = worker.run(&mut events, &interruption);

    assert_eq!(outcome, RunOutcome::Failed { images: 0 });
    assert!(images(&events).is_empty());
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].0, WorkerErrorKind::PrematureExit);
    assert!(errs[0].1.contains("/bin/sh run program:caffe-classification --cmd_key=use_continuous"));
    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn test_startup_timeout_kills_tool() {
    let (_dir, config) = setup("exec sleep 30\n");
    let (worker, registry) = worker(&config, "out.txt");
    let worker = worker.with_startup_timeout(Duration::from_millis(200));
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    let started = Instant::now();
    let outcome = worker.run(&mut events, &interruption);

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome, RunOutcome::Failed { images: 0 });
    assert!(images(&events).is_empty());
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].0, WorkerErrorKind::StartupTimeout);
    assert!(errs[0].1.contains("(over 0.2 s)"), "message was: {}", errs[0].1);

    let pid = tool_pid(&registry);
    assert!(!is_alive(pid));
}

#[test]
fn test_interruption_mid_stream_flushes_and_kills() {
    let (_dir, config) = setup(
        r#"
printf 'File: a.jpg\nDuration: 0.1 sec\n\nFile: b.jpg\nDuration: 0.2 sec\n' > out.txt
exec sleep 30
"#,
    );
    let (worker, registry) = worker(&config, "out.txt");
    let (cancel_tx, interruption) = Interruption::channel();
    let (tx, rx) = mpsc::channel();

    let handle = worker.spawn(ChannelSink(tx), interruption).unwrap();

    let first = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    match first {
        WorkerEvent::ImageResult(r) => assert_eq!(r.image_file, "a.jpg"),
        other => panic!("Unexpected event: {:?}", other),
    }
    // let the worker drain the rest of the file before stopping it
    std::thread::sleep(Duration::from_millis(300));
    let stop_requested = Instant::now();
    cancel_tx.send(true).unwrap();

    let second = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    match second {
        WorkerEvent::ImageResult(r) => {
            assert_eq!(r.image_file, "b.jpg");
            assert_eq!(r.duration, 0.2);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
    let stopped = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(stopped, WorkerEvent::Stopped(RunOutcome::Interrupted { images: 2 }));
    assert!(stop_requested.elapsed() < Duration::from_secs(5));

    assert_eq!(handle.join().unwrap(), RunOutcome::Interrupted { images: 2 });
    assert!(!is_alive(tool_pid(&registry)));
}

#[test]
fn test_missing_bin_path_is_reported_but_run_continues() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.txt");
    let config = AppConfig {
        ck_exe_name: "/bin/sh".to_string(),
        ck_bin_path: String::new(),
        ..AppConfig::default()
    };
    let (worker, _registry) = worker(&config, &out.to_string_lossy());
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    // without a working directory sh looks for `run` in the test's cwd and fails
    let outcome = worker.run(&mut events, &interruption);

    let errs = errors(&events);
    assert_eq!(errs[0].0, WorkerErrorKind::MissingConfig);
    assert!(errs[0].1.contains("bin path"));
    // the run was still attempted and failed on its own terms
    assert_eq!(errs[1].0, WorkerErrorKind::PrematureExit);
    assert_eq!(outcome, RunOutcome::Failed { images: 0 });
}

#[test]
fn test_registry_records_tool_and_classifier() {
    let (_dir, config) = setup("printf 'File: a.jpg\\n\\n' > out.txt\n");
    let (worker, registry) = worker(&config, "out.txt");
    let (_tx, interruption) = Interruption::channel();
    let mut events: Vec<WorkerEvent> = Vec::new();

    worker.run(&mut events, &interruption);

    let entries = registry.entries();
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[0], RegisteredProcess::Pid { signalled: true, .. }));
    assert_eq!(entries[1], RegisteredProcess::Name(CLASSIFIER_EXE.to_string()));
}

fn tool_pid(registry: &ProcessRegistry) -> u32 {
    registry
        .entries()
        .iter()
        .find_map(|e| match e {
            RegisteredProcess::Pid { pid, .. } => Some(*pid),
            _ => None,
        })
        .expect("tool pid registered")
}

fn is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    // reaped children are gone entirely; signal 0 only probes
    kill(Pid::from_raw(pid as i32), None).is_ok()
}
