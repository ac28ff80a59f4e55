//! End-to-end coverage of the operator shell against the bundled local
//! backend: fair ordering, cache-hit short-circuiting, and collected
//! file outputs. See `SPEC_FULL.md` §8, properties 2 and 3.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use taskproc_engine::{Emission, LocalExecutor, Session, SessionConfig};
use taskproc_id::ProcessId;
use taskproc_types::{
    Arity, ErrorStrategy, HashingMode, InputKind, InputParameter, OutputKind, OutputParameter,
    OutputType, ProcessDescriptor, Value,
};

fn write_descriptor(fair: bool, command_template: &str) -> ProcessDescriptor {
    ProcessDescriptor {
        id: ProcessId::from_raw(0),
        name: "writer".into(),
        inputs: vec![InputParameter {
            name: "label".into(),
            index: 0,
            kind: InputKind::Value,
            arity: Arity::ONE,
        }],
        outputs: vec![OutputParameter {
            name: "out".into(),
            kind: OutputKind::File {
                pattern: "out.txt".into(),
                glob: false,
                output_type: OutputType::File,
                follow_links: false,
                hidden: false,
                max_depth: None,
            },
            arity: Arity::ONE,
            optional: false,
            include_inputs: false,
        }],
        command_template: command_template.into(),
        shell: "bash".into(),
        error_strategy: ErrorStrategy::Terminate,
        max_retries: 0,
        max_errors: None,
        max_forks: 0,
        array_size: 0,
        fair,
        hashing_mode: HashingMode::Standard,
        caching_enabled: true,
        resume_enabled: false,
        store_dir: None,
        guard: None,
    }
}

async fn run_labels(
    session: &Session,
    labels: &[&str],
    fair: bool,
    command_template: &str,
) -> (Vec<BTreeMap<String, Value>>, Option<taskproc_types::TaskFault>) {
    let executor = Arc::new(LocalExecutor::new(Duration::from_secs(5)));
    let operator = session.operator(write_descriptor(fair, command_template), executor);

    let (input_tx, input_rx) = tokio::sync::mpsc::channel(labels.len());
    let (output_tx, mut output_rx) = tokio::sync::mpsc::channel(labels.len());

    for label in labels {
        let mut bindings = BTreeMap::new();
        bindings.insert("label".to_string(), Value::Str(label.to_string()));
        input_tx.send(bindings).await.unwrap();
    }
    drop(input_tx);

    let handle = tokio::spawn(operator.run(input_rx, output_tx));

    let mut tuples = Vec::new();
    while let Some(emission) = output_rx.recv().await {
        match emission {
            Emission::Tuple(t) => tuples.push(t),
            Emission::Poison => break,
        }
    }
    let fault = handle.await.unwrap();
    (tuples, fault)
}

#[tokio::test]
async fn fair_process_preserves_input_order_despite_variable_runtime() {
    let cache_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let session = Session::init(SessionConfig::new(
        Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap(),
        Utf8PathBuf::from_path_buf(cache_dir.path().to_path_buf()).unwrap(),
    ))
    .unwrap();

    // Label "3" sleeps longest, "1" shortest; a fair process must still
    // emit 1, 2, 3 in that order.
    let (tuples, fault) = run_labels(
        &session,
        &["3", "1", "2"],
        true,
        "echo ${label} > out.txt; sleep 0.0${label}",
    )
    .await;
    assert!(fault.is_none());
    assert_eq!(tuples.len(), 3);

    let labels: Vec<String> = tuples
        .iter()
        .map(|t| match t.get("out") {
            Some(Value::Path(p)) => std::fs::read_to_string(p).unwrap().trim().to_string(),
            other => panic!("expected a path output, got {other:?}"),
        })
        .collect();
    assert_eq!(labels, vec!["3", "1", "2"]);
}

#[tokio::test]
async fn identical_tuples_land_in_the_same_work_dir_via_cache() {
    let cache_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let session = Session::init(SessionConfig::new(
        Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap(),
        Utf8PathBuf::from_path_buf(cache_dir.path().to_path_buf()).unwrap(),
    ))
    .unwrap();

    let (first, fault1) = run_labels(&session, &["same"], false, "echo ${label} > out.txt").await;
    assert!(fault1.is_none());
    let (second, fault2) = run_labels(&session, &["same"], false, "echo ${label} > out.txt").await;
    assert!(fault2.is_none());

    let first_path = match first[0].get("out") {
        Some(Value::Path(p)) => p.clone(),
        other => panic!("expected a path output, got {other:?}"),
    };
    let second_path = match second[0].get("out") {
        Some(Value::Path(p)) => p.clone(),
        other => panic!("expected a path output, got {other:?}"),
    };
    assert_eq!(first_path, second_path, "second submission should hit the cached work dir");
}

#[tokio::test]
async fn unfair_process_emits_in_completion_order() {
    let cache_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let session = Session::init(SessionConfig::new(
        Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap(),
        Utf8PathBuf::from_path_buf(cache_dir.path().to_path_buf()).unwrap(),
    ))
    .unwrap();

    // Label "3" sleeps longest, "1" shortest; with fairness off, output
    // arrives as tasks finish rather than in input order: 1, 2, 3.
    let (tuples, fault) = run_labels(
        &session,
        &["3", "1", "2"],
        false,
        "echo ${label} > out.txt; sleep 0.0${label}",
    )
    .await;
    assert!(fault.is_none());
    assert_eq!(tuples.len(), 3);

    let labels: Vec<String> = tuples
        .iter()
        .map(|t| match t.get("out") {
            Some(Value::Path(p)) => std::fs::read_to_string(p).unwrap().trim().to_string(),
            other => panic!("expected a path output, got {other:?}"),
        })
        .collect();
    assert_eq!(labels, vec!["1", "2", "3"]);
}

fn retry_descriptor() -> ProcessDescriptor {
    ProcessDescriptor {
        id: ProcessId::from_raw(0),
        name: "flaky".into(),
        inputs: vec![InputParameter {
            name: "marker".into(),
            index: 0,
            kind: InputKind::Value,
            arity: Arity::ONE,
        }],
        outputs: vec![OutputParameter {
            name: "out".into(),
            kind: OutputKind::File {
                pattern: "out.txt".into(),
                glob: false,
                output_type: OutputType::File,
                follow_links: false,
                hidden: false,
                max_depth: None,
            },
            arity: Arity::ONE,
            optional: false,
            include_inputs: false,
        }],
        command_template: "if [ -f ${marker} ]; then echo ok > out.txt; else touch ${marker}; exit 7; fi".into(),
        shell: "bash".into(),
        error_strategy: ErrorStrategy::Retry,
        max_retries: 2,
        max_errors: None,
        max_forks: 0,
        array_size: 0,
        fair: false,
        hashing_mode: HashingMode::Standard,
        caching_enabled: true,
        resume_enabled: false,
        store_dir: None,
        guard: None,
    }
}

#[tokio::test]
async fn transient_failure_retries_with_a_fresh_work_dir() {
    let cache_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let marker_dir = tempfile::tempdir().unwrap();
    let session = Session::init(SessionConfig::new(
        Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap(),
        Utf8PathBuf::from_path_buf(cache_dir.path().to_path_buf()).unwrap(),
    ))
    .unwrap();

    let marker = Utf8PathBuf::from_path_buf(marker_dir.path().join("seen")).unwrap();
    assert!(!marker.exists());

    let executor = Arc::new(LocalExecutor::new(Duration::from_secs(5)));
    let operator = session.operator(retry_descriptor(), executor);

    let (input_tx, input_rx) = tokio::sync::mpsc::channel(1);
    let (output_tx, mut output_rx) = tokio::sync::mpsc::channel(1);

    let mut bindings = BTreeMap::new();
    bindings.insert("marker".to_string(), Value::Str(marker.to_string()));
    input_tx.send(bindings).await.unwrap();
    drop(input_tx);

    let handle = tokio::spawn(operator.run(input_rx, output_tx));

    let mut tuples = Vec::new();
    while let Some(emission) = output_rx.recv().await {
        match emission {
            Emission::Tuple(t) => tuples.push(t),
            Emission::Poison => break,
        }
    }
    let fault = handle.await.unwrap();
    assert!(fault.is_none(), "retry should recover within max_retries");
    assert_eq!(tuples.len(), 1);

    let content = match tuples[0].get("out") {
        Some(Value::Path(p)) => std::fs::read_to_string(p).unwrap(),
        other => panic!("expected a path output, got {other:?}"),
    };
    assert_eq!(content.trim(), "ok");
}

fn each_descriptor() -> ProcessDescriptor {
    ProcessDescriptor {
        id: ProcessId::from_raw(0),
        name: "each_proc".into(),
        inputs: vec![
            InputParameter {
                name: "x".into(),
                index: 0,
                kind: InputKind::Value,
                arity: Arity::ONE,
            },
            InputParameter {
                name: "y".into(),
                index: 1,
                kind: InputKind::Each,
                arity: Arity::ONE,
            },
        ],
        outputs: vec![OutputParameter {
            name: "out".into(),
            kind: OutputKind::Stdout,
            arity: Arity::ONE,
            optional: false,
            include_inputs: false,
        }],
        command_template: "echo ${x}-${y}".into(),
        shell: "bash".into(),
        error_strategy: ErrorStrategy::Terminate,
        max_retries: 0,
        max_errors: None,
        max_forks: 0,
        array_size: 0,
        fair: false,
        hashing_mode: HashingMode::Standard,
        caching_enabled: true,
        resume_enabled: false,
        store_dir: None,
        guard: None,
    }
}

#[tokio::test]
async fn each_parameter_expands_one_tuple_into_n_tasks() {
    let cache_dir = tempfile::tempdir().unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let session = Session::init(SessionConfig::new(
        Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap(),
        Utf8PathBuf::from_path_buf(cache_dir.path().to_path_buf()).unwrap(),
    ))
    .unwrap();

    let executor = Arc::new(LocalExecutor::new(Duration::from_secs(5)));
    let operator = session.operator(each_descriptor(), executor);

    let (input_tx, input_rx) = tokio::sync::mpsc::channel(8);
    let (output_tx, mut output_rx) = tokio::sync::mpsc::channel(8);

    for x in ["a", "b", "c"] {
        let mut bindings = BTreeMap::new();
        bindings.insert("x".to_string(), Value::Str(x.to_string()));
        bindings.insert(
            "y".to_string(),
            Value::List(vec![Value::Num(10.0), Value::Num(20.0)]),
        );
        input_tx.send(bindings).await.unwrap();
    }
    drop(input_tx);

    let handle = tokio::spawn(operator.run(input_rx, output_tx));

    let mut pairs = Vec::new();
    while let Some(emission) = output_rx.recv().await {
        match emission {
            Emission::Tuple(t) => {
                if let Some(Value::Path(p)) = t.get("out") {
                    pairs.push(std::fs::read_to_string(p).unwrap().trim().to_string());
                }
            }
            Emission::Poison => break,
        }
    }
    let fault = handle.await.unwrap();
    assert!(fault.is_none());

    // One tuple per x times the y collection: a-10, a-20, b-10, b-20,
    // c-10, c-20 — six distinct tasks from three input tuples.
    pairs.sort();
    assert_eq!(
        pairs,
        vec!["a-10", "a-20", "b-10", "b-20", "c-10", "c-20"]
    );
}
