//! Upstream expansion stage for an `each` parameter: splits one input
//! tuple whose each-kind binding is a collection into one downstream
//! tuple per element, before the main operator ever assigns a tuple
//! index. See `SPEC_FULL.md` §4.9.
//!
//! Grounded on the same `mpsc`-relay shape `operator::Operator::run`
//! itself uses to drain and forward tuples; a single task reading one
//! channel and writing another is naturally `maxForks = 1` and closes
//! its output the moment the upstream tuple stream closes, which is
//! the behavior the teacher's pipeline stages get from plain channel
//! sequencing rather than an explicit concurrency guard.

use std::collections::BTreeMap;

use taskproc_types::{InputKind, ProcessDescriptor, Value};
use tokio::sync::mpsc;

/// The name of `descriptor`'s `each` input, if it declares one. A
/// descriptor declares at most one; only the first is honored if
/// somehow more are present.
pub fn each_param_name(descriptor: &ProcessDescriptor) -> Option<&str> {
    descriptor
        .inputs
        .iter()
        .find(|p| matches!(p.kind, InputKind::Each))
        .map(|p| p.name.as_str())
}

/// Relay `input_rx` into a freshly spawned channel, expanding
/// `each_param`'s bound collection 1→N along the way. `None` means the
/// process has no each parameter, so tuples pass through unchanged.
pub fn spawn_expansion(
    each_param: Option<String>,
    mut input_rx: mpsc::Receiver<BTreeMap<String, Value>>,
    buffer: usize,
) -> mpsc::Receiver<BTreeMap<String, Value>> {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(async move {
        while let Some(bindings) = input_rx.recv().await {
            match &each_param {
                Some(param) => {
                    let collection = bindings
                        .get(param)
                        .cloned()
                        .unwrap_or(Value::List(Vec::new()))
                        .into_collection();
                    for element in collection {
                        let mut expanded = bindings.clone();
                        expanded.insert(param.clone(), element);
                        if tx.send(expanded).await.is_err() {
                            return;
                        }
                    }
                }
                None => {
                    if tx.send(bindings).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskproc_id::ProcessId;
    use taskproc_types::{Arity, ErrorStrategy, HashingMode, InputParameter};

    fn descriptor_with(inputs: Vec<InputParameter>) -> ProcessDescriptor {
        ProcessDescriptor {
            id: ProcessId::from_raw(0),
            name: "each_proc".into(),
            inputs,
            outputs: vec![],
            command_template: String::new(),
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

    #[test]
    fn finds_the_each_param_by_kind() {
        let descriptor = descriptor_with(vec![
            InputParameter {
                name: "sample".into(),
                index: 0,
                kind: InputKind::Value,
                arity: Arity::ONE,
            },
            InputParameter {
                name: "chunk".into(),
                index: 1,
                kind: InputKind::Each,
                arity: Arity::ONE,
            },
        ]);
        assert_eq!(each_param_name(&descriptor), Some("chunk"));
    }

    #[test]
    fn no_each_param_returns_none() {
        let descriptor = descriptor_with(vec![InputParameter {
            name: "sample".into(),
            index: 0,
            kind: InputKind::Value,
            arity: Arity::ONE,
        }]);
        assert_eq!(each_param_name(&descriptor), None);
    }

    #[tokio::test]
    async fn expands_one_tuple_into_n_downstream_tuples() {
        let (tx, rx) = mpsc::channel(1);
        let mut expanded_rx = spawn_expansion(Some("chunk".to_string()), rx, 8);

        let mut bindings = BTreeMap::new();
        bindings.insert("sample".to_string(), Value::Str("s1".into()));
        bindings.insert(
            "chunk".to_string(),
            Value::List(vec![Value::Num(1.0), Value::Num(2.0), Value::Num(3.0)]),
        );
        tx.send(bindings).await.unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(tuple) = expanded_rx.recv().await {
            seen.push(tuple);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].get("sample"), Some(&Value::Str("s1".into())));
        assert_eq!(seen[0].get("chunk"), Some(&Value::Num(1.0)));
        assert_eq!(seen[2].get("chunk"), Some(&Value::Num(3.0)));
    }

    #[tokio::test]
    async fn no_each_param_passes_tuples_through_unchanged() {
        let (tx, rx) = mpsc::channel(1);
        let mut expanded_rx = spawn_expansion(None, rx, 8);

        let mut bindings = BTreeMap::new();
        bindings.insert("sample".to_string(), Value::Str("s1".into()));
        tx.send(bindings.clone()).await.unwrap();
        drop(tx);

        let tuple = expanded_rx.recv().await.unwrap();
        assert_eq!(tuple, bindings);
        assert!(expanded_rx.recv().await.is_none());
    }
}
