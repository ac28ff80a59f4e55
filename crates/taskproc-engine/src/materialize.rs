use std::collections::BTreeMap;

use camino::Utf8Path;
use taskproc_id::{TaskId, TupleIndex};
use taskproc_types::{ProcessDescriptor, Task, Value};

use crate::staging::{self, StagingError};

/// What the materializer produced for one tuple: either a real task
/// ready for cache/work-dir coordination, or one the `when` guard
/// rejected outright (finalized immediately, never submitted).
pub enum MaterializeOutcome {
    Run(Task),
    GuardSkipped(Task),
}

/// Build a [`Task`] from a process descriptor and one input tuple:
/// evaluate the guard, run input staging, and resolve the command
/// template against the resulting context.
///
/// Staged file targets are rooted at `.` here because the real work
/// directory does not exist yet — it is created during cache/work-dir
/// coordination. `task.stage_map` only records stage *names* at this
/// point; `staging::place_files` physically copies/writes them under the
/// real work directory once one exists.
pub fn materialize(
    descriptor: &ProcessDescriptor,
    task_id: TaskId,
    tuple_index: TupleIndex,
    bindings: BTreeMap<String, Value>,
    is_foreign: impl Fn(&Utf8Path) -> bool,
) -> Result<MaterializeOutcome, StagingError> {
    let staged = staging::stage_inputs(descriptor, &bindings, Utf8Path::new("."), is_foreign)?;

    let mut task = Task::new(task_id, descriptor.id, tuple_index, bindings);
    task.context = staged.context;
    for holder in staged.files {
        task.stage_map.insert(holder.stage_name.clone(), holder);
    }
    task.resolved_command = resolve_template(&descriptor.command_template, &task.context);

    if let Some(guard_key) = &descriptor.guard {
        if task.context.get(guard_key) == Some(&Value::Bool(false)) {
            return Ok(MaterializeOutcome::GuardSkipped(task));
        }
    }

    Ok(MaterializeOutcome::Run(task))
}

/// Minimal `${name}` substitution against the task context. Unresolved
/// names are left blank rather than failing the whole command, mirroring
/// how a missing optional output still lets a process finish.
fn resolve_template(template: &str, context: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let replacement = context
                    .get(name)
                    .map(Value::literal_content)
                    .unwrap_or_default();
                out.push_str(&replacement);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskproc_id::{ProcessId, TaskId, TupleIndex};
    use taskproc_types::{Arity, ErrorStrategy, HashingMode, InputKind, InputParameter};

    fn descriptor() -> ProcessDescriptor {
        ProcessDescriptor {
            id: ProcessId::from_raw(0),
            name: "align".into(),
            inputs: vec![InputParameter {
                name: "sample".into(),
                index: 0,
                kind: InputKind::Value,
                arity: Arity::ONE,
            }],
            outputs: vec![],
            command_template: "run ${sample} --mode standard".into(),
            shell: "/bin/bash".into(),
            error_strategy: ErrorStrategy::Terminate,
            max_retries: 0,
            max_errors: None,
            max_forks: 0,
            array_size: 0,
            fair: true,
            hashing_mode: HashingMode::Standard,
            caching_enabled: true,
            resume_enabled: false,
            store_dir: None,
            guard: None,
        }
    }

    #[test]
    fn resolves_template_from_context() {
        let descriptor = descriptor();
        let mut bindings = BTreeMap::new();
        bindings.insert("sample".to_string(), Value::Str("s1".into()));
        let outcome = materialize(
            &descriptor,
            TaskId::from_raw(0),
            TupleIndex::from_raw(0),
            bindings,
            |_| false,
        )
        .unwrap();
        match outcome {
            MaterializeOutcome::Run(task) => {
                assert_eq!(task.resolved_command, "run s1 --mode standard");
            }
            MaterializeOutcome::GuardSkipped(_) => panic!("expected a runnable task"),
        }
    }

    #[test]
    fn guard_false_skips_the_task() {
        let mut descriptor = descriptor();
        descriptor.guard = Some("enabled".to_string());
        descriptor.inputs.push(InputParameter {
            name: "enabled".into(),
            index: 1,
            kind: InputKind::Value,
            arity: Arity::ONE,
        });

        let mut bindings = BTreeMap::new();
        bindings.insert("sample".to_string(), Value::Str("s1".into()));
        bindings.insert("enabled".to_string(), Value::Bool(false));

        let outcome = materialize(
            &descriptor,
            TaskId::from_raw(0),
            TupleIndex::from_raw(0),
            bindings,
            |_| false,
        )
        .unwrap();
        assert!(matches!(outcome, MaterializeOutcome::GuardSkipped(_)));
    }
}
