//! Two-pass input staging: non-file values resolve into the task context
//! first, then file parameters are normalized into `FileHolder`s with
//! wildcard expansion, arity checks, and collision detection.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use taskproc_types::{FileHolder, FileOrigin, InputKind, InputParameter, ProcessDescriptor, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("input `{param}` expects {min}..={max} files, got {got}")]
    Arity {
        param: String,
        min: usize,
        max: usize,
        got: usize,
    },
    #[error("staged file name collision: {0:?}")]
    Collision(Vec<String>),
    #[error("failed to place staged file at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct StagedInputs {
    pub context: BTreeMap<String, Value>,
    pub files: Vec<FileHolder>,
    /// Source paths that must be prefetched by the external file porter
    /// before the task can be submitted.
    pub foreign_sources: Vec<Utf8PathBuf>,
}

/// Stage every input of `descriptor` against `bindings`. `is_foreign`
/// judges whether a path lives on a filesystem the executor cannot see
/// directly (see `SPEC_FULL.md` §6's Executor contract).
pub fn stage_inputs(
    descriptor: &ProcessDescriptor,
    bindings: &BTreeMap<String, Value>,
    stage_dir: &camino::Utf8Path,
    is_foreign: impl Fn(&camino::Utf8Path) -> bool,
) -> Result<StagedInputs, StagingError> {
    let mut context = BTreeMap::new();

    // Pass 1: non-file values resolve directly into context.
    for param in &descriptor.inputs {
        if param.is_file_like() {
            continue;
        }
        if let Some(value) = bindings.get(&param.name) {
            context.insert(param.name.clone(), value.clone());
        }
    }

    // Pass 2: deferred file parameters.
    let mut files = Vec::new();
    let mut foreign_sources = Vec::new();

    for param in &descriptor.inputs {
        let InputKind::File { staging_name, .. } = &param.kind else {
            continue;
        };
        let collection = bindings
            .get(&param.name)
            .cloned()
            .unwrap_or(Value::List(Vec::new()))
            .into_collection();

        if !param.arity.contains(collection.len()) {
            return Err(StagingError::Arity {
                param: param.name.clone(),
                min: param.arity.min,
                max: param.arity.max,
                got: collection.len(),
            });
        }

        let mut staged_values = Vec::with_capacity(collection.len());
        for (index, value) in collection.iter().enumerate() {
            let stage_name = expand_template(staging_name, collection.len(), index);
            let staged = stage_dir.join(&stage_name);

            let holder = match value {
                Value::Path(source) => {
                    if is_foreign(source) {
                        foreign_sources.push(source.clone());
                        FileHolder::foreign(source.clone(), staged, stage_name.clone())
                    } else {
                        FileHolder::local(source.clone(), staged, stage_name.clone())
                    }
                }
                other => FileHolder::synthetic(staged, stage_name.clone(), other.literal_content()),
            };
            staged_values.push(Value::Path(Utf8PathBuf::from(stage_name)));
            files.push(holder);
        }

        // Commands reference the staged file name, not the original bound
        // value, so the context entry for a file parameter points at
        // where the file will actually live under the work directory.
        let context_value = if param.arity.max == 1 && staged_values.len() == 1 {
            staged_values.into_iter().next().unwrap()
        } else {
            Value::List(staged_values)
        };
        context.insert(param.name.clone(), context_value);
    }

    let mut names: Vec<&str> = files.iter().map(|f| f.stage_name.as_str()).collect();
    names.sort_unstable();
    let mut collisions = Vec::new();
    for window in names.windows(2) {
        if window[0] == window[1] && !collisions.contains(&window[0].to_string()) {
            collisions.push(window[0].to_string());
        }
    }
    if !collisions.is_empty() {
        return Err(StagingError::Collision(collisions));
    }

    Ok(StagedInputs {
        context,
        files,
        foreign_sources,
    })
}

/// Physically place every staged file under the task's real work
/// directory: copy local/foreign sources in, and write synthetic content
/// out to a fresh file. `stage_inputs` only computes stage *names*
/// (rooted at `.` because the work dir doesn't exist yet, see
/// `materialize::materialize`); this is the step that actually populates
/// them once `coordinate::coordinate` has produced a real directory.
/// Skipped entirely on a cache hit, since the cached work dir is reused
/// as-is.
pub fn place_files<'a>(
    files: impl IntoIterator<Item = &'a FileHolder>,
    work_dir: &camino::Utf8Path,
) -> Result<(), StagingError> {
    for holder in files {
        let target = work_dir.join(&holder.stage_name);
        match holder.origin {
            FileOrigin::Synthetic => {
                let content = holder.content.as_deref().unwrap_or_default();
                std::fs::write(target.as_std_path(), content).map_err(|source| StagingError::Io {
                    path: target,
                    source,
                })?;
            }
            // Foreign sources are assumed already prefetched to `source`
            // by the external file porter (SPEC_FULL.md §6, an
            // out-of-scope collaborator); this bundled repo ships no
            // porter, so both origins place the same way.
            FileOrigin::Local | FileOrigin::Foreign => {
                std::fs::copy(holder.source.as_std_path(), target.as_std_path()).map_err(|source| {
                    StagingError::Io {
                        path: target.clone(),
                        source,
                    }
                })?;
            }
        }
    }
    Ok(())
}

/// Expand a `*`/`?` staging-name template for one element of an
/// `index`-sized collection, per the rules in `SPEC_FULL.md` §4.2.
fn expand_template(template: &str, collection_len: usize, index: usize) -> String {
    let mut template = template.to_string();
    let has_wildcard = template.contains('*') || template.contains('?');
    if !has_wildcard && collection_len > 1 {
        template.push('*');
    }

    let with_questions = replace_question_runs(&template, index);
    replace_star(&with_questions, index, collection_len)
}

fn replace_question_runs(template: &str, index: usize) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '?' {
            let mut run_len = 0;
            while i < chars.len() && chars[i] == '?' {
                run_len += 1;
                i += 1;
            }
            out.push_str(&format!("{:0width$}", index + 1, width = run_len));
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn replace_star(template: &str, index: usize, collection_len: usize) -> String {
    if collection_len == 1 {
        template.replace('*', "")
    } else {
        template.replace('*', &(index + 1).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_element_strips_star() {
        assert_eq!(expand_template("sample*.txt", 1, 0), "sample.txt");
    }

    #[test]
    fn multiple_elements_substitute_index() {
        assert_eq!(expand_template("sample*.txt", 3, 0), "sample1.txt");
        assert_eq!(expand_template("sample*.txt", 3, 2), "sample3.txt");
    }

    #[test]
    fn question_marks_zero_pad_to_run_length() {
        assert_eq!(expand_template("chunk??.txt", 12, 8), "chunk09.txt");
    }

    #[test]
    fn no_wildcard_gets_star_appended_when_collection_is_plural() {
        assert_eq!(expand_template("reads.fq", 2, 0), "reads.fq1");
        assert_eq!(expand_template("reads.fq", 1, 0), "reads.fq");
    }

    fn file_param(name: &str, staging_name: &str) -> InputParameter {
        InputParameter {
            name: name.to_string(),
            index: 0,
            kind: InputKind::File {
                staging_name: staging_name.to_string(),
                glob: false,
                follow_links: false,
                hidden: false,
            },
            arity: taskproc_types::Arity::ONE,
        }
    }

    fn descriptor_with(inputs: Vec<InputParameter>) -> ProcessDescriptor {
        ProcessDescriptor {
            id: taskproc_id::ProcessId::from_raw(0),
            name: "stage".into(),
            inputs,
            outputs: vec![],
            command_template: String::new(),
            shell: "bash".into(),
            error_strategy: taskproc_types::ErrorStrategy::Terminate,
            max_retries: 0,
            max_errors: None,
            max_forks: 0,
            array_size: 0,
            fair: false,
            hashing_mode: taskproc_types::HashingMode::Standard,
            caching_enabled: true,
            resume_enabled: false,
            store_dir: None,
            guard: None,
        }
    }

    #[test]
    fn context_holds_the_staged_name_not_the_raw_value() {
        let descriptor = descriptor_with(vec![file_param("reads", "reads.fq")]);
        let mut bindings = BTreeMap::new();
        bindings.insert("reads".to_string(), Value::Num(42.0));

        let staged = stage_inputs(&descriptor, &bindings, camino::Utf8Path::new("."), |_| false).unwrap();
        assert_eq!(
            staged.context.get("reads"),
            Some(&Value::Path(Utf8PathBuf::from("reads.fq")))
        );
        assert_eq!(staged.files[0].content.as_deref(), Some("42"));
    }

    #[test]
    fn two_file_inputs_staging_to_the_same_name_is_a_collision() {
        let descriptor = descriptor_with(vec![
            file_param("reads_a", "data.txt"),
            file_param("reads_b", "data.txt"),
        ]);
        let mut bindings = BTreeMap::new();
        bindings.insert("reads_a".to_string(), Value::Str("one".into()));
        bindings.insert("reads_b".to_string(), Value::Str("two".into()));

        let err = stage_inputs(&descriptor, &bindings, camino::Utf8Path::new("."), |_| false).unwrap_err();
        match err {
            StagingError::Collision(names) => assert_eq!(names, vec!["data.txt".to_string()]),
            other => panic!("expected a collision error, got {other:?}"),
        }
    }

    #[test]
    fn place_files_writes_synthetic_content_and_copies_local_sources() {
        let source_dir = tempfile::tempdir().unwrap();
        let source_path = Utf8PathBuf::from_path_buf(source_dir.path().join("source.txt")).unwrap();
        std::fs::write(&source_path, "hello").unwrap();

        let descriptor = descriptor_with(vec![
            file_param("literal", "literal.txt"),
            file_param("copied", "copied.txt"),
        ]);
        let mut bindings = BTreeMap::new();
        bindings.insert("literal".to_string(), Value::Str("payload".into()));
        bindings.insert("copied".to_string(), Value::Path(source_path));

        let staged = stage_inputs(&descriptor, &bindings, camino::Utf8Path::new("."), |_| false).unwrap();

        let work_dir = tempfile::tempdir().unwrap();
        let work_dir = Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap();
        place_files(&staged.files, &work_dir).unwrap();

        assert_eq!(
            std::fs::read_to_string(work_dir.join("literal.txt")).unwrap(),
            "payload"
        );
        assert_eq!(
            std::fs::read_to_string(work_dir.join("copied.txt")).unwrap(),
            "hello"
        );
    }
}
