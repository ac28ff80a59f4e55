use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use taskproc_types::{OutputKind, OutputParameter, ProcessDescriptor, Value};
use thiserror::Error;

use crate::env_parser::EnvCapture;
use crate::globmatch::{self, GlobError};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("output `{name}` expects {min}..={max} matches, got {got}")]
    Arity {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },
    #[error("stdout output declared but .command.out does not exist")]
    MissingStdout,
    #[error("command-eval output `{name}` failed with exit {exit}: {output}")]
    CommandEvalFailed { name: String, exit: i32, output: String },
    #[error(transparent)]
    Glob(#[from] GlobError),
}

pub struct CollectInputs<'a> {
    pub work_dir: &'a Utf8Path,
    pub context: &'a BTreeMap<String, Value>,
    pub env_captures: &'a BTreeMap<String, EnvCapture>,
    pub staged_input_names: &'a BTreeSet<String>,
}

/// Collect every declared output of `descriptor` after the backend
/// reports completion. See `SPEC_FULL.md` §4.5 for the per-kind rules.
pub fn collect_outputs(
    descriptor: &ProcessDescriptor,
    inputs: CollectInputs<'_>,
) -> Result<BTreeMap<String, Value>, CollectError> {
    let mut outputs = BTreeMap::new();
    for param in &descriptor.outputs {
        let value = collect_one(param, &inputs)?;
        outputs.insert(param.name.clone(), value);
    }
    Ok(outputs)
}

fn collect_one(param: &OutputParameter, inputs: &CollectInputs<'_>) -> Result<Value, CollectError> {
    match &param.kind {
        OutputKind::Stdout => {
            let path = inputs.work_dir.join(".command.out");
            if !path.exists() {
                return Err(CollectError::MissingStdout);
            }
            Ok(Value::Path(path))
        }
        OutputKind::File {
            pattern,
            glob,
            output_type,
            follow_links,
            hidden,
            max_depth,
        } => {
            let mut matches = if *glob {
                let opts = globmatch::infer_options(pattern, *output_type, *follow_links, *hidden, *max_depth);
                globmatch::match_outputs(inputs.work_dir, pattern, opts)?
            } else {
                let candidate = inputs.work_dir.join(pattern);
                let exists = if *follow_links {
                    candidate.exists()
                } else {
                    candidate.symlink_metadata().is_ok()
                };
                if exists {
                    vec![camino::Utf8PathBuf::from(pattern.as_str())]
                } else {
                    Vec::new()
                }
            };

            if !param.include_inputs {
                matches.retain(|m| !inputs.staged_input_names.contains(m.as_str()));
            }

            if matches.is_empty() && param.optional {
                return Ok(Value::Missing);
            }
            if !param.arity.contains(matches.len()) {
                return Err(CollectError::Arity {
                    name: param.name.clone(),
                    min: param.arity.min,
                    max: param.arity.max,
                    got: matches.len(),
                });
            }

            let values: Vec<Value> = matches
                .into_iter()
                .map(|m| Value::Path(inputs.work_dir.join(m)))
                .collect();
            if values.len() == 1 && param.arity.max == 1 {
                Ok(values.into_iter().next().unwrap())
            } else {
                Ok(Value::List(values))
            }
        }
        OutputKind::Value { expression } => Ok(inputs
            .context
            .get(expression)
            .cloned()
            .unwrap_or(Value::Missing)),
        OutputKind::Env { var_name } => Ok(inputs
            .env_captures
            .get(var_name)
            .map(|c| Value::Str(c.value.clone()))
            .unwrap_or(Value::Missing)),
        OutputKind::CmdEval { command: _ } => {
            let capture = inputs.env_captures.get(&param.name);
            match capture {
                Some(c) => {
                    let exit = c.exit.unwrap_or(0);
                    if exit != 0 {
                        return Err(CollectError::CommandEvalFailed {
                            name: param.name.clone(),
                            exit,
                            output: c.value.clone(),
                        });
                    }
                    Ok(Value::Str(c.value.clone()))
                }
                None => Ok(Value::Missing),
            }
        }
        OutputKind::Default => Ok(Value::Missing),
    }
}
