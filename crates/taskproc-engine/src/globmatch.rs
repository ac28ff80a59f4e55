//! Output glob matching: walk a task's work directory and test each
//! entry against a glob pattern. Grounded on `turborepo-globwalk`'s
//! walkdir-based approach (this crate uses the plain `glob` crate for
//! pattern matching instead of `wax`, the closest equivalent actually
//! present in the dependency pack).

use camino::{Utf8Path, Utf8PathBuf};
use taskproc_types::OutputType;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum GlobError {
    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("entry path {0} is not valid utf-8")]
    NonUtf8(std::path::PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub struct GlobOptions {
    pub hidden: bool,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
    pub output_type: OutputType,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self {
            hidden: false,
            follow_links: false,
            max_depth: None,
            output_type: OutputType::Any,
        }
    }
}

/// Build glob options for a `file` output, applying the implicit-hidden
/// and implicit-type inference rules from `SPEC_FULL.md` §4.5: a pattern
/// starting with `.` is hidden even without the flag, and an unset
/// (`Any`) type is inferred as `File` for a recursive (`**`) pattern.
pub fn infer_options(
    pattern: &str,
    output_type: OutputType,
    follow_links: bool,
    hidden: bool,
    max_depth: Option<usize>,
) -> GlobOptions {
    let output_type = match output_type {
        OutputType::Any if pattern.contains("**") => OutputType::File,
        other => other,
    };
    GlobOptions {
        hidden: hidden || pattern.starts_with('.'),
        follow_links,
        max_depth,
        output_type,
    }
}

/// Walk `root` and return every entry matching `pattern`, relative to
/// `root`, sorted lexicographically.
pub fn match_outputs(
    root: &Utf8Path,
    pattern: &str,
    opts: GlobOptions,
) -> Result<Vec<Utf8PathBuf>, GlobError> {
    let compiled = glob::Pattern::new(pattern).map_err(|source| GlobError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut walker = WalkDir::new(root.as_std_path()).follow_links(opts.follow_links);
    if let Some(max_depth) = opts.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut matches = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| opts.hidden || !is_hidden(e)) {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root.as_std_path())
            .expect("walkdir entries are always under root");
        let relative =
            Utf8Path::from_path(relative).ok_or_else(|| GlobError::NonUtf8(relative.to_path_buf()))?;

        let type_matches = match opts.output_type {
            OutputType::File => entry.file_type().is_file(),
            OutputType::Dir => entry.file_type().is_dir(),
            OutputType::Any => true,
        };

        if type_matches && compiled.matches(relative.as_str()) {
            matches.push(relative.to_path_buf());
        }
    }
    matches.sort();
    Ok(matches)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}
