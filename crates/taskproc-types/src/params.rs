/// Inclusive arity bounds on how many files a parameter may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    pub const ONE: Arity = Arity { min: 1, max: 1 };
    pub const ANY: Arity = Arity {
        min: 0,
        max: usize::MAX,
    };

    pub fn contains(self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Value,
    File {
        /// Staging name template, may contain `*`/`?` wildcards.
        staging_name: String,
        glob: bool,
        follow_links: bool,
        hidden: bool,
    },
    Env {
        var_name: String,
    },
    Stdin,
    /// Iterates a collection, producing one task per element. Handled by
    /// an upstream expansion stage rather than the main operator, see
    /// `taskproc-engine::each`.
    Each,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParameter {
    pub name: String,
    pub index: usize,
    pub kind: InputKind,
    pub arity: Arity,
}

impl InputParameter {
    pub fn is_file_like(&self) -> bool {
        matches!(self.kind, InputKind::File { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    File,
    Dir,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    Stdout,
    File {
        pattern: String,
        glob: bool,
        output_type: OutputType,
        follow_links: bool,
        hidden: bool,
        max_depth: Option<usize>,
    },
    Value {
        expression: String,
    },
    Env {
        var_name: String,
    },
    CmdEval {
        command: String,
    },
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParameter {
    pub name: String,
    pub kind: OutputKind,
    pub arity: Arity,
    pub optional: bool,
    pub include_inputs: bool,
}

/// How a task failure should be handled, see `taskproc-engine::errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStrategy {
    Terminate,
    #[default]
    Finish,
    Ignore,
    Retry,
}

/// Which inputs contribute to a fingerprint and how file content is
/// folded in, see `taskproc-hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashingMode {
    #[default]
    Standard,
    Deep,
    Lenient,
}

#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    pub id: taskproc_id::ProcessId,
    pub name: String,
    pub inputs: Vec<InputParameter>,
    pub outputs: Vec<OutputParameter>,
    pub command_template: String,
    pub shell: String,
    pub error_strategy: ErrorStrategy,
    pub max_retries: u32,
    pub max_errors: Option<u32>,
    pub max_forks: usize,
    pub array_size: usize,
    pub fair: bool,
    pub hashing_mode: HashingMode,
    pub caching_enabled: bool,
    pub resume_enabled: bool,
    pub store_dir: Option<camino::Utf8PathBuf>,
    /// Name of a boolean context key gating whether a tuple produces a
    /// real task at all. `None` means the process has no `when` guard.
    pub guard: Option<String>,
}

impl ProcessDescriptor {
    pub fn file_inputs(&self) -> impl Iterator<Item = &InputParameter> {
        self.inputs.iter().filter(|p| p.is_file_like())
    }

    /// Mirrors the teacher's `hashable_outputs`: inclusions/exclusions are
    /// sorted so the fingerprint is stable regardless of declaration
    /// order (the "bag" rule applied to output globs).
    pub fn hashable_output_patterns(&self) -> (Vec<String>, Vec<String>) {
        let mut inclusions: Vec<String> = self
            .outputs
            .iter()
            .filter_map(|o| match &o.kind {
                OutputKind::File { pattern, .. } => Some(pattern.clone()),
                _ => None,
            })
            .collect();
        inclusions.sort();
        (inclusions, Vec::new())
    }
}
