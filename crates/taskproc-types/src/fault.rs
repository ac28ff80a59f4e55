use camino::Utf8PathBuf;

/// The multi-line diagnostic bubbled to the session on a TERMINATE
/// decision, see `SPEC_FULL.md` §7. Rendered, not just stored, because
/// the session only ever needs to print it once (`error_shown`).
#[derive(Debug, Clone)]
pub struct TaskFault {
    pub process_name: String,
    pub cause: String,
    pub command: String,
    pub exit_status: i32,
    pub output_tail: Vec<String>,
    pub command_error: Option<String>,
    pub wrapper_tail: Option<Vec<String>>,
    pub work_dir: Option<Utf8PathBuf>,
    pub container: Option<String>,
    pub tip: Option<String>,
}

impl std::fmt::Display for TaskFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Process `{}` terminated", self.process_name)?;
        writeln!(f, "Caused by:")?;
        writeln!(f, "  {}", self.cause)?;
        writeln!(f, "Command executed:")?;
        writeln!(f, "  {}", self.command)?;
        writeln!(f, "Command exit status:")?;
        writeln!(f, "  {}", self.exit_status)?;
        if !self.output_tail.is_empty() {
            writeln!(f, "Command output:")?;
            for line in &self.output_tail {
                writeln!(f, "  {line}")?;
            }
        }
        if let Some(err) = &self.command_error {
            writeln!(f, "Command error:")?;
            writeln!(f, "  {err}")?;
        }
        if let Some(tail) = &self.wrapper_tail {
            writeln!(f, "Command wrapper:")?;
            for line in tail {
                writeln!(f, "  {line}")?;
            }
        }
        if let Some(dir) = &self.work_dir {
            writeln!(f, "Work dir:")?;
            writeln!(f, "  {dir}")?;
        }
        if let Some(container) = &self.container {
            writeln!(f, "Container:")?;
            writeln!(f, "  {container}")?;
        }
        if let Some(tip) = &self.tip {
            writeln!(f, "Tip: {tip}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskFault {}
