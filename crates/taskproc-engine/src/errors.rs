use taskproc_types::ErrorStrategy;

/// How a single failure is classified before the strategy engine decides
/// what to do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Compile/script/value-type errors: never worth retrying.
    Unrecoverable,
    /// A marker exception or spot termination: always retried, and does
    /// not count against the process error budget.
    Retryable,
    /// Non-zero exit, missing output, arity mismatch, non-zero cmd-eval.
    ProcessFailure,
    /// Transient backend submission failure.
    SubmitTimeout,
    /// The `when` guard expression itself threw.
    GuardFailure,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    Ignore,
    Retry,
    Terminate,
    Finish,
}

/// Attempt/error counters consulted by the decision table. `task_errors`
/// is the number of prior failed attempts for this exact tuple;
/// `process_errors` accumulates across every tuple the process has run;
/// `submit_retries` is a distinct counter for transient submission
/// failures so a flaky backend doesn't eat into the task retry budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorCounters {
    pub task_errors: u32,
    pub process_errors: u32,
    pub submit_retries: u32,
}

/// Decide what to do about a failure, per `SPEC_FULL.md` §4.6's decision
/// table. Grounded in spirit on the teacher's overall "soft vs hard
/// failure" distinction threaded through `turborepo-lib`'s task
/// execution error reporting, adapted to the spec's explicit IGNORE /
/// RETRY / TERMINATE / FINISH strategy enum.
pub fn decide(
    strategy: ErrorStrategy,
    kind: FailureKind,
    counters: ErrorCounters,
    max_retries: u32,
    max_errors: Option<u32>,
) -> ErrorDecision {
    if matches!(kind, FailureKind::Unrecoverable | FailureKind::GuardFailure) {
        return ErrorDecision::Terminate;
    }
    if kind == FailureKind::Retryable {
        return ErrorDecision::Retry;
    }
    if strategy == ErrorStrategy::Ignore && kind == FailureKind::ProcessFailure {
        return ErrorDecision::Ignore;
    }

    let errors_budget_ok = match max_errors {
        None => true,
        Some(budget) => counters.process_errors < budget,
    };

    if strategy == ErrorStrategy::Retry
        && errors_budget_ok
        && counters.task_errors <= max_retries
        && counters.submit_retries <= max_retries
    {
        return ErrorDecision::Retry;
    }

    match strategy {
        ErrorStrategy::Finish => ErrorDecision::Finish,
        _ => ErrorDecision::Terminate,
    }
}
