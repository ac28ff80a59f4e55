//! Everything that turns bound input tuples into executed, collected,
//! cached tasks: fingerprint-gated work-dir coordination, input
//! staging, output collection, the error-strategy engine, fair
//! emission, and the local process backend, wired together by the
//! per-process operator and session.

pub mod array_collector;
pub mod backend;
pub mod collect;
pub mod coordinate;
pub mod each;
pub mod env_assembly;
pub mod env_parser;
pub mod errors;
pub mod globmatch;
pub mod lock;
pub mod materialize;
pub mod operator;
pub mod sequencer;
pub mod session;
pub mod staging;
pub mod state;

pub use array_collector::ArrayCollector;
pub use backend::{Executor, ExecutorError, LocalExecutor, TaskCompletion};
pub use collect::{CollectError, CollectInputs, collect_outputs};
pub use coordinate::{CoordinateError, CoordinateOutcome, coordinate};
pub use each::{each_param_name, spawn_expansion};
pub use env_assembly::{EnvError, assemble_env};
pub use env_parser::{CommandEnvParser, EnvCapture};
pub use errors::{ErrorCounters, ErrorDecision, FailureKind, decide};
pub use globmatch::{GlobError, GlobOptions, match_outputs};
pub use lock::LockManager;
pub use materialize::{MaterializeOutcome, materialize};
pub use operator::{Emission, Operator, ProcessResources};
pub use sequencer::{EmissionSequencer, SequencerError};
pub use session::{Session, SessionConfig};
pub use staging::{StagedInputs, StagingError, stage_inputs};
pub use state::{ProcessState, StateHandle, spawn as spawn_state};
