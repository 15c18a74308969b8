// Pipeline execution: the executor loop, per-stage runner, run state,
// and lifecycle events

pub mod context;
pub mod events;
pub mod executor;
pub mod runner;

pub use context::{CancellationToken, RunContext};
pub use events::{progress_channel, EventSender, PipelineEvent, ProgressReceiver, ProgressSender};
pub use executor::PipelineExecutor;
pub use runner::{StageOutcome, StageRunner};
