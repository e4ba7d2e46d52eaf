//! Run execution: engine, concurrency groups, dispatch and watch mode

pub mod concurrency;
pub mod dispatcher;
pub mod engine;
pub mod watcher;

pub use concurrency::{ConcurrencyController, LaneGuard, Superseded};
pub use dispatcher::{default_workspace_root, Dispatcher};
pub use engine::{EventHandler, ExecutionEngine, RunError, RunEvent};
pub use watcher::{parse_ls_remote, BranchWatcher};
