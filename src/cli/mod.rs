pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod perf;
pub mod probe;
pub mod storage;
pub mod targets;
pub mod watch;

pub use context::CliContext;
pub use dispatch::dispatch;
pub use env::CliArgs;
