// 8.0: exchange engine. admission, matching, settlement and cancellation over the
// shared ledger and order store. every operation is one all-or-nothing unit of work
// over row locks; events are emitted after commit.

mod admission;
mod audit;
mod cancel;
mod config;
mod core;
mod matching;
mod results;
mod trigger;

pub use audit::{AssetTotals, SolvencyReport};
pub use config::{ClockMode, EngineConfig};
pub use core::Exchange;
pub use results::{CancelResult, EngineError, ErrorKind, SweepResult};
pub use trigger::{ChannelTrigger, MatchTrigger, MatchWorkers, WorkerStats};
