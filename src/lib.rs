// spot-core: spot exchange matching and settlement core.
// cash-first architecture: every unit of work either commits whole or not at all,
// and the ledger always balances against deposits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: UserId, Symbol, Side, Price, Quote
//   2.x  ledger.rs: user cash, asset holdings, lock/unlock/transfer
//   2.1  rowlock.rs: ordered row locking, staged copies, commit
//   3.x  order.rs: limit orders and the price-time book index
//   3.1  store.rs: order rows, books, trade log, listings
//   3.2  trade.rs: executed fill record
//   4.x  settlement.rs: fill terms, fee, settlement plan
//   5.x  events.rs: post-commit events and sinks
//   7.x  config.rs: fees, precision, symbols, env presets
//   8.x  engine/: admission, matching, cancellation, workers, audit

// core modules
pub mod ledger;
pub mod order;
pub mod rowlock;
pub mod store;
pub mod trade;
pub mod types;

// execution
pub mod engine;
pub mod settlement;

// integration modules
pub mod config;
pub mod events;

// re exports for convenience
pub use engine::*;
pub use events::*;
pub use ledger::*;
pub use order::*;
pub use settlement::*;
pub use store::*;
pub use trade::*;
pub use types::*;
pub use config::{
    BookConfig, ConfigError, Environment, ExchangeConfig, FeeConfig, FeeRounding, PrecisionConfig,
    SymbolConfig,
};
pub use rowlock::{Row, RowSet, Staged};
