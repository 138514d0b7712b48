#[macro_use]
extern crate serde;

mod ballot;
mod engine;
mod error;
mod fs;
mod ledger;
mod poll;
mod process;
mod proof;
mod serde_hex;
mod store;
mod tally;
mod vote;

pub use ballot::*;
pub use engine::*;
pub use error::*;
pub use fs::*;
pub use ledger::*;
pub use poll::*;
pub use process::*;
pub use proof::*;
pub use store::*;
pub use tally::*;
pub use vote::*;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;
