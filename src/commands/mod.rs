// ABOUTME: Command implementations for the retail-sync CLI
// ABOUTME: Exports the run, check, and ledger commands

pub mod check;
pub mod ledger;
pub mod run;

pub use check::check;
pub use run::run;
