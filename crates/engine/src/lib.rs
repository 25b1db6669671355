//! Notification dispatch engine.
//!
//! Turns game outcomes and the daily timer into paced push deliveries:
//! 1. `outcome` resolves participants to recipients and frames win/loss copy
//! 2. `batcher` delivers a job in fixed-size, rate-limited batches
//! 3. `reminder` sends one daily nudge to everyone not yet notified today
//! 4. `directory` holds the recipient store backends

pub mod batcher;
pub mod directory;
pub mod idempotency;
pub mod outcome;
pub mod payload;
pub mod registration;
pub mod reminder;

#[cfg(test)]
pub(crate) mod testing;
