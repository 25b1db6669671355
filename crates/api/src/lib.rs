//! Trigger surface of the dispatch engine.
//!
//! - `GET  /health`
//! - `POST /api/ingestor/start`, `POST /api/ingestor/stop`, `GET /api/ingestor/status`
//! - `POST /api/reminders/run`
//! - `POST /api/outcomes/{family}` (replayed completion events)
//! - `POST /api/webhook/recipients`
//!
//! The daily reminder also runs from an in-process cron (see `cron`).

pub mod cron;
pub mod middleware;
pub mod routes;
pub mod state;
