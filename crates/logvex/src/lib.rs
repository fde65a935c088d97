//! 🪵 logvex: buffer log documents, journal them, bulk them into an index,
//! and move to fresh indices on a schedule.
//!
//! 🎬 *[a queue hums. documents arrive. some are events, some are consumptions,
//! one is a JSON object that just says "hello".]* 🦆
//!
//! Entry point for the CLI is [`run`]. Everything else is public so the pieces
//! can be driven (and tested) one at a time.

pub mod app_config;
pub mod backends;
pub mod buffer;
pub mod common;
pub mod journal;
pub mod rotation;
mod supervisors;

use anyhow::Result;

use crate::app_config::AppConfig;
use crate::supervisors::Supervisor;

/// 🚀 Recover, rotate, consume until the source runs dry, final flush.
/// The first fatal error from any worker comes back out of here.
pub async fn run(app_config: AppConfig) -> Result<()> {
    Supervisor::new(app_config).run().await
}
