//! Interactive REPL for PlanSmith
//!
//! Chat turns go to the plan session; slash commands inspect the session and
//! drive the edit transaction.

mod commands;
mod session;

pub use commands::parse_edit_command;
pub use session::ReplSession;

use eyre::Result;

use crate::session::PlanSession;

/// Run the interactive REPL
///
/// This is the main entry point for `plansmith chat`.
pub async fn run_interactive(session: PlanSession) -> Result<()> {
    let mut repl = ReplSession::new(session);
    repl.run().await
}
