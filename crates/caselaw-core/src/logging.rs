//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber.
///
/// Reads `CASELAW_LOG` for per-module levels, e.g.
/// `CASELAW_LOG=caselaw_agents=debug,caselaw_index=info`. Falls back to
/// `info` for the caselaw crates. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("CASELAW_LOG").unwrap_or_else(|_| {
            EnvFilter::new("caselaw_core=info,caselaw_index=info,caselaw_agents=info,caselaw=info")
        });
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    });
}
