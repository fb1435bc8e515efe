//! Error monitor report.

use serde::Serialize;
use yoraa_store::monitor::{ErrorRecord, ErrorStats};
use yoraa_store::{Collections, ErrorMonitor, ServiceDeps};

use super::CliError;
use crate::output::{self, Format};

#[derive(Serialize)]
struct Report {
    errors: Vec<ErrorRecord>,
    stats: ErrorStats,
}

/// Hydrate every collection, then print what the monitor captured.
///
/// A failed hydrate is reported, not returned.
///
/// # Errors
///
/// Returns an error only if JSON rendering fails.
pub async fn run(
    deps: &ServiceDeps,
    monitor: &ErrorMonitor,
    limit: usize,
    format: Format,
) -> Result<(), CliError> {
    let mut collections = Collections::new(deps);
    for service in [
        &mut collections.cart,
        &mut collections.wishlist,
        &mut collections.save_for_later,
    ] {
        if let Err(e) = service.hydrate().await {
            tracing::warn!(kind = %service.kind(), error = %e, "Hydrate failed");
        }
    }

    let report = Report {
        errors: monitor.recent_errors(limit),
        stats: monitor.stats(),
    };
    match format {
        Format::Json => output::json(&report)?,
        Format::Text => output::errors(&report.errors, &report.stats),
    }
    Ok(())
}
