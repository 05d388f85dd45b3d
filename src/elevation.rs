/// Privilege guard: the worker installs packet filters, so the launcher
/// must run elevated. Checked exactly once at startup.
use crate::platform::{ElevationError, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Already running with administrative rights; continue.
    Elevated,
    /// An elevated copy was spawned; the caller must exit with code 0
    /// without doing further work.
    Relaunched,
}

pub fn ensure_elevated<P: Platform>(platform: &P) -> Result<Elevation, ElevationError> {
    if platform.is_elevated() {
        tracing::debug!("Running elevated");
        return Ok(Elevation::Elevated);
    }

    tracing::info!("Not elevated, requesting elevated relaunch");
    platform.relaunch_elevated()?;
    Ok(Elevation::Relaunched)
}
