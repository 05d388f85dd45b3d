//! Zapret Launcher library
//!
//! Starts and stops the external `winws.exe` traffic-shaping worker with a
//! selected argument profile. The supervisor and the startup guards are
//! platform-independent behind the `platform` seam; window, tray and
//! dialogs are Windows-only presentation.

pub mod config;
pub mod elevation;
pub mod platform;
pub mod profile;
pub mod supervisor;

#[cfg(windows)]
pub mod dialogs;
#[cfg(windows)]
pub mod gui;
#[cfg(windows)]
pub mod instance;
#[cfg(windows)]
pub mod tray;
