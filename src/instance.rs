/// Single-instance guard.
///
/// A globally named kernel mutex ensures only one launcher runs at a time.
/// The name is fixed and versioned so upgraded builds still detect each
/// other. The first instance holds the handle for its whole lifetime; the
/// kernel drops the mutex with the process on any exit path, so a crashed
/// launcher can never deadlock future launches.
use thiserror::Error;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE};
use windows::Win32::System::Threading::CreateMutexW;

use crate::platform::wide;

/// Fixed application identifier for the instance lock. Do not change across
/// releases.
pub const INSTANCE_MUTEX: &str = "Global\\ZapretLauncherSingleton";

#[derive(Debug, Error)]
#[error("single-instance lock could not be created: {0}")]
pub struct InstanceError(String);

pub enum Instance {
    /// This is the first instance; keep the guard alive until exit.
    Acquired(InstanceGuard),
    /// Another launcher already holds the lock.
    AlreadyRunning,
}

/// Holds the mutex handle; closes it on drop.
pub struct InstanceGuard {
    handle: HANDLE,
}

impl InstanceGuard {
    pub fn acquire() -> Result<Instance, InstanceError> {
        let name = wide(INSTANCE_MUTEX);
        let handle = unsafe { CreateMutexW(None, false, PCWSTR(name.as_ptr())) }
            .map_err(|err| InstanceError(err.to_string()))?;

        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe {
                let _ = CloseHandle(handle);
            }
            tracing::info!("Instance lock {} already held", INSTANCE_MUTEX);
            return Ok(Instance::AlreadyRunning);
        }

        tracing::debug!("Instance lock {} acquired", INSTANCE_MUTEX);
        Ok(Instance::Acquired(InstanceGuard { handle }))
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}
