/// Platform seam between the launcher's logic and the operating system.
///
/// Everything the supervisor and the startup guards ask of the OS goes
/// through the [`Platform`] trait, so the transition logic stays
/// platform-independent and testable with an in-memory fake (see the
/// supervisor tests). [`WindowsPlatform`] is the real implementation.
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("could not determine launcher executable path: {0}")]
    ExePath(#[from] io::Error),
    #[error("elevation request was refused (ShellExecute status {status})")]
    Refused { status: isize },
}

/// A worker process tracked by the supervisor.
pub trait WorkerProcess: Send {
    fn id(&self) -> u32;

    /// Non-blocking liveness probe. `Some(code)` when the process has
    /// already exited.
    fn poll_exit(&mut self) -> io::Result<Option<i32>>;

    /// Forceful termination of this process.
    fn terminate(&mut self) -> io::Result<()>;
}

pub trait Platform: Send + 'static {
    type Worker: WorkerProcess;

    /// Whether the current process holds administrative rights.
    fn is_elevated(&self) -> bool;

    /// Relaunch the current executable elevated, with the same arguments.
    /// On success the caller is expected to exit; the elevated copy takes
    /// over.
    fn relaunch_elevated(&self) -> Result<(), ElevationError>;

    /// Spawn `exe` with `args`, detached from the launcher's console and
    /// process group, with stdin/stdout/stderr all null.
    fn spawn_detached(&self, exe: &Path, args: &[String], cwd: &Path) -> io::Result<Self::Worker>;

    /// Forcibly terminate every process whose image name matches
    /// (case-insensitive). Returns the number killed; no match is `Ok(0)`,
    /// not an error — nothing to stop means stopped.
    fn terminate_by_name(&self, image_name: &str) -> io::Result<usize>;

    /// Restore and foreground the top-level window with this exact title.
    /// Returns whether such a window was found.
    fn activate_window(&self, title: &str) -> bool;
}

/// Null-terminated UTF-16 for Win32 string parameters.
#[cfg(windows)]
pub(crate) fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
pub use win::WindowsPlatform;

#[cfg(windows)]
mod win {
    use super::{wide, ElevationError, Platform, WorkerProcess};
    use std::io;
    use std::os::windows::process::CommandExt;
    use std::path::Path;
    use std::process::{Child, Command, Stdio};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::System::Threading::{
        CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, DETACHED_PROCESS,
    };
    use windows::Win32::UI::Shell::{IsUserAnAdmin, ShellExecuteW};
    use windows::Win32::UI::WindowsAndMessaging::{
        FindWindowW, SetForegroundWindow, ShowWindow, SW_RESTORE, SW_SHOWNORMAL,
    };

    /// Worker handle backed by a spawned child process.
    pub struct ChildWorker {
        child: Child,
    }

    impl WorkerProcess for ChildWorker {
        fn id(&self) -> u32 {
            self.child.id()
        }

        fn poll_exit(&mut self) -> io::Result<Option<i32>> {
            Ok(self.child.try_wait()?.map(|status| status.code().unwrap_or(-1)))
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.child.kill()
        }
    }

    pub struct WindowsPlatform;

    impl Platform for WindowsPlatform {
        type Worker = ChildWorker;

        fn is_elevated(&self) -> bool {
            unsafe { IsUserAnAdmin().as_bool() }
        }

        fn relaunch_elevated(&self) -> Result<(), ElevationError> {
            let exe = std::env::current_exe()?;
            let params = std::env::args()
                .skip(1)
                .map(|arg| {
                    if arg.contains(' ') {
                        format!("\"{}\"", arg)
                    } else {
                        arg
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");

            let verb_w = wide("runas");
            let exe_w = wide(&exe.to_string_lossy());
            let params_w = wide(&params);

            let status = unsafe {
                ShellExecuteW(
                    HWND(0),
                    PCWSTR(verb_w.as_ptr()),
                    PCWSTR(exe_w.as_ptr()),
                    PCWSTR(params_w.as_ptr()),
                    PCWSTR::null(),
                    SW_SHOWNORMAL,
                )
            };

            // ShellExecute reports success with a value above 32; anything
            // else is an error code (SE_ERR_*), including UAC denial.
            if status.0 as isize > 32 {
                Ok(())
            } else {
                Err(ElevationError::Refused {
                    status: status.0 as isize,
                })
            }
        }

        fn spawn_detached(
            &self,
            exe: &Path,
            args: &[String],
            cwd: &Path,
        ) -> io::Result<Self::Worker> {
            // Detached, no console window, own process group: the worker
            // must survive the launcher exiting. Stdio is discarded rather
            // than piped so an unread pipe can never stall the worker.
            let flags = DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW;
            let child = Command::new(exe)
                .args(args)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .creation_flags(flags.0)
                .spawn()?;
            Ok(ChildWorker { child })
        }

        fn terminate_by_name(&self, image_name: &str) -> io::Result<usize> {
            let mut sys = sysinfo::System::new();
            sys.refresh_processes();

            let own_pid = std::process::id();
            let mut killed = 0usize;
            let mut failed = 0usize;

            for (pid, process) in sys.processes() {
                if pid.as_u32() == own_pid {
                    continue;
                }
                if process.name().eq_ignore_ascii_case(image_name) {
                    if process.kill() {
                        tracing::debug!("Killed {} (pid {})", image_name, pid.as_u32());
                        killed += 1;
                    } else {
                        tracing::warn!(
                            "Termination of {} (pid {}) was rejected",
                            image_name,
                            pid.as_u32()
                        );
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{failed} process(es) named {image_name} could not be terminated"),
                ));
            }
            Ok(killed)
        }

        fn activate_window(&self, title: &str) -> bool {
            let title_w = wide(title);
            let hwnd = unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title_w.as_ptr())) };
            if hwnd.0 == 0 {
                return false;
            }
            unsafe {
                let _ = ShowWindow(hwnd, SW_RESTORE);
                let _ = SetForegroundWindow(hwnd);
            }
            true
        }
    }
}
