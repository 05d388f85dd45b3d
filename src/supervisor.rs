/// Process supervisor: owns the lifecycle of the single worker process.
///
/// All lifecycle transitions run on one dedicated background thread so that
/// exactly one transition is ever in flight and the UI thread never blocks
/// on process operations. The UI holds a cloneable [`SupervisorHandle`] that
/// sends commands over a channel and observes terminal
/// [`SupervisorEvent`]s on the shared UI event channel.
///
/// State machine: Idle -> Starting(p) -> Running(p) -> Stopping -> Idle.
/// Running(A) + start(B) stops A before spawning B; starting the profile
/// that is already running toggles it off.
use crate::platform::{Platform, WorkerProcess};
use crate::profile::ProfileStore;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Image name of the managed executable, used by the kill-by-name fallback.
pub const WORKER_IMAGE: &str = "winws.exe";

/// How long the launch probe waits before checking for an immediate exit.
const LAUNCH_PROBE_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
    #[error("worker could not be spawned: {0}")]
    Spawn(String),
    #[error("worker exited immediately with code {code}")]
    EarlyExit { code: i32 },
    #[error("worker could not be stopped: {0}")]
    Stop(String),
}

/// Exactly one terminal event is emitted per processed command.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Started { profile: String },
    Stopped,
    StartFailed { profile: String, error: SupervisorError },
    StopFailed { error: SupervisorError },
}

/// Where and how the worker executable is launched.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Absolute path to the worker executable.
    pub exe: PathBuf,
    /// Image name matched by the forced-termination fallback.
    pub image_name: String,
    /// Working directory for the worker (hostlist paths are relative).
    pub cwd: PathBuf,
    /// Delay before the post-spawn liveness probe.
    pub launch_probe: Duration,
}

impl WorkerSpec {
    /// Standard layout: `<root>\bin\winws.exe`, run from the install root.
    pub fn for_install_root(root: &Path) -> Self {
        WorkerSpec {
            exe: root.join("bin").join(WORKER_IMAGE),
            image_name: WORKER_IMAGE.to_string(),
            cwd: root.to_path_buf(),
            launch_probe: LAUNCH_PROBE_DELAY,
        }
    }
}

enum Command {
    Start(String),
    Stop,
    Shutdown(Sender<()>),
}

/// Cloneable front end to the supervisor thread.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: Sender<Command>,
    running: Arc<Mutex<Option<String>>>,
}

impl SupervisorHandle {
    /// Request a start. Interpreted as a toggle when `profile` is already
    /// running, and as a switch when a different profile is running.
    pub fn start(&self, profile: &str) {
        let _ = self.tx.send(Command::Start(profile.to_string()));
    }

    /// Request a stop. Idempotent: stopping while idle succeeds.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    /// Snapshot of the currently running profile, readable from any thread.
    pub fn current_profile(&self) -> Option<String> {
        self.running.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Best-effort final stop with a bounded wait; called once at exit.
    /// Proceeds regardless of outcome — the worker can still be stopped
    /// through the task manager if this fails.
    pub fn shutdown(&self, wait: Duration) {
        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.tx.send(Command::Shutdown(ack_tx)).is_ok()
            && ack_rx.recv_timeout(wait).is_err()
        {
            tracing::warn!("Supervisor shutdown did not settle within {:?}", wait);
        }
    }
}

/// Spawn the supervisor thread and return its handle.
pub fn spawn<P: Platform>(
    platform: P,
    profiles: Arc<ProfileStore>,
    spec: WorkerSpec,
    events: Sender<SupervisorEvent>,
) -> SupervisorHandle {
    let (tx, rx) = channel::unbounded();
    let running = Arc::new(Mutex::new(None));
    let worker = Worker {
        platform,
        profiles,
        spec,
        events,
        rx,
        running: Arc::clone(&running),
        tracked: None,
    };
    std::thread::spawn(move || worker.run());
    SupervisorHandle { tx, running }
}

struct Worker<P: Platform> {
    platform: P,
    profiles: Arc<ProfileStore>,
    spec: WorkerSpec,
    events: Sender<SupervisorEvent>,
    rx: Receiver<Command>,
    running: Arc<Mutex<Option<String>>>,
    /// The one live worker handle. Invariant: `Some` iff `running` is `Some`
    /// for a worker this launcher instance spawned itself.
    tracked: Option<P::Worker>,
}

impl<P: Platform> Worker<P> {
    fn run(mut self) {
        let mut pending: Option<Command> = None;
        loop {
            let cmd = match pending.take() {
                Some(cmd) => cmd,
                None => match self.rx.recv() {
                    Ok(cmd) => cmd,
                    // All handles dropped: nothing more to do.
                    Err(_) => return,
                },
            };

            match cmd {
                Command::Start(name) => self.handle_start(name),
                Command::Stop => self.handle_stop(),
                Command::Shutdown(ack) => {
                    self.handle_shutdown();
                    let _ = ack.send(());
                    return;
                }
            }

            // Coalesce whatever piled up while the transition was in
            // flight: only the newest request survives, except that a
            // shutdown always wins.
            while let Ok(next) = self.rx.try_recv() {
                let is_shutdown = matches!(next, Command::Shutdown(_));
                pending = Some(next);
                if is_shutdown {
                    break;
                }
            }
        }
    }

    fn current(&self) -> Option<String> {
        self.running.lock().clone()
    }

    fn set_running(&self, profile: Option<String>) {
        *self.running.lock() = profile;
    }

    fn emit(&self, event: SupervisorEvent) {
        tracing::debug!("Supervisor event: {:?}", event);
        let _ = self.events.send(event);
    }

    fn handle_start(&mut self, name: String) {
        // Validate before touching any process: an unknown profile must
        // leave the current state untouched.
        if !self.profiles.contains(&name) {
            self.emit(SupervisorEvent::StartFailed {
                profile: name.clone(),
                error: SupervisorError::UnknownProfile(name),
            });
            return;
        }

        match self.current() {
            Some(ref current) if *current == name => {
                // Starting the running profile again toggles it off.
                tracing::info!("Profile '{}' is already running, toggling off", name);
                self.handle_stop();
                return;
            }
            Some(current) => {
                // Stop-before-switch: never two workers at once. If the old
                // worker cannot be stopped, the pending start is abandoned
                // so we cannot end up with two of them.
                tracing::info!("Switching profile '{}' -> '{}'", current, name);
                if let Err(error) = self.do_stop() {
                    self.emit(SupervisorEvent::StopFailed { error });
                    return;
                }
            }
            None => {}
        }

        match self.do_start(&name) {
            Ok(()) => self.emit(SupervisorEvent::Started { profile: name }),
            Err(error) => self.emit(SupervisorEvent::StartFailed {
                profile: name,
                error,
            }),
        }
    }

    fn handle_stop(&mut self) {
        match self.do_stop() {
            Ok(()) => self.emit(SupervisorEvent::Stopped),
            Err(error) => self.emit(SupervisorEvent::StopFailed { error }),
        }
    }

    fn handle_shutdown(&mut self) {
        // Best-effort: the application is exiting either way.
        if let Err(error) = self.do_stop() {
            tracing::warn!("Final stop during shutdown failed: {}", error);
        }
    }

    fn do_start(&mut self, name: &str) -> Result<(), SupervisorError> {
        // Presence was validated in handle_start; re-fetch for the tokens.
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownProfile(name.to_string()))?;

        tracing::info!(
            "Launching {} with profile '{}' ({} args)",
            self.spec.exe.display(),
            name,
            profile.args.len()
        );

        let mut worker = self
            .platform
            .spawn_detached(&self.spec.exe, &profile.args, &self.spec.cwd)
            .map_err(|err| SupervisorError::Spawn(err.to_string()))?;

        // Cheap liveness probe: a bad argument set makes the worker exit
        // right away, which we can catch without any timeout machinery.
        if !self.spec.launch_probe.is_zero() {
            std::thread::sleep(self.spec.launch_probe);
        }
        if let Ok(Some(code)) = worker.poll_exit() {
            if code != 0 {
                return Err(SupervisorError::EarlyExit { code });
            }
        }

        tracing::info!("Worker running (pid {})", worker.id());
        self.tracked = Some(worker);
        self.set_running(Some(name.to_string()));
        Ok(())
    }

    /// Terminate the tracked worker, falling back to the by-name sweep when
    /// there is no handle (idle, or a worker left over from a previous
    /// launcher run) or the handle refuses. State is always cleared to idle,
    /// even on failure, so the user can retry.
    fn do_stop(&mut self) -> Result<(), SupervisorError> {
        let result = match self.tracked.take() {
            Some(mut worker) => match worker.poll_exit() {
                Ok(Some(code)) => {
                    tracing::debug!("Worker already exited with code {}", code);
                    Ok(())
                }
                _ => match worker.terminate() {
                    Ok(()) => {
                        tracing::info!("Worker terminated (pid {})", worker.id());
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(
                            "Terminating worker by handle failed ({}), falling back to kill by name",
                            err
                        );
                        self.kill_by_name()
                    }
                },
            },
            None => self.kill_by_name(),
        };
        self.set_running(None);
        result
    }

    fn kill_by_name(&self) -> Result<(), SupervisorError> {
        match self.platform.terminate_by_name(&self.spec.image_name) {
            Ok(0) => Ok(()), // nothing to stop = stopped
            Ok(n) => {
                tracing::info!("Terminated {} {} process(es)", n, self.spec.image_name);
                Ok(())
            }
            Err(err) => Err(SupervisorError::Stop(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ElevationError, Platform, WorkerProcess};
    use crate::profile::Profile;
    use std::collections::HashMap;
    use std::io;

    const RECV_WAIT: Duration = Duration::from_secs(2);

    #[derive(Default)]
    struct FakeState {
        next_pid: u32,
        alive: HashMap<u32, bool>,
        spawned: Vec<(u32, Vec<String>)>,
        ops: Vec<String>,
        immediate_exit: Option<i32>,
        fail_spawn: bool,
        fail_terminate_handle: bool,
        fail_terminate_by_name: bool,
        spawn_gate: Option<Receiver<()>>,
    }

    impl FakeState {
        fn live_count(&self) -> usize {
            self.alive.values().filter(|alive| **alive).count()
        }
    }

    #[derive(Clone)]
    struct FakePlatform {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakePlatform {
        fn new() -> Self {
            FakePlatform {
                state: Arc::new(Mutex::new(FakeState::default())),
            }
        }
    }

    struct FakeWorker {
        pid: u32,
        exit: Option<i32>,
        state: Arc<Mutex<FakeState>>,
    }

    impl WorkerProcess for FakeWorker {
        fn id(&self) -> u32 {
            self.pid
        }

        fn poll_exit(&mut self) -> io::Result<Option<i32>> {
            if let Some(code) = self.exit {
                return Ok(Some(code));
            }
            let st = self.state.lock();
            if st.alive.get(&self.pid).copied().unwrap_or(false) {
                Ok(None)
            } else {
                Ok(Some(0))
            }
        }

        fn terminate(&mut self) -> io::Result<()> {
            let mut st = self.state.lock();
            st.ops.push(format!("terminate {}", self.pid));
            if st.fail_terminate_handle {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            st.alive.insert(self.pid, false);
            Ok(())
        }
    }

    impl Platform for FakePlatform {
        type Worker = FakeWorker;

        fn is_elevated(&self) -> bool {
            true
        }

        fn relaunch_elevated(&self) -> Result<(), ElevationError> {
            Ok(())
        }

        fn spawn_detached(
            &self,
            _exe: &std::path::Path,
            args: &[String],
            _cwd: &std::path::Path,
        ) -> io::Result<FakeWorker> {
            let gate = self.state.lock().spawn_gate.clone();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }

            let mut st = self.state.lock();
            if st.fail_spawn {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
            }
            st.next_pid += 1;
            let pid = st.next_pid;
            let exit = st.immediate_exit.take();
            st.alive.insert(pid, exit.is_none());
            st.spawned.push((pid, args.to_vec()));
            st.ops.push(format!("spawn {}", pid));
            Ok(FakeWorker {
                pid,
                exit,
                state: Arc::clone(&self.state),
            })
        }

        fn terminate_by_name(&self, image_name: &str) -> io::Result<usize> {
            let mut st = self.state.lock();
            st.ops.push(format!("kill_by_name {}", image_name));
            if st.fail_terminate_by_name {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            let mut killed = 0;
            for alive in st.alive.values_mut() {
                if *alive {
                    *alive = false;
                    killed += 1;
                }
            }
            Ok(killed)
        }

        fn activate_window(&self, _title: &str) -> bool {
            true
        }
    }

    fn test_store() -> Arc<ProfileStore> {
        Arc::new(ProfileStore::from_profiles(vec![
            Profile {
                name: "general".to_string(),
                args: vec!["--wf-tcp=80,443".to_string(), "--new".to_string()],
            },
            Profile {
                name: "discord".to_string(),
                args: vec!["--wf-tcp=443".to_string()],
            },
        ]))
    }

    fn test_spec() -> WorkerSpec {
        WorkerSpec {
            exe: PathBuf::from("bin/winws.exe"),
            image_name: WORKER_IMAGE.to_string(),
            cwd: PathBuf::from("."),
            launch_probe: Duration::ZERO,
        }
    }

    fn spawn_supervisor(
        platform: FakePlatform,
    ) -> (SupervisorHandle, Receiver<SupervisorEvent>) {
        let (events_tx, events_rx) = channel::unbounded();
        let handle = spawn(platform, test_store(), test_spec(), events_tx);
        (handle, events_rx)
    }

    fn recv(events: &Receiver<SupervisorEvent>) -> SupervisorEvent {
        events.recv_timeout(RECV_WAIT).expect("supervisor event")
    }

    #[test]
    fn test_start_then_stop() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(
            recv(&events),
            SupervisorEvent::Started { ref profile } if profile == "general"
        ));
        assert_eq!(handle.current_profile().as_deref(), Some("general"));
        {
            let st = platform.state.lock();
            assert_eq!(st.live_count(), 1);
            assert_eq!(st.spawned[0].1, vec!["--wf-tcp=80,443", "--new"]);
        }

        handle.stop();
        assert!(matches!(recv(&events), SupervisorEvent::Stopped));
        assert_eq!(handle.current_profile(), None);
        assert_eq!(platform.state.lock().live_count(), 0);
    }

    #[test]
    fn test_unknown_profile_leaves_state_unchanged() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("nope");
        assert!(matches!(
            recv(&events),
            SupervisorEvent::StartFailed {
                error: SupervisorError::UnknownProfile(_),
                ..
            }
        ));
        assert_eq!(handle.current_profile(), None);
        assert!(platform.state.lock().spawned.is_empty());

        // Same while running: the running profile stays up.
        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));
        handle.start("nope");
        assert!(matches!(recv(&events), SupervisorEvent::StartFailed { .. }));
        assert_eq!(handle.current_profile().as_deref(), Some("general"));
        assert_eq!(platform.state.lock().live_count(), 1);
    }

    #[test]
    fn test_switch_stops_old_worker_before_spawning_new() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));
        handle.start("discord");
        assert!(matches!(
            recv(&events),
            SupervisorEvent::Started { ref profile } if profile == "discord"
        ));

        let st = platform.state.lock();
        assert_eq!(st.live_count(), 1);
        assert_eq!(st.spawned.len(), 2);
        assert_eq!(st.spawned[1].1, vec!["--wf-tcp=443"]);

        // The old worker went down before the new one came up.
        let pid_one = st.spawned[0].0;
        let terminate_at = st
            .ops
            .iter()
            .position(|op| *op == format!("terminate {}", pid_one))
            .expect("old worker terminated");
        let spawn_two_at = st
            .ops
            .iter()
            .position(|op| *op == format!("spawn {}", st.spawned[1].0))
            .expect("new worker spawned");
        assert!(terminate_at < spawn_two_at);
        drop(st);

        assert_eq!(handle.current_profile().as_deref(), Some("discord"));
    }

    #[test]
    fn test_starting_running_profile_toggles_off() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));
        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Stopped));

        assert_eq!(handle.current_profile(), None);
        assert_eq!(platform.state.lock().live_count(), 0);
        assert_eq!(platform.state.lock().spawned.len(), 1);
    }

    #[test]
    fn test_stop_when_idle_is_noop_success() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.stop();
        assert!(matches!(recv(&events), SupervisorEvent::Stopped));
        assert!(platform.state.lock().spawned.is_empty());
        // The sweep ran so a worker left over from a previous launcher run
        // would have been caught too.
        assert!(platform
            .state
            .lock()
            .ops
            .iter()
            .any(|op| op.starts_with("kill_by_name")));
    }

    #[test]
    fn test_immediate_nonzero_exit_is_launch_error() {
        let platform = FakePlatform::new();
        platform.state.lock().immediate_exit = Some(87);
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(
            recv(&events),
            SupervisorEvent::StartFailed {
                error: SupervisorError::EarlyExit { code: 87 },
                ..
            }
        ));
        assert_eq!(handle.current_profile(), None);
        assert_eq!(platform.state.lock().live_count(), 0);
    }

    #[test]
    fn test_spawn_failure_is_reported_and_state_stays_idle() {
        let platform = FakePlatform::new();
        platform.state.lock().fail_spawn = true;
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(
            recv(&events),
            SupervisorEvent::StartFailed {
                error: SupervisorError::Spawn(_),
                ..
            }
        ));
        assert_eq!(handle.current_profile(), None);

        // A later retry works once the cause is gone.
        platform.state.lock().fail_spawn = false;
        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));
    }

    #[test]
    fn test_handle_failure_falls_back_to_kill_by_name() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));

        platform.state.lock().fail_terminate_handle = true;
        handle.stop();
        assert!(matches!(recv(&events), SupervisorEvent::Stopped));
        assert_eq!(platform.state.lock().live_count(), 0);
        assert!(platform
            .state
            .lock()
            .ops
            .iter()
            .any(|op| op.starts_with("kill_by_name")));
    }

    #[test]
    fn test_failed_stop_still_clears_state_so_user_can_retry() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));

        {
            let mut st = platform.state.lock();
            st.fail_terminate_handle = true;
            st.fail_terminate_by_name = true;
        }
        handle.stop();
        assert!(matches!(
            recv(&events),
            SupervisorEvent::StopFailed {
                error: SupervisorError::Stop(_)
            }
        ));
        // Tracking is cleared even though the stop failed.
        assert_eq!(handle.current_profile(), None);

        // A new start is not blocked.
        handle.start("discord");
        assert!(matches!(
            recv(&events),
            SupervisorEvent::Started { ref profile } if profile == "discord"
        ));
    }

    #[test]
    fn test_queued_commands_coalesce_to_newest() {
        let platform = FakePlatform::new();
        let (gate_tx, gate_rx) = channel::unbounded();
        platform.state.lock().spawn_gate = Some(gate_rx);
        let (handle, events) = spawn_supervisor(platform.clone());

        // The first start blocks inside spawn until the gate opens; the
        // requests behind it pile up and must collapse to the newest one.
        handle.start("general");
        std::thread::sleep(Duration::from_millis(50));
        handle.start("discord");
        handle.stop();
        handle.start("discord");

        gate_tx.send(()).unwrap(); // release spawn("general")
        gate_tx.send(()).unwrap(); // release spawn("discord")

        assert!(matches!(
            recv(&events),
            SupervisorEvent::Started { ref profile } if profile == "general"
        ));
        assert!(matches!(
            recv(&events),
            SupervisorEvent::Started { ref profile } if profile == "discord"
        ));
        assert!(events.try_recv().is_err());

        let st = platform.state.lock();
        assert_eq!(st.spawned.len(), 2);
        assert_eq!(st.live_count(), 1);
        assert_eq!(handle.current_profile().as_deref(), Some("discord"));
    }

    #[test]
    fn test_shutdown_stops_worker_best_effort() {
        let platform = FakePlatform::new();
        let (handle, events) = spawn_supervisor(platform.clone());

        handle.start("general");
        assert!(matches!(recv(&events), SupervisorEvent::Started { .. }));

        handle.shutdown(Duration::from_secs(2));
        assert_eq!(platform.state.lock().live_count(), 0);
        assert_eq!(handle.current_profile(), None);
        // Shutdown emits no event; the application is exiting.
        assert!(events.try_recv().is_err());
    }
}
