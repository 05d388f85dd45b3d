//! Zapret Launcher entry point.
//!
//! Startup order matters: the privilege guard may hand the process over to
//! an elevated copy, the single-instance guard may hand over to an already
//! running launcher, and only then are profiles loaded and the supervisor
//! and window brought up. Fatal startup conditions surface as an
//! always-on-top modal and a non-zero exit.

#![windows_subsystem = "windows"]

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    app::run()
}

#[cfg(not(windows))]
fn main() {
    eprintln!("zapret_launcher manages a Windows worker process and only runs on Windows.");
    std::process::exit(1);
}

#[cfg(windows)]
mod app {
    use anyhow::Context;
    use crossbeam::channel;
    use std::sync::Arc;
    use std::time::Duration;
    use tray_icon::menu::MenuEvent;
    use tray_icon::{MouseButton, MouseButtonState, TrayIconEvent};

    use zapret_launcher::config;
    use zapret_launcher::dialogs;
    use zapret_launcher::elevation::{self, Elevation};
    use zapret_launcher::gui::{self, LauncherFlags, UiEvent};
    use zapret_launcher::instance::{Instance, InstanceGuard};
    use zapret_launcher::platform::{Platform, WindowsPlatform};
    use zapret_launcher::profile::{self, ProfileStore};
    use zapret_launcher::supervisor::{self, WorkerSpec};
    use zapret_launcher::tray::TrayManager;

    const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt::init();

        tracing::info!("Zapret Launcher starting...");

        // Privilege guard: may hand over to an elevated copy of ourselves.
        match elevation::ensure_elevated(&WindowsPlatform) {
            Ok(Elevation::Elevated) => {}
            Ok(Elevation::Relaunched) => {
                tracing::info!("Elevated copy launched, leaving the unprivileged instance");
                return Ok(());
            }
            Err(err) => {
                dialogs::fatal_error(
                    "Administrator rights required",
                    &format!("Zapret Launcher could not restart elevated:\n{}", err),
                );
                std::process::exit(1);
            }
        }

        // Single-instance guard: a second launch only brings the first
        // window forward.
        let _instance = match InstanceGuard::acquire() {
            Ok(Instance::Acquired(guard)) => guard,
            Ok(Instance::AlreadyRunning) => {
                tracing::info!("Launcher already running, bringing its window to front");
                WindowsPlatform.activate_window(gui::WINDOW_TITLE);
                return Ok(());
            }
            Err(err) => {
                dialogs::fatal_error("Startup error", &err.to_string());
                std::process::exit(1);
            }
        };

        // Profile store: a broken profiles.json is fatal, the launcher must
        // not come up pretending the set loaded.
        let root = profile::install_root().context("Failed to locate install root")?;
        let profiles_path = root.join(profile::PROFILES_FILE);
        let profiles = match ProfileStore::load(&profiles_path) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                dialogs::fatal_error("Profile configuration error", &err.to_string());
                std::process::exit(1);
            }
        };

        // One channel carries everything the window reacts to; supervisor
        // results and tray interactions are merged onto it.
        let (ui_tx, ui_rx) = channel::unbounded::<UiEvent>();
        let (supervisor_tx, supervisor_rx) = channel::unbounded();
        {
            let ui_tx = ui_tx.clone();
            std::thread::spawn(move || {
                for event in supervisor_rx {
                    if ui_tx.send(UiEvent::Supervisor(event)).is_err() {
                        break;
                    }
                }
            });
        }

        let supervisor = supervisor::spawn(
            WindowsPlatform,
            Arc::clone(&profiles),
            WorkerSpec::for_install_root(&root),
            supervisor_tx,
        );

        let tray = TrayManager::new().context("Failed to create tray icon")?;
        {
            let ui_tx = ui_tx.clone();
            let restore_id = tray.menu_item_restore.clone();
            let exit_id = tray.menu_item_exit.clone();
            MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
                if event.id == restore_id {
                    let _ = ui_tx.send(UiEvent::TrayRestore);
                } else if event.id == exit_id {
                    let _ = ui_tx.send(UiEvent::TrayExit);
                }
            }));
        }
        {
            let ui_tx = ui_tx.clone();
            TrayIconEvent::set_event_handler(Some(move |event: TrayIconEvent| {
                if let TrayIconEvent::Click {
                    button: MouseButton::Left,
                    button_state: MouseButtonState::Up,
                    ..
                } = event
                {
                    let _ = ui_tx.send(UiEvent::TrayRestore);
                }
            }));
        }

        let app_config = config::load_config();

        gui::run(LauncherFlags {
            supervisor: supervisor.clone(),
            events: ui_rx,
            profiles,
            tray,
            config: app_config,
        })?;

        // The exit path inside the window already ran the final stop; this
        // covers the event loop ending any other way.
        supervisor.shutdown(SHUTDOWN_WAIT);

        tracing::info!("Zapret Launcher exiting");
        Ok(())
    }
}
