/// ICED GUI Application Module
///
/// The window is pure presentation: it issues intents to the supervisor
/// handle and renders the state changes the supervisor reports back on the
/// UI event channel. While a lifecycle transition is in flight every
/// control is disabled; the terminal event re-enables them. Closing the
/// window hides it to the tray; Exit asks for confirmation, stops the
/// worker best-effort and leaves.
use iced::widget::{Button, Column, Container, Row, Scrollable, Space, Text};
use iced::{
    executor, window, Alignment, Application, Command, Element, Length, Settings, Size,
    Subscription, Theme,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, AppConfig};
use crate::dialogs;
use crate::profile::ProfileStore;
use crate::supervisor::{SupervisorEvent, SupervisorHandle};
use crate::tray::TrayManager;

/// Exact window title; the single-instance guard locates a running
/// launcher by it, so it must stay fixed.
pub const WINDOW_TITLE: &str = "Zapret Launcher";

/// Bounded wait for the final stop when the user exits.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

/// Everything the window reacts to from outside: supervisor results and
/// tray interactions, merged onto one channel in `main`.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Supervisor(SupervisorEvent),
    TrayRestore,
    TrayExit,
}

#[derive(Debug, Clone)]
pub enum Message {
    ProfilePressed(String),
    StopPressed,
    HideToTray,
    ExitRequested,
    External(UiEvent),
}

pub struct LauncherFlags {
    pub supervisor: SupervisorHandle,
    pub events: crossbeam::channel::Receiver<UiEvent>,
    pub profiles: Arc<ProfileStore>,
    pub tray: TrayManager,
    pub config: AppConfig,
}

/// Run the launcher window; returns when the application exits.
pub fn run(flags: LauncherFlags) -> iced::Result {
    let mut settings = Settings::with_flags(flags);
    settings.window.size = Size::new(500.0, 360.0);
    settings.window.resizable = false;
    settings.window.exit_on_close_request = false;
    LauncherApp::run(settings)
}

pub struct LauncherApp {
    supervisor: SupervisorHandle,
    events: crossbeam::channel::Receiver<UiEvent>,
    profiles: Arc<ProfileStore>,
    tray: TrayManager,
    config: AppConfig,

    /// A lifecycle transition is in flight; controls are disabled.
    busy: bool,
    running: Option<String>,
    status_message: String,
}

impl LauncherApp {
    fn sync_from_supervisor(&mut self) {
        self.running = self.supervisor.current_profile();
        self.tray.set_running_profile(self.running.as_deref());
    }

    fn apply_event(&mut self, event: SupervisorEvent) {
        self.busy = false;
        match event {
            SupervisorEvent::Started { profile } => {
                self.status_message = format!("Profile '{}' is running", profile);
                self.config.last_profile = Some(profile);
                let _ = config::save_config(&self.config);
            }
            SupervisorEvent::Stopped => {
                self.status_message = "Worker stopped".to_string();
                self.config.last_profile = None;
                let _ = config::save_config(&self.config);
            }
            SupervisorEvent::StartFailed { profile, error } => {
                tracing::warn!("Start of '{}' failed: {}", profile, error);
                self.status_message = format!("Could not start '{}': {}", profile, error);
            }
            SupervisorEvent::StopFailed { error } => {
                tracing::warn!("Stop failed: {}", error);
                self.status_message = format!("Could not stop the worker: {}", error);
            }
        }
        self.sync_from_supervisor();
    }

    fn restore_window() -> Command<Message> {
        Command::batch([
            window::change_mode(window::Id::MAIN, window::Mode::Windowed),
            window::gain_focus(window::Id::MAIN),
        ])
    }

    fn request_exit(&mut self) -> Command<Message> {
        let prompt = if self.running.is_some() {
            "Quit and stop the running worker?"
        } else {
            "Quit Zapret Launcher?"
        };
        if !dialogs::confirm(WINDOW_TITLE, prompt) {
            return Command::none();
        }
        self.supervisor.shutdown(SHUTDOWN_WAIT);
        window::close(window::Id::MAIN)
    }
}

impl Application for LauncherApp {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = LauncherFlags;

    fn new(flags: LauncherFlags) -> (Self, Command<Message>) {
        let app = LauncherApp {
            supervisor: flags.supervisor,
            events: flags.events,
            profiles: flags.profiles,
            tray: flags.tray,
            config: flags.config,
            busy: false,
            running: None,
            status_message: "Select a profile to start".to_string(),
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        WINDOW_TITLE.to_string()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::ProfilePressed(name) => {
                if self.busy {
                    return Command::none();
                }
                self.busy = true;
                self.status_message = if self.running.as_deref() == Some(name.as_str()) {
                    format!("Stopping '{}'...", name)
                } else {
                    format!("Starting '{}'...", name)
                };
                self.supervisor.start(&name);
                Command::none()
            }

            Message::StopPressed => {
                if self.busy {
                    return Command::none();
                }
                self.busy = true;
                self.status_message = "Stopping...".to_string();
                self.supervisor.stop();
                Command::none()
            }

            Message::External(UiEvent::Supervisor(event)) => {
                self.apply_event(event);
                Command::none()
            }

            Message::External(UiEvent::TrayRestore) => Self::restore_window(),

            Message::External(UiEvent::TrayExit) | Message::ExitRequested => self.request_exit(),

            Message::HideToTray => {
                window::change_mode(window::Id::MAIN, window::Mode::Hidden)
            }
        }
    }

    fn view(&self) -> Element<Message> {
        let mut profile_list = Column::new()
            .spacing(5)
            .padding(10)
            .push(Text::new("Start profile:").size(18))
            .push(Space::new(Length::Fill, Length::Fixed(5.0)));

        if self.profiles.is_empty() {
            profile_list = profile_list.push(Text::new("No profiles defined in profiles.json"));
        }

        for profile in self.profiles.profiles() {
            let is_running = self.running.as_deref() == Some(profile.name.as_str());
            let label = if is_running {
                format!("■ {}", profile.name)
            } else {
                profile.name.clone()
            };

            let mut button = Button::new(Text::new(label)).width(Length::Fill).padding(8);
            if !self.busy {
                button = button.on_press(Message::ProfilePressed(profile.name.clone()));
            }
            profile_list = profile_list.push(button);
        }

        let mut stop_button = Button::new(Text::new("Stop")).width(Length::Fill).padding(10);
        if !self.busy && self.running.is_some() {
            stop_button = stop_button.on_press(Message::StopPressed);
        }

        let mut exit_button = Button::new(Text::new("Exit")).width(Length::Fill).padding(10);
        if !self.busy {
            exit_button = exit_button.on_press(Message::ExitRequested);
        }

        let controls = Row::new()
            .spacing(10)
            .push(stop_button)
            .push(exit_button);

        let status = Row::new()
            .spacing(10)
            .align_items(Alignment::Center)
            .push(Text::new(&self.status_message).size(14));

        let content = Column::new()
            .spacing(10)
            .padding(10)
            .push(
                Scrollable::new(profile_list)
                    .width(Length::Fill)
                    .height(Length::Fill),
            )
            .push(controls)
            .push(status);

        Container::new(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        let external = iced::subscription::unfold(
            "launcher-external-events",
            self.events.clone(),
            |events| async move {
                loop {
                    match events.recv() {
                        Ok(event) => return (Message::External(event), events),
                        // Senders gone; nothing will ever arrive again.
                        Err(_) => std::future::pending::<()>().await,
                    }
                }
            },
        );

        let window_events = iced::event::listen_with(|event, _status| match event {
            iced::Event::Window(_, window::Event::CloseRequested) => Some(Message::HideToTray),
            _ => None,
        });

        Subscription::batch([external, window_events])
    }
}
