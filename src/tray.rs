/// System tray icon with a minimal context menu (Restore / Exit).
///
/// The tray only renders state and forwards menu clicks; all lifecycle
/// decisions stay with the supervisor. Menu and click events are consumed
/// through `tray_icon`'s global event handlers, wired up in `main`.
use anyhow::{anyhow, Result};
use tray_icon::menu::{Menu, MenuId, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

/// Load the application icon from icon.ico next to the executable.
fn load_app_icon() -> Result<Icon> {
    let path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join("icon.ico")));

    if let Some(path) = path {
        if path.exists() {
            let icon_data =
                std::fs::read(&path).map_err(|e| anyhow!("Failed to read icon.ico: {}", e))?;

            let img = image::load_from_memory(&icon_data)
                .map_err(|e| anyhow!("Failed to decode icon: {}", e))?;

            let img = img.resize_exact(16, 16, image::imageops::FilterType::Lanczos3);
            let rgba = img.to_rgba8();

            return Icon::from_rgba(rgba.into_raw(), 16, 16)
                .map_err(|e| anyhow!("Failed to create icon from image: {:?}", e));
        }
    }

    // Fallback: plain blue square
    let icon_rgba: Vec<u8> = (0..16 * 16)
        .flat_map(|_| vec![0x58, 0x65, 0xF2, 0xFF])
        .collect();
    Icon::from_rgba(icon_rgba, 16, 16)
        .map_err(|e| anyhow!("Failed to create fallback icon: {:?}", e))
}

pub struct TrayManager {
    #[allow(dead_code)]
    tray_icon: TrayIcon,
    pub menu_item_restore: MenuId,
    pub menu_item_exit: MenuId,
}

impl TrayManager {
    pub fn new() -> Result<Self> {
        tracing::info!("Creating tray icon");

        let icon = load_app_icon()?;

        let menu = Menu::new();
        let restore_item = MenuItem::new("Restore", true, None);
        let separator = PredefinedMenuItem::separator();
        let exit_item = MenuItem::new("Exit", true, None);

        menu.append(&restore_item)
            .map_err(|e| anyhow!("Failed to add restore item: {}", e))?;
        menu.append(&separator)
            .map_err(|e| anyhow!("Failed to add separator: {}", e))?;
        menu.append(&exit_item)
            .map_err(|e| anyhow!("Failed to add exit item: {}", e))?;

        let menu_item_restore = restore_item.id().clone();
        let menu_item_exit = exit_item.id().clone();

        let tray_icon = TrayIconBuilder::new()
            .with_tooltip("Zapret Launcher - stopped")
            .with_icon(icon)
            .with_menu(Box::new(menu))
            .build()
            .map_err(|e| anyhow!("Failed to create tray icon: {}", e))?;

        tracing::info!("Tray icon created with context menu");

        Ok(Self {
            tray_icon,
            menu_item_restore,
            menu_item_exit,
        })
    }

    /// Update the tooltip to show the running profile.
    pub fn set_running_profile(&self, running: Option<&str>) {
        let tooltip = match running {
            Some(name) => format!("Zapret Launcher - {}", name),
            None => "Zapret Launcher - stopped".to_string(),
        };
        let _ = self.tray_icon.set_tooltip(Some(&tooltip));
    }
}
