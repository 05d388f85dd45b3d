/// User-visible modal surfaces (Win32 message boxes).
///
/// Fatal startup conditions get a blocking, always-on-top error box; the
/// caller exits non-zero afterwards. Exit confirmation uses a plain
/// yes/no box. Operational failures do not come through here — they show
/// up in the window's status line.
use crate::platform::wide;
use windows::core::PCWSTR;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{
    MessageBoxW, IDYES, MB_ICONERROR, MB_ICONQUESTION, MB_OK, MB_SETFOREGROUND, MB_SYSTEMMODAL,
    MB_TOPMOST, MB_YESNO,
};

/// Blocking, always-on-top error box for fatal startup conditions.
pub fn fatal_error(title: &str, message: &str) {
    tracing::error!("{}: {}", title, message);
    let title_w = wide(title);
    let message_w = wide(message);
    unsafe {
        MessageBoxW(
            HWND(0),
            PCWSTR(message_w.as_ptr()),
            PCWSTR(title_w.as_ptr()),
            MB_OK | MB_ICONERROR | MB_SYSTEMMODAL | MB_SETFOREGROUND | MB_TOPMOST,
        );
    }
}

/// Yes/no confirmation; returns whether the user confirmed.
pub fn confirm(title: &str, message: &str) -> bool {
    let title_w = wide(title);
    let message_w = wide(message);
    let answer = unsafe {
        MessageBoxW(
            HWND(0),
            PCWSTR(message_w.as_ptr()),
            PCWSTR(title_w.as_ptr()),
            MB_YESNO | MB_ICONQUESTION | MB_SETFOREGROUND,
        )
    };
    answer == IDYES
}
