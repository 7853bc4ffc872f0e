//! Event types and keyboard handling.
//!
//! [`AppEvent`] is the one type carried by the inbound queue: every background
//! task finishes by producing exactly one of these. Terminal input arrives on
//! its own stream and is routed through [`handle_key_event`].

use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::files::FileEntry;
use crate::git::GitSnapshot;
use crate::image_render::{ImageTarget, RenderedImage};
use crate::preview_cache::{DiffKey, ImageValidity, Mtime};
use crate::preview_loader::LoadedPreview;
use crate::scheduler::RequestId;
use crate::watch::WatchSubscription;
use crate::{App, Mode, Tab};

/// Completion events delivered to the main loop.
#[derive(Debug)]
pub enum AppEvent {
    PreviewLoaded {
        request_id: RequestId,
        path: PathBuf,
        result: Result<LoadedPreview, String>,
    },
    DiffLoaded {
        request_id: RequestId,
        key: DiffKey,
        /// Source mtime observed before the diff ran.
        mtime: Mtime,
        result: Result<Vec<String>, String>,
    },
    ImageRendered {
        request_id: RequestId,
        path: PathBuf,
        target: ImageTarget,
        validity: ImageValidity,
        result: Result<RenderedImage, String>,
    },
    /// A raw filesystem notification. Carries the single-shot subscription
    /// back so the loop can re-arm it.
    FsChanged(WatchSubscription),
    DebouncedReload,
    Reloaded(ReloadSnapshot),
}

/// Fresh directory listing and git status, read in parallel.
#[derive(Debug)]
pub struct ReloadSnapshot {
    pub dir: PathBuf,
    pub entries: Result<Vec<FileEntry>, String>,
    pub git: GitSnapshot,
}

/// Result of handling a key event.
pub enum KeyEventResult {
    /// Continue the event loop normally
    Continue,
    /// Should quit the application
    Quit,
}

/// Handle a key press event.
///
/// Returns `KeyEventResult::Quit` if the application should exit.
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> KeyEventResult {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return KeyEventResult::Quit;
    }

    if matches!(app.mode, Mode::ImageOverlay(_)) {
        handle_overlay_key(app, key);
        return KeyEventResult::Continue;
    }

    match key.code {
        KeyCode::Char('q') => return KeyEventResult::Quit,
        KeyCode::Char('1') => app.switch_tab(Tab::Explorer),
        KeyCode::Char('2') => app.switch_tab(Tab::Changes),
        KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
        KeyCode::Char('g') | KeyCode::Home => app.move_selection(isize::MIN),
        KeyCode::Char('G') | KeyCode::End => app.move_selection(isize::MAX),
        KeyCode::Char('J') | KeyCode::PageDown => app.scroll_preview(10),
        KeyCode::Char('K') | KeyCode::PageUp => app.scroll_preview(-10),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => app.enter_selected(),
        KeyCode::Backspace | KeyCode::Char('h') | KeyCode::Left => app.go_parent(),
        KeyCode::Char('f') => app.open_overlay(),
        KeyCode::Char(' ') => app.toggle_context(),
        KeyCode::Char('y') => app.copy_context(),
        KeyCode::Char('r') => app.force_reload(),
        _ => {}
    }
    KeyEventResult::Continue
}

/// Keys while the full-screen image overlay is open.
fn handle_overlay_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('f') | KeyCode::Enter => {
            app.close_overlay()
        }
        _ => {}
    }
}
