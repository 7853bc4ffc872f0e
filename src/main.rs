use crossterm::{
    cursor::Show,
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend, layout::Rect};
use std::{
    collections::BTreeSet,
    env,
    fs::OpenOptions,
    io::{self, Stdout, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tokio::sync::mpsc::UnboundedReceiver;

use anyhow::{Context, Result};

mod clipboard;
mod config;
mod events;
mod files;
mod git;
mod git_diff_loader;
mod git_ops;
mod highlight;
mod image_render;
mod kitty;
mod preview_cache;
mod preview_loader;
mod scheduler;
mod ui;
mod watch;

use clipboard::CopyMethod;
use config::Config;
use events::{AppEvent, KeyEventResult, ReloadSnapshot, handle_key_event};
use files::FileEntry;
use git::GitState;
use git_diff_loader::{Applied, DiffContext, DiffView};
use image_render::{
    GraphicsSupport, ImageKind, ImageRequest, ImageTarget, RenderParams, RenderedImage,
};
use preview_cache::{
    Cached, DiffCache, DiffKey, ImageCache, ImageValidity, Mtime, PreviewCache, file_mtime,
};
use preview_loader::{LoadedPreview, PreviewContent};
use scheduler::{RequestId, RequestIds, Scheduler, TargetKind, Task};
use watch::{FileWatcher, ReloadDebouncer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const IDLE_TICK: Duration = Duration::from_millis(100);
const STATUS_TTL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tab {
    Explorer,
    Changes,
}

/// Full-screen view of one image.
#[derive(Debug)]
pub(crate) struct ImageOverlay {
    pub(crate) path: PathBuf,
    pub(crate) return_to: Tab,
    pub(crate) body: OverlayBody,
    /// Cell where the current Kitty payload was last written.
    pub(crate) placed: Option<(u16, u16)>,
}

#[derive(Debug)]
pub(crate) enum OverlayBody {
    Loading,
    Image(RenderedImage),
    Message(String),
}

/// Exactly one of these is active.
#[derive(Debug)]
pub(crate) enum Mode {
    Explorer,
    Changes,
    ImageOverlay(ImageOverlay),
}

impl Mode {
    fn for_tab(tab: Tab) -> Self {
        match tab {
            Tab::Explorer => Mode::Explorer,
            Tab::Changes => Mode::Changes,
        }
    }

    /// The tab underneath; for the overlay, the one it returns to.
    pub(crate) fn tab(&self) -> Tab {
        match self {
            Mode::Explorer => Tab::Explorer,
            Mode::Changes => Tab::Changes,
            Mode::ImageOverlay(overlay) => overlay.return_to,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) enum PreviewBody {
    #[default]
    Empty,
    Loading,
    Text(PreviewContent),
    Image(RenderedImage),
    Message(String),
}

/// The right-hand pane for files: text preview or an inline image.
#[derive(Debug, Default)]
pub(crate) struct PreviewPane {
    pub(crate) path: Option<PathBuf>,
    pub(crate) body: PreviewBody,
    pub(crate) scroll: u16,
}

impl PreviewPane {
    fn line_count(&self) -> usize {
        match &self.body {
            PreviewBody::Text(content) => content.lines.len(),
            PreviewBody::Image(RenderedImage::Blocks(lines)) => lines.len(),
            _ => 0,
        }
    }

    /// Point the pane at `path`, resetting scroll for a different file.
    fn retarget(&mut self, path: &Path) {
        if self.path.as_deref() != Some(path) {
            self.path = Some(path.to_path_buf());
            self.scroll = 0;
            self.body = PreviewBody::Loading;
        }
    }
}

fn text_body(content: &PreviewContent) -> PreviewBody {
    if content.is_binary {
        PreviewBody::Message("Binary file".to_string())
    } else {
        PreviewBody::Text(content.clone())
    }
}

pub(crate) struct App {
    pub(crate) config: Config,
    pub(crate) root: PathBuf,
    pub(crate) current_path: PathBuf,
    pub(crate) files: Vec<FileEntry>,
    pub(crate) selected: usize,
    pub(crate) mode: Mode,
    pub(crate) git: GitState,

    request_ids: RequestIds,
    preview_cache: PreviewCache,
    diff_cache: DiffCache,
    image_cache: ImageCache,

    pub(crate) preview: PreviewPane,
    pub(crate) diff: DiffView,
    debouncer: ReloadDebouncer,

    /// Files marked for the AI context basket.
    pub(crate) context: BTreeSet<PathBuf>,
    pub(crate) status_message: Option<(String, Instant)>,

    graphics: GraphicsSupport,
    /// Last known terminal size; layout is derived from it before drawing.
    screen: Rect,
    clear_graphics: bool,

    outbox: Vec<Task>,
    _watcher: Option<FileWatcher>,
}

impl App {
    fn new(root: PathBuf, config: Config, graphics: GraphicsSupport, screen: Rect) -> Self {
        let files = files::read_dir_entries(&root, config.show_hidden).unwrap_or_else(|e| {
            log::warn!("listing {}: {}", root.display(), e);
            Vec::new()
        });
        let mut git = GitState::default();
        git.apply_snapshot(git::GitSnapshot::load(&root));

        let mut app = Self {
            preview_cache: PreviewCache::new(config.preview_cache_capacity),
            diff_cache: DiffCache::new(config.diff_cache_capacity),
            image_cache: ImageCache::new(config.image_cache_capacity, config.image_tolerance),
            debouncer: ReloadDebouncer::new(config.debounce),
            config,
            current_path: root.clone(),
            root,
            files,
            selected: 0,
            mode: Mode::Explorer,
            git,
            request_ids: RequestIds::new(),
            preview: PreviewPane::default(),
            diff: DiffView::default(),
            context: BTreeSet::new(),
            status_message: None,
            graphics,
            screen,
            clear_graphics: false,
            outbox: Vec::new(),
            _watcher: None,
        };
        app.update_preview();
        app
    }

    /// Start watching the project root. Failure leaves the app without auto-reload.
    fn start_watching(&mut self) {
        match FileWatcher::start(&self.root) {
            Ok((watcher, subscription)) => {
                self._watcher = Some(watcher);
                self.schedule(Task::WaitForChange(subscription));
            }
            Err(e) => log::warn!("file watching disabled: {e:#}"),
        }
    }

    fn schedule(&mut self, task: Task) {
        log::trace!("queue {}", task.name());
        self.outbox.push(task);
    }

    /// Drain the tasks queued since the last call.
    fn take_tasks(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.outbox)
    }

    fn set_status<S: Into<String>>(&mut self, msg: S) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    fn maybe_expire_status(&mut self) {
        if let Some((_, at)) = &self.status_message
            && at.elapsed() >= STATUS_TTL
        {
            self.status_message = None;
        }
    }

    pub(crate) fn selected_file(&self) -> Option<&FileEntry> {
        self.files.get(self.selected)
    }

    /// Absolute path of the file the cursor is on, in either tab.
    fn selected_path(&self) -> Option<PathBuf> {
        match self.mode.tab() {
            Tab::Explorer => self
                .selected_file()
                .filter(|f| !f.is_dir)
                .map(|f| f.path.clone()),
            Tab::Changes => {
                let root = self.git.repo_root()?;
                self.git.selected_change().map(|c| root.join(&c.path))
            }
        }
    }

    // ---- navigation ----

    pub(crate) fn switch_tab(&mut self, tab: Tab) {
        if self.mode.tab() == tab {
            return;
        }
        self.mode = Mode::for_tab(tab);
        self.refresh_target();
    }

    /// Move the cursor in the active list. `isize::MIN`/`MAX` jump to the ends.
    pub(crate) fn move_selection(&mut self, delta: isize) {
        let (current, len) = match self.mode.tab() {
            Tab::Explorer => (self.selected, self.files.len()),
            Tab::Changes => (self.git.selected, self.git.changes.len()),
        };
        if len == 0 {
            return;
        }
        let next = (current as isize)
            .saturating_add(delta)
            .clamp(0, len as isize - 1) as usize;
        if next == current {
            return;
        }
        match self.mode.tab() {
            Tab::Explorer => self.selected = next,
            Tab::Changes => self.git.selected = next,
        }
        self.refresh_target();
    }

    pub(crate) fn scroll_preview(&mut self, delta: i32) {
        let viewport = ui::preview_viewport(self.screen).1 as usize;
        let diff_visible = self.mode.tab() == Tab::Changes
            && self.git.selected_change().is_some_and(|c| !c.untracked);
        let lines = if diff_visible {
            self.diff.line_count()
        } else {
            self.preview.line_count()
        };
        let scroll = if diff_visible {
            &mut self.diff.scroll
        } else {
            &mut self.preview.scroll
        };
        let max = lines.saturating_sub(viewport).min(u16::MAX as usize) as i32;
        *scroll = (*scroll as i32 + delta).clamp(0, max) as u16;
    }

    pub(crate) fn enter_selected(&mut self) {
        if self.mode.tab() != Tab::Explorer {
            return;
        }
        let Some(file) = self.selected_file().cloned() else {
            return;
        };
        if file.is_dir {
            self.change_dir(file.path, None);
        } else if ImageKind::detect(&file.path).is_some() {
            self.open_overlay();
        }
    }

    pub(crate) fn go_parent(&mut self) {
        if self.mode.tab() != Tab::Explorer {
            return;
        }
        if self.current_path == self.root {
            self.set_status("Already at project root");
            return;
        }
        let Some(parent) = self.current_path.parent().map(Path::to_path_buf) else {
            return;
        };
        let previous = self.current_path.clone();
        self.change_dir(parent, Some(previous));
    }

    fn change_dir(&mut self, dir: PathBuf, select: Option<PathBuf>) {
        match files::read_dir_entries(&dir, self.config.show_hidden) {
            Ok(entries) => {
                self.selected = select
                    .and_then(|p| entries.iter().position(|e| e.path == p))
                    .unwrap_or(0);
                self.files = entries;
                self.current_path = dir;
                self.refresh_target();
            }
            Err(e) => self.set_status(e),
        }
    }

    /// Re-resolve the pane content for whatever is selected now.
    fn refresh_target(&mut self) {
        match &self.mode {
            Mode::Explorer => self.update_preview(),
            Mode::Changes => self.update_change_preview(),
            Mode::ImageOverlay(_) => self.refresh_overlay(),
        }
    }

    // ---- preview requests ----

    fn update_preview(&mut self) {
        let Some(file) = self.selected_file().cloned() else {
            self.clear_preview();
            return;
        };
        if !file.is_dir && ImageKind::detect(&file.path).is_some() {
            self.show_pane_image(file.path);
        } else {
            self.request_preview(file.path);
        }
    }

    fn clear_preview(&mut self) {
        self.request_ids.clear(TargetKind::Preview);
        self.request_ids.clear(TargetKind::Image);
        self.preview = PreviewPane::default();
    }

    fn update_change_preview(&mut self) {
        let Some(change) = self.git.selected_change().cloned() else {
            self.request_ids.clear(TargetKind::Diff);
            self.diff.clear();
            self.clear_preview();
            return;
        };
        let Some(root) = self.git.repo_root().map(Path::to_path_buf) else {
            return;
        };

        if change.untracked {
            // No diff exists yet; show the file itself.
            self.request_ids.clear(TargetKind::Diff);
            self.diff.clear();
            let path = root.join(&change.path);
            if ImageKind::detect(&path).is_some() {
                self.show_pane_image(path);
            } else {
                self.request_preview(path);
            }
            return;
        }

        self.clear_preview();
        self.request_diff(root, change.path, change.staged);
    }

    /// Show `path` as text, from cache when its mtime still matches.
    /// Directory listings are never cached, so they always miss.
    fn request_preview(&mut self, path: PathBuf) {
        self.preview.retarget(&path);
        self.request_ids.clear(TargetKind::Image);
        let request_id = self.request_ids.issue(TargetKind::Preview);

        let mtime = file_mtime(&path);
        let hit = self
            .preview_cache
            .get(&path)
            .filter(|entry| entry.is_valid_for(&mtime))
            .map(|entry| text_body(&entry.content));
        if let Some(body) = hit {
            log::debug!("preview cache hit: {}", path.display());
            self.preview.body = body;
            self.clamp_preview_scroll();
            return;
        }
        log::debug!("preview cache miss: {}", path.display());

        self.schedule(Task::LoadPreview {
            request_id,
            path,
            highlight: self.config.syntax_highlight,
        });
    }

    fn show_pane_image(&mut self, path: PathBuf) {
        self.preview.retarget(&path);
        self.request_ids.clear(TargetKind::Preview);
        let (cols, rows) = ui::preview_viewport(self.screen);
        self.request_image(path, ImageTarget::Pane, cols, rows);
    }

    fn request_image(&mut self, path: PathBuf, target: ImageTarget, cols: u16, rows: u16) {
        let validity = ImageValidity {
            mtime: file_mtime(&path),
            viewport_w: cols,
            viewport_h: rows,
        };
        let request_id = self.request_ids.issue(TargetKind::Image);

        if let Some(image) = self.image_cache.get(&path, target, &validity).cloned() {
            log::debug!("image cache hit: {} ({:?})", path.display(), target);
            self.display_image(target, image);
            return;
        }

        let params = RenderParams {
            target,
            cols,
            rows,
            protocol: self.graphics.protocol_for(target),
            truecolor: self.graphics.truecolor,
        };
        self.schedule(Task::RenderImage(ImageRequest {
            request_id,
            path,
            params,
            validity,
        }));
    }

    fn display_image(&mut self, target: ImageTarget, image: RenderedImage) {
        match target {
            ImageTarget::Pane => {
                self.preview.body = PreviewBody::Image(image);
                self.clamp_preview_scroll();
            }
            ImageTarget::Overlay => {
                if let Mode::ImageOverlay(overlay) = &mut self.mode {
                    if matches!(&overlay.body, OverlayBody::Image(shown) if *shown == image) {
                        return;
                    }
                    overlay.body = OverlayBody::Image(image);
                    overlay.placed = None;
                    self.clear_graphics = true;
                }
            }
        }
    }

    fn request_diff(&mut self, repo_root: PathBuf, rel_path: String, staged: bool) {
        let request_id = self.request_ids.issue(TargetKind::Diff);
        self.diff.retarget(request_id, repo_root, rel_path, staged);

        let mtime = file_mtime(&self.diff.path);
        match self.diff_cache.best(&self.diff.path, staged, &mtime) {
            Some((DiffContext::Full, lines)) => {
                log::debug!("diff cache hit (full): {}", self.diff.path.display());
                self.diff.apply(DiffContext::Full, lines);
            }
            Some((DiffContext::Quick, lines)) => {
                log::debug!("diff cache hit (quick): {}", self.diff.path.display());
                self.diff.apply(DiffContext::Quick, lines);
                self.schedule_diff(DiffContext::Full);
            }
            None => self.schedule_diff(DiffContext::Quick),
        }
    }

    fn schedule_diff(&mut self, context: DiffContext) {
        let lines = match context {
            DiffContext::Quick => self.config.quick_context_lines,
            DiffContext::Full => self.config.full_context_lines,
        };
        if let Some(request) = self.diff.request(context, lines) {
            self.schedule(Task::LoadDiff(request));
        }
    }

    fn clamp_preview_scroll(&mut self) {
        let viewport = ui::preview_viewport(self.screen).1 as usize;
        let max = self.preview.line_count().saturating_sub(viewport);
        self.preview.scroll = self.preview.scroll.min(max.min(u16::MAX as usize) as u16);
    }

    // ---- overlay ----

    pub(crate) fn open_overlay(&mut self) {
        let Some(path) = self.selected_path() else {
            return;
        };
        if ImageKind::detect(&path).is_none() {
            self.set_status("Not an image");
            return;
        }
        self.mode = Mode::ImageOverlay(ImageOverlay {
            path,
            return_to: self.mode.tab(),
            body: OverlayBody::Loading,
            placed: None,
        });
        self.refresh_overlay();
    }

    pub(crate) fn close_overlay(&mut self) {
        if let Mode::ImageOverlay(overlay) = &self.mode {
            let tab = overlay.return_to;
            self.mode = Mode::for_tab(tab);
            self.clear_graphics = true;
            self.refresh_target();
        }
    }

    fn refresh_overlay(&mut self) {
        let Mode::ImageOverlay(overlay) = &self.mode else {
            return;
        };
        let path = overlay.path.clone();
        let inner = ui::overlay_inner(self.screen);
        self.request_image(path, ImageTarget::Overlay, inner.width, inner.height);
    }

    /// Write pending graphics-protocol output after a frame was drawn.
    fn flush_graphics<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.clear_graphics {
            kitty::delete_all(out)?;
            self.clear_graphics = false;
            if let Mode::ImageOverlay(overlay) = &mut self.mode {
                overlay.placed = None;
            }
        }
        let inner = ui::overlay_inner(self.screen);
        if let Mode::ImageOverlay(overlay) = &mut self.mode
            && let OverlayBody::Image(RenderedImage::Kitty(image)) = &overlay.body
        {
            let x = inner.x + inner.width.saturating_sub(image.cols) / 2;
            let y = inner.y + inner.height.saturating_sub(image.rows) / 2;
            if overlay.placed != Some((x, y)) {
                if overlay.placed.is_some() {
                    kitty::delete_all(out)?;
                }
                kitty::write_image(out, image, x, y)?;
                overlay.placed = Some((x, y));
            }
        }
        Ok(())
    }

    fn on_resize(&mut self, width: u16, height: u16) {
        self.screen = Rect::new(0, 0, width, height);
        match &self.mode {
            Mode::ImageOverlay(_) => self.refresh_overlay(),
            _ => {
                // Text does not depend on the viewport; images do.
                if matches!(self.preview.body, PreviewBody::Image(_))
                    && let Some(path) = self.preview.path.clone()
                {
                    self.show_pane_image(path);
                }
            }
        }
    }

    // ---- context basket ----

    pub(crate) fn toggle_context(&mut self) {
        let Some(path) = self.selected_path() else {
            return;
        };
        let name = path.strip_prefix(&self.root).unwrap_or(&path).display().to_string();
        if self.context.remove(&path) {
            self.set_status(format!("Removed {} from context", name));
        } else {
            self.context.insert(path);
            self.set_status(format!("Added {} to context", name));
        }
    }

    pub(crate) fn copy_context(&mut self) {
        if self.context.is_empty() {
            self.set_status("Context is empty");
            return;
        }
        let text = clipboard::format_context(&self.root, &self.context);
        match clipboard::copy(&text) {
            Ok(CopyMethod::System) => {
                self.set_status(format!("Copied {} paths", self.context.len()))
            }
            Ok(CopyMethod::Osc52) => {
                self.set_status(format!("Copied {} paths (OSC52)", self.context.len()))
            }
            Err(e) => self.set_status(format!("Copy failed: {}", e)),
        }
    }

    // ---- reload ----

    pub(crate) fn force_reload(&mut self) {
        self.set_status("Reloading");
        self.schedule_reload();
    }

    fn schedule_reload(&mut self) {
        self.schedule(Task::Reload {
            dir: self.current_path.clone(),
            show_hidden: self.config.show_hidden,
        });
    }

    fn apply_reload(&mut self, snapshot: ReloadSnapshot) {
        self.git.apply_snapshot(snapshot.git);
        if snapshot.dir == self.current_path {
            match snapshot.entries {
                Ok(entries) => {
                    let previous = self.selected_file().map(|f| f.path.clone());
                    self.selected = previous
                        .and_then(|p| entries.iter().position(|e| e.path == p))
                        .unwrap_or(self.selected)
                        .min(entries.len().saturating_sub(1));
                    self.files = entries;
                }
                Err(e) => log::warn!("reload listing failed: {e}"),
            }
        } else {
            log::debug!("reload for {} arrived after leaving it", snapshot.dir.display());
        }
        // Cached entries whose mtime changed miss here and get reloaded.
        self.refresh_target();
    }

    // ---- completion events ----

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::PreviewLoaded {
                request_id,
                path,
                result,
            } => self.on_preview_loaded(request_id, path, result),
            AppEvent::DiffLoaded {
                request_id,
                key,
                mtime,
                result,
            } => self.on_diff_loaded(request_id, key, mtime, result),
            AppEvent::ImageRendered {
                request_id,
                path,
                target,
                validity,
                result,
            } => self.on_image_rendered(request_id, path, target, validity, result),
            AppEvent::FsChanged(subscription) => {
                if let Some(delay) = self.debouncer.on_change() {
                    self.schedule(Task::Debounce { delay });
                }
                self.schedule(Task::WaitForChange(subscription));
            }
            AppEvent::DebouncedReload => {
                self.debouncer.on_fire();
                log::debug!("reloading {}", self.current_path.display());
                self.schedule_reload();
            }
            AppEvent::Reloaded(snapshot) => self.apply_reload(snapshot),
        }
    }

    fn on_preview_loaded(
        &mut self,
        request_id: RequestId,
        path: PathBuf,
        result: Result<LoadedPreview, String>,
    ) {
        if !self.request_ids.is_current(TargetKind::Preview, request_id)
            || self.preview.path.as_deref() != Some(path.as_path())
        {
            log::debug!("dropping stale preview for {}", path.display());
            return;
        }
        match result {
            Ok(loaded) => {
                self.preview.body = text_body(&loaded.content);
                self.clamp_preview_scroll();
                if !path.is_dir() {
                    self.preview_cache.put(
                        path,
                        Cached {
                            content: loaded.content,
                            validity: loaded.mtime,
                        },
                    );
                }
            }
            Err(e) => {
                log::warn!("preview {}: {}", path.display(), e);
                self.preview.body = PreviewBody::Message(format!("Error: {}", e));
            }
        }
    }

    fn on_diff_loaded(
        &mut self,
        request_id: RequestId,
        key: DiffKey,
        mtime: Mtime,
        result: Result<Vec<String>, String>,
    ) {
        if !self.request_ids.is_current(TargetKind::Diff, request_id) || !self.diff.is_target(&key)
        {
            log::debug!("dropping stale {:?} diff for {}", key.context, key.path.display());
            return;
        }
        let context = key.context;
        match result {
            Ok(lines) => {
                self.diff_cache.put(key, lines.clone(), mtime);
                let applied = self.diff.apply(context, lines);
                if applied == Applied::Shown && context == DiffContext::Quick {
                    self.schedule_diff(DiffContext::Full);
                }
            }
            Err(e) => {
                log::warn!("{e}");
                if self.diff.shown.is_none() {
                    self.diff.set_message("No diff available");
                }
            }
        }
    }

    fn on_image_rendered(
        &mut self,
        request_id: RequestId,
        path: PathBuf,
        target: ImageTarget,
        validity: ImageValidity,
        result: Result<RenderedImage, String>,
    ) {
        let still_shown = match (&self.mode, target) {
            (Mode::ImageOverlay(overlay), ImageTarget::Overlay) => overlay.path == path,
            (Mode::ImageOverlay(_), ImageTarget::Pane) => false,
            (_, ImageTarget::Pane) => self.preview.path.as_deref() == Some(path.as_path()),
            (_, ImageTarget::Overlay) => false,
        };
        if !self.request_ids.is_current(TargetKind::Image, request_id) || !still_shown {
            log::debug!("dropping stale image for {}", path.display());
            return;
        }
        match result {
            Ok(image) => {
                self.image_cache.put(path, target, image.clone(), validity);
                self.display_image(target, image);
            }
            Err(e) => {
                log::warn!("image {}: {}", path.display(), e);
                let msg = format!("Error: {}", e);
                match &mut self.mode {
                    Mode::ImageOverlay(overlay) => {
                        overlay.body = OverlayBody::Message(msg);
                        self.clear_graphics = true;
                    }
                    _ => self.preview.body = PreviewBody::Message(msg),
                }
            }
        }
    }
}

/// Restores the terminal on every exit path.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = kitty::delete_all(&mut stdout);
        let _ = disable_raw_mode();
        let _ = execute!(stdout, LeaveAlternateScreen, Show);
    }
}

/// Log to the file named by `CTXVIEW_LOG`; the terminal itself is taken.
fn init_logging() {
    let Some(path) = env::var_os("CTXVIEW_LOG") else {
        return;
    };
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            env_logger::Builder::from_default_env()
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
        }
        Err(e) => eprintln!("ctxview: cannot open log file {:?}: {}", path, e),
    }
}

async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    scheduler: &Scheduler,
    events: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let mut event_stream = EventStream::new();
    let mut tick = tokio::time::interval(IDLE_TICK);

    loop {
        for task in app.take_tasks() {
            scheduler.schedule(task);
        }

        app.maybe_expire_status();
        terminal.draw(|f| ui::draw_ui(f, app))?;
        app.flush_graphics(terminal.backend_mut())?;

        tokio::select! {
            Some(event) = events.recv() => app.handle_event(event),
            maybe_event = event_stream.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let KeyEventResult::Quit = handle_key_event(app, key) {
                        break;
                    }
                }
                Some(Ok(Event::Resize(w, h))) => app.on_resize(w, h),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("reading terminal input"),
                None => break,
            },
            _ = tick.tick() => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    if let Some(arg) = env::args().nth(1)
        && (arg == "--version" || arg == "-V")
    {
        println!("ctxview {}", VERSION);
        return Ok(());
    }

    let start = match env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => env::current_dir().context("reading current directory")?,
    };
    let root = start
        .canonicalize()
        .with_context(|| format!("cannot open {}", start.display()))?;
    let config = config::load();

    enable_raw_mode()?;
    let guard = TerminalGuard;
    let graphics = kitty::detect_support();
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    let size = terminal.size()?;
    let screen = Rect::new(0, 0, size.width, size.height);

    let (scheduler, mut events) = Scheduler::new();
    let mut app = App::new(root, config, graphics, screen);
    if app.config.watch {
        app.start_watching();
    }
    log::info!("ctxview {} started in {}", VERSION, app.root.display());

    let result = run(&mut terminal, &mut app, &scheduler, &mut events).await;
    drop(guard);
    result
}
