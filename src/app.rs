use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::grid::compositor::{self, CompositionResult, GridLayout};
use crate::grid::export::{self, DOWNLOAD_FILENAME};
use crate::grid::registry::ImagePayload;
use crate::grid::session::{Session, WidgetState};
use crate::grid::{GridError, Position, COLUMNS};

/// Seconds a status message stays in the info line
const STATUS_TIMEOUT_SECS: u64 = 3;

/// Extensions the file picker lists; anything else is hidden
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "pbm", "pgm", "ppm", "pnm", "pam",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    None,
    FileBrowser,
    Help,
    Confirm,
}

pub struct App {
    pub popup: Popup,

    // Slots, cached composition and the in-progress flag
    pub session: Session,
    pub selected: Position,

    // Config
    pub config: AppConfig,
    pub output_dir: PathBuf,

    // Status message (shown in info line, auto-clears after timeout)
    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,
    pub confirm_message: String,

    // File browser state
    pub browser_path: PathBuf,
    pub browser_entries: Vec<BrowserEntry>,
    pub browser_selected: usize,

    // Background composition
    pub compose_task: Option<JoinHandle<Result<CompositionResult, GridError>>>,
    pub compose_started: Option<Instant>,
    compose_generation: u64,

    // Where the last download went
    pub last_saved: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BrowserEntry {
    pub name: String,
    pub is_dir: bool,
    pub path: PathBuf,
}

impl App {
    pub fn new(config: AppConfig, output_dir: PathBuf) -> Self {
        Self {
            popup: Popup::None,

            session: Session::new(),
            selected: Position::FIRST,

            browser_path: config.browse_dir(),
            browser_entries: Vec::new(),
            browser_selected: 0,

            config,
            output_dir,

            status_message: None,
            status_message_time: None,
            confirm_message: String::new(),

            compose_task: None,
            compose_started: None,
            compose_generation: 0,

            last_saved: None,
        }
    }

    /// Set a status message (auto-clears after 3 seconds)
    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_message_time = Some(Instant::now());
    }

    /// Canvas layout the current slots would produce
    pub fn layout(&self) -> Option<GridLayout> {
        GridLayout::for_count(self.session.registry().count())
    }

    pub fn state(&self) -> WidgetState {
        self.session.state()
    }

    pub async fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        // Handle popups first
        if self.popup != Popup::None {
            return self.handle_popup_key(key).await;
        }

        // Handle normal key input
        self.handle_normal_key(key).await
    }

    async fn handle_normal_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            // Grid navigation
            KeyCode::Left | KeyCode::Char('h') => self.move_selection(0, -1),
            KeyCode::Right | KeyCode::Char('l') => self.move_selection(0, 1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1, 0),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1, 0),

            // Jump straight to a position
            KeyCode::Char(c @ '1'..='9') => {
                if let Some(pos) = c.to_digit(10).and_then(|n| Position::new(n as u8).ok()) {
                    self.selected = pos;
                }
            }

            // Pick an image for the selected slot
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Char('o') => self.start_file_browser(),

            // Remove the selected image
            KeyCode::Char('d') | KeyCode::Delete | KeyCode::Backspace => self.remove_selected(),

            // Compose the grid
            KeyCode::Char('g') => self.start_compose(),

            // Download the preview
            KeyCode::Char('s') => self.download().await,

            // Clear every slot (asks first)
            KeyCode::Char('X') => {
                if self.session.registry().count() > 0 {
                    self.confirm_message = "Remove all images?".to_string();
                    self.popup = Popup::Confirm;
                }
            }

            KeyCode::Char('?') => self.popup = Popup::Help,

            _ => {}
        }
        Ok(())
    }

    async fn handle_popup_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.popup {
            Popup::FileBrowser => self.handle_browser_key(key).await,
            Popup::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Enter | KeyCode::Char('q')) {
                    self.popup = Popup::None;
                }
                Ok(())
            }
            Popup::Confirm => {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Enter => {
                        self.confirm_action();
                        self.popup = Popup::None;
                    }
                    KeyCode::Char('n') | KeyCode::Esc => {
                        self.popup = Popup::None;
                    }
                    _ => {}
                }
                Ok(())
            }
            Popup::None => Ok(()),
        }
    }

    /// Move the cursor over the 3x3 grid, wrapping at the edges
    fn move_selection(&mut self, d_row: i8, d_col: i8) {
        let n = COLUMNS as i8;
        let row = (self.selected.row() as i8 + d_row).rem_euclid(n) as u8;
        let col = (self.selected.col() as i8 + d_col).rem_euclid(n) as u8;
        if let Some(pos) = Position::at(row, col) {
            self.selected = pos;
        }
    }

    fn remove_selected(&mut self) {
        let had_image = self.session.registry().get(self.selected).is_some();
        self.session.remove_image(self.selected);
        if had_image {
            self.set_status(format!("Removed image {}", self.selected));
        }
    }

    fn confirm_action(&mut self) {
        self.session.clear();
        self.set_status("All images removed");
    }

    fn start_file_browser(&mut self) {
        self.popup = Popup::FileBrowser;
        self.browser_path = self.config.browse_dir();
        self.browser_selected = 0;
        self.refresh_browser();
    }

    fn refresh_browser(&mut self) {
        self.browser_entries.clear();

        // Add parent directory entry if not at root
        if let Some(parent) = self.browser_path.parent() {
            self.browser_entries.push(BrowserEntry {
                name: "..".to_string(),
                is_dir: true,
                path: parent.to_path_buf(),
            });
        }

        // Read directory contents
        if let Ok(entries) = std::fs::read_dir(&self.browser_path) {
            let mut dirs: Vec<BrowserEntry> = Vec::new();
            let mut files: Vec<BrowserEntry> = Vec::new();

            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();

                if name.starts_with('.') && !self.config.show_hidden {
                    continue;
                }

                if path.is_dir() {
                    dirs.push(BrowserEntry {
                        name,
                        is_dir: true,
                        path,
                    });
                } else if is_image_file(&path) {
                    files.push(BrowserEntry {
                        name,
                        is_dir: false,
                        path,
                    });
                }
            }

            // Sort alphabetically
            dirs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            files.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

            self.browser_entries.extend(dirs);
            self.browser_entries.extend(files);
        }

        if self.browser_selected >= self.browser_entries.len() {
            self.browser_selected = 0;
        }
    }

    async fn handle_browser_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.popup = Popup::None;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.browser_entries.is_empty() {
                    self.browser_selected = (self.browser_selected + 1) % self.browser_entries.len();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if !self.browser_entries.is_empty() {
                    self.browser_selected = self.browser_selected.checked_sub(1)
                        .unwrap_or(self.browser_entries.len() - 1);
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(entry) = self.browser_entries.get(self.browser_selected).cloned() {
                    if entry.is_dir {
                        self.browser_path = entry.path;
                        self.browser_selected = 0;
                        self.refresh_browser();
                    } else {
                        self.load_image(&entry.path).await;
                    }
                }
            }
            KeyCode::Backspace => {
                if let Some(parent) = self.browser_path.parent() {
                    self.browser_path = parent.to_path_buf();
                    self.browser_selected = 0;
                    self.refresh_browser();
                }
            }
            KeyCode::Char('~') => {
                self.browser_path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
                self.browser_selected = 0;
                self.refresh_browser();
            }
            _ => {}
        }
        Ok(())
    }

    /// Read a file into the selected slot. Failures keep the picker open and the slot as it was
    pub async fn load_image(&mut self, path: &Path) {
        let loaded = match ImagePayload::from_path(path).await {
            Ok(payload) => {
                let name = payload.name().to_string();
                self.session.set_image(self.selected, payload).map(|_| name)
            }
            Err(e) => Err(e),
        };

        match loaded {
            Ok(name) => {
                self.set_status(format!("Position {}: {}", self.selected, name));
                self.popup = Popup::None;

                // Persisted when the TUI exits
                self.config.last_directory = path.parent().map(Path::to_path_buf);
            }
            Err(e) => {
                tracing::warn!("Rejected {}: {}", path.display(), e);
                self.set_status(e.to_string());
            }
        }
    }

    /// Kick off composition in the background; ignored while one is running
    pub fn start_compose(&mut self) {
        if self.session.is_composing() {
            return;
        }

        match self.session.begin_compose() {
            Ok(grid) => {
                self.compose_generation = grid.generation();
                self.compose_task = Some(tokio::spawn(compositor::compose(grid)));
                self.compose_started = Some(Instant::now());
                self.set_status("Composing...");
            }
            Err(e) => self.set_status(e.to_string()),
        }
    }

    /// Collect a finished background composition, if any
    async fn poll_compose(&mut self) {
        let finished = self.compose_task.as_ref().map(|t| t.is_finished()).unwrap_or(false);
        if !finished {
            return;
        }

        let Some(task) = self.compose_task.take() else {
            return;
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(GridError::TaskFailed(e.to_string())),
        };

        let elapsed = self.compose_started.take().map(|t| t.elapsed().as_millis()).unwrap_or(0);
        self.finish_compose(outcome, elapsed);
    }

    fn finish_compose(&mut self, outcome: Result<CompositionResult, GridError>, elapsed_ms: u128) {
        match self.session.finish_compose(self.compose_generation, outcome) {
            Ok(result) => {
                let msg = format!("Composed {}x{} in {} ms, press s to save", result.width(), result.height(), elapsed_ms);
                self.set_status(msg);
            }
            Err(GridError::CompositionOutdated) => {
                self.set_status("Grid changed while composing, press g again");
            }
            Err(e) => {
                tracing::error!("Composition failed: {}", e);
                self.notify_user("Composition failed", &e.to_string());
                self.set_status(format!("Error: {}", e));
            }
        }
    }

    /// Save the previewed PNG into the output directory
    pub async fn download(&mut self) {
        let Some(uri) = self.session.data_uri() else {
            self.set_status("Compose the grid first (g)");
            return;
        };

        match export::download(&uri, &self.output_dir, DOWNLOAD_FILENAME).await {
            Ok(path) => {
                self.set_status(format!("Saved {}", path.display()));
                self.notify_user("ninegrid", &format!("Saved {}", path.display()));
                self.last_saved = Some(path);
            }
            Err(e) => {
                self.set_status(format!("Error: {}", e));
            }
        }
    }

    fn notify_user(&self, summary: &str, body: &str) {
        if !self.config.notifications {
            return;
        }
        crate::delivered(crate::notify(summary, body));
    }

    /// Periodic housekeeping: expire status messages and collect compositions
    pub async fn tick(&mut self) -> Result<()> {
        if let Some(t) = self.status_message_time {
            if t.elapsed().as_secs() >= STATUS_TIMEOUT_SECS && self.compose_task.is_none() {
                self.status_message = None;
                self.status_message_time = None;
            }
        }

        self.poll_compose().await;
        Ok(())
    }
}

/// Whether the picker should offer this file
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_app() -> App {
        let config = AppConfig {
            notifications: false,
            ..AppConfig::default()
        };
        App::new(config, std::env::temp_dir())
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(20, 10, Rgba([0, 128, 255, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/photo.JPG")));
        assert!(is_image_file(Path::new("x.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("Makefile")));
    }

    #[tokio::test]
    async fn test_selection_wraps() {
        let mut app = test_app();
        app.handle_key(key(KeyCode::Left)).await.unwrap();
        assert_eq!(app.selected.get(), 3);
        app.handle_key(key(KeyCode::Up)).await.unwrap();
        assert_eq!(app.selected.get(), 9);
        app.handle_key(key(KeyCode::Char('5'))).await.unwrap();
        assert_eq!(app.selected.get(), 5);
        app.handle_key(key(KeyCode::Down)).await.unwrap();
        assert_eq!(app.selected.get(), 8);
    }

    #[tokio::test]
    async fn test_compose_without_images_reports() {
        let mut app = test_app();
        app.handle_key(key(KeyCode::Char('g'))).await.unwrap();
        assert!(app.compose_task.is_none());
        assert_eq!(app.status_message.as_deref(), Some("Upload at least one image first"));
    }

    #[tokio::test]
    async fn test_load_compose_and_save() {
        let dir = std::env::temp_dir().join(format!("ninegrid-app-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let png = write_png(&dir, "tile.png");
        let text = dir.join("notes.png");
        std::fs::write(&text, b"plain text with a png name").unwrap();

        let mut app = test_app();
        app.output_dir = dir.join("out");

        app.load_image(&png).await;
        assert_eq!(app.session.registry().count(), 1);

        // Saving before composing is refused
        app.download().await;
        assert!(app.last_saved.is_none());

        app.start_compose();
        assert_eq!(app.state(), WidgetState::Composing);
        // A second trigger while running is ignored
        app.start_compose();

        while app.compose_task.is_some() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            app.tick().await.unwrap();
        }
        assert_eq!(app.state(), WidgetState::Previewing);

        app.download().await;
        let saved = app.last_saved.clone().unwrap();
        assert!(saved.ends_with(DOWNLOAD_FILENAME));
        assert!(saved.exists());

        // A corrupt file with an image extension is accepted, then fails composition
        app.selected = Position::new(2).unwrap();
        app.load_image(&text).await;
        assert_eq!(app.state(), WidgetState::Editing);
        app.start_compose();
        while app.compose_task.is_some() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            app.tick().await.unwrap();
        }
        assert!(app.session.result().is_none());
        assert!(app.status_message.as_deref().unwrap_or("").contains("position 2"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_clear_all_asks_first() {
        let mut app = test_app();
        app.session
            .set_image(Position::FIRST, ImagePayload::new("a.png", "image/png", vec![1u8]))
            .unwrap();

        app.handle_key(key(KeyCode::Char('X'))).await.unwrap();
        assert_eq!(app.popup, Popup::Confirm);
        app.handle_key(key(KeyCode::Char('n'))).await.unwrap();
        assert_eq!(app.session.registry().count(), 1);

        app.handle_key(key(KeyCode::Char('X'))).await.unwrap();
        app.handle_key(key(KeyCode::Char('y'))).await.unwrap();
        assert_eq!(app.popup, Popup::None);
        assert_eq!(app.session.registry().count(), 0);
    }
}
