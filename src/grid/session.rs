use super::compositor::{self, CompositionResult};
use super::registry::{Grid, ImagePayload, ImageRegistry};
use super::{export, GridError, Position};

/// Where the widget is in its upload → compose → preview cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Empty,
    Editing,
    Composing,
    Previewing,
}

/// Registry plus the composition derived from it.
///
/// The cached result is dropped on every slot change so a preview can never
/// show an older grid than the one being edited.
#[derive(Debug, Default)]
pub struct Session {
    registry: ImageRegistry,
    result: Option<CompositionResult>,
    composing: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            registry: ImageRegistry::new(),
            result: None,
            composing: false,
        }
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    pub fn result(&self) -> Option<&CompositionResult> {
        self.result.as_ref()
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn state(&self) -> WidgetState {
        if self.composing {
            WidgetState::Composing
        } else if self.result.is_some() {
            WidgetState::Previewing
        } else if self.registry.count() == 0 {
            WidgetState::Empty
        } else {
            WidgetState::Editing
        }
    }

    pub fn set_image(&mut self, pos: Position, payload: ImagePayload) -> Result<(), GridError> {
        self.registry.set_image(pos, payload)?;
        self.result = None;
        Ok(())
    }

    pub fn remove_image(&mut self, pos: Position) {
        self.registry.remove_image(pos);
        self.result = None;
    }

    pub fn clear(&mut self) {
        self.registry.clear();
        self.result = None;
    }

    /// Raise the in-progress flag and hand out a snapshot to render
    pub fn begin_compose(&mut self) -> Result<Grid, GridError> {
        if self.composing {
            return Err(GridError::CompositionInProgress);
        }
        if self.registry.count() == 0 {
            return Err(GridError::NoImagesProvided);
        }

        self.composing = true;
        Ok(self.registry.snapshot())
    }

    /// Lower the flag and keep the outcome of the run taken at
    /// `grid_generation`. If the grid moved on meanwhile, whatever the run
    /// produced (result or error) is dropped as outdated.
    pub fn finish_compose(
        &mut self,
        grid_generation: u64,
        outcome: Result<CompositionResult, GridError>,
    ) -> Result<&CompositionResult, GridError> {
        self.composing = false;
        self.result = None;

        if grid_generation != self.registry.generation() {
            tracing::info!("Discarding composition of generation {}", grid_generation);
            return Err(GridError::CompositionOutdated);
        }

        Ok(self.result.insert(outcome?))
    }

    /// Compose in place, for callers that can simply wait
    pub async fn compose(&mut self) -> Result<&CompositionResult, GridError> {
        let grid = self.begin_compose()?;
        let generation = grid.generation();
        let outcome = compositor::compose(grid).await;
        self.finish_compose(generation, outcome)
    }

    /// Data URI of the current preview, if there is one
    pub fn data_uri(&self) -> Option<String> {
        self.result.as_ref().map(export::to_data_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn pos(n: u8) -> Position {
        Position::new(n).unwrap()
    }

    fn png(color: [u8; 4]) -> ImagePayload {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(30, 20, Rgba(color))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        ImagePayload::new("tile.png", "image/png", bytes)
    }

    #[tokio::test]
    async fn test_state_cycle() {
        let mut session = Session::new();
        assert_eq!(session.state(), WidgetState::Empty);

        session.set_image(pos(1), png([10, 200, 10, 255])).unwrap();
        assert_eq!(session.state(), WidgetState::Editing);

        let grid = session.begin_compose().unwrap();
        assert_eq!(session.state(), WidgetState::Composing);
        assert!(matches!(session.begin_compose(), Err(GridError::CompositionInProgress)));

        let generation = grid.generation();
        let outcome = compositor::compose(grid).await;
        session.finish_compose(generation, outcome).unwrap();
        assert_eq!(session.state(), WidgetState::Previewing);
        assert!(session.data_uri().is_some());

        // Any slot change drops straight back to editing
        session.set_image(pos(2), png([200, 10, 10, 255])).unwrap();
        assert_eq!(session.state(), WidgetState::Editing);
        assert!(session.result().is_none());
        assert!(session.data_uri().is_none());
    }

    #[tokio::test]
    async fn test_remove_invalidates_preview() {
        let mut session = Session::new();
        session.set_image(pos(1), png([1, 1, 1, 255])).unwrap();
        session.set_image(pos(4), png([2, 2, 2, 255])).unwrap();
        session.compose().await.unwrap();
        assert!(session.result().is_some());

        let before = session.registry().count();
        session.remove_image(pos(4));
        assert_eq!(session.registry().count(), before - 1);
        assert!(session.result().is_none());
        assert_eq!(session.state(), WidgetState::Editing);
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_preview() {
        let mut session = Session::new();
        session.set_image(pos(1), png([1, 1, 1, 255])).unwrap();
        session.compose().await.unwrap();

        let text = ImagePayload::new("a.txt", "text/plain", b"x".to_vec());
        assert!(session.set_image(pos(2), text).is_err());
        assert_eq!(session.state(), WidgetState::Previewing);
    }

    #[tokio::test]
    async fn test_empty_compose_is_rejected() {
        let mut session = Session::new();
        assert!(matches!(session.compose().await, Err(GridError::NoImagesProvided)));
        assert!(!session.is_composing());
        assert_eq!(session.state(), WidgetState::Empty);
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let mut session = Session::new();
        session.set_image(pos(1), png([5, 5, 5, 255])).unwrap();

        let grid = session.begin_compose().unwrap();
        let generation = grid.generation();
        session.set_image(pos(2), png([6, 6, 6, 255])).unwrap();
        let outcome = compositor::compose(grid).await;

        assert!(matches!(
            session.finish_compose(generation, outcome),
            Err(GridError::CompositionOutdated)
        ));
        assert_eq!(session.state(), WidgetState::Editing);
    }

    #[tokio::test]
    async fn test_stale_failure_is_reported_as_outdated() {
        let mut session = Session::new();
        session
            .set_image(pos(1), ImagePayload::new("bad.png", "image/png", vec![0u8; 16]))
            .unwrap();

        let grid = session.begin_compose().unwrap();
        let generation = grid.generation();
        // The broken image is swapped out before the run reports back
        session.set_image(pos(1), png([7, 7, 7, 255])).unwrap();
        let outcome = compositor::compose(grid).await;
        assert!(outcome.is_err());

        assert!(matches!(
            session.finish_compose(generation, outcome),
            Err(GridError::CompositionOutdated)
        ));
        assert!(!session.is_composing());
        assert!(session.result().is_none());
    }

    #[tokio::test]
    async fn test_failure_clears_previous_preview() {
        let mut session = Session::new();
        session.set_image(pos(1), png([5, 5, 5, 255])).unwrap();
        session.set_image(pos(2), png([6, 6, 6, 255])).unwrap();
        session.compose().await.unwrap();

        session
            .set_image(pos(3), ImagePayload::new("bad.png", "image/png", vec![0u8; 16]))
            .unwrap();
        let err = session.compose().await.unwrap_err();

        assert!(matches!(err, GridError::ImageDecodeFailure { position, .. } if position == pos(3)));
        assert!(session.result().is_none());
        assert_eq!(session.state(), WidgetState::Editing);
    }

    #[tokio::test]
    async fn test_download_of_preview_round_trips() {
        let mut session = Session::new();
        session.set_image(pos(5), png([9, 9, 9, 255])).unwrap();
        let expected = session.compose().await.unwrap().png.clone();

        let dir = std::env::temp_dir().join(format!("ninegrid-session-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let uri = session.data_uri().unwrap();
        let path = export::download(&uri, &dir, export::DOWNLOAD_FILENAME).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), expected);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
