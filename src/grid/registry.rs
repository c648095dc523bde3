use std::path::Path;
use std::sync::Arc;

use image::ImageFormat;

use super::{data_uri, GridError, Position, SLOT_COUNT};

const UNKNOWN_MIME: &str = "application/octet-stream";

/// Raw bytes of an uploaded file plus what we know about it
#[derive(Debug, Clone)]
pub struct ImagePayload {
    name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl ImagePayload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, typing it by extension first and content second
    pub async fn from_path(path: &Path) -> Result<Self, GridError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| GridError::FileReadFailure {
            origin: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mime = ImageFormat::from_path(path)
            .or_else(|_| image::guess_format(&bytes))
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| UNKNOWN_MIME.to_string());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, mime, bytes))
    }

    /// Parse a `data:image/...;base64,` URI
    pub fn from_data_uri(uri: &str) -> Result<Self, GridError> {
        let (mime, bytes) = data_uri::decode(uri)?;
        Ok(Self::new("data URI", mime, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// The nine upload slots. Every mutation bumps `generation`
#[derive(Debug, Default)]
pub struct ImageRegistry {
    slots: [Option<ImagePayload>; SLOT_COUNT],
    generation: u64,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload at `pos`, replacing whatever was there.
    /// Non-image payloads are rejected and leave the registry untouched.
    pub fn set_image(&mut self, pos: Position, payload: ImagePayload) -> Result<(), GridError> {
        if !payload.is_image() {
            return Err(GridError::InvalidFileType {
                mime: payload.mime().to_string(),
            });
        }

        self.slots[pos.index()] = Some(payload);
        self.generation += 1;
        Ok(())
    }

    /// Clear a slot. Clearing an empty slot still counts as a change
    pub fn remove_image(&mut self, pos: Position) {
        self.slots[pos.index()] = None;
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.generation += 1;
    }

    pub fn get(&self, pos: Position) -> Option<&ImagePayload> {
        self.slots[pos.index()].as_ref()
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Populated slots in position order
    pub fn iter(&self) -> impl Iterator<Item = (Position, &ImagePayload)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| Some((Position::from_index(i)?, slot.as_ref()?)))
    }

    /// Immutable copy of the populated slots for a composition run
    pub fn snapshot(&self) -> Grid {
        Grid {
            slots: self.iter().map(|(pos, p)| (pos, p.clone())).collect(),
            generation: self.generation,
        }
    }
}

/// Populated slots frozen at a registry generation
#[derive(Debug, Clone)]
pub struct Grid {
    slots: Vec<(Position, ImagePayload)>,
    generation: u64,
}

impl Grid {
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[(Position, ImagePayload)] {
        &self.slots
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_payload(name: &str) -> ImagePayload {
        ImagePayload::new(name, "image/png", vec![0u8; 4])
    }

    fn pos(n: u8) -> Position {
        Position::new(n).unwrap()
    }

    #[test]
    fn test_set_and_count() {
        let mut registry = ImageRegistry::new();
        assert_eq!(registry.count(), 0);

        registry.set_image(pos(1), png_payload("a.png")).unwrap();
        registry.set_image(pos(5), png_payload("b.png")).unwrap();
        assert_eq!(registry.count(), 2);

        // Overwrite keeps the count
        registry.set_image(pos(5), png_payload("c.png")).unwrap();
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(pos(5)).map(|p| p.name()), Some("c.png"));
    }

    #[test]
    fn test_non_image_leaves_registry_unchanged() {
        let mut registry = ImageRegistry::new();
        registry.set_image(pos(2), png_payload("keep.png")).unwrap();
        let generation = registry.generation();

        let text = ImagePayload::new("notes.txt", "text/plain", b"hello".to_vec());
        let err = registry.set_image(pos(2), text).unwrap_err();

        assert!(matches!(err, GridError::InvalidFileType { ref mime } if mime == "text/plain"));
        assert_eq!(registry.get(pos(2)).map(|p| p.name()), Some("keep.png"));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.generation(), generation, "Rejected upload must not count as a change");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = ImageRegistry::new();
        registry.set_image(pos(3), png_payload("a.png")).unwrap();
        registry.set_image(pos(4), png_payload("b.png")).unwrap();

        registry.remove_image(pos(3));
        assert_eq!(registry.count(), 1);
        registry.remove_image(pos(3));
        assert_eq!(registry.count(), 1);
        assert!(registry.get(pos(3)).is_none());
    }

    #[test]
    fn test_every_mutation_bumps_generation() {
        let mut registry = ImageRegistry::new();
        let g0 = registry.generation();
        registry.set_image(pos(1), png_payload("a.png")).unwrap();
        let g1 = registry.generation();
        registry.remove_image(pos(9));
        let g2 = registry.generation();
        registry.clear();
        let g3 = registry.generation();
        assert!(g0 < g1 && g1 < g2 && g2 < g3);
    }

    #[test]
    fn test_snapshot_is_ordered_and_frozen() {
        let mut registry = ImageRegistry::new();
        registry.set_image(pos(8), png_payload("h.png")).unwrap();
        registry.set_image(pos(2), png_payload("b.png")).unwrap();

        let grid = registry.snapshot();
        registry.remove_image(pos(2));

        let order: Vec<u8> = grid.slots().iter().map(|(p, _)| p.get()).collect();
        assert_eq!(order, vec![2, 8]);
        assert_eq!(grid.count(), 2);
        assert_ne!(grid.generation(), registry.generation());
    }

    #[test]
    fn test_from_data_uri() {
        let payload = ImagePayload::from_data_uri("data:image/gif;base64,R0lG").unwrap();
        assert!(payload.is_image());
        assert_eq!(payload.mime(), "image/gif");
        assert_eq!(payload.bytes().as_ref(), b"GIF");
    }

    #[tokio::test]
    async fn test_from_path_types_by_extension_then_content() {
        let dir = std::env::temp_dir().join(format!("ninegrid-registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let named = dir.join("photo.jpg");
        std::fs::write(&named, b"not really a jpeg").unwrap();
        let sniffed = dir.join("mystery");
        std::fs::write(&sniffed, &png).unwrap();
        let text = dir.join("readme");
        std::fs::write(&text, b"plain words").unwrap();

        let payload = ImagePayload::from_path(&named).await.unwrap();
        assert_eq!(payload.mime(), "image/jpeg");
        assert_eq!(payload.name(), "photo.jpg");

        let payload = ImagePayload::from_path(&sniffed).await.unwrap();
        assert_eq!(payload.mime(), "image/png");

        let payload = ImagePayload::from_path(&text).await.unwrap();
        assert!(!payload.is_image());

        let missing = ImagePayload::from_path(&dir.join("gone.png")).await;
        assert!(matches!(missing, Err(GridError::FileReadFailure { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
