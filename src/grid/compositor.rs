//! Grid composition
//!
//! Lays the populated slots out on a white canvas, one 300px cell per
//! position, and encodes the result as PNG.

use std::any::Any;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::task::JoinSet;

use super::registry::Grid;
use super::{GridError, Position, COLUMNS};

/// Edge length of a square cell in pixels
pub const CELL_SIZE: u32 = 300;
/// Space between neighbouring cells
pub const GAP: u32 = 10;
/// Cell borders start this far from the cell origin, on the top/left only
pub const BORDER_INSET: u32 = 5;

pub const BACKGROUND: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
pub const BORDER_COLOR: Rgba<u8> = Rgba([0xcc, 0xcc, 0xcc, 0xff]);

/// Canvas geometry for a given number of populated slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: u32,
    pub cols: u32,
    pub width: u32,
    pub height: u32,
}

impl GridLayout {
    /// Rows come from the image count, not from the highest position used
    pub fn for_count(count: usize) -> Option<Self> {
        if count == 0 {
            return None;
        }

        let cols = COLUMNS as u32;
        let rows = (count as u32).div_ceil(cols);

        Some(Self {
            rows,
            cols,
            width: cols * CELL_SIZE + (cols - 1) * GAP,
            height: rows * CELL_SIZE + (rows - 1) * GAP,
        })
    }

    /// Number of positions that land on the canvas
    pub fn cell_count(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.index() < self.cell_count()
    }

    /// Top-left pixel of a position's cell
    pub fn cell_origin(&self, pos: Position) -> (u32, u32) {
        let col = pos.col() as u32;
        let row = pos.row() as u32;
        (col * (CELL_SIZE + GAP), row * (CELL_SIZE + GAP))
    }
}

/// A finished composition: raster plus its encoded PNG
#[derive(Debug, Clone)]
pub struct CompositionResult {
    pub layout: GridLayout,
    pub raster: RgbaImage,
    pub png: Vec<u8>,
}

impl CompositionResult {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}

/// Render a grid snapshot.
///
/// Every populated position that fits on the canvas is decoded concurrently on
/// the blocking pool. The first decode failure aborts the whole run; nothing is
/// drawn until every image is ready, and drawing then happens in position order
/// so identical input always yields identical bytes.
pub async fn compose(grid: Grid) -> Result<CompositionResult, GridError> {
    let layout = GridLayout::for_count(grid.count()).ok_or(GridError::NoImagesProvided)?;

    tracing::info!(
        "Composing {} image(s) into {}x{} ({} row(s))",
        grid.count(),
        layout.width,
        layout.height,
        layout.rows
    );

    let cells = decode_cells(&grid, &layout, decode_to_cell).await?;

    let mut canvas = blank_canvas(layout.width, layout.height)?;

    for pos in Position::all().take(layout.cell_count()) {
        let (x, y) = layout.cell_origin(pos);
        if let Some(img) = &cells[pos.index()] {
            let offset_x = (CELL_SIZE - img.width()) / 2;
            let offset_y = (CELL_SIZE - img.height()) / 2;
            imageops::overlay(&mut canvas, img, (x + offset_x) as i64, (y + offset_y) as i64);
        }
        stroke_border(&mut canvas, x + BORDER_INSET, y + BORDER_INSET, CELL_SIZE);
    }

    let png = encode_png(&canvas)?;

    tracing::info!("Composition finished: {} bytes of PNG", png.len());

    Ok(CompositionResult {
        layout,
        raster: canvas,
        png,
    })
}

/// Run `decode` for every on-canvas slot on the blocking pool and collect the
/// cells by index. A decoder panic is reported against the slot it was decoding.
async fn decode_cells<F>(
    grid: &Grid,
    layout: &GridLayout,
    decode: F,
) -> Result<Vec<Option<RgbaImage>>, GridError>
where
    F: Fn(Position, &[u8]) -> Result<RgbaImage, GridError> + Copy + Send + 'static,
{
    let mut decodes = JoinSet::new();
    for (pos, payload) in grid.slots() {
        if !layout.contains(*pos) {
            tracing::warn!("Position {} is outside a {}-row grid and will not be rendered", pos, layout.rows);
            continue;
        }
        let pos = *pos;
        let bytes = Arc::clone(payload.bytes());
        decodes.spawn_blocking(move || {
            // Only unwinds in builds without panic = "abort"
            let decoded = panic::catch_unwind(AssertUnwindSafe(|| decode(pos, &bytes)))
                .unwrap_or_else(|payload| {
                    Err(GridError::ImageDecodeFailure {
                        position: pos,
                        reason: panic_reason(payload.as_ref()),
                    })
                });
            decoded.map(|img| (pos, img))
        });
    }

    let mut cells: Vec<Option<RgbaImage>> = vec![None; layout.cell_count()];
    while let Some(joined) = decodes.join_next().await {
        let (pos, img) = joined.map_err(|e| GridError::TaskFailed(e.to_string()))??;
        cells[pos.index()] = Some(img);
    }

    Ok(cells)
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("decoder panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("decoder panicked: {}", msg)
    } else {
        "decoder panicked".to_string()
    }
}

/// Decode one payload and scale it to fit inside a cell without cropping
fn decode_to_cell(pos: Position, bytes: &[u8]) -> Result<RgbaImage, GridError> {
    let img = image::load_from_memory(bytes).map_err(|e| GridError::ImageDecodeFailure {
        position: pos,
        reason: e.to_string(),
    })?;

    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return Err(GridError::ImageDecodeFailure {
            position: pos,
            reason: "image has no pixels".to_string(),
        });
    }

    let (draw_w, draw_h) = fit_within(w, h, CELL_SIZE);
    let rgba = img.to_rgba8();
    if (draw_w, draw_h) == (w, h) {
        return Ok(rgba);
    }

    Ok(imageops::resize(&rgba, draw_w, draw_h, FilterType::Lanczos3))
}

/// Uniform scale so the larger side matches `size`
pub fn fit_within(width: u32, height: u32, size: u32) -> (u32, u32) {
    let ratio = f64::min(size as f64 / width as f64, size as f64 / height as f64);
    let scale = |d: u32| ((d as f64 * ratio).round() as u32).clamp(1, size);
    (scale(width), scale(height))
}

/// Allocate the white canvas, reporting failure instead of aborting
fn blank_canvas(width: u32, height: u32) -> Result<RgbaImage, GridError> {
    let unavailable = || GridError::RenderContextUnavailable { width, height };

    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(unavailable)?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| unavailable())?;
    buf.extend(std::iter::repeat(BACKGROUND.0).take(len / 4).flatten());

    RgbaImage::from_raw(width, height, buf).ok_or_else(unavailable)
}

/// 1px rectangle outline with its top-left at (x, y), clipped to the canvas
fn stroke_border(canvas: &mut RgbaImage, x: u32, y: u32, size: u32) {
    let (w, h) = canvas.dimensions();
    let mut put = |px: u32, py: u32| {
        if px < w && py < h {
            canvas.put_pixel(px, py, BORDER_COLOR);
        }
    };

    for i in 0..=size {
        put(x + i, y);
        put(x + i, y + size);
        put(x, y + i);
        put(x + size, y + i);
    }
}

fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, GridError> {
    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| GridError::EncodeFailure(e.to_string()))?;
    Ok(png)
}
