//! Terminal thumbnail of the composed raster using upper half blocks,
//! two image rows per text row.

use image::{Rgba, RgbaImage};
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

const HALF_BLOCK: &str = "▀";

/// Nearest-neighbour downsample of `raster` to fit `cols` x `rows` terminal cells
pub fn thumbnail(raster: &RgbaImage, cols: u16, rows: u16) -> Vec<Line<'static>> {
    let (rw, rh) = raster.dimensions();
    if cols == 0 || rows == 0 || rw == 0 || rh == 0 {
        return Vec::new();
    }

    let scale = f64::min(cols as f64 / rw as f64, (rows as f64 * 2.0) / rh as f64);
    // Epsilon keeps exact fits from flooring one short
    let out_w = ((rw as f64 * scale + 1e-9).floor() as u32).clamp(1, cols as u32);
    let out_h = ((rh as f64 * scale + 1e-9).floor() as u32).clamp(1, rows as u32 * 2);

    let sample = |x: u32, y: u32| -> Color {
        let sx = ((x as f64 + 0.5) / scale) as u32;
        let sy = ((y as f64 + 0.5) / scale) as u32;
        to_color(raster.get_pixel(sx.min(rw - 1), sy.min(rh - 1)))
    };

    (0..out_h)
        .step_by(2)
        .map(|y| {
            let spans: Vec<Span<'static>> = (0..out_w)
                .map(|x| {
                    let top = sample(x, y);
                    let style = if y + 1 < out_h {
                        Style::default().fg(top).bg(sample(x, y + 1))
                    } else {
                        Style::default().fg(top)
                    };
                    Span::styled(HALF_BLOCK, style)
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn to_color(p: &Rgba<u8>) -> Color {
    Color::Rgb(p[0], p[1], p[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_fits_area() {
        let raster = RgbaImage::from_pixel(920, 300, Rgba([255, 255, 255, 255]));
        let lines = thumbnail(&raster, 46, 20);

        // 46 columns wide means a 46x15 pixel grid, so 8 text rows
        assert_eq!(lines.len(), 8);
        assert!(lines.iter().all(|l| l.spans.len() == 46));
    }

    #[test]
    fn test_thumbnail_colors() {
        let mut raster = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        raster.put_pixel(0, 1, Rgba([204, 204, 204, 255]));

        let lines = thumbnail(&raster, 2, 1);
        assert_eq!(lines.len(), 1);
        let first = &lines[0].spans[0];
        assert_eq!(first.style.fg, Some(Color::Rgb(255, 255, 255)));
        assert_eq!(first.style.bg, Some(Color::Rgb(204, 204, 204)));
    }

    #[test]
    fn test_thumbnail_empty_area() {
        let raster = RgbaImage::new(10, 10);
        assert!(thumbnail(&raster, 0, 5).is_empty());
    }
}
