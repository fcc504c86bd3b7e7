use super::{ClassNames, Detection};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid font file {0}")]
    InvalidFont(PathBuf),
}

pub fn color_for(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Box outline width scaled to the image size.
pub fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

fn font_size(width: u32, height: u32) -> f32 {
    ((width + height) as f32 / 2.0 * 0.035).round().max(12.0)
}

/// Burns detection boxes (and labels, when a font is available) into an image.
pub struct Renderer {
    class_names: ClassNames,
    font: Option<FontVec>,
}

impl Renderer {
    pub fn new(class_names: ClassNames, font: Option<FontVec>) -> Self {
        Self { class_names, font }
    }

    pub fn load(class_names: ClassNames, font_path: Option<&Path>) -> Result<Self, RenderError> {
        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| RenderError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|_| RenderError::InvalidFont(path.to_path_buf()))?;
                Some(font)
            }
            None => None,
        };
        Ok(Self::new(class_names, font))
    }

    pub fn has_labels(&self) -> bool {
        self.font.is_some()
    }

    pub fn render(&self, image: &mut RgbImage, detections: &[Detection]) {
        let (width, height) = image.dimensions();
        let thickness = line_width(width, height);

        for detection in detections {
            let color = color_for(detection.class_id);
            let x1 = detection.x1.max(0.0).round() as u32;
            let y1 = detection.y1.max(0.0).round() as u32;
            let x2 = (detection.x2.round() as u32).min(width);
            let y2 = (detection.y2.round() as u32).min(height);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            // Inset each ring so the outline stays inside the box.
            for offset in 0..thickness {
                let w = (x2 - x1).saturating_sub(2 * offset);
                let h = (y2 - y1).saturating_sub(2 * offset);
                if w == 0 || h == 0 {
                    break;
                }
                let ring = Rect::at((x1 + offset) as i32, (y1 + offset) as i32).of_size(w, h);
                draw_hollow_rect_mut(image, ring, color);
            }

            if let Some(font) = &self.font {
                let label = format!(
                    "{} {:.2}",
                    self.class_names.name(detection.class_id),
                    detection.confidence
                );
                draw_label(image, font, &label, (x1, y1), color);
            }
        }
    }
}

fn draw_label(image: &mut RgbImage, font: &FontVec, label: &str, (x, y): (u32, u32), color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let scale = PxScale::from(font_size(width, height));
    let (text_w, text_h) = text_size(scale, font, label);
    if text_w == 0 || text_h == 0 {
        return;
    }

    let tab_w = text_w + 2;
    let tab_h = text_h + 2;
    // Above the box, or inside it when there is no room at the top edge.
    let tab_y = if y >= tab_h { y - tab_h } else { y };

    draw_filled_rect_mut(image, Rect::at(x as i32, tab_y as i32).of_size(tab_w, tab_h), color);
    draw_text_mut(
        image,
        TEXT_COLOR,
        x as i32 + 1,
        tab_y as i32 + 1,
        scale,
        font,
        label,
    );
}
