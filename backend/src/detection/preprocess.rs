use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

const PAD_VALUE: u8 = 114;

/// Scale and offset applied when fitting an image into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    pub gain: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxGeometry {
    /// Maps a point from model-input coordinates back to the original image.
    pub fn restore(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.gain, (y - self.pad_y) / self.gain)
    }
}

pub struct Letterbox {
    pub image: RgbImage,
    pub geometry: LetterboxGeometry,
}

/// Resizes keeping aspect ratio and centres the result on a grey square canvas.
pub fn letterbox(image: &RgbImage, size: u32) -> Letterbox {
    let (width, height) = image.dimensions();
    let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * gain).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * gain).round() as u32).clamp(1, size);

    let left = (size - new_width) / 2;
    let top = (size - new_height) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    if (new_width, new_height) == (width, height) {
        imageops::replace(&mut canvas, image, left as i64, top as i64);
    } else {
        let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
        imageops::replace(&mut canvas, &resized, left as i64, top as i64);
    }

    Letterbox {
        image: canvas,
        geometry: LetterboxGeometry {
            gain,
            pad_x: left as f32,
            pad_y: top as f32,
        },
    }
}

impl Letterbox {
    /// Planar RGB scaled to `[0, 1]`, laid out as CHW.
    pub fn to_chw(&self) -> Vec<f32> {
        let (width, height) = self.image.dimensions();
        let plane = (width * height) as usize;
        let mut data = vec![0.0f32; 3 * plane];

        for (index, pixel) in self.image.pixels().enumerate() {
            for channel in 0..3 {
                data[channel * plane + index] = pixel[channel] as f32 / 255.0;
            }
        }
        data
    }
}
