use crate::{config::FontConfig, detections::DetectionResult, labels::ClassLabels};
use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use std::{io::Cursor, path::Path, sync::Arc};
use thiserror::Error;

const OUTLINE_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TAG_HEIGHT: i32 = 18;
const LABEL_CHAR_WIDTH: f32 = 8.0;
const LABEL_TEXT_PADDING: i32 = 2;
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
/// Outline color for class ids missing from the labels file.
const FALLBACK_COLOR: [u8; 3] = [255, 56, 56];

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid font data: {0}")]
    Parse(#[from] InvalidFont),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
}

/// The TTF used for label tags. Missing or corrupt font files are refused
/// at startup, never at request time.
#[derive(Clone)]
pub struct LabelFont {
    font: FontArc,
}

impl LabelFont {
    pub fn load(config: &FontConfig) -> Result<Self, FontError> {
        Self::from_file(&config.get_path())
    }

    pub fn from_file(path: &Path) -> Result<Self, FontError> {
        let data = std::fs::read(path)?;
        let font = FontArc::try_from_vec(data)?;
        Ok(Self { font })
    }
}

/// An annotated frame whose channel planes are still in blue-green-red
/// order, the layout the drawing layer works in. Nothing leaves this type
/// except through [`AnnotatedImage::into_rgb`].
pub struct AnnotatedImage {
    canvas: RgbImage,
}

impl AnnotatedImage {
    fn from_image(image: &DynamicImage) -> Self {
        Self {
            canvas: swap_red_blue(image.to_rgb8()),
        }
    }

    /// The one place the blue-red channel swap is undone. Every response
    /// body and download goes through here.
    pub fn into_rgb(self) -> RgbImage {
        swap_red_blue(self.canvas)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }
}

/// Swap the red and blue planes in place. Involutive, so the same helper
/// converts in both directions.
fn swap_red_blue(mut image: RgbImage) -> RgbImage {
    for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
    }
    image
}

/// Draws detection boxes and confidence tags onto a copy of the uploaded
/// image. Does not mutate the input and never fails: malformed boxes are
/// clamped or skipped.
pub struct Plotter {
    font: LabelFont,
    labels: Arc<ClassLabels>,
}

impl Plotter {
    pub fn new(font: LabelFont, labels: Arc<ClassLabels>) -> Self {
        Self { font, labels }
    }

    pub fn plot(&self, image: &DynamicImage, result: &DetectionResult) -> AnnotatedImage {
        let mut annotated = AnnotatedImage::from_image(image);
        for detection in result.iter() {
            let color = self
                .labels
                .color(detection.class_id)
                .unwrap_or(FALLBACK_COLOR);
            let tag = format!("{} {:.2}", detection.class_name, detection.confidence);
            draw_box_outline(&mut annotated.canvas, detection.bbox, as_canvas_color(color));
            draw_label_tag(
                &mut annotated.canvas,
                &self.font.font,
                detection.bbox,
                &tag,
                as_canvas_color(color),
            );
        }
        annotated
    }
}

/// Colors are configured as red-green-blue; the canvas planes are swapped,
/// so reorder before touching pixels.
fn as_canvas_color(color: [u8; 3]) -> Rgb<u8> {
    Rgb([color[2], color[1], color[0]])
}

fn draw_box_outline(canvas: &mut RgbImage, bbox: [f32; 4], color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let x_min = (bbox[0].floor() as i32).clamp(0, width - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, height - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, width - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, height - 1);

    if x_min >= x_max || y_min >= y_max {
        return;
    }

    for inset in 0..OUTLINE_THICKNESS {
        let side_x = (x_max - x_min + 1 - 2 * inset).max(1) as u32;
        let side_y = (y_max - y_min + 1 - 2 * inset).max(1) as u32;
        let rect = Rect::at(x_min + inset, y_min + inset).of_size(side_x, side_y);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn draw_label_tag(canvas: &mut RgbImage, font: &FontArc, bbox: [f32; 4], text: &str, color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let x_min = (bbox[0].floor() as i32).clamp(0, width - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, height - 1);

    // Width is estimated from the glyph count; exact shaping is not worth
    // the cost for a tag background.
    let text_width = (text.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32;
    let tag_x = x_min;
    let tag_y = (y_min - LABEL_TAG_HEIGHT).max(0);
    let tag_width = text_width.min((width - tag_x).max(0));
    if tag_width <= 0 {
        return;
    }

    let rect = Rect::at(tag_x, tag_y).of_size(tag_width as u32, LABEL_TAG_HEIGHT as u32);
    draw_filled_rect_mut(canvas, rect, color);
    draw_text_mut(
        canvas,
        Rgb(TEXT_COLOR),
        tag_x + LABEL_TEXT_PADDING,
        tag_y + LABEL_TEXT_PADDING,
        PxScale::from(LABEL_FONT_SIZE),
        font,
        text,
    );
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
    Ok(buffer)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
