//! Boundaries to the camera, the object classifier and the notification
//! channel, plus the region color sampler that feeds subject identification.

use crate::error::AppError;
use crate::identify::{ColorSample, Side, Subject};
use tracing::info;

pub mod mock;

/// Packed three-channel frame, pixels in blue, green, red order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl Frame {
    /// `None` when the pixel count does not match the dimensions.
    pub fn new(width: u32, height: u32, pixels: Vec<[u8; 3]>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        (pixels.len() == expected).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn center_x(&self) -> u32 {
        self.x.saturating_add(self.width / 2)
    }

    pub fn side(&self, frame_width: u32) -> Side {
        Side::of_position(self.center_x(), frame_width)
    }
}

/// One detected object of the target category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, AppError>;
}

/// Object detector filtered to the target category. Confidence and overlap
/// thresholds belong to the implementation's construction.
pub trait Classifier: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, AppError>;
}

pub trait ColorSampler: Send {
    fn sample_color(&self, frame: &Frame, bbox: &BoundingBox) -> ColorSample;
}

/// Told once per confirmation episode when a subject is identified.
pub trait Notifier: Send {
    fn notify(&mut self, frame: &Frame, subject: &Subject);
}

/// Averages the central half of a region, skipping near-white background.
#[derive(Debug, Clone, Copy)]
pub struct RegionColorSampler {
    pub white_threshold: u8,
}

impl RegionColorSampler {
    pub fn new(white_threshold: u8) -> Self {
        Self { white_threshold }
    }
}

impl ColorSampler for RegionColorSampler {
    fn sample_color(&self, frame: &Frame, bbox: &BoundingBox) -> ColorSample {
        let width = bbox.width / 2;
        let height = bbox.height / 2;
        let x0 = bbox.x.saturating_add(width / 2);
        let y0 = bbox.y.saturating_add(height / 2);

        let mut kept = Accumulator::default();
        let mut all = Accumulator::default();
        for y in y0..y0.saturating_add(height) {
            for x in x0..x0.saturating_add(width) {
                let Some(pixel) = frame.pixel(x, y) else {
                    continue;
                };
                all.add(pixel);
                let brightness = pixel.iter().map(|c| u32::from(*c)).sum::<u32>() / 3;
                if brightness <= u32::from(self.white_threshold) {
                    kept.add(pixel);
                }
            }
        }

        // A region that is all background still gets a best-effort sample.
        if kept.count > 0 {
            kept.sample()
        } else {
            all.sample()
        }
    }
}

#[derive(Default)]
struct Accumulator {
    sums: [f64; 3],
    gray: f64,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, pixel: [u8; 3]) {
        for (sum, channel) in self.sums.iter_mut().zip(pixel) {
            *sum += f64::from(channel);
        }
        self.gray += luma(pixel);
        self.count += 1;
    }

    fn sample(&self) -> ColorSample {
        if self.count == 0 {
            return ColorSample {
                channels: [0.0; 3],
                gray: None,
            };
        }
        let n = f64::from(self.count);
        ColorSample {
            channels: self.sums.map(|s| s / n),
            gray: Some(self.gray / n),
        }
    }
}

/// ITU-R BT.601 luma with channels taken as blue, green, red.
fn luma(pixel: [u8; 3]) -> f64 {
    let [b, g, r] = pixel.map(f64::from);
    0.114 * b + 0.587 * g + 0.299 * r
}

/// Camera and classifier stand-in when none is wired up. Every tick reports
/// the classifier as unavailable, which the tracker treats as an empty frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

impl FrameSource for Disabled {
    fn capture(&mut self) -> Result<Frame, AppError> {
        Err(AppError::Classifier("no camera configured".to_string()))
    }
}

impl Classifier for Disabled {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, AppError> {
        Err(AppError::Classifier("no detection model configured".to_string()))
    }
}

/// Records identifications in the log; delivery channels plug in here.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, frame: &Frame, subject: &Subject) {
        info!(
            subject = %subject.name,
            bay = subject.bay,
            width = frame.width(),
            height = frame.height(),
            "Subject arrived"
        );
    }
}
