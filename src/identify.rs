//! Nearest-color assignment of detected regions to configured subjects.

use serde::{Deserialize, Serialize};

pub type SubjectId = usize;

/// Coarse half of the camera's field of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// Side of the frame holding a region whose horizontal centre is `center_x`.
    pub fn of_position(center_x: u32, frame_width: u32) -> Side {
        if u64::from(center_x) * 2 < u64::from(frame_width) {
            Side::Left
        } else {
            Side::Right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample {
    pub channels: [f64; 3],
    pub gray: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub name: String,
    pub signature: ColorSample,
    pub side: Side,
    pub bay: usize,
}

/// Outcome of identifying one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    NoSubject,
    Subject(SubjectId),
}

#[derive(Debug, Clone)]
pub struct SubjectIdentifier {
    signatures: Vec<ColorSample>,
    max_distance: Option<f64>,
}

impl SubjectIdentifier {
    pub fn new(subjects: &[Subject], max_distance: Option<f64>) -> Self {
        Self {
            signatures: subjects.iter().map(|s| s.signature).collect(),
            max_distance,
        }
    }

    /// Closest subject by summed absolute channel difference. Ties go to the
    /// lowest index. Only a configured `max_distance` can yield `NoSubject`.
    pub fn identify(&self, sample: &ColorSample) -> Detection {
        let mut best: Option<(SubjectId, f64)> = None;
        for (index, reference) in self.signatures.iter().enumerate() {
            let distance = color_distance(reference, sample);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((index, distance)),
            }
        }

        match (best, self.max_distance) {
            (Some((_, distance)), Some(max)) if distance > max => Detection::NoSubject,
            (Some((index, _)), _) => Detection::Subject(index),
            (None, _) => Detection::NoSubject,
        }
    }
}

/// Sum of absolute per-channel differences, plus the grayscale difference
/// when both sides carry one.
pub fn color_distance(reference: &ColorSample, sample: &ColorSample) -> f64 {
    let channels: f64 = reference
        .channels
        .iter()
        .zip(sample.channels.iter())
        .map(|(r, s)| (r - s).abs())
        .sum();
    let gray = match (reference.gray, sample.gray) {
        (Some(r), Some(s)) => (r - s).abs(),
        _ => 0.0,
    };
    channels + gray
}
