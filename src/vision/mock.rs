use crate::error::AppError;
use crate::identify::Subject;
use crate::vision::{BoundingBox, Classifier, Frame, FrameSource, Notifier, Region};
use std::sync::{Arc, Mutex};

fn poisoned() -> AppError {
    AppError::Classifier("mock lock poisoned".to_string())
}

/// Fill `bbox` with a solid color, clipped to the frame.
pub fn paint(frame: &mut Frame, bbox: &BoundingBox, color: [u8; 3]) {
    let width = frame.width as usize;
    for y in bbox.y..bbox.y.saturating_add(bbox.height).min(frame.height) {
        for x in bbox.x..bbox.x.saturating_add(bbox.width).min(frame.width) {
            frame.pixels[y as usize * width + x as usize] = color;
        }
    }
}

/// Camera returning whatever frame the test installed. Clones share it.
#[derive(Debug, Clone)]
pub struct MockCamera {
    frame: Arc<Mutex<Option<Frame>>>,
}

impl MockCamera {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Arc::new(Mutex::new(Some(frame))),
        }
    }

    pub fn set_frame(&self, frame: Frame) {
        if let Ok(mut guard) = self.frame.lock() {
            *guard = Some(frame);
        }
    }

    /// Make subsequent captures fail.
    pub fn unplug(&self) {
        if let Ok(mut guard) = self.frame.lock() {
            *guard = None;
        }
    }
}

impl FrameSource for MockCamera {
    fn capture(&mut self) -> Result<Frame, AppError> {
        let guard = self.frame.lock().map_err(|_| poisoned())?;
        guard
            .clone()
            .ok_or_else(|| AppError::Classifier("mock camera unplugged".to_string()))
    }
}

#[derive(Debug, Default)]
struct Detections {
    regions: Vec<Region>,
    failing: bool,
    calls: usize,
}

/// Classifier reporting a fixed set of regions until told otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockClassifier {
    inner: Arc<Mutex<Detections>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_regions(&self, regions: Vec<Region>) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.regions = regions;
            guard.failing = false;
        }
    }

    pub fn fail(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.failing = true;
        }
    }

    /// Number of frames handed to `detect` so far.
    pub fn calls(&self) -> usize {
        self.inner.lock().map(|guard| guard.calls).unwrap_or(0)
    }
}

impl Classifier for MockClassifier {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, AppError> {
        let mut guard = self.inner.lock().map_err(|_| poisoned())?;
        guard.calls += 1;
        if guard.failing {
            return Err(AppError::Classifier("mock model unavailable".to_string()));
        }
        Ok(guard.regions.clone())
    }
}

/// Collects the names of notified subjects.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, _frame: &Frame, subject: &Subject) {
        if let Ok(mut guard) = self.sent.lock() {
            guard.push(subject.name.clone());
        }
    }
}
