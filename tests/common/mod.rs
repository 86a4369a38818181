#![allow(dead_code)]

use image::{Rgb, RgbImage};
use snackgate::{Classification, Classifier, Frame, Photo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

pub fn frame(seq: u64) -> Frame {
    Frame {
        seq,
        image: Arc::new(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))),
    }
}

pub fn photo() -> Photo {
    Photo {
        image: Arc::new(RgbImage::from_pixel(2, 2, Rgb([4, 5, 6]))),
        origin: None,
    }
}

/// Always returns the same ranking.
pub struct FixedClassifier {
    pub ranking: Vec<Classification>,
}

impl FixedClassifier {
    pub fn top(label: &str, confidence: f32) -> Self {
        Self {
            ranking: vec![Classification::new(label, confidence)],
        }
    }
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn classify(&self, _image: &RgbImage) -> anyhow::Result<Vec<Classification>> {
        Ok(self.ranking.clone())
    }
}

/// Fails every call.
pub struct FailingClassifier {
    pub calls: AtomicUsize,
}

impl FailingClassifier {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn classify(&self, _image: &RgbImage) -> anyhow::Result<Vec<Classification>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("model exploded")
    }
}

/// Blocks each call until the test sends a release signal.
pub struct BlockingClassifier {
    release: Mutex<Receiver<()>>,
}

impl BlockingClassifier {
    pub fn new() -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                release: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl Classifier for BlockingClassifier {
    fn name(&self) -> &str {
        "blocking"
    }

    fn classify(&self, _image: &RgbImage) -> anyhow::Result<Vec<Classification>> {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv()?;
        Ok(vec![Classification::new("apple", 0.99)])
    }
}
