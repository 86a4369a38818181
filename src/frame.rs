use anyhow::Context;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared pixel buffer. Cloning does not copy pixels.
pub type Image = Arc<RgbImage>;

/// One sample from the camera stream. `seq` follows arrival order.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub image: Image,
}

/// A single still picked or captured by the user.
#[derive(Debug, Clone)]
pub struct Photo {
    pub image: Image,
    pub origin: Option<PathBuf>,
}

/// Produces camera frames. `Ok(None)` ends the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

pub fn image_dir() -> PathBuf {
    std::env::var_os("SNACKGATE_IMAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("images"))
}

fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let rd = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = rd
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    if paths.is_empty() {
        error!("no frames found in {}", dir.display());
    }
    Ok(paths)
}

pub fn load_photo(path: &Path) -> anyhow::Result<Photo> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .into_rgb8();
    Ok(Photo {
        image: Arc::new(image),
        origin: Some(path.to_path_buf()),
    })
}

/// Replays the images in a directory, in file-name order, as a camera stream.
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    index: usize,
    // None repeats forever.
    passes_left: Option<u32>,
    decoded_this_pass: usize,
    seq: u64,
}

impl DirectorySource {
    pub fn new(dir: &Path, passes: Option<u32>) -> anyhow::Result<Self> {
        let paths = list_images(dir)?;
        debug!(dir = %dir.display(), count = paths.len(), "directory source ready");
        Ok(Self {
            paths,
            index: 0,
            passes_left: passes,
            decoded_this_pass: 0,
            seq: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn start_next_pass(&mut self) -> bool {
        if self.decoded_this_pass == 0 {
            warn!("no decodable frames in directory, ending stream");
            return false;
        }
        match &mut self.passes_left {
            Some(0) | Some(1) => return false,
            Some(n) => *n -= 1,
            None => {}
        }
        self.index = 0;
        self.decoded_this_pass = 0;
        true
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        if self.paths.is_empty() || self.passes_left == Some(0) {
            return Ok(None);
        }
        loop {
            if self.index == self.paths.len() && !self.start_next_pass() {
                return Ok(None);
            }
            let path = &self.paths[self.index];
            self.index += 1;
            match image::open(path) {
                Ok(img) => {
                    self.decoded_this_pass += 1;
                    self.seq += 1;
                    return Ok(Some(Frame {
                        seq: self.seq,
                        image: Arc::new(img.into_rgb8()),
                    }));
                }
                Err(e) => error!("failed to decode frame {}: {e}", path.display()),
            }
        }
    }
}
