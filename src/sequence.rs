//! Persisted frame sequences.
//!
//! Frames destined for a clip are written into the upload directory as
//! numbered JPEG files with six-digit zero padded indices, so shell glob order
//! equals playback order:
//!
//! - `stage_000042.jpg`: circular-buffer slot 42 of a motion capture
//! - `frame_000042.jpg`: output position 42 of a finished sequence
//!
//! The external encoder consumes the `frame_*` files; this module writes,
//! reorders, lists and removes them.

use anyhow::{Context, Result};
use image::RgbImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const STAGE_PREFIX: &str = "stage_";
const FRAME_PREFIX: &str = "frame_";
const EXTENSION: &str = "jpg";

/// An ordered, contiguous set of frame files ready for encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSequence {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl FrameSequence {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Glob pattern matching every file of the sequence.
    pub fn pattern(&self) -> String {
        self.dir
            .join(format!("{}*.{}", FRAME_PREFIX, EXTENSION))
            .display()
            .to_string()
    }
}

#[derive(Clone, Debug)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Use `dir` for sequence files, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create upload dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stage_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{:06}.{}", STAGE_PREFIX, index, EXTENSION))
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{:06}.{}", FRAME_PREFIX, index, EXTENSION))
    }

    pub fn write_stage(&self, index: usize, image: &RgbImage) -> Result<()> {
        let path = self.stage_path(index);
        image
            .save(&path)
            .with_context(|| format!("write {}", path.display()))
    }

    pub fn write_frame(&self, index: usize, image: &RgbImage) -> Result<()> {
        let path = self.frame_path(index);
        image
            .save(&path)
            .with_context(|| format!("write {}", path.display()))
    }

    /// Write a standalone image (e.g. a snapshot) into the upload dir.
    pub fn write_named(&self, name: &str, image: &RgbImage) -> Result<PathBuf> {
        let path = self.dir.join(name);
        image
            .save(&path)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Rename staged slot `stage` to output position `position`.
    ///
    /// Returns `false` when the staged file was never written.
    pub fn promote(&self, stage: usize, position: usize) -> Result<bool> {
        let from = self.stage_path(stage);
        let to = self.frame_path(position);
        match std::fs::rename(&from, &to) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("rename {} -> {}", from.display(), to.display())
            }),
        }
    }

    /// All `frame_*` files in index order.
    pub fn sequence(&self) -> Result<FrameSequence> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if is_sequence_file(&path, FRAME_PREFIX) {
                files.push(path);
            }
        }
        files.sort();
        Ok(FrameSequence {
            dir: self.dir.clone(),
            files,
        })
    }

    /// Remove every staged and sequence file. Other files are left alone.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if is_sequence_file(&path, FRAME_PREFIX) || is_sequence_file(&path, STAGE_PREFIX) {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("remove {}", path.display()))
                    }
                }
            }
        }
        if removed > 0 {
            log::debug!("removed {} sequence files from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

fn is_sequence_file(path: &Path, prefix: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let Some(digits) = rest.strip_suffix(&format!(".{}", EXTENSION)) else {
        return false;
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
