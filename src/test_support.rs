//! Fixtures shared by the in-file test modules.

use std::path::{Path, PathBuf};

/// Scratch directory removed on drop, with helpers for writing fixtures.
pub struct TempDir {
    inner: tempfile::TempDir,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let inner = tempfile::Builder::new()
            .prefix(&format!("samnotator_{}_", label))
            .tempdir()
            .expect("create temp dir");
        Self { inner }
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write a solid grey PNG of the given size and return its path.
    pub fn png(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.path().join(name);
        image::RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]))
            .save_with_format(&path, image::ImageFormat::Png)
            .expect("write png fixture");
        path
    }

    /// Write arbitrary bytes to a file and return its path.
    pub fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, bytes).expect("write fixture");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_is_removed_on_drop() {
        let dir = TempDir::new("fixture");
        let path = dir.path().to_path_buf();
        let png = dir.png("a.png", 2, 3);
        assert_eq!(image::image_dimensions(&png).unwrap(), (2, 3));
        drop(dir);
        assert!(!path.exists());
    }
}
