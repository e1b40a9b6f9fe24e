//! Image-folder datasets.
//!
//! ```text
//! <root>/
//!   0.normal/    *.png | *.jpg | *.jpeg
//!   1.abnormal/  ...
//! ```
//!
//! Class directories are sorted by name and labeled by position, so the
//! normal class must sort first. Images are resized to cover `H x W`,
//! center-cropped, converted to `C` channels and scaled to [-1, 1].

use std::path::{Path, PathBuf};

use image::imageops::FilterType;

use crate::data::InMemoryDataset;
use crate::error::{GanomalyError, Result};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn sorted_entries(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() == want_dirs {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Decode one image into `[C, H, W]` values in [-1, 1].
fn load_pixels(path: &Path, [c, h, w]: [usize; 3]) -> Result<Vec<f32>> {
    let img = image::open(path)?.resize_to_fill(w as u32, h as u32, FilterType::Triangle);
    let (raw, channels) = match c {
        1 => (img.to_luma8().into_raw(), 1),
        3 => (img.to_rgb8().into_raw(), 3),
        other => {
            return Err(GanomalyError::Data(format!(
                "unsupported channel count {other} for {}",
                path.display()
            )))
        }
    };

    // HWC bytes -> CHW floats
    let mut pixels = vec![0.0f32; c * h * w];
    for (i, byte) in raw.iter().enumerate() {
        let ch = i % channels;
        let pos = i / channels;
        pixels[ch * h * w + pos] = *byte as f32 / 255.0 * 2.0 - 1.0;
    }
    Ok(pixels)
}

/// Load every image under `root`'s class directories.
pub fn load_image_folder(root: &Path, dims: [usize; 3]) -> Result<InMemoryDataset> {
    if !root.is_dir() {
        return Err(GanomalyError::Data(format!(
            "image folder {} does not exist",
            root.display()
        )));
    }

    let mut images = Vec::new();
    let mut labels = Vec::new();
    for (label, class_dir) in sorted_entries(root, true)?.iter().enumerate() {
        let files: Vec<PathBuf> = sorted_entries(class_dir, false)?
            .into_iter()
            .filter(|p| is_image(p))
            .collect();
        tracing::debug!(class = %class_dir.display(), label, count = files.len(), "Reading class");
        for file in files {
            images.extend(load_pixels(&file, dims)?);
            labels.push(label as i64);
        }
    }

    if labels.is_empty() {
        return Err(GanomalyError::Data(format!(
            "no images found under {}",
            root.display()
        )));
    }
    InMemoryDataset::new(dims, images, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, value: u8, size: u32) {
        std::fs::create_dir_all(dir).unwrap();
        RgbImage::from_pixel(size, size, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_loads_sorted_classes() {
        let tmp = TempDir::new().unwrap();
        write_image(&tmp.path().join("1.abnormal"), "a.png", 255, 20);
        write_image(&tmp.path().join("0.normal"), "b.png", 0, 20);
        write_image(&tmp.path().join("0.normal"), "a.png", 0, 24);
        std::fs::write(tmp.path().join("0.normal").join("notes.txt"), "skip").unwrap();

        let ds = load_image_folder(tmp.path(), [3, 16, 16]).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.labels(), &[0, 0, 1]);

        let (normal, _) = ds.get(0).unwrap();
        assert_eq!(normal.len(), 3 * 16 * 16);
        assert!(normal.iter().all(|&v| (v + 1.0).abs() < 1e-6));
        let (abnormal, _) = ds.get(2).unwrap();
        assert!(abnormal.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_grayscale_conversion() {
        let tmp = TempDir::new().unwrap();
        write_image(&tmp.path().join("0.normal"), "a.png", 255, 16);
        let ds = load_image_folder(tmp.path(), [1, 16, 16]).unwrap();
        assert_eq!(ds.dims(), [1, 16, 16]);
        assert_eq!(ds.get(0).unwrap().0.len(), 256);
    }

    #[test]
    fn test_missing_or_empty_folder() {
        let tmp = TempDir::new().unwrap();
        assert!(load_image_folder(&tmp.path().join("nope"), [3, 16, 16]).is_err());
        std::fs::create_dir_all(tmp.path().join("0.normal")).unwrap();
        assert!(load_image_folder(tmp.path(), [3, 16, 16]).is_err());
    }

    #[test]
    fn test_rejects_unsupported_channels() {
        let tmp = TempDir::new().unwrap();
        write_image(&tmp.path().join("0.normal"), "a.png", 10, 16);
        assert!(matches!(
            load_image_folder(tmp.path(), [2, 16, 16]),
            Err(GanomalyError::Data(_))
        ));
    }
}
