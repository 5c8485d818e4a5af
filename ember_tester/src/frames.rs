use anyhow::{Context, Result};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Image files directly inside `dir`, in lexical order.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.with_context(|| format!("listing {}", dir.display()))?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decodes `path` and scales it to the processing size.
pub fn load_frame(path: &Path, width: u32, height: u32) -> Result<RgbImage> {
    let frame = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();
    if frame.dimensions() == (width, height) {
        return Ok(frame);
    }
    Ok(imageops::resize(&frame, width, height, FilterType::Triangle))
}

/// `<dir>/<source stem>.png`
pub fn output_path(dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    dir.join(format!("{stem}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_keeps_the_stem_and_switches_to_png() {
        let out = output_path(Path::new("/tmp/out"), Path::new("/data/seq/frame_0007.jpg"));
        assert_eq!(out, PathBuf::from("/tmp/out/frame_0007.png"));
    }

    #[test]
    fn lists_only_images_in_order() {
        let dir = std::env::temp_dir().join(format!("ember_tester_frames_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.png", "a.PNG", "notes.txt"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        let names: Vec<_> = list_images(&dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
    }

    #[test]
    fn frames_are_scaled_to_the_processing_size() {
        let dir = std::env::temp_dir().join(format!("ember_tester_scale_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.png");
        RgbImage::new(32, 16).save(&path).unwrap();
        let frame = load_frame(&path, 64, 48).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(frame.dimensions(), (64, 48));
    }
}
