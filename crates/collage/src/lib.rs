//! Collage composition for matched scene frames
//!
//! Tiles a set of matched frame images into an approximately-square grid on a
//! fixed-size canvas and opens the result for display. Thumbnails are forced
//! to the exact cell dimensions (aspect ratio is not preserved) so the grid
//! always packs edge to edge; unused trailing cells keep the background
//! color.
//!
//! Grid rule: `cols = ceil(sqrt(N))` for `N > 1` (1 otherwise) and
//! `rows = ceil(N / cols)`. This is the single deterministic tie-break used
//! everywhere; it favors one extra column over one extra row for non-square
//! counts.

use image::imageops::FilterType;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use scene_search_common::ProcessingError;

/// Errors specific to collage composition
#[derive(Debug, Error)]
pub enum CollageError {
    /// Any image that fails to open is fatal for the whole collage so cell
    /// indices stay aligned with the input order
    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: String,
        source: image::ImageError,
    },

    #[error("Failed to save collage: {0}")]
    Save(image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<CollageError> for ProcessingError {
    fn from(err: CollageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Configuration for collage composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollageConfig {
    /// Canvas width in pixels
    pub canvas_width: u32,
    /// Canvas height in pixels
    pub canvas_height: u32,
    /// Output path; repeated runs overwrite it
    pub output_file: PathBuf,
    /// Open the finished collage with the system viewer
    pub open_after_save: bool,
}

impl Default for CollageConfig {
    fn default() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
            output_file: PathBuf::from("collage.png"),
            open_after_save: true,
        }
    }
}

/// Compute the grid shape for `n` images as `(rows, cols)`
#[must_use]
pub fn grid_shape(n: usize) -> (u32, u32) {
    if n <= 1 {
        return (u32::from(n == 1), u32::from(n == 1));
    }
    let cols = (n as f64).sqrt().ceil() as u32;
    let rows = (n as u32).div_ceil(cols);
    (rows, cols)
}

/// Compose the images into a collage and (optionally) open it for display
///
/// Empty input is a no-op: a notice is emitted, nothing is written, and
/// `None` is returned.
///
/// # Errors
/// Returns an error if any input image cannot be opened or the collage
/// cannot be saved.
pub fn generate_collage(
    image_paths: &[PathBuf],
    config: &CollageConfig,
) -> Result<Option<PathBuf>, CollageError> {
    if image_paths.is_empty() {
        warn!("No images found for the given search term");
        return Ok(None);
    }

    let (rows, cols) = grid_shape(image_paths.len());
    let thumb_width = config.canvas_width / cols;
    let thumb_height = config.canvas_height / rows;

    info!(
        "Composing {} images into a {}x{} grid ({}x{} cells)",
        image_paths.len(),
        rows,
        cols,
        thumb_width,
        thumb_height
    );

    let mut canvas = RgbImage::from_pixel(
        config.canvas_width,
        config.canvas_height,
        image::Rgb([255, 255, 255]),
    );

    for (idx, path) in image_paths.iter().enumerate() {
        let img = image::open(path).map_err(|source| CollageError::ImageLoad {
            path: path.display().to_string(),
            source,
        })?;
        // Exact cell dimensions; aspect ratio is deliberately not preserved.
        let thumb = img
            .resize_exact(thumb_width, thumb_height, FilterType::Triangle)
            .to_rgb8();

        let col = (idx as u32) % cols;
        let row = (idx as u32) / cols;
        imageops::replace(
            &mut canvas,
            &thumb,
            i64::from(col * thumb_width),
            i64::from(row * thumb_height),
        );
    }

    canvas.save(&config.output_file).map_err(CollageError::Save)?;
    info!("Collage created and saved to {}", config.output_file.display());

    if config.open_after_save {
        if let Err(e) = open::that(&config.output_file) {
            warn!("Could not open collage for display: {}", e);
        }
    }

    Ok(Some(config.output_file.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> CollageConfig {
        CollageConfig {
            output_file: dir.join("collage.png"),
            open_after_save: false,
            ..CollageConfig::default()
        }
    }

    #[test]
    fn test_grid_shapes_are_pinned() {
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(2), (1, 2));
        assert_eq!(grid_shape(3), (2, 2));
        assert_eq!(grid_shape(4), (2, 2));
        assert_eq!(grid_shape(5), (2, 3));
        assert_eq!(grid_shape(9), (3, 3));
        assert_eq!(grid_shape(10), (3, 4));
    }

    #[test]
    fn test_grid_capacity_invariant() {
        for n in 1..=50usize {
            let (rows, cols) = grid_shape(n);
            assert!(
                rows * cols >= n as u32,
                "grid {rows}x{cols} cannot hold {n} images"
            );
            // Every row before the last must be fully packed.
            assert!(
                (rows - 1) * cols < n as u32,
                "grid {rows}x{cols} has an entirely empty row for {n} images"
            );
        }
    }

    #[test]
    fn test_empty_input_writes_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let result = generate_collage(&[], &config).unwrap();
        assert!(result.is_none());
        assert!(!config.output_file.exists());
    }

    #[test]
    fn test_composes_canvas_of_configured_size() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        let mut paths = Vec::new();
        for (i, color) in [[255u8, 0, 0], [0, 255, 0], [0, 0, 255]].iter().enumerate() {
            let path = dir.path().join(format!("img{i}.png"));
            RgbImage::from_pixel(64, 48, image::Rgb(*color))
                .save(&path)
                .unwrap();
            paths.push(path);
        }

        let out = generate_collage(&paths, &config).unwrap().unwrap();
        let collage = image::open(out).unwrap();
        assert_eq!(collage.width(), 800);
        assert_eq!(collage.height(), 600);
    }

    #[test]
    fn test_unreadable_image_is_fatal() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        let good = dir.path().join("good.png");
        RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("missing.png");

        let err = generate_collage(&[good, bad], &config).unwrap_err();
        assert!(matches!(err, CollageError::ImageLoad { .. }));
        assert!(!config.output_file.exists());
    }

    #[test]
    fn test_repeated_runs_overwrite() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        let path = dir.path().join("img.png");
        RgbImage::from_pixel(16, 16, image::Rgb([9, 9, 9]))
            .save(&path)
            .unwrap();

        let paths = vec![path];
        generate_collage(&paths, &config).unwrap();
        let first = std::fs::metadata(&config.output_file).unwrap().len();
        generate_collage(&paths, &config).unwrap();
        let second = std::fs::metadata(&config.output_file).unwrap().len();
        assert_eq!(first, second);
    }
}
