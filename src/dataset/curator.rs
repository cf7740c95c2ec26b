//! Dataset Curator
//!
//! Walks a `<class label>/<image file>` tree and produces the class catalog
//! plus one [`LabeledSample`] per file that both has an allowed extension and
//! decodes as an image. Files that fail either check are counted and skipped;
//! they never abort curation.

use std::path::{Path, PathBuf};

use image::ImageReader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::catalog::ClassCatalog;
use crate::utils::error::{CropCareError, Result};
use crate::utils::logging::ProgressLogger;

/// Name of the directory searched for under the data root
pub const TRAIN_DIR_NAME: &str = "train";

/// A single curated image and its class id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Index into the catalog produced by the same curation pass
    pub class_index: usize,
}

/// Everything one curation pass produced
#[derive(Debug, Clone)]
pub struct CurationReport {
    pub class_root: PathBuf,
    pub catalog: ClassCatalog,
    pub samples: Vec<LabeledSample>,
    /// Files with an allowed extension, counted before decoding
    pub candidates: usize,
    /// Files skipped because of their extension
    pub skipped_extension: usize,
    /// Files with an allowed extension that did not decode
    pub skipped_decode: usize,
    /// Accepted samples per class, indexed like the catalog
    pub class_counts: Vec<usize>,
}

impl CurationReport {
    /// Total number of skipped files
    pub fn skipped(&self) -> usize {
        self.skipped_extension + self.skipped_decode
    }

    pub fn num_classes(&self) -> usize {
        self.catalog.len()
    }
}

/// Find the first `train/` directory under `data_root` that has at least
/// one class subdirectory. Directories are visited in sorted order.
pub fn locate_train_dir<P: AsRef<Path>>(data_root: P) -> Result<PathBuf> {
    let data_root = data_root.as_ref();
    if !data_root.is_dir() {
        return Err(CropCareError::Configuration(format!(
            "Data root not found: {:?}",
            data_root
        )));
    }

    for entry in WalkDir::new(data_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() || entry.file_name() != TRAIN_DIR_NAME {
            continue;
        }
        if has_subdirectory(entry.path()) {
            debug!("Found train directory: {:?}", entry.path());
            return Ok(entry.path().to_path_buf());
        }
    }

    Err(CropCareError::Configuration(format!(
        "No '{}' directory with class subdirectories found under {:?}",
        TRAIN_DIR_NAME, data_root
    )))
}

fn has_subdirectory(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().is_dir())
        })
        .unwrap_or(false)
}

/// Curate every class directory directly under `class_root`.
///
/// `extensions` are matched case-insensitively and without the leading dot.
pub fn curate<P: AsRef<Path>>(class_root: P, extensions: &[&str]) -> Result<CurationReport> {
    let class_root = class_root.as_ref().to_path_buf();
    info!("Curating dataset from: {:?}", class_root);

    if !class_root.is_dir() {
        return Err(CropCareError::Configuration(format!(
            "Class directory does not exist: {:?}",
            class_root
        )));
    }

    let catalog = discover_classes(&class_root)?;
    if catalog.is_empty() {
        return Err(CropCareError::Configuration(format!(
            "No class subdirectories found in {:?}",
            class_root
        )));
    }
    info!("Found {} classes", catalog.len());

    let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();

    let candidates: usize = catalog
        .names()
        .iter()
        .map(|name| {
            class_files(&class_root.join(name))
                .filter(|path| has_allowed_extension(path, &extensions))
                .count()
        })
        .sum();
    info!(
        "Validating up to {} image(s) (skipping invalid/corrupt)...",
        candidates
    );

    let mut progress = ProgressLogger::new("Validating images", candidates);
    let mut samples = Vec::with_capacity(candidates);
    let mut class_counts = vec![0usize; catalog.len()];
    let mut skipped_extension = 0usize;
    let mut skipped_decode = 0usize;

    for (class_index, class_name) in catalog.names().iter().enumerate() {
        for path in class_files(&class_root.join(class_name)) {
            if !has_allowed_extension(&path, &extensions) {
                skipped_extension += 1;
                continue;
            }

            progress.increment();
            if let Err(reason) = check_decodes(&path) {
                debug!("Skipping {:?}: {}", path, reason);
                skipped_decode += 1;
                continue;
            }

            samples.push(LabeledSample { path, class_index });
            class_counts[class_index] += 1;
        }

        debug!(
            "Class '{}' (label {}): {} samples",
            class_name, class_index, class_counts[class_index]
        );
    }
    progress.finish();

    let skipped = skipped_extension + skipped_decode;
    if skipped > 0 {
        warn!(
            "Skipped {} invalid or unsupported image(s) ({} extension, {} undecodable)",
            skipped, skipped_extension, skipped_decode
        );
    }
    info!("Valid images: {}", samples.len());

    Ok(CurationReport {
        class_root,
        catalog,
        samples,
        candidates,
        skipped_extension,
        skipped_decode,
        class_counts,
    })
}

fn discover_classes(class_root: &Path) -> Result<ClassCatalog> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(class_root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => warn!("Ignoring class directory with non UTF-8 name: {:?}", entry.path()),
        }
    }
    Ok(ClassCatalog::from_directory_names(names))
}

/// Regular files directly inside `class_dir`, sorted by file name
fn class_files(class_dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(class_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file())
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| extensions.iter().any(|allowed| *allowed == ext))
        .unwrap_or(false)
}

/// Decode the file (format sniffed from content)
fn check_decodes(path: &Path) -> std::result::Result<(), String> {
    ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map(|_| ())
        .map_err(|e| e.to_string())
}
