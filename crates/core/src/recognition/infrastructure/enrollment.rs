use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::recognition::domain::embedding::l2_normalize;
use crate::recognition::domain::embedding_extractor::{EmbeddingExtractor, Extraction};
use crate::recognition::domain::identity_database::{
    DatabaseError, EmbeddingRecord, IdentityDatabase,
};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("failed to read enrollment directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrollmentSummary {
    pub enrolled: usize,
    pub skipped: usize,
}

/// Builds an identity database from `<images_dir>/<person>/<image>`.
///
/// Each subdirectory name becomes the identity name. Images that fail to
/// decode, contain no face, or yield an unusable embedding (wrong length,
/// zero or non-finite) are skipped with a warning.
pub fn enroll_directory(
    images_dir: &Path,
    extractor: &dyn EmbeddingExtractor,
) -> Result<(IdentityDatabase, EnrollmentSummary), EnrollmentError> {
    let mut records: Vec<EmbeddingRecord> = Vec::new();
    let mut summary = EnrollmentSummary::default();

    for person_dir in sorted_entries(images_dir)?
        .into_iter()
        .filter(|p| p.is_dir())
    {
        let Some(name) = person_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let name = name.to_string();

        for image_path in sorted_entries(&person_dir)?
            .into_iter()
            .filter(|p| is_image(p))
        {
            let enrolled = embed_image(&image_path, extractor).and_then(|vector| {
                let record = EmbeddingRecord {
                    name: name.clone(),
                    origin: image_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    vector,
                };
                let expected = records
                    .first()
                    .map_or(record.vector.len(), |r| r.vector.len());
                IdentityDatabase::check_record(&record, expected)
                    .map(|()| record)
                    .map_err(|e| e.to_string())
            });
            match enrolled {
                Ok(record) => {
                    records.push(record);
                    summary.enrolled += 1;
                }
                Err(reason) => {
                    log::warn!("Skipping {}: {reason}", image_path.display());
                    summary.skipped += 1;
                }
            }
        }
    }

    let database = IdentityDatabase::new(records)?;
    log::info!(
        "Enrolled {} images of {} identities ({} skipped)",
        summary.enrolled,
        database.identity_count(),
        summary.skipped
    );
    Ok((database, summary))
}

fn embed_image(path: &Path, extractor: &dyn EmbeddingExtractor) -> Result<Vec<f32>, String> {
    let frame = load_rgb(path).map_err(|e| format!("cannot decode image: {e}"))?;
    match extractor.extract(&frame) {
        Ok(Extraction::Embedding(mut vector)) => {
            l2_normalize(&mut vector);
            Ok(vector)
        }
        Ok(Extraction::NoFaceFound) => Err("no face found".to_string()),
        Err(e) => Err(format!("embedding failed: {e}")),
    }
}

fn load_rgb(path: &Path) -> Result<Frame, image::ImageError> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, 0))
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EnrollmentError> {
    let read_err = |source| EnrollmentError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(read_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;
    paths.sort();
    Ok(paths)
}
