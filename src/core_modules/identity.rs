//! Known-identity store: the occupants whose faces suppress person alerts.

use super::detection::FaceMatcher;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A face embedding as produced by the face-matcher collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEncoding(pub Vec<f32>);

impl FaceEncoding {
    /// Euclidean distance. Encodings of different length are infinitely far apart.
    pub fn distance(&self, other: &FaceEncoding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A single named occupant sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownFace {
    pub name: String,
    pub encoding: FaceEncoding,
}

/// Read-only set of known faces. Several samples may share a name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownIdentities {
    faces: Vec<KnownFace>,
}

impl KnownIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, encoding: FaceEncoding) {
        self.faces.push(KnownFace {
            name: name.into(),
            encoding,
        });
    }

    pub fn with(mut self, name: impl Into<String>, encoding: FaceEncoding) -> Self {
        self.insert(name, encoding);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KnownFace> {
        self.faces.iter()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Builds the store from a dataset laid out as `root/<person name>/<image>`.
    ///
    /// Every readable image is encoded through `matcher`; the first face found in
    /// it becomes a sample for that person. Hidden files, unreadable images and
    /// images without a face are skipped with a warning. A missing `root` yields an
    /// empty store.
    pub fn load_dir(root: impl AsRef<Path>, matcher: &dyn FaceMatcher) -> crate::Result<Self> {
        let root = root.as_ref();
        let mut identities = Self::new();
        if !root.exists() {
            tracing::warn!(path = %root.display(), "face dataset not found, no known identities loaded");
            return Ok(identities);
        }

        let people = fs::read_dir(root).map_err(|source| crate::EngineError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let mut person_dirs: Vec<_> = people
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        person_dirs.sort();

        for person_dir in person_dirs {
            let Some(name) = person_dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            let images = match fs::read_dir(&person_dir) {
                Ok(images) => images,
                Err(e) => {
                    tracing::warn!(path = %person_dir.display(), "cannot read face directory: {e}");
                    continue;
                }
            };
            let mut image_paths: Vec<_> = images
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && !path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with('.'))
                })
                .collect();
            image_paths.sort();

            for image_path in image_paths {
                match load_first_encoding(&image_path, matcher) {
                    Ok(Some(encoding)) => {
                        tracing::info!(person = %name, path = %image_path.display(), "loaded known face");
                        identities.insert(name.clone(), encoding);
                    }
                    Ok(None) => {
                        tracing::warn!(path = %image_path.display(), "no face found in sample");
                    }
                    Err(e) => {
                        tracing::warn!(path = %image_path.display(), "error loading face sample: {e}");
                    }
                }
            }
        }

        tracing::info!(count = identities.len(), "known faces loaded");
        Ok(identities)
    }
}

fn load_first_encoding(path: &Path, matcher: &dyn FaceMatcher) -> anyhow::Result<Option<FaceEncoding>> {
    let image: RgbImage = image::open(path)?.to_rgb8();
    Ok(matcher.locate_and_encode(&image)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = FaceEncoding(vec![0.0, 0.0, 0.0]);
        let b = FaceEncoding(vec![3.0, 4.0, 0.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
        assert_eq!(a.distance(&FaceEncoding(vec![1.0])), f32::INFINITY);
    }

    #[test]
    fn test_store_keeps_samples() {
        let known = KnownIdentities::new()
            .with("alice", FaceEncoding(vec![0.1, 0.2]))
            .with("alice", FaceEncoding(vec![0.1, 0.3]));
        assert_eq!(known.len(), 2);
        assert!(known.iter().all(|f| f.name == "alice"));
    }
}
