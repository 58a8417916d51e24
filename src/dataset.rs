//! Gridded simulation data loaded from JSON.
//!
//! A volume file holds the domain dimensions and one flat array per field,
//! x varying fastest. An optional particle file adds a `particle_count` field
//! by nearest-grid-point deposit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::DatasetError;

type Result<T> = std::result::Result<T, DatasetError>;

pub const PARTICLE_FIELD: &str = "particle_count";

/// Span (max/min) above which strictly positive fields are log-scaled
const LOG_SCALE_SPAN: f32 = 100.0;

#[derive(Debug, Deserialize)]
struct VolumeFile {
    domain_dimensions: [u32; 3],
    fields: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ParticleFile {
    positions: Vec<[f32; 3]>,
}

/// Cell-centered fields on a uniform grid
#[derive(Debug, Clone)]
pub struct VolumeDataset {
    source: PathBuf,
    dimensions: [u32; 3],
    fields: BTreeMap<String, Vec<f32>>,
}

impl VolumeDataset {
    pub fn load(path: &Path, particles: Option<&Path>) -> Result<Self> {
        let contents = read(path)?;
        let file: VolumeFile = serde_json::from_str(&contents).map_err(|source| DatasetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut dataset = Self::from_fields(file.domain_dimensions, file.fields)?;
        dataset.source = path.to_path_buf();

        if let Some(particle_path) = particles {
            let contents = read(particle_path)?;
            let file: ParticleFile =
                serde_json::from_str(&contents).map_err(|source| DatasetError::Parse {
                    path: particle_path.to_path_buf(),
                    source,
                })?;
            dataset.deposit_particles(&file.positions);
            log::info!(
                "Deposited {} particles from {}",
                file.positions.len(),
                particle_path.display()
            );
        }

        log::info!(
            "Loaded {} ({}x{}x{}, {} fields)",
            path.display(),
            dataset.dimensions[0],
            dataset.dimensions[1],
            dataset.dimensions[2],
            dataset.fields.len()
        );
        Ok(dataset)
    }

    pub fn from_fields(dimensions: [u32; 3], fields: BTreeMap<String, Vec<f32>>) -> Result<Self> {
        if dimensions.iter().any(|&d| d == 0) {
            return Err(DatasetError::EmptyDomain(dimensions));
        }
        if fields.is_empty() {
            return Err(DatasetError::NoFields);
        }

        let cells = dimensions.iter().map(|&d| d as usize).product::<usize>();
        for (name, values) in &fields {
            if values.len() != cells {
                return Err(DatasetError::ShapeMismatch {
                    field: name.clone(),
                    expected: cells,
                    actual: values.len(),
                });
            }
        }

        Ok(Self {
            source: PathBuf::new(),
            dimensions,
            fields,
        })
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn cell_count(&self) -> usize {
        self.dimensions.iter().map(|&d| d as usize).product()
    }

    /// Field names in sorted order
    pub fn field_list(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Nearest-grid-point counts for particles in unit-domain coordinates.
    /// Particles outside [0, 1) on any axis are dropped.
    pub fn deposit_particles(&mut self, positions: &[[f32; 3]]) {
        let [nx, ny, nz] = self.dimensions;
        let mut counts = vec![0.0f32; self.cell_count()];

        let cell = |p: f32, n: u32| -> Option<usize> {
            if !(0.0..1.0).contains(&p) {
                return None;
            }
            Some(((p * n as f32) as usize).min(n as usize - 1))
        };

        let mut dropped = 0usize;
        for &[x, y, z] in positions {
            match (cell(x, nx), cell(y, ny), cell(z, nz)) {
                (Some(i), Some(j), Some(k)) => {
                    counts[i + j * nx as usize + k * nx as usize * ny as usize] += 1.0;
                }
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            log::warn!("{} particles fell outside the domain", dropped);
        }

        self.fields.insert(PARTICLE_FIELD.to_string(), counts);
    }

    /// The named field rescaled to [0, 1] for rendering
    pub fn scalar_volume(&self, field: &str) -> Result<ScalarVolume> {
        let values = self
            .fields
            .get(field)
            .ok_or_else(|| DatasetError::UnknownField(field.to_string()))?;

        let (data, log_scaled) = scale_for_display(values);
        Ok(ScalarVolume {
            field: field.to_string(),
            dimensions: self.dimensions,
            data,
            log_scaled,
        })
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Scale to [0, 1], in log10 when the field is positive and spans decades
fn scale_for_display(values: &[f32]) -> (Vec<f32>, bool) {
    let range = crate::core::capture::finite_range(values);
    let log_scaled = matches!(range, Some((lo, hi)) if lo > 0.0 && hi / lo > LOG_SCALE_SPAN);

    let mut data: Vec<f32> = if log_scaled {
        values.iter().map(|v| v.log10()).collect()
    } else {
        values.to_vec()
    };
    crate::core::capture::normalize_in_place(&mut data);
    (data, log_scaled)
}

/// One field ready for upload as a 3D texture
#[derive(Debug, Clone)]
pub struct ScalarVolume {
    pub field: String,
    pub dimensions: [u32; 3],
    pub data: Vec<f32>,
    pub log_scaled: bool,
}
