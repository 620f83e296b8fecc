use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// A mask-extraction job: one binary mask image in, one GeoJSON file out.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExtractJob {
    /// Path of the binary mask image (PNG or TIFF).
    pub mask_path: String,
    /// Path of the GeoJSON file to write.
    pub output_path: String,
    /// Components smaller than this many pixels are discarded.
    #[serde(default = "default_min_area")]
    pub min_area: u32,
    /// Class assigned to every extracted region.
    #[serde(default)]
    pub class_name: String,
    /// Douglas-Peucker tolerance for display output; exact contours when
    /// absent.
    pub simplify_tolerance: Option<f32>,
    /// Offset of the mask within the orthophoto, (x, y).
    #[serde(default)]
    pub origin: (i32, i32),
}

fn default_min_area() -> u32 {
    4
}

impl ExtractJob {
    /// Load a job configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a job configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, JobError> {
        let job: ExtractJob = toml::from_str(content)?;
        Ok(job)
    }

    /// Load a job configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a job configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self, JobError> {
        let job: ExtractJob = serde_json::from_str(content)?;
        Ok(job)
    }

    /// Auto-detect file format and load the configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(JobError::UnsupportedFileFormat),
        }
    }

    /// Convert the job to a TOML string
    pub fn to_toml(&self) -> Result<String, JobError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Convert the job to a JSON string
    pub fn to_json(&self) -> Result<String, JobError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }
}
