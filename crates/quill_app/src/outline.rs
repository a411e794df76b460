use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quill_core::{Outline, OutlineError, Unit};
use quill_logging::quill_info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutlineFileError {
    #[error("cannot read outline {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse outline {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid outline {path:?}: {source}")]
    Invalid { path: PathBuf, source: OutlineError },
}

/// Outline files are a RON list: `[(number: 1, title: "Arrival", notes: Some("...")), ...]`.
pub fn load(path: &Path) -> Result<Outline, OutlineFileError> {
    let text = fs::read_to_string(path).map_err(|source| OutlineFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let units: Vec<Unit> = ron::from_str(&text).map_err(|err| OutlineFileError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let outline = Outline::new(units).map_err(|source| OutlineFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    quill_info!("outline {:?}: {} chapters", path, outline.len());
    Ok(outline)
}

pub fn titles(outline: &Outline) -> BTreeMap<u32, String> {
    outline
        .units
        .iter()
        .map(|unit| (unit.number, unit.title.clone()))
        .collect()
}
