use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while subsetting GeoJSON files.
#[derive(Debug, Error)]
pub enum SubsetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("failed to serialize GeoJSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("column '{column}' not found in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("could not build transform from EPSG:{epsg} to EPSG:4326: {source}")]
    ProjSetup {
        epsg: u32,
        source: proj::ProjCreateError,
    },

    #[error("coordinate transform failed: {0}")]
    Projection(#[from] proj::ProjError),

    #[error("invalid CRS specification '{0}' (expected an EPSG code or 'no')")]
    Crs(String),

    #[error("invalid batch table: {0}")]
    Table(String),
}
