//! Coordinate reference system tag
//!
//! The engine never reprojects. A `CRS` is carried from the source DEM to
//! every derived grid so external writers can label their output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque coordinate reference system tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CRS {
    /// Authority code such as `EPSG:32719`
    Epsg(u32),
    /// Well-known text
    Wkt(String),
    /// PROJ string or any other textual definition
    Proj(String),
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS::Wkt(wkt.into())
    }

    pub fn from_proj(proj: impl Into<String>) -> Self {
        CRS::Proj(proj.into())
    }

    /// EPSG code if the tag carries one
    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            _ => None,
        }
    }

    /// Short identifier suitable for log lines
    pub fn identifier(&self) -> String {
        match self {
            CRS::Epsg(code) => format!("EPSG:{}", code),
            CRS::Proj(proj) => proj.clone(),
            CRS::Wkt(wkt) => {
                let head: String = wkt.chars().take(50).collect();
                format!("WKT:{}", head)
            }
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
