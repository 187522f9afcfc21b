use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, SkywatchError};

/// Operator/type/image context for one airframe
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftReference {
    pub operator: Option<String>,
    pub aircraft_type: Option<String>,
    pub image_link: Option<String>,
}

/// One row of a plane-alert-db style CSV. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct ReferenceRow {
    #[serde(rename = "$ICAO")]
    icao: String,
    #[serde(rename = "$Operator", default)]
    operator: Option<String>,
    #[serde(rename = "$Type", default)]
    aircraft_type: Option<String>,
    #[serde(rename = "#ImageLink", default)]
    image_link: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Hex code → reference context, loaded once at startup
#[derive(Debug, Default, Clone)]
pub struct ReferenceTable {
    entries: HashMap<String, AircraftReference>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file in order; later files override earlier ones
    pub fn load_files(paths: &[PathBuf]) -> Result<Self> {
        let mut table = Self::new();
        for path in paths {
            let loaded = table
                .load_file(path)
                .map_err(|e| SkywatchError::config(format!("load {}", path.display()), e))?;
            info!("Loaded {} reference rows from {}", loaded, path.display());
        }
        Ok(table)
    }

    fn load_file(&mut self, path: &Path) -> anyhow::Result<usize> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open reference file {}", path.display()))?;
        self.merge_csv(file)
            .with_context(|| format!("Failed to parse reference file {}", path.display()))
    }

    /// Merge CSV rows from any reader, returning the number of rows read
    pub fn merge_csv<R: Read>(&mut self, reader: R) -> anyhow::Result<usize> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut count = 0;
        for row in csv_reader.deserialize::<ReferenceRow>() {
            let row = row?;
            let key = row.icao.trim().to_uppercase();
            if key.is_empty() {
                continue;
            }
            self.entries.insert(
                key,
                AircraftReference {
                    operator: non_blank(row.operator),
                    aircraft_type: non_blank(row.aircraft_type),
                    image_link: non_blank(row.image_link),
                },
            );
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, hex: &str) -> Option<&AircraftReference> {
        self.entries.get(&hex.trim().to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
