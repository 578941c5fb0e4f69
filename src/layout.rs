//! Floor-plan layout: which sensor sits where on which floor.
//!
//! The layout is static configuration owned by the rendering side. The
//! monitor only walks it to attach classifications to each placed sensor.
//!
//! # File format
//!
//! ```json
//! {
//!     "floors": [
//!         { "name": "B2", "asset": "/f2.png", "positions": { "k1": [120.5, 1.0, -40.0] } },
//!         { "name": "B3", "asset": "/f3.png", "positions": { "k21": [-300.0, 1.0, 210.0] } }
//!     ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// One floor plan and the sensors placed on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    /// Display name (e.g. "B2").
    pub name: String,

    /// Floor-plan image for the renderer.
    pub asset: String,

    /// Sensor id to `[x, y, z]` placement.
    #[serde(default)]
    pub positions: BTreeMap<String, [f64; 3]>,
}

impl Floor {
    fn empty(name: &str, asset: &str) -> Self {
        Self {
            name: name.to_string(),
            asset: asset.to_string(),
            positions: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct LayoutFile {
    floors: Vec<Floor>,
}

/// All floors being monitored.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    floors: Vec<Floor>,
}

impl Default for Layout {
    /// The two basement floors with nothing placed yet.
    fn default() -> Self {
        Self {
            floors: vec![Floor::empty("B2", "/f2.png"), Floor::empty("B3", "/f3.png")],
        }
    }
}

impl Layout {
    /// Build a layout, rejecting sensors placed on more than one floor.
    pub fn new(floors: Vec<Floor>) -> Result<Self, LayoutError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();

        for floor in &floors {
            for id in floor.positions.keys() {
                if let Some(first) = seen.insert(id, &floor.name) {
                    return Err(LayoutError::DuplicateSensor {
                        sensor: id.clone(),
                        first: first.to_string(),
                        second: floor.name.clone(),
                    });
                }
            }
        }

        Ok(Self { floors })
    }

    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let file: LayoutFile = serde_json::from_str(json)?;
        Self::new(file.floors)
    }

    /// Read a layout file from disk.
    pub async fn load(path: &Path) -> Result<Self, LayoutError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub fn floors(&self) -> &[Floor] {
        &self.floors
    }

    /// Total number of placed sensors across all floors.
    pub fn sensor_count(&self) -> usize {
        self.floors.iter().map(|f| f.positions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_has_two_floors() {
        let layout = Layout::default();
        assert_eq!(layout.floors().len(), 2);
        assert_eq!(layout.floors()[0].name, "B2");
        assert_eq!(layout.floors()[1].asset, "/f3.png");
        assert_eq!(layout.sensor_count(), 0);
    }

    #[test]
    fn test_from_json() {
        let layout = Layout::from_json(
            r#"{"floors":[
                {"name":"B2","asset":"/f2.png","positions":{"k1":[1,2,3],"k2":[4.5,0,-1]}},
                {"name":"B3","asset":"/f3.png"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(layout.sensor_count(), 2);
        assert_eq!(layout.floors()[0].positions["k2"], [4.5, 0.0, -1.0]);
        assert!(layout.floors()[1].positions.is_empty());
    }

    #[test]
    fn test_duplicate_sensor_rejected() {
        let err = Layout::from_json(
            r#"{"floors":[
                {"name":"B2","asset":"/f2.png","positions":{"k1":[0,0,0]}},
                {"name":"B3","asset":"/f3.png","positions":{"k1":[0,0,0]}}
            ]}"#,
        )
        .unwrap_err();

        assert!(matches!(err, LayoutError::DuplicateSensor { ref sensor, .. } if sensor == "k1"));
    }

    #[test]
    fn test_malformed_layout() {
        assert!(matches!(
            Layout::from_json(r#"{"floors":[{"name":"B2"}]}"#),
            Err(LayoutError::Parse(_))
        ));
        assert!(matches!(
            Layout::from_json(r#"{"floors":[{"name":"B2","asset":"a","positions":{"k1":[1,2]}}]}"#),
            Err(LayoutError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Layout::load(Path::new("/nonexistent/leakwatch-layout.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, LayoutError::Io(_)));
    }
}
