//! Grid configuration and its property-bag form.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::grid::grid_types::{GridError, GridResult};

pub const PROP_CAPACITY: &str = "grid.capacity";
pub const PROP_MIN_X: &str = "grid.min_x";
pub const PROP_MIN_Y: &str = "grid.min_y";
pub const PROP_MAX_X: &str = "grid.max_x";
pub const PROP_MAX_Y: &str = "grid.max_y";

/// Parameters a grid is built from: the covered region and the requested
/// number of tiles.
///
/// A configuration can be flattened to string properties and read back, so an
/// index can be reconstructed from a property bag plus a node store.
///
/// # Examples
///
/// ```rust
/// use nitrite_grid::{BoundingBox, GridConfig};
///
/// let config = GridConfig::new(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 16);
/// let props = config.to_properties();
/// assert_eq!(props["grid.capacity"], "16");
/// assert_eq!(GridConfig::from_properties(&props).unwrap(), config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub region: BoundingBox,
    pub capacity: usize,
}

impl GridConfig {
    pub fn new(region: BoundingBox, capacity: usize) -> Self {
        Self { region, capacity }
    }

    /// Rejects configurations that cannot produce a tiling.
    pub fn validate(&self) -> GridResult<()> {
        if self.capacity == 0 {
            return Err(GridError::Configuration(
                "grid capacity must be positive".into(),
            ));
        }
        if !self.region.is_valid() || self.region.is_degenerate() {
            return Err(GridError::Configuration(format!(
                "grid region {} must be finite with a positive extent on every axis",
                self.region
            )));
        }
        Ok(())
    }

    pub fn to_properties(&self) -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert(PROP_CAPACITY.to_string(), self.capacity.to_string());
        props.insert(PROP_MIN_X.to_string(), self.region.min_x.to_string());
        props.insert(PROP_MIN_Y.to_string(), self.region.min_y.to_string());
        props.insert(PROP_MAX_X.to_string(), self.region.max_x.to_string());
        props.insert(PROP_MAX_Y.to_string(), self.region.max_y.to_string());
        props
    }

    pub fn from_properties(props: &HashMap<String, String>) -> GridResult<Self> {
        let config = Self {
            region: BoundingBox::new(
                property(props, PROP_MIN_X)?,
                property(props, PROP_MIN_Y)?,
                property(props, PROP_MAX_X)?,
                property(props, PROP_MAX_Y)?,
            ),
            capacity: property(props, PROP_CAPACITY)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn property<T>(props: &HashMap<String, String>, name: &str) -> GridResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = props
        .get(name)
        .ok_or_else(|| GridError::Configuration(format!("missing property {}", name)))?;
    raw.trim().parse().map_err(|e| {
        GridError::Configuration(format!("invalid value {:?} for {}: {}", raw, name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_roundtrip() {
        let config = GridConfig::new(BoundingBox::new(-180.0, -90.0, 180.0, 90.0), 64);
        let props = config.to_properties();
        assert_eq!(props.len(), 5);
        assert_eq!(props[PROP_MIN_X], "-180");
        assert_eq!(GridConfig::from_properties(&props).unwrap(), config);
    }

    #[test]
    fn test_properties_fractional_coordinates() {
        let config = GridConfig::new(BoundingBox::new(0.125, 0.5, 10.75, 3.3), 3);
        let props = config.to_properties();
        assert_eq!(GridConfig::from_properties(&props).unwrap(), config);
    }

    #[test]
    fn test_missing_property() {
        let mut props = GridConfig::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1).to_properties();
        props.remove(PROP_MAX_Y);
        let err = GridConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, GridError::Configuration(ref msg) if msg.contains(PROP_MAX_Y)));
    }

    #[test]
    fn test_unparsable_property() {
        let mut props = GridConfig::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1).to_properties();
        props.insert(PROP_CAPACITY.to_string(), "lots".to_string());
        assert!(matches!(
            GridConfig::from_properties(&props),
            Err(GridError::Configuration(_))
        ));

        props.insert(PROP_CAPACITY.to_string(), "-4".to_string());
        assert!(matches!(
            GridConfig::from_properties(&props),
            Err(GridError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate() {
        let region = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(GridConfig::new(region, 1).validate().is_ok());
        assert!(GridConfig::new(region, 0).validate().is_err());
        assert!(GridConfig::new(BoundingBox::new(0.0, 0.0, 10.0, 0.0), 4).validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = GridConfig::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 4);
        let json = serde_json::to_string(&config).unwrap();
        let back: GridConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
