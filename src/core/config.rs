//! Cache configuration
//!
//! Parameters are supplied at construction time from defaults, a JSON file,
//! and `PLANETILE_*` environment overrides, then validated once.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PLANETILE_";

/// Deepest tree supported (root page size must fit in a u64 pixel count)
pub const MAX_TREE_DEPTH: u32 = 24;

/// Geometry of the page pyramid
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeConfig {
    /// Edge length of one tile in pixels
    pub page_size: u32,
    /// Width of the full-resolution map in pixels (longitude axis)
    pub map_width: u32,
    /// Height of the full-resolution map in pixels (latitude axis)
    pub map_height: u32,
    /// Depth of the root page; leaves are depth 0
    pub max_depth: u32,
}

impl TreeConfig {
    /// Edge length in pixels covered by a page at `depth`
    pub fn page_extent(&self, depth: u32) -> u64 {
        (self.page_size as u64) << depth
    }

    /// Check the map fits under a single root page
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::ZeroCapacity("page size"));
        }
        if self.max_depth > MAX_TREE_DEPTH {
            return Err(Error::Config(format!(
                "max_depth {} exceeds the supported maximum of {}",
                self.max_depth, MAX_TREE_DEPTH
            )));
        }
        let root_size = self.page_extent(self.max_depth);
        if self.map_width == 0
            || self.map_height == 0
            || self.map_width as u64 > root_size
            || self.map_height as u64 > root_size
        {
            return Err(Error::InvalidExtent {
                width: self.map_width,
                height: self.map_height,
                root_size,
            });
        }
        Ok(())
    }
}

/// Configuration for a page cache instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Slot grid width (slots)
    pub pool_width: u32,
    /// Slot grid height (slots)
    pub pool_height: u32,
    /// Number of background loader threads (0 = caller pumps loads)
    pub worker_threads: usize,
    /// Number of reusable tile buffers shared by the loaders
    pub buffer_count: usize,
    /// Edge length of one tile in pixels
    pub page_size: u32,
    /// Width of the full-resolution map in pixels
    pub map_width: u32,
    /// Height of the full-resolution map in pixels
    pub map_height: u32,
    /// Depth of the root page
    pub max_depth: u32,
    /// Angular footprint (radians) below which pages are not subdivided
    pub lod_cutoff: f64,
    /// Lowest surface radius (deepest terrain)
    pub min_radius: f64,
    /// Highest surface radius (tallest terrain)
    pub max_radius: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_width: 16,
            pool_height: 16,
            worker_threads: 2,
            buffer_count: 8,
            page_size: 256,
            map_width: 8192,
            map_height: 4096,
            max_depth: 5,
            lod_cutoff: 0.1,
            min_radius: 6_371_000.0,
            max_radius: 6_380_000.0,
        }
    }
}

impl CacheConfig {
    /// Number of slots in the cache
    pub fn capacity(&self) -> usize {
        self.pool_width as usize * self.pool_height as usize
    }

    /// Pyramid geometry portion of the config
    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            page_size: self.page_size,
            map_width: self.map_width,
            map_height: self.map_height,
            max_depth: self.max_depth,
        }
    }

    /// Radius range used for cap culling and LOD distances
    pub fn radius_range(&self) -> (f64, f64) {
        (self.min_radius, self.max_radius)
    }

    /// Reject configurations the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.capacity() == 0 {
            return Err(Error::ZeroCapacity("slot pool"));
        }
        if self.buffer_count == 0 {
            return Err(Error::ZeroCapacity("buffer pool"));
        }
        self.tree_config().validate()?;
        if !(self.lod_cutoff > 0.0) {
            return Err(Error::Config(format!(
                "lod_cutoff must be positive, got {}",
                self.lod_cutoff
            )));
        }
        if !(self.min_radius > 0.0) || self.max_radius < self.min_radius {
            return Err(Error::Config(format!(
                "invalid radius range [{}, {}]",
                self.min_radius, self.max_radius
            )));
        }
        Ok(())
    }

    /// Load from a JSON file (sync). Missing fields keep their defaults.
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Defaults with `PLANETILE_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides looked up by full variable name (e.g. `PLANETILE_WORKERS`)
    pub fn apply_overrides<L>(&mut self, lookup: L) -> Result<()>
    where
        L: Fn(&str) -> Option<String>,
    {
        override_field(&lookup, "POOL_WIDTH", &mut self.pool_width)?;
        override_field(&lookup, "POOL_HEIGHT", &mut self.pool_height)?;
        override_field(&lookup, "WORKERS", &mut self.worker_threads)?;
        override_field(&lookup, "BUFFERS", &mut self.buffer_count)?;
        override_field(&lookup, "MAX_DEPTH", &mut self.max_depth)?;
        override_field(&lookup, "LOD_CUTOFF", &mut self.lod_cutoff)?;
        Ok(())
    }
}

fn override_field<L, T>(lookup: &L, name: &str, field: &mut T) -> Result<()>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let key = format!("{ENV_PREFIX}{name}");
    if let Some(raw) = lookup(&key) {
        *field = raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key}: invalid value '{raw}'")))?;
        log::debug!("config override {} = {}", key, raw.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity(), 256);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig {
            pool_width: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ZeroCapacity(_))));

        let config = CacheConfig {
            buffer_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ZeroCapacity(_))));
    }

    #[test]
    fn test_map_larger_than_root_rejected() {
        let config = CacheConfig {
            map_width: 8193,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidExtent { .. })));

        let config = CacheConfig {
            map_height: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidExtent { .. })));
    }

    #[test]
    fn test_bad_cutoff_and_radius_rejected() {
        let config = CacheConfig {
            lod_cutoff: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = CacheConfig {
            min_radius: 10.0,
            max_radius: 5.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PLANETILE_POOL_WIDTH", "4"),
            ("PLANETILE_WORKERS", " 6 "),
            ("PLANETILE_LOD_CUTOFF", "0.25"),
        ]
        .into_iter()
        .collect();

        let mut config = CacheConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.pool_width, 4);
        assert_eq!(config.pool_height, 16);
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.lod_cutoff, 0.25);
    }

    #[test]
    fn test_override_parse_error() {
        let mut config = CacheConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "PLANETILE_MAX_DEPTH").then(|| "deep".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_json_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{ "pool_width": 2, "pool_height": 3, "worker_threads": 0 }"#)
            .unwrap();

        let config = CacheConfig::load_sync(&path).unwrap();
        assert_eq!(config.capacity(), 6);
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.page_size, CacheConfig::default().page_size);
    }
}
