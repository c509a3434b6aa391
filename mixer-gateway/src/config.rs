//! Feature-flag configuration and regional cache selection. Validated but
//! passive: nothing here changes translation or dispatch behavior in this crate, the
//! flags are only checked for internal consistency at startup.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureFlags {
    pub enable_v3: bool,
    pub v3_mirror_fraction: f64,
    pub use_spanner_graph: bool,
    pub spanner_graph_database: Option<String>,
    pub use_stale_reads: bool,
    pub enable_embeddings_resolver: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            enable_v3: false,
            v3_mirror_fraction: 0.0,
            use_spanner_graph: false,
            spanner_graph_database: None,
            use_stale_reads: false,
            enable_embeddings_resolver: true,
        }
    }
}

impl FeatureFlags {
    /// Cross-field consistency checks; unparsable/contradictory config is an *internal*
    /// error, surfaced at startup.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.v3_mirror_fraction) {
            return Err(GatewayError::Translate(
                mixer_translate::error::TranslateError::internal(format!(
                    "V3MirrorFraction must be within [0,1], got {}",
                    self.v3_mirror_fraction
                )),
            ));
        }
        if self.v3_mirror_fraction > 0.0 && !self.enable_v3 {
            return Err(config_error("V3MirrorFraction > 0 requires EnableV3=true"));
        }
        if self.spanner_graph_database.is_some() && !(self.use_spanner_graph && self.enable_v3) {
            return Err(config_error(
                "SpannerGraphDatabase requires UseSpannerGraph and EnableV3",
            ));
        }
        if self.use_stale_reads && !self.use_spanner_graph {
            return Err(config_error("UseStaleReads requires UseSpannerGraph"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> GatewayError {
    GatewayError::Translate(mixer_translate::error::TranslateError::internal(message))
}

/// One entry in the regional cache list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionalCacheEntry {
    pub region: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RegionalCacheConfig {
    pub entries: Vec<RegionalCacheEntry>,
}

impl RegionalCacheConfig {
    /// Picks the entry whose region matches `deployment_region`, falling back to the
    /// first entry.
    pub fn select(&self, deployment_region: &str) -> Option<&RegionalCacheEntry> {
        self.entries
            .iter()
            .find(|e| e.region == deployment_region)
            .or_else(|| self.entries.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_mirror_fraction() {
        let flags = FeatureFlags {
            v3_mirror_fraction: 1.5,
            ..FeatureFlags::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn rejects_mirror_fraction_without_v3() {
        let flags = FeatureFlags {
            v3_mirror_fraction: 0.5,
            enable_v3: false,
            ..FeatureFlags::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn accepts_consistent_flags() {
        let flags = FeatureFlags {
            enable_v3: true,
            v3_mirror_fraction: 0.2,
            use_spanner_graph: true,
            spanner_graph_database: Some("db".to_string()),
            use_stale_reads: true,
            enable_embeddings_resolver: true,
        };
        assert!(flags.validate().is_ok());
    }

    #[test]
    fn regional_selection_falls_back_to_first_entry() {
        let config = RegionalCacheConfig {
            entries: vec![
                RegionalCacheEntry {
                    region: "us-central1".to_string(),
                    host: "a".to_string(),
                    port: 1,
                },
                RegionalCacheEntry {
                    region: "europe-west1".to_string(),
                    host: "b".to_string(),
                    port: 2,
                },
            ],
        };
        assert_eq!(config.select("asia-east1").unwrap().host, "a");
        assert_eq!(config.select("europe-west1").unwrap().host, "b");
    }
}
