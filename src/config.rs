//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/kgrag/config.toml` (XDG) or platform config dir
//! 2. Project config: `.kgrag.toml`
//! 3. Environment variables: `KGRAG_*` (nested keys separated by `__`)
//!
//! # Example
//!
//! ```toml
//! [neo4j]
//! uri = "bolt://localhost:7687"
//! user = "neo4j"
//! password = "password"
//!
//! [retrieval]
//! concurrency = 8
//! deadline_ms = 30000
//! community_depth_cap = 10
//!
//! [export]
//! chunk_limit = 100
//! ```
//!
//! Every section except `[neo4j]` has defaults. `[neo4j]` is only required
//! when running against a live database; `KGRAG_NEO4J__PASSWORD=...` sets
//! the password from the environment.

use std::ops::Deref;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Neo4j connection, absent when running against an in-memory fixture.
    #[serde(default)]
    pub neo4j: Option<Neo4jConfig>,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Neo4j connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// Bolt URI (required), e.g. `bolt://localhost:7687`.
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Database name; the server default when absent.
    #[serde(default)]
    pub database: Option<String>,
    /// Upper bound of the driver's connection pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    16
}

/// Tuning for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum concurrent store queries issued by a single call.
    pub concurrency: usize,
    /// Per-call deadline in milliseconds.
    pub deadline_ms: u64,
    /// Maximum parent-community hops walked before truncating.
    pub community_depth_cap: usize,
    /// Maximum entities kept per chunk group, ranked by frequency.
    pub entity_limit: usize,
    /// Minimum cosine similarity for an entity to be expanded.
    pub embedding_match_min: f32,
    /// Maximum paths returned per expanded entity.
    pub entity_path_limit: usize,
    /// Maximum relationship hops from an expanded entity.
    pub traversal_depth: usize,
    /// Chunks kept in entity-anchored (local community) context.
    pub local_top_chunks: usize,
    /// Communities kept in entity-anchored context.
    pub local_top_communities: usize,
    /// Outside neighbors kept in entity-anchored context.
    pub local_top_outside_rels: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            deadline_ms: 30_000,
            community_depth_cap: 10,
            entity_limit: 100,
            embedding_match_min: 0.1,
            entity_path_limit: 100,
            traversal_depth: 2,
            local_top_chunks: 15,
            local_top_communities: 15,
            local_top_outside_rels: 30,
        }
    }
}

impl RetrievalConfig {
    /// The per-call deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Tuning for graph exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Chunks fetched per document in document-based exports.
    pub chunk_limit: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { chunk_limit: 100 }
    }
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::user_config_path(), Path::new(".kgrag.toml"))
    }

    /// Load config from explicit file locations, still honoring `KGRAG_*`.
    pub fn load_from(user_config: &Path, project_config: &Path) -> Result<Self, ConfigError> {
        let config: Config = Figment::new()
            // Layer 1: User config (lowest priority)
            .merge(Toml::file(user_config))
            // Layer 2: Project config
            .merge(Toml::file(project_config))
            // Layer 3: Environment variables (highest priority)
            .merge(Env::prefixed("KGRAG_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        let problem = if r.concurrency == 0 {
            Some("retrieval.concurrency must be at least 1")
        } else if r.deadline_ms == 0 {
            Some("retrieval.deadline_ms must be positive")
        } else if r.community_depth_cap == 0 {
            Some("retrieval.community_depth_cap must be at least 1")
        } else if r.traversal_depth > r.community_depth_cap {
            Some("retrieval.traversal_depth cannot exceed retrieval.community_depth_cap")
        } else if !(0.0..=1.0).contains(&r.embedding_match_min) {
            Some("retrieval.embedding_match_min must be within [0, 1]")
        } else if self.export.chunk_limit == 0 {
            Some("export.chunk_limit must be at least 1")
        } else {
            None
        };

        match problem {
            Some(msg) => Err(figment::Error::from(msg.to_string()).into()),
            None => Ok(()),
        }
    }

    /// User config path: ~/.config/kgrag/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        // Prefer XDG config location (~/.config) on all platforms
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("kgrag").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        // Fall back to platform-specific config dir
        dirs::config_dir()
            .map(|p| p.join("kgrag").join("config.toml"))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = Config::load_from(
                &jail.directory().join("missing.toml"),
                &jail.directory().join(".kgrag.toml"),
            )
            .expect("defaults should load");
            assert!(config.neo4j.is_none());
            assert_eq!(config.retrieval.community_depth_cap, 10);
            assert_eq!(config.retrieval.entity_limit, 100);
            assert_eq!(config.export.chunk_limit, 100);
            Ok(())
        });
    }

    #[test]
    fn test_project_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                ".kgrag.toml",
                r#"
                [neo4j]
                uri = "bolt://db:7687"

                [retrieval]
                concurrency = 2
                "#,
            )?;
            jail.set_env("KGRAG_RETRIEVAL__CONCURRENCY", "4");
            jail.set_env("KGRAG_NEO4J__PASSWORD", "secret");

            let config = Config::load_from(
                &jail.directory().join("missing.toml"),
                &jail.directory().join(".kgrag.toml"),
            )
            .expect("config should load");
            let neo4j = config.neo4j.expect("neo4j section");
            assert_eq!(neo4j.uri, "bolt://db:7687");
            assert_eq!(neo4j.user, "neo4j");
            assert_eq!(neo4j.password.as_deref(), Some("secret"));
            assert_eq!(config.retrieval.concurrency, 4);
            assert_eq!(config.retrieval.deadline_ms, 30_000);
            Ok(())
        });
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        Jail::expect_with(|jail| {
            jail.create_file(".kgrag.toml", "[retrieval]\nconcurrency = 0\n")?;
            let result = Config::load_from(
                &jail.directory().join("missing.toml"),
                &jail.directory().join(".kgrag.toml"),
            );
            assert!(result.is_err());
            Ok(())
        });
    }
}
