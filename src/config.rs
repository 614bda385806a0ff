//! Configuration management for the storage engine.
//!
//! Every option is bound to a `ROK4_*` environment variable, so the same
//! [`StorageConfig`] is filled either from the process environment alone
//! ([`StorageConfig::from_env`]) or flattened into a CLI where flags override
//! the environment.
//!
//! # Environment Variables
//!
//! - `ROK4_S3_KEY`, `ROK4_S3_SECRETKEY`, `ROK4_S3_URL` - comma-separated lists,
//!   one element per S3 cluster, same length required. First entry is the
//!   default cluster.
//! - `ROK4_SSL_NO_VERIFY` - disable TLS verification for S3 when non-empty
//! - `ROK4_CEPH_CONFFILE`, `ROK4_CEPH_CLUSTERNAME`, `ROK4_CEPH_USERNAME`
//! - `ROK4_READING_LRU_CACHE_SIZE` - cached reads (default: 64, <= 0 for unbounded)
//! - `ROK4_READING_LRU_CACHE_TTL` - cache rotation in seconds (default: 300, <= 0 for never)
//! - `ROK4_TMS_DIRECTORY` - where tile matrix sets are read from

use clap::{Args, Parser, Subcommand};

use crate::error::StorageError;

// =============================================================================
// Default Values
// =============================================================================

/// Default number of cached reads.
pub const DEFAULT_CACHE_SIZE: i64 = 64;

/// Default cache time bucket, in seconds.
pub const DEFAULT_CACHE_TTL: i64 = 300;

// =============================================================================
// Storage Configuration
// =============================================================================

/// Storage backends and read cache configuration.
#[derive(Args, Debug, Clone)]
pub struct StorageConfig {
    /// S3 access keys, one per cluster.
    #[arg(long = "s3-key", env = "ROK4_S3_KEY", value_delimiter = ',')]
    pub s3_keys: Option<Vec<String>>,

    /// S3 secret keys, one per cluster.
    #[arg(long = "s3-secret-key", env = "ROK4_S3_SECRETKEY", value_delimiter = ',')]
    pub s3_secret_keys: Option<Vec<String>>,

    /// S3 endpoint URLs, one per cluster. The first one is the default cluster.
    #[arg(long = "s3-url", env = "ROK4_S3_URL", value_delimiter = ',')]
    pub s3_urls: Option<Vec<String>>,

    /// Disable TLS certificate verification for S3 when set to a non-empty value.
    #[arg(long, env = "ROK4_SSL_NO_VERIFY")]
    pub ssl_no_verify: Option<String>,

    /// CEPH configuration file.
    #[arg(long, env = "ROK4_CEPH_CONFFILE")]
    pub ceph_conf_file: Option<String>,

    /// CEPH cluster name.
    #[arg(long, env = "ROK4_CEPH_CLUSTERNAME")]
    pub ceph_cluster_name: Option<String>,

    /// CEPH user name.
    #[arg(long, env = "ROK4_CEPH_USERNAME")]
    pub ceph_user_name: Option<String>,

    /// Number of cached reads. Zero or negative for an unbounded cache.
    #[arg(
        long,
        env = "ROK4_READING_LRU_CACHE_SIZE",
        default_value_t = DEFAULT_CACHE_SIZE,
        allow_negative_numbers = true
    )]
    pub cache_size: i64,

    /// Cache time bucket in seconds. Zero or negative to never rotate.
    #[arg(
        long,
        env = "ROK4_READING_LRU_CACHE_TTL",
        default_value_t = DEFAULT_CACHE_TTL,
        allow_negative_numbers = true
    )]
    pub cache_ttl: i64,

    /// Directory (or object prefix) holding tile matrix set JSON files.
    #[arg(long, env = "ROK4_TMS_DIRECTORY")]
    pub tms_directory: Option<String>,
}

/// One configured S3 cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3ClusterConfig {
    /// Endpoint URL without its scheme, used to select the cluster
    pub host: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint_url: String,
}

/// CEPH connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CephConfig {
    pub conf_file: String,
    pub cluster_name: String,
    pub user_name: String,
}

// =============================================================================
// Command Line
// =============================================================================

/// Storage and pyramid tool.
#[derive(Parser, Debug)]
#[command(name = "rok4")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub storage: StorageConfig,

    /// Enable verbose logging.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the content of a file or object.
    Cat {
        path: String,
        /// Byte range start, with --length
        #[arg(long, requires = "length")]
        offset: Option<u64>,
        #[arg(long, requires = "offset")]
        length: Option<u64>,
    },

    /// Tell whether a file or object exists.
    Exists { path: String },

    /// Print the size of a file or object, or of everything under it with --recursive.
    Size {
        path: String,
        #[arg(short, long, default_value_t = false)]
        recursive: bool,
    },

    /// Copy between any two storages.
    Copy {
        from: String,
        to: String,
        /// Expected MD5 sum, checked on the destination
        #[arg(long)]
        md5: Option<String>,
    },

    /// Create a link to a file or object.
    Link {
        target: String,
        link: String,
        /// Hard link, FILE storage only
        #[arg(long, default_value_t = false)]
        hard: bool,
    },

    /// Remove a file or object.
    Rm { path: String },

    /// Print the storage path of the slab holding a tile.
    SlabPath {
        /// Pyramid descriptor
        descriptor: String,
        level: String,
        column: u64,
        row: u64,
        /// Mask slab instead of data slab
        #[arg(long, default_value_t = false)]
        mask: bool,
    },

    /// Extract a tile: raw bytes to a file, or vector tiles as JSON.
    Tile {
        /// Pyramid descriptor
        descriptor: String,
        level: String,
        column: u64,
        row: u64,
        /// Write the raw tile to this path instead of decoding it
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Parser)]
struct EnvOnly {
    #[command(flatten)]
    storage: StorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            s3_keys: None,
            s3_secret_keys: None,
            s3_urls: None,
            ssl_no_verify: None,
            ceph_conf_file: None,
            ceph_cluster_name: None,
            ceph_user_name: None,
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            tms_directory: None,
        }
    }
}

impl StorageConfig {
    /// Read the configuration from the process environment only.
    pub fn from_env() -> Result<Self, StorageError> {
        EnvOnly::try_parse_from(["rok4"])
            .map(|parsed| parsed.storage)
            .map_err(|e| StorageError::backend("ENV", e.to_string().trim()))
    }

    /// Validate and return the configured S3 clusters, default one first.
    pub fn s3_clusters(&self) -> Result<Vec<S3ClusterConfig>, StorageError> {
        let keys = self
            .s3_keys
            .as_ref()
            .ok_or_else(|| StorageError::MissingEnvironment("ROK4_S3_KEY".to_string()))?;
        let secret_keys = self
            .s3_secret_keys
            .as_ref()
            .ok_or_else(|| StorageError::MissingEnvironment("ROK4_S3_SECRETKEY".to_string()))?;
        let urls = self
            .s3_urls
            .as_ref()
            .ok_or_else(|| StorageError::MissingEnvironment("ROK4_S3_URL".to_string()))?;

        if keys.len() != secret_keys.len() || keys.len() != urls.len() {
            return Err(StorageError::backend(
                "S3",
                "S3 informations in environment variables are inconsistent: same number of element in each list is required",
            ));
        }

        let mut clusters: Vec<S3ClusterConfig> = Vec::with_capacity(urls.len());
        for ((key, secret), url) in keys.iter().zip(secret_keys).zip(urls) {
            let host = strip_scheme(url).to_string();
            if clusters.iter().any(|c| c.host == host) {
                return Err(StorageError::backend(
                    "S3",
                    format!("A S3 cluster is defined twice (based on URL): {}", host),
                ));
            }
            clusters.push(S3ClusterConfig {
                host,
                access_key: key.clone(),
                secret_key: secret.clone(),
                endpoint_url: url.clone(),
            });
        }

        Ok(clusters)
    }

    /// Validate and return the CEPH connection settings.
    pub fn ceph(&self) -> Result<CephConfig, StorageError> {
        let require = |value: &Option<String>, var: &str| {
            value
                .clone()
                .ok_or_else(|| StorageError::MissingEnvironment(var.to_string()))
        };

        Ok(CephConfig {
            conf_file: require(&self.ceph_conf_file, "ROK4_CEPH_CONFFILE")?,
            cluster_name: require(&self.ceph_cluster_name, "ROK4_CEPH_CLUSTERNAME")?,
            user_name: require(&self.ceph_user_name, "ROK4_CEPH_USERNAME")?,
        })
    }

    /// Whether S3 TLS certificates must not be checked.
    pub fn tls_verification_disabled(&self) -> bool {
        self.ssl_no_verify
            .as_deref()
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    /// Read cache capacity, `None` for unbounded.
    pub fn cache_capacity(&self) -> Option<usize> {
        if self.cache_size <= 0 {
            None
        } else {
            Some(self.cache_size as usize)
        }
    }

    /// Read cache time bucket length in seconds, `None` when buckets never rotate.
    pub fn cache_ttl_secs(&self) -> Option<u64> {
        if self.cache_ttl <= 0 {
            None
        } else {
            Some(self.cache_ttl as u64)
        }
    }

    /// Tile matrix sets directory.
    pub fn tms_directory(&self) -> Result<&str, StorageError> {
        self.tms_directory
            .as_deref()
            .ok_or_else(|| StorageError::MissingEnvironment("ROK4_TMS_DIRECTORY".to_string()))
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

// =============================================================================
// Tests
// =============================================================================
