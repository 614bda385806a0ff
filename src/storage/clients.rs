//! Backend client registry.
//!
//! One [`BackendClients`] is built at startup and shared by reference. S3
//! clients (one per configured cluster) and the CEPH connection are created
//! on first use, exactly once, and dropped by [`BackendClients::disconnect`].
//! FILE and HTTP(S) need no persistent state besides a shared HTTP client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::Client;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::ceph::{CephConnector, CephPool};
use crate::config::{S3ClusterConfig, StorageConfig};
use crate::error::StorageError;

/// Region sent to S3-compatible endpoints. They ignore it but the SDK requires one.
const S3_REGION: &str = "us-east-1";

/// S3 client bound to one cluster.
#[derive(Clone, Debug)]
pub struct S3Cluster {
    /// Endpoint host, without scheme
    pub host: String,
    pub client: Client,
}

/// A bucket resolved to its cluster.
#[derive(Clone, Debug)]
pub struct S3Target {
    pub client: Client,
    /// Bucket name without cluster suffix
    pub bucket: String,
    /// Host of the selected cluster
    pub host: String,
}

#[derive(Default)]
struct CephState {
    connector: Option<Arc<dyn CephConnector>>,
    pools: HashMap<String, Arc<dyn CephPool>>,
}

/// Lazily initialized clients for every backend.
pub struct BackendClients {
    config: StorageConfig,
    s3: RwLock<Option<Arc<Vec<S3Cluster>>>>,
    ceph: Mutex<CephState>,
    ceph_override: Option<Arc<dyn CephConnector>>,
    http: reqwest::Client,
}

impl BackendClients {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            s3: RwLock::new(None),
            ceph: Mutex::new(CephState::default()),
            ceph_override: None,
            http: reqwest::Client::new(),
        }
    }

    /// Use `connector` for CEPH instead of librados.
    pub fn with_ceph_connector(mut self, connector: Arc<dyn CephConnector>) -> Self {
        self.ceph_override = Some(connector);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // =========================================================================
    // S3
    // =========================================================================

    /// All S3 clusters, default first. Built on first call.
    pub async fn s3_clusters(&self) -> Result<Arc<Vec<S3Cluster>>, StorageError> {
        if let Some(clusters) = self.s3.read().await.as_ref() {
            return Ok(clusters.clone());
        }

        let mut guard = self.s3.write().await;
        if let Some(clusters) = guard.as_ref() {
            return Ok(clusters.clone());
        }

        let configs = self.config.s3_clusters()?;
        let no_verify = self.config.tls_verification_disabled();
        if no_verify {
            warn!("TLS certificate verification is disabled for S3");
        }

        let mut clusters = Vec::with_capacity(configs.len());
        for config in &configs {
            clusters.push(S3Cluster {
                host: config.host.clone(),
                client: build_s3_client(config, no_verify).await,
            });
        }

        info!(
            clusters = clusters.len(),
            default = %clusters.first().map(|c| c.host.as_str()).unwrap_or(""),
            "S3 clients initialized"
        );

        let clusters = Arc::new(clusters);
        *guard = Some(clusters.clone());
        Ok(clusters)
    }

    /// Resolve `bucket[@host]` to a bucket and its cluster client.
    ///
    /// Without suffix, the default cluster is selected.
    pub async fn resolve_bucket(&self, name: &str) -> Result<S3Target, StorageError> {
        let clusters = self.s3_clusters().await?;

        let (bucket, host) = match name.split_once('@') {
            Some((bucket, host)) => (bucket, Some(host)),
            None => (name, None),
        };

        let cluster = match host {
            Some(host) => clusters.iter().find(|c| c.host == host),
            None => clusters.first(),
        }
        .ok_or_else(|| {
            StorageError::backend(
                "S3",
                format!("Unknown S3 cluster, according to host '{}'", host.unwrap_or("")),
            )
        })?;

        Ok(S3Target {
            client: cluster.client.clone(),
            bucket: bucket.to_string(),
            host: cluster.host.clone(),
        })
    }

    // =========================================================================
    // CEPH
    // =========================================================================

    /// I/O context for `pool`, connecting to the cluster on first call.
    pub async fn ceph_pool(&self, pool: &str) -> Result<Arc<dyn CephPool>, StorageError> {
        let mut state = self.ceph.lock().await;

        if let Some(ctx) = state.pools.get(pool) {
            return Ok(ctx.clone());
        }

        let connector = match state.connector.as_ref() {
            Some(connector) => connector.clone(),
            None => {
                let connector = self.connect_ceph().await?;
                state.connector = Some(connector.clone());
                connector
            }
        };

        debug!(pool, "opening CEPH pool");
        let name = pool.to_string();
        let ctx = super::ceph::blocking(move || connector.open_pool(&name)).await?;
        state.pools.insert(pool.to_string(), ctx.clone());
        Ok(ctx)
    }

    async fn connect_ceph(&self) -> Result<Arc<dyn CephConnector>, StorageError> {
        if let Some(connector) = self.ceph_override.as_ref() {
            return Ok(connector.clone());
        }

        let config = self.config.ceph()?;

        #[cfg(feature = "ceph")]
        {
            let connector =
                super::ceph::blocking(move || super::ceph::RadosConnector::connect(&config))
                    .await?;
            info!("CEPH client initialized");
            Ok(Arc::new(connector))
        }

        #[cfg(not(feature = "ceph"))]
        {
            Err(StorageError::NotImplemented(format!(
                "CEPH storage (cluster {}) requires the `ceph` feature",
                config.cluster_name
            )))
        }
    }

    /// Drop every cached S3 client and CEPH context.
    pub async fn disconnect(&self) {
        *self.s3.write().await = None;
        let mut ceph = self.ceph.lock().await;
        ceph.pools.clear();
        ceph.connector = None;
        info!("storage clients disconnected");
    }
}

async fn build_s3_client(cluster: &S3ClusterConfig, no_verify: bool) -> Client {
    let credentials = Credentials::new(
        cluster.access_key.clone(),
        cluster.secret_key.clone(),
        None,
        None,
        "rok4-environment",
    );

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(S3_REGION))
        .endpoint_url(&cluster.endpoint_url)
        .credentials_provider(credentials);

    if no_verify {
        loader = loader.http_client(insecure_http_client());
    }

    let sdk_config = loader.load().await;

    // S3-compatible clusters are addressed path-style
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();

    Client::from_conf(s3_config)
}

fn insecure_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    let tls = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth();

    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(connector)
}

struct NoCertificateVerification;

impl rustls::client::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

// =============================================================================
// Tests
// =============================================================================
