//! HTTP(S) read-only adapter.

use bytes::Bytes;
use reqwest::{Response, StatusCode};
use tracing::debug;

use super::path::StorageLocation;
use crate::error::StorageError;

async fn get(client: &reqwest::Client, location: &StorageLocation) -> Result<Response, StorageError> {
    let url = location.uri();
    debug!(url = %url, "HTTP get");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| StorageError::backend(location.kind, e))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(url));
    }

    response
        .error_for_status()
        .map_err(|e| StorageError::backend(location.kind, e))
}

/// Full body of a resource.
pub(crate) async fn read(
    client: &reqwest::Client,
    location: &StorageLocation,
) -> Result<Bytes, StorageError> {
    get(client, location)
        .await?
        .bytes()
        .await
        .map_err(|e| StorageError::backend(location.kind, e))
}

/// Response whose body is consumed chunk by chunk.
pub(crate) async fn stream(
    client: &reqwest::Client,
    location: &StorageLocation,
) -> Result<Response, StorageError> {
    get(client, location).await
}

/// Size announced by the `Content-Length` header.
pub(crate) async fn size(
    client: &reqwest::Client,
    location: &StorageLocation,
) -> Result<u64, StorageError> {
    get(client, location)
        .await?
        .content_length()
        .ok_or_else(|| {
            StorageError::backend(
                location.kind,
                format!("No content length for {}", location.uri()),
            )
        })
}

/// A resource exists when it answers 200.
pub(crate) async fn exists(
    client: &reqwest::Client,
    location: &StorageLocation,
) -> Result<bool, StorageError> {
    let response = client
        .get(location.uri())
        .send()
        .await
        .map_err(|e| StorageError::backend(location.kind, e))?;

    Ok(response.status() == StatusCode::OK)
}
