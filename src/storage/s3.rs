//! S3 object storage adapter.

use std::path::Path;

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

use super::clients::S3Target;
use super::file;
use crate::error::StorageError;

/// Map an SDK error, keeping "not found" distinguishable.
fn map_error<E>(uri: &str, e: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code_is_not_found = e
        .as_service_error()
        .map(|se| matches!(se.code(), Some("NoSuchKey") | Some("NotFound")))
        .unwrap_or(false);

    // HEAD responses carry no error body, only the status
    let status_is_404 = e
        .raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false);

    if code_is_not_found || status_is_404 {
        return StorageError::NotFound(uri.to_string());
    }

    StorageError::backend("S3", format!("{}: {}", uri, detail_of(&e)))
}

fn detail_of<E: std::error::Error>(e: &E) -> String {
    let mut detail = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

fn uri(target: &S3Target, key: &str) -> String {
    format!("s3://{}/{}", target.bucket, key)
}

/// Read a whole object, or `(offset, length)` of it.
pub(crate) async fn read(
    target: &S3Target,
    key: &str,
    range: Option<(u64, u64)>,
) -> Result<Bytes, StorageError> {
    debug!(bucket = %target.bucket, key, ?range, "S3 get");

    let mut request = target.client.get_object().bucket(&target.bucket).key(key);

    if let Some((offset, len)) = range {
        if len == 0 {
            return Ok(Bytes::new());
        }
        // inclusive on both ends
        request = request.range(format!("bytes={}-{}", offset, offset + len - 1));
    }

    let resp = request
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))?;

    let data = resp
        .body
        .collect()
        .await
        .map_err(|e| StorageError::backend("S3", e))?
        .into_bytes();

    Ok(data)
}

/// Open an object as a byte stream.
pub(crate) async fn stream(target: &S3Target, key: &str) -> Result<ByteStream, StorageError> {
    debug!(bucket = %target.bucket, key, "S3 get stream");

    let resp = target
        .client
        .get_object()
        .bucket(&target.bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))?;

    Ok(resp.body)
}

pub(crate) async fn write(target: &S3Target, key: &str, data: Bytes) -> Result<(), StorageError> {
    debug!(bucket = %target.bucket, key, len = data.len(), "S3 put");

    target
        .client
        .put_object()
        .bucket(&target.bucket)
        .key(key)
        .body(ByteStream::from(data))
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))?;

    Ok(())
}

/// Upload a local file.
pub(crate) async fn upload_file(
    target: &S3Target,
    key: &str,
    path: &str,
) -> Result<(), StorageError> {
    debug!(bucket = %target.bucket, key, path, "S3 upload");

    file::size(path).await?;
    let body = ByteStream::from_path(Path::new(path))
        .await
        .map_err(|e| StorageError::backend("FILE", e))?;

    target
        .client
        .put_object()
        .bucket(&target.bucket)
        .key(key)
        .body(body)
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))?;

    Ok(())
}

/// Server-side copy inside one cluster.
pub(crate) async fn copy_object(
    from: &S3Target,
    from_key: &str,
    to: &S3Target,
    to_key: &str,
) -> Result<(), StorageError> {
    debug!(
        from = %uri(from, from_key),
        to = %uri(to, to_key),
        "S3 server-side copy"
    );

    to.client
        .copy_object()
        .copy_source(format!("{}/{}", from.bucket, from_key))
        .bucket(&to.bucket)
        .key(to_key)
        .send()
        .await
        .map_err(|e| map_error(&uri(from, from_key), e))?;

    Ok(())
}

pub(crate) async fn size(target: &S3Target, key: &str) -> Result<u64, StorageError> {
    let head = target
        .client
        .head_object()
        .bucket(&target.bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))?;

    Ok(head.content_length().unwrap_or(0).max(0) as u64)
}

/// Entity tag of an object, without quotes.
pub(crate) async fn etag(target: &S3Target, key: &str) -> Result<String, StorageError> {
    let head = target
        .client
        .head_object()
        .bucket(&target.bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))?;

    Ok(head.e_tag().unwrap_or_default().trim_matches('"').to_string())
}

pub(crate) async fn exists(target: &S3Target, key: &str) -> Result<bool, StorageError> {
    match size(target, key).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete an object. S3 treats absent keys as success.
pub(crate) async fn remove(target: &S3Target, key: &str) -> Result<(), StorageError> {
    debug!(bucket = %target.bucket, key, "S3 delete");

    match target
        .client
        .delete_object()
        .bucket(&target.bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| map_error(&uri(target, key), e))
    {
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
        Ok(_) => Ok(()),
    }
}

/// Total size of the objects under `prefix/`.
pub(crate) async fn size_prefix(target: &S3Target, prefix: &str) -> Result<u64, StorageError> {
    let prefix = format!("{}/", prefix.trim_end_matches('/'));
    debug!(bucket = %target.bucket, prefix = %prefix, "S3 list for size");

    let mut total = 0u64;
    let mut pages = target
        .client
        .list_objects_v2()
        .bucket(&target.bucket)
        .prefix(&prefix)
        .into_paginator()
        .send();

    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| map_error(&uri(target, &prefix), e))?;
        total += page
            .contents()
            .iter()
            .map(|object| object.size().unwrap_or(0).max(0) as u64)
            .sum::<u64>();
    }

    Ok(total)
}
