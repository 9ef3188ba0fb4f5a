use std::path::PathBuf;

use aws_sdk_s3::{Client as S3Client, primitives::ByteStream};
use bytes::Bytes;

use crate::{
    config::{self, MediaConfig},
    error::{AppError, Result},
};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Where uploaded product images live: a local directory in development,
/// an S3 bucket in production.
#[derive(Clone)]
pub enum MediaStore {
    Local { root: PathBuf, base_url: String },
    S3 {
        client: S3Client,
        bucket: String,
        assets_url: String,
    },
}

impl MediaStore {
    pub async fn from_config(config: &MediaConfig) -> Result<Self> {
        match config {
            MediaConfig::Local { root, base_url } => {
                tracing::info!("Storing media on local disk at {}", root.display());
                Ok(MediaStore::Local {
                    root: root.clone(),
                    base_url: base_url.trim_end_matches('/').to_string(),
                })
            }
            MediaConfig::S3 { bucket, assets_url } => Ok(MediaStore::S3 {
                client: config::load_s3_client().await?,
                bucket: bucket.clone(),
                assets_url: assets_url.trim_end_matches('/').to_string(),
            }),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            MediaStore::Local { .. } => "local",
            MediaStore::S3 { .. } => "s3",
        }
    }

    fn base_url(&self) -> &str {
        match self {
            MediaStore::Local { base_url, .. } => base_url,
            MediaStore::S3 { assets_url, .. } => assets_url,
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url(), key)
    }

    /// Object key of a URL produced by this store, if it is one.
    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.base_url())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty() && !key.contains(".."))
    }

    pub async fn upload(&self, key: &str, content_type: &str, data: Bytes) -> Result<String> {
        match self {
            MediaStore::Local { root, .. } => {
                let path = root.join(key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::InternalError(format!("Failed to create media directory: {}", e))
                    })?;
                }
                tokio::fs::write(&path, &data).await.map_err(|e| {
                    AppError::InternalError(format!("Failed to write media file: {}", e))
                })?;
            }
            MediaStore::S3 { client, bucket, .. } => {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::InternalError(format!("Failed to upload image to S3: {}", e))
                    })?;
            }
        }

        Ok(self.public_url(key))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        match self {
            MediaStore::Local { root, .. } => match tokio::fs::remove_file(root.join(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AppError::InternalError(format!(
                    "Failed to delete media file: {}",
                    e
                ))),
            },
            MediaStore::S3 { client, bucket, .. } => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::InternalError(format!("Failed to delete image from S3: {}", e))
                    })?;
                Ok(())
            }
        }
    }
}

pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn product_image_key(product_id: i32, image_id: uuid::Uuid, extension: &str) -> String {
    format!("products/{}/{}.{}", product_id, image_id, extension)
}
