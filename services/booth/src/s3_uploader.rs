use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, error, info, instrument, warn};

/// Blob storage for captured images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning its public URL
    async fn put_image(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String>;

    async fn delete_image(&self, key: &str) -> Result<()>;
}

/// S3 uploader for photo storage
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3Uploader {
    /// Create a new S3 uploader
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 uploader initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Simple single-part upload for small files
    async fn simple_upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload image to S3")?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?;

        let result = match self.upload_parts(key, upload_id, data).await {
            Ok(completed_parts) => self.complete_upload(key, upload_id, completed_parts).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.abort_upload(key, upload_id).await;
            return Err(e);
        }

        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        data: &[u8],
    ) -> Result<Vec<CompletedPart>> {
        let mut completed_parts = Vec::new();

        for (index, chunk) in data.chunks(self.config.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .with_context(|| format!("Failed to upload part {}", part_number))?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        Ok(completed_parts)
    }

    async fn complete_upload(
        &self,
        key: &str,
        upload_id: &str,
        completed_parts: Vec<CompletedPart>,
    ) -> Result<()> {
        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .context("Failed to complete multipart upload")?;

        Ok(())
    }

    /// Best effort; a failed abort leaves the parts for the bucket lifecycle rule
    async fn abort_upload(&self, key: &str, upload_id: &str) {
        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            Ok(_) => warn!(s3_key = %key, upload_id, "Multipart upload aborted"),
            Err(e) => error!(
                s3_key = %key,
                upload_id,
                error = %DisplayErrorContext(&e),
                "Failed to abort multipart upload"
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Uploader {
    #[instrument(skip(self, data), fields(s3_key = %key, size_bytes = data.len()))]
    async fn put_image(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        let size_bytes = data.len();
        debug!("Uploading image to S3");

        if size_bytes > self.config.multipart_threshold_bytes {
            self.multipart_upload(key, &data, content_type).await?;
        } else {
            self.simple_upload(key, data, content_type).await?;
        }

        info!(s3_key = %key, size_bytes, "Image uploaded successfully");

        Ok(public_object_url(&self.config, key))
    }

    #[instrument(skip(self), fields(s3_key = %key))]
    async fn delete_image(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete image from S3")?;

        debug!(s3_key = %key, "Image deleted from S3");
        Ok(())
    }
}

/// Public URL an uploaded object is reachable under
pub fn public_object_url(config: &S3Config, key: &str) -> String {
    if let Some(ref base) = config.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }

    match config.endpoint_url {
        Some(ref endpoint) if config.force_path_style => {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), config.bucket, key)
        }
        Some(ref endpoint) => {
            let (scheme, host) = endpoint
                .split_once("://")
                .unwrap_or(("https", endpoint.as_str()));
            format!("{}://{}.{}/{}", scheme, config.bucket, host.trim_end_matches('/'), key)
        }
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

/// Content type for an uploaded image, falling back to JPEG
pub fn image_content_type(declared: Option<&str>) -> String {
    match declared.map(|c| c.trim().to_lowercase()) {
        Some(ct) if ct.starts_with("image/") => ct,
        _ => "image/jpeg".to_string(),
    }
}
