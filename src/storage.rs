use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

use crate::config::S3Config;
use crate::error::AppError;

// ============================================================================
// Object Storage Adapter - element images in MinIO
// ============================================================================
//
// Images are keyed by element id ("{id}.png" in the configured bucket), so
// re-uploading replaces the object in place. Failures surface as
// DEPENDENCY_FAILURE; catalog deletion refuses to proceed past a failed
// image removal.
//
// ============================================================================

#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl ObjectStorage {
    pub async fn connect(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "formulab-static",
        );
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&base)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_base: config.public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn object_key(element_id: Uuid) -> String {
        format!("{element_id}.png")
    }

    /// Store (or replace) the image for an element and return its public URL.
    pub async fn upload_element_image(
        &self,
        element_id: Uuid,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let key = Self::object_key(element_id);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| AppError::Dependency(format!("image upload failed: {err}")))?;

        tracing::info!(element_id = %element_id, key = %key, "element image stored");
        Ok(format!("{}/{}/{}", self.public_base, self.bucket, key))
    }

    /// Remove the stored image behind an img_path URL. The object key is the
    /// URL's last path segment.
    pub async fn delete_element_image(&self, img_path: &str) -> Result<(), AppError> {
        let key = img_path.rsplit('/').next().unwrap_or(img_path);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| AppError::Dependency(format!("image deletion failed: {err}")))?;

        tracing::info!(key = %key, "element image deleted");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
