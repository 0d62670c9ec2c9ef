//! Image (Glance v2) calls.

use camino::Utf8Path;
use reqwest::{Body, Method};
use serde::{Deserialize, Serialize};

use crate::backend::{Image, ImageSpec};

use super::http::{authed, flexible_id, join, send, send_json, unbounded};
use super::{OpenStackBackend, OpenStackError};

#[derive(Serialize)]
pub(super) struct NewImage<'a> {
    name: &'a str,
    disk_format: &'a str,
    container_format: &'a str,
}

impl<'a> NewImage<'a> {
    pub(super) fn new(spec: &'a ImageSpec) -> Self {
        Self {
            name: &spec.name,
            disk_format: &spec.disk_format,
            container_format: &spec.container_format,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct ImageRecord {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
}

impl ImageRecord {
    pub(super) fn into_image(self, fallback_name: &str) -> Image {
        Image {
            id: self.id,
            name: self.name.unwrap_or_else(|| fallback_name.to_owned()),
        }
    }
}

impl OpenStackBackend {
    async fn image_url(&self, path: &str) -> Result<(String, String), OpenStackError> {
        let identity = self.session().await?;
        Ok((
            join(&identity.endpoints.image, path),
            identity.token.clone(),
        ))
    }

    pub(super) async fn glance_create_image(
        &self,
        spec: &ImageSpec,
    ) -> Result<Image, OpenStackError> {
        let (url, token) = self.image_url("images").await?;
        let record: ImageRecord = send_json(
            "create_image",
            authed(Method::POST, &url, &token).json(&NewImage::new(spec)),
        )
        .await?;
        Ok(record.into_image(&spec.name))
    }

    /// Streams the file body; no checksum is computed or verified.
    pub(super) async fn glance_upload_image(
        &self,
        id: &str,
        source: &Utf8Path,
    ) -> Result<(), OpenStackError> {
        let file_error = |err: std::io::Error| OpenStackError::ImageFile {
            path: source.to_path_buf(),
            message: err.to_string(),
        };
        let file = tokio::fs::File::open(source).await.map_err(file_error)?;
        let length = file.metadata().await.map_err(file_error)?.len();

        let (url, token) = self.image_url(&format!("images/{id}/file")).await?;
        let request = unbounded(Method::PUT, &url, &token)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Length", length)
            .body(Body::from(file));
        send("upload_image", request).await?;
        Ok(())
    }

    pub(super) async fn glance_delete_image(&self, id: &str) -> Result<(), OpenStackError> {
        let (url, token) = self.image_url(&format!("images/{id}")).await?;
        send("delete_image", authed(Method::DELETE, &url, &token)).await?;
        Ok(())
    }
}
