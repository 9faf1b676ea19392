use anyhow::{bail, Context, Result};
use redevelop_contracts::requests::ReferenceImage;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use crate::truncate_text;

/// Temporary public host for the reference photo.
///
/// Returns the direct-download URL the generation backend can fetch.
pub trait ReferenceHost: Send + Sync {
    fn name(&self) -> &str;
    fn upload(&self, image: &ReferenceImage) -> Result<String>;
}

/// Anonymous multipart upload host (tmpfiles.org protocol).
pub struct TmpfilesHost {
    endpoint: String,
    host: String,
    http: HttpClient,
}

impl TmpfilesHost {
    pub fn new(endpoint: impl Into<String>, host: impl Into<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into(),
            host: host.into(),
            http,
        }
    }
}

impl ReferenceHost for TmpfilesHost {
    fn name(&self) -> &str {
        "tmpfiles"
    }

    fn upload(&self, image: &ReferenceImage) -> Result<String> {
        let mut part = MultipartPart::bytes(image.bytes.clone()).file_name(image.file_name.clone());
        if let Some(mime) = mime_for_file_name(&image.file_name) {
            part = part
                .mime_str(mime)
                .context("invalid reference image mime type")?;
        }
        let form = MultipartForm::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .with_context(|| format!("reference upload failed ({})", self.endpoint))?;
        let status = response.status();
        let body = response
            .text()
            .context("reference upload response body read failed")?;
        if !status.is_success() {
            bail!(
                "reference upload failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            );
        }
        let view_url = parse_upload_response(&body)?;
        Ok(derive_download_url(&view_url, &self.host))
    }
}

/// Extracts `data.url` from the upload host's JSON reply.
pub fn parse_upload_response(body: &str) -> Result<String> {
    let payload: Value =
        serde_json::from_str(body).context("reference upload returned invalid JSON payload")?;
    payload
        .get("data")
        .and_then(|data| data.get("url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("reference upload response missing data.url"))
}

/// Rewrites a view URL into its direct-download form by inserting `dl/`
/// after the first `host/` occurrence.
pub fn derive_download_url(view_url: &str, host: &str) -> String {
    let marker = format!("{host}/");
    view_url.replacen(&marker, &format!("{host}/dl/"), 1)
}

fn mime_for_file_name(file_name: &str) -> Option<&'static str> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())?;
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" | "heif" => Some("image/heic"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
