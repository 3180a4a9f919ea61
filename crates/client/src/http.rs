use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use stem_transport::StemId;

use crate::content_disposition;
use crate::error::{ApiError, Result};
use crate::types::{Health, JobId, MixedAudio, StatusResponse, UploadResponse};
use crate::SeparationApi;

const FALLBACK_MIX_NAME: &str = "mix.wav";

/// [`SeparationApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MixBody<'a> {
    volumes: BTreeMap<&'a str, f32>,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            code: status.as_u16(),
            body,
        })
    }
}

impl SeparationApi for HttpApi {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse> {
        log::debug!("uploading {filename} ({} bytes)", bytes.len());
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .send(self.client.post(self.url("upload")).multipart(form))
            .await?;
        Ok(response.json().await?)
    }

    async fn status(&self, job_id: &JobId) -> Result<StatusResponse> {
        let url = self.url(&format!("status/{}", urlencoding::encode(job_id.as_str())));
        let response = self.send(self.client.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn download(&self, job_id: &JobId, stem: StemId) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "download/{}/{}",
            urlencoding::encode(job_id.as_str()),
            stem.as_str()
        ));
        let response = self.send(self.client.get(url)).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::InvalidResponse(format!("empty {stem} stem")));
        }
        Ok(bytes.to_vec())
    }

    async fn mix(&self, job_id: &JobId, volumes: &BTreeMap<StemId, f32>) -> Result<MixedAudio> {
        let url = self.url(&format!("mix/{}", urlencoding::encode(job_id.as_str())));
        let body = MixBody {
            volumes: volumes
                .iter()
                .map(|(stem, volume)| (stem.as_str(), volume.clamp(0.0, 1.0)))
                .collect(),
        };

        let response = self.send(self.client.post(url).json(&body)).await?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(content_disposition::filename)
            .unwrap_or_else(|| FALLBACK_MIX_NAME.to_string());
        let bytes = response.bytes().await?.to_vec();

        Ok(MixedAudio { bytes, filename })
    }

    async fn health(&self) -> Result<Health> {
        let response = self.send(self.client.get(self.url("health"))).await?;
        Ok(response.json().await?)
    }

    async fn clear(&self, job_id: &JobId) -> Result<()> {
        let url = self.url(&format!("clear/{}", urlencoding::encode(job_id.as_str())));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
