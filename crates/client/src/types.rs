use serde::{Deserialize, Deserializer, Serialize};

/// Backend-issued job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Error,
}

/// Musical metadata the backend extracts from the upload.
///
/// The backend sends a placeholder string instead of a number when analysis fails;
/// those come through as `None`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AudioInfo {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub tempo: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    pub status: JobState,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub audio_info: Option<AudioInfo>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tracks_available: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub model_loaded: Option<bool>,
}

/// A server-side render of the current mix.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedAudio {
    pub bytes: Vec<u8>,
    pub filename: String,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}
