//! In-memory backend and fixtures shared by the crate's tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;

use stem_client::{
    ApiError, AudioInfo, Health, JobId, JobState, MixedAudio, Result, SeparationApi,
    StatusResponse, UploadResponse,
};
use stem_transport::StemId;

pub const JOB: &str = "job-1";

pub fn wav_bytes(seconds: f32, sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (seconds * sample_rate as f32) as usize;
        for i in 0..frames * channels as usize {
            let value = if i % 2 == 0 { 8000 } else { -8000 };
            writer.write_sample(value as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn processing(progress: i64) -> StatusResponse {
    StatusResponse {
        status: JobState::Processing,
        progress,
        audio_info: None,
        error: None,
        tracks_available: None,
    }
}

pub fn completed() -> StatusResponse {
    StatusResponse {
        status: JobState::Completed,
        progress: 100,
        audio_info: Some(AudioInfo {
            key: Some("A minor".to_string()),
            tempo: Some(128.0),
            duration: Some(1.0),
        }),
        error: None,
        tracks_available: None,
    }
}

pub fn failed(message: &str) -> StatusResponse {
    StatusResponse {
        status: JobState::Error,
        progress: 0,
        audio_info: None,
        error: Some(message.to_string()),
        tracks_available: None,
    }
}

/// Scripted [`SeparationApi`]: status calls walk through `statuses` and then repeat
/// the last one, downloads serve whatever was registered per stem.
pub struct MockApi {
    statuses: Mutex<VecDeque<StatusResponse>>,
    stems: HashMap<StemId, Vec<u8>>,
    calls: Mutex<Vec<String>>,
    reject_upload: bool,
}

impl MockApi {
    pub fn new(statuses: impl IntoIterator<Item = StatusResponse>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            stems: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            reject_upload: false,
        }
    }

    /// A backend with no job scripted.
    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_stem(mut self, stem: StemId, bytes: Vec<u8>) -> Self {
        self.stems.insert(stem, bytes);
        self
    }

    pub fn rejecting_upload(mut self) -> Self {
        self.reject_upload = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SeparationApi for MockApi {
    async fn upload(&self, filename: &str, _bytes: Vec<u8>) -> Result<UploadResponse> {
        self.record(format!("upload {filename}"));
        if self.reject_upload {
            return Err(ApiError::Status {
                code: 400,
                body: "File type not allowed".to_string(),
            });
        }
        Ok(UploadResponse {
            job_id: JobId(JOB.to_string()),
            filename: filename.to_string(),
            status: "uploaded".to_string(),
        })
    }

    async fn status(&self, job_id: &JobId) -> Result<StatusResponse> {
        self.record(format!("status {job_id}"));
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        status.ok_or_else(|| ApiError::InvalidResponse("no status scripted".to_string()))
    }

    async fn download(&self, job_id: &JobId, stem: StemId) -> Result<Vec<u8>> {
        self.record(format!("download {job_id} {stem}"));
        self.stems.get(&stem).cloned().ok_or(ApiError::Status {
            code: 404,
            body: "Track not found".to_string(),
        })
    }

    async fn mix(&self, job_id: &JobId, volumes: &BTreeMap<StemId, f32>) -> Result<MixedAudio> {
        let rendered: Vec<String> = volumes.iter().map(|(id, v)| format!("{id}={v}")).collect();
        self.record(format!("mix {job_id} {}", rendered.join(",")));
        Ok(MixedAudio {
            bytes: vec![1, 2, 3],
            filename: "song_mix.wav".to_string(),
        })
    }

    async fn health(&self) -> Result<Health> {
        self.record("health".to_string());
        Ok(Health {
            status: "healthy".to_string(),
            device: Some("cpu".to_string()),
            model_loaded: Some(true),
        })
    }

    async fn clear(&self, job_id: &JobId) -> Result<()> {
        self.record(format!("clear {job_id}"));
        Ok(())
    }
}
