use serde::Deserialize;

use crate::store::ProcessingStatus;

/// A progress range and the message shown while the job is inside it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressBand {
    pub low: u8,
    pub high: u8,
    pub message: String,
}

impl ProgressBand {
    fn new(low: u8, high: u8, message: &str) -> Self {
        Self {
            low,
            high,
            message: message.to_string(),
        }
    }

    fn contains(&self, progress: u8) -> bool {
        (self.low..=self.high).contains(&progress)
    }
}

/// Maps backend job progress onto what the player shows.
///
/// The backend's own percentage is capped while it processes; the remainder of the bar
/// belongs to fetching and decoding stems locally, so 100 only ever means "ready to play".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressPolicy {
    pub processing_cap: u8,
    pub loading_start: u8,
    pub loading_end: u8,
    pub uploading_message: String,
    pub loading_message: String,
    pub completed_message: String,
    pub bands: Vec<ProgressBand>,
}

impl Default for ProgressPolicy {
    fn default() -> Self {
        Self {
            processing_cap: 90,
            loading_start: 90,
            loading_end: 99,
            uploading_message: "Uploading…".to_string(),
            loading_message: "Loading stems…".to_string(),
            completed_message: "Ready".to_string(),
            bands: vec![
                ProgressBand::new(0, 9, "Preparing audio…"),
                ProgressBand::new(10, 34, "Analyzing key and tempo…"),
                ProgressBand::new(35, 69, "Separating instruments…"),
                ProgressBand::new(70, 100, "Rendering stems…"),
            ],
        }
    }
}

impl ProgressPolicy {
    /// Displayed progress for a `processing` report. Out-of-range reports are clamped.
    pub fn processing(&self, reported: i64) -> u8 {
        reported.clamp(0, self.processing_cap.min(100) as i64) as u8
    }

    /// Message for a displayed processing value.
    pub fn message_for(&self, progress: u8) -> &str {
        self.bands
            .iter()
            .find(|band| band.contains(progress))
            .or(self.bands.last())
            .map(|band| band.message.as_str())
            .unwrap_or(&self.loading_message)
    }

    /// Line shown next to the status readout. Errors carry their own message.
    pub fn status_message<'a>(&'a self, status: &'a ProcessingStatus) -> Option<&'a str> {
        match status {
            ProcessingStatus::Idle => None,
            ProcessingStatus::Uploading => Some(self.uploading_message.as_str()),
            ProcessingStatus::Processing { message, .. } => Some(message.as_str()),
            ProcessingStatus::Completed { .. } => Some(self.completed_message.as_str()),
            ProcessingStatus::Error { message } => Some(message.as_str()),
        }
    }

    /// Displayed progress once `loaded` of `total` stems are in.
    pub fn loading(&self, loaded: usize, total: usize) -> u8 {
        let start = self.loading_start.min(100) as f64;
        let end = (self.loading_end.min(100) as f64).max(start);
        if total == 0 {
            return end as u8;
        }
        let fraction = loaded.min(total) as f64 / total as f64;
        (start + (end - start) * fraction).floor() as u8
    }
}
