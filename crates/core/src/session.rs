use std::path::PathBuf;
use std::sync::Arc;

use stem_client::{JobId, SeparationApi};
use stem_engine::{TransportEngine, VoiceSpec, volume_to_gain};
use stem_transport::StemId;
use tokio::sync::mpsc::unbounded_channel;

use crate::config::Config;
use crate::error::ExportError;
use crate::export::MixRequest;
use crate::loader::{self, LoadOptions, LoadTask};
use crate::store::{Action, PlaybackState, ProcessingStatus, SourceFile, Store, TrackUpdate};

/// Everything the player UI talks to: the state store, the transport and the running job.
///
/// All methods are meant to be called from the UI thread. Background work only reaches
/// the store through [`Session::pump`].
pub struct Session {
    store: Store,
    engine: TransportEngine,
    load: Option<LoadTask>,
    options: LoadOptions,
}

impl Session {
    pub fn new(engine: TransportEngine, config: &Config) -> Self {
        let options = LoadOptions {
            stems: config.player.stems.clone(),
            poll_interval: config.server.poll_interval(),
            envelope_len: config.player.waveform_buckets,
            sample_rate: None,
            progress: config.progress.clone(),
        };

        Self {
            store: Store::new(&config.player.stems),
            engine,
            load: None,
            options,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        self.store.state()
    }

    pub fn engine(&self) -> &TransportEngine {
        &self.engine
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing
    }

    pub fn can_export(&self) -> bool {
        self.state().can_export()
    }

    /// What the status readout should say for the current job state.
    pub fn status_message(&self) -> Option<&str> {
        self.options.progress.status_message(&self.store.state().status)
    }

    pub fn mix_request(&self) -> Result<MixRequest, ExportError> {
        MixRequest::from_state(self.state())
    }

    /// Start every loaded stem at the current time.
    ///
    /// Returns false, and leaves the state alone, when no stem has audio yet.
    pub fn play(&mut self) -> bool {
        if self.is_playing() {
            return true;
        }
        if !self.state().has_loaded_audio() {
            log::warn!("play requested before any stem was loaded");
            return false;
        }

        self.start_voices(self.state().current_time);
        self.dispatch(Action::SetPlaying(true));
        true
    }

    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        let position = self.engine.stop().unwrap_or(self.state().current_time);
        self.dispatch(Action::SetCurrentTime(position));
        self.dispatch(Action::SetPlaying(false));
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Move to `time`, clamped to the loaded duration. Running stems restart there together.
    pub fn seek(&mut self, time: f64) {
        if !time.is_finite() {
            log::debug!("ignoring seek to {time}");
            return;
        }
        let time = time.clamp(0.0, self.state().duration);
        self.dispatch(Action::SetCurrentTime(time));

        if self.is_playing() {
            self.start_voices(time);
        }
    }

    /// Live volume edit. Values outside 0-100 are refused.
    pub fn set_volume(&mut self, id: StemId, volume: i64) -> bool {
        let Ok(volume) = u8::try_from(volume) else {
            return false;
        };
        let update = Action::UpdateTrack {
            id,
            update: TrackUpdate::volume(volume),
        };
        if self.store.dispatch(update).is_err() {
            return false;
        }
        self.engine.set_gain(id, volume_to_gain(volume));
        true
    }

    /// Committed volume edit: out-of-range values snap to the nearest bound.
    pub fn commit_volume(&mut self, id: StemId, volume: i64) -> bool {
        self.set_volume(id, volume.clamp(0, 100))
    }

    pub fn begin_drag(&mut self, time: f64) {
        self.dispatch(Action::SetDragging(true));
        self.dispatch(Action::SetDragPosition(Some(time)));
    }

    pub fn drag_to(&mut self, time: f64) {
        if self.state().is_dragging {
            self.dispatch(Action::SetDragPosition(Some(time)));
        }
    }

    /// Release the scrub: seek to where the pointer was let go.
    pub fn end_drag(&mut self) {
        if !self.state().is_dragging {
            return;
        }
        let target = self.state().drag_position;
        self.cancel_drag();
        if let Some(target) = target {
            self.seek(target);
        }
    }

    pub fn cancel_drag(&mut self) {
        self.dispatch(Action::SetDragging(false));
        self.dispatch(Action::SetDragPosition(None));
    }

    /// Per-frame update while playing: report the shared position and catch the end
    /// of playback. Returns whether another frame is wanted.
    pub fn on_frame(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }

        if self.engine.all_finished() {
            log::debug!("playback finished");
            self.engine.stop();
            self.dispatch(Action::SetPlaying(false));
            self.dispatch(Action::SetCurrentTime(0.0));
            return false;
        }

        if self.state().is_dragging {
            return true;
        }
        if let Some(elapsed) = self.engine.elapsed() {
            self.dispatch(Action::SetCurrentTime(elapsed.min(self.state().duration)));
        }
        true
    }

    /// Drop the current song and submit `path` as a new job on `runtime`.
    pub fn start_job<A>(
        &mut self,
        runtime: &tokio::runtime::Handle,
        api: Arc<A>,
        path: impl Into<PathBuf>,
    ) where
        A: SeparationApi + 'static,
    {
        self.reset();

        let file = SourceFile::from_path(path);
        self.dispatch(Action::SetFile(file.clone()));
        self.dispatch(Action::SetProcessingStatus(ProcessingStatus::Uploading));

        let mut options = self.options.clone();
        options.sample_rate = self.engine.output_sample_rate();

        let (tx, actions) = unbounded_channel();
        let join = runtime.spawn(async move {
            loader::run_job(api.as_ref(), &file, &options, &tx).await;
        });
        self.load = Some(LoadTask { actions, join });
    }

    /// Apply whatever the running job has reported since the last call.
    pub fn pump(&mut self) -> usize {
        let Some(task) = self.load.as_mut() else {
            return 0;
        };
        let finished = task.is_finished();

        let mut actions = Vec::new();
        while let Ok(action) = task.actions.try_recv() {
            actions.push(action);
        }
        if finished {
            self.load = None;
        }

        let applied = actions.len();
        for action in actions {
            self.dispatch(action);
        }
        applied
    }

    pub fn is_loading(&self) -> bool {
        self.load.is_some()
    }

    /// Stop playback, abandon the running job and return to the initial state.
    ///
    /// Returns the job that was active so its server-side files can be cleared.
    pub fn reset(&mut self) -> Option<JobId> {
        self.engine.stop();
        self.load = None;

        let job_id = self.state().job_id().cloned();
        self.dispatch(Action::Reset);
        job_id
    }

    fn start_voices(&mut self, offset: f64) -> usize {
        let voices = self.store.state().tracks.iter().filter_map(|track| {
            track.audio.as_ref().map(|audio| VoiceSpec {
                id: track.id,
                audio,
                gain: volume_to_gain(track.volume),
            })
        });
        self.engine.start(voices, offset)
    }

    fn dispatch(&mut self, action: Action) {
        if let Err(e) = self.store.dispatch(action) {
            log::warn!("rejected action: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, completed, processing, wav_bytes};
    use std::time::Duration;
    use stem_engine::{VirtualOutput, VoiceLog};
    use stem_transport::{AudioArc, Clock, ManualClock};

    fn session(clock: &Arc<ManualClock>) -> (Session, VoiceLog) {
        let output = VirtualOutput::new(clock.clone());
        let log = output.log();
        let engine = TransportEngine::new(Box::new(output), clock.clone());
        let mut config = Config::default();
        config.server.poll_interval_ms = 1;
        config.player.waveform_buckets = 50;
        (Session::new(engine, &config), log)
    }

    fn load(session: &mut Session, stems: &[(StemId, f64)]) {
        let mut duration: f64 = 0.0;
        for &(id, seconds) in stems {
            let audio = AudioArc::silence(seconds, 100, 2);
            session.dispatch(Action::UpdateTrack {
                id,
                update: TrackUpdate::loaded(audio, vec![0.0; 10]),
            });
            duration = duration.max(seconds);
        }
        session.dispatch(Action::SetDuration(duration));
    }

    #[test]
    fn test_status_message_follows_configured_policy() {
        let clock = Arc::new(ManualClock::new(0.0));
        let engine = TransportEngine::new(Box::new(VirtualOutput::new(clock.clone())), clock);
        let mut config = Config::default();
        config.progress.uploading_message = "Sending to server".to_string();
        config.progress.completed_message = "Mixer ready".to_string();
        let mut session = Session::new(engine, &config);

        assert_eq!(session.status_message(), None);
        session.dispatch(Action::SetProcessingStatus(ProcessingStatus::Uploading));
        assert_eq!(session.status_message(), Some("Sending to server"));
        session.dispatch(Action::SetProcessingStatus(ProcessingStatus::Completed {
            job_id: JobId("job-1".to_string()),
        }));
        assert_eq!(session.status_message(), Some("Mixer ready"));
    }

    #[test]
    fn test_seek_clamps_in_every_state() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0)]);

        for playing in [false, true] {
            if playing {
                session.play();
            }
            for (target, expected) in [(-4.0, 0.0), (3.5, 3.5), (10.0, 10.0), (42.0, 10.0)] {
                session.seek(target);
                assert_eq!(session.state().current_time, expected);
                assert_eq!(session.is_playing(), playing);
            }
        }
    }

    #[test]
    fn test_seek_while_paused_does_not_start_playback() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Bass, 5.0)]);

        session.seek(2.0);

        assert!(!session.is_playing());
        assert!(log.is_empty());
    }

    #[test]
    fn test_seek_while_playing_restarts_every_stem() {
        let clock = Arc::new(ManualClock::new(100.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0), (StemId::Drums, 10.0)]);

        session.play();
        clock.advance(1.0);
        session.seek(6.0);

        let live = log.live();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|voice| voice.offset == 6.0));
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_play_without_audio_is_a_no_op() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);

        assert!(!session.play());
        assert!(!session.is_playing());
        assert!(log.is_empty());
        assert!(!session.on_frame());
    }

    #[test]
    fn test_pause_captures_position_and_is_idempotent() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Piano, 10.0)]);

        session.seek(1.0);
        session.play();
        clock.advance(2.5);
        session.pause();

        assert!(!session.is_playing());
        assert_eq!(session.state().current_time, 3.5);
        assert!(log.live().is_empty());

        clock.advance(4.0);
        session.pause();
        assert!(!session.is_playing());
        assert_eq!(session.state().current_time, 3.5);
    }

    #[test]
    fn test_toggle() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        load(&mut session, &[(StemId::Other, 10.0)]);

        session.toggle();
        assert!(session.is_playing());
        clock.advance(1.0);
        session.toggle();
        assert!(!session.is_playing());
        assert_eq!(session.state().current_time, 1.0);
    }

    #[test]
    fn test_unloaded_stems_are_skipped() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Guitar, 4.0)]);

        assert!(session.play());
        assert_eq!(session.engine().voice_count(), 1);
        assert_eq!(log.live().len(), 1);
    }

    #[test]
    fn test_volume_edits_touch_one_track() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0), (StemId::Bass, 10.0)]);
        session.play();

        assert!(session.set_volume(StemId::Bass, 30));

        let volumes: Vec<(StemId, u8)> =
            session.state().tracks.iter().map(|t| (t.id, t.volume)).collect();
        for (id, volume) in volumes {
            assert_eq!(volume, if id == StemId::Bass { 30 } else { 100 });
        }
        assert_eq!(session.engine().gain(StemId::Bass), Some(0.3));
        // live gain change, no restart
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_out_of_range_volume_is_rejected_live_and_clamped_on_commit() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        session.set_volume(StemId::Drums, 40);

        assert!(!session.set_volume(StemId::Drums, 101));
        assert!(!session.set_volume(StemId::Drums, -1));
        assert_eq!(session.state().track(StemId::Drums).unwrap().volume, 40);

        assert!(session.commit_volume(StemId::Drums, 250));
        assert_eq!(session.state().track(StemId::Drums).unwrap().volume, 100);
        assert!(session.commit_volume(StemId::Drums, -20));
        assert_eq!(session.state().track(StemId::Drums).unwrap().volume, 0);
    }

    #[test]
    fn test_all_stems_report_one_position() {
        let clock = Arc::new(ManualClock::new(7.0));
        let (mut session, log) = session(&clock);
        load(
            &mut session,
            &[(StemId::Vocals, 10.0), (StemId::Guitar, 10.0), (StemId::Drums, 9.0)],
        );

        session.seek(2.0);
        session.play();

        for _ in 0..5 {
            clock.advance(0.37);
            assert!(session.on_frame());
            let now = clock.now();
            let position = session.state().current_time;
            for voice in log.live() {
                assert!((voice.position(now) - position).abs() < 1e-9);
            }
        }
        assert!((session.state().current_time - 3.85).abs() < 1e-9);
    }

    #[test]
    fn test_playback_ends_with_longest_stem() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        load(&mut session, &[(StemId::Bass, 8.0), (StemId::Drums, 10.0)]);
        assert_eq!(session.state().duration, 10.0);

        session.seek(9.0);
        session.play();

        assert_eq!(session.engine().is_finished(StemId::Bass), Some(true));
        assert_eq!(session.engine().is_finished(StemId::Drums), Some(false));
        clock.advance(0.5);
        assert!(session.on_frame());
        assert!(session.is_playing());
        assert_eq!(session.state().current_time, 9.5);

        clock.advance(0.5);
        assert!(!session.on_frame());
        assert!(!session.is_playing());
        assert_eq!(session.state().current_time, 0.0);
        assert_eq!(session.engine().voice_count(), 0);
    }

    #[test]
    fn test_drag_commits_only_on_release() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0)]);
        session.seek(1.0);
        session.play();

        session.begin_drag(4.0);
        assert!(session.state().is_dragging);
        session.drag_to(6.0);
        session.drag_to(12.0);
        clock.advance(0.5);
        assert!(session.on_frame());

        assert_eq!(session.state().drag_position, Some(10.0));
        assert_eq!(session.state().current_time, 1.0);
        assert_eq!(session.state().playhead_fraction(), 1.0);
        assert_eq!(log.len(), 1);

        session.drag_to(7.0);
        session.end_drag();

        assert!(!session.state().is_dragging);
        assert_eq!(session.state().drag_position, None);
        assert_eq!(session.state().current_time, 7.0);
        assert!(session.is_playing());
        assert_eq!(log.live()[0].offset, 7.0);
    }

    #[test]
    fn test_cancelled_drag_keeps_position() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0)]);
        session.seek(2.0);

        session.begin_drag(8.0);
        session.cancel_drag();
        session.end_drag();

        assert_eq!(session.state().current_time, 2.0);
        assert!(!session.state().is_dragging);
    }

    #[test]
    fn test_drag_to_without_begin_is_ignored() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0)]);

        session.drag_to(5.0);
        assert_eq!(session.state().drag_position, None);
    }

    #[test]
    fn test_reset_stops_playback_and_returns_job() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0)]);
        session.dispatch(Action::SetProcessingStatus(ProcessingStatus::Completed {
            job_id: JobId("job-9".to_string()),
        }));
        session.play();

        let job = session.reset();

        assert_eq!(job, Some(JobId("job-9".to_string())));
        assert!(log.live().is_empty());
        assert_eq!(session.engine().voice_count(), 0);
        assert!(!session.is_playing());
        assert!(!session.state().has_loaded_audio());
        assert_eq!(session.state().status, ProcessingStatus::Idle);
        assert!(matches!(session.mix_request(), Err(ExportError::NotReady)));
    }

    async fn pump_until_settled(session: &mut Session) {
        for _ in 0..5000 {
            session.pump();
            let status = &session.state().status;
            if !session.is_loading() && !status.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("job did not settle: {:?}", session.state().status);
    }

    #[tokio::test]
    async fn test_full_job_loads_all_stems() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        std::fs::write(&path, wav_bytes(0.2, 8000, 2)).unwrap();

        let mut statuses: Vec<_> = (0..=95).step_by(5).map(processing).collect();
        let mut done = completed();
        done.audio_info = Some(stem_client::AudioInfo {
            key: Some("C".to_string()),
            tempo: Some(120.0),
            duration: Some(10.0),
        });
        statuses.push(done);
        let mut api = MockApi::new(statuses);
        for stem in StemId::ALL {
            api = api.with_stem(stem, wav_bytes(10.0, 8000, 2));
        }
        let api = Arc::new(api);

        session.start_job(&tokio::runtime::Handle::current(), api.clone(), &path);
        assert_eq!(session.state().status, ProcessingStatus::Uploading);
        assert_eq!(session.status_message(), Some("Uploading…"));
        assert_eq!(session.state().file.as_ref().unwrap().name, "song.wav");
        pump_until_settled(&mut session).await;
        assert_eq!(session.status_message(), Some("Ready"));

        let state = session.state();
        assert!(state.status.is_completed());
        assert_eq!(state.duration, 10.0);
        assert!(state.tracks.iter().all(|t| t.is_loaded() && t.envelope.len() == 50));
        assert_eq!(state.audio_info.as_ref().unwrap().key.as_deref(), Some("C"));
        assert_eq!(api.count("download"), 6);
        assert!(session.can_export());
        assert!(session.play());
    }

    #[tokio::test]
    async fn test_new_job_stops_running_playback() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, log) = session(&clock);
        load(&mut session, &[(StemId::Vocals, 10.0)]);
        session.play();

        let api = Arc::new(MockApi::new([processing(10)]));
        session.start_job(&tokio::runtime::Handle::current(), api, "/nowhere/next.mp3");

        assert!(log.live().is_empty());
        assert!(!session.is_playing());
        assert!(!session.state().has_loaded_audio());
        assert_eq!(session.state().status, ProcessingStatus::Uploading);
    }

    #[tokio::test]
    async fn test_reset_abandons_running_job() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.ogg");
        std::fs::write(&path, b"bytes").unwrap();

        let api = Arc::new(MockApi::new([processing(40)]));
        session.start_job(&tokio::runtime::Handle::current(), api.clone(), &path);
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.pump();
        assert!(session.state().status.is_busy());

        session.reset();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.pump(), 0);
        assert!(!session.is_loading());
        assert_eq!(session.state().status, ProcessingStatus::Idle);
        assert!(session.state().file.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_surfaces_error() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        let api = Arc::new(MockApi::new([completed()]));

        session.start_job(&tokio::runtime::Handle::current(), api.clone(), "/nowhere/song.wav");
        pump_until_settled(&mut session).await;

        match &session.state().status {
            ProcessingStatus::Error { message } => assert!(message.starts_with("Failed to read")),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_keeps_loaded_stems_playable() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (mut session, _log) = session(&clock);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        std::fs::write(&path, wav_bytes(0.2, 8000, 2)).unwrap();

        // only vocals can be downloaded; guitar fails
        let api = Arc::new(MockApi::new([completed()]).with_stem(StemId::Vocals, wav_bytes(6.0, 8000, 1)));
        session.start_job(&tokio::runtime::Handle::current(), api, &path);
        pump_until_settled(&mut session).await;

        assert!(matches!(session.state().status, ProcessingStatus::Error { .. }));
        assert!((session.state().duration - 6.0).abs() < 1e-9);
        assert!(!session.can_export());

        assert!(session.play());
        clock.advance(4.0);
        assert!(session.on_frame());
        assert!((session.state().current_time - 4.0).abs() < 1e-9);

        session.pause();
        assert!((session.state().current_time - 4.0).abs() < 1e-9);
        session.play();
        assert_eq!(session.engine().elapsed(), Some(4.0));
    }
}
