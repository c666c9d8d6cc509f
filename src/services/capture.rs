use crate::audio::{AudioFormat, AudioSink, SourceFactory, WavSink};
use crate::services::naming;
use crate::song::Song;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Where and how finished captures are written
#[derive(Debug, Clone)]
pub struct OutputPolicy {
    pub output_dir: PathBuf,
    pub min_duration_secs: u64,
    pub group_by_artist: bool,
    pub separator: String,
    pub format: AudioFormat,
}

/// Start/stop contract the watcher drives. At most one session is live.
#[async_trait]
pub trait CaptureSessions: Send {
    /// Spawn a worker recording `song`. Fails if the worker cannot be spawned.
    fn start(&mut self, song: &Song, track_number: Option<u32>) -> Result<()>;

    fn is_live(&self) -> bool;

    /// Seconds recorded so far by the live session, 0 if none
    fn elapsed_secs(&self) -> u64;

    /// Clear the liveness flag of the current session and hand it the final
    /// count it should finalize with. Does not wait for the worker.
    /// Returns false if there was no session.
    fn stop(&mut self, elapsed_secs: u64) -> bool;

    /// Wait for every stopped worker to exit
    async fn drain(&mut self);
}

/// State shared between the controller and one worker thread
#[derive(Debug, Default)]
struct SessionState {
    live: AtomicBool,
    elapsed_secs: AtomicU64,
    final_secs: AtomicU64,
}

pub struct CaptureHandle {
    song: Song,
    state: Arc<SessionState>,
    worker: JoinHandle<Result<Option<PathBuf>>>,
}

impl CaptureHandle {
    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::Acquire) && !self.worker.is_finished()
    }
}

/// Runs one OS thread per capture session
pub struct CaptureController {
    policy: OutputPolicy,
    sources: Arc<dyn SourceFactory>,
    current: Option<CaptureHandle>,
    stopping: Vec<CaptureHandle>,
}

impl CaptureController {
    pub fn new(policy: OutputPolicy, sources: Arc<dyn SourceFactory>) -> Self {
        Self {
            policy,
            sources,
            current: None,
            stopping: Vec::new(),
        }
    }

    /// Join workers that already exited and log how they ended
    fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .stopping
            .drain(..)
            .partition(|handle| handle.worker.is_finished());
        self.stopping = running;

        for handle in finished {
            log_outcome(handle);
        }
    }
}

fn log_outcome(handle: CaptureHandle) {
    match handle.worker.join() {
        Ok(Ok(Some(path))) => tracing::info!("Saved {} to {:?}", handle.song, path),
        Ok(Ok(None)) => tracing::info!("Discarded {}: shorter than minimum", handle.song),
        Ok(Err(e)) => tracing::error!("Capture of {} failed: {:#}", handle.song, e),
        Err(_) => tracing::error!("Capture worker for {} panicked", handle.song),
    }
}

#[async_trait]
impl CaptureSessions for CaptureController {
    fn start(&mut self, song: &Song, track_number: Option<u32>) -> Result<()> {
        self.reap();

        if self.is_live() {
            return Err(anyhow::anyhow!("A capture is already live"));
        }
        // A worker that died on its own still needs joining
        if let Some(dead) = self.current.take() {
            self.stopping.push(dead);
        }

        let path = naming::track_path(
            &self.policy.output_dir,
            song,
            track_number,
            self.policy.group_by_artist,
            &self.policy.separator,
        );

        let state = Arc::new(SessionState {
            live: AtomicBool::new(true),
            ..Default::default()
        });

        let worker = {
            let state = state.clone();
            let policy = self.policy.clone();
            let sources = self.sources.clone();
            let song = song.clone();
            std::thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || run_worker(&song, path, &policy, sources.as_ref(), &state))
                .context("Failed to spawn capture worker")?
        };

        tracing::info!("Recording started: {}", song);
        self.current = Some(CaptureHandle {
            song: song.clone(),
            state,
            worker,
        });
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.current.as_ref().is_some_and(CaptureHandle::is_live)
    }

    fn elapsed_secs(&self) -> u64 {
        self.current
            .as_ref()
            .map_or(0, |handle| handle.state.elapsed_secs.load(Ordering::Acquire))
    }

    fn stop(&mut self, elapsed_secs: u64) -> bool {
        let Some(handle) = self.current.take() else {
            return false;
        };

        handle.state.final_secs.store(elapsed_secs, Ordering::Release);
        handle.state.live.store(false, Ordering::Release);
        tracing::debug!("Stop requested for {} at {}s", handle.song, elapsed_secs);

        self.stopping.push(handle);
        self.reap();
        true
    }

    async fn drain(&mut self) {
        if let Some(handle) = self.current.take() {
            let elapsed = handle.state.elapsed_secs.load(Ordering::Acquire);
            handle.state.final_secs.store(elapsed, Ordering::Release);
            handle.state.live.store(false, Ordering::Release);
            self.stopping.push(handle);
        }

        let handles: Vec<_> = self.stopping.drain(..).collect();
        let joins = handles
            .into_iter()
            .map(|handle| tokio::task::spawn_blocking(move || log_outcome(handle)));

        for result in futures::future::join_all(joins).await {
            if let Err(e) = result {
                tracing::error!("Failed to join capture worker: {}", e);
            }
        }
    }
}

/// Body of a capture worker thread. Returns the kept file, or `None` when the
/// capture ended below the minimum duration and was deleted.
fn run_worker(
    song: &Song,
    path: PathBuf,
    policy: &OutputPolicy,
    sources: &dyn SourceFactory,
    state: &SessionState,
) -> Result<Option<PathBuf>> {
    let result = record(path, policy, sources, state);
    // Whatever happened, this session no longer counts as live
    state.live.store(false, Ordering::Release);
    let path = result?;

    let final_secs = state.final_secs.load(Ordering::Acquire);
    if final_secs < policy.min_duration_secs {
        tracing::debug!(
            "Capture of {} lasted {}s (< {}s), deleting {:?}",
            song,
            final_secs,
            policy.min_duration_secs,
            path
        );
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete short capture {:?}", path))?;
        return Ok(None);
    }

    Ok(Some(path))
}

fn record(
    path: PathBuf,
    policy: &OutputPolicy,
    sources: &dyn SourceFactory,
    state: &SessionState,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    let path = naming::unique_path(path);

    let mut source = sources.open(policy.format)?;
    let mut sink: Box<dyn AudioSink> = Box::new(WavSink::create(&path, policy.format)?);

    let mut written: u64 = 0;
    let mut buf = Vec::new();
    loop {
        let live = state.live.load(Ordering::Acquire);

        source.drain_into(&mut buf);
        if !buf.is_empty() {
            written += buf.len() as u64;
            sink.write_chunk(std::mem::take(&mut buf))?;
            state
                .elapsed_secs
                .store(policy.format.seconds_for_samples(written), Ordering::Release);
        }

        if !live {
            break;
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }

    // Stop the input before closing the file
    drop(source);
    sink.finalize()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::SampleSource;

    /// Produces exactly one second of silence per drain
    struct SecondPerDrain {
        format: AudioFormat,
    }

    impl SampleSource for SecondPerDrain {
        fn drain_into(&mut self, buf: &mut Vec<f32>) {
            buf.extend(std::iter::repeat_n(0.0, self.format.samples_for_duration(1.0)));
        }
    }

    struct SilenceFactory;

    impl SourceFactory for SilenceFactory {
        fn open(&self, format: AudioFormat) -> Result<Box<dyn SampleSource>> {
            Ok(Box::new(SecondPerDrain { format }))
        }
    }

    struct BrokenFactory;

    impl SourceFactory for BrokenFactory {
        fn open(&self, _format: AudioFormat) -> Result<Box<dyn SampleSource>> {
            Err(anyhow::anyhow!("no device"))
        }
    }

    fn policy(dir: &std::path::Path, min_duration_secs: u64) -> OutputPolicy {
        OutputPolicy {
            output_dir: dir.to_path_buf(),
            min_duration_secs,
            group_by_artist: false,
            separator: " - ".to_string(),
            format: AudioFormat {
                sample_rate: 100,
                channels: 1,
            },
        }
    }

    fn song(title: &str) -> Song {
        Song {
            title: title.to_string(),
            artist: "Band".to_string(),
            ..Default::default()
        }
    }

    async fn wait_for_elapsed(controller: &CaptureController, secs: u64) {
        for _ in 0..200 {
            if controller.elapsed_secs() >= secs {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("capture never reached {}s", secs);
    }

    #[tokio::test]
    async fn test_long_capture_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller =
            CaptureController::new(policy(dir.path(), 2), Arc::new(SilenceFactory));

        controller.start(&song("Long"), Some(1)).unwrap();
        assert!(controller.is_live());
        assert!(controller.start(&song("Other"), None).is_err());

        wait_for_elapsed(&controller, 3).await;
        let elapsed = controller.elapsed_secs();
        assert!(controller.stop(elapsed));
        assert!(!controller.is_live());
        controller.drain().await;

        assert!(dir.path().join("001 Band - Long.wav").exists());
    }

    #[tokio::test]
    async fn test_short_capture_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller =
            CaptureController::new(policy(dir.path(), 1000), Arc::new(SilenceFactory));

        controller.start(&song("Short"), None).unwrap();
        wait_for_elapsed(&controller, 1).await;
        controller.stop(controller.elapsed_secs());
        controller.drain().await;

        assert!(!dir.path().join("Band - Short.wav").exists());
    }

    #[tokio::test]
    async fn test_new_capture_may_start_before_old_worker_exits() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller =
            CaptureController::new(policy(dir.path(), 0), Arc::new(SilenceFactory));

        controller.start(&song("First"), None).unwrap();
        controller.stop(0);
        controller.start(&song("Second"), None).unwrap();
        assert!(controller.is_live());

        controller.drain().await;
        assert!(!controller.is_live());
        assert!(dir.path().join("Band - First.wav").exists());
        assert!(dir.path().join("Band - Second.wav").exists());
    }

    #[tokio::test]
    async fn test_failed_source_leaves_nothing_live() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller =
            CaptureController::new(policy(dir.path(), 0), Arc::new(BrokenFactory));

        controller.start(&song("Broken"), None).unwrap();
        for _ in 0..100 {
            if !controller.is_live() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!controller.is_live());
        assert!(controller.stop(0));
        controller.drain().await;
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller =
            CaptureController::new(policy(dir.path(), 0), Arc::new(SilenceFactory));
        assert!(!controller.stop(10));
        assert_eq!(controller.elapsed_secs(), 0);
    }
}
