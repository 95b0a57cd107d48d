//! Live-stream polling.
//!
//! Each started stream gets its own task that pulls one frame per interval
//! and hands it to a caller-supplied callback. Nothing here is shared with
//! [`VideoAnalyzer`](crate::VideoAnalyzer).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::AnalyzerConfig;
use crate::error::{StreamError, VideoError};
use crate::video::{Frame, FrameSource};

/// Opens a frame source for a stream URL. Called on a blocking thread.
pub trait StreamOpener: Send + Sync + 'static {
    type Source: FrameSource + Send + 'static;

    fn open(&self, url: &str) -> Result<Self::Source, VideoError>;
}

/// Receives `(camera_id, frame)` for every frame pulled.
pub type FrameCallback = Arc<dyn Fn(&str, Frame) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStats {
    pub camera_id: String,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub frame_count: u64,
    pub active: bool,
}

struct StreamEntry {
    url: String,
    started_at: DateTime<Utc>,
    frame_count: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
}

impl StreamEntry {
    fn stats(&self, camera_id: &str) -> StreamStats {
        StreamStats {
            camera_id: camera_id.to_string(),
            url: self.url.clone(),
            started_at: self.started_at,
            frame_count: self.frame_count.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
        }
    }
}

type StreamMap = Arc<Mutex<HashMap<String, StreamEntry>>>;

fn lock(streams: &StreamMap) -> MutexGuard<'_, HashMap<String, StreamEntry>> {
    streams.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct StreamPoller<O: StreamOpener> {
    opener: Arc<O>,
    streams: StreamMap,
    interval: Duration,
    max_streams: usize,
}

impl<O: StreamOpener> StreamPoller<O> {
    pub fn new(opener: O, interval: Duration, max_streams: usize) -> Self {
        Self {
            opener: Arc::new(opener),
            streams: Arc::new(Mutex::new(HashMap::new())),
            interval,
            max_streams,
        }
    }

    pub fn from_config(opener: O, config: &AnalyzerConfig) -> Self {
        Self::new(opener, config.frame_interval(), config.max_concurrent_streams)
    }

    /// Start polling `url` under `camera_id`.
    ///
    /// A stopped stream may be started again under the same id; its stats
    /// are replaced. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        camera_id: &str,
        url: &str,
        callback: FrameCallback,
    ) -> Result<(), StreamError> {
        let runtime = Handle::try_current().map_err(|_| StreamError::NoRuntime)?;

        let frame_count = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut streams = lock(&self.streams);
            if streams
                .get(camera_id)
                .is_some_and(|s| s.active.load(Ordering::SeqCst))
            {
                return Err(StreamError::AlreadyActive(camera_id.to_string()));
            }
            let running = streams
                .values()
                .filter(|s| s.active.load(Ordering::SeqCst))
                .count();
            if running >= self.max_streams {
                return Err(StreamError::TooManyStreams(running));
            }
            streams.insert(
                camera_id.to_string(),
                StreamEntry {
                    url: url.to_string(),
                    started_at: Utc::now(),
                    frame_count: Arc::clone(&frame_count),
                    active: Arc::clone(&active),
                },
            );
        }

        let worker = StreamWorker {
            camera_id: camera_id.to_string(),
            url: url.to_string(),
            opener: Arc::clone(&self.opener),
            streams: Arc::clone(&self.streams),
            callback,
            frame_count,
            active,
            interval: self.interval,
        };
        runtime.spawn(worker.run());
        Ok(())
    }

    /// Ask the stream to stop after its current frame. Returns false if the
    /// id is unknown.
    pub fn stop(&self, camera_id: &str) -> bool {
        match lock(&self.streams).get(camera_id) {
            Some(entry) => {
                entry.active.store(false, Ordering::SeqCst);
                info!(camera_id, "stopping stream");
                true
            }
            None => false,
        }
    }

    /// Stats for `camera_id`. Stopped and ended streams keep their entry
    /// until [`Self::remove`] or a restart under the same id.
    pub fn stats(&self, camera_id: &str) -> Option<StreamStats> {
        lock(&self.streams)
            .get(camera_id)
            .map(|entry| entry.stats(camera_id))
    }

    /// Drop a finished stream and return its final stats. Active streams are
    /// left alone and yield `None`.
    pub fn remove(&self, camera_id: &str) -> Option<StreamStats> {
        let mut streams = lock(&self.streams);
        if streams
            .get(camera_id)
            .is_none_or(|entry| entry.active.load(Ordering::SeqCst))
        {
            return None;
        }
        streams
            .remove(camera_id)
            .map(|entry| entry.stats(camera_id))
    }

    pub fn active_count(&self) -> usize {
        lock(&self.streams)
            .values()
            .filter(|s| s.active.load(Ordering::SeqCst))
            .count()
    }
}

struct StreamWorker<O: StreamOpener> {
    camera_id: String,
    url: String,
    opener: Arc<O>,
    streams: StreamMap,
    callback: FrameCallback,
    frame_count: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
    interval: Duration,
}

impl<O: StreamOpener> StreamWorker<O> {
    async fn run(self) {
        let opener = Arc::clone(&self.opener);
        let url = self.url.clone();
        let opened = tokio::task::spawn_blocking(move || opener.open(&url)).await;

        let mut source = match opened {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => {
                warn!(camera_id = %self.camera_id, error = %e, "failed to open stream");
                self.forget();
                return;
            }
            Err(e) => {
                warn!(camera_id = %self.camera_id, error = %e, "stream open task failed");
                self.forget();
                return;
            }
        };
        info!(camera_id = %self.camera_id, url = %self.url, "stream started");

        while self.active.load(Ordering::SeqCst) {
            let read = tokio::task::spawn_blocking(move || {
                let result = source.next_frame();
                (source, result)
            })
            .await;
            let (returned, result) = match read {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(camera_id = %self.camera_id, error = %e, "stream read task failed");
                    break;
                }
            };
            source = returned;

            match result {
                Ok(Some(frame)) => {
                    if !self.active.load(Ordering::SeqCst) {
                        break;
                    }
                    (self.callback)(&self.camera_id, frame);
                    self.frame_count.fetch_add(1, Ordering::SeqCst);
                }
                Ok(None) => {
                    warn!(camera_id = %self.camera_id, "stream ended");
                    break;
                }
                Err(e) => {
                    warn!(camera_id = %self.camera_id, error = %e, "stream read failed");
                    break;
                }
            }

            tokio::time::sleep(self.interval).await;
        }

        self.active.store(false, Ordering::SeqCst);
        info!(
            camera_id = %self.camera_id,
            frames = self.frame_count.load(Ordering::SeqCst),
            "stream stopped"
        );
    }

    /// Drop this worker's entry, unless the id was restarted meanwhile.
    fn forget(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut streams = lock(&self.streams);
        if streams
            .get(&self.camera_id)
            .is_some_and(|s| Arc::ptr_eq(&s.active, &self.active))
        {
            streams.remove(&self.camera_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::video::VideoMetadata;

    struct SyntheticSource {
        remaining: Option<u32>,
    }

    impl FrameSource for SyntheticSource {
        fn metadata(&self) -> VideoMetadata {
            VideoMetadata {
                fps: 30.0,
                width: 8,
                height: 8,
                total_frames: 0,
            }
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            match self.remaining.as_mut() {
                Some(0) => Ok(None),
                Some(n) => {
                    *n -= 1;
                    Ok(Some(Frame::new(8, 8)))
                }
                None => Ok(Some(Frame::new(8, 8))),
            }
        }
    }

    /// Endless sources, except "finite://N" (N frames) and "bad://" (fails to open).
    struct SyntheticOpener;

    impl StreamOpener for SyntheticOpener {
        type Source = SyntheticSource;

        fn open(&self, url: &str) -> Result<Self::Source, VideoError> {
            if url.starts_with("bad://") {
                return Err(VideoError::open_input(url, "unreachable"));
            }
            let remaining = url
                .strip_prefix("finite://")
                .and_then(|n| n.parse().ok());
            Ok(SyntheticSource { remaining })
        }
    }

    fn poller(max_streams: usize) -> StreamPoller<SyntheticOpener> {
        StreamPoller::new(SyntheticOpener, Duration::from_millis(5), max_streams)
    }

    fn counting_callback() -> (FrameCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: FrameCallback = Arc::new(move |_camera_id: &str, _frame: Frame| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_polls_until_stopped() {
        let poller = poller(5);
        let (callback, count) = counting_callback();
        poller.start("cam-1", "rtsp://cam-1", callback).unwrap();

        wait_until(|| count.load(Ordering::SeqCst) >= 3).await;
        assert!(poller.stop("cam-1"));
        wait_until(|| poller.active_count() == 0).await;

        let stats = poller.stats("cam-1").unwrap();
        assert_eq!(stats.camera_id, "cam-1");
        assert!(!stats.active);
        assert!(stats.frame_count >= 3);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_excess_streams() {
        let poller = poller(1);
        let (callback, _) = counting_callback();
        poller.start("cam-1", "rtsp://cam-1", Arc::clone(&callback)).unwrap();

        assert!(matches!(
            poller.start("cam-1", "rtsp://cam-1", Arc::clone(&callback)),
            Err(StreamError::AlreadyActive(_))
        ));
        assert!(matches!(
            poller.start("cam-2", "rtsp://cam-2", callback),
            Err(StreamError::TooManyStreams(1))
        ));
        poller.stop("cam-1");
    }

    #[tokio::test]
    async fn test_end_of_stream_marks_inactive() {
        let poller = poller(5);
        let (callback, count) = counting_callback();
        poller.start("cam-1", "finite://2", callback).unwrap();

        wait_until(|| poller.stats("cam-1").is_some_and(|s| !s.active)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(poller.stats("cam-1").unwrap().frame_count, 2);
    }

    #[tokio::test]
    async fn test_remove_only_drops_finished_streams() {
        let poller = poller(5);
        let (callback, _) = counting_callback();
        poller.start("ended", "finite://1", Arc::clone(&callback)).unwrap();
        poller.start("live", "rtsp://live", callback).unwrap();

        wait_until(|| poller.stats("ended").is_some_and(|s| !s.active)).await;
        let stats = poller.remove("ended").unwrap();
        assert_eq!(stats.frame_count, 1);
        assert!(poller.stats("ended").is_none());
        assert!(poller.remove("ended").is_none());

        assert!(poller.remove("live").is_none());
        assert!(poller.stats("live").unwrap().active);

        poller.stop("live");
        wait_until(|| poller.active_count() == 0).await;
        assert!(poller.remove("live").is_some());
    }

    #[tokio::test]
    async fn test_open_failure_forgets_stream() {
        let poller = poller(5);
        let (callback, count) = counting_callback();
        poller.start("cam-1", "bad://cam-1", callback).unwrap();

        wait_until(|| poller.stats("cam-1").is_none()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!poller.stop("cam-1"));
    }

    #[test]
    fn test_start_outside_runtime() {
        let (callback, _) = counting_callback();
        assert!(matches!(
            poller(5).start("cam-1", "rtsp://cam-1", callback),
            Err(StreamError::NoRuntime)
        ));
    }
}
