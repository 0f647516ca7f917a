//! Replays a [`FrameSource`] through one stream worker.
//!
//! Every reading is handed to the caller and, when a [`ReadingStore`] is
//! given, written to it before the next frame is submitted. Recording happens
//! on the blocking pool, inline with the submit loop, so a slow database
//! slows the replay down instead of losing readings.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::warn;

use occusense_hal::RegionDetector;
use occusense_hal::source::FrameSource;
use occusense_memory::ReadingStore;
use occusense_perception::OccupancyEngine;
use occusense_runtime::{ReadingBus, StreamWorker, WorkerSummary};
use occusense_types::ReadingEvent;

/// How a replay is run.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub stream_id: String,
    pub queue_depth: usize,
    /// Keep each encoded frame next to its reading.
    pub store_frames: bool,
}

/// What a replay did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub summary: WorkerSummary,
    /// Readings written to the store; `None` when nothing was recorded.
    pub recorded: Option<u64>,
}

/// Feed every frame of `source` to a new worker owning `engine`.
///
/// Stops when the source is exhausted or `shutdown` is set. `on_reading` is
/// called with the frame label and the broadcast event of each reading.
///
/// # Errors
///
/// Fails if the worker or the store task dies; unreadable frames and failed
/// inserts are logged and skipped.
pub async fn replay<S, P, F>(
    source: &mut S,
    engine: OccupancyEngine<P, F>,
    bus: ReadingBus,
    store: Option<ReadingStore>,
    options: &ReplayOptions,
    shutdown: &AtomicBool,
    mut on_reading: impl FnMut(&str, &ReadingEvent),
) -> Result<ReplayOutcome>
where
    S: FrameSource + ?Sized,
    P: RegionDetector + 'static,
    F: RegionDetector + 'static,
{
    let (handle, worker) =
        StreamWorker::spawn(options.stream_id.clone(), engine, bus, options.queue_depth);
    let recording = store.is_some();
    let mut store = store;
    let mut recorded = 0u64;

    while !shutdown.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "skipping unreadable frame");
                continue;
            }
        };
        let kept = (recording && options.store_frames).then(|| frame.bytes.clone());
        let event = handle.submit_event(frame.bytes).await?;
        on_reading(&frame.label, &event);

        if let Some(db) = store.take() {
            let (db, result) = tokio::task::spawn_blocking(move || {
                let result = db.record_with_frame(&event, kept.as_deref());
                (db, result)
            })
            .await
            .context("reading store task panicked")?;
            store = Some(db);
            match result {
                Ok(()) => recorded += 1,
                Err(e) => warn!(error = %e, frame = %frame.label, "failed to record reading"),
            }
        }
    }

    drop(handle);
    let summary = worker.await.context("stream worker panicked")?;
    Ok(ReplayOutcome {
        summary,
        recorded: recording.then_some(recorded),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use occusense_hal::source::DirectorySource;
    use occusense_hal::{NormalizedFrame, Region};
    use occusense_perception::EngineConfig;
    use occusense_types::OccuError;
    use std::fs;
    use std::path::Path;

    struct Nobody;

    impl RegionDetector for Nobody {
        fn name(&self) -> &str {
            "nobody"
        }

        fn detect(&mut self, _frame: &NormalizedFrame) -> Result<Vec<Region>, OccuError> {
            Ok(Vec::new())
        }
    }

    fn engine() -> OccupancyEngine<Nobody, Nobody> {
        OccupancyEngine::new(EngineConfig::default(), Nobody, Nobody).unwrap()
    }

    fn options(store_frames: bool) -> ReplayOptions {
        ReplayOptions {
            stream_id: "door".to_string(),
            queue_depth: 4,
            store_frames,
        }
    }

    /// `n` undecodable frames; each one still yields a (degraded) reading.
    fn write_frames(dir: &Path, n: usize) {
        for i in 0..n {
            fs::write(dir.join(format!("frame-{i:04}.jpg")), format!("frame {i}")).unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_reading_is_recorded() {
        const FRAMES: usize = 600;
        let frames = tempfile::tempdir().unwrap();
        write_frames(frames.path(), FRAMES);
        let db = tempfile::tempdir().unwrap();
        let db_path = db.path().join("readings.db");
        let store = ReadingStore::open(&db_path.to_string_lossy()).unwrap();

        let bus = ReadingBus::new(4);
        // Never read: a lagging subscriber must not cost recorded readings.
        let _idle = bus.subscribe();
        let mut source = DirectorySource::open("door", frames.path()).unwrap();
        let mut seen = 0;
        let outcome = replay(
            &mut source,
            engine(),
            bus,
            Some(store),
            &options(false),
            &AtomicBool::new(false),
            |_, _| seen += 1,
        )
        .await
        .unwrap();

        assert_eq!(seen, FRAMES);
        assert_eq!(outcome.summary.frames, FRAMES as u64);
        assert_eq!(outcome.summary.degraded, FRAMES as u64);
        assert_eq!(outcome.recorded, Some(FRAMES as u64));

        let store = ReadingStore::open(&db_path.to_string_lossy()).unwrap();
        assert_eq!(store.readings("door").unwrap().len(), FRAMES);
        assert!(store.latest_frame("door").unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_rows_match_broadcast_events() {
        let frames = tempfile::tempdir().unwrap();
        write_frames(frames.path(), 3);
        let db = tempfile::tempdir().unwrap();
        let db_path = db.path().join("readings.db");
        let store = ReadingStore::open(&db_path.to_string_lossy()).unwrap();

        let mut source = DirectorySource::open("door", frames.path()).unwrap();
        let mut ids = Vec::new();
        replay(
            &mut source,
            engine(),
            ReadingBus::default(),
            Some(store),
            &options(true),
            &AtomicBool::new(false),
            |_, event| ids.push(event.id),
        )
        .await
        .unwrap();

        let store = ReadingStore::open(&db_path.to_string_lossy()).unwrap();
        let stored: Vec<_> = store.readings("door").unwrap().iter().map(|e| e.id).collect();
        assert_eq!(stored, ids);
        let frame = store.latest_frame("door").unwrap().unwrap();
        assert_eq!(frame.bytes, b"frame 2".to_vec());
        assert_eq!(frame.id, ids[2]);
    }

    #[tokio::test]
    async fn without_store_nothing_is_recorded() {
        let frames = tempfile::tempdir().unwrap();
        write_frames(frames.path(), 2);
        let mut source = DirectorySource::open("door", frames.path()).unwrap();
        let outcome = replay(
            &mut source,
            engine(),
            ReadingBus::default(),
            None,
            &options(true),
            &AtomicBool::new(false),
            |_, _| {},
        )
        .await
        .unwrap();
        assert_eq!(outcome.summary.frames, 2);
        assert_eq!(outcome.recorded, None);
    }

    #[tokio::test]
    async fn shutdown_stops_before_the_next_frame() {
        let frames = tempfile::tempdir().unwrap();
        write_frames(frames.path(), 5);
        let mut source = DirectorySource::open("door", frames.path()).unwrap();
        let outcome = replay(
            &mut source,
            engine(),
            ReadingBus::default(),
            None,
            &options(false),
            &AtomicBool::new(true),
            |_, _| {},
        )
        .await
        .unwrap();
        assert_eq!(outcome.summary.frames, 0);
        assert_eq!(source.remaining(), 5);
    }
}
