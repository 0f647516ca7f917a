//! [`StreamWorker`] – one serialized occupancy engine per stream.
//!
//! An [`OccupancyEngine`] keeps comparative state (previous frame, background
//! model, history window) that interleaved frames would corrupt. The worker
//! therefore owns its engine outright: frames arrive through an `mpsc`
//! queue and are processed strictly one after another, each on the blocking
//! pool so the async runtime is never stalled by image work.
//!
//! Every reading is answered to the submitter and broadcast on the
//! [`ReadingBus`] as a [`ReadingEvent`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo<P, F>(engine: occusense_perception::OccupancyEngine<P, F>)
//! # where P: occusense_hal::RegionDetector + 'static, F: occusense_hal::RegionDetector + 'static {
//! use occusense_runtime::{ReadingBus, StreamWorker};
//!
//! let bus = ReadingBus::default();
//! let (handle, worker) = StreamWorker::spawn("bus-12/front", engine, bus, 16);
//! let reading = handle.submit(std::fs::read("frame.jpg").unwrap()).await.unwrap();
//! drop(handle);
//! let summary = worker.await.unwrap();
//! # }
//! ```

use occusense_hal::RegionDetector;
use occusense_perception::OccupancyEngine;
use occusense_types::{OccuError, OccupancyReading, ReadingEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::ReadingBus;

/// A frame waiting for its stream's engine.
struct Job {
    bytes: Vec<u8>,
    reply: oneshot::Sender<ReadingEvent>,
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Frames taken off the queue.
    pub frames: u64,
    /// Frames that produced a degraded (`method = error`) reading.
    pub degraded: u64,
}

/// Submits frames to a running [`StreamWorker`]. Clone it to feed one stream
/// from several producers; the worker stops once every handle is dropped.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    stream_id: String,
    sender: mpsc::Sender<Job>,
}

impl StreamHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Queue `bytes` and wait for the resulting reading.
    ///
    /// Frames that cannot be analysed still yield a (degraded) reading.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Channel`] if the worker has stopped.
    pub async fn submit(&self, bytes: Vec<u8>) -> Result<OccupancyReading, OccuError> {
        self.submit_event(bytes).await.map(|event| event.reading)
    }

    /// Like [`submit`][Self::submit], but returns the [`ReadingEvent`] that
    /// was broadcast, so callers can store it under the same id.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Channel`] if the worker has stopped.
    pub async fn submit_event(&self, bytes: Vec<u8>) -> Result<ReadingEvent, OccuError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Job { bytes, reply })
            .await
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> OccuError {
        OccuError::Channel(format!("worker for stream '{}' has stopped", self.stream_id))
    }
}

/// Spawner for per-stream worker tasks.
pub struct StreamWorker;

impl StreamWorker {
    /// Move `engine` into a new worker task for `stream_id`.
    ///
    /// `queue_depth` bounds the number of frames waiting for the engine;
    /// submitters wait while the queue is full. The returned join handle
    /// resolves with a [`WorkerSummary`] once every [`StreamHandle`] has been
    /// dropped and the queue is drained.
    pub fn spawn<P, F>(
        stream_id: impl Into<String>,
        engine: OccupancyEngine<P, F>,
        bus: ReadingBus,
        queue_depth: usize,
    ) -> (StreamHandle, JoinHandle<WorkerSummary>)
    where
        P: RegionDetector + 'static,
        F: RegionDetector + 'static,
    {
        let stream_id = stream_id.into();
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let task = tokio::spawn(run(stream_id.clone(), engine, receiver, bus));
        (StreamHandle { stream_id, sender }, task)
    }
}

async fn run<P, F>(
    stream_id: String,
    mut engine: OccupancyEngine<P, F>,
    mut receiver: mpsc::Receiver<Job>,
    bus: ReadingBus,
) -> WorkerSummary
where
    P: RegionDetector + 'static,
    F: RegionDetector + 'static,
{
    info!(stream = %stream_id, "stream worker started");
    let mut summary = WorkerSummary::default();

    while let Some(Job { bytes, reply }) = receiver.recv().await {
        let outcome = tokio::task::spawn_blocking(move || {
            let reading = engine.process_frame(&bytes);
            (engine, reading)
        })
        .await;

        let reading = match outcome {
            Ok((returned, reading)) => {
                engine = returned;
                reading
            }
            Err(e) => {
                // The engine went down with the panicking task.
                error!(stream = %stream_id, error = %e, "engine task failed; stopping worker");
                return summary;
            }
        };

        summary.frames += 1;
        if reading.is_degraded() {
            summary.degraded += 1;
        }

        let event = ReadingEvent::new(stream_id.clone(), reading);
        let receivers = bus.publish(event.clone());
        debug!(stream = %stream_id, count = event.reading.count, receivers, "reading published");

        if reply.send(event).is_err() {
            warn!(stream = %stream_id, "submitter went away before its reading was ready");
        }
    }

    // Detectors may hold blocking clients that must not be dropped on an
    // async worker thread.
    let _ = tokio::task::spawn_blocking(move || drop(engine)).await;
    info!(
        stream = %stream_id,
        frames = summary.frames,
        degraded = summary.degraded,
        "stream worker stopped"
    );
    summary
}
