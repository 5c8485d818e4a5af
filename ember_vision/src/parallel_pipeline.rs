// THEORY:
// `StreamPool` runs many independent video streams at once. The engine itself
// is sequential per stream, so parallelism comes from streams, never from
// splitting a frame:
// 1.  **One owner per stream**: every stream has its own worker task holding its
//     own `FrameProcessor`. Frames reach it through an mpsc channel and are
//     processed strictly in submission order. No detector state is shared.
// 2.  **Bounded CPU**: a semaphore sized to the machine's cores caps how many
//     frames are being crunched at any moment across all streams. The heavy
//     work runs on the blocking pool so the async side stays responsive.
// 3.  **Request/response**: each submitted frame carries a oneshot sender for
//     its report, so callers simply `await` the answer.

use crate::config::DetectorConfig;
use crate::error::{EmberError, Result};
use crate::pipeline::{FrameProcessor, FrameReport};
use futures::future::join_all;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type StreamId = u64;

struct FrameTask {
    frame: RgbImage,
    result_sender: oneshot::Sender<Result<FrameReport>>,
}

struct StreamWorker {
    task_sender: mpsc::UnboundedSender<FrameTask>,
    handle: JoinHandle<()>,
}

pub struct StreamPool {
    config: DetectorConfig,
    permits: Arc<Semaphore>,
    streams: HashMap<StreamId, StreamWorker>,
    next_id: StreamId,
}

impl StreamPool {
    /// A pool allowing one in-flight frame per CPU core.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        Self::with_concurrency(config, num_cpus::get())
    }

    pub fn with_concurrency(config: DetectorConfig, max_in_flight: usize) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            streams: HashMap::new(),
            next_id: 0,
        })
    }

    /// Registers a new stream with a fresh detector. Must be called inside a
    /// tokio runtime.
    pub fn add_stream(&mut self) -> Result<StreamId> {
        let id = self.next_id;
        self.next_id += 1;

        let processor = FrameProcessor::new(self.config.clone())?;
        let (task_sender, task_receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Self::run_worker(id, processor, task_receiver, self.permits.clone()));
        self.streams.insert(id, StreamWorker { task_sender, handle });
        debug!(stream = id, "stream added");
        Ok(id)
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn run_worker(
        id: StreamId,
        mut processor: FrameProcessor,
        mut task_receiver: mpsc::UnboundedReceiver<FrameTask>,
        permits: Arc<Semaphore>,
    ) {
        while let Some(task) = task_receiver.recv().await {
            let Ok(_permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let frame = task.frame;
            let joined = tokio::task::spawn_blocking(move || {
                let result = processor.process_frame(&frame);
                (processor, result)
            })
            .await;

            match joined {
                Ok((returned, result)) => {
                    processor = returned;
                    let _ = task.result_sender.send(result);
                }
                Err(err) => {
                    warn!(stream = id, %err, "stream worker lost its detector");
                    break;
                }
            }
        }
        debug!(stream = id, "stream worker stopped");
    }

    /// Processes one frame on `stream` and waits for its report.
    pub async fn submit(&self, stream: StreamId, frame: RgbImage) -> Result<FrameReport> {
        let worker = self
            .streams
            .get(&stream)
            .ok_or(EmberError::UnknownStream(stream))?;

        let (result_sender, result_receiver) = oneshot::channel();
        worker
            .task_sender
            .send(FrameTask { frame, result_sender })
            .map_err(|_| EmberError::StreamClosed(stream))?;

        result_receiver
            .await
            .map_err(|_| EmberError::StreamClosed(stream))?
    }

    /// Submits one frame per stream concurrently. Reports come back in input order.
    pub async fn process_round(
        &self,
        frames: Vec<(StreamId, RgbImage)>,
    ) -> Vec<(StreamId, Result<FrameReport>)> {
        join_all(
            frames
                .into_iter()
                .map(|(stream, frame)| async move { (stream, self.submit(stream, frame).await) }),
        )
        .await
    }

    /// Stops one stream after its queued frames are done.
    pub async fn close_stream(&mut self, stream: StreamId) -> Result<()> {
        let worker = self
            .streams
            .remove(&stream)
            .ok_or(EmberError::UnknownStream(stream))?;
        drop(worker.task_sender);
        if let Err(err) = worker.handle.await {
            warn!(stream, %err, "stream worker ended abnormally");
        }
        Ok(())
    }

    /// Closes every stream and waits for all workers.
    pub async fn shutdown(mut self) {
        for stream in self.stream_ids() {
            let _ = self.close_stream(stream).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(width: u32) -> RgbImage {
        RgbImage::from_pixel(width, 24, Rgb([18, 22, 30]))
    }

    #[tokio::test]
    async fn streams_keep_their_own_counters() {
        let mut pool = StreamPool::with_concurrency(DetectorConfig::strict(), 2).unwrap();
        let a = pool.add_stream().unwrap();
        let b = pool.add_stream().unwrap();
        assert_eq!(pool.stream_ids(), vec![a, b]);

        for expected in 0..3 {
            let report = pool.submit(a, frame(32)).await.unwrap();
            assert_eq!(report.frame_index, expected);
        }
        let report = pool.submit(b, frame(48)).await.unwrap();
        assert_eq!(report.frame_index, 0);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn process_round_answers_every_stream() {
        let mut pool = StreamPool::with_concurrency(DetectorConfig::permissive(), 1).unwrap();
        let ids: Vec<_> = (0..3).map(|_| pool.add_stream().unwrap()).collect();

        for round in 0..2 {
            let frames = ids.iter().map(|&id| (id, frame(32))).collect();
            let results = pool.process_round(frames).await;
            assert_eq!(results.len(), 3);
            for ((id, result), expected) in results.into_iter().zip(&ids) {
                assert_eq!(id, *expected);
                assert_eq!(result.unwrap().frame_index, round);
            }
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn faults_stay_within_their_stream() {
        let mut pool = StreamPool::new(DetectorConfig::strict()).unwrap();
        let a = pool.add_stream().unwrap();
        let b = pool.add_stream().unwrap();
        pool.submit(a, frame(32)).await.unwrap();

        let err = pool.submit(a, frame(40)).await.unwrap_err();
        assert!(matches!(err, EmberError::DimensionMismatch { .. }));
        assert!(pool.submit(b, frame(40)).await.is_ok());
        assert_eq!(pool.submit(a, frame(32)).await.unwrap().frame_index, 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn closed_and_unknown_streams_are_errors() {
        let mut pool = StreamPool::new(DetectorConfig::strict()).unwrap();
        let a = pool.add_stream().unwrap();
        pool.close_stream(a).await.unwrap();
        assert_eq!(
            pool.submit(a, frame(32)).await.unwrap_err(),
            EmberError::UnknownStream(a)
        );
        assert_eq!(
            pool.close_stream(99).await.unwrap_err(),
            EmberError::UnknownStream(99)
        );
    }
}
