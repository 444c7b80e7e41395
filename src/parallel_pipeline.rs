// THEORY:
// Normalizing a canvas is pure and self-contained, so batches parallelize trivially.
// The `ParallelPipeline` keeps a fixed set of worker tasks sharing one read-only
// `NormalizationPipeline`. A single dispatcher hands incoming tasks to the workers in
// round-robin order, and every task carries a oneshot channel for its own result.
// Results therefore never need reordering: a batch awaits its replies in input order.
//
// Normalization is synchronous and CPU-bound. Workers hand each image to tokio's
// blocking pool and only await the outcome, so at most `worker_count` images are in
// flight and the async runtime threads stay free for timers and I/O.

use crate::core_modules::pixel::pixel::RawImage;
use crate::error::{NormalizeError, Result};
use crate::pipeline::{NormalizationPipeline, NormalizedImage, PipelineConfig};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task;

pub struct NormalizeTask {
    pub image: RawImage,
    pub result_sender: oneshot::Sender<Result<NormalizedImage>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<NormalizeTask>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers on the current tokio runtime.
    pub fn new(pipeline: NormalizationPipeline, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<NormalizeTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<NormalizeTask>())
            .unzip();

        // Spawn dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    tracing::warn!(worker = worker_idx, "worker stopped, task dropped");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        // Spawn workers
        let pipeline = Arc::new(pipeline);
        for (worker_idx, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker_pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                while let Some(NormalizeTask {
                    image,
                    result_sender,
                }) = worker_receiver.recv().await
                {
                    let result = task::spawn_blocking({
                        let pipeline = Arc::clone(&worker_pipeline);
                        move || pipeline.normalize(&image)
                    })
                    .await
                    .map_err(|e| {
                        NormalizeError::WorkerUnavailable(format!("normalization task failed: {e}"))
                    })
                    .and_then(|result| result);
                    if result_sender.send(result).is_err() {
                        tracing::debug!(worker = worker_idx, "caller went away before result");
                    }
                }
            });
        }

        tracing::info!(workers = worker_count, "normalization worker pool started");
        Self {
            task_sender,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub async fn process(&self, image: RawImage) -> Result<NormalizedImage> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = NormalizeTask {
            image,
            result_sender,
        };

        self.task_sender.send(task).map_err(|_| {
            NormalizeError::WorkerUnavailable("failed to send task to worker pool".into())
        })?;

        result_receiver.await.map_err(|_| {
            NormalizeError::WorkerUnavailable("failed to receive result from worker".into())
        })?
    }
}

pub struct ParallelPipeline {
    config: PipelineConfig,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// One worker per logical CPU.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_workers(config, num_cpus::get())
    }

    pub fn with_workers(config: PipelineConfig, worker_count: usize) -> Result<Self> {
        let pipeline = NormalizationPipeline::new(config.clone())?;
        Ok(Self {
            config,
            worker_pool: WorkerPool::new(pipeline, worker_count),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn process(&self, image: RawImage) -> Result<NormalizedImage> {
        self.worker_pool.process(image).await
    }

    /// Normalizes every image; the output order matches the input order.
    pub async fn process_batch(&self, images: Vec<RawImage>) -> Result<Vec<NormalizedImage>> {
        let batch_size = images.len();
        let results = join_all(images.into_iter().map(|image| self.process(image))).await;
        tracing::debug!(batch_size, "batch normalized");
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::Pixel;
    use std::time::Duration;

    const WHITE: Pixel = Pixel {
        red: 255,
        green: 255,
        blue: 255,
        alpha: 255,
    };

    fn bar_at(x: u32) -> RawImage {
        let mut image = RawImage::filled(120, 120, Pixel::new(0, 0, 0, 255));
        image.fill_rect(x, 20, 12, 80, WHITE);
        image
    }

    #[tokio::test]
    async fn single_image_matches_sequential_pipeline() {
        let parallel = ParallelPipeline::with_workers(PipelineConfig::default(), 2).expect("pool");
        let image = bar_at(40);
        let expected = NormalizationPipeline::default().normalize(&image).expect("normalize");
        assert_eq!(parallel.process(image).await.expect("process"), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn batch_keeps_input_order() {
        let parallel = ParallelPipeline::with_workers(PipelineConfig::default(), 3).expect("pool");
        let sequential = NormalizationPipeline::default();

        let mut images: Vec<RawImage> = (0..9).map(|i| bar_at(5 + i * 11)).collect();
        images.push(RawImage::filled(30, 30, Pixel::new(0, 0, 0, 0)));
        let expected: Vec<NormalizedImage> = images
            .iter()
            .map(|image| sequential.normalize(image).expect("normalize"))
            .collect();

        let results = parallel.process_batch(images).await.expect("batch");
        assert_eq!(results, expected);
        assert!(results[9].is_empty());
        for (i, result) in results[..9].iter().enumerate() {
            let region = result.source_region.expect("content found");
            assert!(region.min_x <= 5 + i as u32 * 11, "image {i} out of order");
        }
    }

    #[tokio::test]
    async fn runtime_stays_responsive_during_batch() {
        // Single-threaded runtime: timers only fire if workers never block it.
        let parallel =
            Arc::new(ParallelPipeline::with_workers(PipelineConfig::default(), 2).expect("pool"));
        let images: Vec<RawImage> = (0..2)
            .map(|i| {
                let mut image = RawImage::filled(2000, 2000, Pixel::new(0, 0, 0, 255));
                image.fill_rect(300 + i * 400, 200, 120, 1000, WHITE);
                image
            })
            .collect();

        let batch = tokio::spawn({
            let parallel = Arc::clone(&parallel);
            async move { parallel.process_batch(images).await }
        });

        let mut ticks = 0u32;
        while !batch.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
            ticks += 1;
        }
        let results = batch.await.expect("join").expect("batch");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_empty()));
        assert!(ticks >= 5, "timer ticked only {ticks} times while the batch ran");
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let parallel = ParallelPipeline::with_workers(PipelineConfig::default(), 1).expect("pool");
        assert!(parallel.process_batch(Vec::new()).await.expect("batch").is_empty());
    }

    #[tokio::test]
    async fn worker_count_is_at_least_one() {
        let parallel = ParallelPipeline::with_workers(PipelineConfig::default(), 0).expect("pool");
        assert_eq!(parallel.worker_count(), 1);
        let default_pool = ParallelPipeline::new(PipelineConfig::default()).expect("pool");
        assert_eq!(default_pool.worker_count(), num_cpus::get().max(1));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            target_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            ParallelPipeline::new(config),
            Err(NormalizeError::InvalidConfig(_))
        ));
    }
}
