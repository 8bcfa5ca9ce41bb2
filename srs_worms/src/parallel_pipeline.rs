// THEORY:
// `ParallelPipeline` processes the subfolders of an experiment concurrently.
// A dispatcher task hands subfolder jobs round-robin to a fixed set of worker
// tasks; each worker runs the CPU-heavy tile work on tokio's blocking pool and
// answers through the job's oneshot channel. The caller awaits the answers in
// subfolder order, so reports come back in the same order as the sequential
// pipeline no matter which worker finishes first.

use crate::core_modules::field_norm::FieldNormalizer;
use crate::core_modules::layout::{Experiment, ImageSubfolder, ProjectLayout};
use crate::error::Result;
use crate::pipeline::{
    ExperimentReport, PipelineConfig, ProjectReport, SubfolderOutcome, input_subfolders,
    load_normalizer, process_subfolder,
};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub struct SubfolderTask {
    pub subfolder: ImageSubfolder,
    pub output_dir: PathBuf,
    pub normalizer: Arc<FieldNormalizer>,
    pub result_sender: oneshot::Sender<SubfolderOutcome>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<SubfolderTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(config: PipelineConfig, num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<SubfolderTask>();
        let mut workers = Vec::with_capacity(num_workers);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..num_workers)
            .map(|_| mpsc::unbounded_channel::<SubfolderTask>())
            .unzip();

        // Dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % num_workers;
            }
        });

        for (id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker_config = config.clone();
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    debug!(
                        worker = id,
                        subfolder = %task.subfolder.name,
                        "worker picked up subfolder"
                    );
                    let outcome = Self::process_task_worker(&worker_config, &task).await;
                    let _ = task.result_sender.send(outcome);
                }
            });
            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    async fn process_task_worker(
        config: &PipelineConfig,
        task: &SubfolderTask,
    ) -> SubfolderOutcome {
        let config = config.clone();
        let normalizer = Arc::clone(&task.normalizer);
        let subfolder = task.subfolder.clone();
        let output_dir = task.output_dir.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let result = process_subfolder(&config, &normalizer, &subfolder, &output_dir);
            SubfolderOutcome::from_result(&subfolder, result)
        })
        .await;

        joined.unwrap_or_else(|e| SubfolderOutcome::Failed {
            subfolder: task.subfolder.name.clone(),
            error: format!("worker task failed: {e}"),
        })
    }

    /// Queues one subfolder and returns the receiver for its outcome.
    pub fn submit(
        &self,
        subfolder: ImageSubfolder,
        output_dir: PathBuf,
        normalizer: Arc<FieldNormalizer>,
    ) -> oneshot::Receiver<SubfolderOutcome> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = SubfolderTask {
            subfolder,
            output_dir,
            normalizer,
            result_sender,
        };
        // A closed channel drops the task, and its sender with it; the receiver reports that.
        let _ = self.task_sender.send(task);
        result_receiver
    }
}

pub struct ParallelPipeline {
    config: PipelineConfig,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// Must be called inside a tokio runtime.
    pub fn new(config: PipelineConfig, num_workers: usize) -> Self {
        let worker_pool = WorkerPool::new(config.clone(), num_workers);
        Self { config, worker_pool }
    }

    /// One worker per logical CPU.
    pub fn with_default_workers(config: PipelineConfig) -> Self {
        Self::new(config, num_cpus::get())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn num_workers(&self) -> usize {
        self.worker_pool.num_workers()
    }

    pub async fn process_experiment(&self, experiment: &Experiment) -> Result<ExperimentReport> {
        info!(
            experiment = %experiment.name,
            workers = self.num_workers(),
            "processing experiment in parallel"
        );
        let config = self.config.clone();
        let exp = experiment.clone();
        let normalizer = tokio::task::spawn_blocking(move || load_normalizer(&config, &exp))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        let normalizer = Arc::new(normalizer);

        let output_dir = self.config.output_dir(experiment);
        tokio::fs::create_dir_all(&output_dir).await?;

        let subfolders = input_subfolders(&self.config, experiment);
        let receivers: Vec<_> = subfolders
            .iter()
            .map(|sub| {
                self.worker_pool
                    .submit((*sub).clone(), output_dir.clone(), Arc::clone(&normalizer))
            })
            .collect();

        let outcomes = join_all(receivers)
            .await
            .into_iter()
            .zip(&subfolders)
            .map(|(received, sub)| {
                received.unwrap_or_else(|_| SubfolderOutcome::Failed {
                    subfolder: sub.name.clone(),
                    error: "worker pool shut down".to_string(),
                })
            })
            .collect();

        Ok(ExperimentReport {
            experiment: experiment.name.clone(),
            output_dir,
            outcomes,
        })
    }

    pub async fn process_project(&self, layout: &ProjectLayout) -> ProjectReport {
        let mut report = ProjectReport::default();
        for experiment in &layout.experiments {
            match self.process_experiment(experiment).await {
                Ok(r) => report.experiments.push(r),
                Err(e) => {
                    error!(experiment = %experiment.name, error = %e, "experiment failed");
                    report.failed_experiments.push((experiment.name.clone(), e.to_string()));
                }
            }
        }
        info!(
            processed = report.processed(),
            failed = report.failed(),
            failed_experiments = report.failed_experiments.len(),
            "project done"
        );
        report
    }
}
