//! Background execution of pipeline runs.
//!
//! Projects are queued on a bounded channel. A runner task drains it and
//! spawns each run once a semaphore permit is free, so at most `workers`
//! projects are processed at a time. Run outcomes are written to the
//! terrain document by the pipeline itself; the worker only has to record
//! runs that panicked.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt as _;
use terrain_etl_terrain_models::{LayerStatus, ProjectRef};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::EtlError;
use crate::pipeline::TerrainPipeline;

pub struct EtlWorker {
    sender: mpsc::Sender<ProjectRef>,
    runner: tokio::task::JoinHandle<usize>,
}

impl EtlWorker {
    /// Starts the runner task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(pipeline: Arc<TerrainPipeline>, workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let runner = tokio::spawn(drain(pipeline, receiver, workers.max(1)));
        log::info!("ETL worker started ({workers} workers, queue {queue_capacity})");
        Self { sender, runner }
    }

    /// Queues a project, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::WorkerClosed`] if the runner has stopped.
    pub async fn submit(&self, project: ProjectRef) -> Result<(), EtlError> {
        let project_id = project.project_id.clone();
        self.sender
            .send(project)
            .await
            .map_err(|_| EtlError::WorkerClosed)?;
        log::debug!("Queued terrain pipeline for project {project_id}");
        Ok(())
    }

    /// Stops accepting jobs and waits for every queued and running job.
    ///
    /// Returns the number of jobs that were run.
    pub async fn shutdown(self) -> usize {
        drop(self.sender);
        match self.runner.await {
            Ok(completed) => {
                log::info!("ETL worker drained ({completed} jobs)");
                completed
            }
            Err(e) => {
                log::error!("ETL worker runner failed: {e}");
                0
            }
        }
    }
}

async fn drain(
    pipeline: Arc<TerrainPipeline>,
    mut receiver: mpsc::Receiver<ProjectRef>,
    workers: usize,
) -> usize {
    let permits = Arc::new(Semaphore::new(workers));
    let mut jobs = JoinSet::new();
    let mut completed = 0;

    while let Some(project) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let pipeline = pipeline.clone();
        jobs.spawn(async move {
            run_job(&pipeline, project).await;
            drop(permit);
        });
        while jobs.try_join_next().is_some() {
            completed += 1;
        }
    }

    while jobs.join_next().await.is_some() {
        completed += 1;
    }
    completed
}

async fn run_job(pipeline: &TerrainPipeline, project: ProjectRef) {
    let project_id = project.project_id.as_str();
    match AssertUnwindSafe(pipeline.run(&project)).catch_unwind().await {
        Ok(Ok(outcomes)) => {
            log::info!(
                "Background ETL finished for project {project_id} ({} layers)",
                outcomes.len()
            );
        }
        Ok(Err(e)) => log::warn!("Background ETL failed for project {project_id}: {e}"),
        Err(_) => {
            log::error!("Background ETL panicked for project {project_id}");
            let status = LayerStatus::failed("pipeline run panicked", Utc::now());
            if let Err(e) = pipeline
                .repository()
                .set_pipeline_status(project_id, &status)
                .await
            {
                log::error!("Could not record panic for project {project_id}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use terrain_etl_terrain_models::LayerState;

    use super::*;
    use crate::dem::tests::project_polygon;
    use crate::pipeline::tests::{project, usa_fixture};

    #[tokio::test]
    async fn drains_every_submitted_job() {
        let fixture = usa_fixture("worker_drain").await;
        let pipeline = Arc::new(fixture.pipeline.clone());
        let worker = EtlWorker::start(pipeline, 2, 1);

        for id in ["a", "b", "c"] {
            worker.submit(project(id, project_polygon())).await.unwrap();
        }
        worker
            .submit(project("bad", json!({"type": "Point", "coordinates": [0.0, 0.0]})))
            .await
            .unwrap();

        assert_eq!(worker.shutdown().await, 4);

        let mut ok = 0;
        for id in ["a", "b", "c"] {
            let doc = fixture.repo.get(id).await.unwrap().unwrap();
            assert_eq!(doc.etl_layers["dem"].status, LayerState::Ok);
            assert!(doc.pipeline.is_some());
            if doc.pipeline.unwrap().status == LayerState::Ok {
                ok += 1;
            }
        }
        // The first land cover fetch is forced to fail.
        assert_eq!(ok, 2);

        let bad = fixture.repo.get("bad").await.unwrap().unwrap();
        assert_eq!(bad.pipeline.unwrap().status, LayerState::Failed);
    }

    #[tokio::test]
    async fn closed_worker_rejects_jobs() {
        let fixture = usa_fixture("worker_closed").await;
        let mut worker = EtlWorker::start(Arc::new(fixture.pipeline.clone()), 1, 1);
        worker.runner.abort();
        let _ = (&mut worker.runner).await;

        let err = worker.submit(project("late", project_polygon())).await.unwrap_err();
        assert!(matches!(err, EtlError::WorkerClosed));
    }
}
