//! Job orchestrator.
//!
//! `submit` stores a queued job and spawns its pipeline; the pipeline runs
//! probe, schedule, graph, render and publish in order and ends in exactly one
//! terminal transition followed by at most one callback.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, error, Instrument};

use reelmix_media::{compile_graph, compute_schedule, Geometry, GraphParams, RenderRequest};
use reelmix_models::{CompletionNotification, Job, JobFailure, JobId, JobParameters, JobResult};
use reelmix_storage::dated_folder;

use crate::artifact::ArtifactGuard;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::repository::JobRepository;
use crate::stages::{DurationProbe, Notifier, Publisher, Renderer};

/// Progress reported when a job enters `processing`.
pub const PROGRESS_STARTED: u8 = 10;
/// Progress once the primary duration is known.
pub const PROGRESS_DURATION_KNOWN: u8 = 20;
/// Progress once schedule and graph are compiled.
pub const PROGRESS_COMPILED: u8 = 30;
/// Progress when FFmpeg starts.
pub const PROGRESS_RENDERING: u8 = 50;
/// Progress when FFmpeg finishes.
pub const PROGRESS_RENDERED: u8 = 80;
/// Progress when the composite is uploaded.
pub const PROGRESS_PUBLISHED: u8 = 95;

/// External stages the pipeline calls.
#[derive(Clone)]
pub struct Stages {
    pub probe: Arc<dyn DurationProbe>,
    pub renderer: Arc<dyn Renderer>,
    pub publisher: Arc<dyn Publisher>,
    pub notifier: Arc<dyn Notifier>,
}

/// Accepts jobs and drives each one to a terminal state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: WorkerConfig,
    repository: Arc<dyn JobRepository>,
    stages: Stages,
    render_slots: Semaphore,
}

impl Orchestrator {
    pub fn new(config: WorkerConfig, repository: Arc<dyn JobRepository>, stages: Stages) -> Self {
        let render_slots = Semaphore::new(config.max_concurrent_renders.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                repository,
                stages,
                render_slots,
            }),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Accept a job and start it in the background.
    ///
    /// Only the presence of the two mandatory asset references is checked
    /// here; everything else fails the job asynchronously.
    pub async fn submit(&self, parameters: JobParameters) -> WorkerResult<JobId> {
        parameters.assets()?;

        let job = Job::new(parameters);
        let id = job.id.clone();
        self.inner.repository.insert(job).await?;
        metrics::record_job_submitted();

        let inner = Arc::clone(&self.inner);
        let job_id = id.clone();
        tokio::spawn(async move { inner.run(job_id).await });

        Ok(id)
    }

    /// Current snapshot of a job.
    pub async fn get_status(&self, id: &JobId) -> WorkerResult<Job> {
        self.inner
            .repository
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(id.clone()))
    }
}

impl Inner {
    async fn run(self: Arc<Self>, id: JobId) {
        let logger = JobLogger::new(&id, "composite");
        let span = logger.create_span();

        async move {
            logger.log_start("composite pipeline");

            // The pipeline runs in its own task so a panic surfaces as a
            // JoinError instead of tearing down this one.
            let pipeline = Arc::clone(&self);
            let pipeline_id = id.clone();
            let pipeline_logger = logger.clone();
            let handle = tokio::spawn(
                async move { pipeline.execute(&pipeline_id, &pipeline_logger).await }
                    .in_current_span(),
            );

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(WorkerError::unexpected(format!(
                    "pipeline panicked: {}",
                    panic_message(e.into_panic())
                ))),
                Err(e) => Err(WorkerError::unexpected(format!("pipeline task failed: {}", e))),
            };

            self.finish(&id, outcome, &logger).await;
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, id: &JobId, logger: &JobLogger) -> WorkerResult<JobResult> {
        let job = self
            .transition(id, |job| job.start().with_progress(PROGRESS_STARTED))
            .await?;
        let started = Instant::now();
        let params = &job.parameters;

        let assets = params.assets()?;
        params.validate_timing()?;

        let duration = match params.duration {
            Some(fixed) => fixed,
            None => {
                let probe_started = Instant::now();
                let probed = self.stages.probe.probe(&assets.primary).await?;
                metrics::record_stage_duration("probe", probe_started.elapsed().as_secs_f64());
                probed
            }
        };
        if !duration.is_finite() || duration <= 0.0 {
            return Err(WorkerError::probe_failed(format!(
                "unusable primary duration {}",
                duration
            )));
        }
        self.progress(id, PROGRESS_DURATION_KNOWN, "duration", logger)
            .await?;

        let schedule = compute_schedule(duration, params.interval, params.insert_len)
            .map_err(WorkerError::from_schedule)?;
        let graph = compile_graph(
            &schedule,
            &GraphParams {
                fade_secs: params.fade_sec,
                insert_len: params.insert_len,
                geometry: Geometry {
                    width: params.width,
                    height: params.height,
                },
                frame_rate: params.frame_rate,
                source_count: assets.showcases.len(),
            },
        );
        debug!(
            insertions = schedule.len(),
            duration,
            "Schedule compiled"
        );
        self.progress(id, PROGRESS_COMPILED, "compiled", logger)
            .await?;

        let artifact = ArtifactGuard::new(self.config.artifact_path(id));

        let rendered = {
            let _slot = self
                .render_slots
                .acquire()
                .await
                .map_err(|_| WorkerError::unexpected("render slots closed"))?;
            self.progress(id, PROGRESS_RENDERING, "render", logger)
                .await?;

            let request = RenderRequest {
                primary: assets.primary.clone(),
                showcases: assets.showcases.clone(),
                graph,
                output: artifact.path().to_path_buf(),
                frame_rate: params.frame_rate,
                encoding: params.encoding.clone(),
                timeout: Some(self.config.render_timeout),
            };
            self.stages.renderer.render(request).await?
        };
        metrics::record_stage_duration("render", rendered.elapsed.as_secs_f64());
        self.progress(id, PROGRESS_RENDERED, "rendered", logger)
            .await?;

        let folder = dated_folder(&params.folder, job.created_at.date_naive());
        let public_id = format!("{}{}", params.public_id_prefix, id);
        let publish_started = Instant::now();
        let published = self
            .stages
            .publisher
            .publish(&rendered.path, &folder, &public_id)
            .await?;
        metrics::record_stage_duration("publish", publish_started.elapsed().as_secs_f64());
        self.progress(id, PROGRESS_PUBLISHED, "published", logger)
            .await?;

        Ok(JobResult {
            url: published.url,
            public_id: published.public_id,
            duration,
            schedule: schedule.into_vec(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Record the terminal state and send the one callback.
    async fn finish(&self, id: &JobId, outcome: WorkerResult<JobResult>, logger: &JobLogger) {
        let terminal = match outcome {
            Ok(result) => {
                let url = result.url.clone();
                let saved = self.transition(id, |job| job.complete(result)).await;
                if saved.is_ok() {
                    metrics::record_job_completed();
                    logger.log_completion(&format!("published {}", url));
                }
                saved
            }
            Err(err) => {
                let category = err.category();
                logger.log_error(&format!("{} ({})", err, category));
                let failure = JobFailure::new(category, err.details());
                let saved = self.transition(id, |job| job.fail(failure)).await;
                if saved.is_ok() {
                    metrics::record_job_failed(category);
                }
                saved
            }
        };

        match terminal {
            Ok(job) => self.notify(&job, logger).await,
            Err(e) => error!(job_id = %id, "Failed to record terminal state: {}", e),
        }
    }

    async fn notify(&self, job: &Job, logger: &JobLogger) {
        let Some(target) = job.parameters.callback_target() else {
            debug!(job_id = %job.id, "No callback target configured");
            return;
        };
        let Some(notification) = CompletionNotification::from_job(job) else {
            return;
        };

        let send = self.stages.notifier.notify(target, &notification);
        match tokio::time::timeout(self.config.callback_timeout, send).await {
            Ok(Ok(())) => {
                metrics::record_callback("delivered");
                debug!(job_id = %job.id, "Callback delivered");
            }
            Ok(Err(e)) => {
                metrics::record_callback("rejected");
                logger.log_warning(&format!("callback not delivered: {}", e));
            }
            Err(_) => {
                metrics::record_callback("timeout");
                logger.log_warning(&format!(
                    "callback abandoned after {:?}",
                    self.config.callback_timeout
                ));
            }
        }
    }

    /// Apply a transition to the stored record and return the new snapshot.
    async fn transition<F>(&self, id: &JobId, apply: F) -> WorkerResult<Job>
    where
        F: FnOnce(Job) -> Job,
    {
        let job = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(id.clone()))?;
        let updated = apply(job);
        self.repository.save(updated.clone()).await?;
        Ok(updated)
    }

    async fn progress(&self, id: &JobId, progress: u8, stage: &str, logger: &JobLogger) -> WorkerResult<()> {
        self.transition(id, |job| job.with_progress(progress)).await?;
        logger.log_stage(stage, progress);
        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use reelmix_media::{NodeKind, RenderOutput};
    use reelmix_models::{ErrorCategory, JobStatus};
    use reelmix_storage::PublishedAsset;

    use crate::repository::InMemoryJobRepository;

    struct FixedProbe(f64);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn probe(&self, _asset: &str) -> WorkerResult<f64> {
            Ok(self.0)
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl DurationProbe for FailingProbe {
        async fn probe(&self, _asset: &str) -> WorkerResult<f64> {
            Err(WorkerError::probe_failed("no duration"))
        }
    }

    #[derive(Clone, Copy)]
    enum RenderMode {
        Succeed,
        Fail,
        Panic,
    }

    /// Writes a small artifact, then succeeds, fails or panics.
    struct FakeRenderer {
        mode: RenderMode,
        requests: Mutex<Vec<RenderRequest>>,
    }

    impl FakeRenderer {
        fn new(mode: RenderMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, request: RenderRequest) -> WorkerResult<RenderOutput> {
            std::fs::write(&request.output, b"fake mp4")?;
            let path = request.output.clone();
            self.requests.lock().unwrap().push(request);
            match self.mode {
                RenderMode::Succeed => Ok(RenderOutput {
                    path,
                    size_bytes: 8,
                    elapsed: Duration::from_millis(5),
                }),
                RenderMode::Fail => Err(WorkerError::render_failed(
                    "FFmpeg exited with status 1",
                    Some("Error while filtering".into()),
                )),
                RenderMode::Panic => panic!("renderer bug"),
            }
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        calls: Mutex<Vec<(PathBuf, String, String, bool)>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(
            &self,
            artifact: &Path,
            folder: &str,
            public_id: &str,
        ) -> WorkerResult<PublishedAsset> {
            self.calls.lock().unwrap().push((
                artifact.to_path_buf(),
                folder.to_string(),
                public_id.to_string(),
                artifact.exists(),
            ));
            if self.fail {
                return Err(WorkerError::publish_failed("403 Forbidden"));
            }
            let key = format!("{}/{}.mp4", folder, public_id);
            Ok(PublishedAsset {
                url: format!("https://cdn.example.com/{}", key),
                public_id: public_id.to_string(),
                key,
                bytes: 8,
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, CompletionNotification)>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, target: &str, notification: &CompletionNotification) -> WorkerResult<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), notification.clone()));
            Ok(())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        renderer: Arc<FakeRenderer>,
        publisher: Arc<FakePublisher>,
        notifier: Arc<RecordingNotifier>,
        work_dir: tempfile::TempDir,
    }

    fn harness_with(
        probe: Arc<dyn DurationProbe>,
        renderer: Arc<FakeRenderer>,
        publisher: FakePublisher,
        notifier: RecordingNotifier,
    ) -> Harness {
        let work_dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            work_dir: work_dir.path().to_path_buf(),
            callback_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let publisher = Arc::new(publisher);
        let notifier = Arc::new(notifier);
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(InMemoryJobRepository::new()),
            Stages {
                probe,
                renderer: renderer.clone(),
                publisher: publisher.clone(),
                notifier: notifier.clone(),
            },
        );
        Harness {
            orchestrator,
            renderer,
            publisher,
            notifier,
            work_dir,
        }
    }

    fn harness(duration: f64, mode: RenderMode) -> Harness {
        harness_with(
            Arc::new(FixedProbe(duration)),
            FakeRenderer::new(mode),
            FakePublisher::default(),
            RecordingNotifier::default(),
        )
    }

    async fn wait_terminal(orchestrator: &Orchestrator, id: &JobId) -> Job {
        for _ in 0..200 {
            let job = orchestrator.get_status(id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", id);
    }

    /// Wait until the callback for a terminal job has been attempted.
    async fn wait_callbacks(notifier: &RecordingNotifier, expected: usize) {
        for _ in 0..100 {
            if notifier.sent.lock().unwrap().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn params() -> JobParameters {
        JobParameters::new("https://assets.example.com/main.mp4", "https://assets.example.com/s1.mp4")
            .with_callback("https://hooks.example.com/reel")
    }

    #[tokio::test]
    async fn test_successful_job_publishes_and_notifies() {
        let h = harness(20.0, RenderMode::Succeed);
        let mut params = params();
        params.public_id_prefix = "promo_".into();
        params.folder = "reels".into();

        let id = h.orchestrator.submit(params).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        let result = job.result.clone().unwrap();
        assert_eq!(result.schedule, vec![7.0, 14.0, 17.0]);
        assert_eq!(result.duration, 20.0);
        assert_eq!(result.public_id, format!("promo_{}", id));
        assert!(result.elapsed_secs >= 0.0);

        let calls = h.publisher.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let (artifact, folder, _, existed) = &calls[0];
        assert!(existed, "artifact must exist while publishing");
        assert!(folder.starts_with("reels/"));
        assert_eq!(folder.split('/').count(), 4);
        assert!(!artifact.exists(), "artifact must be removed afterwards");

        wait_callbacks(&h.notifier, 1).await;
        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://hooks.example.com/reel");
        assert_eq!(sent[0].1.result.as_ref().unwrap().url, result.url);
    }

    #[tokio::test]
    async fn test_render_failure_is_recorded_and_cleaned_up() {
        let h = harness(20.0, RenderMode::Fail);
        let id = h.orchestrator.submit(params()).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        assert_eq!(job.status, JobStatus::Failed);
        let failure = job.failure.clone().unwrap();
        assert_eq!(failure.category, ErrorCategory::RenderFailed);
        assert!(failure.details.contains("Error while filtering"));
        assert!(job.result.is_none());

        assert!(h.publisher.calls.lock().unwrap().is_empty());
        assert!(!h.orchestrator.config().artifact_path(&id).exists());

        wait_callbacks(&h.notifier, 1).await;
        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1.error.as_ref().unwrap().category,
            ErrorCategory::RenderFailed
        );
    }

    #[tokio::test]
    async fn test_slow_callback_does_not_change_status() {
        let h = harness_with(
            Arc::new(FixedProbe(20.0)),
            FakeRenderer::new(RenderMode::Fail),
            FakePublisher::default(),
            RecordingNotifier {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        );
        let id = h.orchestrator.submit(params()).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;
        assert_eq!(job.status, JobStatus::Failed);

        // Past the 200ms callback bound the send is abandoned.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        let later = h.orchestrator.get_status(&id).await.unwrap();
        assert_eq!(later, job);
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_unexpected_failure() {
        let h = harness(20.0, RenderMode::Panic);
        let id = h.orchestrator.submit(params()).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        let failure = job.failure.unwrap();
        assert_eq!(failure.category, ErrorCategory::UnexpectedFailure);
        assert!(failure.details.contains("renderer bug"));
        assert!(!h.orchestrator.config().artifact_path(&id).exists());
    }

    #[tokio::test]
    async fn test_probe_failure() {
        let h = harness_with(
            Arc::new(FailingProbe),
            FakeRenderer::new(RenderMode::Succeed),
            FakePublisher::default(),
            RecordingNotifier::default(),
        );
        let id = h.orchestrator.submit(params()).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        assert_eq!(
            job.failure.unwrap().category,
            ErrorCategory::DurationProbeFailed
        );
        assert!(h.renderer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_probe_result_fails_probe_stage() {
        let h = harness(0.0, RenderMode::Succeed);
        let id = h.orchestrator.submit(params()).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;
        assert_eq!(
            job.failure.unwrap().category,
            ErrorCategory::DurationProbeFailed
        );
    }

    #[tokio::test]
    async fn test_publish_failure() {
        let h = harness_with(
            Arc::new(FixedProbe(20.0)),
            FakeRenderer::new(RenderMode::Succeed),
            FakePublisher {
                fail: true,
                ..Default::default()
            },
            RecordingNotifier::default(),
        );
        let id = h.orchestrator.submit(params()).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        let failure = job.failure.unwrap();
        assert_eq!(failure.category, ErrorCategory::PublishFailed);
        assert!(failure.details.contains("403"));
        assert!(!h.orchestrator.config().artifact_path(&id).exists());
    }

    #[tokio::test]
    async fn test_invalid_timing_fails_job() {
        let h = harness(20.0, RenderMode::Succeed);
        let id = h
            .orchestrator
            .submit(params().with_timing(0.0, 3.0, 0.5))
            .await
            .unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;
        assert_eq!(job.failure.unwrap().category, ErrorCategory::InvalidConfig);
    }

    #[tokio::test]
    async fn test_missing_input_rejected_synchronously() {
        let h = harness(20.0, RenderMode::Succeed);
        let params = JobParameters {
            primary_asset_ref: Some("main.mp4".into()),
            ..Default::default()
        };

        let err = h.orchestrator.submit(params).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MissingInput);
        assert_eq!(h.orchestrator.inner.repository.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let h = harness(20.0, RenderMode::Succeed);
        assert!(matches!(
            h.orchestrator.get_status(&JobId::new()).await,
            Err(WorkerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fixed_duration_skips_probe() {
        let h = harness_with(
            Arc::new(FailingProbe),
            FakeRenderer::new(RenderMode::Succeed),
            FakePublisher::default(),
            RecordingNotifier::default(),
        );
        let id = h
            .orchestrator
            .submit(params().with_fixed_duration(10.0))
            .await
            .unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().schedule, vec![7.0]);
    }

    #[tokio::test]
    async fn test_render_request_wiring() {
        let h = harness(20.0, RenderMode::Succeed);
        let id = h
            .orchestrator
            .submit(params().with_second_showcase("https://assets.example.com/s2.mp4"))
            .await
            .unwrap();
        wait_terminal(&h.orchestrator, &id).await;

        let requests = h.renderer.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.showcases.len(), 2);
        assert_eq!(request.output, h.work_dir.path().join(format!("{}.mp4", id)));
        assert_eq!(request.graph.overlay_nodes().count(), 3);
        assert!(!request
            .graph
            .nodes()
            .iter()
            .any(|n| n.kind == NodeKind::SourceSplit));
    }

    #[tokio::test]
    async fn test_no_callback_without_target() {
        let h = harness(20.0, RenderMode::Succeed);
        let params = JobParameters::new("main.mp4", "s1.mp4");
        let id = h.orchestrator.submit(params).await.unwrap();
        let job = wait_terminal(&h.orchestrator, &id).await;

        assert_eq!(job.status, JobStatus::Completed);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_all_finish() {
        let h = harness(45.0, RenderMode::Succeed);
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(h.orchestrator.submit(params()).await.unwrap());
        }
        for id in &ids {
            let job = wait_terminal(&h.orchestrator, id).await;
            assert_eq!(job.status, JobStatus::Completed);
        }
        wait_callbacks(&h.notifier, 5).await;
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 5);
    }
}
