//! Worker loop tests against the in-memory store and queue with fake media
//! collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use postvid_media::{
    MediaEditor, MediaError, MediaFetcher, MediaResult, MediaStorage, Narration, RenderProgress,
    RenderRequest, Renderer, SpeechSynthesizer, Translator,
};
use postvid_models::{
    CommentInput, Job, JobId, JobInput, JobStatus, Language, MediaSelector, RenderOptions,
    WorkerId,
};
use postvid_queue::{MemoryJobQueue, MemoryProgressChannel, ProgressChannel, QueueDispatcher};
use postvid_store::{JobStore, MemoryJobStore, StoreConfig};
use postvid_worker::{Collaborators, JobExecutor, RenderPipeline, RetryConfig, WorkerConfig};

const TEMPLATE: &str = "parkour.mp4";
const SOURCE_LENGTH: f64 = 30.0;

/// Narration length is one second per word.
#[derive(Default)]
struct FakeSpeech {
    calls: AtomicU32,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        _language: Language,
        out_dir: &Path,
    ) -> MediaResult<Narration> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Narration {
            audio: out_dir.join(format!("{}.mp3", text.len())),
            duration: text.split_whitespace().count() as f64,
        })
    }
}

struct FakeTranslator;

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, target: Language) -> MediaResult<String> {
        Ok(format!("[{}] {}", target.translation_code(), text))
    }
}

/// Fails the first `flaky` calls with a retryable error.
#[derive(Default)]
struct FakeFetcher {
    flaky: u32,
    terminal: bool,
    calls: AtomicU32,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    fn supports(&self, _url: &str) -> bool {
        true
    }

    async fn fetch(&self, _url: &str, dest_dir: &Path) -> MediaResult<PathBuf> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.terminal {
            return Err(MediaError::fetch_terminal("Private video"));
        }
        if call < self.flaky {
            return Err(MediaError::fetch_retryable("HTTP Error 503"));
        }
        let path = dest_dir.join("source.mp4");
        tokio::fs::write(&path, b"remote").await?;
        Ok(path)
    }
}

/// Comment text that makes the fake renderer panic.
const PANIC_MARKER: &str = "explode";

/// Records every render request and writes a placeholder output.
#[derive(Default)]
struct FakeRenderer {
    requests: Mutex<Vec<RenderRequest>>,
}

impl FakeRenderer {
    fn rendered(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        mut progress: RenderProgress,
    ) -> MediaResult<PathBuf> {
        if request
            .schedule
            .items
            .iter()
            .any(|item| item.comment.text.contains(PANIC_MARKER))
        {
            panic!("renderer crashed on {}", request.output.display());
        }
        progress.report(25.0);
        progress.report(75.0);
        tokio::fs::write(&request.output, b"render").await?;
        progress.finish();
        self.requests.lock().unwrap().push(request.clone());
        Ok(request.output.clone())
    }
}

#[derive(Default)]
struct FakeEditor {
    trims: Mutex<Vec<f64>>,
}

#[async_trait]
impl MediaEditor for FakeEditor {
    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        Ok(SOURCE_LENGTH)
    }

    async fn trim(&self, input: &Path, output: &Path, length: f64) -> MediaResult<()> {
        tokio::fs::copy(input, output).await?;
        self.trims.lock().unwrap().push(length);
        Ok(())
    }
}

/// One known template; outputs recorded in store order.
struct FakeStorage {
    template: PathBuf,
    stored: Mutex<Vec<JobId>>,
}

#[async_trait]
impl MediaStorage for FakeStorage {
    async fn template_exists(&self, name: &str) -> MediaResult<bool> {
        Ok(name == TEMPLATE)
    }

    async fn resolve_template(&self, name: &str) -> MediaResult<PathBuf> {
        if name == TEMPLATE {
            Ok(self.template.clone())
        } else {
            Err(MediaError::TemplateNotFound(name.to_string()))
        }
    }

    async fn store_output(&self, job_id: &JobId, path: &Path) -> MediaResult<String> {
        assert!(path.exists());
        self.stored.lock().unwrap().push(job_id.clone());
        Ok(format!("outputs/{}.mp4", job_id))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryJobQueue>,
    progress: Arc<MemoryProgressChannel>,
    speech: Arc<FakeSpeech>,
    fetcher: Arc<FakeFetcher>,
    renderer: Arc<FakeRenderer>,
    editor: Arc<FakeEditor>,
    storage: Arc<FakeStorage>,
    executor: Arc<JobExecutor>,
    runner: tokio::task::JoinHandle<()>,
}

fn test_config(work_dir: &Path, concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        work_dir: work_dir.to_path_buf(),
        dequeue_window: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(5),
        fetch_retry: RetryConfig::new("fetch_source")
            .with_base_delay(Duration::from_millis(5))
            .with_jitter(Duration::ZERO),
        ..WorkerConfig::default()
    }
}

impl Harness {
    fn start(concurrency: usize, fetcher: FakeFetcher, store_config: StoreConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join(TEMPLATE);
        std::fs::write(&template, b"template").unwrap();

        let store = Arc::new(MemoryJobStore::new(&store_config));
        let queue = Arc::new(MemoryJobQueue::new());
        let progress = Arc::new(MemoryProgressChannel::new());
        let speech = Arc::new(FakeSpeech::default());
        let fetcher = Arc::new(fetcher);
        let renderer = Arc::new(FakeRenderer::default());
        let editor = Arc::new(FakeEditor::default());
        let storage = Arc::new(FakeStorage {
            template,
            stored: Mutex::new(Vec::new()),
        });

        let config = test_config(&dir.path().join("work"), concurrency);
        let media = Collaborators {
            speech: speech.clone(),
            translator: Some(Arc::new(FakeTranslator)),
            fetcher: fetcher.clone(),
            renderer: renderer.clone(),
            editor: editor.clone(),
            storage: storage.clone(),
        };
        let pipeline = RenderPipeline::new(config.clone(), media, progress.clone());
        let executor = Arc::new(JobExecutor::new(
            config,
            store.clone(),
            queue.clone(),
            progress.clone(),
            pipeline,
        ));

        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor.run().await.unwrap();
            })
        };

        Self {
            _dir: dir,
            store,
            queue,
            progress,
            speech,
            fetcher,
            renderer,
            editor,
            storage,
            executor,
            runner,
        }
    }

    fn with_template(concurrency: usize) -> Self {
        Self::start(concurrency, FakeFetcher::default(), StoreConfig::default())
    }

    async fn submit(&self, input: JobInput) -> JobId {
        let job_id = self.store.submit(input).await.unwrap();
        self.queue.enqueue(&job_id).await.unwrap();
        job_id
    }

    async fn wait_terminal(&self, job_id: &JobId) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = self.store.get(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} stuck in {}",
                job_id,
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn stop(self) {
        self.executor.shutdown();
        tokio::time::timeout(Duration::from_secs(10), self.runner)
            .await
            .expect("executor did not stop")
            .unwrap();
    }
}

fn template_input(words: &[&str]) -> JobInput {
    JobInput::new(
        MediaSelector::template(TEMPLATE),
        words
            .iter()
            .enumerate()
            .map(|(i, text)| CommentInput::new(format!("user{i}"), *text))
            .collect(),
    )
}

#[tokio::test]
async fn test_job_completes_with_allocated_schedule() {
    let harness = Harness::with_template(1);
    // Narrations of 3, 2 and 4 seconds against a 7 second target
    let input = template_input(&["one two three", "four five", "six seven eight nine"])
        .with_options(RenderOptions {
            target_length_secs: Some(7),
            ..Default::default()
        });
    let job_id = harness.submit(input).await;

    let job = harness.wait_terminal(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.output_ref, Some(format!("outputs/{}.mp4", job_id)));
    assert!(job.error.is_none());
    assert!(job.lease.is_none());

    let rendered = harness.renderer.rendered();
    assert_eq!(rendered.len(), 1);
    let spans: Vec<(f64, f64)> = rendered[0]
        .schedule
        .items
        .iter()
        .map(|i| (i.start_time, i.duration))
        .collect();
    assert_eq!(spans, vec![(0.0, 3.0), (4.0, 2.0), (7.0, 4.0)]);
    assert_eq!(*harness.editor.trims.lock().unwrap(), vec![11.0]);

    assert_eq!(harness.progress.get(&job_id).await.unwrap(), None);
    harness.stop().await;
}

#[tokio::test]
async fn test_narration_stops_once_target_is_reached() {
    let harness = Harness::with_template(1);
    let input = template_input(&[
        "one two three",
        "four five",
        "six seven eight nine",
        "never narrated at all",
    ])
    .with_options(RenderOptions {
        target_length_secs: Some(7),
        ..Default::default()
    });
    let job_id = harness.submit(input).await;
    assert_eq!(harness.wait_terminal(&job_id).await.status, JobStatus::Completed);

    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 3);
    let rendered = harness.renderer.rendered();
    assert_eq!(rendered[0].schedule.items.len(), 3);
    assert_eq!(*harness.editor.trims.lock().unwrap(), vec![11.0]);
    harness.stop().await;
}

#[tokio::test]
async fn test_panicking_job_fails_and_loop_continues() {
    let harness = Harness::with_template(1);

    let crashing = harness.submit(template_input(&["this will explode"])).await;
    let healthy = harness.submit(template_input(&["calm and steady"])).await;

    let failed = harness.wait_terminal(&crashing).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("worker panicked"));
    assert!(failed.lease.is_none());
    assert!(failed.output_ref.is_none());

    let done = harness.wait_terminal(&healthy).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.lease.is_none());
    assert_eq!(*harness.storage.stored.lock().unwrap(), vec![healthy]);
    harness.stop().await;
}

#[tokio::test]
async fn test_single_worker_completes_in_submission_order() {
    let harness = Harness::with_template(1);

    let mut submitted = Vec::new();
    for i in 0..4 {
        let text = format!("comment number {i}");
        submitted.push(harness.submit(template_input(&[text.as_str()])).await);
    }
    for job_id in &submitted {
        assert_eq!(harness.wait_terminal(job_id).await.status, JobStatus::Completed);
    }

    assert_eq!(*harness.storage.stored.lock().unwrap(), submitted);
    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_template_fails_job_and_loop_continues() {
    let harness = Harness::with_template(1);

    let broken = harness
        .submit(JobInput::new(
            MediaSelector::template("missing.mp4"),
            vec![CommentInput::new("alice", "hello there")],
        ))
        .await;
    let healthy = harness.submit(template_input(&["still works"])).await;

    let failed = harness.wait_terminal(&broken).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("missing.mp4"));
    assert!(failed.output_ref.is_none());

    assert_eq!(harness.wait_terminal(&healthy).await.status, JobStatus::Completed);
    harness.stop().await;
}

#[tokio::test]
async fn test_duplicate_queue_entry_is_processed_once() {
    let harness = Harness::with_template(2);

    let job_id = harness.submit(template_input(&["only once"])).await;
    harness.queue.enqueue(&job_id).await.unwrap();
    harness.wait_terminal(&job_id).await;

    // Let the second entry be consumed and rejected
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.queue.len().await.unwrap() > 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.renderer.rendered().len(), 1);
    assert_eq!(harness.store.get(&job_id).await.unwrap().attempts, 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_title_and_translation_reach_renderer() {
    let harness = Harness::with_template(1);
    let input = template_input(&["bonjour"]).with_options(RenderOptions {
        language: Language::FrFr,
        title: Some("Best of the thread".to_string()),
        ..Default::default()
    });
    let job_id = harness.submit(input).await;
    assert_eq!(harness.wait_terminal(&job_id).await.status, JobStatus::Completed);

    let rendered = harness.renderer.rendered();
    let items = &rendered[0].schedule.items;
    assert_eq!(items.len(), 2);
    assert!(items[0].comment.is_title);
    assert_eq!(items[0].comment.text, "[fr] Best of the thread");
    assert_eq!(items[1].comment.text, "[fr] bonjour");
    harness.stop().await;
}

#[tokio::test]
async fn test_remote_source_retried_until_fetched() {
    let fetcher = FakeFetcher {
        flaky: 2,
        ..Default::default()
    };
    let harness = Harness::start(1, fetcher, StoreConfig::default());

    let job_id = harness
        .submit(JobInput::new(
            MediaSelector::remote("https://youtu.be/abc"),
            vec![CommentInput::new("alice", "nice clip")],
        ))
        .await;

    assert_eq!(harness.wait_terminal(&job_id).await.status, JobStatus::Completed);
    assert_eq!(harness.fetcher.calls.load(Ordering::SeqCst), 3);
    harness.stop().await;
}

#[tokio::test]
async fn test_terminal_fetch_error_is_not_retried() {
    let fetcher = FakeFetcher {
        terminal: true,
        ..Default::default()
    };
    let harness = Harness::start(1, fetcher, StoreConfig::default());

    let job_id = harness
        .submit(JobInput::new(
            MediaSelector::remote("https://youtu.be/private"),
            vec![CommentInput::new("alice", "nice clip")],
        ))
        .await;

    let job = harness.wait_terminal(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("Private video"));
    assert_eq!(harness.fetcher.calls.load(Ordering::SeqCst), 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_job_with_expired_lease_is_reclaimed() {
    let store_config = StoreConfig::default().with_lease_ttl(Duration::ZERO);
    let harness = Harness::start(1, FakeFetcher::default(), store_config);

    // A worker that claimed the job and then vanished
    let job_id = harness.store.submit(template_input(&["orphaned"])).await.unwrap();
    assert!(harness
        .store
        .claim(&job_id, &WorkerId::from("ghost"))
        .await
        .unwrap());
    harness.queue.enqueue(&job_id).await.unwrap();

    let job = harness.wait_terminal(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.attempts >= 2);
    harness.stop().await;
}

#[tokio::test]
async fn test_pending_jobs_recovered_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join(TEMPLATE);
    std::fs::write(&template, b"template").unwrap();

    // Submitted before any worker ran, never enqueued
    let store = Arc::new(MemoryJobStore::default());
    let job_id = store.submit(template_input(&["left behind"])).await.unwrap();

    let queue = Arc::new(MemoryJobQueue::new());
    let progress = Arc::new(MemoryProgressChannel::new());
    let config = test_config(&dir.path().join("work"), 1);
    let media = Collaborators {
        speech: Arc::new(FakeSpeech::default()),
        translator: None,
        fetcher: Arc::new(FakeFetcher::default()),
        renderer: Arc::new(FakeRenderer::default()),
        editor: Arc::new(FakeEditor::default()),
        storage: Arc::new(FakeStorage {
            template,
            stored: Mutex::new(Vec::new()),
        }),
    };
    let pipeline = RenderPipeline::new(config.clone(), media, progress.clone());
    let executor = Arc::new(JobExecutor::new(
        config,
        store.clone(),
        queue,
        progress,
        pipeline,
    ));
    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await.unwrap() })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !store.get(&job_id).await.unwrap().status.is_terminal() {
        assert!(tokio::time::Instant::now() < deadline, "pending job never recovered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.get(&job_id).await.unwrap().status, JobStatus::Completed);

    executor.shutdown();
    runner.await.unwrap();
}
