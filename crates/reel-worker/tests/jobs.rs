//! Plan and render jobs driven end to end against the fake media backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reel_media::backend::testing::{write_fake_video, FakeBackend};
use reel_media::{Engine, EngineConfig, MediaInfo};
use reel_models::{ConcatMode, RenderParams, SegmentDescriptor, TaskId, TaskState};
use reel_queue::{InMemoryTaskQueue, PlanJob, QueueJob, RenderJob, TaskQueue};
use reel_worker::{
    process_job, InMemoryTaskStore, JobExecutor, ProcessingContext, QueueBackend,
    TaskStateStore, WorkerConfig,
};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    backend: Arc<FakeBackend>,
    store: Arc<InMemoryTaskStore>,
    ctx: ProcessingContext,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let config = EngineConfig::default()
            .with_tasks_root(dir.path().join("tasks"))
            .with_seed(42);
        let engine = Engine::new(backend.clone(), config);
        let store = Arc::new(InMemoryTaskStore::new());
        let ctx = ProcessingContext::new(engine, store.clone());
        Self {
            dir,
            backend,
            store,
            ctx,
        }
    }

    fn video(&self, name: &str, w: u32, h: u32, duration: f64) -> String {
        let path = self.dir.path().join(name);
        write_fake_video(&path, w, h, duration).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn narration(&self, duration: f64) -> String {
        let path = self.dir.path().join("voice.mp3");
        std::fs::write(&path, b"voice").unwrap();
        self.backend.add_media(&path, MediaInfo::audio(duration));
        path.to_string_lossy().into_owned()
    }

    fn task_dir(&self, task: &str) -> PathBuf {
        self.dir.path().join("tasks").join(task)
    }
}

#[tokio::test]
async fn plan_then_full_render() {
    let h = Harness::new();
    let task = TaskId::from("task-a");
    let narration = h.narration(12.0);
    let plan = PlanJob::new(
        task.clone(),
        vec![
            h.video("clip1.mp4", 1920, 1080, 10.0),
            h.video("clip2.mp4", 1080, 1920, 8.0),
        ],
    )
    .with_narration(&narration)
    .with_concat_mode(ConcatMode::Sequential)
    .with_max_clip_duration(5.0);

    process_job(&h.ctx, &QueueJob::Plan(plan)).await.unwrap();

    let snap = h.store.get(&task).await.unwrap().unwrap();
    assert_eq!(snap.state, TaskState::Completed);
    assert_eq!(snap.segments.len(), 3);
    assert_eq!(snap.audio_duration, Some(15.0));
    assert!(h.task_dir("task-a").join("segments.json").is_file());
    for segment in &snap.segments {
        let thumb = h
            .task_dir("task-a")
            .join("thumbs")
            .join(format!("{}.jpg", segment.segment_id));
        assert!(thumb.is_file(), "missing {}", thumb.display());
    }

    let render = RenderJob::new(task.clone(), RenderParams::default()).with_narration(&narration);
    process_job(&h.ctx, &QueueJob::Render(render)).await.unwrap();

    let snap = h.store.get(&task).await.unwrap().unwrap();
    assert_eq!(snap.state, TaskState::Completed);
    assert_eq!(snap.progress, 100);
    let final_path = h.task_dir("task-a").join("final-1.mp4");
    assert_eq!(snap.videos, vec![final_path.display().to_string()]);
    assert!(final_path.is_file());
    assert!(h.task_dir("task-a").join("combined-1.mp4").is_file());
}

#[tokio::test]
async fn single_segment_render_is_a_preview() {
    let h = Harness::new();
    let task = TaskId::from("task-b");
    let clip = h.video("clip.mp4", 1080, 1920, 6.0);
    let segment = SegmentDescriptor::new("seg-1-0a0b0c0d", 1, clip, 0.0, 4.0);
    let render = RenderJob::new(task.clone(), RenderParams::default()).with_segments(vec![segment]);

    process_job(&h.ctx, &QueueJob::Render(render)).await.unwrap();

    let snap = h.store.get(&task).await.unwrap().unwrap();
    let preview = h.task_dir("task-b").join("preview-seg-1-0a0b0c0d.mp4");
    assert_eq!(snap.combined_videos, vec![preview.display().to_string()]);
    assert!(snap.videos.is_empty());
    assert!(preview.is_file());
    assert!(!h.task_dir("task-b").join("final-1.mp4").exists());
}

#[tokio::test]
async fn edited_full_render_replaces_saved_timeline() {
    let h = Harness::new();
    let task = TaskId::from("task-edit");
    let narration = h.narration(12.0);
    let plan = PlanJob::new(task.clone(), vec![h.video("clip1.mp4", 1920, 1080, 10.0)])
        .with_narration(&narration)
        .with_max_clip_duration(5.0);
    process_job(&h.ctx, &QueueJob::Plan(plan)).await.unwrap();
    assert_eq!(h.ctx.engine.load_segments(&task).await.unwrap().len(), 3);

    let clip = h.video("clip2.mp4", 1080, 1920, 8.0);
    let edited = vec![
        SegmentDescriptor::new("seg-2-bbbbbbbb", 2, clip.clone(), 2.0, 4.5),
        SegmentDescriptor::new("seg-1-aaaaaaaa", 1, clip, 0.0, 2.0),
    ];
    let render = RenderJob::new(task.clone(), RenderParams::default())
        .with_segments(edited.clone())
        .with_narration(&narration);
    process_job(&h.ctx, &QueueJob::Render(render)).await.unwrap();

    let saved = h.ctx.engine.load_segments(&task).await.unwrap();
    let ids: Vec<&str> = saved.iter().map(|s| s.segment_id.as_str()).collect();
    assert_eq!(ids, ["seg-1-aaaaaaaa", "seg-2-bbbbbbbb"]);
    let raw = std::fs::read_to_string(h.task_dir("task-edit").join("segments.json")).unwrap();
    assert!(raw.contains("seg-2-bbbbbbbb"));

    let snap = h.store.get(&task).await.unwrap().unwrap();
    assert_eq!(snap.state, TaskState::Completed);
    assert_eq!(snap.audio_duration, Some(4.5));
    assert_eq!(snap.segments, saved);
}

#[tokio::test]
async fn edited_preview_replaces_only_named_segment() {
    let h = Harness::new();
    let task = TaskId::from("task-tweak");
    let plan = PlanJob::new(task.clone(), vec![h.video("clip1.mp4", 1920, 1080, 10.0)])
        .with_target_duration(10.0)
        .with_max_clip_duration(5.0);
    process_job(&h.ctx, &QueueJob::Plan(plan)).await.unwrap();
    let planned = h.ctx.engine.load_segments(&task).await.unwrap();
    assert_eq!(planned.len(), 2);

    let mut tweak = planned[1].clone();
    tweak.end = tweak.start + 3.0;
    tweak.duration = 3.0;
    let render = RenderJob::new(task.clone(), RenderParams::default()).with_segments(vec![tweak.clone()]);
    process_job(&h.ctx, &QueueJob::Render(render)).await.unwrap();

    let saved = h.ctx.engine.load_segments(&task).await.unwrap();
    assert_eq!(saved, vec![planned[0].clone(), tweak]);
    let snap = h.store.get(&task).await.unwrap().unwrap();
    assert_eq!(snap.audio_duration, Some(8.0));
}

#[tokio::test]
async fn full_render_uses_task_directory_audio_and_subtitles() {
    let h = Harness::new();
    let task = TaskId::from("task-files");
    let task_dir = h.task_dir("task-files");
    std::fs::create_dir_all(&task_dir).unwrap();
    let audio = task_dir.join("audio.mp3");
    std::fs::write(&audio, b"voice").unwrap();
    h.backend.add_media(&audio, MediaInfo::audio(4.0));
    std::fs::write(
        task_dir.join("subtitle.srt"),
        "1\n00:00:00,000 --> 00:00:02,000\nHello there\n\n",
    )
    .unwrap();

    let clip = h.video("clip.mp4", 1080, 1920, 8.0);
    let segments = vec![
        SegmentDescriptor::new("seg-1-aaaaaaaa", 1, clip.clone(), 0.0, 2.0),
        SegmentDescriptor::new("seg-2-bbbbbbbb", 2, clip, 2.0, 4.0),
    ];
    let render = RenderJob::new(task.clone(), RenderParams::default()).with_segments(segments);
    process_job(&h.ctx, &QueueJob::Render(render)).await.unwrap();

    let final_path = task_dir.join("final-1.mp4");
    assert!(final_path.is_file());
    let encodes = h.backend.encodes();
    let mux = encodes.iter().find(|e| e.output == final_path).unwrap();
    assert!(mux.inputs.contains(&audio));
    assert!(mux.has_audio);
    assert!(mux.filter_complex.contains("drawtext"));
}

async fn wait_for_terminal(store: &InMemoryTaskStore, task: &TaskId) -> reel_models::TaskSnapshot {
    for _ in 0..200 {
        if let Some(snap) = store.get(task).await.unwrap() {
            if snap.state.is_terminal() {
                return snap;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("task {} never finished", task);
}

#[tokio::test]
async fn executor_marks_failed_jobs_and_parks_them() {
    let h = Harness::new();
    let queue = Arc::new(InMemoryTaskQueue::new());
    let config = WorkerConfig {
        consume_block_ms: 20,
        max_retries: 0,
        shutdown_timeout: Duration::from_secs(5),
        queue_backend: QueueBackend::Memory,
        ..WorkerConfig::default()
    };
    let executor = Arc::new(JobExecutor::new(config, queue.clone(), h.ctx.clone()));
    let runner = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.run().await })
    };

    let broken = TaskId::from("task-broken");
    queue
        .enqueue(PlanJob::new(broken.clone(), vec!["/nowhere/a.mp4".into()]).with_target_duration(5.0).into())
        .await
        .unwrap();
    let good = TaskId::from("task-good");
    queue
        .enqueue(
            PlanJob::new(good.clone(), vec![h.video("a.mp4", 854, 480, 9.0)])
                .with_target_duration(5.0)
                .into(),
        )
        .await
        .unwrap();

    let failed = wait_for_terminal(&h.store, &broken).await;
    assert_eq!(failed.state, TaskState::Failed);
    assert!(failed.error.unwrap().contains("No materials"));
    let done = wait_for_terminal(&h.store, &good).await;
    assert_eq!(done.state, TaskState::Completed);

    executor.shutdown();
    runner.await.unwrap().unwrap();
    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].0.task_id(), &broken);
    assert!(queue.is_empty().await.unwrap());
    assert!(!Path::new(&h.task_dir("task-broken").join("segments.json")).exists());
}
