use std::path::Path;

use reel_media::command::{check_ffmpeg, check_ffprobe};
use reel_worker::{QueueBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "reel-selfcheck: tasks_root={}",
        config.engine.tasks_root.display()
    );
    ensure_dir(&config.engine.tasks_root).await?;
    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!(
        "reel-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    for dir in [&config.engine.music_dir, &config.engine.font_dir]
        .into_iter()
        .flatten()
    {
        if !dir.is_dir() {
            anyhow::bail!("configured directory {} does not exist", dir.display());
        }
    }
    if config.queue_backend == QueueBackend::Redis {
        ensure_env_present(&["REDIS_URL"])?;
    }

    println!("reel-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            anyhow::bail!("missing required env var {}", var);
        }
    }
    Ok(())
}
