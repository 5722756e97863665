use std::path::Path;

use pivot_media::{check_ffmpeg, MediaConfig};
use pivot_status::StatusConfig;
use pivot_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with temp_dir={} role={}",
        config.temp_dir.display(),
        config.role.as_str()
    );
    ensure_scratch_dir(&config.temp_dir).await?;

    if config.role.runs_executor() {
        ensure_ffmpeg(&MediaConfig::from_env())?;
        ensure_env_present(&["R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY"])?;
        ensure_any_env_present(&["R2_ENDPOINT", "R2_ENDPOINT_URL"])?;
        StatusConfig::from_env()?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_scratch_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_ffmpeg(config: &MediaConfig) -> anyhow::Result<()> {
    let binary = check_ffmpeg(config.ffmpeg_path.as_deref())?;
    let output = std::process::Command::new(&binary)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg -version failed: {:?}",
            output.status
        ));
    }
    println!("worker-selfcheck: ffmpeg at {}", binary.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true) {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

fn ensure_any_env_present(vars: &[&str]) -> anyhow::Result<()> {
    if vars
        .iter()
        .any(|var| std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false))
    {
        Ok(())
    } else {
        Err(anyhow::anyhow!("missing required env var {}", vars.join(" or ")))
    }
}
