use std::fmt::{self, Write};
use std::time::Duration;
use anyhow::Context;
use sbx_core::workflow::NodeKind;
use crate::config::AppConfig;
use crate::generator::backend::schemas::{ObjectInfo, SystemStats};
use crate::generator::backend::{ComfyBackend, DiffusionApi};

const GIB: u64 = 1024 * 1024 * 1024;

/// Per-request timeout of the check, independent of the generation timeout.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the check, with the short [`TIMEOUT`].
pub fn connect(config: &AppConfig) -> anyhow::Result<ComfyBackend> {
    Ok(ComfyBackend::with_url(config.api_url(), TIMEOUT)?)
}

/// Queries the backend and returns a human-readable report.
pub async fn run(backend: &ComfyBackend) -> anyhow::Result<String> {
    let stats = backend
        .system_stats()
        .await
        .with_context(|| format!("could not reach the backend at {}. Is it running?", backend.api_url()))?;
    let object_info = backend.object_info().await.context("failed to read object info")?;

    Ok(report(backend.api_url(), &stats, &object_info)?)
}

pub fn report(api_url: &str, stats: &SystemStats, object_info: &ObjectInfo) -> Result<String, fmt::Error> {
    let unknown = || "unknown".to_string();
    let mut out = String::new();

    writeln!(out, "Backend API at: {}", api_url)?;
    writeln!(out, "\nSystem Information:")?;
    writeln!(out, "- ComfyUI Version: {}", stats.system.comfyui_version.clone().unwrap_or_else(unknown))?;
    writeln!(out, "- Python Version: {}", stats.system.python_version.clone().unwrap_or_else(unknown))?;
    writeln!(out, "- PyTorch Version: {}", stats.system.pytorch_version.clone().unwrap_or_else(unknown))?;

    writeln!(out, "\nGPU Information:")?;
    for device in &stats.devices {
        writeln!(out, "- {}", device.name)?;
        writeln!(out, "  VRAM Total: {}GB", (device.vram_total + GIB / 2) / GIB)?;
        writeln!(out, "  VRAM Free: {}GB", (device.vram_free + GIB / 2) / GIB)?;
    }

    writeln!(out, "\nFound {} available models and operations", object_info.len())?;
    writeln!(out, "\nKey operations:")?;
    for kind in NodeKind::all() {
        let mark = if object_info.has(kind) { "ok" } else { "MISSING" };
        writeln!(out, "- {} [{}]", kind.class_name(), mark)?;
    }

    let checkpoints = object_info.checkpoints();
    writeln!(out, "\nCheckpoints ({}):", checkpoints.len())?;
    for name in checkpoints {
        writeln!(out, "- {}", name)?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockComfy;

    #[tokio::test]
    async fn test_report_against_mock() {
        let mock = MockComfy::start().await.unwrap();
        let backend = ComfyBackend::with_url(mock.api_url(), Duration::from_secs(5)).unwrap();

        let report = run(&backend).await.unwrap();

        assert!(report.contains("- ComfyUI Version: 0.3.10"));
        assert!(report.contains("- cuda:0 NVIDIA GeForce RTX 4090"));
        assert!(report.contains("VRAM Total: 24GB"));
        assert!(report.contains("Found 6 available models and operations"));
        assert!(report.contains("- KSampler [ok]"));
        assert!(report.contains("- dreamshaper_8.safetensors"));
        mock.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_backend_gives_up_after_check_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let config = AppConfig {
            comfyui_url: format!("http://127.0.0.1:{}", port),
            ..Default::default()
        };
        assert_eq!(config.timeout, Duration::from_secs(300));

        let started = std::time::Instant::now();
        let err = run(&connect(&config).unwrap()).await.unwrap_err();

        assert!(err.to_string().contains("Is it running?"));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails() {
        let backend = ComfyBackend::with_url("http://127.0.0.1:9/api", Duration::from_secs(2)).unwrap();
        let err = run(&backend).await.unwrap_err();
        assert!(err.to_string().contains("Is it running?"));
    }
}
