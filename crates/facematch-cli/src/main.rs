use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "facematch", about = "facematch face verification CLI")]
struct Cli {
    /// Base URL of a running facematchd
    #[arg(long, env = "FACEMATCH_URL", default_value = "http://127.0.0.1:5005")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon is up
    Health,
    /// List the available recognition models
    Models,
    /// Compare the faces in two image files
    Verify {
        img1: PathBuf,
        img2: PathBuf,
        /// Recognition model (e.g. "ArcFace"); server default if omitted
        #[arg(long)]
        model: Option<String>,
        /// Distance metric: cosine, euclidean or euclidean_l2
        #[arg(long)]
        metric: Option<String>,
        /// Detector backend (ignored with --upload)
        #[arg(long)]
        detector: Option<String>,
        /// Send raw files as multipart instead of base64 JSON
        #[arg(long)]
        upload: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let base = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let body = fetch(client.get(format!("{base}/health"))).await?;
            print_json(&body)?;
        }
        Commands::Models => {
            let body = fetch(client.get(format!("{base}/models"))).await?;
            print_json(&body)?;
        }
        Commands::Verify {
            img1,
            img2,
            model,
            metric,
            detector,
            upload,
        } => {
            let request = if upload {
                if detector.is_some() {
                    tracing::warn!("--detector is ignored for uploads");
                }
                let mut form = reqwest::multipart::Form::new()
                    .part("img1", file_part(&img1).await?)
                    .part("img2", file_part(&img2).await?);
                if let Some(model) = model {
                    form = form.text("model_name", model);
                }
                if let Some(metric) = metric {
                    form = form.text("distance_metric", metric);
                }
                client.post(format!("{base}/verify-file")).multipart(form)
            } else {
                let mut body = Map::new();
                body.insert("img1".into(), json!(encode_file(&img1).await?));
                body.insert("img2".into(), json!(encode_file(&img2).await?));
                for (key, value) in [
                    ("model_name", model),
                    ("distance_metric", metric),
                    ("detector_backend", detector),
                ] {
                    if let Some(value) = value {
                        body.insert(key.into(), json!(value));
                    }
                }
                client.post(format!("{base}/verify")).json(&Value::Object(body))
            };

            tracing::debug!(
                img1 = %img1.display(),
                img2 = %img2.display(),
                upload,
                "sending verification"
            );
            let result = fetch(request).await?;
            print_json(&result)?;

            let verdict = if result["verified"].as_bool().unwrap_or(false) {
                "MATCH"
            } else {
                "NO MATCH"
            };
            println!(
                "{verdict} (distance {:.4}, threshold {:.4}, {:.3}s)",
                result["distance"].as_f64().unwrap_or(f64::NAN),
                result["threshold"].as_f64().unwrap_or(f64::NAN),
                result["time"].as_f64().unwrap_or(0.0),
            );
        }
    }

    Ok(())
}

/// Send a request and return its JSON body, failing on any non-2xx status.
async fn fetch(request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await.context("request to facematchd failed")?;
    let status = response.status();
    let text = response.text().await.context("failed to read response body")?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(text);
        bail!("server returned {status}: {message}");
    }

    serde_json::from_str(&text).context("server returned invalid JSON")
}

async fn encode_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(STANDARD.encode(bytes))
}

async fn file_part(path: &Path) -> Result<reqwest::multipart::Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(reqwest::multipart::Part::bytes(bytes).file_name(name))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
