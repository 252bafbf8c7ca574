use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Benign/malignant skin lesion classifier over HTTP", long_about = None)]
pub struct Args {
    /// ONNX model path
    #[arg(long, env = "MODEL_PATH", default_value = "saved_models/1.onnx")]
    pub model: PathBuf,

    /// Class names file, one per line in model output order
    #[arg(long, env = "LABELS_PATH")]
    pub labels: Option<PathBuf>,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// The single frontend origin allowed to call the API cross-origin
    #[arg(long, env = "ALLOWED_ORIGIN", value_parser = parse_origin)]
    pub allowed_origin: Option<String>,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "INTRA_THREADS")]
    pub intra_threads: Option<usize>,

    /// HTTP worker count
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,
}

fn parse_origin(s: &str) -> Result<String, String> {
    let origin = s.trim().trim_end_matches('/');
    if origin == "*" {
        return Err("wildcard origins are not allowed, name the frontend origin".into());
    }
    if !(origin.starts_with("http://") || origin.starts_with("https://")) {
        return Err(format!("origin {origin:?} must start with http:// or https://"));
    }
    Ok(origin.to_string())
}
