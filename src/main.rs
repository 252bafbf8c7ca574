use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lesion_classifier::{
    AppState, Args, Device, InferenceService, OnnxModel, PreprocessConfig, Processor, cors,
    check_model_file, default_class_names, http, init_runtime, load_class_names,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let class_names = match &args.labels {
        Some(path) => load_class_names(path)?,
        None => default_class_names(),
    };
    let config = PreprocessConfig::default();

    check_model_file(&args.model)?;
    init_runtime()?;
    let device = Device::select();
    tracing::info!(
        %device,
        accelerated = device.is_accelerator(),
        model = %args.model.display(),
        "loading model"
    );
    let model = OnnxModel::new(device)
        .with_intra_threads(args.intra_threads)
        .load_model(&args.model, class_names.len(), &config)
        .with_context(|| format!("failed to load model from {}", args.model.display()))?;

    let service = InferenceService::new(Arc::new(model), Processor::new(config), class_names)?;
    tracing::info!(device = %service.device(), classes = ?service.class_names(), "model ready");
    let state = web::Data::new(AppState {
        service,
        max_upload_bytes: args.max_upload_bytes,
    });

    let allowed_origin = args.allowed_origin.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(cors(allowed_origin.as_deref()))
            .app_data(state.clone())
            .configure(http::configure)
    });
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    let addr = (args.host.as_str(), args.port);
    tracing::info!("lesion classifier listening on {}:{}", args.host, args.port);
    server
        .bind(addr)
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?
        .run()
        .await?;

    Ok(())
}
