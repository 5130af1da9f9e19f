use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubely::config::AppConfig;
use tubely::infrastructure::{database, storage};
use tubely::services::assets::{AssetRepository, SeaOrmAssetRepository};
use tubely::services::keys::key_deriver;
use tubely::services::staging::ScratchStager;
use tubely::services::transcoder::FfmpegTranscoder;
use tubely::services::upload::{MediaPolicy, Pipeline, UploadService};
use tubely::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubely=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Tubely...");

    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(
        "🛡️  Upload Config: Video Max={}MB, Thumbnail Max={}MB, Keys={:?}, URLs={:?}, Thumbnails={:?}",
        config.max_video_size / 1024 / 1024,
        config.max_thumbnail_size / 1024 / 1024,
        config.key_strategy,
        config.url_policy,
        config.thumbnail_backend
    );

    let db = database::setup_database(&config.database_url).await?;
    let object_store = storage::setup_storage(&config).await;
    let thumbnails = storage::setup_thumbnail_store(&config, object_store.clone()).await?;

    tokio::fs::create_dir_all(&config.scratch_dir).await?;
    info!("📝 Scratch directory: {}", config.scratch_dir.display());

    let assets: Arc<dyn AssetRepository> = Arc::new(SeaOrmAssetRepository::new(db));
    let keys = key_deriver(config.key_strategy);

    let uploads = Arc::new(UploadService::new(
        assets.clone(),
        ScratchStager::new(&config.scratch_dir),
        Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path)),
        Pipeline {
            policy: MediaPolicy::video(config.max_video_size),
            keys: keys.clone(),
            store: object_store,
            urls: config.video_url_policy(),
        },
        Pipeline {
            policy: MediaPolicy::thumbnail(config.max_thumbnail_size),
            keys,
            store: thumbnails.store,
            urls: config.thumbnail_url_policy(),
        },
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState {
        assets,
        uploads,
        thumbnail_cache: thumbnails.cache,
        config,
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    info!("✅ Server ready at http://{}", addr);
    info!("📖 OpenAPI: http://{}/api-docs/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
