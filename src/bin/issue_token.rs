use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubely::config::AppConfig;
use tubely::utils::auth::create_jwt;
use uuid::Uuid;

/// Mints a bearer token for local testing against a running server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// User id to put in the `sub` claim (random when omitted)
    #[arg(short, long)]
    user: Option<Uuid>,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issue_token=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::from_env()?;
    let user = args.user.unwrap_or_else(Uuid::new_v4);

    let token = create_jwt(user, &config.jwt_secret)?;
    info!("🔑 Issued 24h token for user {}", user);
    println!("{}", token);
    Ok(())
}
