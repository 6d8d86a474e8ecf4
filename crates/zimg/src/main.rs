//! zimg server binary: bootstrap and the listener loop.

use camino::Utf8PathBuf;
use color_eyre::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use zimg::config::Settings;
use zimg::{App, serve};

#[derive(Debug, Default)]
struct Args {
    config: Option<Utf8PathBuf>,
    bind: Option<String>,
}

fn parse_args() -> Args {
    let mut parsed = Args::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = args.next().map(Utf8PathBuf::from),
            "--bind" => parsed.bind = args.next(),
            "--help" | "-h" => {
                eprintln!("Usage: zimg [--config <path>] [--bind <addr:port>]");
                std::process::exit(0);
            }
            _ => {}
        }
    }
    parsed
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let args = parse_args();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }

    tracing::info!(
        bind = %settings.bind,
        img_path = %settings.img_path,
        "starting zimg"
    );

    let app = Arc::new(App::new(settings));
    let listener = TcpListener::bind(app.settings.bind.as_str()).await?;
    axum::serve(listener, serve::router(app)).await?;

    Ok(())
}
