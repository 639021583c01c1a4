use std::env;
use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "swp=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        let data_dir = raw_args
            .get(3)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        if let Err(e) = swp::api::run_http_server(port, data_dir).await {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    match swp::api::run_cli(raw_args) {
        Ok(json) => println!("{json}"),
        Err(msg) => {
            eprintln!("Error: {msg}");
            std::process::exit(1);
        }
    }
}
