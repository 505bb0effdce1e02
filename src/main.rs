use log::{error, info};

use skillbridge_messaging::integration;
use skillbridge_messaging::state::AppState;

#[tokio::main]
async fn main() {
    let config = integration::Config::default();

    let state = match AppState::init(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize app state: {e}");
            std::process::exit(1);
        }
    };

    let addr = config.env.addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!("Listening on {addr}");
    if let Err(e) = axum::serve(listener, skillbridge_messaging::app(state, &config.env)).await {
        error!("Server error: {e}");
    }
}
