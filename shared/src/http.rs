use axum::Router;
use tokio::net::TcpListener;

pub async fn bind(host: &str, port: u16) -> Result<TcpListener, std::io::Error> {
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    Ok(listener)
}

/// Serves the router on an already bound listener until it fails.
pub async fn run_http_service(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}
