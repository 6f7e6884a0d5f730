//! In-process fakes of the HTTP services wattsync talks to.

pub mod alertmanager;
pub mod iotawatt;
pub mod victoria;

use std::net::SocketAddr;

use axum::Router;

/// Serves `router` on an ephemeral localhost port for the rest of the test.
pub async fn serve(router: Router) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}
