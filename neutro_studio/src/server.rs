use crate::{config::Config, routes::studio_routes};
use axum::{extract::DefaultBodyLimit, Router};
use neutro_detect::DetectionPipeline;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

#[derive(Clone)]
pub struct SharedState {
    pub pipeline: Arc<DetectionPipeline>,
    pub timeout: Duration,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(pipeline: Arc<DetectionPipeline>, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState {
            pipeline,
            timeout: Duration::from_secs(config.inference.timeout_secs),
        };

        let router = Router::new()
            .merge(studio_routes())
            .with_state(app_state)
            .layer(DefaultBodyLimit::max(config.server.get_max_upload_bytes()));

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", &self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
