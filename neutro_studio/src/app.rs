use crate::config::Config;
use crate::server::HttpServer;
use neutro_detect::{ClassLabels, DetectionPipeline, LabelFont, OrtDetector, Plotter};
use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let labels = match ClassLabels::load(&config.labels) {
        Ok(labels) => Arc::new(labels),
        Err(e) => {
            tracing::error!("Failed to load class labels: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let font = match LabelFont::load(&config.font) {
        Ok(font) => font,
        Err(e) => {
            tracing::error!("Failed to load label font: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let detector = match OrtDetector::new(&config.model, labels.clone()) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            tracing::error!("Failed to load detection model: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let plotter = Plotter::new(font, labels);
    let pipeline = Arc::new(DetectionPipeline::new(
        detector,
        plotter,
        config.inference.clone(),
    ));

    let server = HttpServer::new(pipeline, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
