use anyhow::Result;
use console::style;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ServeArgs;
use crate::config::Settings;
use crate::core::backend::HttpBackend;
use crate::core::lifecycle::LifecycleManager;
use crate::core::store::ChatStore;
use crate::core::terminal::GuideSection;
use crate::interfaces::web::{ApiServer, ApiServerConfig};

pub async fn run(settings: &Settings, args: ServeArgs) -> Result<()> {
    let store = ChatStore::open(settings.store_path()).await?;
    let backend = Arc::new(HttpBackend::new(&args.backend_url));

    let server = ApiServer::new(ApiServerConfig {
        store,
        backend,
        api_host: args.api_host.clone(),
        api_port: args.api_port,
    });

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(server)));
    lifecycle.start().await?;

    GuideSection::new("Gateway Started")
        .status(
            "API Endpoint",
            &format!(
                "{}",
                style(format!("http://{}:{}", args.api_host, args.api_port))
                    .underlined()
                    .cyan()
            ),
        )
        .status("Backend", &args.backend_url)
        .status("Data", &settings.data_dir.display().to_string())
        .blank()
        .text(&format!(
            "Press {} to stop the gateway.",
            style("Ctrl+C").bold().yellow()
        ))
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}
