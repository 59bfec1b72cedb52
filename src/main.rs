use std::sync::Arc;

use log::{error, info};
use structopt::StructOpt;

use cdns::{Config, DockerInspector, RequestDispatcher, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_args();

    let inspector = DockerInspector::connect()?;
    let dispatcher = Arc::new(RequestDispatcher::new(Arc::new(inspector)));

    let server = Server::bind(config.socket_addr(), dispatcher).await?;
    info!("Starting at {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("{}", e);
                return Err(e.into());
            }
            info!("Listener stopped");
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}
