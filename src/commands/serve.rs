use crate::api::LocalStore;
use crate::args::ServeArgs;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::server::Server;
use crate::{Config, Result};
use std::sync::Arc;
use tracing::warn;

/// Serves the records in `$FINSIGHT_HOME/users` until Ctrl-C.
pub async fn serve(config: Config, args: ServeArgs) -> Result<Out<()>> {
    let store = Arc::new(LocalStore::new(config.users_dir()));
    let server = Server::bind(args.addr, store)
        .await
        .pub_result(ErrorType::Server)?;
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C, stopping: {e}");
            }
        })
        .await
        .pub_result(ErrorType::Server)?;
    Ok("The server stopped".into())
}
