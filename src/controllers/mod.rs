use kube::Client;
use std::sync::Arc;
use tracing::info;

use crate::config::{Settings, resolve_credentials};
use crate::errors::Error;
use crate::interfaces::vsphere::session::{SessionProvider, VimSessionProvider};

pub mod machine;

pub async fn run(client: Client, settings: Settings) -> Result<(), Error> {
    let credentials = resolve_credentials(client.clone(), &settings).await?;
    let sessions: Arc<dyn SessionProvider> =
        Arc::new(VimSessionProvider::new(settings.session_params(&credentials)?));

    info!("Creating tasks");
    machine::create(client, &settings, sessions).await?;

    info!("Controllers stopped");
    Ok(())
}
