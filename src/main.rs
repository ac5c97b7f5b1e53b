#[macro_use]
mod utils;
mod config;
mod controllers;
mod crd;
mod errors;
mod interfaces;
mod labels_and_annotations;
mod logging;

pub use crate::errors::Error;

use crate::config::Settings;
use crate::utils::get_version_string;
use kube::Client;
use std::env;
use std::path::PathBuf;
use tracing::info;

/// `--config <path>` wins over CONFIG_FILE
fn config_path(args: &[String]) -> Result<Option<PathBuf>, Error> {
    match args.iter().position(|arg| arg == "--config") {
        Some(index) => args
            .get(index + 1)
            .map(|path| Some(PathBuf::from(path)))
            .ok_or_else(|| Error::Config("--config needs a path".into())),
        None => Ok(env::var("CONFIG_FILE").ok().map(PathBuf::from)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();

    if args.contains(&String::from("--version")) {
        println!("{}", get_version_string());
        return Ok(());
    }

    let _tracer_provider = logging::setup_tracing()?;
    let settings = Settings::load(config_path(&args)?.as_deref())?;
    info!(
        "Starting vmgroup-controller {} for machines in {}",
        get_version_string(),
        settings.machine_namespace
    );

    let client = Client::try_default().await?;
    controllers::run(client, settings).await
}
