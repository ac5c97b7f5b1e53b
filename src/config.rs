use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::crd::machine::Machine;
use crate::errors::Error;
use crate::interfaces::vsphere::session::{DEFAULT_API_RELEASE, SessionParams};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Settings {
    pub machine_namespace: String,
    pub credentials_secret: String,
    pub server: Option<String>,
    pub insecure_tls: bool,
    pub api_release: String,
    pub request_timeout_secs: u64,
    pub reconcile_timeout_secs: u64,
    pub retry_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            machine_namespace: "openshift-machine-api".into(),
            credentials_secret: "vsphere-cloud-credentials".into(),
            server: None,
            insecure_tls: true,
            api_release: DEFAULT_API_RELEASE.into(),
            request_timeout_secs: 30,
            reconcile_timeout_secs: 120,
            retry_interval_secs: 15,
        }
    }
}

impl Settings {
    /// Defaults, overlaid by the YAML file if given, overlaid by the environment
    pub fn load(path: Option<&Path>) -> Result<Settings, Error> {
        let mut settings = match path {
            Some(path) => Settings::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Settings::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    pub fn from_yaml(yaml: &str) -> Result<Settings, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        if let Some(value) = var("MACHINE_NAMESPACE") {
            self.machine_namespace = value;
        }
        if let Some(value) = var("VSPHERE_CREDENTIALS_SECRET") {
            self.credentials_secret = value;
        }
        if let Some(value) = var("VSPHERE_SERVER") {
            self.server = Some(value).filter(|s| !s.is_empty());
        }
        if let Some(value) = var("VSPHERE_INSECURE") {
            self.insecure_tls = parse_env("VSPHERE_INSECURE", &value)?;
        }
        if let Some(value) = var("VSPHERE_API_RELEASE") {
            self.api_release = value;
        }
        if let Some(value) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("RECONCILE_TIMEOUT_SECS") {
            self.reconcile_timeout_secs = parse_env("RECONCILE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("RETRY_INTERVAL_SECS") {
            self.retry_interval_secs = parse_env("RETRY_INTERVAL_SECS", &value)?;
        }
        Ok(())
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn session_params(&self, credentials: &VsphereCredentials) -> Result<SessionParams, Error> {
        Ok(SessionParams::new(
            &credentials.server,
            &credentials.username,
            &credentials.password,
            self.insecure_tls,
        )?
        .with_release(&self.api_release)
        .with_request_timeout(Duration::from_secs(self.request_timeout_secs)))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {value:?} for {name}")))
}

#[derive(Clone, PartialEq, Eq)]
pub struct VsphereCredentials {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for VsphereCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VsphereCredentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The credentials secret holds one `<server>.username` / `<server>.password`
/// pair per vCenter.
pub fn credentials_from_secret_data(
    server: &str,
    data: &BTreeMap<String, ByteString>,
) -> Result<VsphereCredentials, Error> {
    let field = |suffix: &str| -> Result<String, Error> {
        let key = format!("{server}.{suffix}");
        let value = data
            .get(&key)
            .ok_or_else(|| Error::Config(format!("credentials secret has no key {key}")))?;
        String::from_utf8(value.0.clone())
            .map(|s| s.trim().to_string())
            .map_err(|_| Error::Config(format!("credentials secret key {key} is not UTF-8")))
    };

    Ok(VsphereCredentials {
        server: server.to_string(),
        username: field("username")?,
        password: field("password")?,
    })
}

/// All machines of a cluster live on the same vCenter, so the first one
/// with a readable provider spec names it.
pub fn server_from_machines(machines: &[Machine]) -> Option<String> {
    machines.iter().find_map(|machine| match machine.vsphere_workspace() {
        Ok(workspace) if !workspace.server.is_empty() => Some(workspace.server),
        Ok(_) => None,
        Err(e) => {
            warn!("config: skipping machine {}: {}", machine.name_any(), e);
            None
        }
    })
}

#[instrument(skip(client))]
pub async fn resolve_credentials(client: Client, settings: &Settings) -> Result<VsphereCredentials, Error> {
    let server = match &settings.server {
        Some(server) => server.clone(),
        None => {
            let machines: Api<Machine> = Api::namespaced(client.clone(), &settings.machine_namespace);
            let machines = machines.list(&ListParams::default()).await?;
            server_from_machines(&machines.items).ok_or_else(|| {
                Error::Config(format!(
                    "no machine in {} names a vSphere server",
                    settings.machine_namespace
                ))
            })?
        }
    };

    let secrets: Api<Secret> = Api::namespaced(client, &settings.machine_namespace);
    let secret = secrets.get(&settings.credentials_secret).await?;
    let credentials = credentials_from_secret_data(&server, &secret.data.unwrap_or_default())?;
    info!(
        "config: using vSphere server {} as {}",
        credentials.server, credentials.username
    );
    Ok(credentials)
}
