use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use tracing::instrument;

#[cfg(test)]
use mockall::automock;

use crate::Error;
use crate::interfaces::vsphere::inventory::InventoryLookup;
use crate::interfaces::vsphere::lowlevel::Vim;
use crate::interfaces::vsphere::types::MoRef;
use crate::interfaces::vsphere::vmgroup::VmGroup;

pub const DEFAULT_API_RELEASE: &str = "8.0.1.0";

/// Everything needed to log in to one vCenter
#[derive(Clone)]
pub struct SessionParams {
    pub endpoint: Url,
    pub username: String,
    pub password: String,
    pub insecure: bool,
    pub release: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("endpoint", &self.endpoint.as_str())
            .field("username", &self.username)
            .field("insecure", &self.insecure)
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}

impl SessionParams {
    /// Credentials given here replace any user info embedded in `server`
    pub fn new(server: &str, username: &str, password: &str, insecure: bool) -> Result<Self, Error> {
        Ok(SessionParams {
            endpoint: parse_endpoint(server)?,
            username: username.to_string(),
            password: password.to_string(),
            insecure,
            release: DEFAULT_API_RELEASE.to_string(),
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_release(mut self, release: &str) -> Self {
        self.release = release.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `{endpoint}/vim25/{release}/`
    pub fn api_base(&self) -> Result<Url, Error> {
        let mut base = self.endpoint.clone();
        let path = format!(
            "{}/vim25/{}/",
            self.endpoint.path().trim_end_matches('/'),
            self.release
        );
        base.set_path(&path);
        Ok(base)
    }
}

/// Accepts "vcenter.example.com", "vcenter:8443" or a full URL. The scheme
/// defaults to https and the path to /sdk. User info is stripped.
pub fn parse_endpoint(server: &str) -> Result<Url, Error> {
    let server = server.trim();
    if server.is_empty() {
        return Err(Error::InvalidEndpoint(server.into(), "empty".into()));
    }

    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{server}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| Error::InvalidEndpoint(server.into(), e.to_string()))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(Error::InvalidEndpoint(server.into(), "no host".into()));
    }
    if url.path() == "/" || url.path().is_empty() {
        url.set_path("/sdk");
    }

    let invalid = |_| Error::InvalidEndpoint(server.into(), "cannot strip credentials".into());
    url.set_username("").map_err(invalid)?;
    url.set_password(None).map_err(invalid)?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// An authenticated vSphere session, valid for one reconciliation
#[async_trait]
pub trait VimSession: InventoryLookup {
    /// Submit an edit of the group's full definition. Returns the task without waiting for it.
    async fn reconfigure_group(&self, group: &VmGroup) -> Result<MoRef, Error>;
    async fn logout(&self) -> Result<(), Error>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn VimSession>, Error>;
}

/// Logs in afresh on every call; nothing is cached between reconciliations
pub struct VimSessionProvider {
    params: SessionParams,
}

impl VimSessionProvider {
    pub fn new(params: SessionParams) -> Self {
        VimSessionProvider { params }
    }
}

#[async_trait]
impl SessionProvider for VimSessionProvider {
    #[instrument(skip(self))]
    async fn open(&self) -> Result<Box<dyn VimSession>, Error> {
        Ok(Box::new(Vim::login(&self.params).await?))
    }
}

#[async_trait]
impl VimSession for Vim {
    async fn reconfigure_group(&self, group: &VmGroup) -> Result<MoRef, Error> {
        self.submit_group_edit(group).await
    }

    async fn logout(&self) -> Result<(), Error> {
        Vim::logout(self).await
    }
}
