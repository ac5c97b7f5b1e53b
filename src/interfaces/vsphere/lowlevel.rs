use reqwest::header::HeaderValue;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::Error;
use crate::interfaces::vsphere::session::SessionParams;
use crate::interfaces::vsphere::types::{Fault, MoRef, ServiceContent};

pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// One authenticated connection to the vSphere JSON API
/// (`/sdk/vim25/{release}/{type}/{id}/{method or property}`).
#[derive(Debug)]
pub struct Vim {
    http: reqwest::Client,
    base: Url,
    session_id: HeaderValue,
    content: ServiceContent,
}

impl Vim {
    /// Fetch the service content and log in. Any failure on the way, apart from
    /// a timeout, is reported as an authentication error against the endpoint.
    #[instrument(skip(params), fields(endpoint = %params.endpoint))]
    pub async fn login(params: &SessionParams) -> Result<Vim, Error> {
        let host = params.endpoint.host_str().unwrap_or_default().to_string();
        let auth_error = |e: Error| match e {
            Error::Cancelled(_) => e,
            other => Error::Authentication(host.clone(), other.to_string()),
        };

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(params.insecure)
            .timeout(params.request_timeout)
            .build()
            .map_err(|e| auth_error(e.into()))?;
        let base = params.api_base()?;

        let content: ServiceContent = decode(
            http.get(url(&base, &["ServiceInstance", "ServiceInstance", "content"])?)
                .send()
                .await,
        )
        .await
        .map_err(auth_error)?;

        let login_url = url(
            &base,
            &["SessionManager", &content.session_manager.value, "Login"],
        )?;
        let response = http
            .post(login_url)
            .json(&json!({"userName": params.username, "password": params.password}))
            .send()
            .await
            .map_err(|e| auth_error(transport_error(e)))?;
        let session_id = response.headers().get(SESSION_HEADER).cloned();
        read_body(response).await.map_err(auth_error)?;
        let mut session_id = session_id.ok_or_else(|| {
            auth_error(Error::VimResponse(format!(
                "login response has no {SESSION_HEADER} header"
            )))
        })?;
        session_id.set_sensitive(true);

        debug!("vsphere: logged in to {} as {}", host, params.username);
        Ok(Vim {
            http,
            base,
            session_id,
            content,
        })
    }

    pub fn content(&self) -> &ServiceContent {
        &self.content
    }

    /// Read a single property of a managed object
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, object: &MoRef, property: &str) -> Result<T, Error> {
        let request = self
            .http
            .get(url(&self.base, &[&object.kind, &object.value, property])?)
            .header(SESSION_HEADER, self.session_id.clone());
        decode(request.send().await).await
    }

    /// Invoke a method on a managed object
    #[instrument(skip(self, body))]
    pub async fn invoke<B, T>(&self, object: &MoRef, method: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        decode(self.post(object, method)?.json(body).send().await).await
    }

    /// Invoke a method that returns nothing
    #[instrument(skip(self, body))]
    pub async fn invoke_void<B>(&self, object: &MoRef, method: &str, body: &B) -> Result<(), Error>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .post(object, method)?
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await?;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), Error> {
        let session_manager = self.content.session_manager.clone();
        self.invoke_void(&session_manager, "Logout", &json!({})).await
    }

    fn post(&self, object: &MoRef, method: &str) -> Result<RequestBuilder, Error> {
        Ok(self
            .http
            .post(url(&self.base, &[&object.kind, &object.value, method])?)
            .header(SESSION_HEADER, self.session_id.clone()))
    }
}

fn url(base: &Url, segments: &[&str]) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::InvalidEndpoint(base.to_string(), "cannot be a base URL".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Cancelled(format!("vsphere request timed out: {error}"))
    } else {
        Error::Http(error)
    }
}

/// Body of a successful response, or the decoded fault of a failed one
async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, Error> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;
    if status.is_success() {
        return Ok(body.to_vec());
    }

    let fault: Fault = serde_json::from_slice(&body).unwrap_or_default();
    if fault.type_name.is_empty() {
        Err(Error::Vim(
            status.to_string(),
            String::from_utf8_lossy(&body).into_owned(),
        ))
    } else {
        Err(Error::Vim(fault.type_name.clone(), fault.message()))
    }
}

async fn decode<T: DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, Error> {
    let response = response.map_err(transport_error)?;
    let no_content = response.status() == StatusCode::NO_CONTENT;
    let body = read_body(response).await?;
    if no_content || body.is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&body)?)
}
