#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Kubernetes
    #[error("Kubernetes error {0}")]
    Kube(#[from] kube::Error),

    // Machine provider spec
    #[error("Failed to decode provider spec of machine {0}: {1}")]
    ConfigDecode(String, String),
    #[error("Malformed resource pool path {0:?}: {1}")]
    MalformedPath(String, String),

    // vSphere
    #[error("Authentication against {0} failed: {1}")]
    Authentication(String, String),
    #[error("Expected exactly one cluster at {0}, found {1}")]
    AmbiguousOrMissingCluster(String, usize),
    #[error("VM group {1} not found in cluster {0}")]
    GroupNotFound(String, String),
    #[error("VM {0} not found in inventory")]
    VmNotFound(String),
    #[error("Failed to update members of VM group {0}: {1}")]
    MembershipUpdate(String, String),
    #[error("vSphere fault {0}: {1}")]
    Vim(String, String),
    #[error("Unexpected vSphere response: {0}")]
    VimResponse(String),
    #[error("HTTP error {0}")]
    Http(#[from] reqwest::Error),

    // Configuration
    #[error("Invalid vSphere endpoint {0:?}: {1}")]
    InvalidEndpoint(String, String),
    #[error("Configuration error: {0}")]
    Config(String),

    // Misc libs
    #[error("JSON error {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),
    #[error("Trace exporter error {0}")]
    Trace(#[from] opentelemetry::trace::TraceError),
    #[error("Failed to install tracing subscriber {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    // Custom/generic
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Whether requeueing can help. Broken provider specs and resource pool
    /// paths only change when somebody edits the Machine.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::ConfigDecode(..)
                | Error::MalformedPath(..)
                | Error::InvalidEndpoint(..)
                | Error::Config(..)
        )
    }
}
