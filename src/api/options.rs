//! Connection and read options.
//!
//! `ConnectionInfo` says how to reach the metadata service; `FileReadOptions`
//! controls how one logical file is resolved and read. Both follow the same
//! builder pattern and can be parsed from string maps supplied by a host
//! framework.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, ServiceError};
use crate::partition::DEFAULT_EXPIRY_SECONDS;
use crate::remap::RemapInfo;
use crate::schema::ProjectionSpec;
use crate::source::{
    TcpConnector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_TIMEOUT,
};

/// Default port of the metadata service.
pub const DEFAULT_SERVICE_PORT: u16 = 8010;

/// Default total timeout of one metadata call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default base delay between metadata retries.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// How to reach the metadata/access service.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Base URL; always ends with `/`
    pub base_url: Url,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Total timeout of one HTTP call
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Retries for server errors and transport failures (default: 0)
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl ConnectionInfo {
    /// Parse a service address such as `https://esp.example:8010` or
    /// `esp.example`. A missing scheme means `http`, a missing port means
    /// [`DEFAULT_SERVICE_PORT`].
    pub fn from_connection_string(
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let url = url.trim();
        let with_scheme = if url.contains("://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };
        let mut base_url = Url::parse(&with_scheme)?;
        if base_url.port().is_none() && !url.contains("://") {
            base_url
                .set_port(Some(DEFAULT_SERVICE_PORT))
                .map_err(|_| ServiceError::Url(url::ParseError::InvalidPort))?;
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            user: user.map(str::to_string),
            password: password.map(str::to_string),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: 0,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    /// Set the user and password for basic authentication.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("base_url", &self.base_url.as_str())
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Options for resolving and reading one logical file.
///
/// # Example
/// ```
/// use clusterfile::api::FileReadOptions;
///
/// let opts = FileReadOptions::new()
///     .with_cluster("thor")
///     .with_projection("id, home.city")
///     .with_filter("age > 30")
///     .with_expiry_seconds(300);
/// assert_eq!(opts.projection.paths().len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileReadOptions {
    /// Target cluster; `None` lets the service pick
    pub cluster: Option<String>,
    /// How replica addresses are rewritten
    pub remap: RemapInfo,
    /// Fields to materialize; empty selects all
    pub projection: ProjectionSpec,
    /// Filter text; empty accepts every record
    pub filter: String,
    /// Requested access token lifetime (default: 120)
    pub expiry_seconds: u32,
    /// Keep at most this many leading partitions; `None` or zero keeps all
    pub max_parts: Option<usize>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for FileReadOptions {
    fn default() -> Self {
        Self {
            cluster: None,
            remap: RemapInfo::Identity,
            projection: ProjectionSpec::all(),
            filter: String::new(),
            expiry_seconds: DEFAULT_EXPIRY_SECONDS,
            max_parts: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

fn parse_key<T: FromStr>(opts: &HashMap<String, String>, key: &str) -> Result<Option<T>, Error> {
    match opts.get(key).map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("invalid value for '{}': {}", key, raw))),
    }
}

impl FileReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a string map.
    ///
    /// # Supported Keys
    /// - `cluster`: target cluster name
    /// - `projection`: comma-separated field paths
    /// - `filter`: filter text
    /// - `expiry_seconds`: access token lifetime (default: 120)
    /// - `max_parts`: partition cap, zero for no cap
    /// - `connect_timeout_ms`, `read_timeout_ms`: data transport timeouts
    /// - `max_frame_size`: largest accepted transport frame
    /// - `remap_base_ip`, `remap_node_count`, `remap_port`: sequential remap
    ///
    /// # Errors
    /// `Error::Configuration` for values that do not parse, or an incomplete
    /// remap setting.
    pub fn from_dict(opts: &HashMap<String, String>) -> Result<Self, Error> {
        let mut options = Self::default();
        options.cluster = opts
            .get("cluster")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(list) = opts.get("projection") {
            options.projection = ProjectionSpec::parse(list);
        }
        if let Some(filter) = opts.get("filter") {
            options.filter = filter.clone();
        }
        if let Some(expiry) = parse_key(opts, "expiry_seconds")? {
            options.expiry_seconds = expiry;
        }
        options.max_parts = parse_key(opts, "max_parts")?.filter(|max: &usize| *max > 0);
        if let Some(ms) = parse_key(opts, "connect_timeout_ms")? {
            options.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key(opts, "read_timeout_ms")? {
            options.read_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = parse_key(opts, "max_frame_size")? {
            options.max_frame_size = size;
        }

        let base: Option<Ipv4Addr> = parse_key(opts, "remap_base_ip")?;
        let count: Option<usize> = parse_key(opts, "remap_node_count")?;
        let port: Option<u16> = parse_key(opts, "remap_port")?;
        options.remap = match (base, count) {
            (Some(base), Some(count)) => {
                let remap = RemapInfo::sequential(base, count);
                match port {
                    Some(port) => remap.with_default_port(port),
                    None => remap,
                }
            }
            (None, None) => match port {
                Some(port) => RemapInfo::Identity.with_default_port(port),
                None => RemapInfo::Identity,
            },
            _ => {
                return Err(Error::Configuration(
                    "remap_base_ip and remap_node_count must be set together".to_string(),
                ))
            }
        };
        Ok(options)
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_remap(mut self, remap: RemapInfo) -> Self {
        self.remap = remap;
        self
    }

    /// Set the projection from a comma-separated list of field paths.
    pub fn with_projection(mut self, list: &str) -> Self {
        self.projection = ProjectionSpec::parse(list);
        self
    }

    pub fn with_projection_spec(mut self, projection: ProjectionSpec) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_expiry_seconds(mut self, expiry_seconds: u32) -> Self {
        self.expiry_seconds = expiry_seconds;
        self
    }

    /// Cap the partition count. Zero removes the cap.
    pub fn with_max_parts(mut self, max_parts: usize) -> Self {
        self.max_parts = Some(max_parts).filter(|max| *max > 0);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// TCP connector configured with these options' transport settings.
    pub fn tcp_connector(&self) -> TcpConnector {
        TcpConnector::new()
            .with_connect_timeout(self.connect_timeout)
            .with_read_timeout(self.read_timeout)
            .with_max_frame_size(self.max_frame_size)
    }
}
