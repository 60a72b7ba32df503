//! How the pipeline gets bytes for a `sourceUrl`.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("server answered with HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("{0}")]
    Other(String),
}

/// Source of content bytes. Non-success responses are errors.
pub trait ContentFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>>;
}

/// Plain HTTP(S) GET.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        async move {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            let body = response.bytes().await?;
            tracing::debug!(url, bytes = body.len(), "fetched over http");
            Ok(body)
        }
        .boxed()
    }
}

/// Local files, as `file://` URLs or bare paths. Handy for sideloading
/// content from removable media.
#[derive(Clone, Copy, Default)]
pub struct FileFetcher;

impl ContentFetcher for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        async move {
            let path = url.strip_prefix("file://").unwrap_or(url);
            let data = tokio::fs::read(path).await?;
            tracing::debug!(path, bytes = data.len(), "read local file");
            Ok(Bytes::from(data))
        }
        .boxed()
    }
}

/// Routes by URL scheme: http/https over the network, file or no scheme
/// from disk.
#[derive(Clone)]
pub struct SchemeFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SchemeFetcher {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        Ok(Self {
            http: HttpFetcher::new(user_agent)?,
            file: FileFetcher,
        })
    }
}

impl ContentFetcher for SchemeFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        match url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase()) {
            Some(scheme) if scheme == "http" || scheme == "https" => self.http.fetch(url),
            Some(scheme) if scheme == "file" => self.file.fetch(url),
            None => self.file.fetch(url),
            Some(_) => {
                let url = url.to_string();
                async move { Err(TransportError::UnsupportedUrl(url)) }.boxed()
            }
        }
    }
}
