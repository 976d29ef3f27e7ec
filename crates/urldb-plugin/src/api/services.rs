//! Host utilities exposed to plugins: crypto, outbound HTTP, a sandboxed
//! filesystem, and the raw database fallback.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use sha2::{Digest, Sha256};

use urldb_core::error::{AppError, ErrorKind};
use urldb_core::result::AppResult;
use urldb_core::traits::PluginDatabase;

/// Hashing, HMAC, tokens and base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Security;

impl Security {
    /// Hex SHA-256 digest.
    pub fn sha256(&self, data: impl AsRef<[u8]>) -> String {
        hex::encode(Sha256::digest(data.as_ref()))
    }

    /// Hex HMAC-SHA256 of `data` under `key`.
    pub fn hmac_sha256(&self, key: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> AppResult<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_ref())
            .map_err(|e| AppError::internal(format!("Invalid HMAC key: {e}")))?;
        mac.update(data.as_ref());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Random alphanumeric token.
    pub fn random_token(&self, len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// Standard base64 encoding.
    pub fn base64_encode(&self, data: impl AsRef<[u8]>) -> String {
        STANDARD.encode(data)
    }

    /// Standard base64 decoding.
    pub fn base64_decode(&self, encoded: &str) -> AppResult<Vec<u8>> {
        STANDARD
            .decode(encoded)
            .map_err(|e| AppError::validation(format!("Invalid base64: {e}")))
    }

    /// Compares two secrets without short-circuiting.
    pub fn equal_constant_time(&self, a: &str, b: &str) -> bool {
        let (a, b) = (a.as_bytes(), b.as_bytes());
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

/// Response from [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Headers with lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Body as text.
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Outbound HTTP for plugins, shared by all of them.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Creates a client with a per-request timeout.
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;
        Ok(Self { client })
    }

    /// `GET url`.
    pub async fn get(&self, url: &str) -> AppResult<HttpResponse> {
        self.send("GET", url, &BTreeMap::new(), None).await
    }

    /// `POST url` with a JSON body.
    pub async fn post_json(&self, url: &str, body: &Value) -> AppResult<HttpResponse> {
        self.send("POST", url, &BTreeMap::new(), Some(body)).await
    }

    /// Sends an arbitrary request.
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    ) -> AppResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| AppError::validation(format!("Invalid HTTP method '{method}'")))?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            AppError::with_source(ErrorKind::ExternalService, format!("Request to {url} failed"), e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await.map_err(|e| {
            AppError::with_source(ErrorKind::ExternalService, format!("Reading {url} failed"), e)
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Filesystem access confined to the plugin's own data directory.
#[derive(Debug, Clone)]
pub struct PluginFs {
    root: PathBuf,
}

impl PluginFs {
    /// Creates a sandbox rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative path inside the sandbox.
    ///
    /// Absolute paths and `..` components are rejected.
    pub fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(AppError::validation(format!(
                        "Path '{relative}' escapes the plugin data directory"
                    )));
                }
            }
        }
        Ok(resolved)
    }

    /// Reads a UTF-8 file.
    pub async fn read_to_string(&self, relative: &str) -> AppResult<String> {
        Ok(tokio::fs::read_to_string(self.resolve(relative)?).await?)
    }

    /// Writes a file, creating parent directories.
    pub async fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> AppResult<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    /// Whether a file or directory exists.
    pub async fn exists(&self, relative: &str) -> AppResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(relative)?).await?)
    }

    /// Removes a file.
    pub async fn remove(&self, relative: &str) -> AppResult<()> {
        tokio::fs::remove_file(self.resolve(relative)?).await?;
        Ok(())
    }

    /// Lists entry names of a directory, sorted.
    pub async fn list(&self, relative: &str) -> AppResult<Vec<String>> {
        let dir = self.resolve(relative)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Stand-in for the raw database capability when no database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDatabase;

#[async_trait]
impl PluginDatabase for UnavailableDatabase {
    async fn execute(&self, _sql: &str, _params: &[Value]) -> AppResult<u64> {
        Err(AppError::service_unavailable("No database is configured"))
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> AppResult<Vec<Value>> {
        Err(AppError::service_unavailable("No database is configured"))
    }
}
