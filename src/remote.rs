//! Remote transform service contract and HTTP transport.
//!
//! The transform itself is opaque to the pipeline: this module only builds
//! requests and consumes responses. Calls are blocking and synchronous,
//! treated as atomic request/response with no retries; a failure surfaces
//! immediately as an error.
//!
//! Wire format of the hosted service: form-encoded POST to
//! `https://<host>/api/<endpoint>`, JSON object response. Response field
//! names may carry a `:base64` or `:urlenc` suffix; such values are
//! decoded and exposed under the bare name. An `error` field short-circuits
//! into [`Error::Remote`] with the reported code and message verbatim.

use crate::config::ScssSettings;
use crate::error::{Error, Result};
use crate::kind::AssetKind;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustc_hash::FxHashMap;
use std::time::Duration;

const USER_AGENT: &str = concat!("assetmix-", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Caller identity forwarded with every remote operation.
#[derive(Debug, Clone)]
pub struct Auth {
    pub token: String,
    pub token_secret: String,
    /// Originating site host, informational.
    pub host: String,
}

/// Credentials minted by the `token` bootstrap endpoint.
#[derive(Debug, Clone, Default)]
pub struct TokenGrant {
    pub token: Option<String>,
    pub token_secret: Option<String>,
}

/// Pipeline-held credential state.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub token_secret: Option<String>,
}

impl Credentials {
    /// Resolve a full caller identity, minting credentials via the
    /// bootstrap endpoint when the token is missing.
    pub fn ensure(&mut self, remote: &dyn RemoteTransform, host: &str) -> Result<Auth> {
        if self.token.is_none() {
            let grant = remote.token(host)?;
            if self.token.is_none() {
                self.token = grant.token;
            }
            if self.token_secret.is_none() {
                self.token_secret = grant.token_secret;
            }
        }
        let token = self.token.clone().ok_or(Error::TokenNotSet)?;
        let token_secret = self.token_secret.clone().ok_or(Error::TokenSecretNotSet)?;
        Ok(Auth {
            token,
            token_secret,
            host: host.to_string(),
        })
    }
}

/// SCSS source plus the image set referenced by it.
#[derive(Debug, Clone, Default)]
pub struct ScssBundle {
    /// Stylesheet file name, used to namespace generated images.
    pub file: String,
    /// Fully import-expanded SCSS source.
    pub style: String,
    pub images: Vec<NamedBlob>,
}

/// A named binary attachment crossing the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Output of a remote SCSS compilation.
#[derive(Debug, Clone, Default)]
pub struct ScssOutput {
    pub content: String,
    /// Generated images (sprites etc.), to be persisted under the
    /// stylesheet's cache namespace.
    pub images: Vec<NamedBlob>,
}

/// Contract the pipeline requires from the transform service.
///
/// Implementations must be idempotent for a given `(content, options)`
/// pair; the pipeline caches on that assumption.
pub trait RemoteTransform {
    /// Mint caller credentials when none are configured.
    fn token(&self, host: &str) -> Result<TokenGrant>;

    /// Compress `content` with the named compressor chain.
    fn compress(
        &self,
        auth: &Auth,
        kind: AssetKind,
        content: &str,
        compressors: &str,
    ) -> Result<String>;

    /// Compile an SCSS bundle, optionally returning generated images.
    fn scss_compile(
        &self,
        auth: &Auth,
        bundle: &ScssBundle,
        options: &ScssSettings,
    ) -> Result<ScssOutput>;
}

// ============================================================================
// Response envelope
// ============================================================================

/// Decoded response envelope. Field values arrive as raw bytes; `:base64`
/// and `:urlenc` suffixes have already been unwrapped.
#[derive(Debug, Default)]
pub struct Envelope {
    fields: FxHashMap<String, Vec<u8>>,
}

impl Envelope {
    pub fn decode(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::MalformedResponse(value.to_string()))?;

        if let Some(err) = object.get("error") {
            return Err(Error::Remote {
                code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(8),
                message: err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("HTTP error")
                    .to_string(),
            });
        }

        let mut fields = FxHashMap::default();
        for (key, val) in object {
            if let Some(name) = key.strip_suffix(":base64") {
                let text = val
                    .as_str()
                    .ok_or_else(|| Error::MalformedResponse(value.to_string()))?;
                let bytes = BASE64
                    .decode(text)
                    .map_err(|_| Error::MalformedResponse(value.to_string()))?;
                fields.insert(name.to_string(), bytes);
            } else if let Some(name) = key.strip_suffix(":urlenc") {
                let text = val
                    .as_str()
                    .ok_or_else(|| Error::MalformedResponse(value.to_string()))?;
                // Form encoding: '+' is a space.
                let text = text.replace('+', " ");
                let bytes = percent_encoding::percent_decode_str(&text).collect();
                fields.insert(name.to_string(), bytes);
            } else if let Some(text) = val.as_str() {
                fields.insert(key.clone(), text.as_bytes().to_vec());
            } else {
                fields.insert(key.clone(), val.to_string().into_bytes());
            }
        }
        Ok(Self { fields })
    }

    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.bytes(key)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn require_text(&self, key: &str) -> Result<String> {
        self.text(key)
            .ok_or_else(|| Error::MalformedResponse(format!("missing field `{key}`")))
    }

    /// Fields under a `/`-separated prefix, e.g. `image/logo.png`.
    pub fn blobs_with_prefix(&self, prefix: &str) -> Vec<NamedBlob> {
        let mut blobs: Vec<NamedBlob> = self
            .fields
            .iter()
            .filter_map(|(key, bytes)| {
                key.strip_prefix(prefix).map(|name| NamedBlob {
                    name: name.to_string(),
                    bytes: bytes.clone(),
                })
            })
            .collect();
        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        blobs
    }
}

// ============================================================================
// HTTP transport
// ============================================================================

/// HTTP transport against the hosted transform service.
pub struct HttpTransform {
    host: String,
    agent: ureq::Agent,
}

impl HttpTransform {
    pub fn new(host: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .build();
        Self {
            host: host.into(),
            agent: config.into(),
        }
    }

    fn call(&self, endpoint: &str, form: Vec<(String, String)>) -> Result<Envelope> {
        let url = format!("https://{}/api/{}", self.host, endpoint);
        crate::debug!("remote"; "POST {}", url);
        let mut response = self
            .agent
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .send_form(form)
            .map_err(|e| Error::Transport {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        let value: serde_json::Value = response
            .body_mut()
            .read_json()
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;
        Envelope::decode(&value)
    }

    fn auth_fields(auth: &Auth) -> Vec<(String, String)> {
        vec![
            ("token".into(), auth.token.clone()),
            ("token_secret".into(), auth.token_secret.clone()),
            ("host".into(), auth.host.clone()),
        ]
    }
}

impl RemoteTransform for HttpTransform {
    fn token(&self, host: &str) -> Result<TokenGrant> {
        let envelope = self.call("token", vec![("host".into(), host.into())])?;
        Ok(TokenGrant {
            token: envelope.text("token"),
            token_secret: envelope.text("token_secret"),
        })
    }

    fn compress(
        &self,
        auth: &Auth,
        kind: AssetKind,
        content: &str,
        compressors: &str,
    ) -> Result<String> {
        let mut form = Self::auth_fields(auth);
        form.push(("type".into(), kind.as_str().into()));
        form.push(("compressors".into(), compressors.into()));
        form.push(("data".into(), content.into()));
        self.call("compress", form)?.require_text("content")
    }

    fn scss_compile(
        &self,
        auth: &Auth,
        bundle: &ScssBundle,
        options: &ScssSettings,
    ) -> Result<ScssOutput> {
        let mut form = Self::auth_fields(auth);
        form.push(("file".into(), bundle.file.clone()));
        form.push(("images_dir".into(), options.images_dir.clone()));
        form.push(("data".into(), bundle.style.clone()));
        for image in &bundle.images {
            form.push((format!("image/{}:base64", image.name), BASE64.encode(&image.bytes)));
        }
        let envelope = self.call("scss", form)?;
        Ok(ScssOutput {
            content: envelope.require_text("content")?,
            images: envelope.blobs_with_prefix("image/"),
        })
    }
}

// ============================================================================
// Remote asset references
// ============================================================================

/// Check whether a source string is a remote URL (`http://`, `https://`
/// or scheme-relative `//`).
pub fn is_remote_url(source: &str) -> bool {
    let trimmed = source.trim_start();
    trimmed.starts_with("//")
        || trimmed
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http://"))
        || trimmed
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
}

/// Scheme-relative URLs resolve to plain http for fetching.
pub(crate) fn normalize_scheme(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("http://{rest}"),
        None => url.to_string(),
    }
}

/// Fetch the body of a remote asset reference.
pub fn fetch_url(url: &str) -> Result<String> {
    let url = normalize_scheme(url);
    let mut response = ureq::get(&url)
        .header("User-Agent", USER_AGENT)
        .call()
        .map_err(|e| Error::Transport {
            endpoint: url.clone(),
            message: e.to_string(),
        })?;
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| Error::MalformedResponse(e.to_string()))
}
