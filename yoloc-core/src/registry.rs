//! Discovery of cosign signatures through the OCI distribution API.

use std::fmt;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::error::YolocError;

const DEFAULT_REGISTRY: &str = "index.docker.io";
const COSIGN_SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";
const MANIFEST_MEDIA_TYPES: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.v2+json";

/// Why signatures could not be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The image exists but carries no signature artifact.
    NoSignatures,
    /// Resolution or transport failed.
    Failed(String),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSignatures => write!(f, "no signatures found"),
            Self::Failed(message) => write!(f, "signature lookup failed: {message}"),
        }
    }
}

impl std::error::Error for VerifyError {}

impl From<reqwest::Error> for VerifyError {
    fn from(value: reqwest::Error) -> Self {
        Self::Failed(value.to_string())
    }
}

impl From<YolocError> for VerifyError {
    fn from(value: YolocError) -> Self {
        Self::Failed(value.to_string())
    }
}

/// Lists the signatures attached to an image.
pub trait SignatureVerifier: Send + Sync {
    /// Signature payloads attached to `reference`.
    fn signatures<'a>(
        &'a self,
        cancel: &'a CancelToken,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, VerifyError>>;
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host (and port).
    pub registry: String,
    /// Repository path within the registry.
    pub repository: String,
    /// Tag, when given.
    pub tag: Option<String>,
    /// Digest, when given.
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse `[registry/]repository[:tag][@digest]`.
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VerifyError::Failed("empty image reference".to_string()));
        }
        let (rest, digest) = match raw.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (raw, None),
        };
        let (path, tag) = match rest.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => (path, Some(tag.to_string())),
            _ => (rest, None),
        };

        let (registry, repository) = match path.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), remainder.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), path.to_string()),
        };
        let registry = if registry == "docker.io" {
            DEFAULT_REGISTRY.to_string()
        } else {
            registry
        };
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };
        if repository.is_empty() {
            return Err(VerifyError::Failed(format!("invalid image reference {raw:?}")));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Pick the highest version-like tag, falling back to the first tag.
pub fn select_tag(tags: &[String]) -> Option<String> {
    tags.iter()
        .filter_map(|tag| parse_version(tag).map(|version| (version, tag)))
        .max_by(|left, right| left.0.cmp(&right.0))
        .map(|(_, tag)| tag.clone())
        .or_else(|| tags.first().cloned())
}

fn parse_version(tag: &str) -> Option<Vec<u64>> {
    let trimmed = tag.strip_prefix('v').unwrap_or(tag);
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Registry client that discovers cosign signature manifests.
#[derive(Debug, Clone)]
pub struct RegistryVerifier {
    client: Client,
    scheme: String,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignatureManifest {
    #[serde(default)]
    layers: Vec<SignatureLayer>,
}

#[derive(Debug, Deserialize)]
struct SignatureLayer {
    #[serde(default)]
    annotations: std::collections::HashMap<String, String>,
}

impl RegistryVerifier {
    /// Verifier speaking HTTPS to registries.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            scheme: "https".to_string(),
            user_agent: user_agent.into(),
        }
    }

    /// Override the URL scheme, e.g. for a plain-HTTP local registry.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    fn url(&self, image: &ImageRef, path: &str) -> String {
        format!(
            "{}://{}/v2/{}/{path}",
            self.scheme, image.registry, image.repository
        )
    }

    /// GET `url`, answering one bearer challenge anonymously.
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        token: &mut Option<String>,
    ) -> Result<Response, VerifyError> {
        let response = self.send(url, accept, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || token.is_some() {
            return Ok(response);
        }
        let Some(challenge) = bearer_challenge(response.headers()) else {
            return Ok(response);
        };
        *token = Some(self.fetch_token(&challenge).await?);
        self.send(url, accept, token.as_deref()).await
    }

    async fn send(
        &self,
        url: &str,
        accept: Option<&str>,
        token: Option<&str>,
    ) -> Result<Response, VerifyError> {
        let mut request = self.client.get(url).header("User-Agent", &self.user_agent);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(request.send().await?)
    }

    async fn fetch_token(&self, challenge: &Challenge) -> Result<String, VerifyError> {
        let mut query = Vec::new();
        if let Some(service) = &challenge.service {
            query.push(("service", service.as_str()));
        }
        if let Some(scope) = &challenge.scope {
            query.push(("scope", scope.as_str()));
        }
        let response = self
            .client
            .get(&challenge.realm)
            .header("User-Agent", &self.user_agent)
            .query(&query)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VerifyError::Failed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let body: TokenResponse = response.json().await?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| VerifyError::Failed("token endpoint returned no token".to_string()))
    }

    async fn resolve_digest(
        &self,
        image: &ImageRef,
        token: &mut Option<String>,
    ) -> Result<String, VerifyError> {
        if let Some(digest) = &image.digest {
            return Ok(digest.clone());
        }
        let tag = match &image.tag {
            Some(tag) => tag.clone(),
            None => {
                let response = self.get(&self.url(image, "tags/list"), None, token).await?;
                if !response.status().is_success() {
                    return Err(VerifyError::Failed(format!(
                        "listing tags of {image} returned {}",
                        response.status()
                    )));
                }
                let list: TagList = response.json().await?;
                let tags = list.tags.unwrap_or_default();
                select_tag(&tags)
                    .ok_or_else(|| VerifyError::Failed(format!("{image} has no tags")))?
            }
        };

        let url = self.url(image, &format!("manifests/{tag}"));
        let response = self.get(&url, Some(MANIFEST_MEDIA_TYPES), token).await?;
        if !response.status().is_success() {
            return Err(VerifyError::Failed(format!(
                "manifest {tag} of {image} returned {}",
                response.status()
            )));
        }
        let header_digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        match header_digest {
            Some(digest) => Ok(digest),
            None => {
                let body = response.bytes().await?;
                Ok(format!("sha256:{:x}", Sha256::digest(&body)))
            }
        }
    }

    async fn list_signatures(&self, reference: &str) -> Result<Vec<String>, VerifyError> {
        let image = ImageRef::parse(reference)?;
        let mut token = None;
        let digest = self.resolve_digest(&image, &mut token).await?;
        let signature_tag = format!("{}.sig", digest.replacen(':', "-", 1));
        log::debug!("looking up {image}:{signature_tag}");

        let url = self.url(&image, &format!("manifests/{signature_tag}"));
        let response = self.get(&url, Some(MANIFEST_MEDIA_TYPES), &mut token).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(VerifyError::NoSignatures);
        }
        if !response.status().is_success() {
            return Err(VerifyError::Failed(format!(
                "signature manifest of {image} returned {}",
                response.status()
            )));
        }
        let manifest: SignatureManifest = response.json().await?;
        let signatures: Vec<String> = manifest
            .layers
            .into_iter()
            .filter_map(|mut layer| layer.annotations.remove(COSIGN_SIGNATURE_ANNOTATION))
            .collect();
        if signatures.is_empty() {
            return Err(VerifyError::NoSignatures);
        }
        Ok(signatures)
    }
}

impl SignatureVerifier for RegistryVerifier {
    fn signatures<'a>(
        &'a self,
        cancel: &'a CancelToken,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, VerifyError>> {
        Box::pin(cancel.guard(self.list_signatures(reference)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Challenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

fn bearer_challenge(headers: &HeaderMap) -> Option<Challenge> {
    let value = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?;
    let params = value.strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for pair in params.split(',') {
        let Some((key, raw)) = pair.trim().split_once('=') else {
            continue;
        };
        let raw = raw.trim_matches('"').to_string();
        match key {
            "realm" => realm = Some(raw),
            "service" => service = Some(raw),
            "scope" => scope = Some(raw),
            _ => {}
        }
    }
    Some(Challenge {
        realm: realm?,
        service,
        scope,
    })
}
