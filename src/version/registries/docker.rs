//! OCI distribution (Docker registry v2) implementation

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{LINK, WWW_AUTHENTICATE};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{Config, REGISTRY_TIMEOUT_MS, RegistryConfig};
use crate::image::{DEFAULT_REGISTRY_DOMAIN, Image};
use crate::version::error::RegistryError;
use crate::version::registry::Registry;

/// Host actually serving the Docker Hub registry API
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// Upper bound on `Link` pages followed for a single tag listing
const MAX_TAG_PAGES: usize = 1000;

static CHALLENGE_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());
static NEXT_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).unwrap());

/// Response from `GET /v2/<name>/tags/list`
#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Response from a bearer token realm
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

#[derive(Debug, Clone)]
enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Credentials {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

/// Registry implementation speaking the OCI distribution API
pub struct DockerRegistry {
    config: Config,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl DockerRegistry {
    pub fn new(config: Config) -> Result<Self, RegistryError> {
        let timeout = Duration::from_millis(REGISTRY_TIMEOUT_MS);
        let user_agent = concat!("fresh-container/", env!("CARGO_PKG_VERSION"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        let insecure_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            config,
            client,
            insecure_client,
        })
    }

    fn client_for(&self, registry: &RegistryConfig) -> &reqwest::Client {
        if registry.insecure {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    async fn ping(&self, client: &reqwest::Client, base_url: &Url) -> Result<(), RegistryError> {
        let url = join(base_url, "/v2/")?;
        let response = client.get(url.clone()).send().await?;
        let status = response.status();

        // 401 only means the registry wants credentials for the real calls
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            debug!("Registry ping {} answered {}", url, status);
            return Ok(());
        }

        Err(RegistryError::InvalidResponse(format!(
            "Ping to {} failed with status {}",
            url, status
        )))
    }

    async fn authenticate(
        &self,
        client: &reqwest::Client,
        registry: &RegistryConfig,
        image: &Image,
        response: &Response,
    ) -> Result<Credentials, RegistryError> {
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_challenge)
            .ok_or_else(|| {
                RegistryError::Unauthorized(format!(
                    "{} did not send a usable authentication challenge",
                    image.full_name_without_tag()
                ))
            })?;

        match challenge {
            Challenge::Basic if registry.has_credentials() => Ok(Credentials::Basic {
                username: registry.username.clone(),
                password: registry.password.clone(),
            }),
            Challenge::Basic => Err(RegistryError::Unauthorized(format!(
                "{} requires credentials",
                image.domain
            ))),
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let scope = scope.unwrap_or_else(|| format!("repository:{}:pull", image.path));
                let token = self
                    .fetch_token(client, registry, &realm, service.as_deref(), &scope)
                    .await?;
                Ok(Credentials::Bearer(token))
            }
        }
    }

    async fn fetch_token(
        &self,
        client: &reqwest::Client,
        registry: &RegistryConfig,
        realm: &str,
        service: Option<&str>,
        scope: &str,
    ) -> Result<String, RegistryError> {
        let mut url = Url::parse(realm)
            .map_err(|e| RegistryError::InvalidResponse(format!("bad realm '{}': {}", realm, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", scope);
        }

        debug!("Requesting registry token from {}", url);

        let mut request = client.get(url);
        if registry.has_credentials() {
            request = request.basic_auth(&registry.username, Some(&registry.password));
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Unauthorized(format!(
                "token realm {} answered {}",
                realm, status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::InvalidResponse("token response without token".into()))
    }
}

#[async_trait::async_trait]
impl Registry for DockerRegistry {
    async fn fetch_tags(&self, image: &Image) -> Result<Vec<String>, RegistryError> {
        let registry = self.config.registry_config(&image.domain);

        // Prevent non-ssl unless explicitly forced
        if !registry.non_ssl && registry.auth_domain.starts_with("http:") {
            return Err(RegistryError::Insecure(registry.auth_domain.clone()));
        }

        let client = self.client_for(&registry);
        let base_url = base_url(&image.domain, &registry)?;

        if !registry.skip_ping {
            self.ping(client, &base_url).await?;
        }

        let mut next = Some(join(&base_url, &format!("/v2/{}/tags/list", image.path))?);
        let mut credentials: Option<Credentials> = None;
        let mut tags = Vec::new();
        let mut visited = HashSet::new();

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                return Err(RegistryError::InvalidResponse(format!(
                    "Tag list pagination loops back to {}",
                    url
                )));
            }
            if visited.len() > MAX_TAG_PAGES {
                return Err(RegistryError::InvalidResponse(format!(
                    "Tag list for {} exceeds {} pages",
                    image.full_name_without_tag(),
                    MAX_TAG_PAGES
                )));
            }

            debug!("Fetching tags from {}", url);

            let send = |credentials: Option<&Credentials>| {
                let request = client.get(url.clone());
                match credentials {
                    Some(credentials) => credentials.apply(request).send(),
                    None => request.send(),
                }
            };

            let mut response = send(credentials.as_ref()).await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                let obtained = self
                    .authenticate(client, &registry, image, &response)
                    .await?;
                response = send(Some(&obtained)).await?;
                credentials = Some(obtained);
            }

            let response = check_status(response, image)?;

            next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_next_link)
                .map(|link| join(&url, &link))
                .transpose()?;

            let page: TagList = response.json().await.map_err(|e| {
                warn!("Failed to parse tag list response: {}", e);
                RegistryError::InvalidResponse(e.to_string())
            })?;
            tags.extend(page.tags.unwrap_or_default());
        }

        tags.sort();
        debug!(
            "Fetched {} tags for {}",
            tags.len(),
            image.full_name_without_tag()
        );

        Ok(tags)
    }
}

fn check_status(response: Response, image: &Image) -> Result<Response, RegistryError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound(image.full_name_without_tag()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(RegistryError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RegistryError::Unauthorized(image.full_name_without_tag()));
    }

    if !status.is_success() {
        warn!("Registry returned status {}: {}", status, response.url());
        return Err(RegistryError::InvalidResponse(format!(
            "Unexpected status: {}",
            status
        )));
    }

    Ok(response)
}

fn base_url(domain: &str, registry: &RegistryConfig) -> Result<Url, RegistryError> {
    let scheme = if registry.non_ssl { "http" } else { "https" };
    let host = if domain == DEFAULT_REGISTRY_DOMAIN {
        DOCKER_HUB_API_HOST
    } else {
        domain
    };

    Url::parse(&format!("{}://{}", scheme, host))
        .map_err(|e| RegistryError::InvalidResponse(format!("bad registry '{}': {}", domain, e)))
}

fn join(base: &Url, path: &str) -> Result<Url, RegistryError> {
    base.join(path)
        .map_err(|e| RegistryError::InvalidResponse(format!("bad URL '{}': {}", path, e)))
}

fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for captures in CHALLENGE_PARAM_RE.captures_iter(params) {
        let value = captures[2].to_string();
        match &captures[1] {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    Some(Challenge::Bearer {
        realm: realm?,
        service,
        scope,
    })
}

fn parse_next_link(header: &str) -> Option<String> {
    NEXT_LINK_RE
        .captures(header)
        .map(|captures| captures[1].to_string())
}
