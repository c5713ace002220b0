// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication, status normalization and `ETag` handling.

use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use crate::config::{AuthMethod, CalDavConfig};
use crate::error::CalDavError;
use crate::response::MultiStatusResponse;
use crate::types::{ETag, Href};
use crate::xml::is_need_privileges;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const ICAL_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

/// `Depth` header of PROPFIND and REPORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself.
    Zero,
    /// The resource and its direct members.
    One,
    /// The whole subtree.
    Infinity,
}

impl Depth {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

/// Write precondition of PUT and DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write.
    None,
    /// `If-Match`: the stored revision must still be this one.
    IfMatch(ETag),
    /// `If-None-Match: *`: the resource must not exist yet.
    IfNoneMatch,
}

/// Capabilities advertised by OPTIONS.
#[derive(Debug, Clone, Default)]
pub struct OptionsResponse {
    /// Compliance classes of the `DAV` header.
    pub dav: Vec<String>,
    /// Methods of the `Allow` header, upper-cased.
    pub allow: Vec<String>,
}

impl OptionsResponse {
    /// Returns true if the `DAV` header lists a compliance class.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.dav.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Returns true if the `Allow` header lists a method.
    #[must_use]
    pub fn allows(&self, method: &str) -> bool {
        self.allow.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Result of a GET.
#[derive(Debug, Clone)]
pub struct GetResponse {
    /// Address the body was finally served from.
    pub href: Href,
    /// `ETag` header, if sent.
    pub etag: Option<ETag>,
    /// Response body.
    pub body: String,
}

/// Result of a PUT.
#[derive(Debug, Clone)]
pub struct PutResponse {
    /// `Location` header, or the address written to.
    pub locator: Href,
    /// `ETag` header, if sent.
    pub etag: Option<ETag>,
}

/// HTTP client for `CalDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth: AuthMethod,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: &CalDavConfig) -> Result<Self, CalDavError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CalDavError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
        })
    }

    /// Builds a full URL from an href.
    #[must_use]
    pub fn full_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", self.base_url, href)
        } else {
            format!("{}/{}", self.base_url, href)
        }
    }

    /// Host of the base URL, used for quirk detection.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Executes a request and normalizes unsuccessful statuses.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or returns an error status code.
    pub async fn execute(&self, req: RequestBuilder) -> Result<Response, CalDavError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let url = resp.url().path().to_string();
        let text = resp.text().await.unwrap_or_default();
        Err(self.status_error(status, &url, text))
    }

    fn status_error(&self, status: StatusCode, url: &str, body: String) -> CalDavError {
        let has_credentials = self.auth.has_credentials();
        let reason = status.canonical_reason().unwrap_or("Unknown status");
        match status {
            StatusCode::UNAUTHORIZED if has_credentials => {
                CalDavError::AuthenticationFailed(reason.to_string())
            }
            StatusCode::UNAUTHORIZED => CalDavError::AuthenticationRequired(reason.to_string()),
            StatusCode::FORBIDDEN if !has_credentials => {
                CalDavError::AuthenticationRequired(reason.to_string())
            }
            StatusCode::FORBIDDEN if is_need_privileges(&body) => {
                CalDavError::PermissionDenied(url.to_string())
            }
            StatusCode::NOT_FOUND => CalDavError::NotFound(url.to_string()),
            StatusCode::PRECONDITION_FAILED => CalDavError::PreconditionFailed(url.to_string()),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                CalDavError::Transient(format!("{status} for {url}"))
            }
            _ => CalDavError::Http {
                status: status.as_u16(),
                message: if body.trim().is_empty() {
                    reason.to_string()
                } else {
                    body
                },
            },
        }
    }

    /// OPTIONS: reads the `DAV` and `Allow` headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn options(&self, href: &str) -> Result<OptionsResponse, CalDavError> {
        let url = self.full_url(href);
        tracing::debug!(url = %url, "OPTIONS");
        let resp = self
            .execute(self.build_request(Method::OPTIONS, &url))
            .await?;
        Ok(OptionsResponse {
            dav: header_list(resp.headers(), &HeaderName::from_static("dav")),
            allow: header_list(resp.headers(), &reqwest::header::ALLOW)
                .into_iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
        })
    }

    /// PROPFIND with an XML body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the multistatus does not parse.
    pub async fn propfind(
        &self,
        href: &str,
        depth: Depth,
        body: String,
    ) -> Result<MultiStatusResponse, CalDavError> {
        self.multistatus(b"PROPFIND", href, depth, body).await
    }

    /// REPORT with an XML body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the multistatus does not parse.
    pub async fn report(
        &self,
        href: &str,
        depth: Depth,
        body: String,
    ) -> Result<MultiStatusResponse, CalDavError> {
        self.multistatus(b"REPORT", href, depth, body).await
    }

    /// REPORT whose answer is not a multistatus, such as `free-busy-query`.
    ///
    /// Returns the response content type and body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn report_raw(
        &self,
        href: &str,
        depth: Depth,
        body: String,
    ) -> Result<(Option<String>, String), CalDavError> {
        let url = self.full_url(href);
        let method = Method::from_bytes(b"REPORT")
            .map_err(|e| CalDavError::Config(format!("Invalid method: {e}")))?;
        tracing::debug!(url = %url, depth = depth.as_str(), "REPORT");

        let resp = self
            .execute(
                self.build_request(method, &url)
                    .header("Depth", depth.as_str())
                    .header("Content-Type", XML_CONTENT_TYPE)
                    .body(body),
            )
            .await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((content_type, resp.text().await?))
    }

    async fn multistatus(
        &self,
        verb: &'static [u8],
        href: &str,
        depth: Depth,
        body: String,
    ) -> Result<MultiStatusResponse, CalDavError> {
        let url = self.full_url(href);
        let method = Method::from_bytes(verb)
            .map_err(|e| CalDavError::Config(format!("Invalid method: {e}")))?;
        tracing::debug!(%method, url = %url, depth = depth.as_str(), "dispatching multistatus request");

        let resp = self
            .execute(
                self.build_request(method, &url)
                    .header("Depth", depth.as_str())
                    .header("Content-Type", XML_CONTENT_TYPE)
                    .body(body),
            )
            .await?;
        let xml = resp.text().await?;
        MultiStatusResponse::from_xml(&xml)
    }

    /// GET of one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get(&self, href: &str) -> Result<GetResponse, CalDavError> {
        let url = self.full_url(href);
        tracing::debug!(url = %url, "GET");
        let resp = self.execute(self.build_request(Method::GET, &url)).await?;
        let etag = extract_etag(resp.headers());
        let href = Href::new(resp.url().path().to_string());
        let body = resp.text().await?;
        Ok(GetResponse { href, etag, body })
    }

    /// PUT of one calendar object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn put(
        &self,
        href: &str,
        precondition: &Precondition,
        body: String,
    ) -> Result<PutResponse, CalDavError> {
        let url = self.full_url(href);
        tracing::debug!(url = %url, ?precondition, "PUT");
        let req = with_precondition(
            self.build_request(Method::PUT, &url)
                .header("Content-Type", ICAL_CONTENT_TYPE)
                .body(body),
            precondition,
        );
        let resp = self.execute(req).await?;
        let locator = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Href::new(href.to_string()), Href::from);
        Ok(PutResponse {
            locator,
            etag: extract_etag(resp.headers()),
        })
    }

    /// DELETE of one calendar object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete(
        &self,
        href: &str,
        precondition: &Precondition,
        suppress_reply: bool,
    ) -> Result<(), CalDavError> {
        let url = self.full_url(href);
        tracing::debug!(url = %url, ?precondition, suppress_reply, "DELETE");
        let mut req = with_precondition(self.build_request(Method::DELETE, &url), precondition);
        if suppress_reply {
            req = req.header("Schedule-Reply", "F");
        }
        let _ = self.execute(req).await?;
        Ok(())
    }

    /// POST of a body, returning the response text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post(
        &self,
        href: &str,
        content_type: &str,
        body: String,
    ) -> Result<String, CalDavError> {
        let url = self.full_url(href);
        tracing::debug!(url = %url, content_type, "POST");
        let resp = self
            .execute(
                self.build_request(Method::POST, &url)
                    .header("Content-Type", content_type)
                    .body(body),
            )
            .await?;
        Ok(resp.text().await?)
    }
}

fn with_precondition(req: RequestBuilder, precondition: &Precondition) -> RequestBuilder {
    match precondition {
        Precondition::None => req,
        Precondition::IfMatch(etag) => req.header("If-Match", etag.header_value()),
        Precondition::IfNoneMatch => req.header("If-None-Match", "*"),
    }
}

/// Extracts `ETag` from response headers.
fn extract_etag(headers: &HeaderMap) -> Option<ETag> {
    headers
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(ETag::from)
}

fn header_list(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
