use crate::error::AppError;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use ipnetwork::IpNetwork;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::net::{IpAddr, SocketAddr};
use tower_governor::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

/// Which limiter turned a request away. Each tier keeps its own per-IP buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitTier {
    /// Password login, limited to a few attempts per window.
    Login,
    /// Signup, federated login and password recovery.
    Credential,
    Standard,
}

impl RateLimitTier {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Credential => "credential",
            Self::Standard => "standard",
        }
    }

    #[must_use]
    pub const fn rejection_message(self) -> &'static str {
        match self {
            Self::Login => "Too many login attempts from this IP, please try again after a while.",
            Self::Credential => "Too many attempts from this IP, please try again after a while.",
            Self::Standard => "Too many requests, please slow down.",
        }
    }
}

#[derive(Clone, Debug)]
struct Metrics {
    rejections_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            rejections_total: meter
                .u64_counter("rate_limit_rejections_total")
                .with_description("Requests turned away by a rate limiter, by tier")
                .build(),
        }
    }
}

/// Keys rate limit buckets by client IP.
///
/// `X-Forwarded-For` is honoured only when the socket peer is a trusted proxy;
/// the client is then the rightmost hop that is not itself trusted.
#[derive(Clone, Debug)]
pub struct ClientIpKeyExtractor {
    trusted_proxies: Vec<IpNetwork>,
}

impl ClientIpKeyExtractor {
    #[must_use]
    pub fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { trusted_proxies }
    }

    #[must_use]
    pub fn client_ip(&self, headers: &HeaderMap, peer: IpAddr) -> IpAddr {
        if !self.is_trusted(peer) {
            return peer;
        }

        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| {
                chain.rsplit(',').filter_map(|hop| hop.trim().parse::<IpAddr>().ok()).find(|ip| !self.is_trusted(*ip))
            })
            .unwrap_or(peer)
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.client_ip(req.headers(), peer))
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitService {
    pub extractor: ClientIpKeyExtractor,
    metrics: Metrics,
}

impl RateLimitService {
    #[must_use]
    pub fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { extractor: ClientIpKeyExtractor::new(trusted_proxies), metrics: Metrics::new() }
    }

    /// Renders a limiter failure through the JSON error envelope, keeping the
    /// `retry-after` headers the limiter attached.
    #[must_use]
    pub fn reject(&self, tier: RateLimitTier, error: GovernorError) -> Response<Body> {
        match error {
            GovernorError::TooManyRequests { wait_time, headers } => {
                tracing::warn!(tier = tier.label(), retry_after_secs = wait_time, "Rate limit exceeded");
                self.metrics.rejections_total.add(1, &[KeyValue::new("tier", tier.label())]);

                let mut response = AppError::RateLimited(tier.rejection_message().to_string()).into_response();
                if let Some(headers) = headers {
                    response.headers_mut().extend(headers);
                }
                response
            }
            GovernorError::UnableToExtractKey => {
                tracing::error!(tier = tier.label(), "Could not determine client address for rate limiting");
                AppError::Internal.into_response()
            }
            GovernorError::Other { code, msg, headers } => {
                tracing::warn!(tier = tier.label(), status = %code, "Rate limiter rejected request");
                let mut response = AppError::RateLimited(msg.unwrap_or_else(|| tier.rejection_message().to_string()))
                    .into_response();
                *response.status_mut() = code;
                if let Some(headers) = headers {
                    response.headers_mut().extend(headers);
                }
                response
            }
        }
    }

    /// Error handler for a `GovernorLayer` guarding `tier`.
    #[must_use]
    pub fn rejection_handler(
        &self,
        tier: RateLimitTier,
    ) -> impl Fn(GovernorError) -> Response<Body> + Send + Sync + 'static {
        let service = self.clone();
        move |error| service.reject(tier, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{HeaderValue, StatusCode, header};

    fn extractor() -> ClientIpKeyExtractor {
        ClientIpKeyExtractor::new(vec!["10.0.0.0/8".parse().unwrap()])
    }

    fn forwarded(chain: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", chain.parse().unwrap());
        headers
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_header() {
        let peer: IpAddr = "203.0.113.9".parse().unwrap();
        assert_eq!(extractor().client_ip(&forwarded("1.2.3.4"), peer), peer);
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            extractor().client_ip(&forwarded("198.51.100.1, 203.0.113.7, 10.0.0.2"), peer),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_trusted_proxy_without_usable_hop_falls_back_to_peer() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(extractor().client_ip(&forwarded("garbage, 10.0.0.3"), peer), peer);
        assert_eq!(extractor().client_ip(&HeaderMap::new(), peer), peer);
    }

    #[test]
    fn test_missing_connect_info_cannot_be_keyed() {
        let req = Request::builder().uri("/api/v1/auth/login").body(()).unwrap();
        assert!(matches!(extractor().extract(&req), Err(GovernorError::UnableToExtractKey)));
    }

    #[tokio::test]
    async fn test_login_rejection_uses_json_envelope_and_keeps_retry_headers() {
        let service = RateLimitService::new(vec![]);
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from(180_u64));

        let error = GovernorError::TooManyRequests { wait_time: 180, headers: Some(headers) };
        let response = service.reject(RateLimitTier::Login, error);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "180");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "Too many login attempts from this IP, please try again after a while.");
    }

    #[test]
    fn test_unkeyed_request_is_an_internal_error() {
        let service = RateLimitService::new(vec![]);
        let response = service.reject(RateLimitTier::Standard, GovernorError::UnableToExtractKey);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
