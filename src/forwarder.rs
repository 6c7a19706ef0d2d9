use crate::error::GatewayError;
use crate::routes::RouteMatch;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::header::{CONNECTION, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use futures::stream::{self, Stream};
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Streams a request to its matched backend and the answer back.
///
/// Neither body is buffered. Dropping the returned future (client went
/// away before headers) or the response body (client went away mid-stream)
/// drops the backend connection with it.
///
/// `timeout` bounds the wait for response headers and then every gap
/// between body chunks; a stalled backend ends the relayed body with an error.
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }

    pub async fn forward(
        &self,
        matched: &RouteMatch<'_>,
        request: Request,
        client_ip: Option<IpAddr>,
    ) -> Result<Response, GatewayError> {
        let route = matched.route;
        let url = format!("{}{}", route.target, matched.path);
        let (parts, body) = request.into_parts();

        let mut headers = strip_hop_by_hop(&parts.headers);
        // reqwest derives Host from the target URL
        headers.remove(HOST);
        if let Some(host) = parts.headers.get(HOST) {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut headers, ip);
        }
        // re-assert Content-Type on bodies, some layers drop it
        if carries_body(&parts.method) {
            if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
        }

        let mut outbound = self.client.request(parts.method.clone(), &url).headers(headers);
        if HttpBody::size_hint(&body).exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        debug!(backend = %route.name, method = %parts.method, %url, "forwarding request");

        let upstream = match tokio::time::timeout(self.timeout, outbound.send()).await {
            Err(_) => return Err(self.timed_out(&route.name)),
            Ok(Err(e)) if e.is_timeout() => return Err(self.timed_out(&route.name)),
            Ok(Err(e)) => {
                return Err(GatewayError::BackendUnavailable {
                    backend: route.name.clone(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok(res)) => res,
        };

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers());

        let body = idle_bounded(upstream, self.timeout, route.name.clone());
        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn timed_out(&self, backend: &str) -> GatewayError {
        GatewayError::BackendTimeout {
            backend: backend.to_string(),
            after: self.timeout,
        }
    }
}

// Relay body chunks, failing once the backend stays silent for `idle`
fn idle_bounded(
    upstream: reqwest::Response,
    idle: Duration,
    backend: String,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::unfold(Some(upstream), move |state| {
        let backend = backend.clone();
        async move {
            let Some(mut upstream) = state else {
                return None;
            };
            match tokio::time::timeout(idle, upstream.chunk()).await {
                Ok(Ok(Some(chunk))) => Some((Ok(chunk), Some(upstream))),
                Ok(Ok(None)) => None,
                Ok(Err(e)) => Some((Err(io::Error::other(e)), None)),
                Err(_) => {
                    warn!(%backend, ?idle, "backend stalled mid-body");
                    Some((
                        Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("backend {backend} sent nothing for {idle:?}"),
                        )),
                        None,
                    ))
                }
            }
        }
    })
}

fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

// Copy headers minus hop-by-hop ones, including any named in Connection
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .collect();

    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || listed.iter().any(|l| l == name_str) {
            continue;
        }
        kept.append(name.clone(), value.clone());
    }
    kept
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
