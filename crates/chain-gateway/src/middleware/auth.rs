//! Permission gate in front of the RPC transport.
//!
//! Loopback callers are trusted with every permission. Remote callers present
//! a bearer token (header or `token` query parameter) that the verification
//! service resolves to a permission level; callers without a token are
//! treated as anonymous readers. The resolved [`Permissions`] are stored as a
//! request extension for the handlers behind the layer.
//!
//! Every method the request names is checked before it is forwarded: the
//! JSON-RPC `method` of each call in the buffered body (single or batch) and
//! the `x-rpc-method` framing header.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::ConnectInfo,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::domain::error::ApiError;
use crate::domain::methods::required_permission;
use crate::domain::permission::{adapt_old_strategy, Permissions};
use crate::ports::outbound::{Verifier, VerifyRequest};

const BEARER_PREFIX: &str = "Bearer ";

/// Largest request body the gate buffers to read method names.
pub const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Permission gate layer
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<dyn Verifier>,
    service_name: Arc<str>,
}

impl AuthLayer {
    pub fn new(verifier: Arc<dyn Verifier>, service_name: impl Into<Arc<str>>) -> Self {
        Self {
            verifier,
            service_name: service_name.into(),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            verifier: Arc::clone(&self.verifier),
            service_name: Arc::clone(&self.service_name),
        }
    }
}

/// Permission gate service
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    verifier: Arc<dyn Verifier>,
    service_name: Arc<str>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verifier = Arc::clone(&self.verifier);
        let service_name = Arc::clone(&self.service_name);
        let mut inner = self.inner.clone();
        let caller = Caller::from_request(&req);
        let header_method = extract_method_from_request(&req);

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match to_bytes(body, MAX_REQUEST_BODY).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Unreadable request body");
                    return Ok(error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        ApiError::invalid_params("request body too large"),
                    ));
                }
            };

            let mut methods = methods_in_body(&body);
            methods.extend(header_method);

            let permissions = match resolve_permissions(caller, verifier.as_ref(), &service_name).await {
                Ok(perms) => perms,
                Err(message) => return Ok(unauthorized_response(message)),
            };

            for method in methods {
                let needed = required_permission(&method);
                if !permissions.has(needed) {
                    warn!(method = %method, needed = %needed, "Method access denied");
                    return Ok(unauthorized_response(&format!(
                        "missing permission to invoke '{method}' (need '{needed}')"
                    )));
                }
            }

            let mut req = Request::from_parts(parts, Body::from(body));
            req.extensions_mut().insert(permissions);
            inner.call(req).await
        })
    }
}

/// What the gate needs from a request, taken before any await
#[derive(Debug, Default)]
struct Caller {
    remote: Option<SocketAddr>,
    token: Option<String>,
    span_id: String,
    host: String,
}

impl Caller {
    fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            remote: remote_addr(req),
            token: extract_token(req),
            span_id: header_str(req, "spanId").unwrap_or_default().to_string(),
            host: header_str(req, header::HOST.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Work out the caller's permissions; `Err` carries the 401 message.
async fn resolve_permissions(
    caller: Caller,
    verifier: &dyn Verifier,
    service_name: &str,
) -> Result<Permissions, &'static str> {
    if caller.remote.is_some_and(|addr| is_loopback(addr.ip())) {
        return Ok(Permissions::all());
    }

    let Some(token) = caller.token else {
        return Ok(Permissions::anonymous());
    };

    let Some(token) = token.strip_prefix(BEARER_PREFIX) else {
        warn!("Missing Bearer prefix in auth header");
        return Err("missing Bearer prefix");
    };

    let request = VerifyRequest {
        span_id: caller.span_id,
        service_name: service_name.to_string(),
        pre_host: caller.remote.map(|a| a.to_string()).unwrap_or_default(),
        host: caller.host,
    };

    match verifier.verify(&request, token).await {
        Ok(res) => {
            debug!(name = %res.name, perm = %res.perm, "Token verified");
            Ok(adapt_old_strategy(&res.perm))
        }
        Err(e) => {
            warn!(remote = %request.pre_host, error = %e, "JWT verification failed");
            Err("token verification failed")
        }
    }
}

fn remote_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
}

fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Token from the Authorization header, else from the `token` query
/// parameter (which gets the bearer prefix added).
fn extract_token<B>(req: &Request<B>) -> Option<String> {
    if let Some(auth) = header_str(req, header::AUTHORIZATION.as_str()) {
        if !auth.is_empty() {
            return Some(auth.to_string());
        }
    }

    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(|token| format!("{BEARER_PREFIX}{token}"))
}

/// Method name set by the JSON-RPC framing layer
fn extract_method_from_request<B>(req: &Request<B>) -> Option<String> {
    header_str(req, "x-rpc-method").map(str::to_string)
}

/// JSON-RPC method names in a request body: one call or a batch.
///
/// A body that is not JSON names no methods; the transport rejects it.
fn methods_in_body(body: &Bytes) -> Vec<String> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let calls = match value {
        serde_json::Value::Array(calls) => calls,
        call => vec![call],
    };
    calls
        .iter()
        .filter_map(|call| call.get("method")?.as_str())
        .map(str::to_string)
        .collect()
}

/// Whether an address is a loopback address
pub fn is_loopback(ip: IpAddr) -> bool {
    ip.is_loopback()
}

fn unauthorized_response(message: &str) -> Response {
    let mut response = error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized(message));
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

fn error_response(status: StatusCode, error: ApiError) -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "error": error,
        "id": null
    });

    let mut response = Response::new(Body::from(serde_json::to_vec(&body).unwrap_or_default()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
