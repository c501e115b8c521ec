use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

use crate::domain::{
    ConnectRequest, Deadline, Dispatch, ProxyError, ProxyMethod, ProxyRequest, ProxyResponse, ProxyService,
};

pub type Body = BoxBody<Bytes, hyper::Error>;

/// Translates between hyper and the domain, and owns the connection
/// hijack for CONNECT.
pub struct HyperProxyAdapter {
    service: Arc<ProxyService>,
    max_body_size: usize,
    /// Bound on receiving a request body, measured from the end of the head.
    body_timeout: Duration,
}

impl HyperProxyAdapter {
    pub fn new(service: Arc<ProxyService>, max_body_size: usize, body_timeout: Duration) -> Self {
        Self {
            service,
            max_body_size,
            body_timeout,
        }
    }

    pub fn service(&self) -> &Arc<ProxyService> {
        &self.service
    }

    /// Entry point for every inbound request: classify once, fix the
    /// deadline, dispatch.
    pub async fn handle(&self, req: Request<Incoming>, peer: Option<SocketAddr>) -> Response<Body> {
        let method = convert_method(req.method());
        let dispatch = Dispatch::classify(&method);
        let deadline = self.service.deadlines().deadline_for(dispatch);

        match dispatch {
            Dispatch::Tunnel => self.handle_connect(req, deadline, peer).await,
            Dispatch::Forward => self.handle_http(req, method, deadline, peer).await,
        }
    }

    async fn handle_http(
        &self,
        req: Request<Incoming>,
        method: ProxyMethod,
        deadline: Deadline,
        peer: Option<SocketAddr>,
    ) -> Response<Body> {
        let target = extract_target(&req);
        let (parts, body) = req.into_parts();

        let body = Deadline::after(self.body_timeout)
            .run(read_body(body, &parts.headers, self.max_body_size))
            .await
            .unwrap_or_else(|elapsed| Err(elapsed.into()));

        let body = match body {
            Ok(body) => body,
            Err(ProxyError::Timeout) => {
                debug!("Timed out reading body of {} {}", method.as_str(), target);
                let mut response = full(StatusCode::REQUEST_TIMEOUT, Bytes::new());
                response
                    .headers_mut()
                    .insert(header::CONNECTION, header::HeaderValue::from_static("close"));
                return response;
            }
            Err(ProxyError::BodyTooLarge(limit)) => {
                debug!("Rejecting {} {}: body larger than {} bytes", method.as_str(), target, limit);
                return full(StatusCode::PAYLOAD_TOO_LARGE, Bytes::new());
            }
            Err(e) => {
                debug!("Failed to read request body: {}", e);
                return full(StatusCode::BAD_REQUEST, Bytes::new());
            }
        };

        let request = ProxyRequest::new(method, target)
            .with_headers(parts.headers)
            .with_body(body);
        self.service.inspect_target(request.host());

        match self.service.forward(&request, deadline, peer).await {
            Ok(response) => into_hyper_response(response),
            Err(_) => into_hyper_response(ProxyResponse::unreachable()),
        }
    }

    async fn handle_connect(
        &self,
        req: Request<Incoming>,
        deadline: Deadline,
        peer: Option<SocketAddr>,
    ) -> Response<Body> {
        let authority = req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| req.uri().to_string());
        let connect_req = ConnectRequest::new(authority);
        self.service.inspect_target(connect_req.host());

        let session = match self.service.open_tunnel(&connect_req, deadline).await {
            Ok(session) => session,
            Err(_) => return into_hyper_response(ProxyResponse::unreachable()),
        };

        let service = self.service.clone();
        tokio::spawn(
            async move {
                match session.deadline.run(hyper::upgrade::on(req)).await {
                    Ok(Ok(upgraded)) => {
                        service.run_tunnel(session, TokioIo::new(upgraded), peer).await;
                    }
                    Ok(Err(e)) => warn!("Failed to upgrade CONNECT to {}: {}", session.target, e),
                    Err(_) => warn!("Timed out waiting for CONNECT upgrade to {}", session.target),
                }
            }
            .in_current_span(),
        );

        full(StatusCode::OK, Bytes::new())
    }
}

/// Absolute URL for a forward request: the request target when it is in
/// absolute form, otherwise rebuilt from the `Host` header. Left untouched
/// when neither is usable, so the client fails on it later.
fn extract_target(req: &Request<Incoming>) -> String {
    let uri = req.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    match req.headers().get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{}{}", host, path),
        None => uri.to_string(),
    }
}

async fn read_body(body: Incoming, headers: &hyper::HeaderMap, limit: usize) -> Result<Bytes, ProxyError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(ProxyError::BodyTooLarge(limit));
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ProxyError::BodyTooLarge(limit)),
        Err(e) => Err(ProxyError::InvalidRequest(e.to_string())),
    }
}

fn convert_method(method: &Method) -> ProxyMethod {
    match *method {
        Method::GET => ProxyMethod::Get,
        Method::POST => ProxyMethod::Post,
        Method::PUT => ProxyMethod::Put,
        Method::DELETE => ProxyMethod::Delete,
        Method::HEAD => ProxyMethod::Head,
        Method::OPTIONS => ProxyMethod::Options,
        Method::CONNECT => ProxyMethod::Connect,
        Method::PATCH => ProxyMethod::Patch,
        Method::TRACE => ProxyMethod::Trace,
        ref other => ProxyMethod::Other(other.to_string()),
    }
}

fn into_hyper_response(response: ProxyResponse) -> Response<Body> {
    let mut hyper_response = full(response.status, response.body);
    hyper_response.headers_mut().extend(response.headers);
    hyper_response
}

pub(crate) fn full(status: StatusCode, body: Bytes) -> Response<Body> {
    let body = if body.is_empty() {
        Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
    } else {
        Full::new(body).map_err(|never| match never {}).boxed()
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_method() {
        assert_eq!(convert_method(&Method::CONNECT), ProxyMethod::Connect);
        assert_eq!(convert_method(&Method::PATCH), ProxyMethod::Patch);
        let custom = Method::from_bytes(b"PURGE").unwrap();
        assert_eq!(convert_method(&custom), ProxyMethod::Other("PURGE".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_response_is_503_with_fixed_body() {
        let response = into_hyper_response(ProxyResponse::unreachable());
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"could not reach upstream server.");
    }

    #[tokio::test]
    async fn test_upstream_headers_are_passed_through() {
        let mut headers = hyper::HeaderMap::new();
        headers.insert("x-origin", "a".parse().unwrap());
        let response = ProxyResponse::new(StatusCode::NOT_FOUND).with_headers(headers);

        let response = into_hyper_response(response);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-origin"], "a");
    }
}
