use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

use super::connector::HyperConnector;
use crate::domain::{Deadline, ProxyError, ProxyMethod, ProxyRequest, ProxyResponse, Result};
use crate::ports::HttpClientPort;

/// Headers that only make sense on a single hop and are never relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

pub struct HyperHttpClient {
    client: Client<HyperConnector, Full<Bytes>>,
}

impl HyperHttpClient {
    pub fn new(connector: HyperConnector, idle_timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(idle_timeout)
            .build(connector);
        Self { client }
    }

    fn build_hyper_request(&self, domain_req: &ProxyRequest) -> Result<Request<Full<Bytes>>> {
        let uri: Uri = domain_req
            .target
            .parse()
            .map_err(|e| ProxyError::InvalidUri(format!("{}: {}", domain_req.target, e)))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ProxyError::InvalidUri(format!("unsupported scheme {}", other))),
            None => return Err(ProxyError::MissingHost),
        }

        let mut headers = domain_req.headers.clone();
        strip_hop_by_hop(&mut headers);

        let mut req = Request::builder().method(convert_method(&domain_req.method)?).uri(uri);
        if let Some(req_headers) = req.headers_mut() {
            req_headers.extend(headers);
        }

        req.body(Full::new(domain_req.body.clone()))
            .map_err(|e| ProxyError::InvalidRequest(format!("{}", e)))
    }

    async fn round_trip(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        let hyper_req = self.build_hyper_request(request)?;

        let hyper_resp = self
            .client
            .request(hyper_req)
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("{}", e)))?;

        let status = hyper_resp.status();
        let mut headers = hyper_resp.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let body = hyper_resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::UpstreamError(format!("{}", e)))?
            .to_bytes();

        Ok(ProxyResponse::new(status).with_headers(headers).with_body(body))
    }
}

#[async_trait]
impl HttpClientPort for HyperHttpClient {
    async fn execute(&self, request: &ProxyRequest, deadline: Deadline) -> Result<ProxyResponse> {
        deadline.run(self.round_trip(request)).await?
    }
}

/// Removes hop-by-hop headers, including any named by `Connection` or the
/// non-standard `Proxy-Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("proxy-connection");
}

fn convert_method(method: &ProxyMethod) -> Result<Method> {
    Ok(match method {
        ProxyMethod::Get => Method::GET,
        ProxyMethod::Post => Method::POST,
        ProxyMethod::Put => Method::PUT,
        ProxyMethod::Delete => Method::DELETE,
        ProxyMethod::Head => Method::HEAD,
        ProxyMethod::Options => Method::OPTIONS,
        ProxyMethod::Connect => Method::CONNECT,
        ProxyMethod::Patch => Method::PATCH,
        ProxyMethod::Trace => Method::TRACE,
        ProxyMethod::Other(s) => Method::from_bytes(s.as_bytes())
            .map_err(|e| ProxyError::InvalidRequest(format!("invalid method {}: {}", s, e)))?,
    })
}
