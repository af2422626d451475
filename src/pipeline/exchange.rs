//! One request/response cycle as seen by the governance layer.

use std::mem;
use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode, Uri};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use super::RequestContext;

/// Readable request-body stream slot.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable response-body stream slot.
pub type BodyWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Immutable request line and headers, shared between the exchange and any
/// limit providers that outlive a borrow of it (e.g. bucket capacity
/// closures).
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute request URI including the query component.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Host header when present, otherwise the URI authority host.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| self.uri.host())
    }
}

/// The exchange handed to each stage: shared request head, swappable body
/// stream slots, a settable response status and a cancellation signal.
pub struct Exchange {
    head: Arc<RequestHead>,
    request_body: BodyReader,
    response_body: BodyWriter,
    status: StatusCode,
    cancel: CancellationToken,
}

impl Exchange {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        request_body: BodyReader,
        response_body: BodyWriter,
    ) -> Self {
        Self {
            head: Arc::new(RequestHead::new(method, uri, headers)),
            request_body,
            response_body,
            status: StatusCode::OK,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the exchange to an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Read-only view for computing per-exchange limit values.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(Arc::clone(&self.head))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Handle on the cancellation signal tied to this exchange's lifetime.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn request_body_mut(&mut self) -> &mut BodyReader {
        &mut self.request_body
    }

    pub fn response_body_mut(&mut self) -> &mut BodyWriter {
        &mut self.response_body
    }

    /// Replace the request-body stream with a decorator over the current one.
    pub fn wrap_request_body<F>(&mut self, wrap: F)
    where
        F: FnOnce(BodyReader) -> BodyReader,
    {
        let inner = mem::replace(&mut self.request_body, Box::new(tokio::io::empty()));
        self.request_body = wrap(inner);
    }

    /// Replace the response-body stream with a decorator over the current one.
    pub fn wrap_response_body<F>(&mut self, wrap: F)
    where
        F: FnOnce(BodyWriter) -> BodyWriter,
    {
        let inner = mem::replace(&mut self.response_body, Box::new(tokio::io::sink()));
        self.response_body = wrap(inner);
    }
}
