//! Read-only request view for limit-value providers.

use std::sync::Arc;

use http::{HeaderMap, Method, Uri};

use super::RequestHead;

/// Cheap-to-clone view of the request head.
///
/// Providers receive this to compute dynamic limit values (per host, per
/// method, per header). The governance layer never mutates it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    head: Arc<RequestHead>,
}

impl RequestContext {
    pub(crate) fn new(head: Arc<RequestHead>) -> Self {
        Self { head }
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn host(&self) -> Option<&str> {
        self.head.host()
    }
}
