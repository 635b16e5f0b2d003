//! Extractor giving each handler its cookie context and a fresh render scope.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use sesh_cache::{RenderScope, RequestContext};

/// What a page handler needs to run session-scoped queries.
pub struct PageRequest {
    pub ctx: RequestContext,
    pub render: RenderScope,
}

impl PageRequest {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        // Browsers send one Cookie header, HTTP/2 clients may split it.
        let header = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            ctx: RequestContext::from_cookie_header(&header),
            render: RenderScope::new(),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for PageRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_reads_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; browser-session-id=abc"));
        let req = PageRequest::from_headers(&headers);
        assert_eq!(req.ctx.session_token().unwrap().as_str(), "abc");
        assert!(req.render.is_empty());
    }

    #[test]
    fn test_split_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("browser-session-id=xyz"));
        let req = PageRequest::from_headers(&headers);
        assert_eq!(req.ctx.session_token().unwrap().as_str(), "xyz");
    }

    #[test]
    fn test_no_cookie() {
        let req = PageRequest::from_headers(&HeaderMap::new());
        assert!(req.ctx.session_token().is_none());
    }
}
