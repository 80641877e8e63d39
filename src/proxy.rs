//! The `GET /proxy-image?url=...` boundary.
//!
//! Framework-agnostic: takes the raw query string and returns status, content
//! type and body. Operator detail goes to the log; the end user only ever
//! sees a status code and a short message.

use bytes::Bytes;
use http::StatusCode;

use crate::error::Error;
use crate::fetch::Fetcher;

/// Path the image proxy is served on.
pub const PROXY_IMAGE_PATH: &str = "/proxy-image";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Response to a proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyReply {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl ProxyReply {
    pub(crate) fn text(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN.to_string(),
            body: Bytes::from_static(message.as_bytes()),
        }
    }
}

/// Extract the `url` parameter from a query string (`a=1&url=https%3A...`).
/// Empty values count as missing.
pub fn url_param(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Handle one proxy request.
pub async fn proxy_image(fetcher: &Fetcher, query: Option<&str>) -> ProxyReply {
    let Some(url) = url_param(query) else {
        return ProxyReply::text(StatusCode::BAD_REQUEST, "URL required");
    };

    match fetcher.fetch(&url).await {
        Ok(image) => {
            tracing::debug!(
                url = %url,
                final_url = %image.final_url,
                redirects = image.redirects,
                bytes = image.body.len(),
                "proxied image"
            );
            ProxyReply {
                status: StatusCode::OK,
                content_type: image.content_type,
                body: image.body,
            }
        }
        Err(e) => {
            log_refusal(&url, &e);
            ProxyReply::text(e.status_code(), e.public_message())
        }
    }
}

fn log_refusal(url: &str, error: &Error) {
    match error {
        Error::ContentTooLarge { .. } => {
            tracing::warn!(url = %url, error = %error, "proxy blocked large image");
        }
        _ => {
            tracing::warn!(url = %url, error = %error, "proxy blocked or failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_param_decodes() {
        assert_eq!(
            url_param(Some("url=https%3A%2F%2Fa.example%2Fc.jpg%3Fw%3D200")),
            Some("https://a.example/c.jpg?w=200".to_string())
        );
        assert_eq!(
            url_param(Some("size=large&url=http://b.example/x.png")),
            Some("http://b.example/x.png".to_string())
        );
    }

    #[test]
    fn test_url_param_missing() {
        assert_eq!(url_param(None), None);
        assert_eq!(url_param(Some("")), None);
        assert_eq!(url_param(Some("url=")), None);
        assert_eq!(url_param(Some("link=https://a.example/")), None);
    }

    #[test]
    fn test_text_reply() {
        let reply = ProxyReply::text(StatusCode::BAD_REQUEST, "URL required");
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.content_type, TEXT_PLAIN);
        assert_eq!(reply.body, Bytes::from_static(b"URL required"));
    }
}
