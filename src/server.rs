//! HTTP/1 server exposing the image proxy.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;

use crate::fetch::Fetcher;
use crate::proxy::{proxy_image, ProxyReply, PROXY_IMAGE_PATH};

/// Default time a client gets to send a complete request head.
pub const DEFAULT_HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections on `listener` until it fails, serving each on its own task.
///
/// A connection that has not delivered a full request head within
/// `header_read_timeout` is closed.
pub async fn serve(
    listener: TcpListener,
    fetcher: Arc<Fetcher>,
    header_read_timeout: Duration,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let fetcher = Arc::clone(&fetcher);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let fetcher = Arc::clone(&fetcher);
                async move { Ok::<_, Infallible>(handle(&fetcher, req).await) }
            });

            if let Err(e) = http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(header_read_timeout)
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(peer = %peer, error = %e, "connection closed with error");
            }
        });
    }
}

/// Route one request.
pub async fn handle(fetcher: &Fetcher, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if req.uri().path() != PROXY_IMAGE_PATH {
        return plain(StatusCode::NOT_FOUND, "Not found");
    }
    if req.method() != Method::GET {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    let query = req.uri().query().map(str::to_string);
    drop(req);

    let reply = proxy_image(fetcher, query.as_deref()).await;
    into_response(reply)
}

fn into_response(reply: ProxyReply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(reply.body));
    *response.status_mut() = reply.status;
    if let Ok(value) = header::HeaderValue::from_str(&reply.content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

fn plain(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    into_response(ProxyReply::text(status, message))
}
