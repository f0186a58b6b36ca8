use crate::ActiveSet;
use anyhow::Result;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::{convert::Infallible, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tracing::{debug, info, instrument};

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Serves `/metrics`, `/ready` and `/active`.
#[derive(Clone, Debug)]
pub(crate) struct Admin {
    prom: Arc<Registry>,
    ready: watch::Receiver<bool>,
    active: ActiveSet,
}

type Body = Full<Bytes>;

impl Admin {
    pub(crate) fn new(prom: Registry, ready: watch::Receiver<bool>, active: ActiveSet) -> Self {
        Self {
            prom: Arc::new(prom),
            ready,
            active,
        }
    }

    #[instrument(skip(self, listener), fields(addr = ?listener.local_addr().ok()))]
    pub(crate) async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("HTTP admin server listening");
        loop {
            let (io, peer) = listener.accept().await?;
            let admin = self.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let rsp = admin.handle(&req);
                    async move { Ok::<_, Infallible>(rsp) }
                });
                if let Err(error) = http1::Builder::new()
                    .serve_connection(TokioIo::new(io), svc)
                    .await
                {
                    debug!(%peer, %error, "Admin connection failed");
                }
            });
        }
    }

    fn handle<B>(&self, req: &Request<B>) -> Response<Body> {
        if !matches!(*req.method(), Method::GET | Method::HEAD) {
            return status(StatusCode::METHOD_NOT_ALLOWED);
        }
        match req.uri().path() {
            "/metrics" => self.metrics(),
            "/ready" => self.ready(),
            "/active" => self.active(),
            _ => status(StatusCode::NOT_FOUND),
        }
    }

    fn metrics(&self) -> Response<Body> {
        let mut text = String::new();
        if let Err(error) = encode(&mut text, &self.prom) {
            tracing::error!(%error, "Failed to encode metrics");
            return status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        body(StatusCode::OK, OPENMETRICS, text)
    }

    fn ready(&self) -> Response<Body> {
        if *self.ready.borrow() {
            body(StatusCode::OK, "text/plain", "ready\n")
        } else {
            body(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "not ready\n")
        }
    }

    fn active(&self) -> Response<Body> {
        let json = self.active.to_json().to_string();
        body(StatusCode::OK, "application/json", json)
    }
}

fn status(code: StatusCode) -> Response<Body> {
    let mut rsp = Response::new(Body::default());
    *rsp.status_mut() = code;
    rsp
}

fn body(code: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Body> {
    let mut rsp = Response::new(Full::new(body.into()));
    *rsp.status_mut() = code;
    rsp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    rsp
}
