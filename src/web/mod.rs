//! Web server module

mod admin;
mod honeypot;
mod middleware;
mod routes;
mod templates;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;

use crate::cache::VisitCache;
use crate::config::Config;
use crate::db::Database;
use crate::tracking::RequestFilter;

pub struct AppState {
    pub db: Database,
    pub cache: VisitCache,
    pub filter: RequestFilter,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, db: Database, cache: VisitCache) -> Self {
        Self {
            filter: RequestFilter::from_config(&config.files),
            db,
            cache,
            config,
        }
    }
}

/// Mount point of a directory service, e.g. "/static/" -> "/static"
fn mount_point(url: &str) -> String {
    format!("/{}", url.trim_matches('/'))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let config = &state.config;
    let admin_prefix = config.admin_prefix();

    let mut app = Router::new()
        .route("/", get(routes::home))
        .route("/visits/", get(routes::visits_page))
        .merge(admin::router(state.clone(), &admin_prefix))
        .nest_service(&mount_point(&config.files.static_url), ServeDir::new(&config.files.static_dir));

    if config.debug {
        app = app.nest_service(&mount_point(&config.files.media_url), ServeDir::new(&config.files.media_dir));
    } else {
        // The real admin lives under its secret path, "/admin/" is a decoy
        app = app.merge(honeypot::router());
    }

    let mut app = app
        .fallback(routes::not_found)
        .layer(middleware::VisitTrackingLayer::new(state.clone()))
        .layer(from_fn_with_state(state.clone(), middleware::validate_host))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    if !config.debug {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=60; includeSubDomains; preload"),
        ));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn start_server(config: &Config, db: Database, cache: VisitCache) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone(), db, cache));
    let app = create_router(state);

    if config.tls_enabled() {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.https_port).parse()?;
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &config.server.tls_cert,
            &config.server.tls_key,
        )
        .await?;
        info!("Web server starting on https://{}", addr);

        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
    } else {
        let addr = format!("{}:{}", config.server.host, config.server.http_port);
        info!("Web server starting on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>()
        ).await?;
    }

    Ok(())
}
