pub mod api;
pub mod page;
pub mod websocket;

use crate::agent::ChatAgent;
use crate::config::variant::{ UiVariant, VariantProfile };
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use axum::http::{ header::{ CONTENT_TYPE, HOST, ORIGIN }, HeaderMap, HeaderValue, Method };
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{ AllowOrigin, CorsLayer };
use log::info;

#[derive(Clone)]
pub struct AppState {
    pub agent: ChatAgent,
    pub variant: UiVariant,
    pub profile: Arc<VariantProfile>,
    pub export_dir: PathBuf,
}

pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    pub async fn bind(addr: &str, state: AppState) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await.map_err(|e|
            format!("Failed to bind chat UI to {}: {}. Is another instance running?", addr, e)
        )?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.local_addr()?;
        info!(
            "{} ({}) listening on: http://{}",
            self.state.profile.title,
            self.state.variant,
            addr
        );
        if !self.state.agent.is_enabled() {
            info!("OPENAI_API_KEY is not set; chat and image analysis are disabled");
        }

        let app = router(self.state, addr);
        axum::serve(self.listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        Ok(())
    }
}

pub fn router(state: AppState, addr: SocketAddr) -> Router {
    api::routes()
        .merge(websocket::routes())
        .layer(cors_layer(addr))
        .with_state(state)
}

/// Only the page's own origins may read responses cross-origin.
fn cors_layer(addr: SocketAddr) -> CorsLayer {
    let origins: Vec<HeaderValue> = [format!("http://{}", addr), format!("http://localhost:{}", addr.port())]
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}

/// True when the request carries no `Origin` header, or when the origin's
/// authority equals the `Host` the request was sent to. Browsers always
/// send `Origin` on WebSocket upgrades and cross-site POSTs.
pub fn same_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(ORIGIN) else {
        return true;
    };
    let Some(host) = headers.get(HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    origin
        .to_str()
        .ok()
        .and_then(|o| o.split_once("://"))
        .map(|(_, authority)| authority.trim_end_matches('/').eq_ignore_ascii_case(host))
        .unwrap_or(false)
}
