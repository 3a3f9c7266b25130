use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{middleware, Router};
use common::admin_http;
use configs::{AppConfig, BalancerStrategy, StoreBackend, StoreConfig};
use service::auth::JwtVerifier;
use service::balancer::{BackendInstance, HealthAwareBalancer, LoadBalancer, WeightedBalancer};
use service::discovery::StaticDiscovery;
use service::lock::DistributedLock;
use service::store::{MemoryStore, RedisStore, Store};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::chain::FilterChain;
use crate::filters::{Authenticator, RateLimiter, RequestLogger};
use crate::middleware::filter_chain_middleware;
use crate::observability;
use crate::routing::{route_request, RoutingState};

const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Everything the edge needs at runtime, built once from configuration.
#[derive(Clone)]
pub struct Edge {
    pub store: Arc<dyn Store>,
    pub chain: FilterChain,
    pub routing: RoutingState,
    pub discovery: StaticDiscovery,
    /// Shared with business code that needs mutual exclusion.
    pub lock: DistributedLock,
    pub lock_ttl: Duration,
}

impl Edge {
    /// Build on an already constructed store.
    pub fn with_store(cfg: &AppConfig, store: Arc<dyn Store>) -> Self {
        let discovery = StaticDiscovery::new(upstream_instances(cfg));
        let routing = RoutingState::new(build_balancer(cfg.balancer.strategy), Arc::new(discovery.clone()));
        Self {
            chain: build_chain(cfg, store.clone()),
            lock: DistributedLock::with_prefix(store.clone(), cfg.lock.prefix.clone()),
            lock_ttl: Duration::from_secs(cfg.lock.default_ttl_secs),
            store,
            routing,
            discovery,
        }
    }

    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store = build_store(&cfg.store).await?;
        Ok(Self::with_store(cfg, store))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .fallback(route_request)
            .with_state(self.routing.clone())
            .layer(middleware::from_fn_with_state(self.chain.clone(), filter_chain_middleware))
            .layer(TraceLayer::new_for_http())
    }
}

pub async fn build_store(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn Store>> {
    match cfg.backend {
        StoreBackend::Memory => {
            warn!("using in-process memory store; counters and locks are not shared between instances");
            let store = MemoryStore::new();
            spawn_purge_task(store.clone());
            Ok(Arc::new(store))
        }
        StoreBackend::Redis => {
            let timeout = Duration::from_millis(cfg.command_timeout_ms);
            let store = RedisStore::connect(&cfg.url, timeout)
                .await
                .context("connect to redis")?;
            info!(timeout_ms = cfg.command_timeout_ms, "redis store connected");
            Ok(Arc::new(store))
        }
    }
}

fn spawn_purge_task(store: MemoryStore) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tick.tick().await;
            store.purge_expired();
        }
    });
}

pub fn build_chain(cfg: &AppConfig, store: Arc<dyn Store>) -> FilterChain {
    let verifier = Arc::new(JwtVerifier::new(&cfg.auth.jwt_secret, &cfg.auth.issuer));
    let chain = FilterChain::builder()
        .with(RequestLogger)
        .with(RateLimiter::new(store, &cfg.rate_limit))
        .with(Authenticator::new(verifier, &cfg.auth))
        .build();
    info!(filters = ?chain.names(), "filter chain assembled");
    chain
}

pub fn build_balancer(strategy: BalancerStrategy) -> Arc<dyn LoadBalancer> {
    match strategy {
        BalancerStrategy::HealthAware => Arc::new(HealthAwareBalancer::new()),
        BalancerStrategy::Weighted => Arc::new(WeightedBalancer::new()),
    }
}

fn upstream_instances(cfg: &AppConfig) -> Vec<BackendInstance> {
    cfg.upstreams
        .iter()
        .map(|u| BackendInstance { id: u.id.clone(), address: u.address.clone(), metadata: u.metadata.clone() })
        .collect()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl_c, shutting down");
    }
    info!("shutdown signal received");
}

/// Serve the edge until Ctrl+C.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    admin_http::spawn_admin_server(&cfg.admin.addr, observability::encode_metrics);

    let edge = Edge::from_config(&cfg).await?;
    if edge.routing.discovery.instances().is_empty() {
        warn!("no upstreams configured; routed requests will get 503");
    }

    let addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, strategy = ?cfg.balancer.strategy, "edge listening");

    axum::serve(listener, edge.router().into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
