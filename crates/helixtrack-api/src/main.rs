//! HelixTrack Core's process entry point: structured logging, DB connect,
//! migrations, construct the process-wide singletons (permission cache,
//! audit sink, rate-limiter meters, CSRF token store) once and pass them by
//! capability, then `HttpServer::new`.

mod config;
mod dispatcher;
mod envelope;
mod error;
mod handlers;
mod routes;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use helixtrack_auth::{AuthEngineConfig, AuthorizationEngine, JwtConfig, JwtManager};
use helixtrack_cache::{PermissionCache, PermissionCacheConfig};
use helixtrack_database::{PgGrantRepository, PgRoleAssignmentRepository, PgSecurityLevelRepository, PgTeamRepository};
use helixtrack_events::{EventPublisher, EventPublisherConfig};
use helixtrack_security::{AuditSink, IngressPipeline, PipelineConfig};
use helixtrack_websocket::HubHandle;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ApiConfig;
use crate::dispatcher::AppState;
use crate::handlers::ticket::TicketStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).json().init();

    let config = ApiConfig::load()?;
    tracing::info!(bind = %config.listener.bind_address(), "starting helixtrack-api");

    let pool = helixtrack_database::connect(&config.database).await?;
    helixtrack_database::run_migrations(&pool).await?;
    tracing::info!("database migrations applied");

    let audit = Arc::new(AuditSink::new(pool.clone(), config.authorization.audit_retention_days));

    let cache = Arc::new(PermissionCache::new(PermissionCacheConfig {
        max_capacity: config.authorization.cache_max_size,
        time_to_live: config.authorization.cache_ttl,
    }));

    let engine = Arc::new(AuthorizationEngine::new(
        Arc::new(PgGrantRepository::new(pool.clone())),
        Arc::new(PgTeamRepository::new(pool.clone())),
        Arc::new(PgRoleAssignmentRepository::new(pool.clone())),
        Arc::new(PgSecurityLevelRepository::new(pool.clone())),
        cache,
        audit.clone(),
        AuthEngineConfig {
            enable_cache: config.authorization.enable_cache,
            enable_audit: config.authorization.enable_audit,
        },
    ));

    let mut jwt_config = JwtConfig::new(config.jwt.secret.clone());
    jwt_config.issuer = config.jwt.issuer.clone();
    jwt_config.access_ttl_seconds = config.jwt.access_ttl.as_secs();
    let jwt = Arc::new(JwtManager::new(jwt_config)?);

    let (publisher, events_rx) = EventPublisher::new(EventPublisherConfig::default(), audit.clone());
    let publisher = Arc::new(publisher);

    let hub = HubHandle::new();
    actix_web::rt::spawn(hub.clone().run(events_rx, engine.clone()));

    let ingress = Arc::new(IngressPipeline::new(PipelineConfig::default(), Default::default()));

    let state = web::Data::new(AppState {
        config: config.clone(),
        engine,
        publisher,
        jwt: jwt.clone(),
        ingress,
        audit,
        hub: hub.clone(),
        tickets: TicketStore::new(),
        started_at: Instant::now(),
    });

    let bind_address = config.listener.bind_address();
    let max_outbound_queue = config.websocket.client_outbound_queue_size;
    let allowed_origins = config.cors.allowed_origins.clone();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default().allow_any_method().allowed_headers(vec!["Authorization", "Content-Type"]);
        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .app_data(state.clone())
            .app_data(web::Data::from(jwt.clone()))
            .app_data(web::Data::new(hub.clone()))
            .app_data(web::Data::new(max_outbound_queue))
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run();

    tracing::info!("helixtrack-api listening");
    server.await?;

    tracing::info!("shutting down, flushing audit writes");
    Ok(())
}
