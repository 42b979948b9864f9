//! Startup orchestration.
//!
//! # Responsibilities
//! - Assemble each application's inventory, load balancer chain and dispatcher
//! - Start background tasks (health checks, config reloads, admin API)
//! - Serve traffic until shutdown, then close every inventory
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Applications are fixed at startup; reloads only change origin membership
//! - Load balancer chain: restriction → sticky session → round robin | least busy

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{setup_admin_router, AdminState};
use crate::client::{BackendServiceClient, RewriteRuleset};
use crate::config::schema::LoadBalancingStrategy;
use crate::config::{ApplicationConfig, ProxyConfig};
use crate::health::{HttpHealthCheck, NoHealthMonitor, OriginHealthMonitor, ScheduledHealthMonitor};
use crate::http::{AppState, HttpServer};
use crate::inventory::{OriginsBus, OriginsInventory};
use crate::lifecycle::shutdown::{Shutdown, DRAIN_DEADLINE};
use crate::load_balancer::{
    ActiveOrigins, Adaptive, LeastBusy, LoadBalancer, OriginRestriction, PowerOfTwo, RoundRobin, StickySession,
};
use crate::net::HttpConnectionFactory;
use crate::origin::InvalidAddress;
use crate::pool::SimpleConnectionPoolFactory;
use crate::resilience::RetryNTimes;
use crate::routing::Router;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("application '{app}': {source}")]
    Origin {
        app: String,
        #[source]
        source: InvalidAddress,
    },

    #[error("application '{app}': invalid rewrite: {source}")]
    Rewrite {
        app: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One backend application: its origins and the dispatcher in front of them.
pub struct Application {
    pub inventory: Arc<OriginsInventory>,
    pub service: Arc<BackendServiceClient>,
}

impl Application {
    pub fn build(
        config: &ApplicationConfig,
        monitor: Arc<dyn OriginHealthMonitor>,
        bus: Arc<OriginsBus>,
    ) -> Result<Self, StartupError> {
        let origins = config.build_origins().map_err(|source| StartupError::Origin {
            app: config.id.clone(),
            source,
        })?;
        let rewrites = RewriteRuleset::from_config(&config.rewrites).map_err(|source| StartupError::Rewrite {
            app: config.id.clone(),
            source,
        })?;

        let pool_factory = SimpleConnectionPoolFactory::new(
            config.connection_pool.clone(),
            Arc::new(HttpConnectionFactory::new()),
        );
        let inventory = OriginsInventory::builder(config.id.as_str())
            .health_monitor(monitor)
            .pool_factory(Arc::new(pool_factory))
            .bus(bus)
            .initial_origins(origins)
            .build();

        let service = BackendServiceClient::builder(config.id.as_str(), load_balancer_for(config, inventory.clone()))
            .retry_policy(Arc::new(RetryNTimes::new(config.retry.max_retries)))
            .rewrites(rewrites)
            .sticky_session(config.sticky_session.clone())
            .origin_restriction_cookie(config.origin_restriction_cookie.clone())
            .override_host_header(config.override_host_header)
            .max_request_body_bytes(config.max_request_body_bytes)
            .build();

        tracing::info!(
            app = %config.id,
            origins = config.origins.len(),
            strategy = ?config.load_balancing,
            sticky = config.sticky_session.enabled,
            "Application ready"
        );

        Ok(Self {
            inventory,
            service: Arc::new(service),
        })
    }
}

fn load_balancer_for(config: &ApplicationConfig, inventory: Arc<OriginsInventory>) -> Arc<dyn LoadBalancer> {
    let origins: Arc<dyn ActiveOrigins> = inventory.clone();
    let mut balancer: Arc<dyn LoadBalancer> = match config.load_balancing {
        LoadBalancingStrategy::RoundRobin => Arc::new(RoundRobin::new(origins.clone())),
        LoadBalancingStrategy::LeastBusy => Arc::new(LeastBusy::new(origins.clone())),
        LoadBalancingStrategy::Adaptive => {
            let adaptive = Adaptive::new(origins.clone(), config.adaptive_request_count);
            inventory.add_listener(adaptive.change_listener());
            Arc::new(adaptive)
        }
        LoadBalancingStrategy::PowerOfTwo => Arc::new(PowerOfTwo::new(origins.clone())),
    };
    if config.sticky_session.enabled {
        balancer = Arc::new(StickySession::new(origins, balancer));
    }
    if config.origin_restriction_cookie.is_some() {
        balancer = Arc::new(OriginRestriction::new(balancer));
    }
    balancer
}

/// The assembled proxy.
pub struct Proxy {
    config: ProxyConfig,
    bus: Arc<OriginsBus>,
    health_monitor: Option<Arc<ScheduledHealthMonitor>>,
    applications: Vec<Application>,
}

impl Proxy {
    pub fn build(config: ProxyConfig) -> Result<Self, StartupError> {
        let bus = Arc::new(OriginsBus::new());

        let health_monitor = config.health_check.enabled.then(|| {
            Arc::new(ScheduledHealthMonitor::from_config(
                Arc::new(HttpHealthCheck::from_config(&config.health_check)),
                &config.health_check,
            ))
        });
        let monitor: Arc<dyn OriginHealthMonitor> = match &health_monitor {
            Some(monitor) => monitor.clone(),
            None => Arc::new(NoHealthMonitor),
        };

        let applications = config
            .applications
            .iter()
            .map(|app| Application::build(app, monitor.clone(), bus.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            bus,
            health_monitor,
            applications,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<OriginsBus> {
        &self.bus
    }

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    pub fn inventory(&self, app_id: &str) -> Option<&Arc<OriginsInventory>> {
        self.applications
            .iter()
            .map(|app| &app.inventory)
            .find(|inventory| inventory.app_id().as_str() == app_id)
    }

    pub fn http_server(&self) -> HttpServer {
        let state = AppState::new(
            Router::new(&self.config.applications),
            self.applications.iter().map(|app| app.service.clone()),
        );
        HttpServer::new(state, std::time::Duration::from_secs(self.config.listener.request_timeout_secs))
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState::new(
            self.applications.iter().map(|app| app.inventory.clone()),
            self.bus.clone(),
            &self.config.admin.api_key,
        )
    }

    /// Apply the origin lists of a reloaded config to the running applications.
    pub fn reload(&self, config: &ProxyConfig) {
        for app in &self.applications {
            let app_id = app.inventory.app_id();
            let Some(app_config) = config.application(app_id.as_str()) else {
                tracing::warn!(app = %app_id, "Application missing from reloaded config, keeping its origins");
                continue;
            };
            match app_config.build_origins() {
                Ok(origins) => app.inventory.set_origins(&origins),
                Err(e) => tracing::error!(app = %app_id, error = %e, "Skipping reload for application"),
            }
        }

        for app_config in &config.applications {
            if self.inventory(&app_config.id).is_none() {
                tracing::warn!(app = %app_config.id, "New application in reloaded config requires a restart");
            }
        }
    }

    /// Serve until `shutdown` fires, then close every inventory.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
        shutdown: Shutdown,
        config_updates: Option<mpsc::UnboundedReceiver<ProxyConfig>>,
    ) -> Result<(), StartupError> {
        if let Some(monitor) = &self.health_monitor {
            tokio::spawn(monitor.clone().run(shutdown.subscribe()));
        }

        if let Some(admin_listener) = admin_listener {
            let router = setup_admin_router(self.admin_state());
            let mut rx = shutdown.subscribe();
            tokio::spawn(async move {
                tracing::info!(address = ?admin_listener.local_addr().ok(), "Admin API listening");
                let served = axum::serve(admin_listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = rx.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        if let Some(mut updates) = config_updates {
            let proxy = self.clone();
            let mut rx = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => match update {
                            Some(config) => {
                                tracing::info!("Applying reloaded configuration");
                                proxy.reload(&config);
                            }
                            None => break,
                        },
                        _ = rx.recv() => break,
                    }
                }
            });
        }

        let server = self.http_server().run(listener, shutdown.subscribe());
        let result = shutdown.drain(server, DRAIN_DEADLINE).await;

        for app in &self.applications {
            app.inventory.close();
        }
        tracing::info!("All applications closed");

        match result {
            Some(served) => served.map_err(StartupError::from),
            None => Ok(()),
        }
    }
}
