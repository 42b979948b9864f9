use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::inventory::{OriginState, OriginsCommand, OriginsInventory, SnapshotSummary};
use crate::origin::{AppId, OriginId};
use crate::pool::PoolStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub applications: usize,
}

#[derive(Serialize)]
pub struct OriginStatus {
    pub id: String,
    pub address: String,
    pub state: OriginState,
    pub pool: PoolStats,
}

#[derive(Serialize)]
pub struct ApplicationStatus {
    #[serde(flatten)]
    pub summary: SnapshotSummary,
    pub origins: Vec<OriginStatus>,
}

impl ApplicationStatus {
    fn of(inventory: &OriginsInventory) -> Self {
        let pools = inventory.pool_stats();
        let origins = inventory
            .origins()
            .into_iter()
            .filter_map(|origin| {
                let state = inventory.state_of(origin.id())?;
                let pool = pools
                    .iter()
                    .find(|(id, _)| id == origin.id())
                    .map(|(_, stats)| *stats)
                    .unwrap_or_default();
                Some(OriginStatus {
                    id: origin.id().to_string(),
                    address: origin.host_and_port(),
                    state,
                    pool,
                })
            })
            .collect();

        Self {
            summary: inventory.current_snapshot().summary(),
            origins,
        }
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        applications: state.inventories.len(),
    })
}

pub async fn get_origins(State(state): State<AdminState>) -> Json<Vec<ApplicationStatus>> {
    let mut statuses: Vec<_> = state
        .inventories
        .values()
        .map(|inventory| ApplicationStatus::of(inventory))
        .collect();
    statuses.sort_by(|a, b| a.summary.app_id.cmp(&b.summary.app_id));
    Json(statuses)
}

pub async fn get_application(
    State(state): State<AdminState>,
    Path(app): Path<String>,
) -> Result<Json<ApplicationStatus>, StatusCode> {
    let inventory = state.inventories.get(&AppId::new(&app)).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(ApplicationStatus::of(inventory)))
}

pub async fn enable_origin(
    State(state): State<AdminState>,
    Path((app, origin)): Path<(String, String)>,
) -> Result<Json<ApplicationStatus>, StatusCode> {
    let (app_id, origin_id) = (AppId::new(&app), OriginId::new(&origin));
    send_command(&state, OriginsCommand::EnableOrigin { app_id, origin_id })
}

pub async fn disable_origin(
    State(state): State<AdminState>,
    Path((app, origin)): Path<(String, String)>,
) -> Result<Json<ApplicationStatus>, StatusCode> {
    let (app_id, origin_id) = (AppId::new(&app), OriginId::new(&origin));
    send_command(&state, OriginsCommand::DisableOrigin { app_id, origin_id })
}

fn send_command(state: &AdminState, command: OriginsCommand) -> Result<Json<ApplicationStatus>, StatusCode> {
    let inventory = state.inventories.get(command.app_id()).ok_or(StatusCode::NOT_FOUND)?;
    let known = match &command {
        OriginsCommand::EnableOrigin { origin_id, .. } | OriginsCommand::DisableOrigin { origin_id, .. } => {
            inventory.state_of(origin_id).is_some()
        }
        OriginsCommand::GetSnapshot { .. } => true,
    };
    if !known {
        return Err(StatusCode::NOT_FOUND);
    }

    tracing::info!(command = ?command, "Admin command");
    if !state.bus.send(command) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(ApplicationStatus::of(inventory)))
}
