//! HTTP API

use crate::state::{AppState, CoordinatorMetrics};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, instrument};
use vigil_core::api::{
    AcquireLeaseRequest, DependencyRequest, DependencyResponse, EdgeListResponse, ErrorResponse,
    EventListResponse, LeaseListResponse, LeaseResponse, NodeDetailResponse, NodeListResponse,
    ReleaseLeaseRequest, ReleaseLeaseResponse, RenewLeaseRequest, ScheduleBinding,
    ScheduleListResponse, SubmitHeartbeatRequest, SubmitHeartbeatResponse,
};
use vigil_core::{endpoints, AcquireOutcome, DependencyEdge, NodeKind, NodeRef, Status, VigilError};

const DEFAULT_EVENT_LIMIT: usize = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::METRICS, get(metrics))
        .route(endpoints::API_V1_LEASES, get(list_leases))
        .route(endpoints::API_V1_LEASES_ACQUIRE, post(acquire_lease))
        .route(endpoints::API_V1_LEASES_RENEW, post(renew_lease))
        .route(endpoints::API_V1_LEASES_RELEASE, post(release_lease))
        .route(
            endpoints::API_V1_SCHEDULES,
            get(list_schedules).post(register_schedule),
        )
        .route(endpoints::API_V1_HEARTBEATS, post(submit_heartbeat))
        .route(
            endpoints::API_V1_DEPENDENCIES,
            get(list_dependencies)
                .post(add_dependency)
                .delete(remove_dependency),
        )
        .route(endpoints::API_V1_NODES, get(list_nodes))
        .route(endpoints::API_V1_NODE, get(get_node))
        .route(endpoints::API_V1_EVENTS, get(list_events))
        .with_state(state)
}

/// [`VigilError`] rendered as a JSON error body with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub VigilError);

impl From<VigilError> for ApiError {
    fn from(error: VigilError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            VigilError::LockConflict { .. }
            | VigilError::LeaseLost { .. }
            | VigilError::DuplicateEdge { .. }
            | VigilError::CycleDetected { .. } => StatusCode::CONFLICT,
            VigilError::CompositeNode { .. }
            | VigilError::InvalidTtl { .. }
            | VigilError::InvalidSchedule { .. }
            | VigilError::InvalidNodeRef { .. }
            | VigilError::SerializationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VigilError::NodeNotFound { .. } | VigilError::ScheduleNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            VigilError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            VigilError::InconsistentAggregate { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            VigilError::Rejected { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument]
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "vigil-coordinator",
        "version": vigil_core::VERSION
    }))
}

#[instrument(skip(state))]
async fn metrics(State(state): State<AppState>) -> Json<CoordinatorMetrics> {
    Json(state.metrics())
}

#[instrument(skip(state, request), fields(resource = %request.resource, holder = %request.holder))]
async fn acquire_lease(
    State(state): State<AppState>,
    Json(request): Json<AcquireLeaseRequest>,
) -> ApiResult<AcquireOutcome> {
    let ttl = state.ttl_or_default(request.ttl_secs)?;
    let outcome = state
        .leases
        .acquire(&request.resource, request.holder, ttl)
        .await?;
    Ok(Json(outcome))
}

#[instrument(skip(state, request), fields(resource = %request.resource, holder = %request.holder))]
async fn renew_lease(
    State(state): State<AppState>,
    Json(request): Json<RenewLeaseRequest>,
) -> ApiResult<LeaseResponse> {
    let ttl = state.ttl_or_default(request.ttl_secs)?;
    let lease = state
        .leases
        .renew(&request.resource, request.holder, ttl)
        .await?;
    Ok(Json(LeaseResponse { lease }))
}

#[instrument(skip(state, request), fields(resource = %request.resource, holder = %request.holder))]
async fn release_lease(
    State(state): State<AppState>,
    Json(request): Json<ReleaseLeaseRequest>,
) -> ApiResult<ReleaseLeaseResponse> {
    let released = state
        .leases
        .release(&request.resource, request.holder)
        .await?;
    Ok(Json(ReleaseLeaseResponse { released }))
}

#[instrument(skip(state))]
async fn list_leases(State(state): State<AppState>) -> ApiResult<LeaseListResponse> {
    let leases = state.leases.list().await?;
    Ok(Json(LeaseListResponse {
        total: leases.len(),
        leases,
    }))
}

#[instrument(skip(state, binding), fields(schedule_id = binding.schedule.id))]
async fn register_schedule(
    State(state): State<AppState>,
    Json(binding): Json<ScheduleBinding>,
) -> Result<(StatusCode, Json<ScheduleBinding>), ApiError> {
    let binding = state.register_schedule(binding)?;
    Ok((StatusCode::CREATED, Json(binding)))
}

#[instrument(skip(state))]
async fn list_schedules(State(state): State<AppState>) -> Json<ScheduleListResponse> {
    let schedules = state.schedules();
    Json(ScheduleListResponse {
        total: schedules.len(),
        schedules,
    })
}

async fn submit_heartbeat(
    State(state): State<AppState>,
    Json(request): Json<SubmitHeartbeatRequest>,
) -> ApiResult<SubmitHeartbeatResponse> {
    Ok(Json(state.submit_heartbeat(request).await?))
}

#[instrument(skip(state, request), fields(parent = %request.parent, child = %request.child))]
async fn add_dependency(
    State(state): State<AppState>,
    Json(request): Json<DependencyRequest>,
) -> Result<(StatusCode, Json<DependencyResponse>), ApiError> {
    let report = state
        .engine
        .add_dependency(&request.parent, &request.child)?;
    let response = DependencyResponse {
        edge: DependencyEdge {
            parent: request.parent,
            child: request.child,
        },
        applied: true,
        changes: report.changes,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state, request), fields(parent = %request.parent, child = %request.child))]
async fn remove_dependency(
    State(state): State<AppState>,
    Json(request): Json<DependencyRequest>,
) -> ApiResult<DependencyResponse> {
    let report = state
        .engine
        .remove_dependency(&request.parent, &request.child)?;
    Ok(Json(DependencyResponse {
        edge: DependencyEdge {
            parent: request.parent,
            child: request.child,
        },
        applied: report.is_some(),
        changes: report.map(|r| r.changes).unwrap_or_default(),
    }))
}

#[instrument(skip(state))]
async fn list_dependencies(State(state): State<AppState>) -> Json<EdgeListResponse> {
    let edges = state.engine.edges();
    Json(EdgeListResponse {
        total: edges.len(),
        edges,
    })
}

#[derive(Debug, Deserialize)]
struct NodeFilter {
    status: Option<Status>,
    kind: Option<String>,
}

#[instrument(skip(state))]
async fn list_nodes(
    State(state): State<AppState>,
    Query(filter): Query<NodeFilter>,
) -> Json<NodeListResponse> {
    let kind = filter.kind.map(NodeKind::from);
    let nodes: Vec<_> = state
        .engine
        .nodes()
        .into_iter()
        .filter(|node| filter.status.is_none_or(|status| node.status == status))
        .filter(|node| kind.as_ref().is_none_or(|kind| &node.node.kind == kind))
        .collect();
    Json(NodeListResponse {
        total: nodes.len(),
        nodes,
    })
}

#[instrument(skip(state))]
async fn get_node(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<NodeDetailResponse> {
    let node = NodeRef::new(NodeKind::from(kind), id);
    Ok(Json(state.node_detail(&node)?))
}

#[derive(Debug, Deserialize)]
struct EventQuery {
    limit: Option<usize>,
}

#[instrument(skip(state))]
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Json<EventListResponse> {
    let events = state
        .events
        .recent(query.limit.unwrap_or(DEFAULT_EVENT_LIMIT));
    Json(EventListResponse {
        total: events.len(),
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let node = NodeRef::service(1);
        let cases = [
            (
                VigilError::CycleDetected {
                    parent: node.clone(),
                    child: node.clone(),
                },
                StatusCode::CONFLICT,
            ),
            (
                VigilError::CompositeNode { node: node.clone() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                VigilError::NodeNotFound { node: node.clone() },
                StatusCode::NOT_FOUND,
            ),
            (
                VigilError::StoreUnavailable {
                    reason: "offline".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).status_code(), expected);
        }
    }
}
