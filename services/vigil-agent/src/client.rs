//! Coordinator client
//!
//! The runner only talks to the coordinator through [`Coordinator`], so the
//! lease protocol can be exercised against an in-process fake.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use vigil_core::api::{
    AcquireLeaseRequest, ErrorResponse, LeaseResponse, ReleaseLeaseRequest, ReleaseLeaseResponse,
    RenewLeaseRequest, ScheduleListResponse, SubmitHeartbeatRequest, SubmitHeartbeatResponse,
};
use vigil_core::{
    endpoints, AcquireOutcome, AgentId, Lease, LeaseKey, Result, Schedule, ScheduleId, VigilError,
};

#[async_trait]
pub trait Coordinator: Send + Sync + std::fmt::Debug {
    async fn acquire(&self, resource: &LeaseKey, holder: AgentId, ttl: Duration)
        -> Result<AcquireOutcome>;

    async fn renew(&self, resource: &LeaseKey, holder: AgentId, ttl: Duration) -> Result<Lease>;

    async fn release(&self, resource: &LeaseKey, holder: AgentId) -> Result<bool>;

    async fn schedule(&self, schedule_id: ScheduleId) -> Result<Schedule>;

    async fn submit(&self, request: SubmitHeartbeatRequest) -> Result<SubmitHeartbeatResponse>;
}

/// [`Coordinator`] over the coordinator's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCoordinator {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B, resource: Option<&LeaseKey>) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(unavailable)?;
        decode(response, resource).await
    }
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn acquire(
        &self,
        resource: &LeaseKey,
        holder: AgentId,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let request = AcquireLeaseRequest {
            resource: resource.clone(),
            holder,
            ttl_secs: Some(ttl.as_secs().max(1)),
        };
        self.post(endpoints::API_V1_LEASES_ACQUIRE, &request, Some(resource))
            .await
    }

    async fn renew(&self, resource: &LeaseKey, holder: AgentId, ttl: Duration) -> Result<Lease> {
        let request = RenewLeaseRequest {
            resource: resource.clone(),
            holder,
            ttl_secs: Some(ttl.as_secs().max(1)),
        };
        let response: LeaseResponse = self
            .post(endpoints::API_V1_LEASES_RENEW, &request, Some(resource))
            .await?;
        Ok(response.lease)
    }

    async fn release(&self, resource: &LeaseKey, holder: AgentId) -> Result<bool> {
        let request = ReleaseLeaseRequest {
            resource: resource.clone(),
            holder,
        };
        let response: ReleaseLeaseResponse = self
            .post(endpoints::API_V1_LEASES_RELEASE, &request, Some(resource))
            .await?;
        Ok(response.released)
    }

    async fn schedule(&self, schedule_id: ScheduleId) -> Result<Schedule> {
        let response = self
            .client
            .get(self.url(endpoints::API_V1_SCHEDULES))
            .send()
            .await
            .map_err(unavailable)?;
        let listing: ScheduleListResponse = decode(response, None).await?;
        listing
            .schedules
            .into_iter()
            .map(|binding| binding.schedule)
            .find(|schedule| schedule.id == schedule_id)
            .ok_or(VigilError::ScheduleNotFound { schedule_id })
    }

    async fn submit(&self, request: SubmitHeartbeatRequest) -> Result<SubmitHeartbeatResponse> {
        let resource = LeaseKey::schedule(request.schedule_id);
        self.post(endpoints::API_V1_HEARTBEATS, &request, Some(&resource))
            .await
    }
}

fn unavailable(error: reqwest::Error) -> VigilError {
    VigilError::StoreUnavailable {
        reason: error.to_string(),
    }
}

/// Maps non-2xx bodies back onto [`VigilError`] so the runner can tell a
/// lost lease from an outage.
async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    resource: Option<&LeaseKey>,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(unavailable);
    }

    let body = response.text().await.unwrap_or_default();
    let error: Option<ErrorResponse> = serde_json::from_str(&body).ok();
    debug!(%status, body = %body, "Coordinator returned an error");

    let kind = error.as_ref().map(|e| e.kind.as_str()).unwrap_or_default();
    let message = error.as_ref().map(|e| e.error.clone()).unwrap_or(body);

    Err(match (kind, resource) {
        ("lease_lost", Some(resource)) => VigilError::LeaseLost {
            resource: resource.clone(),
        },
        _ if status.is_server_error() || kind == "store_unavailable" => {
            VigilError::StoreUnavailable { reason: message }
        }
        _ => VigilError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}
