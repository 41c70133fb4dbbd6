//! JSON bodies for the PostgreSQL probe route.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;

use crate::pg_probe::{ProbeFailure, ProbeOutcome, ProbeSuccess, Stage, StageTimings};

pub const SERVICE_NAME: &str = "PostgreSQL Flexible Server";
pub const ROLE: &str = "Database User (Managed Identity)";
pub const NOT_ATTEMPTED: &str = "not attempted";

pub const TROUBLESHOOTING: [&str; 4] = [
    "Check if POSTGRES_HOST resolves to private IP",
    "Verify VNET integration is working",
    "Confirm private DNS zone configuration",
    "Check NSG rules and route tables",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody {
    pub success: bool,
    pub service: &'static str,
    pub role: &'static str,
    pub timings: SuccessTimings,
    pub connection: ConnectionInfo,
    pub result: QueryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
    pub checked_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessTimings {
    pub environment_check: String,
    pub token_acquisition: String,
    pub dns_resolution: String,
    pub connection: String,
    pub query: String,
    pub total: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub host: String,
    #[serde(rename = "resolvedIP")]
    pub resolved_ip: String,
    pub database: String,
    pub user: String,
    pub ssl: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub version: String,
    pub current_user: String,
    pub current_database: String,
    pub server_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureBody {
    pub success: bool,
    pub service: &'static str,
    pub stage: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timings: FailureTimings,
    pub troubleshooting: [&'static str; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
    pub checked_at: String,
}

/// Stages that never ran read "not attempted".
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureTimings {
    pub failed_after: String,
    pub environment_check: String,
    pub token_acquisition: String,
    pub dns_resolution: String,
    pub connection: String,
    pub query: String,
}

fn format_ms(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}

fn stage_timing(timings: &StageTimings, stage: Stage) -> String {
    timings
        .get(stage)
        .map(format_ms)
        .unwrap_or_else(|| NOT_ATTEMPTED.to_string())
}

impl From<ProbeSuccess> for SuccessBody {
    fn from(success: ProbeSuccess) -> Self {
        let t = &success.timings;
        SuccessBody {
            success: true,
            service: SERVICE_NAME,
            role: ROLE,
            timings: SuccessTimings {
                environment_check: stage_timing(t, Stage::EnvironmentValidation),
                token_acquisition: stage_timing(t, Stage::TokenAcquisition),
                dns_resolution: stage_timing(t, Stage::DnsResolution),
                connection: stage_timing(t, Stage::Connection),
                query: stage_timing(t, Stage::Query),
                total: format_ms(success.total),
            },
            connection: ConnectionInfo {
                host: success.host,
                resolved_ip: success.resolved_ip,
                database: success.database,
                user: success.user,
                ssl: "enabled",
            },
            result: QueryResult {
                version: success.server.version,
                current_user: success.server.current_user,
                current_database: success.server.current_database,
                server_address: success.server.server_address,
            },
            cleanup_error: success.close_error,
            checked_at: Utc::now().to_rfc3339(),
        }
    }
}

impl From<ProbeFailure> for FailureBody {
    fn from(failure: ProbeFailure) -> Self {
        let t = &failure.timings;
        FailureBody {
            success: false,
            service: SERVICE_NAME,
            stage: failure.stage.as_str(),
            error: failure.message,
            code: failure.code,
            timings: FailureTimings {
                failed_after: format_ms(failure.total),
                environment_check: stage_timing(t, Stage::EnvironmentValidation),
                token_acquisition: stage_timing(t, Stage::TokenAcquisition),
                dns_resolution: stage_timing(t, Stage::DnsResolution),
                connection: stage_timing(t, Stage::Connection),
                query: stage_timing(t, Stage::Query),
            },
            troubleshooting: TROUBLESHOOTING,
            cleanup_error: failure.close_error,
            checked_at: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ProbeOutcome {
    fn into_response(self) -> Response {
        match self {
            ProbeOutcome::Success(success) => {
                (StatusCode::OK, Json(SuccessBody::from(success))).into_response()
            }
            ProbeOutcome::Failure(failure) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FailureBody::from(failure)),
            )
                .into_response(),
        }
    }
}
