use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiQuery;
use super::validation::parse_report_date;
use crate::db::{count_users, list_users_with_visit_counts, DocumentType};
use crate::reports::{summarize_users, Dashboard, ReportFilter, UsersReport, VisitReport};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub document_type: Option<String>,
    pub relationship: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl VisitReportQuery {
    /// Parse the raw query into a typed filter, reporting every bad field
    pub fn into_filter(self) -> Result<ReportFilter, ApiError> {
        let mut errors = ValidationErrorBuilder::new();
        let mut filter = ReportFilter {
            status: non_empty(self.status),
            relationship: non_empty(self.relationship),
            ..Default::default()
        };

        if let Some(raw) = non_empty(self.start_date) {
            match parse_report_date(&raw) {
                Ok(ts) => filter.start_date = Some(ts),
                Err(e) => {
                    errors.add("startDate", e);
                }
            }
        }
        if let Some(raw) = non_empty(self.end_date) {
            match parse_report_date(&raw) {
                Ok(ts) => filter.end_date = Some(ts),
                Err(e) => {
                    errors.add("endDate", e);
                }
            }
        }
        if let Some(raw) = non_empty(self.document_type) {
            match raw.parse::<DocumentType>() {
                Ok(doc) => filter.document_type = Some(doc),
                Err(e) => {
                    errors.add("documentType", e);
                }
            }
        }

        errors.finish()?;
        Ok(filter)
    }
}

pub async fn visits_report(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<VisitReportQuery>,
) -> Result<Json<VisitReport>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.visits.report(&filter).await?))
}

pub async fn users_report(State(state): State<Arc<AppState>>) -> Result<Json<UsersReport>, ApiError> {
    let users = list_users_with_visit_counts(&state.db).await?;
    Ok(Json(summarize_users(users)))
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Json<Dashboard>, ApiError> {
    let total_users = count_users(&state.db).await?;
    Ok(Json(state.visits.dashboard(total_users).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_into_filter() {
        let filter = VisitReportQuery {
            start_date: Some("2025-05-01".to_string()),
            end_date: Some(" ".to_string()),
            status: Some("ACTIVE".to_string()),
            document_type: Some("RG".to_string()),
            relationship: Some("filh".to_string()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(
            filter.start_date,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap())
        );
        assert!(filter.end_date.is_none());
        assert_eq!(filter.document_type, Some(DocumentType::Rg));
        assert_eq!(filter.relationship.as_deref(), Some("filh"));
    }

    #[test]
    fn test_into_filter_collects_errors() {
        let err = VisitReportQuery {
            start_date: Some("ontem".to_string()),
            document_type: Some("PASSAPORTE".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(err.message().contains("2 fields"));
    }
}
