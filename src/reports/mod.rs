//! Report aggregation over visit records.
//!
//! The aggregation functions are pure over the record set they are given;
//! only [`build_dashboard`] talks to storage.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::db::{format_timestamp, DocumentType, UserRole, UserWithVisitCount, Visit, VisitStatus};
use crate::store::VisitStore;

/// Default look-back when a report has no start date
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

const DASHBOARD_RECENT: i64 = 5;
const DASHBOARD_TOP_RELATIONSHIPS: usize = 5;

/// Recognized report filters. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Raw status filter; only ACTIVE, COMPLETED and CANCELLED narrow results
    pub status: Option<String>,
    pub document_type: Option<DocumentType>,
    /// Case-insensitive substring of the relationship
    pub relationship: Option<String>,
}

/// Resolved creation-time window, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportFilter {
    /// Resolve the window: start defaults to 30 days before `now`, end
    /// defaults to `now`, and end is pushed to the last millisecond of its day.
    pub fn window(&self, now: DateTime<Utc>) -> ReportWindow {
        let start = self
            .start_date
            .unwrap_or_else(|| now - Duration::days(DEFAULT_WINDOW_DAYS));
        let end = end_of_day(self.end_date.unwrap_or(now));
        ReportWindow { start, end }
    }

    fn status_filter(&self) -> Option<VisitStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    fn matches(&self, visit: &Visit) -> bool {
        if let Some(status) = self.status_filter() {
            if visit.status != status {
                return false;
            }
        }
        if let Some(doc) = self.document_type {
            if visit.document_type != doc {
                return false;
            }
        }
        match self.relationship.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => visit
                .relationship
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&ts.date_naive().and_time(NaiveTime::MIN))
}

fn end_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(ts) + Duration::days(1) - Duration::milliseconds(1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn record(&mut self, status: VisitStatus) {
        match status {
            VisitStatus::Active => self.active += 1,
            VisitStatus::Completed => self.completed += 1,
            VisitStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelationshipStats {
    pub count: usize,
    #[serde(flatten)]
    pub by_status: StatusCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_relationship: BTreeMap<String, RelationshipStats>,
    pub by_document_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTimeline {
    pub visits_by_day: Vec<DayCount>,
    pub period: ReportPeriod,
}

/// Filters echoed back, with "all" standing in for absent ones
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub document_type: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitReport {
    pub visits: Vec<Visit>,
    pub statistics: ReportStatistics,
    pub timeline: ReportTimeline,
    pub filters: AppliedFilters,
}

/// Compute the statistics block for a record set
pub fn aggregate(visits: &[Visit]) -> ReportStatistics {
    let mut by_status = StatusCounts::default();
    let mut by_relationship: BTreeMap<String, RelationshipStats> = BTreeMap::new();
    let mut by_document_type: BTreeMap<String, usize> = BTreeMap::new();

    for visit in visits {
        by_status.record(visit.status);

        let rel = by_relationship.entry(visit.relationship.clone()).or_default();
        rel.count += 1;
        rel.by_status.record(visit.status);

        *by_document_type
            .entry(visit.document_type.as_str().to_string())
            .or_default() += 1;
    }

    ReportStatistics {
        total: visits.len(),
        by_status,
        by_relationship,
        by_document_type,
    }
}

/// Visits per UTC creation date, oldest day first
pub fn visits_by_day(visits: &[Visit]) -> Vec<DayCount> {
    let mut days: BTreeMap<String, usize> = BTreeMap::new();
    for visit in visits {
        let date = visit.created_at.date_naive().format("%Y-%m-%d").to_string();
        *days.entry(date).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

/// Apply the non-window filters and assemble the full report
pub fn build_visit_report(
    visits: Vec<Visit>,
    filter: &ReportFilter,
    window: ReportWindow,
) -> VisitReport {
    let visits: Vec<Visit> = visits
        .into_iter()
        .filter(|v| v.created_at >= window.start && v.created_at <= window.end)
        .filter(|v| filter.matches(v))
        .collect();

    let statistics = aggregate(&visits);
    let timeline = ReportTimeline {
        visits_by_day: visits_by_day(&visits),
        period: ReportPeriod {
            start_date: format_timestamp(&window.start),
            end_date: format_timestamp(&window.end),
        },
    };

    let or_all = |value: Option<&str>| match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => "all".to_string(),
    };
    let filters = AppliedFilters {
        start_date: format_timestamp(&window.start),
        end_date: format_timestamp(&window.end),
        status: or_all(filter.status.as_deref()),
        document_type: or_all(filter.document_type.as_ref().map(DocumentType::as_str)),
        relationship: or_all(filter.relationship.as_deref()),
    };

    VisitReport {
        visits,
        statistics,
        timeline,
        filters,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub admin: usize,
    pub recepcao: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostActiveUser {
    pub name: String,
    pub email: String,
    pub visits_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub total: usize,
    pub by_role: RoleCounts,
    pub most_active_user: Option<MostActiveUser>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsersReport {
    pub users: Vec<UserWithVisitCount>,
    pub statistics: UserStatistics,
}

/// Summarize users; on equal visit counts the later user in the list wins,
/// which is the oldest account since users are listed newest first
pub fn summarize_users(users: Vec<UserWithVisitCount>) -> UsersReport {
    let mut by_role = RoleCounts::default();
    let mut most_active: Option<&UserWithVisitCount> = None;

    for user in &users {
        match user.role.parse::<UserRole>() {
            Ok(UserRole::Admin) => by_role.admin += 1,
            Ok(UserRole::Recepcao) => by_role.recepcao += 1,
            Err(_) => {}
        }
        if most_active.map_or(true, |best| user.visit_count >= best.visit_count) {
            most_active = Some(user);
        }
    }

    let most_active_user = most_active.map(|u| MostActiveUser {
        name: u.name.clone(),
        email: u.email.clone(),
        visits_count: u.visit_count,
    });

    UsersReport {
        statistics: UserStatistics {
            total: users.len(),
            by_role,
            most_active_user,
        },
        users,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_visits: i64,
    pub today_visits: i64,
    pub active_visits: i64,
    pub total_users: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub visits: Vec<Visit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipCount {
    pub relationship: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub overview: DashboardOverview,
    pub recent_activity: RecentActivity,
    pub popular_relationships: Vec<RelationshipCount>,
}

/// Highest counts first, ties by relationship name
pub fn top_relationships(counts: Vec<(String, i64)>, limit: usize) -> Vec<RelationshipCount> {
    let mut counts = counts;
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
        .into_iter()
        .take(limit)
        .map(|(relationship, count)| RelationshipCount {
            relationship,
            count,
        })
        .collect()
}

pub async fn build_dashboard(
    store: &dyn VisitStore,
    total_users: i64,
    now: DateTime<Utc>,
) -> Result<Dashboard> {
    let today = start_of_day(now);
    let tomorrow = today + Duration::days(1);

    let total_visits = store.count(None).await?;
    let today_visits = store.count_created_between(today, tomorrow).await?;
    let active_visits = store.count(Some(VisitStatus::Active)).await?;
    let (recent, _) = store.list_page(None, 0, DASHBOARD_RECENT).await?;
    let popular = top_relationships(
        store.relationship_counts().await?,
        DASHBOARD_TOP_RELATIONSHIPS,
    );

    Ok(Dashboard {
        overview: DashboardOverview {
            total_visits,
            today_visits,
            active_visits,
            total_users,
        },
        recent_activity: RecentActivity { visits: recent },
        popular_relationships: popular,
    })
}
