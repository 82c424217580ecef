//! Visit lifecycle manager.
//!
//! Enforces the visit state machine on top of an injected [`VisitStore`]:
//!
//! ```text
//! register ──> ACTIVE ──check_out──> COMPLETED
//!                 │
//!                 └────cancel─────> CANCELLED
//! ```
//!
//! Terminal transitions go through [`VisitStore::transition_active`], which
//! only applies when the stored status is still ACTIVE, so two concurrent
//! requests can never both finish the same visit.

mod error;
mod validation;

pub use error::VisitError;
pub use validation::{sanitize_text, validate_registration, ValidVisit};

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{
    now, NewVisit, Pagination, RegisterVisitRequest, Transition, Visit, VisitStatus,
};
use crate::reports::{self, Dashboard, ReportFilter, VisitReport};
use crate::store::VisitStore;

use error::{ALREADY_FINISHED, ONLY_ACTIVE_CANCEL};

/// One page of visits
#[derive(Debug, Clone, serde::Serialize)]
pub struct VisitPage {
    pub visits: Vec<Visit>,
    pub pagination: Pagination,
}

#[derive(Clone)]
pub struct VisitLifecycle {
    store: Arc<dyn VisitStore>,
}

impl VisitLifecycle {
    pub fn new(store: Arc<dyn VisitStore>) -> Self {
        Self { store }
    }

    /// Register a visitor arrival as an ACTIVE visit owned by `acting_user`
    pub async fn register(
        &self,
        req: &RegisterVisitRequest,
        acting_user: Option<i64>,
    ) -> Result<Visit, VisitError> {
        let valid = validate_registration(req).map_err(VisitError::Validation)?;
        let user_id = acting_user.ok_or(VisitError::Unauthenticated)?;

        let visit = self
            .store
            .insert(NewVisit {
                name: valid.name,
                document: valid.document,
                document_type: valid.document_type,
                phone: valid.phone,
                relationship: valid.relationship,
                patient_name: valid.patient_name,
                notes: valid.notes,
                user_id,
                check_in: now(),
            })
            .await?;

        info!(
            visit_id = visit.id,
            user_id = user_id,
            patient = %visit.patient_name,
            "Visitor checked in"
        );
        Ok(visit)
    }

    /// Record a visitor departure
    pub async fn check_out(&self, id: i64) -> Result<Visit, VisitError> {
        let visit = self
            .finish(id, Transition::CheckOut { at: now() }, ALREADY_FINISHED)
            .await?;
        info!(visit_id = id, "Visitor checked out");
        Ok(visit)
    }

    /// Cancel an active visit, appending a cancellation marker to its notes
    pub async fn cancel(&self, id: i64) -> Result<Visit, VisitError> {
        let visit = self
            .finish(id, Transition::Cancel { at: now() }, ONLY_ACTIVE_CANCEL)
            .await?;
        info!(visit_id = id, "Visit cancelled");
        Ok(visit)
    }

    async fn finish(
        &self,
        id: i64,
        transition: Transition,
        reason: &'static str,
    ) -> Result<Visit, VisitError> {
        let current = self.get(id).await?;
        if !current.status.can_transition_to(transition.target()) {
            return Err(VisitError::InvalidState {
                id,
                status: current.status,
                reason,
            });
        }

        if !self.store.transition_active(id, &transition).await? {
            // Another request finished the visit between our read and write
            let latest = self.get(id).await?;
            warn!(
                visit_id = id,
                status = %latest.status,
                "Lost race finishing visit"
            );
            return Err(VisitError::InvalidState {
                id,
                status: latest.status,
                reason,
            });
        }

        self.get(id).await
    }

    /// All visitors currently inside, latest check-in first
    pub async fn active(&self) -> Result<Vec<Visit>, VisitError> {
        Ok(self.store.list_active().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Visit, VisitError> {
        self.store
            .find(id)
            .await?
            .ok_or(VisitError::NotFound(id))
    }

    /// Visits newest first, one page at a time.
    ///
    /// `status` only filters when it names one of the three statuses; any
    /// other value lists every status.
    pub async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        status: Option<&str>,
    ) -> Result<VisitPage, VisitError> {
        if page < 1 {
            return Err(VisitError::validation_field("page", "Page must be at least 1"));
        }
        if page_size < 1 {
            return Err(VisitError::validation_field("limit", "Limit must be at least 1"));
        }

        let status = status.and_then(|s| s.parse::<VisitStatus>().ok());
        let offset = (page - 1).saturating_mul(page_size);
        let (visits, total) = self.store.list_page(status, offset, page_size).await?;

        Ok(VisitPage {
            visits,
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Aggregate visits created within the filter's window
    pub async fn report(&self, filter: &ReportFilter) -> Result<VisitReport, VisitError> {
        let window = filter.window(now());
        let visits = self
            .store
            .list_created_between(window.start, window.end)
            .await?;
        Ok(reports::build_visit_report(visits, filter, window))
    }

    /// Front-desk overview; `total_users` comes from the user directory
    pub async fn dashboard(&self, total_users: i64) -> Result<Dashboard, VisitError> {
        Ok(reports::build_dashboard(self.store.as_ref(), total_users, now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentType, VisitOwner};
    use crate::store::InMemoryVisitStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const RECEPTION: i64 = 1;

    fn lifecycle() -> (VisitLifecycle, Arc<InMemoryVisitStore>) {
        let store = Arc::new(InMemoryVisitStore::new());
        store.add_owner(RECEPTION, "Maria da Recepção", "recepcao@casa.org");
        (VisitLifecycle::new(store.clone()), store)
    }

    fn joao() -> RegisterVisitRequest {
        RegisterVisitRequest {
            name: "João Silva".to_string(),
            document: "123.456.789-00".to_string(),
            document_type: "CPF".to_string(),
            relationship: "Filho".to_string(),
            patient_name: "Maria Santos Silva".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_creates_active_visit() {
        let (visits, _) = lifecycle();
        let visit = visits.register(&joao(), Some(RECEPTION)).await.unwrap();

        assert_eq!(visit.status, VisitStatus::Active);
        assert!(visit.check_out.is_none());
        assert_eq!(visit.document_type, DocumentType::Cpf);
        assert_eq!(visit.user_id, RECEPTION);
        assert_eq!(visit.user.name, "Maria da Recepção");
    }

    #[tokio::test]
    async fn test_register_requires_caller() {
        let (visits, store) = lifecycle();
        let err = visits.register(&joao(), None).await.unwrap_err();
        assert!(matches!(err, VisitError::Unauthenticated));
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_fields() {
        let (visits, _) = lifecycle();
        let mut req = joao();
        req.document_type = "PASSAPORTE".to_string();
        req.patient_name = String::new();

        match visits.register(&req, Some(RECEPTION)).await {
            Err(VisitError::Validation(errors)) => {
                assert!(errors.contains_key("documentType"));
                assert!(errors.contains_key("patientName"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_out_then_again_fails() {
        let (visits, _) = lifecycle();
        let visit = visits.register(&joao(), Some(RECEPTION)).await.unwrap();

        let done = visits.check_out(visit.id).await.unwrap();
        assert_eq!(done.status, VisitStatus::Completed);
        let check_out = done.check_out.unwrap();
        assert!(check_out >= done.check_in);

        let err = visits.check_out(visit.id).await.unwrap_err();
        match err {
            VisitError::InvalidState { status, reason, .. } => {
                assert_eq!(status, VisitStatus::Completed);
                assert_eq!(reason, ALREADY_FINISHED);
            }
            other => panic!("expected invalid state, got {:?}", other),
        }

        let unchanged = visits.get(visit.id).await.unwrap();
        assert_eq!(unchanged.check_out, Some(check_out));
    }

    #[tokio::test]
    async fn test_cancel_appends_marker() {
        let (visits, _) = lifecycle();
        let mut req = joao();
        req.notes = Some("Trouxe medicamentos".to_string());
        let visit = visits.register(&req, Some(RECEPTION)).await.unwrap();

        let cancelled = visits.cancel(visit.id).await.unwrap();
        assert_eq!(cancelled.status, VisitStatus::Cancelled);
        assert!(cancelled.check_out.is_none());
        let notes = cancelled.notes.unwrap();
        assert!(notes.starts_with("Trouxe medicamentos | [CANCELADO: "));
        assert!(notes.ends_with(']'));
    }

    #[tokio::test]
    async fn test_terminal_states_reject_transitions() {
        let (visits, _) = lifecycle();
        let completed = visits.register(&joao(), Some(RECEPTION)).await.unwrap();
        visits.check_out(completed.id).await.unwrap();
        let cancelled = visits.register(&joao(), Some(RECEPTION)).await.unwrap();
        visits.cancel(cancelled.id).await.unwrap();

        let err = visits.cancel(completed.id).await.unwrap_err();
        assert!(matches!(
            err,
            VisitError::InvalidState { reason: ONLY_ACTIVE_CANCEL, .. }
        ));
        assert!(matches!(
            visits.check_out(cancelled.id).await.unwrap_err(),
            VisitError::InvalidState { status: VisitStatus::Cancelled, .. }
        ));
        assert!(matches!(
            visits.cancel(cancelled.id).await.unwrap_err(),
            VisitError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_visit_not_found() {
        let (visits, _) = lifecycle();
        assert!(matches!(
            visits.get(42).await.unwrap_err(),
            VisitError::NotFound(42)
        ));
        assert!(matches!(
            visits.check_out(42).await.unwrap_err(),
            VisitError::NotFound(42)
        ));
        assert!(matches!(
            visits.cancel(42).await.unwrap_err(),
            VisitError::NotFound(42)
        ));
    }

    #[tokio::test]
    async fn test_active_excludes_finished_visits() {
        let (visits, _) = lifecycle();
        let a = visits.register(&joao(), Some(RECEPTION)).await.unwrap();
        let b = visits.register(&joao(), Some(RECEPTION)).await.unwrap();
        let c = visits.register(&joao(), Some(RECEPTION)).await.unwrap();
        visits.check_out(a.id).await.unwrap();
        visits.cancel(b.id).await.unwrap();

        let active = visits.active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, c.id);
        assert!(active.iter().all(|v| v.status == VisitStatus::Active));
    }

    fn stored_visit(id: i64, created_at: DateTime<Utc>, status: VisitStatus) -> Visit {
        Visit {
            id,
            name: format!("Visitante {}", id),
            document: "000.000.000-00".to_string(),
            document_type: DocumentType::Rg,
            phone: None,
            relationship: "Amigo".to_string(),
            patient_name: "Roberto Almeida".to_string(),
            notes: None,
            check_in: created_at,
            check_out: None,
            status,
            user_id: RECEPTION,
            created_at,
            user: VisitOwner {
                name: "Maria da Recepção".to_string(),
                email: "recepcao@casa.org".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_list_paged_second_page() {
        let (visits, store) = lifecycle();
        let base = Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap();
        for id in 1..=25 {
            store.put(stored_visit(id, base + Duration::minutes(id), VisitStatus::Active));
        }

        let page = visits.list_paged(2, 10, None).await.unwrap();
        assert_eq!(page.pagination.total, 25);
        assert_eq!(page.pagination.pages, 3);
        assert_eq!(page.visits.len(), 10);
        // newest first: page 1 holds 25..=16, page 2 holds 15..=6
        let ids: Vec<i64> = page.visits.iter().map(|v| v.id).collect();
        assert_eq!(ids, (6..=15).rev().collect::<Vec<_>>());

        let last = visits.list_paged(3, 10, None).await.unwrap();
        assert_eq!(last.visits.len(), 5);
    }

    #[tokio::test]
    async fn test_list_paged_status_filter() {
        let (visits, store) = lifecycle();
        let base = Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap();
        store.put(stored_visit(1, base, VisitStatus::Active));
        store.put(stored_visit(2, base, VisitStatus::Completed));
        store.put(stored_visit(3, base, VisitStatus::Cancelled));

        let completed = visits.list_paged(1, 10, Some("COMPLETED")).await.unwrap();
        assert_eq!(completed.pagination.total, 1);
        assert_eq!(completed.visits[0].id, 2);

        // unrecognized filters fall back to every status
        let all = visits.list_paged(1, 10, Some("archived")).await.unwrap();
        assert_eq!(all.pagination.total, 3);
    }

    #[tokio::test]
    async fn test_list_paged_rejects_bad_bounds() {
        let (visits, _) = lifecycle();
        assert!(matches!(
            visits.list_paged(0, 10, None).await.unwrap_err(),
            VisitError::Validation(_)
        ));
        assert!(matches!(
            visits.list_paged(1, 0, None).await.unwrap_err(),
            VisitError::Validation(_)
        ));
    }

    /// Store that reports ACTIVE on read but loses every guarded update
    struct RacingStore(InMemoryVisitStore);

    #[async_trait]
    impl VisitStore for RacingStore {
        async fn insert(&self, visit: NewVisit) -> Result<Visit> {
            self.0.insert(visit).await
        }
        async fn find(&self, id: i64) -> Result<Option<Visit>> {
            self.0.find(id).await
        }
        async fn transition_active(&self, _id: i64, _transition: &Transition) -> Result<bool> {
            Ok(false)
        }
        async fn list_active(&self) -> Result<Vec<Visit>> {
            self.0.list_active().await
        }
        async fn list_page(
            &self,
            status: Option<VisitStatus>,
            offset: i64,
            limit: i64,
        ) -> Result<(Vec<Visit>, i64)> {
            self.0.list_page(status, offset, limit).await
        }
        async fn list_created_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Visit>> {
            self.0.list_created_between(start, end).await
        }
        async fn count(&self, status: Option<VisitStatus>) -> Result<i64> {
            self.0.count(status).await
        }
        async fn count_created_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<i64> {
            self.0.count_created_between(start, end).await
        }
        async fn relationship_counts(&self) -> Result<Vec<(String, i64)>> {
            self.0.relationship_counts().await
        }
    }

    #[tokio::test]
    async fn test_lost_race_reports_invalid_state() {
        let inner = InMemoryVisitStore::new();
        inner.add_owner(RECEPTION, "Maria", "recepcao@casa.org");
        let visits = VisitLifecycle::new(Arc::new(RacingStore(inner)));
        let visit = visits.register(&joao(), Some(RECEPTION)).await.unwrap();

        let err = visits.check_out(visit.id).await.unwrap_err();
        assert!(matches!(err, VisitError::InvalidState { .. }));
    }
}
