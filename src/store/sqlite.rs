use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::VisitStore;
use crate::db::{
    cancellation_marker, format_timestamp, NewVisit, Transition, Visit, VisitRow, VisitStatus,
    NOTE_DELIMITER,
};
use crate::DbPool;

const VISIT_SELECT: &str = r#"
    SELECT v.id, v.name, v.document, v.document_type, v.phone, v.relationship,
           v.patient_name, v.notes, v.check_in, v.check_out, v.status, v.user_id,
           v.created_at, u.name AS owner_name, u.email AS owner_email
    FROM visits v
    JOIN users u ON u.id = v.user_id
"#;

/// Visit storage backed by the SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteVisitStore {
    db: DbPool,
}

impl SqliteVisitStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

fn into_visits(rows: Vec<VisitRow>) -> Result<Vec<Visit>> {
    rows.into_iter().map(Visit::try_from).collect()
}

#[async_trait]
impl VisitStore for SqliteVisitStore {
    async fn insert(&self, visit: NewVisit) -> Result<Visit> {
        let check_in = format_timestamp(&visit.check_in);

        let result = sqlx::query(
            r#"
            INSERT INTO visits (name, document, document_type, phone, relationship,
                                patient_name, notes, check_in, status, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&visit.name)
        .bind(&visit.document)
        .bind(visit.document_type.as_str())
        .bind(&visit.phone)
        .bind(&visit.relationship)
        .bind(&visit.patient_name)
        .bind(&visit.notes)
        .bind(&check_in)
        .bind(VisitStatus::Active.as_str())
        .bind(visit.user_id)
        .bind(&check_in)
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        debug!(visit_id = id, user_id = visit.user_id, "Visit row inserted");

        self.find(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Visit {} vanished after insert", id))
    }

    async fn find(&self, id: i64) -> Result<Option<Visit>> {
        let sql = format!("{} WHERE v.id = ?", VISIT_SELECT);
        let row = sqlx::query_as::<_, VisitRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(Visit::try_from).transpose()
    }

    async fn transition_active(&self, id: i64, transition: &Transition) -> Result<bool> {
        let result = match transition {
            Transition::CheckOut { at } => {
                sqlx::query(
                    "UPDATE visits SET status = ?, check_out = ? WHERE id = ? AND status = ?",
                )
                .bind(VisitStatus::Completed.as_str())
                .bind(format_timestamp(at))
                .bind(id)
                .bind(VisitStatus::Active.as_str())
                .execute(&self.db)
                .await?
            }
            Transition::Cancel { at } => {
                let marker = cancellation_marker(at);
                sqlx::query(
                    r#"
                    UPDATE visits
                    SET status = ?,
                        notes = CASE WHEN notes IS NULL OR notes = '' THEN ? ELSE notes || ? END
                    WHERE id = ? AND status = ?
                    "#,
                )
                .bind(VisitStatus::Cancelled.as_str())
                .bind(&marker)
                .bind(format!("{}{}", NOTE_DELIMITER, marker))
                .bind(id)
                .bind(VisitStatus::Active.as_str())
                .execute(&self.db)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn list_active(&self) -> Result<Vec<Visit>> {
        let sql = format!(
            "{} WHERE v.status = ? ORDER BY v.check_in DESC, v.id DESC",
            VISIT_SELECT
        );
        let rows = sqlx::query_as::<_, VisitRow>(&sql)
            .bind(VisitStatus::Active.as_str())
            .fetch_all(&self.db)
            .await?;

        into_visits(rows)
    }

    async fn list_page(
        &self,
        status: Option<VisitStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Visit>, i64)> {
        let where_clause = if status.is_some() {
            "WHERE v.status = ?"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) FROM visits v {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(status) = status {
            count_query = count_query.bind(status.as_str());
        }
        let total = count_query.fetch_one(&self.db).await?;

        let sql = format!(
            "{} {} ORDER BY v.created_at DESC, v.id DESC LIMIT ? OFFSET ?",
            VISIT_SELECT, where_clause
        );
        let mut query = sqlx::query_as::<_, VisitRow>(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.db).await?;

        Ok((into_visits(rows)?, total))
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Visit>> {
        let sql = format!(
            "{} WHERE v.created_at >= ? AND v.created_at <= ? ORDER BY v.created_at DESC, v.id DESC",
            VISIT_SELECT
        );
        let rows = sqlx::query_as::<_, VisitRow>(&sql)
            .bind(format_timestamp(&start))
            .bind(format_timestamp(&end))
            .fetch_all(&self.db)
            .await?;

        into_visits(rows)
    }

    async fn count(&self, status: Option<VisitStatus>) -> Result<i64> {
        let count = match status {
            Some(status) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM visits WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(&self.db)
                    .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM visits")
                    .fetch_one(&self.db)
                    .await?
            }
        };
        Ok(count)
    }

    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits WHERE created_at >= ? AND created_at < ?",
        )
        .bind(format_timestamp(&start))
        .bind(format_timestamp(&end))
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    async fn relationship_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship, COUNT(*) FROM visits GROUP BY relationship ORDER BY relationship",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_user, init_in_memory, now, DocumentType, UserRole};
    use chrono::{Duration, TimeZone};

    async fn setup() -> (SqliteVisitStore, i64) {
        let db = init_in_memory().await.unwrap();
        let user = create_user(&db, "recepcao@casa.org", "hash", "Maria", UserRole::Recepcao)
            .await
            .unwrap();
        (SqliteVisitStore::new(db), user.id)
    }

    fn new_visit(user_id: i64, relationship: &str, check_in: DateTime<Utc>) -> NewVisit {
        NewVisit {
            name: "João Silva".to_string(),
            document: "123.456.789-00".to_string(),
            document_type: DocumentType::Cpf,
            phone: None,
            relationship: relationship.to_string(),
            patient_name: "Maria Santos Silva".to_string(),
            notes: None,
            user_id,
            check_in,
        }
    }

    #[tokio::test]
    async fn test_insert_attaches_owner() {
        let (store, user_id) = setup().await;
        let visit = store.insert(new_visit(user_id, "Filho", now())).await.unwrap();

        assert_eq!(visit.status, VisitStatus::Active);
        assert!(visit.check_out.is_none());
        assert_eq!(visit.user.name, "Maria");
        assert_eq!(visit.user.email, "recepcao@casa.org");
        assert_eq!(visit.created_at, visit.check_in);
    }

    #[tokio::test]
    async fn test_insert_unknown_owner_fails() {
        let (store, user_id) = setup().await;
        assert!(store.insert(new_visit(user_id + 100, "Filho", now())).await.is_err());
    }

    #[tokio::test]
    async fn test_guarded_transition_applies_once() {
        let (store, user_id) = setup().await;
        let visit = store.insert(new_visit(user_id, "Filho", now())).await.unwrap();
        let at = now();

        assert!(store
            .transition_active(visit.id, &Transition::CheckOut { at })
            .await
            .unwrap());
        assert!(!store
            .transition_active(visit.id, &Transition::CheckOut { at })
            .await
            .unwrap());
        assert!(!store
            .transition_active(visit.id, &Transition::Cancel { at })
            .await
            .unwrap());

        let stored = store.find(visit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VisitStatus::Completed);
        assert_eq!(stored.check_out, Some(at));
    }

    #[tokio::test]
    async fn test_cancel_appends_to_existing_notes() {
        let (store, user_id) = setup().await;
        let mut with_notes = new_visit(user_id, "Irmã", now());
        with_notes.notes = Some("Visita de rotina".to_string());
        let visit = store.insert(with_notes).await.unwrap();
        let bare = store.insert(new_visit(user_id, "Filho", now())).await.unwrap();

        let at = Utc.with_ymd_and_hms(2025, 5, 10, 14, 30, 0).unwrap();
        store
            .transition_active(visit.id, &Transition::Cancel { at })
            .await
            .unwrap();
        store
            .transition_active(bare.id, &Transition::Cancel { at })
            .await
            .unwrap();

        let cancelled = store.find(visit.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, VisitStatus::Cancelled);
        assert_eq!(
            cancelled.notes.as_deref(),
            Some("Visita de rotina | [CANCELADO: 2025-05-10T14:30:00.000Z]")
        );
        assert!(cancelled.check_out.is_none());

        let bare = store.find(bare.id).await.unwrap().unwrap();
        assert_eq!(
            bare.notes.as_deref(),
            Some("[CANCELADO: 2025-05-10T14:30:00.000Z]")
        );
    }

    #[tokio::test]
    async fn test_list_page_orders_newest_first() {
        let (store, user_id) = setup().await;
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        for i in 0..25 {
            store
                .insert(new_visit(user_id, "Filho", base + Duration::minutes(i)))
                .await
                .unwrap();
        }

        let (page, total) = store.list_page(None, 10, 10).await.unwrap();
        assert_eq!(total, 25);
        let ids: Vec<i64> = page.iter().map(|v| v.id).collect();
        assert_eq!(ids, (6..=15).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_list_page_status_filter_and_counts() {
        let (store, user_id) = setup().await;
        let first = store.insert(new_visit(user_id, "Filho", now())).await.unwrap();
        store.insert(new_visit(user_id, "Filho", now())).await.unwrap();
        store
            .transition_active(first.id, &Transition::CheckOut { at: now() })
            .await
            .unwrap();

        let (completed, total) = store
            .list_page(Some(VisitStatus::Completed), 0, 10)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(completed[0].id, first.id);

        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(store.count(Some(VisitStatus::Active)).await.unwrap(), 1);
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_created_between_is_inclusive() {
        let (store, user_id) = setup().await;
        let day = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        store.insert(new_visit(user_id, "Filho", day)).await.unwrap();
        store
            .insert(new_visit(user_id, "Filho", day + Duration::days(1)))
            .await
            .unwrap();

        let end = day + Duration::days(1);
        assert_eq!(store.list_created_between(day, end).await.unwrap().len(), 2);
        assert_eq!(store.count_created_between(day, end).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_relationship_counts() {
        let (store, user_id) = setup().await;
        for rel in ["Filho", "Filho", "Amigo"] {
            store.insert(new_visit(user_id, rel, now())).await.unwrap();
        }

        let counts = store.relationship_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![("Amigo".to_string(), 1), ("Filho".to_string(), 2)]
        );
    }
}
