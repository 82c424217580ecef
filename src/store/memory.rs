use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use super::VisitStore;
use crate::db::{append_note, cancellation_marker, NewVisit, Transition, Visit, VisitOwner, VisitStatus};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    visits: BTreeMap<i64, Visit>,
    owners: HashMap<i64, VisitOwner>,
}

/// Process-local visit storage.
///
/// Owners must be registered with [`InMemoryVisitStore::add_owner`] before
/// visits can reference them, mirroring the foreign key in the SQLite schema.
#[derive(Debug, Default)]
pub struct InMemoryVisitStore {
    inner: Mutex<Inner>,
}

impl InMemoryVisitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_owner(&self, user_id: i64, name: &str, email: &str) {
        self.inner.lock().owners.insert(
            user_id,
            VisitOwner {
                name: name.to_string(),
                email: email.to_string(),
            },
        );
    }

    /// Replace a stored visit wholesale, bypassing the status guard
    pub fn put(&self, visit: Visit) {
        let mut inner = self.inner.lock();
        inner.next_id = inner.next_id.max(visit.id);
        inner.visits.insert(visit.id, visit);
    }
}

fn newest_first(visits: &mut [Visit]) {
    visits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl VisitStore for InMemoryVisitStore {
    async fn insert(&self, visit: NewVisit) -> Result<Visit> {
        let mut inner = self.inner.lock();
        let owner = inner
            .owners
            .get(&visit.user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("User {} does not exist", visit.user_id))?;

        inner.next_id += 1;
        let stored = Visit {
            id: inner.next_id,
            name: visit.name,
            document: visit.document,
            document_type: visit.document_type,
            phone: visit.phone,
            relationship: visit.relationship,
            patient_name: visit.patient_name,
            notes: visit.notes,
            check_in: visit.check_in,
            check_out: None,
            status: VisitStatus::Active,
            user_id: visit.user_id,
            created_at: visit.check_in,
            user: owner,
        };
        inner.visits.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: i64) -> Result<Option<Visit>> {
        Ok(self.inner.lock().visits.get(&id).cloned())
    }

    async fn transition_active(&self, id: i64, transition: &Transition) -> Result<bool> {
        let mut inner = self.inner.lock();
        let visit = match inner.visits.get_mut(&id) {
            Some(visit) if visit.status == VisitStatus::Active => visit,
            _ => return Ok(false),
        };

        match transition {
            Transition::CheckOut { at } => {
                visit.check_out = Some(*at);
            }
            Transition::Cancel { at } => {
                visit.notes = Some(append_note(
                    visit.notes.as_deref(),
                    &cancellation_marker(at),
                ));
            }
        }
        visit.status = transition.target();
        Ok(true)
    }

    async fn list_active(&self) -> Result<Vec<Visit>> {
        let mut active: Vec<Visit> = self
            .inner
            .lock()
            .visits
            .values()
            .filter(|v| v.status == VisitStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.check_in.cmp(&a.check_in).then(b.id.cmp(&a.id)));
        Ok(active)
    }

    async fn list_page(
        &self,
        status: Option<VisitStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Visit>, i64)> {
        let mut matching: Vec<Visit> = self
            .inner
            .lock()
            .visits
            .values()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .cloned()
            .collect();
        newest_first(&mut matching);

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Visit>> {
        let mut matching: Vec<Visit> = self
            .inner
            .lock()
            .visits
            .values()
            .filter(|v| v.created_at >= start && v.created_at <= end)
            .cloned()
            .collect();
        newest_first(&mut matching);
        Ok(matching)
    }

    async fn count(&self, status: Option<VisitStatus>) -> Result<i64> {
        let inner = self.inner.lock();
        let count = inner
            .visits
            .values()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .count();
        Ok(count as i64)
    }

    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let inner = self.inner.lock();
        let count = inner
            .visits
            .values()
            .filter(|v| v.created_at >= start && v.created_at < end)
            .count();
        Ok(count as i64)
    }

    async fn relationship_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for visit in self.inner.lock().visits.values() {
            *counts.entry(visit.relationship.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now, DocumentType};

    fn new_visit(user_id: i64) -> NewVisit {
        NewVisit {
            name: "Ana Oliveira".to_string(),
            document: "987.654.321-00".to_string(),
            document_type: DocumentType::Cpf,
            phone: None,
            relationship: "Irmã".to_string(),
            patient_name: "Carlos Oliveira".to_string(),
            notes: None,
            user_id,
            check_in: now(),
        }
    }

    #[tokio::test]
    async fn test_insert_requires_known_owner() {
        let store = InMemoryVisitStore::new();
        assert!(store.insert(new_visit(1)).await.is_err());

        store.add_owner(1, "Admin", "admin@casa.org");
        let visit = store.insert(new_visit(1)).await.unwrap();
        assert_eq!(visit.id, 1);
        assert_eq!(visit.user.name, "Admin");
    }

    #[tokio::test]
    async fn test_transition_guard() {
        let store = InMemoryVisitStore::new();
        store.add_owner(1, "Admin", "admin@casa.org");
        let visit = store.insert(new_visit(1)).await.unwrap();
        let at = now();

        assert!(store
            .transition_active(visit.id, &Transition::Cancel { at })
            .await
            .unwrap());
        assert!(!store
            .transition_active(visit.id, &Transition::CheckOut { at })
            .await
            .unwrap());
        assert!(!store
            .transition_active(99, &Transition::CheckOut { at })
            .await
            .unwrap());

        let stored = store.find(visit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VisitStatus::Cancelled);
        assert!(stored.check_out.is_none());
    }
}
