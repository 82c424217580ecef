//! Demo data for trying the register out.
//!
//! Two accounts and four visits: two visitors still inside and two who have
//! already left.

use anyhow::{Context, Result};
use chrono::Duration;
use sqlx::SqlitePool;
use tracing::info;

use super::models::{
    create_user, find_user_by_email, format_timestamp, now, DocumentType, UserRole, VisitStatus,
};
use crate::api::auth::hash_password;

/// Demo account credentials: (email, password, name, role)
pub const DEMO_USERS: [(&str, &str, &str, UserRole); 2] = [
    (
        "admin@casaapoio.com",
        "admin123",
        "Administrador Sistema",
        UserRole::Admin,
    ),
    (
        "recepcao@casaapoio.com",
        "recepcao123",
        "Maria da Recepção",
        UserRole::Recepcao,
    ),
];

struct DemoVisit {
    name: &'static str,
    document: &'static str,
    document_type: DocumentType,
    phone: &'static str,
    relationship: &'static str,
    patient_name: &'static str,
    notes: &'static str,
    /// Hours before now
    checked_in: i64,
    checked_out: Option<i64>,
    /// Index into DEMO_USERS
    owner: usize,
}

const DEMO_VISITS: [DemoVisit; 4] = [
    DemoVisit {
        name: "João Silva",
        document: "123.456.789-00",
        document_type: DocumentType::Cpf,
        phone: "(11) 99999-1111",
        relationship: "Filho",
        patient_name: "Maria Santos Silva",
        notes: "Trouxe medicamentos para a paciente",
        checked_in: 0,
        checked_out: None,
        owner: 1,
    },
    DemoVisit {
        name: "Ana Oliveira",
        document: "987.654.321-00",
        document_type: DocumentType::Cpf,
        phone: "(11) 98888-2222",
        relationship: "Irmã",
        patient_name: "Carlos Oliveira",
        notes: "Visita de rotina",
        checked_in: 2,
        checked_out: None,
        owner: 0,
    },
    DemoVisit {
        name: "Pedro Costa",
        document: "45.678.901-X",
        document_type: DocumentType::Rg,
        phone: "(11) 97777-3333",
        relationship: "Amigo",
        patient_name: "Roberto Almeida",
        notes: "Visita rápida, trouxe frutas",
        checked_in: 24,
        checked_out: Some(23),
        owner: 1,
    },
    DemoVisit {
        name: "Mariana Lima",
        document: "234.567.890-11",
        document_type: DocumentType::Cpf,
        phone: "(11) 96666-4444",
        relationship: "Fisioterapeuta",
        patient_name: "Antônio Rodrigues",
        notes: "Sessão de fisioterapia completa",
        checked_in: 3,
        checked_out: Some(2),
        owner: 0,
    },
];

/// Insert the demo accounts and visits.
///
/// With `reset`, every existing visit and user is deleted first. Otherwise
/// demo accounts that already exist are reused.
pub async fn seed_demo_data(pool: &SqlitePool, reset: bool) -> Result<()> {
    if reset {
        info!("Clearing existing visits and users");
        sqlx::query("DELETE FROM visits").execute(pool).await?;
        sqlx::query("DELETE FROM users").execute(pool).await?;
    }

    let mut owner_ids = Vec::with_capacity(DEMO_USERS.len());
    for (email, password, name, role) in DEMO_USERS {
        let user = match find_user_by_email(pool, email).await? {
            Some(existing) => existing,
            None => {
                let hash = hash_password(password)
                    .map_err(|e| anyhow::anyhow!("Failed to hash demo password: {}", e))?;
                create_user(pool, email, &hash, name, role).await?
            }
        };
        owner_ids.push(user.id);
    }

    let current = now();
    for visit in &DEMO_VISITS {
        let check_in = current - Duration::hours(visit.checked_in);
        let check_out = visit.checked_out.map(|h| current - Duration::hours(h));
        let status = if check_out.is_some() {
            VisitStatus::Completed
        } else {
            VisitStatus::Active
        };
        let check_in = format_timestamp(&check_in);

        sqlx::query(
            r#"
            INSERT INTO visits (name, document, document_type, phone, relationship,
                                patient_name, notes, check_in, check_out, status,
                                user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(visit.name)
        .bind(visit.document)
        .bind(visit.document_type.as_str())
        .bind(visit.phone)
        .bind(visit.relationship)
        .bind(visit.patient_name)
        .bind(visit.notes)
        .bind(&check_in)
        .bind(check_out.as_ref().map(format_timestamp))
        .bind(status.as_str())
        .bind(owner_ids[visit.owner])
        .bind(&check_in)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert demo visit for {}", visit.name))?;
    }

    info!(
        users = owner_ids.len(),
        visits = DEMO_VISITS.len(),
        "Demo data seeded"
    );
    Ok(())
}
