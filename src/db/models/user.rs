//! User models and queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{format_timestamp, now};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Recepcao,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Recepcao => "RECEPCAO",
        }
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Recepcao
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "RECEPCAO" => Ok(Self::Recepcao),
            _ => Err("Role must be ADMIN or RECEPCAO".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// User with the number of visits they registered
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserWithVisitCount {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub visit_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Insert a user; `password_hash` must already be hashed
pub async fn create_user(
    db: &SqlitePool,
    email: &str,
    password_hash: &str,
    name: &str,
    role: UserRole,
) -> Result<User, sqlx::Error> {
    let created_at = format_timestamp(&now());

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, name, role, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role.as_str())
    .bind(&created_at)
    .execute(db)
    .await?;

    Ok(User {
        id: result.last_insert_rowid(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        name: name.to_string(),
        role: role.as_str().to_string(),
        created_at,
    })
}

pub async fn count_users(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await
}

/// All users, newest first, with how many visits each registered
pub async fn list_users_with_visit_counts(
    db: &SqlitePool,
) -> Result<Vec<UserWithVisitCount>, sqlx::Error> {
    sqlx::query_as::<_, UserWithVisitCount>(
        r#"
        SELECT u.id, u.name, u.email, u.role, u.created_at, COUNT(v.id) AS visit_count
        FROM users u
        LEFT JOIN visits v ON v.user_id = u.id
        GROUP BY u.id
        ORDER BY u.created_at DESC, u.id DESC
        "#,
    )
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    #[test]
    fn test_role_parse_and_default() {
        assert_eq!("ADMIN".parse::<UserRole>(), Ok(UserRole::Admin));
        assert_eq!("RECEPCAO".parse::<UserRole>(), Ok(UserRole::Recepcao));
        assert!("admin".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::Recepcao);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: 1,
            email: "a@b.com".to_string(),
            password_hash: "secret-hash".to_string(),
            name: "A".to_string(),
            role: "ADMIN".to_string(),
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let db = init_in_memory().await.unwrap();
        let created = create_user(&db, "recepcao@casa.org", "hash", "Maria", UserRole::Recepcao)
            .await
            .unwrap();

        let by_email = find_user_by_email(&db, "recepcao@casa.org").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.role, "RECEPCAO");

        let by_id = find_user_by_id(&db, created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "recepcao@casa.org");

        assert!(find_user_by_id(&db, created.id + 1).await.unwrap().is_none());
        assert_eq!(count_users(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = init_in_memory().await.unwrap();
        create_user(&db, "dup@casa.org", "hash", "One", UserRole::Admin)
            .await
            .unwrap();
        let err = create_user(&db, "dup@casa.org", "hash", "Two", UserRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(_)));
    }

    #[tokio::test]
    async fn test_users_without_visits_have_zero_count() {
        let db = init_in_memory().await.unwrap();
        create_user(&db, "a@casa.org", "hash", "A", UserRole::Admin)
            .await
            .unwrap();

        let users = list_users_with_visit_counts(&db).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].visit_count, 0);
    }
}
