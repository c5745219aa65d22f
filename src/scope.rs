//! Scope Resolution
//!
//! Answers who owns which hospitals and who sits one level up the reporting
//! chain, from the `hospital_assignments` reference table. Missing hierarchy
//! rows produce empty results, never errors; whether an empty scope
//! restricts is decided by [`ScopeMode`].

use sqlx::PgPool;

use crate::config::ScopeMode;
use crate::error::WorkflowError;
use crate::types::{Representative, WorkflowRole};

/// Resolves hospital ownership and reporting relationships
#[derive(Clone)]
pub struct ScopeResolver {
    pool: PgPool,
    mode: ScopeMode,
}

#[derive(Debug, sqlx::FromRow)]
struct RepresentativeRow {
    actor_code: String,
    actor_role: WorkflowRole,
    name: Option<String>,
    email: Option<String>,
}

impl From<RepresentativeRow> for Representative {
    fn from(row: RepresentativeRow) -> Self {
        Self {
            actor_code: row.actor_code,
            actor_role: row.actor_role,
            name: row.name,
            email: row.email,
        }
    }
}

impl ScopeResolver {
    pub fn new(pool: PgPool, mode: ScopeMode) -> Self {
        Self { pool, mode }
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Hospitals owned by `actor_code` under `role`. Representatives own
    /// directly; managers own via subordinate aggregation. Roles outside the
    /// hierarchy own nothing.
    pub async fn hospital_scope(
        &self,
        role: WorkflowRole,
        actor_code: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        if actor_code.is_empty() {
            return Ok(Vec::new());
        }
        let column = match role {
            WorkflowRole::Mr => "mr_code",
            WorkflowRole::Dsm => "dsm_code",
            WorkflowRole::Rsm => "rsm_code",
            _ => return Ok(Vec::new()),
        };
        let codes: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT hospital_code FROM hospital_assignments WHERE {column} = $1"
        ))
        .bind(actor_code)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    /// Union of hospitals `actor_code` covers across all hierarchy roles;
    /// used when the caller's role is not yet known, e.g. at submission time.
    pub async fn hospital_scope_for_actor(
        &self,
        actor_code: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        if actor_code.is_empty() {
            return Ok(Vec::new());
        }
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT hospital_code FROM hospital_assignments
            WHERE mr_code = $1 OR dsm_code = $1 OR rsm_code = $1
            "#,
        )
        .bind(actor_code)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    /// Fail with Authorization when `hospital_code` lies outside the actor's
    /// scope. Under permissive mode an actor with no scope rows at all is
    /// not restricted.
    pub async fn ensure_in_scope(
        &self,
        actor_code: &str,
        hospital_code: &str,
    ) -> Result<(), WorkflowError> {
        if actor_code.is_empty() || hospital_code.is_empty() {
            return Ok(());
        }
        let scope = self.hospital_scope_for_actor(actor_code).await?;
        let unrestricted = scope.is_empty() && self.mode == ScopeMode::Permissive;
        if !unrestricted && !scope.iter().any(|c| c == hospital_code) {
            return Err(WorkflowError::Authorization(format!(
                "hospital {hospital_code} is outside the scope of {actor_code}"
            )));
        }
        Ok(())
    }

    /// Check a set of hospital codes against a scope already in hand,
    /// returning the offending codes. An empty scope restricts nothing under
    /// permissive mode and everything under strict mode.
    pub fn out_of_scope<'a>(&self, scope: &[String], codes: &'a [String]) -> Vec<&'a str> {
        if scope.is_empty() && self.mode == ScopeMode::Permissive {
            return Vec::new();
        }
        codes
            .iter()
            .filter(|c| !scope.iter().any(|s| s == *c))
            .map(|c| c.as_str())
            .collect()
    }

    /// Representatives reachable under a manager, for delegation pickers.
    /// A representative sees only themself.
    pub async fn representatives(
        &self,
        role: WorkflowRole,
        actor_code: &str,
    ) -> Result<Vec<Representative>, WorkflowError> {
        if actor_code.is_empty() {
            return Ok(Vec::new());
        }
        if role == WorkflowRole::Mr {
            let row = sqlx::query_as::<_, RepresentativeRow>(
                r#"
                SELECT actor_code, actor_role, name, email FROM user_mappings
                WHERE actor_code = $1 AND actor_role = 'MR' AND enabled
                LIMIT 1
                "#,
            )
            .bind(actor_code)
            .fetch_optional(&self.pool)
            .await?;
            return Ok(row.into_iter().map(Into::into).collect());
        }

        let column = match role {
            WorkflowRole::Dsm => "dsm_code",
            WorkflowRole::Rsm => "rsm_code",
            _ => return Ok(Vec::new()),
        };
        let mr_codes: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT mr_code FROM hospital_assignments WHERE {column} = $1"
        ))
        .bind(actor_code)
        .fetch_all(&self.pool)
        .await?;
        if mr_codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, RepresentativeRow>(
            r#"
            SELECT actor_code, actor_role, name, email FROM user_mappings
            WHERE actor_code = ANY($1) AND actor_role = 'MR' AND enabled
            ORDER BY actor_code
            "#,
        )
        .bind(&mr_codes)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// One level up the hierarchy: MR reports to a DSM, DSM to an RSM. RSMs
    /// and configured roles have no hierarchy-derived manager.
    pub async fn direct_manager(
        &self,
        role: WorkflowRole,
        actor_code: &str,
    ) -> Result<Option<String>, WorkflowError> {
        if actor_code.is_empty() {
            return Ok(None);
        }
        let (select, filter) = match role {
            WorkflowRole::Mr => ("dsm_code", "mr_code"),
            WorkflowRole::Dsm => ("rsm_code", "dsm_code"),
            _ => return Ok(None),
        };
        let manager: Option<Option<String>> = sqlx::query_scalar(&format!(
            "SELECT {select} FROM hospital_assignments WHERE {filter} = $1 LIMIT 1"
        ))
        .bind(actor_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(manager.flatten().filter(|m| !m.is_empty()))
    }
}
