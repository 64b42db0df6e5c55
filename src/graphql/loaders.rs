//! Batched lookups for nested resolvers.
//!
//! A fresh `DataLoader` is built for every request (and every WebSocket
//! connection), so there is no cross-request caching. Keys requested in the
//! same tick are merged into a single `IN (...)` query.

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::dataloader::{DataLoader, Loader};

use crate::db::{self, DbPool, Model, Project, User};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId(pub String);

pub struct DbLoader {
    db: DbPool,
}

impl DbLoader {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

/// Loader for one request.
pub fn request_loader(db: &DbPool) -> DataLoader<DbLoader> {
    DataLoader::new(DbLoader::new(db.clone()), tokio::spawn)
}

impl Loader<UserId> for DbLoader {
    type Value = User;
    type Error = Arc<crate::Error>;

    async fn load(&self, keys: &[UserId]) -> Result<HashMap<UserId, User>, Self::Error> {
        let ids: Vec<String> = keys.iter().map(|k| k.0.clone()).collect();
        let users = db::get_users_by_ids(&self.db, &ids)
            .await
            .map_err(Arc::new)?;
        Ok(users.into_iter().map(|u| (UserId(u.id.clone()), u)).collect())
    }
}

impl Loader<ModelId> for DbLoader {
    type Value = Model;
    type Error = Arc<crate::Error>;

    async fn load(&self, keys: &[ModelId]) -> Result<HashMap<ModelId, Model>, Self::Error> {
        let ids: Vec<String> = keys.iter().map(|k| k.0.clone()).collect();
        let models = db::get_models_by_ids(&self.db, &ids)
            .await
            .map_err(Arc::new)?;
        Ok(models.into_iter().map(|m| (ModelId(m.id.clone()), m)).collect())
    }
}

impl Loader<ProjectId> for DbLoader {
    type Value = Project;
    type Error = Arc<crate::Error>;

    async fn load(&self, keys: &[ProjectId]) -> Result<HashMap<ProjectId, Project>, Self::Error> {
        let ids: Vec<String> = keys.iter().map(|k| k.0.clone()).collect();
        let projects = db::get_projects_by_ids(&self.db, &ids)
            .await
            .map_err(Arc::new)?;
        Ok(projects
            .into_iter()
            .map(|p| (ProjectId(p.id.clone()), p))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_user, init_test_pool, new_id, CreateUser};
    use crate::services::ServerRole;

    #[tokio::test]
    async fn test_user_loader_skips_unknown_ids() {
        let pool = init_test_pool().await.unwrap();
        let user = create_user(
            &pool,
            CreateUser {
                id: new_id(),
                email: "loader@example.com".into(),
                name: "Loader".into(),
                company: None,
                password_hash: None,
                role: ServerRole::User,
            },
        )
        .await
        .unwrap();

        let loader = request_loader(&pool);
        let found = loader
            .load_many([UserId(user.id.clone()), UserId("missing".into())])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[&UserId(user.id)].email, "loader@example.com");
    }
}
