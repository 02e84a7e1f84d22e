//! Project registry.
//!
//! A project names one repository (and optionally a branch). Every retrieval
//! record, question, and commit row is scoped by its project id. Commands
//! accept either the id or the name.

use crate::error::{ProjectError, ValidationError};
use crate::loader::RepoRef;
use crate::models::Project;
use crate::store::Store;

/// Register a repository. The reference is validated up front so a typo
/// fails here rather than at the first `index`.
pub async fn create_project(
    store: &dyn Store,
    name: &str,
    repo_url: &str,
    branch: Option<&str>,
) -> Result<Project, ProjectError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProjectError::EmptyName);
    }
    RepoRef::parse(repo_url)?;

    if store.get_project(name).await?.is_some() {
        return Err(ProjectError::Duplicate(name.to_string()));
    }

    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        repo_url: repo_url.trim().to_string(),
        branch: branch
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string),
        created_at: chrono::Utc::now().timestamp(),
    };
    store.insert_project(&project).await?;
    tracing::info!(project = %project.name, id = %project.id, "project created");
    Ok(project)
}

pub async fn resolve_project(store: &dyn Store, id_or_name: &str) -> Result<Project, ProjectError> {
    store
        .get_project(id_or_name)
        .await?
        .ok_or_else(|| ValidationError::UnknownProject(id_or_name.to_string()).into())
}

/// Delete a project and everything scoped to it.
pub async fn remove_project(store: &dyn Store, id_or_name: &str) -> Result<Project, ProjectError> {
    let project = resolve_project(store, id_or_name).await?;
    store.delete_project(&project.id).await?;
    tracing::info!(project = %project.name, "project removed");
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_create_and_resolve() {
        let store = InMemoryStore::new();
        let p = create_project(&store, " widgets ", "acme/widgets", Some("  "))
            .await
            .unwrap();
        assert_eq!(p.name, "widgets");
        assert_eq!(p.branch, None);

        assert_eq!(resolve_project(&store, "widgets").await.unwrap().id, p.id);
        assert_eq!(resolve_project(&store, &p.id).await.unwrap().name, "widgets");
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let store = InMemoryStore::new();
        assert!(matches!(
            create_project(&store, "", "acme/widgets", None).await,
            Err(ProjectError::EmptyName)
        ));
        assert!(matches!(
            create_project(&store, "x", "not a repo", None).await,
            Err(ProjectError::InvalidReference(LoadError::InvalidReference(_)))
        ));

        create_project(&store, "x", "acme/x", None).await.unwrap();
        assert!(matches!(
            create_project(&store, "x", "acme/y", None).await,
            Err(ProjectError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let store = InMemoryStore::new();
        assert!(matches!(
            remove_project(&store, "ghost").await,
            Err(ProjectError::Validation(ValidationError::UnknownProject(_)))
        ));
    }
}
