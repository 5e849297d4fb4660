//! Generic resource pipeline.
//!
//! Every catalog entity is served by the same machinery:
//! [`ResourceService`] composes a policy (authorization + scope choice), an
//! optional attribute validator, and a repository into the uniform
//! `List/Find/Create/Update/Delete/Meta` contract. Entities come back
//! wrapped in [`ResourceObject`] carrying the per-instance permissions the
//! caller holds on them.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use crate::admin::scopes::{self, Scope, ScopeFilter};
use crate::error::AppError;

/// Flat query-parameter map as received by the gateway. Unknown keys are
/// ignored by every consumer.
pub type QueryParams = HashMap<String, String>;

// ============================================================================
// Auth context
// ============================================================================

/// Identity attached to a request by the authentication layer.
///
/// A zero `user_id` with `is_admin == false` is an unauthenticated request;
/// the super-user authenticates as `user_id == 0` with `is_admin == true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    user_id: i64,
    is_admin: bool,
}

impl AuthContext {
    pub fn new(user_id: i64, is_admin: bool) -> Self {
        Self { user_id, is_admin }
    }

    pub fn anonymous() -> Self {
        Self::new(0, false)
    }

    /// Super-user context: admin without a backing user row.
    pub fn system() -> Self {
        Self::new(0, true)
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id != 0 || self.is_admin
    }
}

// ============================================================================
// Permissions and response shapes
// ============================================================================

/// Class-level permissions on a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourcePermissions {
    pub read: bool,
    pub create: bool,
}

/// Per-instance permissions, attached to every returned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceInstancePermissions {
    pub update: bool,
    pub delete: bool,
}

/// Entry of the navigable-resources map served at `/resources`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceMeta {
    pub key: &'static str,
    pub permissions: ResourcePermissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionMeta {
    pub total_count: i64,
}

/// List response: items plus the total row count after filters but before
/// pagination. An empty result is an empty array, never null.
#[derive(Debug, Serialize)]
pub struct Collection<T> {
    pub items: Vec<T>,
    pub meta: CollectionMeta,
}

impl<T> Collection<T> {
    pub fn new(items: Vec<T>, total_count: i64) -> Self {
        Self {
            items,
            meta: CollectionMeta { total_count },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Collection<U> {
        Collection {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// An entity wrapped with the caller's instance permissions.
#[derive(Debug, Serialize)]
pub struct ResourceObject<T> {
    #[serde(flatten)]
    pub resource: T,
    #[serde(rename = "_permissions")]
    pub permissions: ResourceInstancePermissions,
}

// ============================================================================
// Pipeline traits
// ============================================================================

/// Persistence contract a resource repository implements.
///
/// Repositories interpret the [`ScopeFilter`] handed down from scope
/// resolution; they are the only layer that knows how ownership maps onto
/// rows (directly via `user_id` or through the owning app).
#[async_trait]
pub trait ResourceRepo: Send + Sync {
    type Resource: Serialize + Send + Sync;
    type Attrs: Send + Sync;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<Self::Resource>, AppError>;

    /// Single-row read; missing rows surface as [`AppError::NotFound`].
    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<Self::Resource, AppError>;

    async fn create(&self, attrs: &Self::Attrs) -> Result<Self::Resource, AppError>;

    /// Partial update: only attributes that are present are written. Returns
    /// the row as observed after the write.
    async fn update(&self, id: i64, attrs: &Self::Attrs) -> Result<Self::Resource, AppError>;

    async fn delete(&self, id: i64) -> Result<(), AppError>;
}

/// Authorization policy of a resource.
#[async_trait]
pub trait ResourcePolicy: Send + Sync {
    type Resource: Send + Sync;
    type Attrs: Send + Sync;

    fn permissions(&self, _auth: &AuthContext) -> ResourcePermissions {
        ResourcePermissions {
            read: true,
            create: true,
        }
    }

    fn instance_permissions(
        &self,
        _auth: &AuthContext,
        _resource: &Self::Resource,
    ) -> ResourceInstancePermissions {
        ResourceInstancePermissions {
            update: true,
            delete: true,
        }
    }

    fn read_scope(&self, auth: &AuthContext) -> Scope;

    fn manage_scope(&self, auth: &AuthContext) -> Scope;

    /// Cross-entity guard for creation, e.g. "can the caller manage the app
    /// this configuration points at".
    async fn authorize_create(
        &self,
        _auth: &AuthContext,
        _attrs: &Self::Attrs,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Called with the resource already resolved through the manage scope.
    async fn authorize_update(
        &self,
        _auth: &AuthContext,
        _resource: &Self::Resource,
        _attrs: &Self::Attrs,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn authorize_delete(
        &self,
        _auth: &AuthContext,
        _resource: &Self::Resource,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

/// Contextual attribute validation. Validators may consult sibling
/// repositories (demand sources) to decide which shape rules apply.
#[async_trait]
pub trait AttrsValidator<A>: Send + Sync {
    async fn validate(&self, attrs: &A) -> Result<(), AppError>;
}

// ============================================================================
// Resource service
// ============================================================================

/// CRUD service for one resource kind.
pub struct ResourceService<R, P>
where
    R: ResourceRepo,
    P: ResourcePolicy<Resource = R::Resource, Attrs = R::Attrs>,
{
    key: &'static str,
    repo: Arc<R>,
    policy: P,
    prepare_create_attrs: Option<fn(&AuthContext, &mut R::Attrs)>,
    validator: Option<Box<dyn AttrsValidator<R::Attrs>>>,
}

impl<R, P> ResourceService<R, P>
where
    R: ResourceRepo,
    P: ResourcePolicy<Resource = R::Resource, Attrs = R::Attrs>,
{
    pub fn new(key: &'static str, repo: Arc<R>, policy: P) -> Self {
        Self {
            key,
            repo,
            policy,
            prepare_create_attrs: None,
            validator: None,
        }
    }

    /// Attribute fix-up applied before create authorization (e.g. forcing
    /// `user_id` to the caller).
    pub fn with_prepare_create_attrs(mut self, prepare: fn(&AuthContext, &mut R::Attrs)) -> Self {
        self.prepare_create_attrs = Some(prepare);
        self
    }

    pub fn with_validator(mut self, validator: impl AttrsValidator<R::Attrs> + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    fn wrap(&self, auth: &AuthContext, resource: R::Resource) -> ResourceObject<R::Resource> {
        let permissions = self.policy.instance_permissions(auth, &resource);
        ResourceObject {
            resource,
            permissions,
        }
    }

    async fn validate(&self, attrs: &R::Attrs) -> Result<(), AppError> {
        match &self.validator {
            Some(validator) => validator.validate(attrs).await,
            None => Ok(()),
        }
    }

    pub fn meta(&self, auth: &AuthContext) -> ResourceMeta {
        ResourceMeta {
            key: self.key,
            permissions: self.policy.permissions(auth),
        }
    }

    pub async fn list(
        &self,
        auth: &AuthContext,
        params: &QueryParams,
    ) -> Result<Collection<ResourceObject<R::Resource>>, AppError> {
        let scope = self.policy.read_scope(auth);
        let collection = scopes::list(self.repo.as_ref(), scope, auth, params).await?;
        Ok(collection.map(|resource| self.wrap(auth, resource)))
    }

    pub async fn find(
        &self,
        auth: &AuthContext,
        id: i64,
    ) -> Result<Option<ResourceObject<R::Resource>>, AppError> {
        let scope = self.policy.read_scope(auth);
        let resource = scopes::find(self.repo.as_ref(), scope, auth, id).await?;
        Ok(resource.map(|resource| self.wrap(auth, resource)))
    }

    pub async fn create(
        &self,
        auth: &AuthContext,
        mut attrs: R::Attrs,
    ) -> Result<ResourceObject<R::Resource>, AppError> {
        if let Some(prepare) = self.prepare_create_attrs {
            prepare(auth, &mut attrs);
        }

        self.policy.authorize_create(auth, &attrs).await?;
        self.validate(&attrs).await?;

        let resource = self.repo.create(&attrs).await?;
        Ok(self.wrap(auth, resource))
    }

    pub async fn update(
        &self,
        auth: &AuthContext,
        id: i64,
        attrs: R::Attrs,
    ) -> Result<ResourceObject<R::Resource>, AppError> {
        let scope = self.policy.manage_scope(auth);
        let existing = scopes::find(self.repo.as_ref(), scope, auth, id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.policy.authorize_update(auth, &existing, &attrs).await?;
        self.validate(&attrs).await?;

        let resource = self.repo.update(id, &attrs).await?;
        Ok(self.wrap(auth, resource))
    }

    pub async fn delete(&self, auth: &AuthContext, id: i64) -> Result<(), AppError> {
        let scope = self.policy.manage_scope(auth);
        let existing = scopes::find(self.repo.as_ref(), scope, auth, id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.policy.authorize_delete(auth, &existing).await?;

        self.repo.delete(id).await
    }
}

// ============================================================================
// Handler-facing abstraction
// ============================================================================

/// Uniform surface the generic gateway handlers are written against. Every
/// [`ResourceService`] instantiation implements it.
#[async_trait]
pub trait CrudService: Send + Sync + 'static {
    type Resource: Serialize + Send + Sync;
    type Attrs: DeserializeOwned + Send + Sync;

    fn meta(&self, auth: &AuthContext) -> ResourceMeta;

    async fn list(
        &self,
        auth: &AuthContext,
        params: &QueryParams,
    ) -> Result<Collection<ResourceObject<Self::Resource>>, AppError>;

    async fn find(
        &self,
        auth: &AuthContext,
        id: i64,
    ) -> Result<Option<ResourceObject<Self::Resource>>, AppError>;

    async fn create(
        &self,
        auth: &AuthContext,
        attrs: Self::Attrs,
    ) -> Result<ResourceObject<Self::Resource>, AppError>;

    async fn update(
        &self,
        auth: &AuthContext,
        id: i64,
        attrs: Self::Attrs,
    ) -> Result<ResourceObject<Self::Resource>, AppError>;

    async fn delete(&self, auth: &AuthContext, id: i64) -> Result<(), AppError>;
}

#[async_trait]
impl<R, P> CrudService for ResourceService<R, P>
where
    R: ResourceRepo + 'static,
    R::Attrs: DeserializeOwned,
    P: ResourcePolicy<Resource = R::Resource, Attrs = R::Attrs> + 'static,
{
    type Resource = R::Resource;
    type Attrs = R::Attrs;

    fn meta(&self, auth: &AuthContext) -> ResourceMeta {
        ResourceService::meta(self, auth)
    }

    async fn list(
        &self,
        auth: &AuthContext,
        params: &QueryParams,
    ) -> Result<Collection<ResourceObject<Self::Resource>>, AppError> {
        ResourceService::list(self, auth, params).await
    }

    async fn find(
        &self,
        auth: &AuthContext,
        id: i64,
    ) -> Result<Option<ResourceObject<Self::Resource>>, AppError> {
        ResourceService::find(self, auth, id).await
    }

    async fn create(
        &self,
        auth: &AuthContext,
        attrs: Self::Attrs,
    ) -> Result<ResourceObject<Self::Resource>, AppError> {
        ResourceService::create(self, auth, attrs).await
    }

    async fn update(
        &self,
        auth: &AuthContext,
        id: i64,
        attrs: Self::Attrs,
    ) -> Result<ResourceObject<Self::Resource>, AppError> {
        ResourceService::update(self, auth, id, attrs).await
    }

    async fn delete(&self, auth: &AuthContext, id: i64) -> Result<(), AppError> {
        ResourceService::delete(self, auth, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Widget {
        id: i64,
        user_id: i64,
        name: String,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    struct WidgetAttrs {
        user_id: Option<i64>,
        name: Option<String>,
    }

    #[derive(Default)]
    struct WidgetRepo {
        rows: Mutex<Vec<Widget>>,
        next_id: Mutex<i64>,
    }

    impl WidgetRepo {
        fn seed(rows: Vec<Widget>) -> Self {
            let next = rows.iter().map(|w| w.id).max().unwrap_or(0) + 1;
            Self {
                rows: Mutex::new(rows),
                next_id: Mutex::new(next),
            }
        }

        fn visible(&self, scope: &ScopeFilter) -> Vec<Widget> {
            let rows = self.rows.lock().unwrap();
            rows.iter()
                .filter(|w| match scope {
                    ScopeFilter::All => true,
                    ScopeFilter::OwnedBy(uid) => w.user_id == *uid,
                    ScopeFilter::OwnedOrSharedBy(uid) => w.user_id == *uid || w.user_id == 0,
                })
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ResourceRepo for WidgetRepo {
        type Resource = Widget;
        type Attrs = WidgetAttrs;

        async fn list(
            &self,
            scope: &ScopeFilter,
            _params: &QueryParams,
        ) -> Result<Collection<Widget>, AppError> {
            let rows = self.visible(scope);
            let total = rows.len() as i64;
            Ok(Collection::new(rows, total))
        }

        async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<Widget, AppError> {
            self.visible(scope)
                .into_iter()
                .find(|w| w.id == id)
                .ok_or(AppError::NotFound)
        }

        async fn create(&self, attrs: &WidgetAttrs) -> Result<Widget, AppError> {
            let mut next_id = self.next_id.lock().unwrap();
            let widget = Widget {
                id: *next_id,
                user_id: attrs.user_id.unwrap_or(0),
                name: attrs.name.clone().unwrap_or_default(),
            };
            *next_id += 1;
            self.rows.lock().unwrap().push(widget.clone());
            Ok(widget)
        }

        async fn update(&self, id: i64, attrs: &WidgetAttrs) -> Result<Widget, AppError> {
            let mut rows = self.rows.lock().unwrap();
            let widget = rows
                .iter_mut()
                .find(|w| w.id == id)
                .ok_or(AppError::NotFound)?;
            if let Some(user_id) = attrs.user_id {
                widget.user_id = user_id;
            }
            if let Some(name) = &attrs.name {
                widget.name = name.clone();
            }
            Ok(widget.clone())
        }

        async fn delete(&self, id: i64) -> Result<(), AppError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|w| w.id != id);
            if rows.len() == before {
                return Err(AppError::NotFound);
            }
            Ok(())
        }
    }

    struct WidgetPolicy;

    #[async_trait]
    impl ResourcePolicy for WidgetPolicy {
        type Resource = Widget;
        type Attrs = WidgetAttrs;

        fn read_scope(&self, _auth: &AuthContext) -> Scope {
            Scope::Owned
        }

        fn manage_scope(&self, _auth: &AuthContext) -> Scope {
            Scope::Owned
        }

        fn instance_permissions(
            &self,
            auth: &AuthContext,
            resource: &Widget,
        ) -> ResourceInstancePermissions {
            let own = auth.is_admin() || auth.user_id() == resource.user_id;
            ResourceInstancePermissions {
                update: own,
                delete: own,
            }
        }
    }

    fn service() -> ResourceService<WidgetRepo, WidgetPolicy> {
        let repo = WidgetRepo::seed(vec![
            Widget {
                id: 1,
                user_id: 7,
                name: "mine".into(),
            },
            Widget {
                id: 2,
                user_id: 9,
                name: "theirs".into(),
            },
        ]);
        ResourceService::new("widget", Arc::new(repo), WidgetPolicy).with_prepare_create_attrs(
            |auth, attrs| {
                if !auth.is_admin() || attrs.user_id.is_none() {
                    attrs.user_id = Some(auth.user_id());
                }
            },
        )
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_owner() {
        let svc = service();
        let auth = AuthContext::new(7, false);

        let collection = svc.list(&auth, &QueryParams::new()).await.unwrap();
        assert_eq!(collection.meta.total_count, 1);
        assert_eq!(collection.items[0].resource.id, 1);
        assert!(collection.items[0].permissions.update);
    }

    #[tokio::test]
    async fn test_admin_sees_everything() {
        let svc = service();
        let auth = AuthContext::new(1, true);

        let collection = svc.list(&auth, &QueryParams::new()).await.unwrap();
        assert_eq!(collection.meta.total_count, 2);
    }

    #[tokio::test]
    async fn test_update_foreign_row_is_not_found() {
        let svc = service();
        let auth = AuthContext::new(7, false);

        let err = svc
            .update(&auth, 2, WidgetAttrs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_create_forces_owner_for_non_admin() {
        let svc = service();
        let auth = AuthContext::new(7, false);

        let created = svc
            .create(
                &auth,
                WidgetAttrs {
                    user_id: Some(42),
                    name: Some("X".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.resource.user_id, 7);
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let svc = service();
        let auth = AuthContext::new(7, false);

        svc.delete(&auth, 1).await.unwrap();
        let err = svc.delete(&auth, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_anonymous_is_unauthorized() {
        let svc = service();
        let auth = AuthContext::anonymous();

        let err = svc.list(&auth, &QueryParams::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
