//! Resource visibility scopes.
//!
//! A [`Scope`] is chosen by a policy; resolving it against the caller's
//! [`AuthContext`] yields either a [`ScopeFilter`] the repository applies to
//! its queries, or an authorization error. Repositories never see the
//! auth context itself.

use crate::admin::resource::{AuthContext, Collection, QueryParams, ResourceRepo};
use crate::error::AppError;

/// Visibility class of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Everyone sees every row (countries, demand sources).
    Public,
    /// Admin sees every row; everyone else is rejected.
    Private,
    /// Admin sees every row; users see rows they own (directly or through
    /// the owning app).
    Owned,
    /// Like [`Scope::Owned`] plus rows shared with the user.
    OwnedOrShared,
}

/// Row filter a resolved scope imposes on repository queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    All,
    OwnedBy(i64),
    OwnedOrSharedBy(i64),
}

impl Scope {
    pub fn resolve(self, auth: &AuthContext) -> Result<ScopeFilter, AppError> {
        if self != Scope::Public && !auth.is_authenticated() {
            return Err(AppError::unauthorized("authentication required"));
        }

        match self {
            Scope::Public => Ok(ScopeFilter::All),
            Scope::Private => {
                if auth.is_admin() {
                    Ok(ScopeFilter::All)
                } else {
                    Err(AppError::unauthorized("admin access required"))
                }
            }
            Scope::Owned => {
                if auth.is_admin() {
                    Ok(ScopeFilter::All)
                } else {
                    Ok(ScopeFilter::OwnedBy(auth.user_id()))
                }
            }
            Scope::OwnedOrShared => {
                if auth.is_admin() {
                    Ok(ScopeFilter::All)
                } else {
                    Ok(ScopeFilter::OwnedOrSharedBy(auth.user_id()))
                }
            }
        }
    }
}

pub async fn list<R: ResourceRepo + ?Sized>(
    repo: &R,
    scope: Scope,
    auth: &AuthContext,
    params: &QueryParams,
) -> Result<Collection<R::Resource>, AppError> {
    let filter = scope.resolve(auth)?;
    repo.list(&filter, params).await
}

/// Scoped single-row read.
///
/// `find(0)` under a private scope is a probe UIs send before an id is
/// known; it resolves to `Ok(None)` for admins instead of a lookup.
pub async fn find<R: ResourceRepo + ?Sized>(
    repo: &R,
    scope: Scope,
    auth: &AuthContext,
    id: i64,
) -> Result<Option<R::Resource>, AppError> {
    let filter = scope.resolve(auth)?;

    if scope == Scope::Private && id == 0 {
        return Ok(None);
    }

    repo.find(&filter, id).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_resolves_for_everyone() {
        assert_eq!(
            Scope::Public.resolve(&AuthContext::anonymous()).unwrap(),
            ScopeFilter::All
        );
        assert_eq!(
            Scope::Public.resolve(&AuthContext::new(7, false)).unwrap(),
            ScopeFilter::All
        );
    }

    #[test]
    fn test_private_requires_admin() {
        assert_eq!(
            Scope::Private.resolve(&AuthContext::new(1, true)).unwrap(),
            ScopeFilter::All
        );
        assert!(matches!(
            Scope::Private.resolve(&AuthContext::new(7, false)),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_owned_narrows_to_caller() {
        assert_eq!(
            Scope::Owned.resolve(&AuthContext::new(7, false)).unwrap(),
            ScopeFilter::OwnedBy(7)
        );
        assert_eq!(
            Scope::Owned.resolve(&AuthContext::new(1, true)).unwrap(),
            ScopeFilter::All
        );
    }

    #[test]
    fn test_owned_or_shared() {
        assert_eq!(
            Scope::OwnedOrShared
                .resolve(&AuthContext::new(7, false))
                .unwrap(),
            ScopeFilter::OwnedOrSharedBy(7)
        );
    }

    #[test]
    fn test_unauthenticated_rejected_outside_public() {
        for scope in [Scope::Private, Scope::Owned, Scope::OwnedOrShared] {
            assert!(matches!(
                scope.resolve(&AuthContext::anonymous()),
                Err(AppError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_system_context_is_admin_everywhere() {
        let system = AuthContext::system();
        for scope in [Scope::Private, Scope::Owned, Scope::OwnedOrShared] {
            assert_eq!(scope.resolve(&system).unwrap(), ScopeFilter::All);
        }
    }
}
