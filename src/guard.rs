use uuid::Uuid;

use crate::model::{Role, Session};
use crate::profile::{Access, ProfileState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Auth,
    PublicHome,
    Home,
    Map,
    RestaurantDetail(Uuid),
    Dashboard,
    AdminDashboard,
    AddRestaurant,
    EditRestaurant(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    /// Profile still loading: show "checking access", never the protected view.
    Checking,
    Redirect(Route),
}

impl Route {
    fn required_role(&self) -> Option<Role> {
        match self {
            Route::AddRestaurant | Route::EditRestaurant(_) => Some(Role::Owner),
            Route::AdminDashboard => Some(Role::Admin),
            _ => None,
        }
    }

    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Route::Auth | Route::PublicHome | Route::Map | Route::RestaurantDetail(_)
        )
    }
}

/// What to mount for `route`. Navigation itself is left to the view layer.
pub fn resolve(route: Route, session: Option<&Session>, profile: &ProfileState) -> RouteDecision {
    if !route.needs_session() {
        return RouteDecision::Render;
    }
    if session.is_none() {
        return RouteDecision::Redirect(Route::Auth);
    }
    let Some(required) = route.required_role() else {
        return RouteDecision::Render;
    };
    match profile.access(required) {
        Access::Checking => RouteDecision::Checking,
        Access::Granted => RouteDecision::Render,
        Access::Denied => RouteDecision::Redirect(Route::Dashboard),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Profile;

    fn session() -> Session {
        Session {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: None,
            user_id: Uuid::nil(),
            email: None,
        }
    }

    fn loaded(role: Role) -> ProfileState {
        ProfileState {
            profile: Some(Profile {
                id: Uuid::nil(),
                first_name: None,
                last_name: None,
                role,
                cnpj: None,
            }),
            loading: false,
        }
    }

    #[test]
    fn public_routes_always_render() {
        let nobody = ProfileState::default();
        for route in [Route::Auth, Route::PublicHome, Route::Map, Route::RestaurantDetail(Uuid::nil())] {
            assert_eq!(resolve(route, None, &nobody), RouteDecision::Render);
        }
    }

    #[test]
    fn signed_out_users_go_to_auth() {
        let nobody = ProfileState {
            profile: None,
            loading: false,
        };
        assert_eq!(resolve(Route::Home, None, &nobody), RouteDecision::Redirect(Route::Auth));
        assert_eq!(
            resolve(Route::AdminDashboard, None, &nobody),
            RouteDecision::Redirect(Route::Auth)
        );
    }

    #[test]
    fn loading_profile_never_renders_protected_view() {
        let s = session();
        let loading = ProfileState::default();
        assert_eq!(resolve(Route::AddRestaurant, Some(&s), &loading), RouteDecision::Checking);
        assert_eq!(resolve(Route::AdminDashboard, Some(&s), &loading), RouteDecision::Checking);
        assert_eq!(resolve(Route::Dashboard, Some(&s), &loading), RouteDecision::Render);
    }

    #[test]
    fn roles_gate_owner_and_admin_routes() {
        let s = session();
        assert_eq!(
            resolve(Route::AddRestaurant, Some(&s), &loaded(Role::User)),
            RouteDecision::Redirect(Route::Dashboard)
        );
        assert_eq!(resolve(Route::AddRestaurant, Some(&s), &loaded(Role::Owner)), RouteDecision::Render);
        assert_eq!(
            resolve(Route::EditRestaurant(Uuid::nil()), Some(&s), &loaded(Role::Admin)),
            RouteDecision::Render
        );
        assert_eq!(
            resolve(Route::AdminDashboard, Some(&s), &loaded(Role::Owner)),
            RouteDecision::Redirect(Route::Dashboard)
        );
        assert_eq!(resolve(Route::AdminDashboard, Some(&s), &loaded(Role::Admin)), RouteDecision::Render);
    }

    #[test]
    fn missing_profile_is_denied() {
        let s = session();
        let failed = ProfileState {
            profile: None,
            loading: false,
        };
        assert_eq!(
            resolve(Route::AddRestaurant, Some(&s), &failed),
            RouteDecision::Redirect(Route::Dashboard)
        );
    }
}
