use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Authenticated session as handed out by the backend. Token material is
/// opaque to the rest of the crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::User => "user",
        }
    }

    pub fn parse_role(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// Whether this role satisfies a route that requires `required`.
    /// Admins can do everything owners can; plain users nothing.
    pub fn satisfies(&self, required: Role) -> bool {
        match required {
            Role::User => true,
            Role::Owner => matches!(self, Role::Owner | Role::Admin),
            Role::Admin => matches!(self, Role::Admin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub cnpj: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

/// Read-only projection used by the public feed and the owner dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A restaurant that can be placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantPin {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl RestaurantPin {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Row of the admin restaurants table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantListing {
    pub id: Uuid,
    pub name: String,
    pub cuisine: Option<String>,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
}

/// Everything the restaurant page shows about one restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantDetail {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub cuisine: Option<String>,
    pub image_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RestaurantDetail {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates {
            latitude: self.latitude?,
            longitude: self.longitude?,
        })
    }
}

/// A review with its author's name, newest first in every listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewer_first_name: Option<String>,
    pub reviewer_last_name: Option<String>,
}

impl Review {
    /// Author name, or "User" when the profile has no name or is gone.
    pub fn reviewer_name(&self) -> String {
        let first = self.reviewer_first_name.as_deref().unwrap_or_default();
        let last = self.reviewer_last_name.as_deref().unwrap_or_default();
        let name = format!("{first} {last}").trim().to_string();
        if name.is_empty() {
            "User".to_string()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub restaurant_id: Uuid,
    pub user_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
}

/// One page request against the restaurant directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub search: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl PageQuery {
    pub fn new(search: &str, page: usize, page_size: usize) -> Self {
        let search = search.trim();
        Self {
            search: (!search.is_empty()).then(|| search.to_string()),
            offset: page * page_size,
            limit: page_size,
        }
    }

    /// Case-insensitive substring match used by in-memory backends.
    pub fn matches(&self, name: &str) -> bool {
        match &self.search {
            Some(term) => name.to_lowercase().contains(&term.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_capabilities() {
        assert!(Role::Admin.satisfies(Role::Owner));
        assert!(Role::Owner.satisfies(Role::Owner));
        assert!(!Role::User.satisfies(Role::Owner));
        assert!(!Role::Owner.satisfies(Role::Admin));
        assert_eq!(Role::parse_role(Role::Owner.as_str()), Some(Role::Owner));
        assert_eq!(Role::parse_role("root"), None);
    }

    #[test]
    fn page_query_offsets_and_filter() {
        let q = PageQuery::new("  Pizza ", 2, 6);
        assert_eq!(q.offset, 12);
        assert_eq!(q.limit, 6);
        assert!(q.matches("Best PIZZA in town"));
        assert!(!q.matches("Sushi Bar"));
        assert_eq!(PageQuery::new("   ", 0, 6).search, None);
    }

    #[test]
    fn reviewer_name_falls_back_for_anonymous_reviews() {
        let mut review = Review {
            id: Uuid::nil(),
            restaurant_id: Uuid::nil(),
            rating: 4,
            comment: None,
            created_at: Utc::now(),
            reviewer_first_name: Some("Rita".into()),
            reviewer_last_name: None,
        };
        assert_eq!(review.reviewer_name(), "Rita");
        review.reviewer_first_name = None;
        assert_eq!(review.reviewer_name(), "User");
    }

    #[test]
    fn session_debug_hides_tokens() {
        let s = Session {
            access_token: "secret-token".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: None,
            user_id: Uuid::nil(),
            email: Some("a@b.c".into()),
        };
        let printed = format!("{s:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("a@b.c"));
    }
}
