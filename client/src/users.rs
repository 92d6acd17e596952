//! User administration over the `profiles` table. Every call first checks
//! that the signed-in user holds an admin role.

use gazette_shared::{Profile, ProfileUpdate};
use reqwest::{header::CONTENT_RANGE, Method};
use tracing::{info, warn};

use crate::error::{AdminError, BackendError};
use crate::rest::{read_json, RestClient, SINGLE_OBJECT};

pub const PROFILE_PAGE_SIZE: u32 = 20;

/// Roles allowed to list and edit other users.
pub const ADMIN_ROLES: &[&str] = &["admin"];

/// Role filter value that matches every role.
pub const ALL_ROLES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFilters {
    /// Matched case-insensitively against username and display name.
    pub search: Option<String>,
    pub role: Option<String>,
    /// Zero-based.
    pub page: u32,
    pub page_size: u32,
}

impl Default for ProfileFilters {
    fn default() -> Self {
        Self {
            search: None,
            role: None,
            page: 0,
            page_size: PROFILE_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePage {
    pub profiles: Vec<Profile>,
    /// Matching rows across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// PostgREST query pairs for one page of profiles, newest first.
pub fn profile_query(filters: &ProfileFilters) -> Vec<(&'static str, String)> {
    let mut query = vec![("select", "*".to_string())];

    let term: String = filters
        .search
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*'))
        .collect();
    let term = term.trim();
    if !term.is_empty() {
        query.push((
            "or",
            format!("(username.ilike.*{term}*,display_name.ilike.*{term}*)"),
        ));
    }

    if let Some(role) = filters
        .role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty() && *r != ALL_ROLES)
    {
        query.push(("role", format!("eq.{role}")));
    }

    let page_size = filters.page_size.max(1);
    query.push(("order", "created_at.desc".to_string()));
    query.push(("limit", page_size.to_string()));
    query.push(("offset", (u64::from(filters.page) * u64::from(page_size)).to_string()));
    query
}

/// Total from a `Content-Range` header such as `0-19/57` or `*/0`.
pub fn parse_total(content_range: &str) -> Option<u64> {
    content_range
        .split('/')
        .nth(1)
        .and_then(|total| total.trim().parse().ok())
}

pub fn check_admin(profile: &Profile) -> Result<(), AdminError> {
    if profile.has_role(ADMIN_ROLES) {
        Ok(())
    } else {
        Err(AdminError::Forbidden)
    }
}

impl RestClient {
    async fn require_admin(&self) -> Result<Profile, AdminError> {
        let user_id = self.session_store().user_id().ok_or(AdminError::SignInRequired)?;
        let profile = self.fetch_profile(&user_id).await?;
        check_admin(&profile).map_err(|e| {
            warn!(user_id = %user_id, role = %profile.role, "User administration denied");
            e
        })?;
        Ok(profile)
    }

    /// One page of profiles matching `filters`, with the total match count.
    pub async fn list_profiles(&self, filters: &ProfileFilters) -> Result<ProfilePage, AdminError> {
        self.require_admin().await?;
        info!(search = ?filters.search, role = ?filters.role, page = filters.page, "Loading users");

        let resp = self
            .request(Method::GET, format!("{}/profiles", self.config().rest_url()))
            .query(&profile_query(filters))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(BackendError::from)?;

        let total = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_total);
        let profiles: Vec<Profile> = read_json(resp).await?;
        info!(count = profiles.len(), ?total, "Users loaded successfully");

        Ok(ProfilePage {
            total: total.unwrap_or(profiles.len() as u64),
            profiles,
            page: filters.page,
            page_size: filters.page_size.max(1),
        })
    }

    /// Writes the set fields of `update` to `user_id`'s profile and returns
    /// the stored row.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<Profile, AdminError> {
        let update = update.without_blanks();
        if update.is_empty() {
            return Err(AdminError::EmptyUpdate);
        }
        self.require_admin().await?;
        info!(user_id, role = ?update.role, "Updating user");

        let resp = self
            .request(Method::PATCH, format!("{}/profiles", self.config().rest_url()))
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(&update)
            .send()
            .await
            .map_err(BackendError::from)?;
        Ok(read_json(resp).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn value<'a>(query: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn default_query_pages_by_twenty() {
        let query = profile_query(&ProfileFilters::default());
        assert_eq!(
            query,
            vec![
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", "20".to_string()),
                ("offset", "0".to_string()),
            ]
        );
    }

    #[test]
    fn search_and_role_become_filters() {
        let query = profile_query(&ProfileFilters {
            search: Some(" ada ".into()),
            role: Some("editor".into()),
            page: 2,
            ..ProfileFilters::default()
        });

        assert_eq!(
            value(&query, "or"),
            Some("(username.ilike.*ada*,display_name.ilike.*ada*)")
        );
        assert_eq!(value(&query, "role"), Some("eq.editor"));
        assert_eq!(value(&query, "offset"), Some("40"));
    }

    #[test]
    fn all_roles_and_blank_search_add_nothing() {
        let query = profile_query(&ProfileFilters {
            search: Some("   ".into()),
            role: Some(ALL_ROLES.into()),
            ..ProfileFilters::default()
        });
        assert_eq!(value(&query, "or"), None);
        assert_eq!(value(&query, "role"), None);
    }

    #[test]
    fn search_cannot_break_out_of_the_or_group() {
        let query = profile_query(&ProfileFilters {
            search: Some("a),role.eq.admin,(b*".into()),
            ..ProfileFilters::default()
        });
        assert_eq!(
            value(&query, "or"),
            Some("(username.ilike.*arole.eq.adminb*,display_name.ilike.*arole.eq.adminb*)")
        );
    }

    #[test]
    fn reads_total_from_content_range() {
        assert_eq!(parse_total("0-19/57"), Some(57));
        assert_eq!(parse_total("*/0"), Some(0));
        assert_eq!(parse_total("0-19/*"), None);
        assert_eq!(parse_total("garbage"), None);
    }

    #[test]
    fn only_admins_pass_the_gate() {
        let mut profile = Profile {
            id: "u1".into(),
            username: "ada".into(),
            display_name: None,
            email: None,
            role: "editor".into(),
            bio: None,
            avatar_url: None,
            created_at: None,
        };
        assert!(matches!(check_admin(&profile), Err(AdminError::Forbidden)));

        profile.role = "admin".into();
        assert!(check_admin(&profile).is_ok());
    }

    #[tokio::test]
    async fn signed_out_and_empty_updates_fail_before_any_request() {
        let client = RestClient::new(crate::config::ClientConfig::default());

        let err = client.list_profiles(&ProfileFilters::default()).await.unwrap_err();
        assert!(matches!(err, AdminError::SignInRequired), "{err:?}");

        let err = client
            .update_profile("u2", ProfileUpdate { bio: Some(" ".into()), ..ProfileUpdate::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::EmptyUpdate), "{err:?}");
    }
}
