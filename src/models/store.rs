//! Store (tenant) and template models.

use serde::{Deserialize, Serialize};

/// One tenant's storefront, addressed by its subdomain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub subdomain: String,
    pub name: String,
    pub theme_id: String,
    pub created_at: String,
}

/// Request body for provisioning a store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreRequest {
    pub subdomain: String,
    pub name: String,
    pub theme_id: String,
}

/// A store's page template for one template type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub store_id: String,
    pub template_type: String,
    pub is_default: bool,
    pub enabled: bool,
    /// Set when the user removed the last section; cleared when one is added.
    pub has_empty_sections: bool,
    /// When the theme baseline was materialized as rows, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Subdomains are DNS labels: lowercase letters, digits and inner hyphens.
pub fn is_valid_subdomain(subdomain: &str) -> bool {
    !subdomain.is_empty()
        && subdomain.len() <= 63
        && !subdomain.starts_with('-')
        && !subdomain.ends_with('-')
        && subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
