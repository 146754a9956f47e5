//! Feature flag values and tenant-scoped resolution.

use serde::{Deserialize, Serialize};

/// A named boolean switch, global when `tenant_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Value of `name` as seen by `tenant`.
///
/// A flag scoped to the tenant wins over the global flag of the same name.
/// Returns `None` when neither exists.
pub fn effective(flags: &[FeatureFlag], name: &str, tenant: Option<&str>) -> Option<bool> {
    if let Some(tenant) = tenant
        && let Some(scoped) = flags
            .iter()
            .find(|flag| flag.name == name && flag.tenant_id.as_deref() == Some(tenant))
    {
        return Some(scoped.enabled);
    }
    flags
        .iter()
        .find(|flag| flag.name == name && flag.tenant_id.is_none())
        .map(|flag| flag.enabled)
}
