/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`. A token grants permissions
 * directly through its `permissions` claim and indirectly through the
 * default grants of each role in its `roles` claim.
 */

/// Common permission string constants for compile-time safety
pub mod consts {
    // Locations
    pub const LOCATIONS_READ: &str = "locations:read";
    pub const LOCATIONS_WRITE: &str = "locations:write";

    // Suppliers
    pub const SUPPLIERS_READ: &str = "suppliers:read";
    pub const SUPPLIERS_WRITE: &str = "suppliers:write";

    // Items
    pub const ITEMS_READ: &str = "items:read";
    pub const ITEMS_WRITE: &str = "items:write";
    pub const ITEMS_ADJUST: &str = "items:adjust";

    // Transactions
    pub const TRANSACTIONS_READ: &str = "transactions:read";
    pub const TRANSACTIONS_CREATE: &str = "transactions:create";
    pub const TRANSACTIONS_APPROVE: &str = "transactions:approve";
    pub const TRANSACTIONS_PROCESS: &str = "transactions:process";
}

/// Role names understood by [`role_permissions`].
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const MANAGER: &str = "manager";
    pub const CLERK: &str = "clerk";
    pub const VIEWER: &str = "viewer";
}

use consts::*;

/// Every permission checked by the API.
pub const ALL_PERMISSIONS: &[&str] = &[
    LOCATIONS_READ,
    LOCATIONS_WRITE,
    SUPPLIERS_READ,
    SUPPLIERS_WRITE,
    ITEMS_READ,
    ITEMS_WRITE,
    ITEMS_ADJUST,
    TRANSACTIONS_READ,
    TRANSACTIONS_CREATE,
    TRANSACTIONS_APPROVE,
    TRANSACTIONS_PROCESS,
];

const VIEWER_PERMISSIONS: &[&str] = &[
    LOCATIONS_READ,
    SUPPLIERS_READ,
    ITEMS_READ,
    TRANSACTIONS_READ,
];

// Floor staff: scan, record movements, nothing administrative.
const CLERK_PERMISSIONS: &[&str] = &[
    LOCATIONS_READ,
    SUPPLIERS_READ,
    ITEMS_READ,
    TRANSACTIONS_READ,
    TRANSACTIONS_CREATE,
    TRANSACTIONS_PROCESS,
];

/// Default grants for a role. Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> &'static [&'static str] {
    match role {
        roles::ADMIN | roles::MANAGER => ALL_PERMISSIONS,
        roles::CLERK => CLERK_PERMISSIONS,
        roles::VIEWER => VIEWER_PERMISSIONS,
        _ => &[],
    }
}

/// Format a permission string
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

/// Check if a permission is implied by another permission
///
/// Supports exact matches, `resource:*` and the global `*`.
pub fn is_permission_implied(user_perm: &str, required_perm: &str) -> bool {
    if user_perm == required_perm || user_perm == "*" {
        return true;
    }

    match (user_perm.split_once(':'), required_perm.split_once(':')) {
        (Some((user_resource, "*")), Some((required_resource, _))) => {
            user_resource == required_resource
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_imply_resource_actions() {
        assert!(is_permission_implied("items:read", ITEMS_READ));
        assert!(is_permission_implied("items:*", ITEMS_ADJUST));
        assert!(is_permission_implied("*", TRANSACTIONS_APPROVE));
        assert!(!is_permission_implied("items:*", LOCATIONS_READ));
        assert!(!is_permission_implied("items:read", ITEMS_WRITE));
    }

    #[test]
    fn clerks_cannot_approve() {
        let grants = role_permissions(roles::CLERK);
        assert!(grants.contains(&TRANSACTIONS_CREATE));
        assert!(grants.contains(&TRANSACTIONS_PROCESS));
        assert!(!grants.contains(&TRANSACTIONS_APPROVE));
        assert!(!grants.contains(&ITEMS_ADJUST));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(role_permissions("intern").is_empty());
        assert_eq!(format_permission("items", "read"), ITEMS_READ);
    }
}
