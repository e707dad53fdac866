//! Identity records persisted by the User Registry.
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use kportal_errors::InvalidRole;

/// Maximum length of registry object names.
const OBJECT_NAME_MAX_LEN: usize = 253;

/// Application role of an identity: the portal's own coarse privilege level.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Newly registered identity not yet validated by an administrator.
    #[default]
    Guest,

    /// Validated identity allowed to use the cluster.
    User,

    /// Portal administrator.
    Admin,
}

impl Role {
    /// All roles, from least to most privileged.
    pub const ALL: [Role; 3] = [Role::Guest, Role::User, Role::Admin];

    /// String representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Identities with this role are members of the cluster.
    pub fn is_member(&self) -> bool {
        !matches!(self, Role::Guest)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "guest" => Ok(Role::Guest),
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(InvalidRole::new(value, "parse an application role")),
        }
    }
}

/// Record of an identity known to the portal.
///
/// Records are created as [`Role::Guest`] the first time an identity logs in.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable `issuer#subject` identifier of the identity.
    pub id: String,

    /// Opaque material needed to act as the identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    pub display_name: String,
    pub email: String,

    /// Name of the identity provider the identity authenticated with.
    pub identity_provider: String,

    /// Declared application role, projected onto cluster bindings.
    #[serde(default)]
    pub role: Role,

    /// Version of the stored record, for optimistic concurrency.
    ///
    /// Updates of records with a version fail if the stored record has changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Identity {
    /// Initialise a new guest identity record.
    pub fn new<S1, S2, S3>(id: S1, email: S2, display_name: S3) -> Identity
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Identity {
            id: id.into(),
            credentials: None,
            display_name: display_name.into(),
            email: email.into(),
            identity_provider: String::new(),
            role: Role::Guest,
            version: None,
        }
    }

    /// Name of the registry object storing this identity.
    pub fn object_name(&self) -> String {
        object_name(&self.id)
    }

    /// Change the application role of the identity.
    pub fn with_role(mut self, role: Role) -> Identity {
        self.role = role;
        self
    }
}

/// Encode an identity ID into a name valid for registry objects.
///
/// Names are lower-cased with all non-alphanumeric characters replaced by `-`,
/// have no leading or trailing `-` and are truncated to the maximum name length.
pub fn object_name(id: &str) -> String {
    let name: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let name = name.trim_matches('-');
    let name: String = name.chars().take(OBJECT_NAME_MAX_LEN).collect();
    name.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::Identity;
    use super::Role;

    #[test]
    fn object_name_encoding() {
        let identity = Identity::new(
            "https://cilogon.org#http://cilogon.org/serverA/users/123",
            "alice@example.edu",
            "Alice",
        );
        assert_eq!(
            identity.object_name(),
            "https---cilogon-org-http---cilogon-org-servera-users-123",
        );
    }

    #[test]
    fn object_name_truncated() {
        let id = format!("iss#{}", "a".repeat(300));
        let name = super::object_name(&id);
        assert_eq!(name.len(), 253);
        assert!(name.starts_with("iss-aaa"));
    }

    #[test]
    fn role_defaults_to_guest() {
        let identity: Identity = serde_json::from_value(serde_json::json!({
            "id": "iss#alice",
            "display_name": "Alice",
            "email": "alice@example.com",
            "identity_provider": "example",
        }))
        .unwrap();
        assert_eq!(identity.role, Role::Guest);
        assert_eq!(identity.version, None);
    }

    #[test]
    fn role_from_str() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_membership() {
        assert!(!Role::Guest.is_member());
        assert!(Role::User.is_member());
        assert!(Role::Admin.is_member());
    }
}
