//! Role clearance ordering.
//!
//! Two fixed total orders gate every privileged endpoint:
//! - account roles: `regular < cashier < manager < superuser`
//! - event clearance: `regular < organizer < manager < superuser`, where
//!   organizer is granted per event.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Account role stored on every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Regular,
    Cashier,
    Manager,
    Superuser,
}

impl Role {
    /// Check if this role has at least the specified clearance.
    pub fn has_at_least(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Ordinal rank; higher value = more privileges.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Regular => 0,
            Role::Cashier => 1,
            Role::Manager => 2,
            Role::Superuser => 3,
        }
    }

    /// Whether a caller with this role may assign `target` to another user.
    ///
    /// Managers may hand out regular and cashier; superusers may assign any role.
    pub fn can_assign(&self, target: Role) -> bool {
        match self {
            Role::Superuser => true,
            Role::Manager => matches!(target, Role::Regular | Role::Cashier),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Cashier => "cashier",
            Role::Manager => "manager",
            Role::Superuser => "superuser",
        }
    }

    pub fn all() -> &'static [Role] {
        &[Role::Regular, Role::Cashier, Role::Manager, Role::Superuser]
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(Role::Regular),
            "cashier" => Ok(Role::Cashier),
            "manager" => Ok(Role::Manager),
            "superuser" => Ok(Role::Superuser),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clearance of a caller with respect to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventClearance {
    Regular,
    Organizer,
    Manager,
    Superuser,
}

impl EventClearance {
    /// Derives event clearance from the account role and organizer membership.
    ///
    /// Cashiers have no special standing on events.
    pub fn for_user(role: Role, is_organizer: bool) -> Self {
        match role {
            Role::Superuser => EventClearance::Superuser,
            Role::Manager => EventClearance::Manager,
            _ if is_organizer => EventClearance::Organizer,
            _ => EventClearance::Regular,
        }
    }

    pub fn has_at_least(&self, required: EventClearance) -> bool {
        *self >= required
    }

    pub fn is_manager(&self) -> bool {
        self.has_at_least(EventClearance::Manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Superuser.has_at_least(Role::Manager));
        assert!(Role::Manager.has_at_least(Role::Cashier));
        assert!(Role::Cashier.has_at_least(Role::Regular));
        assert!(Role::Cashier.has_at_least(Role::Cashier));
        assert!(!Role::Regular.has_at_least(Role::Cashier));
        assert!(!Role::Cashier.has_at_least(Role::Manager));
        assert!(!Role::Manager.has_at_least(Role::Superuser));
    }

    #[test]
    fn test_rank_matches_ord() {
        for a in Role::all() {
            for b in Role::all() {
                assert_eq!(a.rank() >= b.rank(), a >= b);
            }
        }
    }

    #[test]
    fn test_can_assign() {
        assert!(Role::Manager.can_assign(Role::Cashier));
        assert!(Role::Manager.can_assign(Role::Regular));
        assert!(!Role::Manager.can_assign(Role::Manager));
        assert!(!Role::Manager.can_assign(Role::Superuser));
        assert!(Role::Superuser.can_assign(Role::Superuser));
        assert!(!Role::Cashier.can_assign(Role::Regular));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("cashier").unwrap(), Role::Cashier);
        assert_eq!(Role::from_str("MANAGER").unwrap(), Role::Manager);
        assert!(Role::from_str("organizer").is_err());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Superuser).unwrap(), "\"superuser\"");
        let role: Role = serde_json::from_str("\"regular\"").unwrap();
        assert_eq!(role, Role::Regular);
    }

    #[test]
    fn test_event_clearance_for_user() {
        assert_eq!(
            EventClearance::for_user(Role::Regular, true),
            EventClearance::Organizer
        );
        assert_eq!(
            EventClearance::for_user(Role::Cashier, false),
            EventClearance::Regular
        );
        assert_eq!(
            EventClearance::for_user(Role::Manager, false),
            EventClearance::Manager
        );
        assert_eq!(
            EventClearance::for_user(Role::Superuser, true),
            EventClearance::Superuser
        );
    }

    #[test]
    fn test_event_clearance_ordering() {
        assert!(EventClearance::Manager.has_at_least(EventClearance::Organizer));
        assert!(!EventClearance::Organizer.has_at_least(EventClearance::Manager));
        assert!(EventClearance::Superuser.is_manager());
        assert!(!EventClearance::Organizer.is_manager());
    }
}
