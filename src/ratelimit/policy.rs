//! Limit policy resolution.
//!
//! Maps (role, endpoint) pairs to the windows enforced for them, and carries
//! the fixed IP policy backing the global and sensitive-endpoint gates. All
//! limit values come from configuration; the resolver itself is a pure
//! lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::window::WindowLimit;

/// Standard window names used by the policy tables.
pub const PER_MINUTE: &str = "per_minute";
pub const PER_15MIN: &str = "per_15min";
pub const PER_HOUR: &str = "per_hour";
pub const PER_DAY: &str = "per_day";

/// Principal role, as asserted by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
    Intern,
}

impl Role {
    /// Tier applied when a role has no entry in the policy table.
    pub const FALLBACK: Role = Role::Intern;

    /// Map a role claim to a tier. Claims this deployment does not recognize
    /// land on the lowest tier.
    pub fn from_claim(claim: &str) -> Role {
        match claim {
            "admin" => Role::Admin,
            "employee" => Role::Employee,
            _ => Role::FALLBACK,
        }
    }

    /// The claim string for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Intern => "intern",
        }
    }
}

/// Per-endpoint ceilings for one role. Absent fields are not enforced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointLimits {
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

impl EndpointLimits {
    /// Expand to ordered window limits, finest window first. The order is
    /// significant: the first violated window is the one reported.
    pub fn windows(&self) -> Vec<WindowLimit> {
        let mut windows = Vec::new();
        if let Some(limit) = self.per_minute {
            windows.push(WindowLimit::new(PER_MINUTE, limit, Duration::from_secs(60)));
        }
        if let Some(limit) = self.per_hour {
            windows.push(WindowLimit::new(PER_HOUR, limit, Duration::from_secs(3600)));
        }
        if let Some(limit) = self.per_day {
            windows.push(WindowLimit::new(PER_DAY, limit, Duration::from_secs(86400)));
        }
        windows
    }
}

/// Role -> endpoint -> limits table for the role-aware gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePolicies {
    roles: HashMap<Role, HashMap<String, EndpointLimits>>,
}

impl RolePolicies {
    /// Build a policy table from explicit entries.
    pub fn new(roles: HashMap<Role, HashMap<String, EndpointLimits>>) -> Self {
        Self { roles }
    }

    /// Windows to enforce for `role` on `endpoint`.
    ///
    /// A role missing from the table resolves through the fallback tier. A
    /// (role, endpoint) pair with no configured limits yields `None`, and the
    /// caller waves the request through unthrottled.
    pub fn resolve(&self, role: Role, endpoint: &str) -> Option<Vec<WindowLimit>> {
        let tier = self
            .roles
            .get(&role)
            .or_else(|| self.roles.get(&Role::FALLBACK))?;
        let windows = tier.get(endpoint)?.windows();
        if windows.is_empty() { None } else { Some(windows) }
    }

    /// Iterate all configured (role, endpoint, limits) entries.
    pub fn entries(&self) -> impl Iterator<Item = (Role, &str, &EndpointLimits)> {
        self.roles.iter().flat_map(|(role, endpoints)| {
            endpoints
                .iter()
                .map(move |(endpoint, limits)| (*role, endpoint.as_str(), limits))
        })
    }
}

impl Default for RolePolicies {
    /// Built-in role table: admins get the highest chat and upload ceilings,
    /// interns the lowest.
    fn default() -> Self {
        let mut roles = HashMap::new();

        let mut admin = HashMap::new();
        admin.insert(
            "chat".to_string(),
            EndpointLimits {
                per_minute: Some(20),
                per_hour: Some(100),
                per_day: None,
            },
        );
        admin.insert(
            "upload".to_string(),
            EndpointLimits {
                per_minute: None,
                per_hour: Some(5),
                per_day: Some(20),
            },
        );
        roles.insert(Role::Admin, admin);

        let mut employee = HashMap::new();
        employee.insert(
            "chat".to_string(),
            EndpointLimits {
                per_minute: Some(10),
                per_hour: Some(50),
                per_day: None,
            },
        );
        roles.insert(Role::Employee, employee);

        let mut intern = HashMap::new();
        intern.insert(
            "chat".to_string(),
            EndpointLimits {
                per_minute: Some(5),
                per_hour: Some(30),
                per_day: None,
            },
        );
        roles.insert(Role::Intern, intern);

        Self { roles }
    }
}

/// Fixed IP-scoped ceilings for the global and sensitive-endpoint gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPolicy {
    /// Login attempts allowed per IP in any trailing 15 minutes
    #[serde(default = "default_login_per_15min")]
    pub login_per_15min: u32,

    /// Login attempts allowed per IP in any trailing hour
    #[serde(default = "default_login_per_hour")]
    pub login_per_hour: u32,

    /// Requests allowed per IP in any trailing hour, across all endpoints
    #[serde(default = "default_global_per_hour")]
    pub global_per_hour: u32,
}

impl Default for IpPolicy {
    fn default() -> Self {
        Self {
            login_per_15min: default_login_per_15min(),
            login_per_hour: default_login_per_hour(),
            global_per_hour: default_global_per_hour(),
        }
    }
}

fn default_login_per_15min() -> u32 {
    5
}

fn default_login_per_hour() -> u32 {
    10
}

fn default_global_per_hour() -> u32 {
    1000
}

impl IpPolicy {
    /// Two-window policy applied per IP to the login endpoint, short window
    /// first so bursts are reported against it.
    pub fn login_windows(&self) -> [WindowLimit; 2] {
        [
            WindowLimit::new(PER_15MIN, self.login_per_15min, Duration::from_secs(900)),
            WindowLimit::new(PER_HOUR, self.login_per_hour, Duration::from_secs(3600)),
        ]
    }

    /// Single hourly window enforced per IP on every request.
    pub fn global_window(&self) -> WindowLimit {
        WindowLimit::new(PER_HOUR, self.global_per_hour, Duration::from_secs(3600))
    }
}
