use serde::{Deserialize, Serialize};

/// Role claim granted to every registered reader.
pub const ROLE_USER: &str = "ROLE_USER";

/// Role claim required for catalog administration.
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Standard,
    Administrator,
}

impl Role {
    /// Derive the role from role-claim membership.
    pub fn from_claims<S: AsRef<str>>(roles: &[S]) -> Self {
        if roles.iter().any(|r| r.as_ref() == ROLE_ADMIN) {
            Role::Administrator
        } else {
            Role::Standard
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Standard => "Reader",
            Role::Administrator => "Administrator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Snapshot of the signed-in user, persisted next to the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(rename = "username")]
    pub display_name: String,
    pub roles: Vec<String>,
}

impl SessionUser {
    pub fn new(display_name: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            display_name: display_name.into(),
            roles,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_claims(&self.roles)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Administrator
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Anonymous,
    Authenticated,
}

/// Observable session state. `loading` stays true until startup resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub loading: bool,
}

impl SessionState {
    pub fn uninitialized() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            loading: false,
        }
    }

    pub fn authenticated(user: SessionUser) -> Self {
        Self {
            user: Some(user),
            loading: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.loading, &self.user) {
            (true, _) => SessionPhase::Uninitialized,
            (false, None) => SessionPhase::Anonymous,
            (false, Some(_)) => SessionPhase::Authenticated,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(|u| u.is_admin()).unwrap_or(false)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::uninitialized()
    }
}
