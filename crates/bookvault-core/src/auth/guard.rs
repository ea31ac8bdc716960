//! Route access decisions.
//!
//! These checks are for navigation only. The server enforces roles on every
//! request regardless of what the client decides here.

use super::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Anonymous entry point.
    Login,
    Dashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Dashboard => "/dashboard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Authenticated,
    Administrator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Startup has not resolved the session yet.
    Pending,
    Granted,
    Redirect(Route),
}

impl Access {
    pub fn evaluate(state: &SessionState, requirement: Requirement) -> Self {
        if requirement == Requirement::Public {
            return Access::Granted;
        }
        if state.loading {
            return Access::Pending;
        }
        match (&state.user, requirement) {
            (None, _) => Access::Redirect(Route::Login),
            (Some(user), Requirement::Administrator) if !user.is_admin() => {
                Access::Redirect(Route::Dashboard)
            }
            (Some(_), _) => Access::Granted,
        }
    }
}
