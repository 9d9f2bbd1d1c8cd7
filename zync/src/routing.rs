//! Protected-route decision for the navigation layer.

/// Where the navigation layer should send the user
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Login / registration screens
    Auth,
    /// Main tabbed area
    Tabs,
}

/// Redirect required for the current session, if any
///
/// No decision is made while the session is still restoring.
#[must_use]
pub const fn protected_redirect(is_loading: bool, is_authenticated: bool, in_auth_group: bool) -> Option<Route> {
    if is_loading {
        return None;
    }
    match (is_authenticated, in_auth_group) {
        (false, false) => Some(Route::Auth),
        (true, true) => Some(Route::Tabs),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_defers_the_decision() {
        assert_eq!(protected_redirect(true, false, false), None);
        assert_eq!(protected_redirect(true, true, true), None);
    }

    #[test]
    fn guests_go_to_auth_and_members_leave_it() {
        assert_eq!(protected_redirect(false, false, false), Some(Route::Auth));
        assert_eq!(protected_redirect(false, false, true), None);
        assert_eq!(protected_redirect(false, true, true), Some(Route::Tabs));
        assert_eq!(protected_redirect(false, true, false), None);
    }
}
