//! Isolation policy: whether a session gets its own worktree.

use tron_settings::IsolationMode;

/// Per-request isolation inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct IsolationOptions<'a> {
    /// Caller asked for a private worktree.
    pub force_isolation: bool,
    /// The session is a fork of this one.
    pub parent_session_id: Option<&'a str>,
}

/// Decide isolation for `session_id`.
///
/// First match wins:
/// 1. `never` shares, whatever the options say.
/// 2. `always` isolates.
/// 3. `lazy` isolates forced requests, forks, and any session that is not
///    the current owner of the main directory. An unowned main directory
///    goes to the first session that asks.
pub fn should_isolate(
    session_id: &str,
    mode: IsolationMode,
    main_owner: Option<&str>,
    options: &IsolationOptions<'_>,
) -> bool {
    match mode {
        IsolationMode::Never => false,
        IsolationMode::Always => true,
        IsolationMode::Lazy => {
            options.force_isolation
                || options.parent_session_id.is_some()
                || main_owner.is_some_and(|owner| owner != session_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FORK: IsolationOptions<'static> = IsolationOptions {
        force_isolation: false,
        parent_session_id: Some("parent"),
    };

    #[test]
    fn lazy_first_session_shares() {
        assert!(!should_isolate("s1", IsolationMode::Lazy, None, &IsolationOptions::default()));
    }

    #[test]
    fn lazy_owner_keeps_sharing() {
        assert!(!should_isolate(
            "s1",
            IsolationMode::Lazy,
            Some("s1"),
            &IsolationOptions::default()
        ));
    }

    #[test]
    fn lazy_second_session_isolates() {
        assert!(should_isolate(
            "s2",
            IsolationMode::Lazy,
            Some("s1"),
            &IsolationOptions::default()
        ));
    }

    #[test]
    fn lazy_forks_always_isolate() {
        assert!(should_isolate("child", IsolationMode::Lazy, None, &FORK));
    }

    #[test]
    fn lazy_force_isolates() {
        let opts = IsolationOptions {
            force_isolation: true,
            ..IsolationOptions::default()
        };
        assert!(should_isolate("s1", IsolationMode::Lazy, None, &opts));
    }

    fn arb_mode() -> impl Strategy<Value = IsolationMode> {
        prop_oneof![
            Just(IsolationMode::Never),
            Just(IsolationMode::Always),
            Just(IsolationMode::Lazy),
        ]
    }

    proptest! {
        #[test]
        fn never_overrides_everything(
            session in "[a-z]{1,8}",
            owner in proptest::option::of("[a-z]{1,8}"),
            force in any::<bool>(),
            parent in proptest::option::of("[a-z]{1,8}"),
        ) {
            let opts = IsolationOptions { force_isolation: force, parent_session_id: parent.as_deref() };
            prop_assert!(!should_isolate(&session, IsolationMode::Never, owner.as_deref(), &opts));
        }

        #[test]
        fn always_isolates_everything(
            session in "[a-z]{1,8}",
            owner in proptest::option::of("[a-z]{1,8}"),
            force in any::<bool>(),
            parent in proptest::option::of("[a-z]{1,8}"),
        ) {
            let opts = IsolationOptions { force_isolation: force, parent_session_id: parent.as_deref() };
            prop_assert!(should_isolate(&session, IsolationMode::Always, owner.as_deref(), &opts));
        }

        #[test]
        fn flags_never_reduce_isolation(
            mode in arb_mode(),
            session in "[a-z]{1,8}",
            owner in proptest::option::of("[a-z]{1,8}"),
        ) {
            let plain = should_isolate(&session, mode, owner.as_deref(), &IsolationOptions::default());
            let forced = should_isolate(
                &session,
                mode,
                owner.as_deref(),
                &IsolationOptions { force_isolation: true, parent_session_id: None },
            );
            prop_assert!(forced || !plain);
        }
    }
}
