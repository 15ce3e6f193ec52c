//! Effective activation setting
//!
//! A per-item override beats the global default. Updates of a plugin that
//! was already active never call the activation primitive: the plugin was
//! never deactivated, so it is reported as active as-is.

use crate::domain::plugin::PluginAction;

/// What activation reconciliation will do for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPlan {
    /// Update of an active plugin; report active without calling activate
    AlreadyActive,
    /// Call the activation primitive after a successful install or update
    Activate,
    /// Leave the plugin inactive
    Skip,
}

impl ActivationPlan {
    /// Resolve the plan for one item
    ///
    /// `already_active` is only meaningful for updates and must be sampled
    /// once, before any destructive action.
    pub fn resolve(
        override_flag: Option<bool>,
        global_default: bool,
        action: PluginAction,
        already_active: bool,
    ) -> Self {
        if action == PluginAction::Update && already_active {
            return Self::AlreadyActive;
        }

        if effective_activation(override_flag, global_default) {
            Self::Activate
        } else {
            Self::Skip
        }
    }

    /// The `activated` flag reported when nothing goes wrong
    pub fn expected_activated(&self) -> bool {
        matches!(self, Self::AlreadyActive | Self::Activate)
    }
}

/// Override-then-default activation decision
pub fn effective_activation(override_flag: Option<bool>, global_default: bool) -> bool {
    override_flag.unwrap_or(global_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_beats_default() {
        assert!(effective_activation(Some(true), false));
        assert!(!effective_activation(Some(false), true));
        assert!(effective_activation(None, true));
        assert!(!effective_activation(None, false));
    }

    #[test]
    fn test_already_active_update_ignores_settings() {
        for override_flag in [None, Some(true), Some(false)] {
            for default in [true, false] {
                let plan = ActivationPlan::resolve(override_flag, default, PluginAction::Update, true);
                assert_eq!(plan, ActivationPlan::AlreadyActive);
                assert!(plan.expected_activated());
            }
        }
    }

    #[test]
    fn test_already_active_flag_ignored_for_installs() {
        let plan = ActivationPlan::resolve(Some(false), true, PluginAction::Install, true);
        assert_eq!(plan, ActivationPlan::Skip);
    }

    #[test]
    fn test_inactive_update_follows_settings() {
        assert_eq!(
            ActivationPlan::resolve(None, true, PluginAction::Update, false),
            ActivationPlan::Activate
        );
        assert_eq!(
            ActivationPlan::resolve(Some(false), true, PluginAction::Update, false),
            ActivationPlan::Skip
        );
    }
}
