//! `SmartApprove`: the default permission policy consulted before a tool
//! call is dispatched.

use super::tool::Annotations;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionDecision {
    AutoApprove,
    RequireApproval,
}

/// 1. read-only and not open-world -> auto-approve.
/// 2. destructive -> always require approval, regardless of the rest.
/// 3. otherwise -> require approval.
pub fn smart_approve(annotations: &Annotations) -> PermissionDecision {
    if annotations.destructive {
        return PermissionDecision::RequireApproval;
    }
    if annotations.read_only && !annotations.open_world {
        return PermissionDecision::AutoApprove;
    }
    PermissionDecision::RequireApproval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_closed_world_auto_approves() {
        let a = Annotations {
            read_only: true,
            open_world: false,
            ..Default::default()
        };
        assert_eq!(smart_approve(&a), PermissionDecision::AutoApprove);
    }

    #[test]
    fn destructive_always_requires_approval() {
        let a = Annotations {
            read_only: true,
            open_world: false,
            destructive: true,
            ..Default::default()
        };
        assert_eq!(smart_approve(&a), PermissionDecision::RequireApproval);
    }

    #[test]
    fn open_world_requires_approval_even_if_read_only() {
        let a = Annotations {
            read_only: true,
            open_world: true,
            ..Default::default()
        };
        assert_eq!(smart_approve(&a), PermissionDecision::RequireApproval);
    }

    #[test]
    fn default_requires_approval() {
        let a = Annotations::default();
        assert_eq!(smart_approve(&a), PermissionDecision::RequireApproval);
    }
}
