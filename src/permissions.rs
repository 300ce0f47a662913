//! Role-based permission predicates
//!
//! Pure functions over roles and ids; the services call them before any
//! write. Roles are totally ordered: user < editor < sub_admin < admin.

use crate::models::{User, UserRole};

/// The acting or target account, reduced to what permission checks need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub role: UserRole,
}

impl Principal {
    pub fn new(id: i64, role: UserRole) -> Self {
        Self { id, role }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

/// Dashboard (draft listings, editor tools): editor and above
pub fn can_access_dashboard(role: UserRole) -> bool {
    role >= UserRole::Editor
}

/// Writing posts and gallery items: editor and above
pub fn can_create_content(role: UserRole) -> bool {
    role >= UserRole::Editor
}

/// Whether `actor` may edit or delete content owned by `owner_id`.
///
/// A missing owner (deleted account) counts as role `user`.
pub fn can_modify_content(
    actor: Principal,
    owner_id: Option<i64>,
    owner_role: Option<UserRole>,
) -> bool {
    if actor.role == UserRole::Admin {
        return true;
    }
    if owner_id == Some(actor.id) && actor.role >= UserRole::Editor {
        return true;
    }
    let owner_role = owner_role.unwrap_or(UserRole::User);
    actor.role == UserRole::SubAdmin && owner_role < UserRole::SubAdmin
}

/// Banners and references: sub-admin and above
pub fn can_manage_site(role: UserRole) -> bool {
    role >= UserRole::SubAdmin
}

/// Listing and administering accounts: sub-admin and above
pub fn can_manage_users(role: UserRole) -> bool {
    role >= UserRole::SubAdmin
}

/// Whether `actor` administers `target`: admins everyone, sub-admins only
/// accounts ranking strictly below them
pub fn can_manage_user(actor: Principal, target: Principal) -> bool {
    match actor.role {
        UserRole::Admin => true,
        UserRole::SubAdmin => target.role < UserRole::SubAdmin,
        _ => false,
    }
}

/// Whether `actor` may edit `target`'s profile fields
pub fn can_modify_user(actor: Principal, target: Principal) -> bool {
    actor.id == target.id || can_manage_user(actor, target)
}

/// Whether a role may hand out `new_role`
pub fn can_assign_role(actor_role: UserRole, new_role: UserRole) -> bool {
    match actor_role {
        UserRole::Admin => true,
        UserRole::SubAdmin => new_role < UserRole::SubAdmin,
        _ => false,
    }
}

/// Whether `actor` may move `target` to `new_role`.
///
/// Nobody but an admin changes their own role.
pub fn can_change_role(actor: Principal, target: Principal, new_role: UserRole) -> bool {
    if actor.id == target.id && actor.role != UserRole::Admin {
        return false;
    }
    can_manage_user(actor, target) && can_assign_role(actor.role, new_role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::models::UserRole::{Admin, Editor, SubAdmin, User};

    fn p(id: i64, role: UserRole) -> Principal {
        Principal::new(id, role)
    }

    #[test]
    fn test_dashboard_and_content_creation() {
        assert!(!can_access_dashboard(User));
        assert!(can_access_dashboard(Editor));
        assert!(can_access_dashboard(Admin));
        assert!(!can_create_content(User));
        assert!(can_create_content(SubAdmin));
    }

    #[test]
    fn test_modify_content_table() {
        // (actor role, actor is owner, owner role, expected)
        let cases = [
            (Admin, false, Admin, true),
            (Admin, false, SubAdmin, true),
            (SubAdmin, false, Editor, true),
            (SubAdmin, false, User, true),
            (SubAdmin, false, SubAdmin, false),
            (SubAdmin, false, Admin, false),
            (SubAdmin, true, SubAdmin, true),
            (Editor, true, Editor, true),
            (Editor, false, Editor, false),
            (Editor, false, User, false),
            (User, true, User, false),
            (User, false, User, false),
        ];
        for (actor_role, is_owner, owner_role, expected) in cases {
            let actor = p(1, actor_role);
            let owner_id = if is_owner { 1 } else { 2 };
            assert_eq!(
                can_modify_content(actor, Some(owner_id), Some(owner_role)),
                expected,
                "{} (owner: {}) on content of {}",
                actor_role,
                is_owner,
                owner_role
            );
        }
    }

    #[test]
    fn test_demoted_owner_loses_access() {
        let demoted = p(7, User);
        assert!(!can_modify_content(demoted, Some(7), Some(User)));
    }

    #[test]
    fn test_missing_owner_counts_as_user() {
        assert!(can_modify_content(p(1, SubAdmin), None, None));
        assert!(!can_modify_content(p(1, Editor), None, None));
    }

    #[test]
    fn test_site_and_user_management() {
        assert!(!can_manage_site(Editor));
        assert!(can_manage_site(SubAdmin));
        assert!(!can_manage_users(Editor));
        assert!(can_manage_users(Admin));
    }

    #[test]
    fn test_modify_user() {
        assert!(can_modify_user(p(1, User), p(1, User)));
        assert!(!can_modify_user(p(1, Editor), p(2, User)));
        assert!(can_modify_user(p(1, SubAdmin), p(2, Editor)));
        assert!(!can_modify_user(p(1, SubAdmin), p(2, SubAdmin)));
        assert!(!can_modify_user(p(1, SubAdmin), p(2, Admin)));
        assert!(can_modify_user(p(1, Admin), p(2, Admin)));
    }

    #[test]
    fn test_assign_role() {
        assert!(can_assign_role(Admin, Admin));
        assert!(can_assign_role(SubAdmin, Editor));
        assert!(!can_assign_role(SubAdmin, SubAdmin));
        assert!(!can_assign_role(Editor, User));
    }

    #[test]
    fn test_change_role() {
        assert!(can_change_role(p(1, SubAdmin), p(2, User), Editor));
        assert!(!can_change_role(p(1, SubAdmin), p(2, User), SubAdmin));
        assert!(!can_change_role(p(1, SubAdmin), p(1, SubAdmin), User));
        assert!(!can_change_role(p(1, Editor), p(1, Editor), Admin));
        assert!(can_change_role(p(1, Admin), p(1, Admin), Editor));
    }

    fn role() -> impl Strategy<Value = UserRole> {
        prop::sample::select(UserRole::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn non_admins_never_touch_higher_ranked_content(
            actor_role in role(),
            owner_role in role(),
        ) {
            prop_assume!(actor_role != Admin && owner_role > actor_role);
            prop_assert!(!can_modify_content(p(1, actor_role), Some(2), Some(owner_role)));
        }

        #[test]
        fn admin_can_modify_everything(owner_role in role(), owner_id in any::<Option<i64>>()) {
            prop_assert!(can_modify_content(p(1, Admin), owner_id, Some(owner_role)));
        }

        #[test]
        fn sub_admin_never_manages_peers_or_above(target_role in role(), target_id in 2i64..100) {
            let allowed = can_manage_user(p(1, SubAdmin), p(target_id, target_role));
            prop_assert_eq!(allowed, target_role < SubAdmin);
        }

        #[test]
        fn assignable_roles_rank_below_actor_unless_admin(actor_role in role(), new_role in role()) {
            if can_assign_role(actor_role, new_role) && actor_role != Admin {
                prop_assert!(new_role < actor_role);
            }
        }
    }
}
