//! Who may talk to whom.
//!
//! Conversations always pair one admin with one non-admin. This is a client
//! side guard for the UI; the backend stays the authority.

use companion_shared::types::{Chat, Identity, UserId};

use crate::directory::DirectoryCache;

/// True iff exactly one of `me` and `other_id` is an admin. Unknown users are never eligible.
pub fn can_initiate(me: &Identity, other_id: UserId, directory: &DirectoryCache) -> bool {
    match directory.user(other_id) {
        Some(other) => me.is_admin() != other.is_admin(),
        None => false,
    }
}

/// Admins may view every chat, everyone else only their own.
pub fn can_view(me: &Identity, chat: &Chat) -> bool {
    me.is_admin() || chat.involves(me.id)
}

/// Chats to show `me`: everything for admins, otherwise only own chats whose
/// counterpart resolves to an admin.
pub fn visible_chats<'a, I>(me: &Identity, chats: I, directory: &DirectoryCache) -> Vec<Chat>
where
    I: IntoIterator<Item = &'a Chat>,
{
    if me.is_admin() {
        return chats.into_iter().cloned().collect();
    }
    chats
        .into_iter()
        .filter(|chat| {
            chat.counterpart(me.id)
                .and_then(|other| directory.user(other))
                .is_some_and(Identity::is_admin)
        })
        .cloned()
        .collect()
}

/// Admin a non-admin should be routed to: `preferred` when it is a known
/// admin, otherwise the lowest-id admin. Admins get `None`.
pub fn find_eligible_counterpart(
    me: &Identity,
    directory: &DirectoryCache,
    preferred: UserId,
) -> Option<Identity> {
    if me.is_admin() {
        return None;
    }
    directory
        .user(preferred)
        .filter(|u| u.is_admin())
        .or_else(|| directory.users().find(|u| u.is_admin()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use companion_shared::types::{ChatId, RoleSet};

    use super::*;
    use crate::directory::DirectorySource;
    use crate::testing::{admin, chat, user};

    fn directory() -> DirectoryCache {
        let mut cache = DirectoryCache::new();
        cache.replace_users(
            vec![admin(1), admin(2), user(3), user(4)],
            DirectorySource::Backend,
        );
        cache.replace_chats(
            vec![chat(1, 3, 1), chat(2, 2, 4), chat(3, 3, 4), chat(4, 1, 2), chat(5, 4, 1)],
            DirectorySource::Backend,
        );
        cache
    }

    #[test]
    fn test_can_initiate_requires_exactly_one_admin() {
        let dir = directory();
        let people = [admin(1), admin(2), user(3), user(4)];
        for a in &people {
            for b in &people {
                let expected = a.is_admin() != b.is_admin();
                assert_eq!(can_initiate(a, b.id, &dir), expected, "{:?} -> {:?}", a.id, b.id);
                assert_eq!(can_initiate(b, a.id, &dir), expected, "{:?} -> {:?}", b.id, a.id);
            }
        }
    }

    #[test]
    fn test_can_initiate_unknown_user() {
        assert!(!can_initiate(&user(3), UserId(99), &directory()));
        assert!(!can_initiate(&admin(1), UserId(99), &directory()));
    }

    #[test]
    fn test_can_view() {
        let chat = chat(1, 3, 1);
        assert!(can_view(&user(3), &chat));
        assert!(!can_view(&user(4), &chat));
        assert!(can_view(&admin(2), &chat));
    }

    #[test]
    fn test_non_admin_sees_subset_with_admin_counterparts() {
        let dir = directory();
        for me in [user(3), user(4)] {
            let visible = visible_chats(&me, dir.chats(), &dir);
            assert!(visible.iter().all(|c| dir.chat(c.id) == Some(c)));
            for c in &visible {
                let other = c.counterpart(me.id).unwrap();
                assert!(dir.user(other).unwrap().is_admin());
            }
        }
        let ids: Vec<ChatId> = visible_chats(&user(4), dir.chats(), &dir)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![ChatId(2), ChatId(5)]);
    }

    #[test]
    fn test_admin_sees_everything() {
        let dir = directory();
        let visible = visible_chats(&admin(2), dir.chats(), &dir);
        assert_eq!(visible, dir.chats().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn test_counterpart_missing_from_directory_is_hidden() {
        let mut dir = directory();
        dir.upsert_chat(chat(9, 3, 77));
        let visible = visible_chats(&user(3), dir.chats(), &dir);
        assert!(visible.iter().all(|c| c.id != ChatId(9)));
    }

    #[test]
    fn test_find_eligible_counterpart() {
        let dir = directory();
        assert_eq!(
            find_eligible_counterpart(&user(3), &dir, UserId(2)).map(|u| u.id),
            Some(UserId(2))
        );
        assert_eq!(
            find_eligible_counterpart(&user(3), &dir, UserId(4)).map(|u| u.id),
            Some(UserId(1))
        );
        assert!(find_eligible_counterpart(&admin(1), &dir, UserId(2)).is_none());

        let mut only_users = DirectoryCache::new();
        only_users.replace_users(
            vec![Identity::new(3, "Lena", "Student", RoleSet::new(["user"]))],
            DirectorySource::Backend,
        );
        assert!(find_eligible_counterpart(&user(3), &only_users, UserId(1)).is_none());
    }
}
