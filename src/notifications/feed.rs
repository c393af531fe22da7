//! De-duplicated, newest-first notification list with an unread counter.
//!
//! Every mutation updates the list and the counter together, so
//! `unread_count()` always equals the number of unread entries.

use std::collections::HashSet;

use crate::domain::{Notification, NotificationId};

/// Local notification list of one identity.
#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    entries: Vec<Notification>,
    ids: HashSet<NotificationId>,
    unread: usize,
}

impl NotificationFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole list, as after a bootstrap fetch.
    ///
    /// Repeated ids keep their first occurrence.
    pub fn replace(&mut self, notifications: Vec<Notification>) {
        self.entries.clear();
        self.ids.clear();
        for notification in notifications {
            if self.ids.insert(notification.id.clone()) {
                self.entries.push(notification);
            }
        }
        self.unread = self.entries.iter().filter(|n| !n.is_read).count();
    }

    /// Inserts at the head unless the id is already present.
    ///
    /// Returns `true` on insertion, `false` for a duplicate.
    pub fn push(&mut self, notification: Notification) -> bool {
        if !self.ids.insert(notification.id.clone()) {
            return false;
        }
        if !notification.is_read {
            self.unread = self.unread.saturating_add(1);
        }
        self.entries.insert(0, notification);
        true
    }

    /// Flips one entry to read. Returns `true` if it was unread.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|n| &n.id == id) else {
            return false;
        };
        if entry.is_read {
            return false;
        }
        entry.is_read = true;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    /// Flips every entry to read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0usize;
        for entry in self.entries.iter_mut().filter(|n| !n.is_read) {
            entry.is_read = true;
            changed = changed.saturating_add(1);
        }
        self.unread = 0;
        changed
    }

    /// Returns the entries, newest first.
    #[must_use]
    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    /// Returns the entry with `id`.
    #[must_use]
    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.entries.iter().find(|n| &n.id == id)
    }

    /// Returns `true` if `id` is present.
    #[must_use]
    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    /// Returns the number of unread entries.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the feed has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn note(id: &str, read: bool) -> Notification {
        let Ok(n) = serde_json::from_value(json!({
            "_id": id, "message": format!("note {id}"), "type": "booking", "isRead": read
        })) else {
            panic!("fixture must decode");
        };
        n
    }

    fn recount(feed: &NotificationFeed) -> usize {
        feed.entries().iter().filter(|n| !n.is_read).count()
    }

    #[test]
    fn repeated_pushes_keep_one_entry_per_id() {
        let mut feed = NotificationFeed::new();
        let ids = ["a", "b", "a", "c", "b", "a"];
        let inserted: Vec<bool> = ids.iter().map(|id| feed.push(note(id, false))).collect();
        assert_eq!(inserted, vec![true, true, false, true, false, false]);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.unread_count(), 3);
        assert_eq!(recount(&feed), feed.unread_count());
    }

    #[test]
    fn push_inserts_newest_first() {
        let mut feed = NotificationFeed::new();
        feed.push(note("a", false));
        feed.push(note("b", false));
        let order: Vec<&str> = feed.entries().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn mark_read_is_idempotent_and_floored() {
        let mut feed = NotificationFeed::new();
        feed.push(note("a", false));
        assert!(feed.mark_read(&NotificationId::from("a")));
        assert!(!feed.mark_read(&NotificationId::from("a")));
        assert!(!feed.mark_read(&NotificationId::from("missing")));
        assert_eq!(feed.unread_count(), 0);
        let Some(entry) = feed.get(&NotificationId::from("a")) else {
            panic!("entry must exist");
        };
        assert!(entry.is_read);
    }

    #[test]
    fn bootstrap_then_racing_push_is_deduplicated() {
        let mut feed = NotificationFeed::new();
        feed.replace(vec![note("n1", false)]);
        assert_eq!(feed.unread_count(), 1);

        assert!(!feed.push(note("n1", false)));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.unread_count(), 1);

        assert!(feed.mark_read(&NotificationId::from("n1")));
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn replace_recomputes_counter() {
        let mut feed = NotificationFeed::new();
        feed.push(note("x", false));
        feed.replace(vec![note("a", true), note("b", false), note("b", false)]);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.unread_count(), 1);
        assert!(!feed.contains(&NotificationId::from("x")));
    }

    #[test]
    fn mark_all_read_resets_counter() {
        let mut feed = NotificationFeed::new();
        feed.replace(vec![note("a", false), note("b", true), note("c", false)]);
        assert_eq!(feed.mark_all_read(), 2);
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(recount(&feed), 0);
    }
}
