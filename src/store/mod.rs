//! Local state store
//!
//! In-memory collection of subscriptions with linear undo/redo history and a
//! multi-select set. Every discrete mutation is one history commit.

mod history;

pub use history::History;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SdkError};
use crate::types::{Subscription, SubscriptionStatus};

/// Account plan, which caps how many subscriptions can be tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn max_subscriptions(&self) -> usize {
        match self {
            Plan::Free => 5,
            Plan::Pro => 20,
            Plan::Enterprise => 100,
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::Free
    }
}

/// Subscription collection with history and selection
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStore {
    history: History<Subscription>,
    /// Selected ids in the order they were selected
    selection: Vec<String>,
    plan: Plan,
}

impl SubscriptionStore {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            ..Default::default()
        }
    }

    pub fn plan(&self) -> Plan {
        self.plan
    }

    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = plan;
    }

    /// Current collection
    pub fn subscriptions(&self) -> &[Subscription] {
        self.history.current()
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions().iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions().is_empty()
    }

    /// Sum of prices across the current collection
    pub fn total_spend(&self) -> f64 {
        self.subscriptions().iter().map(|s| s.price).sum()
    }

    // ==================== History ====================

    /// Replace the whole collection as one history step
    pub fn commit(&mut self, collection: Vec<Subscription>) {
        debug!(count = collection.len(), "Committing store snapshot");
        self.history.commit(collection);
        self.prune_selection();
    }

    /// Restore the previous snapshot; no-op at the first
    pub fn undo(&mut self) -> bool {
        let moved = self.history.undo().is_some();
        if moved {
            self.prune_selection();
        }
        moved
    }

    /// Restore the next snapshot; no-op at the last
    pub fn redo(&mut self) -> bool {
        let moved = self.history.redo().is_some();
        if moved {
            self.prune_selection();
        }
        moved
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ==================== Single-item mutations ====================

    /// Initial population after fetching from the server
    pub fn load(&mut self, subscriptions: Vec<Subscription>) {
        self.commit(subscriptions);
    }

    /// Add a subscription, enforcing unique names and the plan cap
    pub fn add(&mut self, subscription: Subscription) -> Result<()> {
        let name = subscription.name.trim().to_lowercase();
        if self
            .subscriptions()
            .iter()
            .any(|s| s.name.trim().to_lowercase() == name)
        {
            return Err(SdkError::DuplicateName(subscription.name));
        }
        let limit = self.plan.max_subscriptions();
        if self.len() >= limit {
            return Err(SdkError::PlanLimit(limit));
        }

        let mut next = self.subscriptions().to_vec();
        next.push(subscription);
        self.commit(next);
        Ok(())
    }

    /// Replace the record with the same id
    pub fn update(&mut self, subscription: Subscription) -> Result<()> {
        let index = self.index_of(&subscription.id)?;
        let mut next = self.subscriptions().to_vec();
        next[index] = subscription;
        self.commit(next);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Subscription> {
        let index = self.index_of(id)?;
        let mut next = self.subscriptions().to_vec();
        let removed = next.remove(index);
        self.commit(next);
        Ok(removed)
    }

    /// Set the status of every listed id in a single commit
    ///
    /// Unknown ids are ignored. Returns how many records changed.
    pub fn set_status_many(&mut self, ids: &[String], status: SubscriptionStatus) -> usize {
        let mut changed = 0;
        let next: Vec<Subscription> = self
            .subscriptions()
            .iter()
            .cloned()
            .map(|mut s| {
                if ids.contains(&s.id) {
                    s.status = status;
                    changed += 1;
                }
                s
            })
            .collect();
        if changed > 0 {
            self.commit(next);
        }
        changed
    }

    /// Remove every listed id in a single commit
    pub fn remove_many(&mut self, ids: &[String]) -> usize {
        let next: Vec<Subscription> = self
            .subscriptions()
            .iter()
            .filter(|s| !ids.contains(&s.id))
            .cloned()
            .collect();
        let removed = self.len() - next.len();
        if removed > 0 {
            self.commit(next);
        }
        removed
    }

    // ==================== Selection ====================

    pub fn select(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(SdkError::NotFound(id.to_string()));
        }
        if !self.is_selected(id) {
            self.selection.push(id.to_string());
        }
        Ok(())
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        let before = self.selection.len();
        self.selection.retain(|s| s != id);
        self.selection.len() != before
    }

    /// Flip selection of `id`; returns whether it is now selected
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        if self.deselect(id) {
            return Ok(false);
        }
        self.select(id)?;
        Ok(true)
    }

    /// Select every subscription in the current collection
    pub fn select_all(&mut self) {
        self.selection = self.subscriptions().iter().map(|s| s.id.clone()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.iter().any(|s| s == id)
    }

    /// Selected ids in selection order
    pub fn selected_ids(&self) -> &[String] {
        &self.selection
    }

    /// Selected records in selection order
    pub fn selected(&self) -> Vec<&Subscription> {
        self.selection.iter().filter_map(|id| self.get(id)).collect()
    }

    // === Private Implementation ===

    fn index_of(&self, id: &str) -> Result<usize> {
        self.subscriptions()
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| SdkError::NotFound(id.to_string()))
    }

    /// Selection only ever refers to ids present in the current collection
    fn prune_selection(&mut self) {
        let current = self.history.current();
        self.selection
            .retain(|id| current.iter().any(|s| &s.id == id));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::BillingCycle;

    pub(crate) fn subscription(id: &str, name: &str, price: f64) -> Subscription {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "provider": name,
            "price": price,
            "billing_cycle": BillingCycle::Monthly.as_str(),
        }))
        .unwrap()
    }

    fn ids(store: &SubscriptionStore) -> Vec<&str> {
        store.subscriptions().iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_commit_undo_redo_round_trip() {
        let mut store = SubscriptionStore::default();
        store.commit(vec![subscription("1", "Netflix", 15.99)]);
        store.commit(vec![
            subscription("1", "Netflix", 15.99),
            subscription("2", "Spotify", 9.99),
        ]);

        assert!(store.undo());
        assert!(store.redo());
        assert_eq!(ids(&store), vec!["1", "2"]);
    }

    #[test]
    fn test_undo_past_start_keeps_first_snapshot() {
        let mut store = SubscriptionStore::default();
        let first = vec![subscription("1", "Netflix", 15.99)];
        store.commit(first.clone());
        store.commit(vec![
            subscription("1", "Netflix", 15.99),
            subscription("2", "Spotify", 9.99),
        ]);

        assert!(store.undo());
        assert!(!store.undo());
        assert_eq!(store.subscriptions(), &first[..]);
    }

    #[test]
    fn test_undo_after_load_keeps_loaded_collection() {
        let mut store = SubscriptionStore::default();
        assert!(store.is_empty());

        store.load(vec![subscription("1", "Netflix", 15.99)]);

        assert!(!store.can_undo());
        assert!(!store.undo());
        assert_eq!(ids(&store), vec!["1"]);
    }

    #[test]
    fn test_branch_discarded_after_undo() {
        let mut store = SubscriptionStore::default();
        store.commit(vec![subscription("1", "Netflix", 15.99)]);
        store.commit(vec![subscription("2", "Spotify", 9.99)]);
        store.undo();
        store.commit(vec![subscription("3", "Notion", 8.0)]);

        assert!(!store.redo());
        assert_eq!(ids(&store), vec!["3"]);
    }

    #[test]
    fn test_add_rejects_duplicate_name() {
        let mut store = SubscriptionStore::new(Plan::Pro);
        store.add(subscription("1", "Netflix", 15.99)).unwrap();

        let err = store.add(subscription("2", " netflix ", 9.99)).unwrap_err();
        assert_eq!(err, SdkError::DuplicateName(" netflix ".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_enforces_plan_limit() {
        let mut store = SubscriptionStore::new(Plan::Free);
        for i in 0..5 {
            store
                .add(subscription(&i.to_string(), &format!("Service {i}"), 1.0))
                .unwrap();
        }

        let err = store.add(subscription("6", "One more", 1.0)).unwrap_err();
        assert_eq!(err, SdkError::PlanLimit(5));
    }

    #[test]
    fn test_each_mutation_is_one_commit() {
        let mut store = SubscriptionStore::new(Plan::Pro);
        store.load(vec![subscription("1", "Netflix", 15.99)]);
        store.add(subscription("2", "Spotify", 9.99)).unwrap();
        store.remove("1").unwrap();

        assert!(store.undo());
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert!(store.undo());
        assert_eq!(ids(&store), vec!["1"]);
        assert_eq!(store.total_spend(), 15.99);
    }

    #[test]
    fn test_select_unknown_id_rejected() {
        let mut store = SubscriptionStore::default();
        store.load(vec![subscription("1", "Netflix", 15.99)]);

        assert_eq!(store.select("nope"), Err(SdkError::NotFound("nope".into())));
        assert!(store.selected_ids().is_empty());
    }

    #[test]
    fn test_selection_keeps_order_and_prunes_on_undo() {
        let mut store = SubscriptionStore::new(Plan::Pro);
        store.load(vec![subscription("1", "Netflix", 15.99)]);
        store.add(subscription("2", "Spotify", 9.99)).unwrap();

        store.select("2").unwrap();
        assert_eq!(store.toggle("1"), Ok(true));
        assert_eq!(store.selected_ids(), &["2".to_string(), "1".to_string()]);

        store.undo();
        assert_eq!(store.selected_ids(), &["1".to_string()]);
        assert_eq!(store.toggle("1"), Ok(false));
    }

    #[test]
    fn test_set_status_many_single_commit() {
        let mut store = SubscriptionStore::new(Plan::Pro);
        store.load(vec![
            subscription("1", "Netflix", 15.99),
            subscription("2", "Spotify", 9.99),
        ]);

        let changed = store.set_status_many(&["2".to_string()], SubscriptionStatus::Paused);
        assert_eq!(changed, 1);
        assert_eq!(store.get("2").unwrap().status, SubscriptionStatus::Paused);
        assert_eq!(store.get("1").unwrap().status, SubscriptionStatus::Active);

        store.undo();
        assert_eq!(store.get("2").unwrap().status, SubscriptionStatus::Active);
    }
}
