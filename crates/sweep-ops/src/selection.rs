//! Lazily populated two-level selection.
//!
//! Containers are selected speculatively and their children fetched on
//! demand. A failed fetch rolls the speculative selection back, and
//! deselecting a container releases every child selection it owns, so a
//! child is never selected while its container is not.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use compact_str::CompactString;
use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, warn};

use sweep_core::{
    ChildItem, ChildSource, ContainerId, ItemId, MessagePurgeOptions, ModeParameters,
    SelectionError,
};

/// A speculative container selection awaiting its fetch result.
#[derive(Debug)]
#[must_use = "a pending toggle must be committed or compensated"]
pub struct PendingToggle {
    container: ContainerId,
}

impl PendingToggle {
    /// The container being loaded.
    pub fn container(&self) -> &ContainerId {
        &self.container
    }
}

/// First phase of a container toggle.
#[derive(Debug)]
pub enum ToggleStep {
    /// Selected tentatively; children must be fetched before it is final.
    Fetch(PendingToggle),
    /// Deselected, releasing the owned child selections.
    Deselected { released: usize },
}

/// Final result of a container toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Selected { children: usize },
    Deselected { released: usize },
}

/// Serializable view of the selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SelectionSnapshot {
    /// Selected containers in selection order.
    pub containers: Vec<ContainerId>,
    /// Selected children in selection order.
    pub children: Vec<ItemId>,
    /// Containers whose children are still loading.
    pub loading: Vec<ContainerId>,
    /// Containers marked to leave.
    pub leave: Vec<ContainerId>,
    /// Relationships marked to remove.
    pub relationships: Vec<CompactString>,
}

/// The selection store: selected containers, the child cache, selected
/// children and the flat leave and relationship target sets.
///
/// All mutation goes through the methods below. Container toggles are two
/// phase: [`begin_toggle`](Self::begin_toggle) applies the tentative
/// selection, then [`commit`](Self::commit) or
/// [`compensate`](Self::compensate) settles it. The leave and relationship
/// sets never fetch and are independent of the container selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    containers: IndexSet<ContainerId>,
    cache: HashMap<ContainerId, Vec<ChildItem>>,
    children: IndexSet<ItemId>,
    in_flight: HashSet<ContainerId>,
    leave: IndexSet<ContainerId>,
    relationships: IndexSet<CompactString>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start toggling a container.
    ///
    /// Selected containers are deselected right away. Unselected ones are
    /// selected tentatively and returned as a [`PendingToggle`] for the
    /// caller to fetch. The cache only ever holds selected containers, so a
    /// fresh selection always fetches.
    pub fn begin_toggle(&mut self, container: &ContainerId) -> Result<ToggleStep, SelectionError> {
        if self.in_flight.contains(container) {
            return Err(SelectionError::FetchInFlight {
                container: container.clone(),
            });
        }

        if self.containers.contains(container) {
            let released = self.deselect(container);
            return Ok(ToggleStep::Deselected { released });
        }

        self.containers.insert(container.clone());
        self.in_flight.insert(container.clone());
        Ok(ToggleStep::Fetch(PendingToggle {
            container: container.clone(),
        }))
    }

    /// Settle a pending toggle with the fetched children.
    ///
    /// Returns the number of cached children.
    pub fn commit(&mut self, pending: PendingToggle, mut children: Vec<ChildItem>) -> usize {
        let PendingToggle { container } = pending;
        self.in_flight.remove(&container);

        if !self.containers.contains(&container) {
            return 0;
        }

        for child in &mut children {
            child.container = container.clone();
        }
        let count = children.len();
        self.cache.insert(container, children);
        count
    }

    /// Undo a pending toggle after its fetch failed.
    pub fn compensate(&mut self, pending: PendingToggle) {
        let PendingToggle { container } = pending;
        self.in_flight.remove(&container);
        self.containers.shift_remove(&container);
        self.cache.remove(&container);
    }

    /// Remove a container, its cache entry and its child selections.
    fn deselect(&mut self, container: &ContainerId) -> usize {
        self.containers.shift_remove(container);

        let Some(items) = self.cache.remove(container) else {
            return 0;
        };
        items
            .iter()
            .filter(|item| self.children.shift_remove(&item.id))
            .count()
    }

    /// Container owning `item`, looked up in the cache.
    pub fn owner_of(&self, item: &ItemId) -> Option<&ContainerId> {
        self.cache
            .iter()
            .find(|(_, items)| items.iter().any(|child| &child.id == item))
            .map(|(container, _)| container)
    }

    /// Flip a child selection.
    ///
    /// Returns `false` and changes nothing if the child's container is not
    /// selected or the child is unknown.
    pub fn toggle_child(&mut self, item: &ItemId) -> bool {
        let owned_by_selected = self
            .owner_of(item)
            .is_some_and(|owner| self.containers.contains(owner));

        if !owned_by_selected {
            debug!(item = %item, "Ignoring toggle of child outside the selection");
            return false;
        }

        if !self.children.shift_remove(item) {
            self.children.insert(item.clone());
        }
        true
    }

    /// Select every cached child of a selected container.
    ///
    /// Returns the number of newly selected children.
    pub fn select_all_children_of(&mut self, container: &ContainerId) -> usize {
        if !self.containers.contains(container) {
            return 0;
        }
        let Some(items) = self.cache.get(container) else {
            return 0;
        };
        items
            .iter()
            .filter(|item| self.children.insert(item.id.clone()))
            .count()
    }

    /// Select every cached child of every selected container.
    pub fn select_all_children(&mut self) -> usize {
        let containers: Vec<ContainerId> = self.containers.iter().cloned().collect();
        containers
            .iter()
            .map(|container| self.select_all_children_of(container))
            .sum()
    }

    /// Deselect every child.
    pub fn clear_all_children(&mut self) {
        self.children.clear();
    }

    pub fn is_container_selected(&self, container: &ContainerId) -> bool {
        self.containers.contains(container)
    }

    pub fn is_child_selected(&self, item: &ItemId) -> bool {
        self.children.contains(item)
    }

    /// Check if a container's children are being fetched.
    pub fn is_loading(&self, container: &ContainerId) -> bool {
        self.in_flight.contains(container)
    }

    /// Cached children of a container.
    pub fn children_of(&self, container: &ContainerId) -> Option<&[ChildItem]> {
        self.cache.get(container).map(Vec::as_slice)
    }

    pub fn is_cached(&self, container: &ContainerId) -> bool {
        self.cache.contains_key(container)
    }

    pub fn selected_containers(&self) -> impl Iterator<Item = &ContainerId> {
        self.containers.iter()
    }

    pub fn selected_children(&self) -> impl Iterator<Item = &ItemId> {
        self.children.iter()
    }

    pub fn selected_child_count(&self) -> usize {
        self.children.len()
    }

    /// Flip a container in the leave set.
    ///
    /// Returns whether it is now marked. The ungrouped pseudo-container
    /// cannot be left and is never marked.
    pub fn toggle_leave(&mut self, container: &ContainerId) -> bool {
        if container.is_ungrouped() {
            return false;
        }
        if self.leave.shift_remove(container) {
            return false;
        }
        self.leave.insert(container.clone())
    }

    /// Mark every given container to leave. Returns the number newly marked.
    pub fn select_all_leave<'a>(
        &mut self,
        containers: impl IntoIterator<Item = &'a ContainerId>,
    ) -> usize {
        containers
            .into_iter()
            .filter(|c| !c.is_ungrouped())
            .filter(|c| self.leave.insert((*c).clone()))
            .count()
    }

    pub fn clear_leave(&mut self) {
        self.leave.clear();
    }

    pub fn is_leave_selected(&self, container: &ContainerId) -> bool {
        self.leave.contains(container)
    }

    /// Flip a relationship in the removal set. Returns whether it is now
    /// marked.
    pub fn toggle_relationship(&mut self, id: &str) -> bool {
        if self.relationships.shift_remove(id) {
            return false;
        }
        self.relationships.insert(CompactString::from(id))
    }

    /// Mark every given relationship. Returns the number newly marked.
    pub fn select_all_relationships<S: AsRef<str>>(
        &mut self,
        ids: impl IntoIterator<Item = S>,
    ) -> usize {
        ids.into_iter()
            .filter(|id| self.relationships.insert(CompactString::from(id.as_ref())))
            .count()
    }

    pub fn clear_relationships(&mut self) {
        self.relationships.clear();
    }

    pub fn is_relationship_selected(&self, id: &str) -> bool {
        self.relationships.contains(id)
    }

    /// Check that every selected child belongs to a selected container and
    /// that only selected containers are cached.
    pub fn is_consistent(&self) -> bool {
        let children_owned = self.children.iter().all(|item| {
            self.owner_of(item)
                .is_some_and(|owner| self.containers.contains(owner))
        });
        let cache_selected = self.cache.keys().all(|c| self.containers.contains(c));
        children_owned && cache_selected
    }

    /// Messages-mode parameters targeting the selected children.
    pub fn message_parameters(&self, options: MessagePurgeOptions) -> ModeParameters {
        ModeParameters::messages(self.children.iter().cloned(), options)
    }

    /// Servers-mode parameters targeting the leave set.
    pub fn server_parameters(&self) -> ModeParameters {
        ModeParameters::servers(self.leave.iter().cloned())
    }

    /// Identity-mode parameters targeting the marked relationships.
    pub fn identity_parameters(&self) -> ModeParameters {
        ModeParameters::identity(self.relationships.iter().cloned())
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            containers: self.containers.iter().cloned().collect(),
            children: self.children.iter().cloned().collect(),
            loading: self
                .containers
                .iter()
                .filter(|c| self.in_flight.contains(*c))
                .cloned()
                .collect(),
            leave: self.leave.iter().cloned().collect(),
            relationships: self.relationships.iter().cloned().collect(),
        }
    }
}

/// Rolls a pending toggle back unless it was committed, including when the
/// toggle future is dropped mid-fetch.
struct FetchGuard<'a> {
    state: &'a Mutex<SelectionState>,
    pending: Option<PendingToggle>,
}

impl FetchGuard<'_> {
    fn commit(mut self, children: Vec<ChildItem>) -> usize {
        match self.pending.take() {
            Some(pending) => lock(self.state).commit(pending, children),
            None => 0,
        }
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            lock(self.state).compensate(pending);
        }
    }
}

fn lock(state: &Mutex<SelectionState>) -> MutexGuard<'_, SelectionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates selection changes with the child source.
///
/// Toggles take `&self` and never hold the state lock across a fetch, so
/// toggles of different containers can run concurrently.
#[derive(Debug)]
pub struct SelectionCoordinator<S> {
    source: S,
    state: Mutex<SelectionState>,
}

impl<S: ChildSource> SelectionCoordinator<S> {
    /// Create a coordinator with an empty selection.
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(SelectionState::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Select or deselect a container.
    ///
    /// Selecting always fetches the container's children; on fetch
    /// failure the container is deselected again and the error returned.
    pub async fn toggle_container(
        &self,
        container: &ContainerId,
    ) -> Result<ToggleOutcome, SelectionError> {
        let step = lock(&self.state).begin_toggle(container)?;

        let pending = match step {
            ToggleStep::Fetch(pending) => pending,
            ToggleStep::Deselected { released } => {
                debug!(container = %container, released, "Deselected container");
                return Ok(ToggleOutcome::Deselected { released });
            }
        };

        let guard = FetchGuard {
            state: &self.state,
            pending: Some(pending),
        };

        match self.source.fetch_children(container).await {
            Ok(children) => {
                let children = guard.commit(children);
                debug!(container = %container, children, "Selected container");
                Ok(ToggleOutcome::Selected { children })
            }
            Err(err) => {
                drop(guard);
                warn!(container = %container, error = %err, "Rolled back container selection");
                Err(err.into())
            }
        }
    }

    /// Flip a child selection. See [`SelectionState::toggle_child`].
    pub fn toggle_child(&self, item: &ItemId) -> bool {
        lock(&self.state).toggle_child(item)
    }

    pub fn select_all_children_of(&self, container: &ContainerId) -> usize {
        lock(&self.state).select_all_children_of(container)
    }

    pub fn select_all_children(&self) -> usize {
        lock(&self.state).select_all_children()
    }

    pub fn clear_all_children(&self) {
        lock(&self.state).clear_all_children();
    }

    pub fn is_container_selected(&self, container: &ContainerId) -> bool {
        lock(&self.state).is_container_selected(container)
    }

    pub fn is_child_selected(&self, item: &ItemId) -> bool {
        lock(&self.state).is_child_selected(item)
    }

    pub fn is_loading(&self, container: &ContainerId) -> bool {
        lock(&self.state).is_loading(container)
    }

    /// Cached children of a container, cloned.
    pub fn children_of(&self, container: &ContainerId) -> Option<Vec<ChildItem>> {
        lock(&self.state).children_of(container).map(<[ChildItem]>::to_vec)
    }

    pub fn toggle_leave(&self, container: &ContainerId) -> bool {
        lock(&self.state).toggle_leave(container)
    }

    pub fn select_all_leave<'a>(
        &self,
        containers: impl IntoIterator<Item = &'a ContainerId>,
    ) -> usize {
        lock(&self.state).select_all_leave(containers)
    }

    pub fn clear_leave(&self) {
        lock(&self.state).clear_leave();
    }

    pub fn toggle_relationship(&self, id: &str) -> bool {
        lock(&self.state).toggle_relationship(id)
    }

    pub fn select_all_relationships<T: AsRef<str>>(
        &self,
        ids: impl IntoIterator<Item = T>,
    ) -> usize {
        lock(&self.state).select_all_relationships(ids)
    }

    pub fn clear_relationships(&self) {
        lock(&self.state).clear_relationships();
    }

    /// Read the state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&SelectionState) -> R) -> R {
        f(&lock(&self.state))
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        lock(&self.state).snapshot()
    }

    pub fn message_parameters(&self, options: MessagePurgeOptions) -> ModeParameters {
        lock(&self.state).message_parameters(options)
    }

    pub fn server_parameters(&self) -> ModeParameters {
        lock(&self.state).server_parameters()
    }

    pub fn identity_parameters(&self) -> ModeParameters {
        lock(&self.state).identity_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::ItemKind;

    fn items(container: &str, ids: &[&str]) -> Vec<ChildItem> {
        ids.iter()
            .map(|id| ChildItem::new(*id, *id, ItemKind::Text, container))
            .collect()
    }

    fn select(state: &mut SelectionState, container: &str, ids: &[&str]) {
        let id = ContainerId::new(container);
        match state.begin_toggle(&id).unwrap() {
            ToggleStep::Fetch(pending) => {
                state.commit(pending, items(container, ids));
            }
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_begin_toggle_is_speculative() {
        let mut state = SelectionState::new();
        let a = ContainerId::new("a");

        let step = state.begin_toggle(&a).unwrap();
        assert!(state.is_container_selected(&a));
        assert!(state.is_loading(&a));
        assert!(!state.is_cached(&a));

        let ToggleStep::Fetch(pending) = step else {
            panic!("expected fetch");
        };
        assert_eq!(pending.container(), &a);
        state.compensate(pending);

        assert!(!state.is_container_selected(&a));
        assert!(!state.is_loading(&a));
        assert!(!state.is_cached(&a));
    }

    #[test]
    fn test_in_flight_container_rejects_second_toggle() {
        let mut state = SelectionState::new();
        let a = ContainerId::new("a");
        let _pending = state.begin_toggle(&a).unwrap();

        let err = state.begin_toggle(&a).unwrap_err();
        assert!(matches!(err, SelectionError::FetchInFlight { .. }));
        assert!(state.is_container_selected(&a));
    }

    #[test]
    fn test_commit_reowns_children() {
        let mut state = SelectionState::new();
        let a = ContainerId::new("a");
        let ToggleStep::Fetch(pending) = state.begin_toggle(&a).unwrap() else {
            panic!("expected fetch");
        };
        let count = state.commit(pending, items("elsewhere", &["c1", "c2"]));

        assert_eq!(count, 2);
        let cached = state.children_of(&a).unwrap();
        assert!(cached.iter().all(|c| c.container == a));
    }

    #[test]
    fn test_deselect_releases_owned_children() {
        let mut state = SelectionState::new();
        select(&mut state, "a", &["a1", "a2"]);
        select(&mut state, "b", &["b1"]);
        assert_eq!(state.select_all_children(), 3);

        let step = state.begin_toggle(&ContainerId::new("a")).unwrap();
        assert!(matches!(step, ToggleStep::Deselected { released: 2 }));
        assert!(!state.is_child_selected(&ItemId::new("a1")));
        assert!(state.is_child_selected(&ItemId::new("b1")));
        assert!(!state.is_cached(&ContainerId::new("a")));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_toggle_child_ignores_unknown_owner() {
        let mut state = SelectionState::new();
        assert!(!state.toggle_child(&ItemId::new("ghost")));
        assert_eq!(state.selected_child_count(), 0);

        select(&mut state, "a", &["a1"]);
        assert!(state.toggle_child(&ItemId::new("a1")));
        assert!(state.is_child_selected(&ItemId::new("a1")));
        assert!(state.toggle_child(&ItemId::new("a1")));
        assert!(!state.is_child_selected(&ItemId::new("a1")));
    }

    #[test]
    fn test_select_all_children_of_unselected_is_noop() {
        let mut state = SelectionState::new();
        assert_eq!(state.select_all_children_of(&ContainerId::new("a")), 0);

        select(&mut state, "a", &["a1", "a2"]);
        state.toggle_child(&ItemId::new("a1"));
        assert_eq!(state.select_all_children_of(&ContainerId::new("a")), 1);

        state.clear_all_children();
        assert_eq!(state.selected_child_count(), 0);
        assert!(state.is_container_selected(&ContainerId::new("a")));
    }

    #[test]
    fn test_parameters_from_selection() {
        let mut state = SelectionState::new();
        select(&mut state, "a", &["a1", "a2"]);
        select(&mut state, "dms", &["d1"]);
        state.select_all_children();

        let params = state.message_parameters(MessagePurgeOptions::default());
        assert_eq!(params.target_ids(), vec!["a1", "a2", "d1"]);

        let params = state.server_parameters();
        assert_eq!(params.target_count(), 0);
    }

    #[test]
    fn test_leave_set_is_independent_of_containers() {
        let mut state = SelectionState::new();
        let a = ContainerId::new("a");
        let b = ContainerId::new("b");

        assert!(state.toggle_leave(&a));
        assert!(state.toggle_leave(&b));
        assert!(!state.toggle_leave(&ContainerId::ungrouped()));
        assert!(!state.is_container_selected(&a));
        assert!(!state.is_loading(&a));
        assert_eq!(state.server_parameters().target_ids(), vec!["a", "b"]);

        assert!(!state.toggle_leave(&a));
        assert!(!state.is_leave_selected(&a));
        assert_eq!(state.server_parameters().target_ids(), vec!["b"]);

        let all = [a.clone(), b.clone(), ContainerId::ungrouped()];
        assert_eq!(state.select_all_leave(&all), 1);
        assert_eq!(state.snapshot().leave, vec![b.clone(), a]);

        state.clear_leave();
        assert!(state.snapshot().leave.is_empty());
    }

    #[test]
    fn test_relationship_set() {
        let mut state = SelectionState::new();
        assert!(state.toggle_relationship("u1"));
        assert_eq!(state.select_all_relationships(["u1", "u2", "u3"]), 2);
        assert!(!state.toggle_relationship("u2"));
        assert!(!state.is_relationship_selected("u2"));

        let params = state.identity_parameters();
        assert_eq!(params.mode(), sweep_core::Mode::Identity);
        assert_eq!(params.target_ids(), vec!["u1", "u3"]);

        state.clear_relationships();
        assert_eq!(state.identity_parameters().target_count(), 0);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_reselect_after_deselect_fetches_again() {
        let mut state = SelectionState::new();
        select(&mut state, "a", &["a1"]);
        let a = ContainerId::new("a");

        assert!(matches!(
            state.begin_toggle(&a).unwrap(),
            ToggleStep::Deselected { released: 0 }
        ));
        assert!(matches!(state.begin_toggle(&a).unwrap(), ToggleStep::Fetch(_)));
    }

    #[test]
    fn test_snapshot_lists_loading() {
        let mut state = SelectionState::new();
        select(&mut state, "a", &["a1"]);
        let _pending = state.begin_toggle(&ContainerId::new("b")).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.containers,
            vec![ContainerId::new("a"), ContainerId::new("b")]
        );
        assert_eq!(snapshot.loading, vec![ContainerId::new("b")]);
    }
}
