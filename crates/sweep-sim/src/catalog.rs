//! In-memory child source.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::debug;

use sweep_core::{ChildItem, ChildSource, Container, ContainerId, FetchError, ItemId, ItemKind};

/// Containers and their children held in memory.
///
/// Fetches can be delayed and made to fail per container, and every fetch is
/// counted so callers can check cache behavior.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: IndexMap<ContainerId, Entry>,
    relationships: Vec<String>,
    latency: Option<Duration>,
    failures: Mutex<HashMap<ContainerId, String>>,
    fetches: Mutex<HashMap<ContainerId, usize>>,
}

#[derive(Debug)]
struct Entry {
    container: Container,
    children: Vec<ChildItem>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog of `containers` text containers with `children_per` text
    /// children each, named `guild-N` and `guild-N-ch-M`, plus one
    /// relationship `user-N` per container.
    pub fn demo(containers: usize, children_per: usize) -> Self {
        let catalog =
            Self::new().with_relationships((1..=containers).map(|n| format!("user-{n}")));
        (1..=containers).fold(catalog, |catalog, n| {
            let id = ContainerId::new(format!("guild-{n}"));
            let children = (1..=children_per)
                .map(|m| {
                    ChildItem::new(
                        ItemId::new(format!("{id}-ch-{m}")),
                        format!("channel-{m}"),
                        ItemKind::Text,
                        id.clone(),
                    )
                })
                .collect();
            catalog.with_container(Container::new(id, format!("Guild {n}")), children)
        })
    }

    /// Add a container with its children.
    pub fn with_container(mut self, container: Container, children: Vec<ChildItem>) -> Self {
        self.entries.insert(
            container.id.clone(),
            Entry {
                container,
                children,
            },
        );
        self
    }

    pub fn with_relationships(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.relationships.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Relationship ids available for identity-mode removal.
    pub fn relationships(&self) -> &[String] {
        &self.relationships
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make fetches of `container` fail until [`clear_failure`](Self::clear_failure).
    pub fn fail_fetch(&self, container: &ContainerId, message: impl Into<String>) {
        lock(&self.failures).insert(container.clone(), message.into());
    }

    pub fn clear_failure(&self, container: &ContainerId) {
        lock(&self.failures).remove(container);
    }

    /// Number of fetches issued for `container`, failed ones included.
    pub fn fetch_count(&self, container: &ContainerId) -> usize {
        lock(&self.fetches).get(container).copied().unwrap_or(0)
    }

    pub fn container(&self, id: &ContainerId) -> Option<&Container> {
        self.entries.get(id).map(|entry| &entry.container)
    }

    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.entries.keys().cloned().collect()
    }

    fn lookup(&self, container: &ContainerId) -> Result<Vec<ChildItem>, FetchError> {
        *lock(&self.fetches).entry(container.clone()).or_default() += 1;

        if let Some(message) = lock(&self.failures).get(container) {
            return Err(FetchError::new(container.clone(), message.clone()));
        }

        self.entries
            .get(container)
            .map(|entry| entry.children.clone())
            .ok_or_else(|| FetchError::new(container.clone(), "Unknown container"))
    }
}

impl ChildSource for Catalog {
    async fn fetch_children(&self, container: &ContainerId) -> Result<Vec<ChildItem>, FetchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.lookup(container);
        debug!(
            container = %container,
            ok = result.is_ok(),
            "Served child fetch"
        );
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_catalog() {
        let catalog = Catalog::demo(2, 3);
        let ids = catalog.container_ids();
        assert_eq!(ids.len(), 2);

        let children = catalog.fetch_children(&ids[0]).await.unwrap();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.container == ids[0]));
        assert_eq!(children[0].id.as_str(), "guild-1-ch-1");
        assert_eq!(catalog.fetch_count(&ids[0]), 1);
        assert_eq!(catalog.fetch_count(&ids[1]), 0);
        assert_eq!(catalog.container(&ids[1]).unwrap().name.as_str(), "Guild 2");
        assert_eq!(catalog.relationships(), ["user-1", "user-2"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let catalog = Catalog::demo(1, 1);
        let id = ContainerId::new("guild-1");

        catalog.fail_fetch(&id, "Missing Access");
        let err = catalog.fetch_children(&id).await.unwrap_err();
        assert_eq!(err.container, id);
        assert!(err.to_string().contains("Missing Access"));

        catalog.clear_failure(&id);
        assert!(catalog.fetch_children(&id).await.is_ok());
        assert_eq!(catalog.fetch_count(&id), 2);
    }

    #[tokio::test]
    async fn test_unknown_container() {
        let catalog = Catalog::new();
        assert!(catalog.fetch_children(&ContainerId::new("nope")).await.is_err());
    }
}
