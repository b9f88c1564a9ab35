use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::types::Schema;

use super::builder::{self, BuildOptions};
use super::loader::Loader;

/// Proof that an update was started; see [`SharedSchema::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTicket {
    generation: u64,
}

impl UpdateTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The live schema of a long-running session.
///
/// Readers take a cheap `Arc` snapshot and never observe a partially applied
/// update. Every update takes a ticket before it starts; only the most
/// recently started update may publish its result, so a slow older build can
/// never overwrite a newer one. Dropping an update future before it finishes
/// leaves the live schema as it was.
pub struct SharedSchema {
    current: RwLock<Arc<Schema>>,
    generation: AtomicU64,
    /// Changed paths not yet covered by a published revalidation.
    pending: Mutex<HashSet<String>>,
}

impl Default for SharedSchema {
    fn default() -> Self {
        SharedSchema::new(Schema::default())
    }
}

impl SharedSchema {
    pub fn new(schema: Schema) -> Self {
        SharedSchema {
            current: RwLock::new(Arc::new(schema)),
            generation: AtomicU64::new(0),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// The current schema.
    pub fn load(&self) -> Arc<Schema> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Generation of the most recently started update.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start an update. Any ticket issued earlier becomes stale.
    pub fn begin(&self) -> UpdateTicket {
        UpdateTicket {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Publish `schema` if no newer update has started since `ticket` was
    /// issued. Returns whether it was published.
    pub fn commit(&self, ticket: UpdateTicket, schema: Schema) -> bool {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != ticket.generation {
            tracing::debug!(
                generation = ticket.generation,
                latest = self.generation.load(Ordering::SeqCst),
                "discarding superseded schema"
            );
            return false;
        }
        *current = Arc::new(schema);
        true
    }

    /// Build from scratch and publish. Returns the new schema, or `None` if
    /// a newer update superseded this one.
    pub async fn rebuild<L, P>(&self, loader: &L, entries: &[P], options: &BuildOptions) -> Option<Arc<Schema>>
    where
        L: Loader + ?Sized,
        P: AsRef<str>,
    {
        let ticket = self.begin();
        let schema = builder::build_with(loader, entries, options).await;
        if self.commit(ticket, schema) {
            Some(self.load())
        } else {
            None
        }
    }

    /// Revalidate `changed` on top of the current schema and publish.
    ///
    /// Paths from superseded or abandoned revalidations are carried into the
    /// next one, so no edit is lost when a newer update wins.
    pub async fn revalidate<L, P>(&self, loader: &L, changed: &[P], options: &BuildOptions) -> Option<Arc<Schema>>
    where
        L: Loader + ?Sized,
        P: AsRef<str>,
    {
        let paths: Vec<String> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.extend(changed.iter().map(|p| p.as_ref().to_string()));
            let mut paths: Vec<String> = pending.iter().cloned().collect();
            paths.sort();
            paths
        };
        let ticket = self.begin();
        let base = self.load();
        let schema = builder::revalidate(loader, &base, &paths, options).await;
        if !self.commit(ticket, schema) {
            return None;
        }
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for path in &paths {
            pending.remove(path);
        }
        drop(pending);
        Some(self.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryLoader;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stale_ticket_is_rejected() {
        let shared = SharedSchema::default();
        let older = shared.begin();
        let newer = shared.begin();

        let mut first = Schema::default();
        first.entries.push("newer.proto".to_string());
        assert!(shared.commit(newer, first));

        let mut second = Schema::default();
        second.entries.push("older.proto".to_string());
        assert!(!shared.commit(older, second));

        assert_eq!(shared.load().entries, vec!["newer.proto"]);
        assert_eq!(shared.generation(), 2);
    }

    #[tokio::test]
    async fn test_dropped_update_leaves_schema() {
        let loader = MemoryLoader::with_files([("a.proto", "message A {}")]);
        let shared = SharedSchema::default();
        shared
            .rebuild(&loader, &["a.proto"], &BuildOptions::default())
            .await
            .unwrap();

        loader.insert("a.proto", "message B {}");
        let options = BuildOptions::default();
        let update = shared.revalidate(&loader, &["a.proto"], &options);
        drop(update);

        let schema = shared.load();
        assert!(schema.get_type("A").is_some());
        assert!(schema.get_type("B").is_none());
    }

    #[tokio::test]
    async fn test_revalidate_publishes() {
        let loader = MemoryLoader::with_files([("a.proto", "message A {}")]);
        let shared = SharedSchema::default();
        shared
            .rebuild(&loader, &["a.proto"], &BuildOptions::default())
            .await
            .unwrap();

        loader.insert("a.proto", "message B {}");
        let schema = shared
            .revalidate(&loader, &["a.proto"], &BuildOptions::default())
            .await
            .unwrap();
        assert!(schema.get_type("A").is_none());
        assert!(schema.get_type("B").is_some());
        assert!(Arc::ptr_eq(&schema, &shared.load()));
    }
}
