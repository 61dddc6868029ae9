//! Maps stored records to live destinations, healing stale identifiers.
//!
//! Destination identifiers on the messaging platform can change across
//! reconnections while the human-readable name stays stable, so resolution
//! is identifier-first for speed and name-fallback for self-healing.

use crate::channels::types::{ChatPlatform, Destination};
use crate::error::BotError;
use crate::store::{BirthdayRecord, BirthdayStore};
use std::sync::Arc;

pub struct ChannelResolver {
    store: Arc<BirthdayStore>,
    platform: Arc<dyn ChatPlatform>,
}

impl ChannelResolver {
    pub fn new(store: Arc<BirthdayStore>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { store, platform }
    }

    /// Find a live destination for `record`, repairing its stored id when
    /// resolution went through the name fallback. The caller's copy is
    /// updated in place so later mutations address the record by its
    /// current id.
    ///
    /// An `Unresolved` error is a skip-and-log condition for callers, never
    /// fatal, so one bad record cannot block delivery to the rest.
    pub async fn resolve(&self, record: &mut BirthdayRecord) -> Result<Destination, BotError> {
        let destinations = match self.platform.list_destinations().await {
            Ok(destinations) => destinations,
            Err(e) => {
                log::warn!("[RESOLVER] Failed to list destinations: {}", e);
                return Err(BotError::Unresolved(record.group_name.clone()));
            }
        };
        let found = find_destination(record, &destinations)
            .ok_or_else(|| BotError::Unresolved(record.group_name.clone()))?;

        if record.group_id.as_deref() != Some(found.id.as_str()) {
            match self.store.set_group_id(record, &found.id) {
                Ok(()) => log::info!(
                    "[RESOLVER] Resolved groupId for '{}' -> {}",
                    record.group_name,
                    found.id
                ),
                Err(e) => log::error!(
                    "[RESOLVER] Failed to persist repaired groupId for '{}': {}",
                    record.group_name,
                    e
                ),
            }
            // The store applies the repair in memory even when the disk
            // write failed; the caller's copy follows it
            record.group_id = Some(found.id.clone());
        }
        Ok(found)
    }

    /// Batch repair over every record, used at startup and by the
    /// `!actualizar` command. Returns how many identifiers were durably
    /// repaired; a repair whose persist failed is logged, not counted.
    pub async fn resolve_all(&self) -> Result<usize, String> {
        let destinations = self.platform.list_destinations().await?;
        let mut repaired = 0usize;
        for record in self.store.all() {
            let Some(found) = find_destination(&record, &destinations) else {
                continue;
            };
            if record.group_id.as_deref() == Some(found.id.as_str()) {
                continue;
            }
            match self.store.set_group_id(&record, &found.id) {
                Ok(()) => {
                    log::info!(
                        "[RESOLVER] Resolved groupId for '{}' -> {}",
                        record.group_name,
                        found.id
                    );
                    repaired += 1;
                }
                Err(e) => log::error!(
                    "[RESOLVER] Failed to persist repaired groupId for '{}': {}",
                    record.group_name,
                    e
                ),
            }
        }
        if repaired > 0 {
            log::info!("[RESOLVER] Repaired {} destination identifier(s)", repaired);
        }
        Ok(repaired)
    }
}

/// Resolution order: (a) stored id matches a live destination; (b) trimmed
/// case-insensitive name match; (c) unresolved.
fn find_destination(record: &BirthdayRecord, destinations: &[Destination]) -> Option<Destination> {
    if let Some(id) = &record.group_id {
        if let Some(found) = destinations.iter().find(|d| &d.id == id) {
            return Some(found.clone());
        }
    }

    let wanted = record.group_name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    destinations
        .iter()
        .find(|d| d.name.trim().to_lowercase() == wanted)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::mock::{destination, MockPlatform};
    use crate::store::ReminderMeta;
    use tempfile::tempdir;

    fn setup(
        destinations: Vec<Destination>,
    ) -> (
        Arc<BirthdayStore>,
        Arc<MockPlatform>,
        ChannelResolver,
        tempfile::TempDir,
    ) {
        let dir = tempdir().unwrap();
        let store = Arc::new(BirthdayStore::load(dir.path().join("b.json")).unwrap());
        let platform = Arc::new(MockPlatform::new(destinations));
        let resolver = ChannelResolver::new(store.clone(), platform.clone());
        (store, platform, resolver, dir)
    }

    fn record(group_id: Option<&str>, group_name: &str) -> BirthdayRecord {
        BirthdayRecord {
            name: "Juan Perez".to_string(),
            date: "17-10".to_string(),
            group_id: group_id.map(|s| s.to_string()),
            group_name: group_name.to_string(),
            message: None,
            meta: ReminderMeta::default(),
        }
    }

    #[tokio::test]
    async fn prefers_matching_live_id() {
        let (store, _platform, resolver, _dir) =
            setup(vec![destination("G1", "Grupo A"), destination("G2", "Otro")]);
        let mut rec = record(Some("G1"), "Nombre Viejo");
        store.insert(rec.clone()).unwrap();

        let resolved = resolver.resolve(&mut rec).await.unwrap();
        assert_eq!(resolved.id, "G1");
        // Fast path does not touch the stored record
        assert_eq!(store.all()[0].group_id.as_deref(), Some("G1"));
    }

    #[tokio::test]
    async fn falls_back_to_name_and_repairs_id() {
        let (store, _platform, resolver, _dir) = setup(vec![destination("G9", "Grupo A")]);
        let mut rec = record(Some("DEAD"), "  grupo a ");
        store.insert(rec.clone()).unwrap();

        let resolved = resolver.resolve(&mut rec).await.unwrap();
        assert_eq!(resolved.id, "G9");
        assert_eq!(store.all()[0].group_id.as_deref(), Some("G9"));
        // The caller's copy carries the repaired id too
        assert_eq!(rec.group_id.as_deref(), Some("G9"));
    }

    #[tokio::test]
    async fn absent_id_resolves_by_name() {
        let (store, _platform, resolver, _dir) = setup(vec![destination("G5", "Grupo A")]);
        let mut rec = record(None, "Grupo A");
        store.insert(rec.clone()).unwrap();

        let resolved = resolver.resolve(&mut rec).await.unwrap();
        assert_eq!(resolved.id, "G5");
        assert_eq!(store.all()[0].group_id.as_deref(), Some("G5"));
    }

    #[tokio::test]
    async fn unresolved_is_a_typed_skip_condition() {
        let (store, _platform, resolver, _dir) = setup(vec![destination("G1", "Otro Grupo")]);
        let mut rec = record(None, "Grupo A");
        store.insert(rec.clone()).unwrap();

        let err = resolver.resolve(&mut rec).await.unwrap_err();
        assert_eq!(err, BotError::Unresolved("Grupo A".to_string()));
        // Nothing mutated
        assert_eq!(store.all()[0].group_id, None);
    }

    #[tokio::test]
    async fn repair_count_excludes_failed_persists() {
        let (store, _platform, resolver, dir) = setup(vec![destination("G9", "Grupo A")]);
        store.insert(record(Some("STALE"), "Grupo A")).unwrap();

        // Take the store's directory away so the persist fails
        std::fs::remove_dir_all(dir.path()).unwrap();

        assert_eq!(resolver.resolve_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resolve_all_reports_repair_count() {
        let (store, _platform, resolver, _dir) =
            setup(vec![destination("G7", "Grupo A"), destination("G8", "Grupo B")]);
        store.insert(record(Some("STALE"), "Grupo A")).unwrap();
        let mut other = record(None, "Grupo B");
        other.name = "Ana Gomez".to_string();
        store.insert(other).unwrap();
        let mut fine = record(Some("G7"), "Grupo A");
        fine.name = "Pedro Lopez".to_string();
        store.insert(fine).unwrap();

        let repaired = resolver.resolve_all().await.unwrap();
        assert_eq!(repaired, 2);

        // Second pass finds nothing left to repair
        assert_eq!(resolver.resolve_all().await.unwrap(), 0);
    }
}
