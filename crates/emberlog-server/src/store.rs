use anyhow::Context;
use emberlog_core::incident::{Incident, IncidentDraft};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// File-backed, latest-first collection of incidents.
///
/// Every mutation holds the write lock until its disk write has finished, so
/// concurrent requests can never interleave their read-modify-write cycles.
#[derive(Clone)]
pub struct IncidentStore {
    incidents: Arc<RwLock<Vec<Incident>>>,
    data_file: PathBuf,
}

impl IncidentStore {
    /// Loads `data_file` if it exists. A missing or unreadable file starts
    /// an empty store rather than failing startup.
    pub async fn open(data_file: PathBuf) -> Self {
        let incidents = match tokio::fs::read(&data_file).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Incident>>(&bytes) {
                Ok(incidents) => {
                    tracing::info!(count = incidents.len(), path = ?data_file, "Incidents loaded from file");
                    incidents
                }
                Err(e) => {
                    tracing::warn!(path = ?data_file, "Could not parse incidents file: {}", e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = ?data_file, "No incidents file yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(path = ?data_file, "Could not read incidents file: {}", e);
                Vec::new()
            }
        };
        crate::metrics::set_stored_incidents(incidents.len());

        Self {
            incidents: Arc::new(RwLock::new(incidents)),
            data_file,
        }
    }

    pub async fn create(&self, draft: IncidentDraft) -> Incident {
        let incident = Incident::new(draft);

        let mut incidents = self.incidents.write().await;
        incidents.insert(0, incident.clone());
        self.persist(&incidents).await;

        tracing::info!(id = %incident.id, title = %incident.title, incident_type = %incident.incident_type, "Incident created");
        incident
    }

    /// Snapshot of the collection; later mutations do not affect it.
    pub async fn get_all(&self) -> Vec<Incident> {
        self.incidents.read().await.clone()
    }

    #[cfg(test)]
    pub async fn find_by_id(&self, id: &str) -> Option<Incident> {
        let incidents = self.incidents.read().await;
        index_of(&incidents, id).map(|idx| incidents[idx].clone())
    }

    /// Returns `None` without touching the disk when `id` is unknown.
    pub async fn update(&self, id: &str, draft: IncidentDraft) -> Option<Incident> {
        let mut incidents = self.incidents.write().await;
        let Some(idx) = index_of(&incidents, id) else {
            tracing::warn!(id, "Attempted to update non-existent incident");
            return None;
        };
        let existing = &mut incidents[idx];
        existing.apply(draft);
        let updated = existing.clone();
        self.persist(&incidents).await;

        tracing::info!(id, title = %updated.title, "Incident updated");
        Some(updated)
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut incidents = self.incidents.write().await;
        let Some(idx) = index_of(&incidents, id) else {
            tracing::warn!(id, "Attempted to delete non-existent incident");
            return false;
        };
        incidents.remove(idx);
        self.persist(&incidents).await;

        tracing::info!(id, "Incident deleted");
        true
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    /// Rewrites the whole file. Failures are logged and swallowed: the
    /// in-memory state stays authoritative until the next successful write.
    async fn persist(&self, incidents: &[Incident]) {
        crate::metrics::set_stored_incidents(incidents.len());
        match write_atomically(&self.data_file, incidents).await {
            Ok(()) => tracing::debug!(count = incidents.len(), "Incidents saved to file"),
            Err(e) => {
                crate::metrics::record_persist_failure();
                tracing::error!(path = ?self.data_file, "Could not save incidents to file: {:#}", e);
            }
        }
    }
}

fn index_of(incidents: &[Incident], id: &str) -> Option<usize> {
    incidents.iter().position(|i| i.id == id)
}

async fn write_atomically(path: &Path, incidents: &[Incident]) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(incidents).context("serialize incidents")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename onto {}", path.display()))?;
    Ok(())
}
