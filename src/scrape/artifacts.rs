//! Durable raw-response artifacts
//!
//! Every fetched payload is written to disk before extraction runs: one
//! `page_<N>.json` per search page and one `page_<N>/detail_<ID>.json` per
//! announcement detail. The extract step only ever reads these files, so it
//! can be replayed or resumed without network availability.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::fs;

use crate::Result;

/// One detail payload read back from disk.
#[derive(Debug, Clone)]
pub struct DetailArtifact {
    pub ad_id: i64,
    pub payload: Value,
    /// When the artifact was written (file modification time); recorded as
    /// the row's scrape timestamp on replay.
    pub scraped_date: DateTime<Utc>,
}

/// Filesystem store rooted at one run's output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store for a new run under `outputs_dir`, in a directory
    /// named by the run's start timestamp.
    pub fn create(outputs_dir: &Path) -> Self {
        let stamp = Utc::now().timestamp();
        Self {
            root: outputs_dir.join(stamp.to_string()),
        }
    }

    /// Open an existing run directory for replay.
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, page: u64) -> PathBuf {
        self.root.join(format!("page_{page}.json"))
    }

    fn page_dir(&self, page: u64) -> PathBuf {
        self.root.join(format!("page_{page}"))
    }

    fn detail_path(&self, page: u64, ad_id: i64) -> PathBuf {
        self.page_dir(page).join(format!("detail_{ad_id}.json"))
    }

    pub async fn write_page(&self, page: u64, payload: &Value) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        let content = serde_json::to_string_pretty(payload)?;
        fs::write(self.page_path(page), content).await?;
        Ok(())
    }

    pub async fn write_detail(&self, page: u64, ad_id: i64, payload: &Value) -> Result<()> {
        fs::create_dir_all(self.page_dir(page)).await?;
        let content = serde_json::to_string_pretty(payload)?;
        fs::write(self.detail_path(page, ad_id), content).await?;
        Ok(())
    }

    pub async fn read_page(&self, page: u64) -> Result<Value> {
        let content = fs::read_to_string(self.page_path(page)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Page numbers present in this run directory, ascending.
    pub async fn list_pages(&self) -> Result<Vec<u64>> {
        let mut pages = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(number) = name
                .strip_prefix("page_")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                if let Ok(page) = number.parse() {
                    pages.push(page);
                }
            }
        }
        pages.sort_unstable();
        Ok(pages)
    }

    /// All detail artifacts written for one page. A page with no detail
    /// directory yields an empty set, not an error.
    pub async fn read_details(&self, page: u64) -> Result<Vec<DetailArtifact>> {
        let dir = self.page_dir(page);
        let mut details = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(details),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(ad_id) = name
                .strip_prefix("detail_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|id| id.parse::<i64>().ok())
            else {
                continue;
            };

            let content = fs::read_to_string(entry.path()).await?;
            let payload = serde_json::from_str(&content)?;
            let scraped_date = entry
                .metadata()
                .await
                .ok()
                .and_then(|meta| meta.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);

            details.push(DetailArtifact {
                ad_id,
                payload,
                scraped_date,
            });
        }

        details.sort_by_key(|detail| detail.ad_id);
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_page_round_trip() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().to_path_buf());

        let payload = json!({"items": [{"id": 1}], "meta": {"totalPages": 3}});
        store.write_page(5, &payload).await.unwrap();

        assert_eq!(store.read_page(5).await.unwrap(), payload);
        assert_eq!(store.list_pages().await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_detail_artifacts_keyed_by_page_and_id() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().to_path_buf());

        store
            .write_detail(0, 111, &json!({"ad": {"id": 111}}))
            .await
            .unwrap();
        store
            .write_detail(0, 222, &json!({"ad": {"id": 222}}))
            .await
            .unwrap();
        // Overwriting the same key leaves exactly one artifact
        store
            .write_detail(0, 111, &json!({"ad": {"id": 111}}))
            .await
            .unwrap();

        let details = store.read_details(0).await.unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].ad_id, 111);
        assert_eq!(details[1].ad_id, 222);
    }

    #[tokio::test]
    async fn test_missing_detail_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().to_path_buf());
        store.write_page(3, &json!({"items": []})).await.unwrap();
        assert!(store.read_details(3).await.unwrap().is_empty());
    }
}
