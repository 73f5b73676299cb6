//! On-disk registry document: atomic write-temp-then-rename persistence,
//! matching the workspace's convention for any file the supervisor or
//! router might read mid-write.

use orc_kernel::model::{DiscoveredModel, RegistryMeta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub meta: RegistryMeta,
    pub models: HashMap<String, DiscoveredModel>,
}

impl RegistryDocument {
    pub fn empty(meta: RegistryMeta) -> Self {
        Self {
            meta,
            models: HashMap::new(),
        }
    }

    pub async fn load(path: &Path) -> std::io::Result<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let doc = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
                Ok(Some(doc))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and write via a sibling temp file followed by a rename, so
    /// a reader never observes a half-written document.
    pub async fn persist(&self, path: &Path) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        let tmp_path = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_kernel::model::Tier;
    use std::path::PathBuf;

    fn sample_model() -> DiscoveredModel {
        DiscoveredModel {
            model_id: "m1".to_string(),
            path: PathBuf::from("/models/m1.gguf"),
            family: "m".to_string(),
            version: "1".to_string(),
            size_params_b: 7.0,
            quantization: "Q4_K_M".to_string(),
            is_thinking: false,
            is_coder: false,
            is_instruct: true,
            tier: Tier::Fast,
            port: Some(38001),
            enabled: true,
            overrides: Default::default(),
            tier_override: None,
            thinking_override: None,
        }
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let meta = RegistryMeta {
            scan_path: PathBuf::from("/models"),
            last_scan: chrono::Utc::now(),
            port_range: (38000, 38999),
            powerful_min_b: 30.0,
            fast_max_b: 8.0,
        };
        let mut doc = RegistryDocument::empty(meta);
        doc.models.insert("m1".to_string(), sample_model());
        doc.persist(&path).await.unwrap();

        let loaded = RegistryDocument::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.models.len(), 1);
        assert_eq!(loaded.models["m1"].port, Some(38001));
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert!(RegistryDocument::load(&path).await.unwrap().is_none());
    }
}
