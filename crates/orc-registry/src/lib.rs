//! Concrete [`ModelRegistry`] implementation: scans a models directory,
//! assigns tiers and ports, and persists the result as a JSON document.

mod discovery;
mod store;

pub use discovery::{is_model_file, parse_stem, ParsedModel};
pub use store::RegistryDocument;

use async_trait::async_trait;
use orc_kernel::model::{
    DiscoveredModel, ModelPatch, ModelRegistry, RegistryError, RegistryMeta, RegistryResult, Tier,
};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File-backed [`ModelRegistry`]. Cheap to clone; state is shared via `Arc`.
#[derive(Clone)]
pub struct JsonModelRegistry {
    persist_path: PathBuf,
    inner: Arc<RwLock<RegistryDocument>>,
}

impl JsonModelRegistry {
    /// Load an existing registry document from `persist_path`, or start
    /// from an empty one seeded with `meta` defaults if none exists yet.
    pub async fn open(persist_path: PathBuf, default_meta: RegistryMeta) -> RegistryResult<Self> {
        let doc = RegistryDocument::load(&persist_path)
            .await?
            .unwrap_or_else(|| RegistryDocument::empty(default_meta));
        Ok(Self {
            persist_path,
            inner: Arc::new(RwLock::new(doc)),
        })
    }

    fn assign_tier(meta: &RegistryMeta, size_params_b: f64) -> Tier {
        if size_params_b >= meta.powerful_min_b {
            Tier::Powerful
        } else if size_params_b <= meta.fast_max_b {
            Tier::Fast
        } else {
            Tier::Balanced
        }
    }

    fn allocate_port(meta: &RegistryMeta, taken: &std::collections::HashSet<u16>) -> Option<u16> {
        (meta.port_range.0..=meta.port_range.1).find(|p| !taken.contains(p))
    }

    async fn persist(&self) -> RegistryResult<()> {
        let snapshot = self.inner.read().clone();
        snapshot.persist(&self.persist_path).await?;
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for JsonModelRegistry {
    async fn scan(&self, root_path: PathBuf) -> RegistryResult<()> {
        if !root_path.is_dir() {
            return Err(RegistryError::InvalidPath(format!(
                "{} is not a directory",
                root_path.display()
            )));
        }

        let mut entries = tokio::fs::read_dir(&root_path).await?;
        let mut discovered = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || !is_model_file(file_name) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name);
            let Some(parsed) = parse_stem(stem) else {
                debug!(file = %file_name, "skipping file with no recognizable size token");
                continue;
            };
            let model_id = format!(
                "{}-{}b-{}",
                parsed.family,
                parsed.size_params_b,
                parsed.quantization.to_lowercase()
            );
            discovered.push((model_id, path, parsed));
        }

        let mut doc = self.inner.write();
        let meta = doc.meta.clone();
        let mut taken_ports: std::collections::HashSet<u16> =
            doc.models.values().filter_map(|m| m.port).collect();

        let mut seen_ids = std::collections::HashSet::new();
        for (model_id, path, parsed) in discovered {
            seen_ids.insert(model_id.clone());
            if let Some(existing) = doc.models.get_mut(&model_id) {
                // Re-scanned: keep operator-set attributes, refresh the path.
                existing.path = path;
                continue;
            }

            let tier = Self::assign_tier(&meta, parsed.size_params_b);
            let port = Self::allocate_port(&meta, &taken_ports)
                .ok_or(RegistryError::PortExhausted)?;
            taken_ports.insert(port);

            let model = DiscoveredModel {
                model_id: model_id.clone(),
                path,
                family: parsed.family,
                version: "1".to_string(),
                size_params_b: parsed.size_params_b,
                quantization: parsed.quantization,
                is_thinking: parsed.is_thinking,
                is_coder: parsed.is_coder,
                is_instruct: parsed.is_instruct,
                tier,
                port: Some(port),
                enabled: false,
                overrides: discovery::default_overrides(),
                tier_override: None,
                thinking_override: None,
            };
            info!(model_id = %model_id, tier = %tier, port, "discovered model");
            doc.models.insert(model_id, model);
        }

        let vanished: Vec<String> = doc
            .models
            .keys()
            .filter(|id| !seen_ids.contains(*id))
            .cloned()
            .collect();
        for id in vanished {
            warn!(model_id = %id, "model file no longer present in scan path");
        }

        doc.meta.scan_path = root_path;
        doc.meta.last_scan = chrono::Utc::now();
        drop(doc);
        self.persist().await
    }

    async fn get(&self, model_id: &str) -> RegistryResult<DiscoveredModel> {
        self.inner
            .read()
            .models
            .get(model_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownModel(model_id.to_string()))
    }

    async fn update(&self, model_id: &str, patch: ModelPatch) -> RegistryResult<DiscoveredModel> {
        {
            let mut doc = self.inner.write();
            if let Some(port) = patch.port {
                let conflict = doc
                    .models
                    .iter()
                    .any(|(id, m)| id != model_id && m.enabled && m.port == Some(port));
                if conflict {
                    return Err(RegistryError::PortConflict(port));
                }
            }
            let model = doc
                .models
                .get_mut(model_id)
                .ok_or_else(|| RegistryError::UnknownModel(model_id.to_string()))?;
            if let Some(tier) = patch.tier {
                model.tier = tier;
            }
            if let Some(tier_override) = patch.tier_override {
                model.tier_override = tier_override;
            }
            if let Some(thinking_override) = patch.thinking_override {
                model.thinking_override = thinking_override;
            }
            if let Some(port) = patch.port {
                model.port = Some(port);
            }
            if let Some(overrides) = patch.overrides {
                model.overrides = overrides;
            }
        }
        self.persist().await?;
        self.get(model_id).await
    }

    async fn enable(&self, model_id: &str) -> RegistryResult<()> {
        {
            let mut doc = self.inner.write();
            let model = doc
                .models
                .get_mut(model_id)
                .ok_or_else(|| RegistryError::UnknownModel(model_id.to_string()))?;
            model.enabled = true;
        }
        self.persist().await
    }

    async fn disable(&self, model_id: &str) -> RegistryResult<()> {
        {
            let mut doc = self.inner.write();
            let model = doc
                .models
                .get_mut(model_id)
                .ok_or_else(|| RegistryError::UnknownModel(model_id.to_string()))?;
            model.enabled = false;
        }
        self.persist().await
    }

    async fn get_enabled(&self) -> Vec<DiscoveredModel> {
        self.inner
            .read()
            .models
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect()
    }

    async fn list_all(&self) -> Vec<DiscoveredModel> {
        self.inner.read().models.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_kernel::model::RegistryMeta;

    fn meta() -> RegistryMeta {
        RegistryMeta {
            scan_path: PathBuf::from("/models"),
            last_scan: chrono::Utc::now(),
            port_range: (38000, 38002),
            powerful_min_b: 30.0,
            fast_max_b: 8.0,
        }
    }

    async fn registry_with_files(files: &[&str]) -> (JsonModelRegistry, tempfile::TempDir) {
        let models_dir = tempfile::tempdir().unwrap();
        for f in files {
            tokio::fs::write(models_dir.path().join(f), b"stub").await.unwrap();
        }
        let state_dir = tempfile::tempdir().unwrap();
        let registry = JsonModelRegistry::open(state_dir.path().join("registry.json"), meta())
            .await
            .unwrap();
        registry.scan(models_dir.path().to_path_buf()).await.unwrap();
        (registry, models_dir)
    }

    #[tokio::test]
    async fn scan_assigns_tiers_by_size() {
        let (registry, _dir) = registry_with_files(&[
            "qwen2.5-4b-instruct-q4_k_m.gguf",
            "qwen2.5-14b-instruct-q4_k_m.gguf",
            "qwen2.5-70b-instruct-q4_k_m.gguf",
        ])
        .await;
        let models = registry.list_all().await;
        assert_eq!(models.len(), 3);
        let by_size = |b: f64| models.iter().find(|m| m.size_params_b == b).unwrap().tier;
        assert_eq!(by_size(4.0), Tier::Fast);
        assert_eq!(by_size(14.0), Tier::Balanced);
        assert_eq!(by_size(70.0), Tier::Powerful);
    }

    #[tokio::test]
    async fn scan_allocates_distinct_ports() {
        let (registry, _dir) = registry_with_files(&[
            "qwen2.5-4b-instruct-q4_k_m.gguf",
            "qwen2.5-14b-instruct-q4_k_m.gguf",
        ])
        .await;
        let models = registry.list_all().await;
        let ports: std::collections::HashSet<_> = models.iter().filter_map(|m| m.port).collect();
        assert_eq!(ports.len(), 2);
    }

    #[tokio::test]
    async fn rescanning_preserves_enabled_flag() {
        let (registry, dir) = registry_with_files(&["qwen2.5-4b-instruct-q4_k_m.gguf"]).await;
        let models = registry.list_all().await;
        let id = models[0].model_id.clone();
        registry.enable(&id).await.unwrap();

        registry.scan(dir.path().to_path_buf()).await.unwrap();
        let model = registry.get(&id).await.unwrap();
        assert!(model.enabled);
    }

    #[tokio::test]
    async fn update_rejects_port_conflict_with_enabled_model() {
        let (registry, _dir) = registry_with_files(&[
            "qwen2.5-4b-instruct-q4_k_m.gguf",
            "qwen2.5-14b-instruct-q4_k_m.gguf",
        ])
        .await;
        let models = registry.list_all().await;
        let a = &models[0];
        let b = &models[1];
        registry.enable(&a.model_id).await.unwrap();

        let patch = ModelPatch {
            port: a.port,
            ..Default::default()
        };
        let result = registry.update(&b.model_id, patch).await;
        assert!(matches!(result, Err(RegistryError::PortConflict(_))));
    }

    #[tokio::test]
    async fn unknown_model_errors() {
        let (registry, _dir) = registry_with_files(&[]).await;
        let result = registry.get("nope").await;
        assert!(matches!(result, Err(RegistryError::UnknownModel(_))));
    }
}
