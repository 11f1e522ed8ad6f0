//! `AppConfig`: every section of the TOML configuration file.
//!
//! ```toml
//! [sync]
//! workers = 16
//!
//! [entities.contact]
//! renames = { firstName = "FIRST_NAME" }
//!
//! [schemas.contact]
//! root = "contact"
//! fields = [
//!     { name = "FIRST_NAME", kind = "scalar", normalize = { type = "text" } },
//! ]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use twinsync_diff::{DiffSchema, Differ};
use twinsync_reconcile::ReconcileConfig;
use twinsync_retry::RetryPolicy;
use twinsync_server::ServerConfig;
use twinsync_store::TransportConfig;
use twinsync_sync::{EntityHandler, FieldRenameTranslator, HandlerRegistry, SyncConfig};
use twinsync_types::EntityType;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Field translation per entity type.
    #[serde(default)]
    pub entities: BTreeMap<String, FieldRenameTranslator>,
    /// Reconciliation schema per entity type.
    #[serde(default)]
    pub schemas: BTreeMap<String, DiffSchema>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.reconcile.validate()?;
        for name in self.entity_types() {
            EntityType::parse(name.as_str())
                .with_context(|| format!("invalid entity type {name:?}"))?;
        }
        for (name, schema) in &self.schemas {
            schema
                .validate()
                .with_context(|| format!("schema for {name}"))?;
        }
        if self.sync.workers == 0 {
            anyhow::bail!("sync.workers must be positive");
        }
        Ok(())
    }

    /// Every entity type named in `entities` or `schemas`, sorted.
    pub fn entity_types(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.entities.keys().chain(self.schemas.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// A handler for every configured entity type; types without a
    /// translation entry pass entities through unchanged.
    pub fn handlers(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        for name in self.entity_types() {
            let handler = match self.entities.get(&name) {
                Some(translator) => EntityHandler::new(name.as_str(), Arc::new(translator.clone())),
                None => EntityHandler::identity(name.as_str()),
            };
            registry.register(handler);
        }
        registry
    }

    pub fn differs(&self) -> anyhow::Result<HashMap<EntityType, Differ>> {
        self.schemas
            .iter()
            .map(|(name, schema)| {
                let differ = Differ::new(schema.clone())
                    .with_context(|| format!("schema for {name}"))?;
                Ok((EntityType::from(name.as_str()), differ))
            })
            .collect()
    }

    pub fn differ_for(&self, entity_type: &str) -> anyhow::Result<Differ> {
        let schema = self
            .schemas
            .get(entity_type)
            .with_context(|| format!("no schema configured for {entity_type}"))?;
        Ok(Differ::new(schema.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use twinsync_diff::FieldKind;
    use twinsync_types::MappingType;

    const SAMPLE: &str = r#"
[sync]
create_mapping_type = "MIGRATED"
workers = 4

[retry]
max_attempts = 5

[reconcile]
page_size = 50

[transport]
timeout_ms = 2500

[server]
bind_addr = "0.0.0.0:9090"

[entities.contact]
renames = { firstName = "FIRST_NAME" }

[schemas.court-case]
root = "case"
fields = [
    { name = "reference", kind = "scalar", normalize = { type = "text", case_insensitive = true } },
    { name = "appearances", kind = "collection", key = ["date"], fields = [
        { name = "date", kind = "scalar", normalize = { type = "date" } },
        { name = "outcome", kind = "scalar", normalize = { type = "code", aliases = { ACQ = "ACQUITTED" } } },
    ] },
]
"#;

    fn write(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_every_section() {
        let file = write(SAMPLE);
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.sync.create_mapping_type, MappingType::Migrated);
        assert_eq!(config.sync.workers, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.reconcile.page_size, 50);
        assert_eq!(config.reconcile.max_page_errors, 30);
        assert_eq!(config.transport.timeout_ms, 2500);
        assert_eq!(config.server.bind_addr.port(), 9090);
        assert_eq!(config.entity_types(), vec!["contact", "court-case"]);

        let schema = &config.schemas["court-case"];
        assert!(matches!(schema.fields[1].kind, FieldKind::Collection { .. }));
        assert_eq!(config.differs().unwrap().len(), 1);
        assert_eq!(config.handlers().len(), 2);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let file = write("");
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.sync.workers, SyncConfig::default().workers);
        assert!(config.handlers().is_empty());
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let file = write(
            r#"
[schemas.contact]
fields = [
    { name = "links", kind = "collection", key = ["missing"], fields = [
        { name = "id", kind = "scalar" },
    ] },
]
"#,
        );
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("schema for contact"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::load(Path::new("/nonexistent/twinsync.toml")).is_err());
        assert!(AppConfig::load_or_default(None).is_ok());
    }
}
