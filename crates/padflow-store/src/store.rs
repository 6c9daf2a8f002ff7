use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use padflow_control::{ControllerConfiguration, ControllerLayout, Fingerprint};

use crate::parse::{parse_configuration, render_configuration};
use crate::{Result, StoreError};

const DEFAULT_STORE_PATH: &str = ".config/padflow";
const FILE_EXTENSION: &str = "yaml";

/// Directory of configuration documents, one per layout fingerprint.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Opens the store at `path`, or at [`ConfigStore::default_path`].
    /// The directory is created if missing.
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            fs::create_dir_all(&path)?;
        } else if !path.is_dir() {
            return Err(StoreError::PathIsNotDirectory(path.display().to_string()));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_path() -> Result<PathBuf> {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(DEFAULT_STORE_PATH))
            .map_err(|_| StoreError::EnvVarNotSet("HOME".to_string()))
    }

    pub fn path_for(&self, fingerprint: Fingerprint) -> PathBuf {
        self.path.join(format!("{fingerprint}.{FILE_EXTENSION}"))
    }

    /// Writes `config`, replacing any earlier document for the layout.
    pub fn save(&self, config: &ControllerConfiguration, layout: &ControllerLayout) -> Result<PathBuf> {
        let yaml = render_configuration(config, layout)?;
        let path = self.path_for(layout.fingerprint());
        let staging = path.with_extension("yaml.tmp");
        fs::write(&staging, yaml)?;
        fs::rename(&staging, &path)?;
        Ok(path)
    }

    /// Reads the document saved for `layout`.
    pub fn load(&self, layout: &ControllerLayout) -> Result<ControllerConfiguration> {
        let input = fs::read_to_string(self.path_for(layout.fingerprint()))?;
        parse_configuration(&input, layout)
    }

    /// Like [`ConfigStore::load`], but falls back to a default configuration
    /// when nothing was saved for `layout`. Broken documents are still
    /// errors.
    pub fn load_or_default(&self, layout: &ControllerLayout) -> Result<ControllerConfiguration> {
        match self.load(layout) {
            Err(StoreError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                Ok(ControllerConfiguration::new(layout))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use padflow_control::ControlIndex;

    use super::*;

    fn layout() -> ControllerLayout {
        ControllerLayout::builder("Store Pad")
            .group("stick", |g| g.axis("x").axis("y"))
            .button("a")
            .build()
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Some(dir.path())).unwrap();
        let layout = layout();
        let mut config = ControllerConfiguration::new(&layout);
        config
            .control_mut(ControlIndex(1))
            .unwrap()
            .set_granularity(0.3)
            .unwrap();

        let path = store.save(&config, &layout).unwrap();
        assert_eq!(path, store.path_for(layout.fingerprint()));
        assert!(path.exists());
        assert_eq!(store.load(&layout).unwrap(), config);
    }

    #[test]
    fn missing_document_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Some(dir.path())).unwrap();
        let layout = layout();
        assert!(matches!(store.load(&layout), Err(StoreError::Io(_))));
        assert_eq!(
            store.load_or_default(&layout).unwrap(),
            ControllerConfiguration::new(&layout)
        );
    }

    #[test]
    fn broken_document_is_not_replaced_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Some(dir.path())).unwrap();
        let layout = layout();
        fs::write(store.path_for(layout.fingerprint()), "version: [").unwrap();
        assert!(matches!(
            store.load_or_default(&layout),
            Err(StoreError::Yaml(_))
        ));
    }

    #[test]
    fn creates_missing_directory_and_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        assert!(ConfigStore::new(Some(&nested)).is_ok());
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            ConfigStore::new(Some(&file)),
            Err(StoreError::PathIsNotDirectory(_))
        ));
    }
}
