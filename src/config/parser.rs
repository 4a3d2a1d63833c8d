//! Configuration parser for settings and component declarations.
//!
//! This module handles loading the settings file and the component
//! declaration files, applying environment overrides and `.env` files.

use crate::error::{ConfigError, HelmsyncError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{ComponentDeclaration, Settings};

/// Default settings file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["helmsync.yaml", "helmsync.yml"];

/// Extensions of component declaration files.
const DECLARATION_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Parser for settings and component declarations.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths and locating `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads settings from a YAML file.
    ///
    /// Relative paths are resolved against the file's directory unless a
    /// base path was set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());

        if !path.exists() {
            return Err(HelmsyncError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HelmsyncError::Config(ConfigError::parse(
                format!("Failed to read file: {e}"),
                path.display().to_string(),
            ))
        })?;

        let mut settings = self.parse_yaml(&content, Some(path))?;
        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        settings.resolve_paths(&base);

        Ok(settings)
    }

    /// Parses settings from a YAML string.
    ///
    /// An empty document yields the default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Settings> {
        debug!("Parsing YAML settings");

        if content.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            HelmsyncError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Loads settings with environment variable overrides.
    ///
    /// Recognized variables: `HELMSYNC_NAMESPACE`, `HELMSYNC_COMPONENTS_DIR`,
    /// `HELMSYNC_HELM_BINARY` and `HELMSYNC_KUBE_CONTEXT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Settings> {
        let mut settings = self.load_file(path)?;
        Self::apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Applies environment overrides read through `lookup`.
    fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(namespace) = lookup("HELMSYNC_NAMESPACE") {
            debug!("Overriding namespace from environment");
            settings.namespace = namespace;
        }

        if let Some(dir) = lookup("HELMSYNC_COMPONENTS_DIR") {
            debug!("Overriding components_dir from environment");
            settings.components_dir = PathBuf::from(dir);
        }

        if let Some(binary) = lookup("HELMSYNC_HELM_BINARY") {
            debug!("Overriding helm.binary from environment");
            settings.helm.binary = binary;
        }

        if let Some(context) = lookup("HELMSYNC_KUBE_CONTEXT") {
            debug!("Overriding helm.kube_context from environment");
            settings.helm.kube_context = Some(context);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HelmsyncError::Config(ConfigError::parse(
                    format!("Failed to load .env file: {e}"),
                    env_path.display().to_string(),
                ))
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Parses a single component declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_declaration(
        &self,
        content: &str,
        source: Option<&Path>,
    ) -> Result<ComponentDeclaration> {
        serde_yaml::from_str(content).map_err(|e| {
            HelmsyncError::Config(ConfigError::ParseError {
                message: format!("Invalid component declaration: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Loads every component declaration of a directory, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or a file is invalid.
    pub fn load_declarations(&self, dir: impl AsRef<Path>) -> Result<Vec<ComponentDeclaration>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(HelmsyncError::Config(ConfigError::FileNotFound {
                path: dir.to_path_buf(),
            }));
        }

        let read_error = |e: std::io::Error| {
            HelmsyncError::Config(ConfigError::parse(
                format!("Failed to list directory: {e}"),
                dir.display().to_string(),
            ))
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            let is_declaration = path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| DECLARATION_EXTENSIONS.contains(&ext));
            if is_declaration {
                files.push(path);
            }
        }
        files.sort();

        let mut declarations = Vec::with_capacity(files.len());
        for path in files {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                HelmsyncError::Config(ConfigError::parse(
                    format!("Failed to read file: {e}"),
                    path.display().to_string(),
                ))
            })?;
            declarations.push(self.parse_declaration(&content, Some(&path))?);
        }

        info!(
            "Loaded {} component declarations from {}",
            declarations.len(),
            dir.display()
        );
        Ok(declarations)
    }
}

/// Finds the settings file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no settings file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found settings file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HelmsyncError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
