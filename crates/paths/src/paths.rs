//! Path context for runtime environment detection and application paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies the runtime environment where the application is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    /// Running via `cargo run` or in development mode
    Development,
    /// Running as an installed binary in production
    Production,
}

/// Context for managing application paths.
///
/// Layout below the base path:
///
/// ```text
/// <base>/config.toml
/// <base>/drafts/<topic>/<name>.json
/// <base>/logs/<app_id>.<timestamp>.log
/// ```
#[derive(Debug, Clone)]
pub struct PathContext {
    /// The runtime environment (development or production)
    environment: RuntimeEnvironment,
    /// Base path for all application data
    base_path: Arc<Path>,
    /// Application identifier (e.g., "schemacast")
    app_id: &'static str,
}

impl PathContext {
    /// Creates a new PathContext with automatic environment detection.
    ///
    /// `<APP_ID>_HOME` (upper-cased) overrides the base path in every environment.
    pub fn new(app_id: &'static str) -> Self {
        let environment = Self::detect_environment();
        let base_path = Self::home_override(app_id)
            .unwrap_or_else(|| Self::determine_base_path(environment, app_id));

        Self {
            environment,
            base_path: base_path.into(),
            app_id,
        }
    }

    /// Creates a PathContext with an explicit base path (useful for testing).
    pub fn with_base_path(base_path: impl Into<PathBuf>, app_id: &'static str) -> Self {
        let environment = Self::detect_environment();

        Self {
            environment,
            base_path: base_path.into().into(),
            app_id,
        }
    }

    /// Name of the environment variable that overrides the base path.
    pub fn home_env_var(app_id: &str) -> String {
        format!("{}_HOME", app_id.to_ascii_uppercase())
    }

    fn home_override(app_id: &str) -> Option<PathBuf> {
        std::env::var_os(Self::home_env_var(app_id))
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    /// Detects the runtime environment based on executable location.
    fn detect_environment() -> RuntimeEnvironment {
        // If the executable is in a "target/debug" or "target/release" directory,
        // we're likely in development mode
        if let Ok(exe_path) = std::env::current_exe() {
            if exe_path.components().any(|c| c.as_os_str() == "target") {
                return RuntimeEnvironment::Development;
            }
        }

        if std::env::var("CARGO").is_ok() || std::env::var("CARGO_MANIFEST_DIR").is_ok() {
            return RuntimeEnvironment::Development;
        }

        RuntimeEnvironment::Production
    }

    /// Determines the base path based on the runtime environment.
    fn determine_base_path(environment: RuntimeEnvironment, app_id: &str) -> PathBuf {
        match environment {
            RuntimeEnvironment::Development => {
                // Keep development data out of the user's real config directory
                let root = std::env::var("CARGO_MANIFEST_DIR")
                    .map(PathBuf::from)
                    .or_else(|_| std::env::current_dir())
                    .unwrap_or_else(|_| PathBuf::from("."));
                root.join(".out").join(app_id)
            }
            RuntimeEnvironment::Production => dirs::config_dir()
                .or_else(dirs::home_dir)
                .map(|dir| dir.join(app_id))
                .unwrap_or_else(|| PathBuf::from(".").join(app_id)),
        }
    }

    /// Returns the runtime environment.
    pub fn environment(&self) -> RuntimeEnvironment {
        self.environment
    }

    /// Returns the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the app identifier.
    pub fn app_id(&self) -> &str {
        self.app_id
    }

    /// Returns the profile file path: `<base>/config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.base_path.join("config.toml")
    }

    /// Returns the drafts directory path: `<base>/drafts/`
    pub fn drafts_dir(&self) -> PathBuf {
        self.base_path.join("drafts")
    }

    /// Returns the drafts directory of one topic: `<base>/drafts/<topic>/`
    ///
    /// Path separators in the topic are replaced so a topic can never escape
    /// the drafts directory.
    pub fn topic_drafts_dir(&self, topic: &str) -> PathBuf {
        self.drafts_dir().join(sanitize_component(topic))
    }

    /// Returns the logs directory path: `<base>/logs/`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_path.join("logs")
    }

    /// Returns a log file path with timestamp: `<base>/logs/<app_id>.<timestamp>.log`
    pub fn log_file(&self, timestamp: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("{}.{}.log", self.app_id, timestamp))
    }

    /// Returns a log file path with current timestamp.
    pub fn log_file_now(&self) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        self.log_file(&timestamp)
    }

    /// Ensures all necessary directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        let dirs = [self.base_path.to_path_buf(), self.drafts_dir(), self.logs_dir()];

        for dir in dirs {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
            }
        }

        Ok(())
    }
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_context_structure() {
        let ctx = PathContext::with_base_path("/test/base", "schemacast");

        assert_eq!(ctx.app_id(), "schemacast");
        assert_eq!(ctx.base_path(), Path::new("/test/base"));
        assert_eq!(ctx.config_file(), PathBuf::from("/test/base/config.toml"));
    }

    #[test]
    fn test_draft_paths() {
        let ctx = PathContext::with_base_path("/base", "app");

        assert_eq!(ctx.drafts_dir(), PathBuf::from("/base/drafts"));
        assert_eq!(
            ctx.topic_drafts_dir("orders"),
            PathBuf::from("/base/drafts/orders")
        );
    }

    #[test]
    fn test_topic_cannot_escape_drafts_dir() {
        let ctx = PathContext::with_base_path("/base", "app");

        assert_eq!(
            ctx.topic_drafts_dir("../etc/passwd"),
            PathBuf::from("/base/drafts/.._etc_passwd")
        );
        assert_eq!(ctx.topic_drafts_dir(".."), PathBuf::from("/base/drafts/_"));
        assert_eq!(ctx.topic_drafts_dir(""), PathBuf::from("/base/drafts/_"));
    }

    #[test]
    fn test_log_file_path() {
        let ctx = PathContext::with_base_path("/base", "app");

        let log_path = ctx.log_file("20240315-120000");
        assert_eq!(
            log_path,
            PathBuf::from("/base/logs/app.20240315-120000.log")
        );
    }

    #[test]
    fn test_home_env_var_name() {
        assert_eq!(PathContext::home_env_var("schemacast"), "SCHEMACAST_HOME");
    }

    #[test]
    fn test_ensure_directories_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = PathContext::with_base_path(tmp.path().join("home"), "app");

        ctx.ensure_directories().unwrap();

        assert!(ctx.drafts_dir().is_dir());
        assert!(ctx.logs_dir().is_dir());
    }
}
