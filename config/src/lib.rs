//! Configuration loading for Codex Plus: project `.env` and XDG
//! `config.toml`, applied to the process environment with priority
//! **existing env > .env > XDG**.
//!
//! The proxy reads plain environment variables everywhere else; this crate
//! is the single place that seeds them from files at startup.

mod dotenv;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads `[env]` entries from `~/.config/<app_name>/config.toml` and the
/// project `.env`, then sets each key that is **not** already present in the
/// process environment. When both files define a key, `.env` wins.
///
/// * `app_name`: XDG directory name, e.g. `"codex-plus"`.
/// * `override_dir`: when `Some`, look for `.env` there instead of the
///   current directory (used by tests).
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg = xdg_toml::load_env_map(app_name)?;
    let dotenv = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<&String> = xdg.keys().collect();
    keys.extend(dotenv.keys());

    for key in keys {
        if std::env::var(key).is_ok() {
            continue;
        }
        if let Some(value) = dotenv.get(key).or_else(|| xdg.get(key)) {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

/// Serialises tests that mutate shared process environment keys
/// (XDG_CONFIG_HOME); cargo runs test threads in one process.
#[cfg(test)]
pub(crate) fn env_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn restore_var(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    #[test]
    fn existing_env_wins() {
        env::set_var("CODEXPLUS_CFG_TEST_EXISTING", "from_env");
        let _ = load_and_apply("codex-plus", None);
        assert_eq!(
            env::var("CODEXPLUS_CFG_TEST_EXISTING").as_deref(),
            Ok("from_env")
        );
        env::remove_var("CODEXPLUS_CFG_TEST_EXISTING");
    }

    #[test]
    fn no_config_at_all_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_and_apply("codex-plus-nonexistent-app-xyz", Some(dir.path())).is_ok());
    }

    #[test]
    fn dotenv_beats_xdg() {
        let _env = crate::env_guard();
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("codex-plus");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nCODEXPLUS_CFG_TEST_PRIORITY = \"from_xdg\"\n",
        )
        .unwrap();

        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "CODEXPLUS_CFG_TEST_PRIORITY=from_dotenv\n",
        )
        .unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("CODEXPLUS_CFG_TEST_PRIORITY");

        let _ = load_and_apply("codex-plus", Some(dotenv_dir.path()));
        let got = env::var("CODEXPLUS_CFG_TEST_PRIORITY").unwrap();
        env::remove_var("CODEXPLUS_CFG_TEST_PRIORITY");
        restore_var("XDG_CONFIG_HOME", prev);

        assert_eq!(got, "from_dotenv");
    }

    #[test]
    fn xdg_applies_when_dotenv_missing() {
        let _env = crate::env_guard();
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("codex-plus");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nCODEXPLUS_CFG_TEST_XDG = \"from_xdg\"\n",
        )
        .unwrap();
        let empty = tempfile::tempdir().unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("CODEXPLUS_CFG_TEST_XDG");

        let _ = load_and_apply("codex-plus", Some(empty.path()));
        let got = env::var("CODEXPLUS_CFG_TEST_XDG").unwrap();
        env::remove_var("CODEXPLUS_CFG_TEST_XDG");
        restore_var("XDG_CONFIG_HOME", prev);

        assert_eq!(got, "from_xdg");
    }

    #[test]
    fn invalid_xdg_toml_is_a_parse_error() {
        let _env = crate::env_guard();
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("codex-plus");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "broken [[[\n").unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        let result = load_and_apply("codex-plus", None::<&std::path::Path>);
        restore_var("XDG_CONFIG_HOME", prev);

        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }
}
