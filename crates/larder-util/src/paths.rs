//! Default paths for larder components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/larder/config.toml` or `~/.config/larder/config.toml`
//! - Data: `$XDG_DATA_HOME/larder` or `~/.local/share/larder`

use std::path::{Path, PathBuf};

use crate::{ChannelKey, LarderError, Result};

/// Environment variable for overriding the config file path
pub const LARDER_CONFIG_ENV: &str = "LARDER_CONFIG";

/// Environment variable for overriding the data directory
pub const LARDER_DATA_DIR_ENV: &str = "LARDER_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "larder";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$LARDER_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/larder/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/larder/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(LARDER_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home)
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$LARDER_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/larder` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/larder` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(LARDER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking LARDER_DATA_DIR env var.
/// Used for default values in configs where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Check that `name` is a bare file name with no directory components
pub fn ensure_bare_file_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let is_bare = !name.is_empty()
        && name != "."
        && name != ".."
        && path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false);

    if is_bare {
        Ok(())
    } else {
        Err(LarderError::NotABareFileName(name.to_string()))
    }
}

/// Resolve where a per-channel file lives.
///
/// With channel-specific storage the file goes in a directory named after
/// the folded channel (created if missing); otherwise all channels share
/// `data_dir/file_name`.
pub fn channel_filename(
    data_dir: &Path,
    channel: &ChannelKey,
    file_name: &str,
    channel_specific: bool,
) -> Result<PathBuf> {
    // The folded name becomes a directory, so it must stay a single component
    if !channel.is_channel()
        || channel.as_str().contains(['/', '\\'])
        || ensure_bare_file_name(channel.folded()).is_err()
    {
        return Err(LarderError::NotAChannel(channel.to_string()));
    }
    ensure_bare_file_name(file_name)?;

    if !channel_specific {
        return Ok(data_dir.join(file_name));
    }

    let dir = data_dir.join(channel.folded());
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|source| LarderError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(dir.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_contains_larder() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("larder"));
    }

    #[test]
    fn bare_file_names() {
        assert!(ensure_bare_file_name("Seen.db").is_ok());
        assert!(ensure_bare_file_name("sub/Seen.db").is_err());
        assert!(ensure_bare_file_name("..").is_err());
        assert!(ensure_bare_file_name("").is_err());
    }

    #[test]
    fn channel_specific_file_gets_its_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ChannelKey::new("#Rust");

        let path = channel_filename(dir.path(), &channel, "Seen.db", true).unwrap();

        assert_eq!(path, dir.path().join("#rust").join("Seen.db"));
        assert!(dir.path().join("#rust").is_dir());
    }

    #[test]
    fn shared_file_lives_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ChannelKey::new("#rust");

        let path = channel_filename(dir.path(), &channel, "Seen.db", false).unwrap();

        assert_eq!(path, dir.path().join("Seen.db"));
        assert!(!dir.path().join("#rust").exists());
    }

    #[test]
    fn non_channel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = channel_filename(dir.path(), &ChannelKey::new("nick"), "Seen.db", true);
        assert!(matches!(result, Err(LarderError::NotAChannel(_))));
    }

    #[test]
    fn channels_that_leave_the_data_dir_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");

        for name in ["#../../outside", "#a/b", "#..\\outside", "&/etc"] {
            for channel_specific in [true, false] {
                let result =
                    channel_filename(&data_dir, &ChannelKey::new(name), "Seen.db", channel_specific);
                assert!(
                    matches!(result, Err(LarderError::NotAChannel(_))),
                    "{} accepted",
                    name
                );
            }
        }
        assert!(!root.path().join("outside").exists());
        assert!(!data_dir.exists());

        // Dots inside a single component are harmless
        let path = channel_filename(&data_dir, &ChannelKey::new("#.."), "Seen.db", true).unwrap();
        assert_eq!(path, data_dir.join("#..").join("Seen.db"));
    }
}
