//! Configuration for pickarm.
//!
//! A single YAML file with servo, motion and cloud sections. Every field has
//! a default, so an empty file (or none at all) is valid for offline use.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{CloudConfig, GlobalConfig, MotionConfig, ServoConfig};

mod global;

pub type Config = GlobalConfig;

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. pickarm.yml in current directory (project config)
/// 3. ~/.config/pickarm/pickarm.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "motion:\n  settle-ms: 250").unwrap();

        let path = file.path().to_path_buf();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.motion.settle_ms, 250);
        assert_eq!(config.cloud.trigger_value, "waiting");
    }

    #[test]
    fn test_load_config_missing_explicit_path() {
        let path = PathBuf::from("/nonexistent/pickarm.yml");
        assert!(load_config(Some(&path)).is_err());
    }
}
