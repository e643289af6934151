use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Lifecycle commands emitted verbatim as `PreUp`/`PostUp`/`PreDown`/`PostDown`.
///
/// They are run by the daemon that consumes the file, never by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
    pub pre_up: Option<String>,
    pub post_up: Option<String>,
    pub pre_down: Option<String>,
    pub post_down: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub interface_name: String,
    pub wg_conf_dir: Option<PathBuf>,
    pub records_file: String,
    pub default_endpoint: String,
    pub listen_port: u16,
    pub persistent_keepalive: u16,
    pub mtu: u16,
    #[serde(default)]
    pub hooks: Hooks,
    pub reload_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface_name: "wg0".to_string(),
            wg_conf_dir: Some(PathBuf::from("/etc/wireguard")),
            records_file: "records.json".to_string(),
            default_endpoint: "wireguard.example.com:51820".to_string(),
            listen_port: 51820,
            persistent_keepalive: 25,
            mtu: 0,
            hooks: Hooks::default(),
            reload_command: None,
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.interface_name.is_empty() {
            return Err(Error::InvalidConfig(
                "interface_name must not be empty".to_string(),
            ));
        }

        if self.interface_name.contains(['/', '\\']) {
            return Err(Error::InvalidConfig(format!(
                "interface_name {} must not contain path separators",
                self.interface_name
            )));
        }

        if self.records_file.is_empty() {
            return Err(Error::InvalidConfig(
                "records_file must not be empty".to_string(),
            ));
        }

        if self.listen_port == 0 {
            return Err(Error::InvalidConfig(
                "listen_port must be greater than 0".to_string(),
            ));
        }

        if self.default_endpoint.is_empty() {
            return Err(Error::InvalidConfig(
                "default_endpoint must not be empty".to_string(),
            ));
        }

        let hooks = [
            ("pre_up", &self.hooks.pre_up),
            ("post_up", &self.hooks.post_up),
            ("pre_down", &self.hooks.pre_down),
            ("post_down", &self.hooks.post_down),
        ];
        for (name, hook) in hooks {
            if hook.as_deref().is_some_and(|cmd| cmd.chars().any(char::is_control)) {
                return Err(Error::InvalidConfig(format!(
                    "hook {} must be a single line",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Overrides fields from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overrides fields from any key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(name) = get("WG_INTERFACE_NAME") {
            self.interface_name = name;
        }
        if let Some(dir) = get("WG_CONF_DIR") {
            self.wg_conf_dir = Some(PathBuf::from(dir));
        }
        if let Some(file) = get("WG_RECORDS_FILE") {
            self.records_file = file;
        }
        if let Some(cmd) = get("SERVER_PREUP_HOOK") {
            self.hooks.pre_up = Some(cmd);
        }
        if let Some(cmd) = get("SERVER_POSTUP_HOOK") {
            self.hooks.post_up = Some(cmd);
        }
        if let Some(cmd) = get("SERVER_PREDOWN_HOOK") {
            self.hooks.pre_down = Some(cmd);
        }
        if let Some(cmd) = get("SERVER_POSTDOWN_HOOK") {
            self.hooks.post_down = Some(cmd);
        }
        if let Some(cmd) = get("SERVER_RELOAD_CMD") {
            self.reload_command = Some(cmd);
        }
    }

    /// Path of the generated daemon config, `<wg_conf_dir>/<interface_name>.conf`.
    ///
    /// `None` when no output directory is configured.
    pub fn wg_config_path(&self) -> Option<PathBuf> {
        self.wg_conf_dir
            .as_ref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(format!("{}.conf", self.interface_name)))
    }
}
