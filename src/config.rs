use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

#[cfg(windows)]
const DEFAULT_HOSTS_PATH: &str = r"C:\Windows\System32\drivers\etc\hosts";
#[cfg(not(windows))]
const DEFAULT_HOSTS_PATH: &str = "/etc/hosts";

#[cfg(windows)]
const DEFAULT_NETWORK: &str = "nat";
#[cfg(not(windows))]
const DEFAULT_NETWORK: &str = "bridge";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Docker endpoint (`unix://`, `tcp://`, `npipe://`). Local defaults
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub hosts_path: PathBuf,
    /// Name of the tracked network.
    pub network: String,
    /// Set by the mere presence of the setting, unless it says false, 0,
    /// no or off.
    #[serde(deserialize_with = "flag_present")]
    pub verbose: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn flag_present<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(match Flag::deserialize(de)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Text(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            hosts_path: PathBuf::from(DEFAULT_HOSTS_PATH),
            network: DEFAULT_NETWORK.into(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("hostsync.toml"))
            .merge(Json::file("hostsync.json"))
            .merge(Env::prefixed("HOSTSYNC_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_settings() {
        Jail::expect_with(|_jail| {
            let cfg: Config = Config::figment().extract()?;
            assert_eq!(cfg.endpoint, None);
            assert_eq!(cfg.hosts_path, PathBuf::from(DEFAULT_HOSTS_PATH));
            assert_eq!(cfg.network, DEFAULT_NETWORK);
            assert!(!cfg.verbose);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hostsync.toml",
                r#"
                    endpoint = "tcp://127.0.0.1:2375"
                    network = "backend"
                "#,
            )?;
            jail.set_env("HOSTSYNC_HOSTS_PATH", "/tmp/hosts");
            jail.set_env("HOSTSYNC_NETWORK", "frontend");
            jail.set_env("HOSTSYNC_VERBOSE", "1");

            let cfg: Config = Config::figment().extract()?;
            assert_eq!(cfg.endpoint.as_deref(), Some("tcp://127.0.0.1:2375"));
            assert_eq!(cfg.hosts_path, PathBuf::from("/tmp/hosts"));
            assert_eq!(cfg.network, "frontend");
            assert!(cfg.verbose);
            Ok(())
        });
    }

    fn verbose_with(value: &str) -> bool {
        let mut verbose = None;
        Jail::expect_with(|jail| {
            jail.set_env("HOSTSYNC_VERBOSE", value);
            let cfg: Config = Config::figment().extract()?;
            verbose = Some(cfg.verbose);
            Ok(())
        });
        verbose.unwrap()
    }

    #[test]
    fn verbose_is_enabled_by_presence() {
        assert!(verbose_with("yes"));
        assert!(verbose_with("on"));
        assert!(verbose_with(""));
        assert!(verbose_with("true"));
        assert!(verbose_with("1"));
    }

    #[test]
    fn verbose_can_be_switched_off_explicitly() {
        assert!(!verbose_with("false"));
        assert!(!verbose_with("0"));
        assert!(!verbose_with("off"));
    }
}
