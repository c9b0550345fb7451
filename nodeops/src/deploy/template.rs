//! Role templates: key edits applied to the daemon's generated config files

use std::fmt;

use crate::models::target::{NodeTarget, Role};
use crate::remote::{shell_path, shell_quote};
use crate::storage::settings::NetworkSettings;

/// Config file under `<home>/config`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    /// CometBFT settings
    Config,

    /// Application settings
    App,
}

impl ConfigFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            ConfigFile::Config => "config.toml",
            ConfigFile::App => "app.toml",
        }
    }
}

/// Replace the value of one key. `value` is a TOML literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEdit {
    pub file: ConfigFile,

    /// Table the key lives in; `None` for top-level keys
    pub section: Option<String>,

    pub key: String,

    pub value: String,
}

impl ConfigEdit {
    pub fn new(file: ConfigFile, section: Option<&str>, key: &str, value: impl Into<String>) -> Self {
        Self {
            file,
            section: section.map(str::to_string),
            key: key.to_string(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ConfigEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{}: {}.{} = {}", self.file.file_name(), section, self.key, self.value),
            None => write!(f, "{}: {} = {}", self.file.file_name(), self.key, self.value),
        }
    }
}

/// TOML basic string literal
pub fn toml_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Edits that give a freshly initialized node its role
pub fn role_edits(role: Role, target: &NodeTarget, network: &NetworkSettings) -> Vec<ConfigEdit> {
    use ConfigFile::{App, Config};

    let mut edits = vec![
        ConfigEdit::new(Config, None, "moniker", toml_string(&target.moniker())),
        ConfigEdit::new(
            Config,
            Some("p2p"),
            "laddr",
            toml_string(&format!("tcp://0.0.0.0:{}", target.p2p_port)),
        ),
        ConfigEdit::new(Config, Some("p2p"), "external_address", toml_string(&target.p2p_address())),
        ConfigEdit::new(
            Config,
            Some("rpc"),
            "laddr",
            toml_string(&format!("tcp://0.0.0.0:{}", target.rpc_port)),
        ),
        ConfigEdit::new(
            App,
            Some("api"),
            "address",
            toml_string(&format!("tcp://0.0.0.0:{}", target.api_port)),
        ),
        ConfigEdit::new(App, None, "minimum-gas-prices", toml_string(&network.minimum_gas_prices)),
    ];

    match role {
        Role::Master => {
            edits.push(ConfigEdit::new(App, Some("api"), "enable", "true"));
            edits.push(ConfigEdit::new(Config, Some("p2p"), "pex", "true"));
            edits.push(ConfigEdit::new(Config, Some("p2p"), "persistent_peers", toml_string("")));
        }
        Role::Sync => {
            edits.push(ConfigEdit::new(App, Some("api"), "enable", "true"));
            edits.push(ConfigEdit::new(App, Some("api"), "swagger", "true"));
            edits.push(ConfigEdit::new(Config, Some("rpc"), "cors_allowed_origins", "[\"*\"]"));
        }
        Role::Validator => {
            edits.push(ConfigEdit::new(App, Some("api"), "enable", "false"));
            edits.push(ConfigEdit::new(Config, Some("consensus"), "double_sign_check_height", "10"));
        }
    }

    edits
}

fn regex_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '.' | '[' | ']' | '*' | '^' | '$' | '\\' | '/' | '|') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn replacement_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('&', "\\&").replace('|', "\\|")
}

/// sed expression for one edit. Sectioned keys are only replaced between the
/// section header and the next header; top-level keys only before the first.
pub fn sed_expression(edit: &ConfigEdit) -> String {
    let address = match &edit.section {
        Some(section) => format!("/^\\[{}\\]/,/^\\[/", regex_escape(section)),
        None => "1,/^\\[/".to_string(),
    };
    format!(
        "{} s|^{}[[:space:]]*=.*|{} = {}|",
        address,
        regex_escape(&edit.key),
        edit.key,
        replacement_escape(&edit.value)
    )
}

/// One shell command applying every edit under `home`
pub fn render_edit_script(home: &str, edits: &[ConfigEdit]) -> String {
    let home = home.trim_end_matches('/');
    edits
        .iter()
        .map(|edit| {
            format!(
                "sed -i {} {}",
                shell_quote(&sed_expression(edit)),
                shell_path(&format!("{}/config/{}", home, edit.file.file_name()))
            )
        })
        .collect::<Vec<_>>()
        .join(" && ")
}
