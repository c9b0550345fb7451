//! Remote shell commands issued by the deployment phases

use chrono::{DateTime, Utc};

use crate::models::target::NodeTarget;
use crate::remote::{shell_path, shell_quote};
use crate::storage::settings::{NetworkSettings, ServiceMode};

/// Exit status of `systemctl stop` for a unit that is not loaded
pub const SYSTEMCTL_NOT_LOADED_EXIT: i32 = 5;

/// Exit status of `pkill` when no process matched
pub const PKILL_NO_MATCH_EXIT: i32 = 1;

/// Connectivity check run with the short connect timeout
pub const REACHABILITY: &str = "true";

/// Remote operating system and machine
pub const UNAME: &str = "uname -sm";

fn home(network: &NetworkSettings) -> String {
    network.node_home.trim_end_matches('/').to_string()
}

/// Settings as seen by one node. A node with an instance suffix gets its
/// own home, staging directory and service name so that several nodes can
/// share a host.
pub fn for_node(network: &NetworkSettings, target: &NodeTarget) -> NetworkSettings {
    let mut node = network.clone();
    if let Some(instance) = target.instance() {
        node.node_home = format!("{}-{}", home(network), instance);
        node.staging_dir = format!("{}/{}", network.staging_dir.trim_end_matches('/'), instance);
        node.service_name = format!("{}-{}", network.service_name, instance);
    }
    node
}

fn config_file(network: &NetworkSettings, name: &str) -> String {
    format!("{}/config/{}", home(network), name)
}

/// Installed daemon path
pub fn daemon_path(network: &NetworkSettings) -> String {
    format!("{}/{}", network.install_dir.trim_end_matches('/'), network.daemon)
}

/// Staged upload path for a file name
pub fn staged(network: &NetworkSettings, name: &str) -> String {
    format!("{}/{}", network.staging_dir.trim_end_matches('/'), name)
}

pub fn stop_service(network: &NetworkSettings) -> String {
    match network.service_mode {
        ServiceMode::Systemd => format!("sudo systemctl stop {}", shell_quote(&network.service_name)),
        ServiceMode::Process => format!(
            "pkill -f {}",
            shell_path(&format!("{} start --home {}( |$)", network.daemon, home(network)))
        ),
    }
}

pub fn start_service(network: &NetworkSettings) -> String {
    match network.service_mode {
        ServiceMode::Systemd => format!(
            "sudo systemctl enable --now {}",
            shell_quote(&network.service_name)
        ),
        ServiceMode::Process => format!(
            "nohup {} start --home {} > {} 2>&1 < /dev/null &",
            shell_path(&daemon_path(network)),
            shell_path(&home(network)),
            shell_path(&format!("{}/node.log", home(network)))
        ),
    }
}

/// Exits 1 when the node has no data directory yet
pub fn data_dir_exists(network: &NetworkSettings) -> String {
    format!("test -d {}", shell_path(&format!("{}/data", home(network))))
}

/// Backup directory name, unique per run
pub fn backup_name(network: &NetworkSettings, at: DateTime<Utc>, run_id: &str) -> String {
    let short: String = run_id.chars().filter(|c| *c != '-').take(8).collect();
    format!(
        "{}-backup-{}-{}",
        network.daemon,
        at.format("%Y%m%dT%H%M%SZ"),
        short
    )
}

/// Full backup destination path
pub fn backup_path(network: &NetworkSettings, name: &str) -> String {
    format!("{}/{}", network.backup_dir.trim_end_matches('/'), name)
}

pub fn backup(network: &NetworkSettings, name: &str) -> String {
    format!(
        "mkdir -p {} && cp -a {} {}",
        shell_path(&network.backup_dir),
        shell_path(&home(network)),
        shell_path(&backup_path(network, name))
    )
}

pub fn make_staging_dir(network: &NetworkSettings) -> String {
    format!("mkdir -p {}", shell_path(&network.staging_dir))
}

pub fn install_binary(network: &NetworkSettings) -> String {
    format!(
        "sudo install -m 0755 {} {}",
        shell_path(&staged(network, &network.daemon)),
        shell_path(&daemon_path(network))
    )
}

/// systemd unit for the daemon, running as `user`
pub fn unit_file(network: &NetworkSettings, user: &str) -> String {
    format!(
        "[Unit]\n\
         Description={daemon} node\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         User={user}\n\
         ExecStart={bin} start --home {home}\n\
         Restart=on-failure\n\
         RestartSec=3\n\
         LimitNOFILE=65535\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        daemon = network.daemon,
        user = user,
        bin = daemon_path(network),
        home = home(network),
    )
}

/// Write the unit file and reload systemd. `$HOME` in the unit expands on
/// the remote host at install time.
pub fn install_unit(network: &NetworkSettings, user: &str) -> String {
    format!(
        "printf '%s' {} | sudo tee {} > /dev/null && sudo systemctl daemon-reload",
        shell_path(&unit_file(network, user)),
        shell_quote(&format!("/etc/systemd/system/{}.service", network.service_name))
    )
}

pub fn init_node(network: &NetworkSettings, moniker: &str) -> String {
    format!(
        "{} init {} --chain-id {} --home {} --overwrite",
        shell_path(&daemon_path(network)),
        shell_quote(moniker),
        shell_quote(&network.chain_id),
        shell_path(&home(network))
    )
}

pub fn install_genesis(network: &NetworkSettings) -> String {
    format!(
        "cp {} {}",
        shell_path(&staged(network, "genesis.json")),
        shell_path(&config_file(network, "genesis.json"))
    )
}

pub fn genesis_checksum(network: &NetworkSettings) -> String {
    format!("sha256sum {}", shell_path(&config_file(network, "genesis.json")))
}

/// Prints the `persistent_peers` line of config.toml, if any
pub fn read_persistent_peers(network: &NetworkSettings) -> String {
    format!(
        "grep -E '^persistent_peers[[:space:]]*=' {} || true",
        shell_path(&config_file(network, "config.toml"))
    )
}

/// Map `uname -sm` output to Go's (GOOS, GOARCH) naming
pub fn parse_uname(output: &str) -> Option<(String, String)> {
    let mut fields = output.split_whitespace();
    let os = fields.next()?.to_lowercase();
    let arch = match fields.next()? {
        "x86_64" | "amd64" => "amd64",
        "aarch64" | "arm64" => "arm64",
        "armv7l" | "armv6l" => "arm",
        "i686" | "i386" => "386",
        _ => return None,
    };
    Some((os, arch.to_string()))
}
