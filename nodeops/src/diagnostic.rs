//! Local host diagnostics for the operator workstation

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::storage::settings::Settings;

/// A tool nodeops shells out to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCheck {
    pub name: String,

    /// Resolved location on PATH
    pub path: Option<PathBuf>,
}

/// Host facts relevant to building and deploying
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDiagnostic {
    pub hostname: String,

    pub os: String,

    pub arch: String,

    pub cpu_count: usize,

    /// Total memory in bytes
    pub memory_total: u64,

    pub tools: Vec<ToolCheck>,
}

impl HostDiagnostic {
    pub fn missing_tools(&self) -> impl Iterator<Item = &ToolCheck> {
        self.tools.iter().filter(|t| t.path.is_none())
    }
}

/// Search PATH for an executable
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then_some(candidate);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Collect host facts and check the configured tools
pub fn collect(settings: &Settings) -> HostDiagnostic {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    let tools = [
        settings.build.go_binary.as_str(),
        settings.ssh.ssh_binary.as_str(),
        settings.ssh.scp_binary.as_str(),
    ]
    .into_iter()
    .map(|name| ToolCheck {
        name: name.to_string(),
        path: find_on_path(name),
    })
    .collect();

    HostDiagnostic {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        os: System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        arch: std::env::consts::ARCH.to_string(),
        cpu_count: sys.cpus().len(),
        memory_total: sys.total_memory(),
        tools,
    }
}
