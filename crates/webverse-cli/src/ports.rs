//! Can this process publish lab ports below 1024? Several labs bind host port 80.

use serde_json::{json, Value};
use std::fs;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::Path;

const CAP_NET_BIND_SERVICE_BIT: u32 = 10;
const PROC_STATUS: &str = "/proc/self/status";
const UNPRIVILEGED_PORT_START: &str = "/proc/sys/net/ipv4/ip_unprivileged_port_start";
const LOW_BIND_PORTS: [u16; 12] = [1, 2, 7, 9, 11, 13, 19, 21, 23, 25, 81, 82];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Other => "other",
        }
    }
}

/// Effective user and group names, shown so the user knows who needs the permission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub groups: Vec<String>,
}

impl Identity {
    fn lines(&self) -> String {
        let groups = if self.groups.is_empty() {
            "(unknown)".to_string()
        } else {
            self.groups.join(", ")
        };
        format!("User: {}\nGroups: {}\n", self.user, groups)
    }
}

fn env_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
}

#[cfg(unix)]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

#[cfg(unix)]
fn current_identity() -> Identity {
    use std::ffi::CStr;

    // getpwuid/getgrgid hand back pointers into static storage; copy out before the next call.
    let user = unsafe {
        let pw = libc::getpwuid(libc::geteuid());
        if pw.is_null() || (*pw).pw_name.is_null() {
            None
        } else {
            Some(CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned())
        }
    }
    .or_else(env_user)
    .unwrap_or_else(|| "unknown".to_string());

    let mut gids: Vec<libc::gid_t> = Vec::new();
    let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
    if count > 0 {
        gids.resize(count as usize, 0);
        let filled = unsafe { libc::getgroups(count, gids.as_mut_ptr()) };
        gids.truncate(filled.max(0) as usize);
    }
    gids.push(unsafe { libc::getegid() });

    let mut groups: Vec<String> = gids
        .into_iter()
        .filter_map(|gid| unsafe {
            let gr = libc::getgrgid(gid);
            if gr.is_null() || (*gr).gr_name.is_null() {
                None
            } else {
                Some(CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned())
            }
        })
        .collect();
    groups.sort();
    groups.dedup();
    Identity { user, groups }
}

#[cfg(not(unix))]
fn current_identity() -> Identity {
    Identity {
        user: env_user().unwrap_or_else(|| "unknown".to_string()),
        groups: Vec::new(),
    }
}

fn status_field<'a>(status: &'a str, key: &str) -> Option<&'a str> {
    status.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    })
}

fn has_net_bind_service(status: &str) -> bool {
    status_field(status, "CapEff")
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .map_or(false, |mask| mask & (1 << CAP_NET_BIND_SERVICE_BIT) != 0)
}

/// Binds a handful of low ports on loopback; any success means we may bind privileged ports.
fn can_bind_low_port() -> bool {
    for port in LOW_BIND_PORTS {
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(_) => return true,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => return false,
            Err(_) => continue,
        }
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCheck {
    pub platform: Platform,
    pub is_root: bool,
    pub cap_net_bind_service: bool,
    pub unprivileged_port_start: Option<u32>,
    pub runtime_bind: bool,
    pub identity: Identity,
}

impl PortCheck {
    pub fn detect() -> Self {
        let platform = Platform::current();
        let mut check = Self {
            platform,
            is_root: is_root(),
            cap_net_bind_service: false,
            unprivileged_port_start: None,
            runtime_bind: false,
            identity: current_identity(),
        };
        if platform == Platform::Linux {
            let status = fs::read_to_string(PROC_STATUS).unwrap_or_default();
            check.cap_net_bind_service = has_net_bind_service(&status);
            check.unprivileged_port_start = fs::read_to_string(UNPRIVILEGED_PORT_START)
                .ok()
                .and_then(|raw| raw.trim().parse().ok());
            if !check.ok() {
                check.runtime_bind = can_bind_low_port();
            }
        }
        check
    }

    pub fn supported(&self) -> bool {
        self.platform != Platform::Other
    }

    /// macOS offers no capability or sysctl escape hatch, so only root passes there.
    pub fn ok(&self) -> bool {
        match self.platform {
            Platform::Linux => {
                self.is_root
                    || self.cap_net_bind_service
                    || self.unprivileged_port_start.map_or(false, |p| p <= 80)
                    || self.runtime_bind
            }
            Platform::MacOs => self.is_root,
            Platform::Other => true,
        }
    }

    pub fn remediation(&self, exe: &Path) -> String {
        let header = "Some labs publish port 80, which needs permission to bind privileged ports (<1024).\n\n";
        match self.platform {
            Platform::MacOs => format!(
                "{}{}\n\
                 Run with sudo:\n  sudo webverse\n\n\
                 Or change labs that use host port 80 to a high port (8080+) in docker-compose.yml\n",
                header,
                self.identity.lines()
            ),
            _ => {
                let sysctl = self
                    .unprivileged_port_start
                    .map_or_else(|| "(unknown)".to_string(), |p| p.to_string());
                format!(
                    "{}{}\
                     Linux sysctl net.ipv4.ip_unprivileged_port_start: {}\n\n\
                     Fix (recommended): grant CAP_NET_BIND_SERVICE to this binary:\n  \
                     sudo setcap 'cap_net_bind_service=+ep' '{}'\n\n\
                     Alternative:\n  sudo webverse\n\n\
                     Or change any lab using host port 80 to a high port (8080+) in its docker-compose.yml\n",
                    header,
                    self.identity.lines(),
                    sysctl,
                    exe.display()
                )
            }
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "platform": self.platform.as_str(),
            "supported": self.supported(),
            "ok": self.ok(),
            "is_root": self.is_root,
            "cap_net_bind_service": self.cap_net_bind_service,
            "unprivileged_port_start": self.unprivileged_port_start,
            "runtime_bind": self.runtime_bind,
            "user": self.identity.user,
            "groups": self.identity.groups
        })
    }
}
