//! Kernel MCTP link adapter built on the `mctp` and `ip` command-line tools.
//!
//! Implements [`LinkPort`]. `mctp link serial <dev>` blocks for as long
//! as the line discipline stays attached, so each bound device keeps its
//! child process until [`LinkPort::unbind`] kills it.
//!
//! Argument vectors come from pure functions so they can be checked
//! without running anything.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use log::{debug, warn};

use crate::app::ports::LinkPort;
use crate::error::{LinkError, Result};
use crate::mctp::eid::Eid;

pub fn bind_args(device: &str) -> Vec<String> {
    ["mctp", "link", "serial", device].map(String::from).to_vec()
}

pub fn link_up_args(interface: &str) -> Vec<String> {
    ["mctp", "link", "set", interface, "up"].map(String::from).to_vec()
}

pub fn address_add_args(eid: Eid, interface: &str) -> Vec<String> {
    let eid = eid.0.to_string();
    ["mctp", "address", "add", eid.as_str(), "dev", interface]
        .map(String::from)
        .to_vec()
}

pub fn list_links_args() -> Vec<String> {
    ["ip", "-o", "link", "show"].map(String::from).to_vec()
}

/// Prefix `argv` with `sudo` when asked to.
pub fn with_sudo(argv: Vec<String>, sudo: bool) -> Vec<String> {
    if sudo {
        let mut v = Vec::with_capacity(argv.len() + 1);
        v.push("sudo".to_string());
        v.extend(argv);
        v
    } else {
        argv
    }
}

/// Interface names from `ip -o link show` output.
///
/// Each line reads `<index>: <name>: <flags> ...`.
pub fn parse_interfaces(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(':').nth(1))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// A device bound with `mctp link serial`.
#[derive(Debug)]
pub struct SerialBinding {
    pub device: String,
    child: Child,
}

impl SerialBinding {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

pub struct MctpCliAdapter {
    sudo: bool,
}

impl MctpCliAdapter {
    pub fn new(sudo: bool) -> Self {
        Self { sudo }
    }

    fn command(&self, argv: Vec<String>) -> Command {
        let argv = with_sudo(argv, self.sudo);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd
    }

    fn run(&self, argv: Vec<String>, what: &'static str) -> Result<()> {
        debug!("bus: running {:?}", argv);
        let status = self
            .command(argv)
            .stdout(Stdio::null())
            .status()
            .map_err(|_| LinkError::CommandFailed(what))?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkError::CommandFailed(what).into())
        }
    }
}

impl LinkPort for MctpCliAdapter {
    type Handle = SerialBinding;

    fn interfaces(&mut self) -> Result<Vec<String>> {
        // Listing needs no privileges.
        let argv = list_links_args();
        let out = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|_| LinkError::CommandFailed("ip link show"))?;
        if !out.status.success() {
            return Err(LinkError::CommandFailed("ip link show").into());
        }
        Ok(parse_interfaces(&String::from_utf8_lossy(&out.stdout)))
    }

    fn bind_serial(&mut self, device: &str) -> Result<SerialBinding> {
        if !Path::new(device).exists() {
            return Err(LinkError::DeviceNotFound.into());
        }
        let child = self
            .command(bind_args(device))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|_| LinkError::CommandFailed("mctp link serial"))?;
        debug!("bus: bound {} (pid {})", device, child.id());
        Ok(SerialBinding {
            device: device.to_string(),
            child,
        })
    }

    fn set_up(&mut self, name: &str) -> Result<()> {
        self.run(link_up_args(name), "mctp link set up")
    }

    fn add_address(&mut self, eid: Eid, name: &str) -> Result<()> {
        self.run(address_add_args(eid, name), "mctp address add")
    }

    fn unbind(&mut self, mut handle: SerialBinding) -> Result<()> {
        // An already-exited child is fine; reap it either way.
        if let Err(e) = handle.child.kill() {
            debug!("bus: {} child already gone: {}", handle.device, e);
        }
        if let Err(e) = handle.child.wait() {
            warn!("bus: failed to reap {} child: {}", handle.device, e);
            return Err(LinkError::CommandFailed("mctp link serial").into());
        }
        Ok(())
    }
}
