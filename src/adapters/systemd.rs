//! systemd service adapter.
//!
//! Implements [`ServicePort`] with `systemctl is-active|start|stop <unit>`.

use std::process::{Command, Stdio};

use log::{debug, info};

use crate::app::ports::ServicePort;
use crate::error::{LinkError, Result};

use super::mctp_cli::with_sudo;

pub fn systemctl_args(verb: &str, unit: &str) -> Vec<String> {
    ["systemctl", verb, unit].map(String::from).to_vec()
}

pub struct SystemdService {
    unit: String,
    sudo: bool,
}

impl SystemdService {
    pub fn new(unit: impl Into<String>, sudo: bool) -> Self {
        Self {
            unit: unit.into(),
            sudo,
        }
    }

    fn systemctl(&self, verb: &str) -> Result<bool> {
        let argv = with_sudo(systemctl_args(verb, &self.unit), self.sudo);
        debug!("bus: running {:?}", argv);
        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|_| LinkError::CommandFailed("systemctl"))?;
        Ok(status.success())
    }
}

impl ServicePort for SystemdService {
    fn is_active(&mut self) -> Result<bool> {
        // Non-zero exit just means inactive.
        self.systemctl("is-active")
    }

    fn start(&mut self) -> Result<()> {
        info!("bus: starting {}", self.unit);
        if self.systemctl("start")? {
            Ok(())
        } else {
            Err(LinkError::CommandFailed("systemctl start").into())
        }
    }

    fn stop(&mut self) -> Result<()> {
        info!("bus: stopping {}", self.unit);
        if self.systemctl("stop")? {
            Ok(())
        } else {
            Err(LinkError::CommandFailed("systemctl stop").into())
        }
    }

    fn name(&self) -> &str {
        &self.unit
    }
}
