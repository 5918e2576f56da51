//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements  | Connects to                        |
//! |------------|-------------|------------------------------------|
//! | `mctp_cli` | LinkPort    | `mctp` / `ip` command-line tools   |
//! | `systemd`  | ServicePort | `systemctl`                        |
//! | `clock`    | Clock       | `std::time::Instant`               |
//! | `log_sink` | EventSink   | `log` facade (text or JSON)        |
//! | `devices`  | (none)      | serial device discovery            |
//! | `tty`      | Transport   | serial device opened in user space |

pub mod clock;
pub mod devices;
pub mod log_sink;
pub mod mctp_cli;
pub mod systemd;
pub mod tty;
