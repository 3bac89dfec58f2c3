//! Command-line configuration and logging of the load-balancer controller.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;

pub use self::args::{Args, Config, ConfigError, IpamConfig};
pub use lb_controller_k8s_index as index;
