//! Command-line front end

pub mod commands;

pub use commands::{cmd_node_start, cmd_wallet_new, cmd_wallet_show, parse_peers, CliResult};
