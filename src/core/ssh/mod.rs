mod client;

pub use client::{is_connection_failure, is_local_host, SshClient};
