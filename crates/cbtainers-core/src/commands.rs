//! Argument vectors for `couchbase-cli` and the socat proxy

use crate::model::Credentials;

const CLI: &str = "couchbase-cli";
const LOOPBACK: &str = "127.0.0.1";

pub const SERVICES: &str = "data,index,query,fts,analytics";

/// Per-service memory quotas in MiB
pub const RAM_QUOTAS: &[(&str, &str)] = &[
    ("--cluster-ramsize", "1024"),
    ("--cluster-index-ramsize", "512"),
    ("--cluster-eventing-ramsize", "512"),
    ("--cluster-fts-ramsize", "512"),
    ("--cluster-analytics-ramsize", "1024"),
];

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub fn cluster_init(credentials: &Credentials, cluster_name: &str) -> Vec<String> {
    let mut cmd = argv(&[
        CLI,
        "cluster-init",
        "-c",
        LOOPBACK,
        "--cluster-username",
        &credentials.username,
        "--cluster-password",
        &credentials.password,
        "--services",
        SERVICES,
    ]);
    for (flag, quota) in RAM_QUOTAS {
        cmd.push(flag.to_string());
        cmd.push(quota.to_string());
    }
    cmd.extend(argv(&[
        "--cluster-name",
        cluster_name,
        "--index-storage-setting",
        "default",
    ]));
    cmd
}

/// One batched `server-add` for every joining node
pub fn server_add(credentials: &Credentials, hostnames: &[String]) -> Vec<String> {
    argv(&[
        CLI,
        "server-add",
        "--cluster",
        LOOPBACK,
        "--username",
        &credentials.username,
        "--password",
        &credentials.password,
        "--server-add",
        &hostnames.join(","),
        "--server-add-username",
        &credentials.username,
        "--server-add-password",
        &credentials.password,
    ])
}

pub fn rebalance(credentials: &Credentials) -> Vec<String> {
    argv(&[
        CLI,
        "rebalance",
        "-c",
        LOOPBACK,
        "--username",
        &credentials.username,
        "--password",
        &credentials.password,
    ])
}

pub fn server_list(credentials: &Credentials) -> Vec<String> {
    argv(&[
        CLI,
        "server-list",
        "-c",
        LOOPBACK,
        "--username",
        &credentials.username,
        "--password",
        &credentials.password,
    ])
}

/// One member per non-empty line of `server-list` output
pub fn parse_server_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// socat arguments forwarding `listen_port` to `target:target_port`
pub fn socat_forward(listen_port: u16, target: &str, target_port: u16) -> Vec<String> {
    vec![
        format!("TCP-LISTEN:{},fork", listen_port),
        format!("TCP-CONNECT:{}:{}", target, target_port),
    ]
}
