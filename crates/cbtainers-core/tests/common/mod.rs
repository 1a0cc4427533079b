//! In-memory fabric that behaves like a single Docker host

#![allow(dead_code)]

use async_trait::async_trait;
use cbtainers_core::{
    ClusterNetwork, ComputeUnit, Error, ExecBackend, ExecSession, FabricGateway, OutputChunk,
    ReadinessProbe, Result, Sleeper, UnitRequest, UnitState, matches_prefix,
};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeUnit {
    pub name: String,
    pub image: String,
    pub network: String,
    pub address: String,
    pub running: bool,
    pub command: Option<Vec<String>>,
}

#[derive(Default)]
struct State {
    next_id: u32,
    units: BTreeMap<String, FakeUnit>,
    networks: BTreeMap<String, String>,
    pulled: Vec<String>,
    calls: Vec<String>,
    execs: Vec<(String, Vec<String>)>,
    exit_codes: HashMap<String, i64>,
    failures: HashMap<String, u32>,
    fail_after: HashMap<String, u32>,
    initialized: Vec<String>,
    members: Vec<String>,
}

#[derive(Default)]
pub struct FakeFabric {
    state: Mutex<State>,
}

impl FakeFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail. Exec failures are keyed
    /// as `exec:<subcommand>`, e.g. `exec:server-add`.
    pub fn fail(&self, op: &str, times: u32) {
        self.state.lock().unwrap().failures.insert(op.to_string(), times);
    }

    /// Let the first `allowed` calls of `op` through, then fail every call
    pub fn fail_after(&self, op: &str, allowed: u32) {
        self.state
            .lock()
            .unwrap()
            .fail_after
            .insert(op.to_string(), allowed);
    }

    pub fn add_network(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let id = format!("net-{}", name);
        state.networks.insert(name.to_string(), id);
    }

    pub fn add_running_unit(&self, name: &str, network: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("unit-{}", state.next_id);
        let address = format!("172.18.0.{}", state.next_id + 1);
        state.units.insert(
            id.clone(),
            FakeUnit {
                name: format!("/{}", name),
                image: "leftover".into(),
                network: network.to_string(),
                address,
                running: true,
                command: None,
            },
        );
        id
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c == op || c.starts_with(&format!("{} ", op)))
            .collect()
    }

    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().execs.clone()
    }

    pub fn execs_of(&self, subcommand: &str) -> Vec<(String, Vec<String>)> {
        self.execs()
            .into_iter()
            .filter(|(_, argv)| argv.get(1).map(String::as_str) == Some(subcommand))
            .collect()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains_key(name)
    }

    pub fn unit_named(&self, name: &str) -> Option<FakeUnit> {
        let wanted = format!("/{}", name);
        self.state
            .lock()
            .unwrap()
            .units
            .values()
            .find(|u| u.name == wanted)
            .cloned()
    }

    pub fn unit_count(&self) -> usize {
        self.state.lock().unwrap().units.len()
    }

    fn record(state: &mut State, call: String) {
        state.calls.push(call);
    }

    fn injected(state: &mut State, op: &str) -> bool {
        if let Some(allowed) = state.fail_after.get_mut(op) {
            if *allowed == 0 {
                return true;
            }
            *allowed -= 1;
        }
        match state.failures.get_mut(op) {
            Some(0) | None => false,
            Some(left) => {
                *left -= 1;
                true
            }
        }
    }

    fn check(state: &mut State, op: &str) -> Result<()> {
        if Self::injected(state, op) {
            Err(Error::Fabric(format!("injected {} failure", op)))
        } else {
            Ok(())
        }
    }

    /// Emulates the admin tool: init, add, list and rebalance
    fn run_admin(state: &mut State, unit_id: &str, argv: &[String]) -> (String, String, i64) {
        let subcommand = argv.get(1).cloned().unwrap_or_default();
        if Self::injected(state, &format!("exec:{}", subcommand)) {
            return (String::new(), format!("ERROR: injected {} failure", subcommand), 1);
        }
        let Some(unit) = state.units.get(unit_id).cloned() else {
            return (String::new(), "no such container".into(), 126);
        };
        let host = unit.name.trim_start_matches('/').to_string();
        match subcommand.as_str() {
            "cluster-init" => {
                if state.initialized.contains(&host) {
                    return (String::new(), "ERROR: cluster is already initialized".into(), 1);
                }
                state.initialized.push(host.clone());
                if state.members.is_empty() {
                    state.members.push(host);
                }
                ("SUCCESS: Cluster initialized\n".into(), String::new(), 0)
            }
            "server-add" => {
                let value = argv
                    .iter()
                    .position(|a| a == "--server-add")
                    .and_then(|i| argv.get(i + 1))
                    .cloned()
                    .unwrap_or_default();
                for added in value.split(',').filter(|s| !s.is_empty()) {
                    state.members.push(added.to_string());
                }
                ("SUCCESS: Server added\n".into(), String::new(), 0)
            }
            "server-list" => {
                let out: String = state
                    .members
                    .iter()
                    .map(|m| format!("ns_1@{} {}:8091 healthy active\n", m, m))
                    .collect();
                (out, String::new(), 0)
            }
            _ => (String::new(), String::new(), 0),
        }
    }
}

#[async_trait]
impl FabricGateway for FakeFabric {
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ComputeUnit>> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("list {}", prefix));
        Self::check(&mut state, "list")?;
        Ok(state
            .units
            .iter()
            .filter(|(_, u)| matches_prefix(&u.name, prefix))
            .map(|(id, u)| ComputeUnit {
                id: id.clone(),
                name: u.name.clone(),
                address: None,
                state: if u.running {
                    UnitState::Started
                } else {
                    UnitState::Created
                },
            })
            .collect())
    }

    async fn delete_matching(&self, prefix: &str) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("delete_matching {}", prefix));
        Self::check(&mut state, "delete_matching")?;
        let before = state.units.len();
        state.units.retain(|_, u| !matches_prefix(&u.name, prefix));
        Ok(before - state.units.len())
    }

    async fn create_network(&self, name: &str) -> Result<ClusterNetwork> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("create_network {}", name));
        Self::check(&mut state, "create_network")?;
        if state.networks.contains_key(name) {
            return Err(Error::Conflict {
                resource: format!("network {}", name),
                message: "network with name already exists".into(),
            });
        }
        let id = format!("net-{}", name);
        state.networks.insert(name.to_string(), id.clone());
        Ok(ClusterNetwork {
            id,
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("remove_network {}", name));
        Self::check(&mut state, "remove_network")?;
        if !state.networks.contains_key(name) {
            return Err(Error::not_found(format!("network {}", name)));
        }
        if state.units.values().any(|u| u.network == name) {
            return Err(Error::Fabric(format!(
                "error while removing network: network {} has active endpoints",
                name
            )));
        }
        state.networks.remove(name);
        Ok(())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("pull_image {}", reference));
        Self::check(&mut state, "pull_image")?;
        state.pulled.push(reference.to_string());
        Ok(())
    }

    async fn create_unit(&self, request: &UnitRequest) -> Result<ComputeUnit> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("create_unit {}", request.name));
        Self::check(&mut state, "create_unit")?;
        let name = format!("/{}", request.name);
        if state.units.values().any(|u| u.name == name) {
            return Err(Error::Conflict {
                resource: format!("container {}", request.name),
                message: "name already in use".into(),
            });
        }
        if !state.pulled.contains(&request.image) {
            return Err(Error::not_found(format!("image {}", request.image)));
        }
        state.next_id += 1;
        let id = format!("unit-{}", state.next_id);
        let address = format!("172.18.0.{}", state.next_id + 1);
        state.units.insert(
            id.clone(),
            FakeUnit {
                name: name.clone(),
                image: request.image.clone(),
                network: request.network.name.clone(),
                address,
                running: false,
                command: request.command.clone(),
            },
        );
        Ok(ComputeUnit {
            id,
            name,
            address: None,
            state: UnitState::Created,
        })
    }

    async fn start_unit(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("start_unit {}", id));
        Self::check(&mut state, "start_unit")?;
        let unit = state
            .units
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("container {}", id)))?;
        unit.running = true;
        Ok(())
    }

    async fn inspect_unit(&self, id: &str, network: &str) -> Result<ComputeUnit> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("inspect_unit {}", id));
        Self::check(&mut state, "inspect_unit")?;
        let unit = state
            .units
            .get(id)
            .ok_or_else(|| Error::not_found(format!("container {}", id)))?;
        if unit.network != network || !unit.running {
            return Err(Error::MissingAddress {
                unit: unit.name.clone(),
                network: network.to_string(),
            });
        }
        Ok(ComputeUnit {
            id: id.to_string(),
            name: unit.name.clone(),
            address: Some(unit.address.clone()),
            state: UnitState::Inspected,
        })
    }
}

#[async_trait]
impl ExecBackend for FakeFabric {
    async fn start_exec(&self, unit_id: &str, argv: &[String]) -> Result<ExecSession> {
        let mut state = self.state.lock().unwrap();
        state.execs.push((unit_id.to_string(), argv.to_vec()));
        let (stdout, stderr, exit_code) = Self::run_admin(&mut state, unit_id, argv);
        let id = format!("exec-{}", state.execs.len());
        state.exit_codes.insert(id.clone(), exit_code);
        let chunks = vec![
            Ok(OutputChunk::Stdout(stdout.into_bytes())),
            Ok(OutputChunk::Stderr(stderr.into_bytes())),
        ];
        Ok(ExecSession {
            id,
            output: stream::iter(chunks).boxed(),
        })
    }

    async fn exit_code(&self, exec_id: &str) -> Result<Option<i64>> {
        Ok(self.state.lock().unwrap().exit_codes.get(exec_id).copied())
    }
}

/// Probe that fails a fixed number of times before succeeding
#[derive(Default)]
pub struct FakeProbe {
    failures: AtomicU32,
    calls: AtomicU32,
    hosts: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn failing(times: u32) -> Self {
        Self {
            failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadinessProbe for FakeProbe {
    async fn probe(&self, host: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hosts.lock().unwrap().push(host.to_string());
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(Error::NotReady {
                url: format!("http://{}:8091/ui/index.html", host),
                reason: "status 503 Service Unavailable".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
