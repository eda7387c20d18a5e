// File: topology.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

use crate::config::ParserConfig;
use crate::error::{HopchainError, HopchainResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HopId(String);

impl HopId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HopId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for HopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub id: HopId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub client: bool,
    #[serde(default)]
    pub config: ParserConfig,
}

impl Hop {
    pub fn new(id: &str, config: ParserConfig) -> Self {
        Self {
            id: HopId::from(id),
            label: id.to_string(),
            client: false,
            config,
        }
    }

    pub fn client(id: &str) -> Self {
        Self {
            id: HopId::from(id),
            label: id.to_string(),
            client: true,
            config: ParserConfig::default(),
        }
    }
}

/// Snapshot of the simulated network: hop records plus a flat list of
/// undirected edges. Queries work on ids only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub hops: Vec<Hop>,
    #[serde(default)]
    pub edges: Vec<(HopId, HopId)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> HopchainResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let topology: Topology = serde_json::from_str(&raw)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn save(&self, path: &Path) -> HopchainResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn add_hop(&mut self, hop: Hop) -> &mut Self {
        self.hops.push(hop);
        self
    }

    pub fn connect(&mut self, a: &str, b: &str) -> &mut Self {
        self.edges.push((HopId::from(a), HopId::from(b)));
        self
    }

    pub fn hop(&self, id: &HopId) -> Option<&Hop> {
        self.hops.iter().find(|hop| &hop.id == id)
    }

    pub fn hop_mut(&mut self, id: &HopId) -> Option<&mut Hop> {
        self.hops.iter_mut().find(|hop| &hop.id == id)
    }

    pub fn client(&self) -> Option<&Hop> {
        self.hops.iter().find(|hop| hop.client)
    }

    pub fn is_client(&self, id: &HopId) -> bool {
        self.hop(id).map(|hop| hop.client).unwrap_or(false)
    }

    pub fn validate(&self) -> HopchainResult<()> {
        let clients = self.hops.iter().filter(|hop| hop.client).count();
        if clients != 1 {
            return Err(HopchainError::Topology(format!(
                "expected exactly one client hop, found {}",
                clients
            )));
        }

        let mut seen = HashSet::new();
        for hop in &self.hops {
            if !seen.insert(&hop.id) {
                return Err(HopchainError::Topology(format!(
                    "duplicate hop id {}",
                    hop.id
                )));
            }
        }

        for (a, b) in &self.edges {
            for end in [a, b] {
                if !seen.contains(end) {
                    return Err(HopchainError::UnknownHop(end.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Hops sharing an edge with `id`, in edge order, without duplicates.
    pub fn direct_neighbors(&self, id: &HopId) -> Vec<HopId> {
        let mut neighbors: Vec<HopId> = Vec::new();
        for (a, b) in &self.edges {
            let other = if a == id {
                b
            } else if b == id {
                a
            } else {
                continue;
            };
            if other != id && !neighbors.contains(other) {
                neighbors.push(other.clone());
            }
        }
        neighbors
    }

    /// Hops strictly between the client and `id`, ordered from the client
    /// side. `None` when `id` is the client, unknown, or unreachable.
    pub fn path_to_client(&self, id: &HopId) -> Option<Vec<HopId>> {
        let client = match self.client() {
            Some(client) => client.id.clone(),
            None => {
                warn!("Topology has no client hop");
                return None;
            }
        };

        if &client == id || self.hop(id).is_none() {
            return None;
        }

        let mut parents: HashMap<HopId, HopId> = HashMap::new();
        let mut visited: HashSet<HopId> = HashSet::new();
        let mut queue = VecDeque::new();

        visited.insert(client.clone());
        queue.push_back(client.clone());

        while let Some(current) = queue.pop_front() {
            if &current == id {
                break;
            }
            for neighbor in self.direct_neighbors(&current) {
                if visited.insert(neighbor.clone()) {
                    parents.insert(neighbor.clone(), current.clone());
                    queue.push_back(neighbor);
                }
            }
        }

        if !visited.contains(id) {
            debug!("Hop {} is not reachable from client {}", id, client);
            return None;
        }

        let mut path = Vec::new();
        let mut cursor = parents.get(id)?;
        while cursor != &client {
            path.push(cursor.clone());
            cursor = parents.get(cursor)?;
        }
        path.reverse();

        debug!("Path from {} to {}: {:?}", client, id, path);
        Some(path)
    }

    /// Neighbours of `hop` a message may be forwarded to: everything except
    /// the hop it came from and any client.
    pub fn forward_candidates(&self, hop: &HopId, previous: Option<&HopId>) -> Vec<HopId> {
        self.direct_neighbors(hop)
            .into_iter()
            .filter(|candidate| Some(candidate) != previous)
            .filter(|candidate| !self.is_client(candidate))
            .collect()
    }
}
