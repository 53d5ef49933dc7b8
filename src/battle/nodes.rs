//! AI waypoint graph
//!
//! Nodes are loaded with the map and never change. Which node a unit is
//! heading for lives on the unit itself (`ai_target_node`), so "claimed"
//! is always derived from the units in play.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::battle::constants::NODE_RANK_PREFERENCE;
use crate::battle::execution::BattleState;
use crate::battle::units::{BattleUnit, Faction};
use crate::core::types::{NodeId, Position, UnitId};

/// Restrictions and hints attached to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeType {
    /// Only size-1 units may use it
    pub small: bool,
    /// Only flyers may use it
    pub flying: bool,
    pub dangerous: bool,
    pub dummy: bool,
}

/// Static AI waypoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub rank: u8,
    /// Spawn priority, 0 never spawns
    pub priority: u8,
    /// Patrol desirability
    pub flags: u8,
    #[serde(default)]
    pub node_type: NodeType,
    /// Indices of neighbour nodes, negative for none or a map exit
    #[serde(default)]
    pub links: Vec<i32>,
}

impl Node {
    pub fn new(id: usize, position: Position) -> Self {
        Self {
            id: NodeId(id),
            position,
            rank: 0,
            priority: 0,
            flags: 0,
            node_type: NodeType::default(),
            links: Vec::new(),
        }
    }

    pub fn with_rank(mut self, rank: u8) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn with_links(mut self, links: &[i32]) -> Self {
        self.links = links.to_vec();
        self
    }

    /// Linked node indices, skipping empty links
    pub fn linked(&self) -> impl Iterator<Item = usize> + '_ {
        self.links.iter().filter(|&&l| l >= 0).map(|&l| l as usize)
    }

    /// Does the unit satisfy the small/flying restrictions?
    pub fn admits(&self, unit: &BattleUnit) -> bool {
        (!self.node_type.small || unit.size == 1) && (!self.node_type.flying || unit.can_fly())
    }
}

impl BattleState {
    /// Is another unit in play already heading for `node`?
    pub fn is_node_claimed(&self, node: NodeId, by: UnitId) -> bool {
        self.units
            .iter()
            .any(|u| u.id != by && !u.is_out() && u.ai_target_node == Some(node))
    }

    /// Pick a spawn node for a unit of the given rank.
    ///
    /// Among the nodes the unit fits on, one of those sharing the highest
    /// priority is chosen at random.
    pub fn get_spawn_node(&mut self, rank: u8, unit_id: UnitId) -> Option<NodeId> {
        let unit = self.units.get(unit_id)?;
        let mut best = 0;
        let mut candidates: Vec<NodeId> = Vec::new();

        for node in &self.nodes {
            if node.node_type.dummy
                || node.rank != rank
                || !node.admits(unit)
                || node.priority == 0
                || node.priority < best
                || self.can_place_unit(unit, node.position).is_none()
            {
                continue;
            }
            if node.priority > best {
                best = node.priority;
                candidates.clear();
            }
            candidates.push(node.id);
        }

        let chosen = candidates.choose(&mut self.rng).copied();
        tracing::debug!(unit = unit_id.0, rank, ?chosen, "Spawn node chosen");
        chosen
    }

    /// Pick the next patrol node from `from`.
    ///
    /// Scouts wander to any free node at random; everyone else follows
    /// links to the most desirable one.
    pub fn get_patrol_node(&mut self, scout: bool, unit_id: UnitId, from: Option<NodeId>) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        let from = match from {
            Some(node) => node,
            None => {
                // lost: start from anywhere
                let live: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .filter(|n| !n.node_type.dummy)
                    .map(|n| n.id)
                    .collect();
                *live.choose(&mut self.rng)?
            }
        };
        let origin = self.nodes.get(from.0)?;
        let unit = self.units.get(unit_id)?;

        let considered: Vec<usize> = if scout {
            (0..self.nodes.len()).collect()
        } else {
            origin.linked().filter(|&i| i < self.nodes.len()).collect()
        };

        let preferred_rank = NODE_RANK_PREFERENCE[(unit.rank as usize).min(NODE_RANK_PREFERENCE.len() - 1)];
        let mut candidates: Vec<NodeId> = Vec::new();
        let mut preferred: Option<&Node> = None;

        for index in considered {
            let node = &self.nodes[index];
            if !self.is_patrol_candidate(node, unit, scout, from) {
                continue;
            }
            if scout {
                candidates.push(node.id);
                continue;
            }
            let better = match preferred {
                None => true,
                Some(current) => {
                    node.flags > current.flags
                        || (node.flags == current.flags
                            && node.rank == preferred_rank
                            && current.rank != preferred_rank)
                }
            };
            if better {
                preferred = Some(node);
            }
        }

        let large = unit.is_large();
        let chosen = if scout {
            candidates.choose(&mut self.rng).copied()
        } else {
            preferred.map(|n| n.id)
        };

        match chosen {
            None if !scout && large => self.get_patrol_node(true, unit_id, Some(from)),
            chosen => {
                tracing::debug!(unit = unit_id.0, scout, ?from, ?chosen, "Patrol node chosen");
                chosen
            }
        }
    }

    fn is_patrol_candidate(&self, node: &Node, unit: &BattleUnit, scout: bool, from: NodeId) -> bool {
        if node.node_type.dummy || node.node_type.dangerous {
            return false;
        }
        if !scout && node.flags == 0 && node.rank == 0 {
            return false;
        }
        if scout && node.id == from {
            return false;
        }
        if node.position.x <= 0 || node.position.y <= 0 {
            return false;
        }
        if !node.admits(unit) || self.is_node_claimed(node.id, unit.id) {
            return false;
        }
        let Some(tile) = self.map.get_tile(node.position) else {
            return false;
        };
        if tile.is_burning() || (unit.faction == Faction::Hostile && tile.danger) {
            return false;
        }
        self.can_place_unit(unit, node.position).is_some()
    }
}
