//! Built-in fight strategy used by spawned agents.
//!
//! Behavior is shaped by the agent's personality preset. Selfless agents
//! commit their full attack, collective agents split between attack and
//! shield, and selfish agents hold back. Any agent close to death cowers
//! with a probability that shrinks as its personality grows.

use std::sync::Mutex;

use horde_agents::{AgentHandle, FightStrategy, Personality};
use horde_types::{AgentId, AgentMessage, AgentState, FightAction, GameSnapshot};
use rand::Rng;
use rand::rngs::SmallRng;

/// Chance per round of gossiping about another agent.
const GOSSIP_CHANCE: f64 = 0.2;

/// Chance per round of proposing an action to the group.
const PROPOSAL_CHANCE: f64 = 0.1;

/// Number of expected hits an agent wants in reserve before fighting.
const DANGER_HITS: u32 = 2;

/// Personality-driven strategy with its own random stream.
#[derive(Debug)]
pub struct TeamStrategy {
    personality: Personality,
    rng: Mutex<SmallRng>,
}

impl TeamStrategy {
    /// Build a strategy for a preset with a dedicated generator.
    pub const fn new(personality: Personality, rng: SmallRng) -> Self {
        Self {
            personality,
            rng: Mutex::new(rng),
        }
    }

    /// Probability of cowering when in danger.
    const fn cower_chance(&self) -> f64 {
        match self.personality {
            Personality::Selfish => 0.9,
            Personality::Collective => 0.6,
            Personality::Selfless => 0.3,
        }
    }

    fn choose(&self, state: &AgentState, in_danger: bool, rng: &mut SmallRng) -> FightAction {
        if in_danger && rng.random_bool(self.cower_chance()) {
            return FightAction::Cower;
        }
        match self.personality {
            Personality::Selfless => FightAction::strike(state),
            Personality::Collective => FightAction::Attack {
                attack: state.total_attack(),
                defend: state.total_defense().div_ceil(2),
            },
            Personality::Selfish => {
                if rng.random_bool(0.5) {
                    FightAction::shield(state)
                } else {
                    FightAction::Defend
                }
            }
        }
    }
}

/// Expected damage per agent if the monster's attack were split evenly.
fn expected_hit(snapshot: &GameSnapshot) -> u32 {
    let live = u32::try_from(snapshot.live_count()).unwrap_or(u32::MAX);
    snapshot.monster.damage.checked_div(live).unwrap_or(0)
}

fn random_peer(snapshot: &GameSnapshot, me: AgentId, rng: &mut SmallRng) -> Option<AgentId> {
    let peers: Vec<AgentId> = snapshot
        .agent_states
        .keys()
        .copied()
        .filter(|id| *id != me)
        .collect();
    if peers.is_empty() {
        return None;
    }
    peers.get(rng.random_range(0..peers.len())).copied()
}

impl FightStrategy for TeamStrategy {
    fn handle_fight(&self, snapshot: &GameSnapshot, me: &AgentHandle) {
        let Some(state) = snapshot.agent(me.id()).copied() else {
            me.commit(FightAction::Defend);
            return;
        };
        let Ok(mut rng) = self.rng.lock() else {
            me.commit(FightAction::Defend);
            return;
        };

        let in_danger = state.hp <= expected_hit(snapshot).saturating_mul(DANGER_HITS);
        let action = self.choose(&state, in_danger, &mut rng);

        let gossip_about = if rng.random_bool(GOSSIP_CHANCE) {
            random_peer(snapshot, me.id(), &mut rng)
        } else {
            None
        };
        if let Some(about) = gossip_about {
            let sentiment = rng.random_range(-5..=5);
            me.inform(AgentMessage::Gossip { about, sentiment });
        }
        if rng.random_bool(PROPOSAL_CHANCE) {
            me.inform(AgentMessage::Proposal { action });
        }
        me.commit(action);
    }

    fn personality(&self) -> Personality {
        self.personality
    }

    fn label(&self) -> &'static str {
        match self.personality {
            Personality::Selfish => "team/selfish",
            Personality::Collective => "team/collective",
            Personality::Selfless => "team/selfless",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::BTreeMap;

    use horde_types::{Decision, MonsterStats};
    use rand::SeedableRng;
    use tokio::sync::mpsc;

    use super::*;

    fn snapshot(me: AgentId, hp: u32, damage: u32) -> GameSnapshot {
        let mut agent_states = BTreeMap::new();
        agent_states.insert(me, AgentState::new(hp, 8, 6));
        agent_states.insert(AgentId::new(), AgentState::new(100, 8, 6));
        GameSnapshot {
            level: 1,
            round: 1,
            monster: MonsterStats {
                level: 1,
                health: 500,
                damage,
            },
            agent_states,
        }
    }

    fn terminal(rx: &mut mpsc::UnboundedReceiver<Decision>) -> Option<FightAction> {
        while let Ok(decision) = rx.try_recv() {
            if let Decision::Fight(action) = decision {
                return Some(action);
            }
        }
        None
    }

    #[test]
    fn always_commits_exactly_once() {
        for personality in [
            Personality::Selfish,
            Personality::Collective,
            Personality::Selfless,
        ] {
            let strategy = TeamStrategy::new(personality, SmallRng::seed_from_u64(42));
            let (tx, mut rx) = mpsc::unbounded_channel();
            let me = AgentId::new();
            let handle = AgentHandle::new(me, tx);

            for _ in 0..20 {
                strategy.handle_fight(&snapshot(me, 100, 10), &handle);
                assert!(terminal(&mut rx).is_some());
                assert!(terminal(&mut rx).is_none());
            }
        }
    }

    #[test]
    fn healthy_selfless_agent_strikes() {
        let strategy = TeamStrategy::new(Personality::Selfless, SmallRng::seed_from_u64(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let me = AgentId::new();
        let handle = AgentHandle::new(me, tx);

        strategy.handle_fight(&snapshot(me, 1000, 10), &handle);
        assert_eq!(
            terminal(&mut rx),
            Some(FightAction::Attack {
                attack: 8,
                defend: 0
            })
        );
    }

    #[test]
    fn endangered_selfish_agent_usually_cowers() {
        let strategy = TeamStrategy::new(Personality::Selfish, SmallRng::seed_from_u64(9));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let me = AgentId::new();
        let handle = AgentHandle::new(me, tx);

        let mut cowered = 0;
        for _ in 0..50 {
            strategy.handle_fight(&snapshot(me, 10, 100), &handle);
            if terminal(&mut rx) == Some(FightAction::Cower) {
                cowered += 1;
            }
        }
        assert!(cowered > 30, "cowered {cowered} of 50");
    }

    #[test]
    fn expected_hit_handles_empty_snapshot() {
        let empty = GameSnapshot {
            level: 1,
            round: 1,
            monster: MonsterStats {
                level: 1,
                health: 1,
                damage: 10,
            },
            agent_states: BTreeMap::new(),
        };
        assert_eq!(expected_hit(&empty), 0);
    }
}
