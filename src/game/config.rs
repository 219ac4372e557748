use std::collections::HashSet;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::{Rank, Suit};
use super::combos::{ComboKind, ComboPayout, PayoutTable};

const DEFAULT_MIN_PLAYERS: u8 = 2;
const DEFAULT_MAX_PLAYERS: u8 = 6;
const DEFAULT_GOAL_STEPS: i32 = 20;
const DEFAULT_FLOOR_STEPS: i32 = 0;
const DEFAULT_STARTING_HAND: u8 = 6;

const BUNDLED_RULES_JSON: &str = include_str!("../../rules/tower_clash.json");

static BUNDLED_RULES: Lazy<Result<RulesConfig, ConfigError>> =
    Lazy::new(|| RulesConfig::from_json(BUNDLED_RULES_JSON));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum ConfigError {
    #[error("rules definition could not be parsed: {message}")]
    Parse { message: String },
    #[error("rules definition lists no ranks")]
    EmptyRanks,
    #[error("rules definition lists no suits")]
    EmptySuits,
    #[error("unknown rank `{symbol}`")]
    UnknownRank { symbol: String },
    #[error("unknown suit `{name}`")]
    UnknownSuit { name: String },
    #[error("rank `{symbol}` is listed more than once")]
    DuplicateRank { symbol: String },
    #[error("suit `{name}` is listed more than once")]
    DuplicateSuit { name: String },
    #[error("player limits {min}-{max} are not a valid range")]
    InvalidPlayerLimits { min: u8, max: u8 },
    #[error("floor of {floor} steps must be below the goal of {goal} steps")]
    FloorNotBelowGoal { floor: i32, goal: i32 },
    #[error("combo `{kind:?}` has more than one payout entry")]
    DuplicateCombo { kind: ComboKind },
    #[error("combo `{kind:?}` has a fixed reward and cannot be configured")]
    FixedCombo { kind: ComboKind },
    #[error("combo `{kind:?}` pays a negative step delta ({steps_delta})")]
    NegativePayout { kind: ComboKind, steps_delta: i32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerLimits {
    pub min: u8,
    pub max: u8,
}

impl PlayerLimits {
    pub fn contains(&self, count: usize) -> bool {
        (self.min as usize..=self.max as usize).contains(&count)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryRules {
    pub goal_steps: i32,
    pub floor_steps: i32,
}

/// 规则文件中的一条连招收益。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComboRule {
    pub kind: ComboKind,
    #[serde(default)]
    pub steps_delta: i32,
    #[serde(default)]
    pub draw: u8,
    #[serde(default)]
    pub discard_from_hand: u8,
}

/// 规则文件的原始形态，点数与花色仍为字符串。
#[derive(Debug, Clone, Deserialize)]
struct RulesDocument {
    players: PlayerLimits,
    ranks: Vec<String>,
    suits: Vec<String>,
    victory: VictoryRules,
    #[serde(default = "default_starting_hand")]
    starting_hand: u8,
    #[serde(default)]
    combos: Vec<ComboRule>,
}

fn default_starting_hand() -> u8 {
    DEFAULT_STARTING_HAND
}

/// 经过校验的游戏规则：牌组构成、连招收益表与胜利条件。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RulesConfig {
    pub players: PlayerLimits,
    pub ranks: Vec<Rank>,
    pub suits: Vec<Suit>,
    pub victory: VictoryRules,
    pub starting_hand: u8,
    pub payouts: PayoutTable,
}

impl RulesConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let document: RulesDocument =
            serde_json::from_str(json).map_err(|error| ConfigError::Parse {
                message: error.to_string(),
            })?;
        Self::try_from(document)
    }

    /// 随 crate 内置的规则文件。
    pub fn bundled() -> Result<Self, ConfigError> {
        BUNDLED_RULES.clone()
    }

    pub fn goal_steps(&self) -> i32 {
        self.victory.goal_steps
    }

    pub fn floor_steps(&self) -> i32 {
        self.victory.floor_steps
    }

    pub fn cards_per_deck(&self) -> usize {
        self.ranks.len() * self.suits.len()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ranks.is_empty() {
            return Err(ConfigError::EmptyRanks);
        }
        if self.suits.is_empty() {
            return Err(ConfigError::EmptySuits);
        }
        if self.players.min == 0 || self.players.min > self.players.max {
            return Err(ConfigError::InvalidPlayerLimits {
                min: self.players.min,
                max: self.players.max,
            });
        }
        if self.victory.floor_steps >= self.victory.goal_steps {
            return Err(ConfigError::FloorNotBelowGoal {
                floor: self.victory.floor_steps,
                goal: self.victory.goal_steps,
            });
        }
        Ok(())
    }
}

impl TryFrom<RulesDocument> for RulesConfig {
    type Error = ConfigError;

    fn try_from(document: RulesDocument) -> Result<Self, Self::Error> {
        let mut ranks = Vec::with_capacity(document.ranks.len());
        for symbol in &document.ranks {
            let rank = Rank::from_str(symbol).map_err(|_| ConfigError::UnknownRank {
                symbol: symbol.clone(),
            })?;
            if ranks.contains(&rank) {
                return Err(ConfigError::DuplicateRank {
                    symbol: symbol.clone(),
                });
            }
            ranks.push(rank);
        }

        let mut suits = Vec::with_capacity(document.suits.len());
        for name in &document.suits {
            let suit = Suit::from_str(name).map_err(|_| ConfigError::UnknownSuit {
                name: name.clone(),
            })?;
            if suits.contains(&suit) {
                return Err(ConfigError::DuplicateSuit { name: name.clone() });
            }
            suits.push(suit);
        }

        let mut seen = HashSet::new();
        let mut payouts = PayoutTable::empty();
        for rule in &document.combos {
            if rule.kind == ComboKind::FourKings {
                return Err(ConfigError::FixedCombo { kind: rule.kind });
            }
            if !seen.insert(rule.kind) {
                return Err(ConfigError::DuplicateCombo { kind: rule.kind });
            }
            if rule.steps_delta < 0 {
                return Err(ConfigError::NegativePayout {
                    kind: rule.kind,
                    steps_delta: rule.steps_delta,
                });
            }
            payouts.insert(
                rule.kind,
                ComboPayout::new(rule.steps_delta, rule.draw, rule.discard_from_hand),
            );
        }

        let config = RulesConfig {
            players: document.players,
            ranks,
            suits,
            victory: document.victory,
            starting_hand: document.starting_hand,
            payouts,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            players: PlayerLimits {
                min: DEFAULT_MIN_PLAYERS,
                max: DEFAULT_MAX_PLAYERS,
            },
            ranks: Rank::ALL.to_vec(),
            suits: Suit::ALL.to_vec(),
            victory: VictoryRules {
                goal_steps: DEFAULT_GOAL_STEPS,
                floor_steps: DEFAULT_FLOOR_STEPS,
            },
            starting_hand: DEFAULT_STARTING_HAND,
            payouts: PayoutTable::standard(),
        }
    }
}
