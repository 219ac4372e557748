//! 游戏核心逻辑模块（牌组、连招、钻石经济、回合状态机）。

pub mod card;
pub mod combos;
pub mod config;
pub mod deck;
pub mod diamonds;
pub mod rules;
pub mod state;

#[cfg(test)]
mod test_support;

pub use card::{build_deck, Card, Rank, Suit};
pub use combos::{classify, ComboKind, ComboPayout, PayoutTable};
pub use config::{ConfigError, PlayerLimits, RulesConfig, VictoryRules};
pub use diamonds::DiamondSource;
pub use rules::{
    CommandAction,
    GameAction,
    PlayComboAction,
    RuleEngine,
    RuleError,
    RuleResolution,
    SkipCycleAction,
    SkipCycleOutcome,
    SwapAction,
};
pub use state::{
    GameEvent,
    GameState,
    IntegrityError,
    Player,
    PlayerId,
    PublicDiamond,
    TurnPhase,
};
