//! AI 模块：基于启发式规则的自动玩家。

pub mod heuristic;

pub use heuristic::{
    combo_value, find_combos, AiAgent, AiConfig, AiDecision, AiDifficulty, AiReason, AiStrategy,
    ComboCandidate,
};
