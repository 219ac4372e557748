use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{
    classify, Card, ComboKind, CommandAction, GameAction, GameEvent, GameState,
    PlayComboAction, PayoutTable, PlayerId, Rank, RuleEngine, RuleError, SwapAction, TurnPhase,
};

const JACKPOT_THRESHOLD: usize = 6;
const MAX_ACTIONS_PER_TURN: usize = 32;
/// 同点数分组过大时只看前几张，避免组合数爆炸。
const MAX_GROUP_SCAN: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStrategy {
    Aggressive,
    Control,
    Random,
    Balanced,
}

impl FromStr for AiStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aggressive" | "aggro" => Ok(AiStrategy::Aggressive),
            "control" => Ok(AiStrategy::Control),
            "random" => Ok(AiStrategy::Random),
            "balanced" | "adaptive" => Ok(AiStrategy::Balanced),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Normal,
    Hard,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" => Ok(AiDifficulty::Normal),
            "hard" | "expert" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    /// 连招估值达到该值才出牌。
    pub min_combo_value: i32,
    /// 落后领先者超过该步数时发动钻石指令。
    pub trailing_margin: i32,
    /// 直接结束回合的概率。
    pub hesitation: f64,
    pub strategy: AiStrategy,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                min_combo_value: 2,
                trailing_margin: 5,
                hesitation: 0.3,
                strategy: AiStrategy::Random,
            },
            AiDifficulty::Normal => Self {
                min_combo_value: 2,
                trailing_margin: 5,
                hesitation: 0.0,
                strategy: AiStrategy::Balanced,
            },
            AiDifficulty::Hard => Self {
                min_combo_value: 1,
                trailing_margin: 3,
                hesitation: 0.0,
                strategy: AiStrategy::Aggressive,
            },
        }
    }

    pub fn with_strategy(mut self, strategy: AiStrategy) -> Self {
        self.strategy = strategy;
        match strategy {
            AiStrategy::Aggressive => self.min_combo_value = self.min_combo_value.min(1),
            AiStrategy::Control => self.trailing_margin = self.trailing_margin.min(3),
            AiStrategy::Random | AiStrategy::Balanced => {}
        }
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Normal)
    }
}

/// 手牌中一组可打出的连招。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComboCandidate {
    pub card_indices: Vec<usize>,
    pub kind: ComboKind,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiReason {
    NotMyTurn,
    Jackpot,
    BestCombo,
    CommandLeader,
    Swap,
    Random,
    EndTurn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GameAction>,
    pub reason: AiReason,
    pub evaluation: f64,
    pub candidates: usize,
    pub strategy: AiStrategy,
}

/// 连招估值：按张数计分，含国王翻倍，含钻石再加一。
pub fn combo_value(cards: &[Card]) -> i32 {
    let mut value = match cards.len() {
        2 => 1,
        3 => 2,
        4 => 3,
        _ => return 0,
    };
    if cards.iter().any(Card::is_king) {
        value *= 2;
    }
    if cards.iter().any(Card::is_diamond) {
        value += 1;
    }
    value
}

fn combinations(items: &[usize], size: usize) -> Vec<Vec<usize>> {
    if size == 0 {
        return vec![Vec::new()];
    }
    if items.len() < size {
        return Vec::new();
    }
    let mut out = Vec::new();
    for (pos, &head) in items.iter().enumerate() {
        for mut tail in combinations(&items[pos + 1..], size - 1) {
            tail.insert(0, head);
            out.push(tail);
        }
    }
    out
}

/// 列出手牌中所有可结算的同点数组合，估值高的在前。
pub fn find_combos(hand: &[Card], payouts: &PayoutTable) -> Vec<ComboCandidate> {
    let mut found = Vec::new();
    for rank in Rank::ALL {
        let group: Vec<usize> = hand
            .iter()
            .enumerate()
            .filter(|(_, card)| card.rank == rank)
            .map(|(idx, _)| idx)
            .take(MAX_GROUP_SCAN)
            .collect();
        if group.len() < 2 {
            continue;
        }
        for size in 2..=group.len().min(4) {
            for card_indices in combinations(&group, size) {
                let cards: Vec<Card> = card_indices.iter().map(|&idx| hand[idx]).collect();
                let Some(kind) = classify(&cards) else {
                    continue;
                };
                if kind != ComboKind::FourKings && payouts.get(kind).is_none() {
                    continue;
                }
                found.push(ComboCandidate {
                    card_indices,
                    kind,
                    value: combo_value(&cards),
                });
            }
        }
    }
    // 稳定排序：同分时保持点数顺序。
    found.sort_by(|a, b| b.value.cmp(&a.value));
    found
}

pub fn evaluate(state: &GameState, player_id: PlayerId) -> f64 {
    let Some(me) = state.get_player(player_id) else {
        return 0.0;
    };
    if state.winner == Some(player_id) {
        return 1_000.0;
    }
    let best_rival = state
        .players
        .iter()
        .filter(|player| player.id != player_id)
        .map(|player| player.steps)
        .max()
        .unwrap_or(0);
    (me.steps - best_rival) as f64 + state.total_diamonds(player_id) as f64 * 0.5
}

/// 本回合内是否已经出现过满足条件的事件。
fn happened_this_turn<F>(state: &GameState, predicate: F) -> bool
where
    F: Fn(&GameEvent) -> bool,
{
    for event in state.event_log.iter().rev() {
        if predicate(event) {
            return true;
        }
        if matches!(event, GameEvent::TurnStarted { .. }) {
            break;
        }
    }
    false
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn decision(
        &self,
        state: &GameState,
        player_id: PlayerId,
        action: Option<GameAction>,
        reason: AiReason,
        candidates: usize,
    ) -> AiDecision {
        AiDecision {
            action,
            reason,
            evaluation: evaluate(state, player_id),
            candidates,
            strategy: self.config.strategy,
        }
    }

    fn leader(state: &GameState, player_id: PlayerId) -> Option<PlayerId> {
        state
            .players
            .iter()
            .filter(|player| player.id != player_id)
            .max_by_key(|player| player.steps)
            .map(|player| player.id)
    }

    fn swap_targets(state: &GameState, player_id: PlayerId) -> Vec<PlayerId> {
        state
            .players
            .iter()
            .filter(|player| player.id != player_id && state.public_diamond_count(player.id) > 0)
            .map(|player| player.id)
            .collect()
    }

    fn jackpot_available(state: &GameState, player_id: PlayerId) -> bool {
        state.total_diamonds(player_id) >= JACKPOT_THRESHOLD
            && !happened_this_turn(state, |event| {
                matches!(event, GameEvent::Jackpot { player_id: who, .. } if *who == player_id)
            })
    }

    fn swap_available(state: &GameState, player_id: PlayerId) -> bool {
        state.public_diamond_count(player_id) > 0
            && !happened_this_turn(state, |event| {
                matches!(event, GameEvent::DiamondsSwapped { first_owner, .. } if *first_owner == player_id)
            })
    }

    fn command_for(&mut self, state: &GameState, player_id: PlayerId, target_id: PlayerId) -> GameAction {
        let hand_size = state.get_player(target_id).map(|p| p.hand.len()).unwrap_or(0);
        let discard_index = (hand_size > 0).then(|| self.rng.gen_range(0..hand_size));
        GameAction::Command {
            action: CommandAction {
                player_id,
                target_id,
                pay: None,
                discard_index,
            },
        }
    }

    /// 随机策略可选的全部动作。
    fn legal_actions(&mut self, state: &GameState, player_id: PlayerId, payouts: &PayoutTable) -> Vec<GameAction> {
        let mut actions = vec![GameAction::EndTurn];
        if Self::jackpot_available(state, player_id) {
            actions.push(GameAction::Jackpot { player_id });
        }
        if let Some(me) = state.get_player(player_id) {
            for combo in find_combos(&me.hand, payouts) {
                actions.push(GameAction::PlayCombo {
                    action: PlayComboAction {
                        player_id,
                        card_indices: combo.card_indices,
                    },
                });
            }
        }
        if state.total_diamonds(player_id) > 0 {
            let targets: Vec<PlayerId> = state
                .players
                .iter()
                .filter(|player| player.id != player_id)
                .map(|player| player.id)
                .collect();
            for target_id in targets {
                let command = self.command_for(state, player_id, target_id);
                actions.push(command);
            }
        }
        if Self::swap_available(state, player_id) {
            for target_id in Self::swap_targets(state, player_id) {
                actions.push(GameAction::Swap {
                    action: SwapAction {
                        player_id,
                        target_id,
                        diamonds: None,
                    },
                });
            }
        }
        actions
    }

    /// 决策顺序：奖池 → 最优连招 → 对领先者发动指令 → 交换钻石 → 结束回合。
    pub fn decide_action(
        &mut self,
        engine: &RuleEngine,
        state: &GameState,
        player_id: PlayerId,
    ) -> AiDecision {
        if state.is_finished()
            || state.phase != TurnPhase::Action
            || state.current_player_id() != player_id
        {
            return self.decision(state, player_id, None, AiReason::NotMyTurn, 0);
        }

        let payouts = engine.payouts();
        if self.config.strategy == AiStrategy::Random {
            let mut actions = self.legal_actions(state, player_id, payouts);
            let candidates = actions.len();
            actions.shuffle(&mut self.rng);
            let action = actions.swap_remove(0);
            return self.decision(state, player_id, Some(action), AiReason::Random, candidates);
        }

        if self.config.hesitation > 0.0 && self.rng.gen_bool(self.config.hesitation.min(1.0)) {
            return self.decision(state, player_id, Some(GameAction::EndTurn), AiReason::EndTurn, 0);
        }

        if Self::jackpot_available(state, player_id) {
            return self.decision(
                state,
                player_id,
                Some(GameAction::Jackpot { player_id }),
                AiReason::Jackpot,
                1,
            );
        }

        let Some(me) = state.get_player(player_id) else {
            return self.decision(state, player_id, None, AiReason::NotMyTurn, 0);
        };
        let combos = find_combos(&me.hand, payouts);
        let candidates = combos.len();
        if let Some(best) = combos.into_iter().next() {
            if best.value >= self.config.min_combo_value {
                debug!(player = player_id, combo = ?best.kind, value = best.value, "ai plays combo");
                let action = GameAction::PlayCombo {
                    action: PlayComboAction {
                        player_id,
                        card_indices: best.card_indices,
                    },
                };
                return self.decision(state, player_id, Some(action), AiReason::BestCombo, candidates);
            }
        }

        if let Some(leader) = Self::leader(state, player_id) {
            let gap = state.players[leader as usize].steps - me.steps;
            if gap > self.config.trailing_margin && state.total_diamonds(player_id) > 0 {
                let action = self.command_for(state, player_id, leader);
                return self.decision(state, player_id, Some(action), AiReason::CommandLeader, candidates);
            }
        }

        if Self::swap_available(state, player_id) {
            let targets = Self::swap_targets(state, player_id);
            if let Some(&target_id) = targets.choose(&mut self.rng) {
                let action = GameAction::Swap {
                    action: SwapAction {
                        player_id,
                        target_id,
                        diamonds: None,
                    },
                };
                return self.decision(state, player_id, Some(action), AiReason::Swap, candidates);
            }
        }

        self.decision(state, player_id, Some(GameAction::EndTurn), AiReason::EndTurn, candidates)
    }

    /// 代当前玩家走完整个回合：摸牌、行动、结束回合。
    pub fn play_turn(
        &mut self,
        engine: &mut RuleEngine,
        state: &mut GameState,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let mut events = Vec::new();
        if state.phase == TurnPhase::AwaitingDraw {
            events.extend(engine.begin_turn(state)?);
        }
        let player_id = state.current_player_id();

        for _ in 0..MAX_ACTIONS_PER_TURN {
            if state.is_finished() || state.phase != TurnPhase::Action {
                return Ok(events);
            }
            let decision = self.decide_action(engine, state, player_id);
            let Some(action) = decision.action else {
                return Ok(events);
            };
            let ends_turn = action == GameAction::EndTurn;
            match engine.apply(state, action) {
                Ok(produced) => events.extend(produced),
                // 启发式偶尔选中不可行的动作，直接结束回合。
                Err(error) => {
                    debug!(player = player_id, %error, "ai action rejected");
                    break;
                }
            }
            if ends_turn {
                return Ok(events);
            }
        }

        if !state.is_finished() && state.phase == TurnPhase::Action {
            events.extend(engine.end_turn(state)?);
        }
        Ok(events)
    }
}
