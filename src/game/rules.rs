use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::card::{build_deck, Card};
use super::combos::{classify, ComboKind, PayoutTable};
use super::config::{ConfigError, RulesConfig};
use super::diamonds::DiamondSource;
use super::state::{GameEvent, GameState, IntegrityError, PlayerId, TurnPhase};

const EMPTY_HAND_REDRAW: usize = 6;
const JACKPOT_THRESHOLD: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayComboAction {
    pub player_id: PlayerId,
    pub card_indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandAction {
    pub player_id: PlayerId,
    pub target_id: PlayerId,
    #[serde(default)]
    pub pay: Option<DiamondSource>,
    #[serde(default)]
    pub discard_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwapAction {
    pub player_id: PlayerId,
    pub target_id: PlayerId,
    /// 公开区下标：(自己的钻石, 目标的钻石)。为空时各取第一颗。
    #[serde(default)]
    pub diamonds: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipCycleAction {
    pub player_id: PlayerId,
    pub card_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    PlayCombo { action: PlayComboAction },
    Command { action: CommandAction },
    Swap { action: SwapAction },
    SkipCycle { action: SkipCycleAction },
    Jackpot { player_id: PlayerId },
    EndTurn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipCycleOutcome {
    pub discarded: Card,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawn: Option<Card>,
    /// 弃掉的是钻石时，调用方可以选择再来一次。
    pub may_repeat: bool,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game is already over")]
    GameFinished,
    #[error("it is player {expected}'s turn, not player {actual}'s")]
    NotPlayerTurn { expected: PlayerId, actual: PlayerId },
    #[error("expected phase {expected:?}, but the turn is in {actual:?}")]
    InvalidPhase {
        expected: TurnPhase,
        actual: TurnPhase,
    },
    #[error("player {player_id} does not exist")]
    PlayerNotFound { player_id: PlayerId },
    #[error("expected {min}-{max} players, got {actual}")]
    InvalidPlayerCount { min: u8, max: u8, actual: usize },
    #[error("a game needs at least one deck")]
    InvalidDeckCount,
    #[error("card index {index} is outside a hand of {hand_size}")]
    CardIndexOutOfRange { index: usize, hand_size: usize },
    #[error("card index {index} was chosen twice")]
    DuplicateCardIndex { index: usize },
    #[error("the chosen cards do not form a combo")]
    NotACombo,
    #[error("player {target_id} cannot be targeted")]
    InvalidTarget { target_id: PlayerId },
    #[error("no diamond available to pay for the command")]
    NoDiamondToPay,
    #[error("the chosen payment is not a diamond owned by the player")]
    InvalidPayment,
    #[error("public diamond {index} is not owned by player {player_id}")]
    DiamondNotOwned { index: usize, player_id: PlayerId },
    #[error("both players need a public diamond to swap")]
    NothingToSwap,
    #[error("a jackpot needs {required} diamonds, player holds {available}")]
    JackpotUnavailable { required: usize, available: usize },
    #[error("the hand is empty")]
    EmptyHand,
    #[error("invalid rules: {error}")]
    Config { error: ConfigError },
    #[error("state integrity violated: {error}")]
    IntegrityViolation { error: IntegrityError },
}

impl From<ConfigError> for RuleError {
    fn from(error: ConfigError) -> Self {
        RuleError::Config { error }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let winner = state.winner;
        Self {
            state,
            events,
            winner,
        }
    }
}

/// 规则引擎：持有可注入的随机源与连招收益表，所有状态修改都经由它完成。
pub struct RuleEngine {
    pub(crate) rng: SmallRng,
    pub(crate) payouts: PayoutTable,
    rules: RulesConfig,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_rng(RulesConfig::default(), SmallRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(RulesConfig::default(), SmallRng::seed_from_u64(seed))
    }

    pub fn from_config(rules: RulesConfig) -> Self {
        Self::with_rng(rules, SmallRng::from_entropy())
    }

    pub fn with_rng(rules: RulesConfig, rng: SmallRng) -> Self {
        Self {
            rng,
            payouts: rules.payouts.clone(),
            rules,
        }
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    pub fn payouts(&self) -> &PayoutTable {
        &self.payouts
    }

    /// 建立新对局：校验人数，洗牌，每人发起始手牌。
    pub fn start_game(
        &mut self,
        names: &[String],
        deck_copies: u8,
    ) -> Result<GameState, RuleError> {
        let limits = self.rules.players;
        if !limits.contains(names.len()) {
            return Err(RuleError::InvalidPlayerCount {
                min: limits.min,
                max: limits.max,
                actual: names.len(),
            });
        }
        if deck_copies == 0 {
            return Err(RuleError::InvalidDeckCount);
        }

        let mut deck = build_deck(&self.rules.ranks, &self.rules.suits, deck_copies);
        deck.shuffle(&mut self.rng);
        let mut state = GameState::new(
            names,
            deck,
            self.rules.goal_steps(),
            self.rules.floor_steps(),
            deck_copies,
        );

        for player_id in 0..state.player_count() as PlayerId {
            self.draw_many(&mut state, player_id, self.rules.starting_hand as usize);
        }
        info!(
            players = names.len(),
            cards = state.expected_cards,
            "game started"
        );
        state.record_event(GameEvent::GameStarted {
            players: names.len() as u8,
            cards: state.expected_cards,
        });
        Ok(state)
    }

    /// 手中没有非钻石牌时：-1 步并摸 6 张。
    pub fn apply_empty_hand_penalty_if_needed(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
    ) -> bool {
        let needs_penalty = state
            .get_player(player_id)
            .map(|player| player.is_hand_empty_non_diamonds())
            .unwrap_or(false);
        if !needs_penalty {
            return false;
        }
        state.change_steps(player_id, -1);
        self.draw_many(state, player_id, EMPTY_HAND_REDRAW);
        info!(player = player_id, "empty hand penalty applied");
        state.record_event(GameEvent::EmptyHandPenalty { player_id });
        true
    }

    pub fn check_victory(state: &GameState) -> Option<PlayerId> {
        state.check_victory()
    }

    fn ensure_running(state: &GameState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_phase(state: &GameState, expected: TurnPhase) -> Result<(), RuleError> {
        if state.phase != expected {
            return Err(RuleError::InvalidPhase {
                expected,
                actual: state.phase,
            });
        }
        Ok(())
    }

    fn ensure_turn_owner(state: &GameState, player_id: PlayerId) -> Result<(), RuleError> {
        let expected = state.current_player_id();
        if expected != player_id {
            return Err(RuleError::NotPlayerTurn {
                expected,
                actual: player_id,
            });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_action(state: &GameState, player_id: PlayerId) -> Result<(), RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_integrity(state)?;
        Self::ensure_phase(state, TurnPhase::Action)?;
        Self::ensure_turn_owner(state, player_id)
    }

    fn ensure_target(
        state: &GameState,
        player_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<(), RuleError> {
        if target_id == player_id || state.get_player(target_id).is_none() {
            return Err(RuleError::InvalidTarget { target_id });
        }
        Ok(())
    }

    fn ensure_hand_index(
        state: &GameState,
        player_id: PlayerId,
        index: usize,
    ) -> Result<(), RuleError> {
        let hand_size = state
            .get_player(player_id)
            .map(|player| player.hand.len())
            .ok_or(RuleError::PlayerNotFound { player_id })?;
        if index >= hand_size {
            return Err(RuleError::CardIndexOutOfRange { index, hand_size });
        }
        Ok(())
    }

    fn events_since(state: &GameState, mark: usize) -> Vec<GameEvent> {
        state.event_log[mark..].to_vec()
    }

    /// AwaitingDraw → Action：当前玩家必须先摸一张牌。
    pub fn begin_turn(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_integrity(state)?;
        Self::ensure_phase(state, TurnPhase::AwaitingDraw)?;

        let mark = state.event_log.len();
        let player_id = state.current_player_id();
        state.record_event(GameEvent::TurnStarted {
            player_id,
            turn: state.turn_index,
            round: state.round_index,
        });
        self.draw(state, player_id);
        state.phase = TurnPhase::Action;
        Ok(Self::events_since(state, mark))
    }

    pub fn play_combo(
        &mut self,
        state: &mut GameState,
        action: PlayComboAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_action(state, action.player_id)?;

        let mut seen = Vec::with_capacity(action.card_indices.len());
        for &index in &action.card_indices {
            Self::ensure_hand_index(state, action.player_id, index)?;
            if seen.contains(&index) {
                return Err(RuleError::DuplicateCardIndex { index });
            }
            seen.push(index);
        }

        let hand = &state.players[action.player_id as usize].hand;
        let cards: Vec<Card> = action.card_indices.iter().map(|&idx| hand[idx]).collect();
        let playable = classify(&cards)
            .map(|kind| kind == ComboKind::FourKings || self.payouts.get(kind).is_some())
            .unwrap_or(false);
        if !playable {
            return Err(RuleError::NotACombo);
        }

        let mark = state.event_log.len();
        self.resolve_combo(state, action.player_id, &cards);
        Ok(Self::events_since(state, mark))
    }

    pub fn command(
        &mut self,
        state: &mut GameState,
        action: CommandAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_action(state, action.player_id)?;
        Self::ensure_target(state, action.player_id, action.target_id)?;
        if state.total_diamonds(action.player_id) == 0 {
            return Err(RuleError::NoDiamondToPay);
        }
        match action.pay {
            Some(DiamondSource::Hand(idx)) => {
                Self::ensure_hand_index(state, action.player_id, idx)?;
                if !state.players[action.player_id as usize].hand[idx].is_diamond() {
                    return Err(RuleError::InvalidPayment);
                }
            }
            Some(DiamondSource::Public(_))
                if state.players[action.player_id as usize].diamonds_in_hand() > 0 =>
            {
                return Err(RuleError::InvalidPayment);
            }
            Some(DiamondSource::Public(idx)) => {
                let owned = state
                    .public_diamonds
                    .get(idx)
                    .map(|diamond| diamond.owner_id == action.player_id)
                    .unwrap_or(false);
                if !owned {
                    return Err(RuleError::InvalidPayment);
                }
            }
            None => {}
        }
        if let Some(index) = action.discard_index {
            let hand_size = state.players[action.target_id as usize].hand.len();
            if hand_size > 0 && index >= hand_size {
                return Err(RuleError::CardIndexOutOfRange { index, hand_size });
            }
        }

        let mark = state.event_log.len();
        self.diamond_command(
            state,
            action.player_id,
            action.target_id,
            action.pay,
            action.discard_index,
        );
        Ok(Self::events_since(state, mark))
    }

    pub fn swap(
        &mut self,
        state: &mut GameState,
        action: SwapAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_action(state, action.player_id)?;
        Self::ensure_target(state, action.player_id, action.target_id)?;

        let mark = state.event_log.len();
        let swapped = match action.diamonds {
            Some((mine, theirs)) => {
                for (index, owner) in [(mine, action.player_id), (theirs, action.target_id)] {
                    let owned = state
                        .public_diamonds
                        .get(index)
                        .map(|diamond| diamond.owner_id == owner)
                        .unwrap_or(false);
                    if !owned {
                        return Err(RuleError::DiamondNotOwned {
                            index,
                            player_id: owner,
                        });
                    }
                }
                Self::swap_diamonds(state, mine, theirs)
            }
            None => Self::diamond_swap(state, action.player_id, action.target_id),
        };
        if !swapped {
            return Err(RuleError::NothingToSwap);
        }
        Ok(Self::events_since(state, mark))
    }

    /// 弃一张手牌再摸一张。
    pub fn skip_cycle(
        &mut self,
        state: &mut GameState,
        action: SkipCycleAction,
    ) -> Result<SkipCycleOutcome, RuleError> {
        Self::ensure_action(state, action.player_id)?;
        if state.players[action.player_id as usize].hand.is_empty() {
            return Err(RuleError::EmptyHand);
        }
        Self::ensure_hand_index(state, action.player_id, action.card_index)?;

        let mark = state.event_log.len();
        let discarded = state.players[action.player_id as usize].hand[action.card_index];
        self.discard_from_hand(state, action.player_id, &discarded);
        let drawn = self.draw(state, action.player_id);
        Ok(SkipCycleOutcome {
            discarded,
            drawn,
            may_repeat: discarded.is_diamond(),
            events: Self::events_since(state, mark),
        })
    }

    pub fn claim_jackpot(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_action(state, player_id)?;
        let available = state.total_diamonds(player_id);
        if available < JACKPOT_THRESHOLD {
            return Err(RuleError::JackpotUnavailable {
                required: JACKPOT_THRESHOLD,
                available,
            });
        }
        let mark = state.event_log.len();
        self.jackpot(state, player_id);
        Ok(Self::events_since(state, mark))
    }

    /// 结束行动阶段：空手惩罚 → 亮钻石 → 计数与轮次 → 胜利判定 → 轮到下一位。
    pub fn end_turn(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_integrity(state)?;
        Self::ensure_phase(state, TurnPhase::Action)?;

        let mark = state.event_log.len();
        let player_id = state.current_player_id();

        self.apply_empty_hand_penalty_if_needed(state, player_id);
        Self::end_of_turn_reveal_diamonds(state, player_id);

        state.turns_completed_total += 1;
        state.record_event(GameEvent::TurnEnded { player_id });
        if state.turns_completed_total as usize % state.player_count() == 0 {
            state.round_index += 1;
            info!(round = state.round_index, "round advanced");
            state.record_event(GameEvent::RoundAdvanced {
                round: state.round_index,
            });
        }

        if let Some(winner) = Self::check_victory(state) {
            info!(winner, "game won");
            state.declare_winner(winner);
            return Ok(Self::events_since(state, mark));
        }

        state.turn_index += 1;
        state.phase = TurnPhase::AwaitingDraw;
        Ok(Self::events_since(state, mark))
    }

    pub fn apply(
        &mut self,
        state: &mut GameState,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match action {
            GameAction::PlayCombo { action } => self.play_combo(state, action),
            GameAction::Command { action } => self.command(state, action),
            GameAction::Swap { action } => self.swap(state, action),
            GameAction::SkipCycle { action } => {
                self.skip_cycle(state, action).map(|outcome| outcome.events)
            }
            GameAction::Jackpot { player_id } => self.claim_jackpot(state, player_id),
            GameAction::EndTurn => self.end_turn(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Rank, Suit};
    use crate::game::state::PublicDiamond;
    use crate::game::test_support::card;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    fn started(seed: u64) -> (RuleEngine, GameState) {
        let mut engine = RuleEngine::with_seed(seed);
        let state = engine
            .start_game(&names(&["Alice", "Bob"]), 1)
            .expect("two players is a valid table");
        (engine, state)
    }

    /// 把 `wanted` 从所在位置移入该玩家手牌。
    fn rig_hand(state: &mut GameState, player_id: PlayerId, wanted: Card) {
        if let Some(pos) = state.draw_pile.iter().position(|c| *c == wanted) {
            state.draw_pile.remove(pos);
        } else if let Some(pos) = state.discard_pile.iter().position(|c| *c == wanted) {
            state.discard_pile.remove(pos);
        } else if let Some(pos) = state.public_diamonds.iter().position(|d| d.card == wanted) {
            state.public_diamonds.remove(pos);
        } else {
            let holder = state
                .players
                .iter_mut()
                .find(|p| p.hand.contains(&wanted))
                .expect("every card is somewhere");
            holder.remove_card_from_hand(&wanted);
        }
        state.players[player_id as usize].hand.push(wanted);
    }

    #[test]
    fn start_game_deals_six_to_each_seat() {
        let (_, state) = started(11);
        assert_eq!(state.players[0].hand.len(), 6);
        assert_eq!(state.players[1].hand.len(), 6);
        assert_eq!(state.draw_pile_len(), 40);
        assert_eq!(state.expected_cards, 52);
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn start_game_rejects_a_lonely_player() {
        let mut engine = RuleEngine::with_seed(1);
        let error = engine
            .start_game(&names(&["Solo"]), 1)
            .expect_err("one player is below the minimum");
        assert_eq!(
            error,
            RuleError::InvalidPlayerCount {
                min: 2,
                max: 6,
                actual: 1
            }
        );
        assert_eq!(error.to_string(), "expected 2-6 players, got 1");
    }

    #[test]
    fn start_game_rejects_zero_decks() {
        let mut engine = RuleEngine::with_seed(1);
        assert_eq!(
            engine.start_game(&names(&["A", "B"]), 0).err(),
            Some(RuleError::InvalidDeckCount)
        );
    }

    #[test]
    fn same_seed_deals_the_same_hands() {
        let (_, first) = started(99);
        let (_, second) = started(99);
        assert_eq!(first.players, second.players);
    }

    #[test]
    fn actions_require_the_mandatory_draw_first() {
        let (mut engine, mut state) = started(2);
        let error = engine.end_turn(&mut state).expect_err("no draw yet");
        assert_eq!(
            error,
            RuleError::InvalidPhase {
                expected: TurnPhase::Action,
                actual: TurnPhase::AwaitingDraw
            }
        );

        let events = engine.begin_turn(&mut state).expect("draw should succeed");
        assert!(matches!(events[0], GameEvent::TurnStarted { player_id: 0, .. }));
        assert_eq!(state.players[0].hand.len(), 7);
        assert_eq!(state.phase, TurnPhase::Action);
    }

    #[test]
    fn only_the_current_player_may_act() {
        let (mut engine, mut state) = started(2);
        engine.begin_turn(&mut state).expect("draw should succeed");
        let error = engine
            .claim_jackpot(&mut state, 1)
            .expect_err("player 1 is waiting");
        assert_eq!(
            error,
            RuleError::NotPlayerTurn {
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn end_turn_advances_seat_and_round() {
        let (mut engine, mut state) = started(4);

        engine.begin_turn(&mut state).expect("draw");
        engine.end_turn(&mut state).expect("end turn");
        assert_eq!(state.current_player_id(), 1);
        assert_eq!(state.round_index, 1);
        assert!(state.is_round1());

        engine.begin_turn(&mut state).expect("draw");
        let events = engine.end_turn(&mut state).expect("end turn");
        assert_eq!(state.current_player_id(), 0);
        assert_eq!(state.round_index, 2);
        assert!(!state.is_round1());
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::RoundAdvanced { round: 2 })));
    }

    #[test]
    fn end_turn_reveals_diamonds() {
        let (mut engine, mut state) = started(8);
        engine.begin_turn(&mut state).expect("draw");
        rig_hand(&mut state, 0, card(Rank::Seven, Suit::Diamonds));

        engine.end_turn(&mut state).expect("end turn");

        assert_eq!(state.players[0].diamonds_in_hand(), 0);
        assert!(state
            .public_diamonds_of(0)
            .iter()
            .any(|diamond| diamond.card == card(Rank::Seven, Suit::Diamonds)));
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn empty_hand_penalty_runs_before_reveal() {
        let (mut engine, mut state) = started(8);
        engine.begin_turn(&mut state).expect("draw");
        let hand = std::mem::take(&mut state.players[0].hand);
        state.discard_pile.extend(hand);
        rig_hand(&mut state, 0, card(Rank::Ace, Suit::Diamonds));
        state.players[0].steps = 3;

        let events = engine.end_turn(&mut state).expect("end turn");

        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::EmptyHandPenalty { player_id: 0 })));
        assert_eq!(state.players[0].steps, 2);
        assert_eq!(state.players[0].diamonds_in_hand(), 0);
        assert!(state.public_diamond_count(0) >= 1);
    }

    #[test]
    fn combo_action_validates_indices() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        let error = engine
            .play_combo(
                &mut state,
                PlayComboAction {
                    player_id: 0,
                    card_indices: vec![0, 0],
                },
            )
            .expect_err("same card twice");
        assert_eq!(error, RuleError::DuplicateCardIndex { index: 0 });

        let error = engine
            .play_combo(
                &mut state,
                PlayComboAction {
                    player_id: 0,
                    card_indices: vec![0, 40],
                },
            )
            .expect_err("index past the hand");
        assert_eq!(
            error,
            RuleError::CardIndexOutOfRange {
                index: 40,
                hand_size: 7
            }
        );
    }

    #[test]
    fn combo_action_pays_out() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        rig_hand(&mut state, 0, card(Rank::Nine, Suit::Hearts));
        rig_hand(&mut state, 0, card(Rank::Nine, Suit::Spades));
        let len = state.players[0].hand.len();

        let events = engine
            .play_combo(
                &mut state,
                PlayComboAction {
                    player_id: 0,
                    card_indices: vec![len - 2, len - 1],
                },
            )
            .expect("heart plus black is a combo");

        assert_eq!(state.players[0].steps, 2);
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::ComboResolved {
                player_id: 0,
                steps: 2,
                ..
            }
        )));
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn command_action_rejects_self_target_and_missing_diamonds() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        let error = engine
            .command(
                &mut state,
                CommandAction {
                    player_id: 0,
                    target_id: 0,
                    pay: None,
                    discard_index: None,
                },
            )
            .expect_err("cannot command yourself");
        assert_eq!(error, RuleError::InvalidTarget { target_id: 0 });

        let diamonds: Vec<Card> = state.players[0]
            .hand
            .iter()
            .filter(|c| c.is_diamond())
            .copied()
            .collect();
        for diamond in diamonds {
            state.players[0].remove_card_from_hand(&diamond);
            state.discard_pile.push(diamond);
        }
        let error = engine
            .command(
                &mut state,
                CommandAction {
                    player_id: 0,
                    target_id: 1,
                    pay: None,
                    discard_index: None,
                },
            )
            .expect_err("no diamonds left");
        assert_eq!(error, RuleError::NoDiamondToPay);
    }

    #[test]
    fn command_action_spends_hand_diamonds_before_the_row() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        let row = card(Rank::Eight, Suit::Diamonds);
        rig_hand(&mut state, 0, card(Rank::Seven, Suit::Diamonds));
        rig_hand(&mut state, 0, row);
        state.players[0].remove_card_from_hand(&row);
        state.public_diamonds.push(PublicDiamond {
            card: row,
            owner_id: 0,
        });

        let error = engine
            .command(
                &mut state,
                CommandAction {
                    player_id: 0,
                    target_id: 1,
                    pay: Some(DiamondSource::Public(0)),
                    discard_index: None,
                },
            )
            .expect_err("hand diamond must be spent first");

        assert_eq!(error, RuleError::InvalidPayment);
        assert_eq!(state.public_diamond_count(0), 1);
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn skip_cycle_reports_diamond_repeats() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        rig_hand(&mut state, 0, card(Rank::Four, Suit::Diamonds));
        let index = state.players[0].hand.len() - 1;

        let outcome = engine
            .skip_cycle(
                &mut state,
                SkipCycleAction {
                    player_id: 0,
                    card_index: index,
                },
            )
            .expect("skip cycle should succeed");

        assert_eq!(outcome.discarded, card(Rank::Four, Suit::Diamonds));
        assert!(outcome.may_repeat);
        assert!(outcome.drawn.is_some());
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn swap_action_requires_diamonds_on_both_sides() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        let error = engine
            .swap(
                &mut state,
                SwapAction {
                    player_id: 0,
                    target_id: 1,
                    diamonds: None,
                },
            )
            .expect_err("row is empty at the start");
        assert_eq!(error, RuleError::NothingToSwap);
    }

    #[test]
    fn empty_table_is_refused_before_any_turn() {
        let mut engine = RuleEngine::with_seed(1);
        let json = serde_json::to_string(&GameState::new(&[], Vec::new(), 20, 0, 1))
            .expect("state serialises");
        let mut state: GameState = serde_json::from_str(&json).expect("state deserialises");

        assert_eq!(
            engine.begin_turn(&mut state),
            Err(RuleError::IntegrityViolation {
                error: IntegrityError::EmptyTable
            })
        );
        state.phase = TurnPhase::Action;
        assert_eq!(
            engine.end_turn(&mut state),
            Err(RuleError::IntegrityViolation {
                error: IntegrityError::EmptyTable
            })
        );
    }

    #[test]
    fn winner_stops_the_game() {
        let (mut engine, mut state) = started(6);
        engine.begin_turn(&mut state).expect("draw");
        state.players[0].steps = 20;

        let events = engine.end_turn(&mut state).expect("end turn");

        assert_eq!(state.winner, Some(0));
        assert_eq!(state.phase, TurnPhase::GameOver);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::GameWon { winner: 0, .. })));
        assert_eq!(engine.begin_turn(&mut state), Err(RuleError::GameFinished));
        assert_eq!(state.integrity_check(), Ok(()));
    }
}
