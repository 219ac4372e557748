use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::Card;
use super::combos::ComboKind;

/// 玩家标识，同时也是 `GameState::players` 中的下标。
pub type PlayerId = u8;

/// 玩家状态：手牌与塔层步数。公开钻石的归属只记录在 `GameState::public_diamonds`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub steps: i32,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            hand: Vec::new(),
            steps: 0,
        }
    }

    pub fn find_card_in_hand_index(&self, card: &Card) -> Option<usize> {
        self.hand.iter().position(|held| held == card)
    }

    pub fn remove_card_from_hand(&mut self, card: &Card) -> Option<Card> {
        let idx = self.find_card_in_hand_index(card)?;
        Some(self.hand.remove(idx))
    }

    pub fn holds_all(&self, cards: &[Card]) -> bool {
        let mut remaining = self.hand.clone();
        cards.iter().all(|card| {
            match remaining.iter().position(|held| held == card) {
                Some(pos) => {
                    remaining.swap_remove(pos);
                    true
                }
                None => false,
            }
        })
    }

    pub fn diamonds_in_hand(&self) -> usize {
        self.hand.iter().filter(|card| card.is_diamond()).count()
    }

    pub fn non_diamond_count(&self) -> usize {
        self.hand.len() - self.diamonds_in_hand()
    }

    pub fn non_diamond_hand(&self) -> Vec<Card> {
        self.hand
            .iter()
            .filter(|card| !card.is_diamond())
            .copied()
            .collect()
    }

    /// 手牌为空或只剩钻石。
    pub fn is_hand_empty_non_diamonds(&self) -> bool {
        self.non_diamond_count() == 0
    }
}

/// 公开区中的一张钻石及其当前所有者。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicDiamond {
    pub card: Card,
    pub owner_id: PlayerId,
}

/// 回合阶段。回合结束处理在 `end_turn` 中一次完成，不会停留在中间状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingDraw,
    Action,
    GameOver,
}

impl Default for TurnPhase {
    fn default() -> Self {
        Self::AwaitingDraw
    }
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        players: u8,
        cards: usize,
    },
    TurnStarted {
        player_id: PlayerId,
        turn: u32,
        round: u32,
    },
    CardDrawn {
        player_id: PlayerId,
        card: Card,
    },
    PileReshuffled {
        cards: usize,
    },
    CardDiscarded {
        player_id: PlayerId,
        card: Card,
    },
    KingTriggered {
        player_id: PlayerId,
        card: Card,
    },
    StepsChanged {
        player_id: PlayerId,
        delta: i32,
        steps: i32,
    },
    ComboResolved {
        player_id: PlayerId,
        combo: ComboKind,
        steps: i32,
    },
    DiamondsRevealed {
        player_id: PlayerId,
        cards: Vec<Card>,
    },
    DiamondCommand {
        player_id: PlayerId,
        target_id: PlayerId,
        paid: Card,
        #[serde(skip_serializing_if = "Option::is_none")]
        discarded: Option<Card>,
    },
    HoardingPenalty {
        player_id: PlayerId,
        forfeited: Vec<Card>,
    },
    DiamondsSwapped {
        first_owner: PlayerId,
        first: Card,
        second_owner: PlayerId,
        second: Card,
    },
    Jackpot {
        player_id: PlayerId,
        discarded: Vec<Card>,
    },
    EmptyHandPenalty {
        player_id: PlayerId,
    },
    TurnEnded {
        player_id: PlayerId,
    },
    RoundAdvanced {
        round: u32,
    },
    GameWon {
        winner: PlayerId,
        steps: i32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("the table has no players")]
    EmptyTable,
    #[error("seat {index} holds player id {player_id}")]
    PlayerIdMismatch { index: usize, player_id: PlayerId },
    #[error("turn index {turn_index} does not match {completed} completed turns")]
    TurnIndexDrift { turn_index: u32, completed: u32 },
    #[error("expected {expected} cards in play, found {actual}")]
    CardCountMismatch { expected: usize, actual: usize },
    #[error("card {card} appears {count} times but only {copies} decks are in play")]
    DuplicateCard { card: Card, count: usize, copies: u8 },
    #[error("public diamond {card} is owned by unknown player {owner_id}")]
    UnknownDiamondOwner { card: Card, owner_id: PlayerId },
    #[error("public row holds non-diamond card {card}")]
    NonDiamondInRow { card: Card },
    #[error("player {player_id} sits at {steps} steps, below the floor of {floor}")]
    BelowFloor {
        player_id: PlayerId,
        steps: i32,
        floor: i32,
    },
}

/// 游戏整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub players: Vec<Player>,
    #[serde(default)]
    pub draw_pile: Vec<Card>,
    #[serde(default)]
    pub discard_pile: Vec<Card>,
    #[serde(default)]
    pub public_diamonds: Vec<PublicDiamond>,
    pub goal_steps: i32,
    pub floor_steps: i32,
    pub deck_copies: u8,
    pub expected_cards: usize,
    pub round_index: u32,
    pub turn_index: u32,
    pub turns_completed_total: u32,
    #[serde(default)]
    pub phase: TurnPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    /// 按顺序入座，`deck` 作为摸牌堆。
    pub fn new(
        names: &[String],
        deck: Vec<Card>,
        goal_steps: i32,
        floor_steps: i32,
        deck_copies: u8,
    ) -> Self {
        let players = names
            .iter()
            .enumerate()
            .map(|(idx, name)| Player::new(idx as PlayerId, name.clone()))
            .collect();
        let mut state = Self {
            players,
            draw_pile: deck,
            discard_pile: Vec::new(),
            public_diamonds: Vec::new(),
            goal_steps,
            floor_steps,
            deck_copies,
            expected_cards: 0,
            round_index: 1,
            turn_index: 0,
            turns_completed_total: 0,
            phase: TurnPhase::AwaitingDraw,
            winner: None,
            event_log: Vec::new(),
        };
        state.expected_cards = state.cards_in_play();
        for player in &mut state.players {
            player.steps = player.steps.max(floor_steps);
        }
        state
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn current_player_id(&self) -> PlayerId {
        (self.turn_index as usize % self.players.len().max(1)) as PlayerId
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.get_player(self.current_player_id())
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id as usize)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id as usize)
    }

    /// 第一轮：还有玩家尚未完成自己的第一个回合。
    pub fn is_round1(&self) -> bool {
        (self.turns_completed_total as usize) < self.players.len()
    }

    pub fn is_finished(&self) -> bool {
        self.winner.is_some()
    }

    pub fn draw_pile_len(&self) -> usize {
        self.draw_pile.len()
    }

    pub fn discard_pile_len(&self) -> usize {
        self.discard_pile.len()
    }

    /// `player_id` 名下公开钻石在公开区中的下标，按亮出顺序。
    pub fn owned_diamond_indices(&self, player_id: PlayerId) -> Vec<usize> {
        self.public_diamonds
            .iter()
            .enumerate()
            .filter(|(_, diamond)| diamond.owner_id == player_id)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn public_diamonds_of(&self, player_id: PlayerId) -> Vec<PublicDiamond> {
        self.public_diamonds
            .iter()
            .filter(|diamond| diamond.owner_id == player_id)
            .copied()
            .collect()
    }

    pub fn public_diamond_count(&self, player_id: PlayerId) -> usize {
        self.public_diamonds
            .iter()
            .filter(|diamond| diamond.owner_id == player_id)
            .count()
    }

    /// 手中钻石与名下公开钻石之和。
    pub fn total_diamonds(&self, player_id: PlayerId) -> usize {
        let in_hand = self
            .get_player(player_id)
            .map(Player::diamonds_in_hand)
            .unwrap_or(0);
        in_hand + self.public_diamond_count(player_id)
    }

    /// 调整步数（不低于下限），返回实际变化量。
    pub fn change_steps(&mut self, player_id: PlayerId, delta: i32) -> i32 {
        let floor = self.floor_steps;
        let Some(player) = self.get_player_mut(player_id) else {
            return 0;
        };
        let before = player.steps;
        player.steps = before.saturating_add(delta).max(floor);
        let applied = player.steps - before;
        let steps = player.steps;
        if applied != 0 {
            self.record_event(GameEvent::StepsChanged {
                player_id,
                delta: applied,
                steps,
            });
        }
        applied
    }

    /// 按座位顺序返回第一个达到目标步数的玩家。
    pub fn check_victory(&self) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|player| player.steps >= self.goal_steps)
            .map(|player| player.id)
    }

    pub fn declare_winner(&mut self, winner: PlayerId) {
        if self.winner.is_some() {
            return;
        }
        let steps = self.get_player(winner).map(|p| p.steps).unwrap_or_default();
        self.winner = Some(winner);
        self.phase = TurnPhase::GameOver;
        self.record_event(GameEvent::GameWon { winner, steps });
    }

    pub fn cards_in_play(&self) -> usize {
        self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + self.draw_pile.len()
            + self.discard_pile.len()
            + self.public_diamonds.len()
    }

    pub fn all_cards(&self) -> Vec<Card> {
        let mut cards = Vec::with_capacity(self.cards_in_play());
        for player in &self.players {
            cards.extend(player.hand.iter().copied());
        }
        cards.extend(self.draw_pile.iter().copied());
        cards.extend(self.discard_pile.iter().copied());
        cards.extend(self.public_diamonds.iter().map(|diamond| diamond.card));
        cards
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.players.is_empty() {
            return Err(IntegrityError::EmptyTable);
        }
        // 玩家 id 与座位下标一致。
        if let Some((index, player)) = self
            .players
            .iter()
            .enumerate()
            .find(|(index, player)| player.id as usize != *index)
        {
            return Err(IntegrityError::PlayerIdMismatch {
                index,
                player_id: player.id,
            });
        }

        // 出现胜者时不再推进 turn_index。
        let expected_turn = if self.winner.is_some() {
            self.turns_completed_total.saturating_sub(1)
        } else {
            self.turns_completed_total
        };
        if self.turn_index != expected_turn && self.turn_index != self.turns_completed_total {
            return Err(IntegrityError::TurnIndexDrift {
                turn_index: self.turn_index,
                completed: expected_turn,
            });
        }

        let actual = self.cards_in_play();
        if actual != self.expected_cards {
            return Err(IntegrityError::CardCountMismatch {
                expected: self.expected_cards,
                actual,
            });
        }

        let mut counts: HashMap<Card, usize> = HashMap::new();
        for card in self.all_cards() {
            *counts.entry(card).or_default() += 1;
        }
        if let Some((card, count)) = counts
            .into_iter()
            .find(|(_, count)| *count > self.deck_copies as usize)
        {
            return Err(IntegrityError::DuplicateCard {
                card,
                count,
                copies: self.deck_copies,
            });
        }

        for diamond in &self.public_diamonds {
            if !diamond.card.is_diamond() {
                return Err(IntegrityError::NonDiamondInRow { card: diamond.card });
            }
            if self.get_player(diamond.owner_id).is_none() {
                return Err(IntegrityError::UnknownDiamondOwner {
                    card: diamond.card,
                    owner_id: diamond.owner_id,
                });
            }
        }

        for player in &self.players {
            if player.steps < self.floor_steps {
                return Err(IntegrityError::BelowFloor {
                    player_id: player.id,
                    steps: player.steps,
                    floor: self.floor_steps,
                });
            }
        }

        Ok(())
    }
}
