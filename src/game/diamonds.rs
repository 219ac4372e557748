use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::card::{Card, Suit};
use super::rules::RuleEngine;
use super::state::{GameEvent, GameState, PlayerId, PublicDiamond};

const JACKPOT_THRESHOLD: usize = 6;
const JACKPOT_STEPS: i32 = 6;
const JACKPOT_REFILL: usize = 6;
const HOARDING_REDRAW: usize = 6;

/// 钻石指令的支付来源：手牌下标或公开区下标。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", content = "index", rename_all = "lowercase")]
pub enum DiamondSource {
    Hand(usize),
    Public(usize),
}

impl RuleEngine {
    /// 回合结束时把手中所有钻石亮到公开区。
    pub fn end_of_turn_reveal_diamonds(state: &mut GameState, player_id: PlayerId) -> Vec<Card> {
        let Some(player) = state.get_player(player_id) else {
            return Vec::new();
        };
        let diamonds: Vec<Card> = player
            .hand
            .iter()
            .filter(|card| card.is_diamond())
            .copied()
            .collect();
        Self::reveal_diamonds(state, player_id, &diamonds);
        diamonds
    }

    /// 把指定钻石从手牌亮到公开区，归属 `player_id`，返回亮出的张数。
    /// 不在手中的牌或非钻石会被跳过。
    pub fn reveal_diamonds(state: &mut GameState, player_id: PlayerId, cards: &[Card]) -> usize {
        let Some(player) = state.get_player_mut(player_id) else {
            return 0;
        };
        let revealed: Vec<Card> = cards
            .iter()
            .filter(|card| card.is_diamond())
            .filter_map(|card| player.remove_card_from_hand(card))
            .collect();
        if revealed.is_empty() {
            return 0;
        }

        state
            .public_diamonds
            .extend(revealed.iter().map(|card| PublicDiamond {
                card: *card,
                owner_id: player_id,
            }));
        debug!(player = player_id, count = revealed.len(), "diamonds revealed");
        let count = revealed.len();
        state.record_event(GameEvent::DiamondsRevealed {
            player_id,
            cards: revealed,
        });
        count
    }

    /// 钻石指令：付出一颗钻石，迫使目标弃一张手牌，效果只作用于目标。
    pub fn diamond_command(
        &mut self,
        state: &mut GameState,
        active: PlayerId,
        target: PlayerId,
        pay: Option<DiamondSource>,
        discard_index: Option<usize>,
    ) -> Option<Card> {
        if active == target {
            return None;
        }
        let target_hand_len = state.get_player(target)?.hand.len();
        if matches!(discard_index, Some(idx) if target_hand_len > 0 && idx >= target_hand_len) {
            return None;
        }
        let payment = Self::select_payment(state, active, pay)?;

        let paid = match payment {
            DiamondSource::Hand(idx) => {
                let card = state.players[active as usize].hand[idx];
                Self::discard_card(state, active, &card);
                card
            }
            DiamondSource::Public(idx) => {
                let diamond = state.public_diamonds.remove(idx);
                state.discard_pile.push(diamond.card);
                state.record_event(GameEvent::CardDiscarded {
                    player_id: active,
                    card: diamond.card,
                });
                diamond.card
            }
        };

        if target_hand_len == 0 {
            info!(player = active, target_id = target, "diamond command found an empty hand");
            state.record_event(GameEvent::DiamondCommand {
                player_id: active,
                target_id: target,
                paid,
                discarded: None,
            });
            return None;
        }

        let discarded = state.players[target as usize].hand[discard_index.unwrap_or(0)];
        self.discard_from_hand(state, target, &discarded);

        match discarded.suit {
            Suit::Spades | Suit::Clubs => {
                state.change_steps(target, -1);
            }
            Suit::Hearts => {
                state.change_steps(target, 1);
            }
            Suit::Diamonds => {
                if state.is_round1() {
                    self.draw(state, target);
                } else {
                    self.apply_hoarding_penalty(state, target);
                }
            }
        }

        info!(player = active, target_id = target, %paid, %discarded, "diamond command resolved");
        state.record_event(GameEvent::DiamondCommand {
            player_id: active,
            target_id: target,
            paid,
            discarded: Some(discarded),
        });
        Some(discarded)
    }

    fn select_payment(
        state: &GameState,
        active: PlayerId,
        pay: Option<DiamondSource>,
    ) -> Option<DiamondSource> {
        let player = state.get_player(active)?;
        match pay {
            None => player
                .hand
                .iter()
                .position(Card::is_diamond)
                .map(DiamondSource::Hand)
                .or_else(|| {
                    state
                        .owned_diamond_indices(active)
                        .first()
                        .copied()
                        .map(DiamondSource::Public)
                }),
            Some(DiamondSource::Hand(idx)) => player
                .hand
                .get(idx)
                .filter(|card| card.is_diamond())
                .map(|_| DiamondSource::Hand(idx)),
            // 手里还有钻石时必须先用手牌支付。
            Some(DiamondSource::Public(_)) if player.diamonds_in_hand() > 0 => None,
            Some(DiamondSource::Public(idx)) => state
                .public_diamonds
                .get(idx)
                .filter(|diamond| diamond.owner_id == active)
                .map(|_| DiamondSource::Public(idx)),
        }
    }

    /// 囤积惩罚：弃掉全部手牌与名下公开钻石，-1 步，再摸 6 张。
    pub fn apply_hoarding_penalty(&mut self, state: &mut GameState, player_id: PlayerId) {
        if state.get_player(player_id).is_none() {
            return;
        }
        while let Some(card) = state.players[player_id as usize].hand.first().copied() {
            Self::discard_card(state, player_id, &card);
        }

        let (forfeited, kept): (Vec<PublicDiamond>, Vec<PublicDiamond>) =
            std::mem::take(&mut state.public_diamonds)
                .into_iter()
                .partition(|diamond| diamond.owner_id == player_id);
        state.public_diamonds = kept;
        let forfeited: Vec<Card> = forfeited.into_iter().map(|diamond| diamond.card).collect();
        state.discard_pile.extend(forfeited.iter().copied());

        state.change_steps(player_id, -1);
        self.draw_many(state, player_id, HOARDING_REDRAW);

        info!(player = player_id, forfeited = forfeited.len(), "hoarding penalty applied");
        state.record_event(GameEvent::HoardingPenalty {
            player_id,
            forfeited,
        });
    }

    /// 交换双方在公开区中各自第一颗钻石的归属。
    pub fn diamond_swap(state: &mut GameState, active: PlayerId, target: PlayerId) -> bool {
        let first = state.owned_diamond_indices(active).first().copied();
        let second = state.owned_diamond_indices(target).first().copied();
        match (first, second) {
            (Some(first), Some(second)) => Self::swap_diamonds(state, first, second),
            _ => false,
        }
    }

    /// 交换公开区中两颗指定钻石的归属，两者必须属于不同玩家。
    pub fn swap_diamonds(state: &mut GameState, first: usize, second: usize) -> bool {
        let (Some(a), Some(b)) = (
            state.public_diamonds.get(first).copied(),
            state.public_diamonds.get(second).copied(),
        ) else {
            return false;
        };
        if a.owner_id == b.owner_id {
            return false;
        }

        state.public_diamonds[first].owner_id = b.owner_id;
        state.public_diamonds[second].owner_id = a.owner_id;
        info!(first_owner = a.owner_id, second_owner = b.owner_id, "diamonds swapped");
        state.record_event(GameEvent::DiamondsSwapped {
            first_owner: a.owner_id,
            first: a.card,
            second_owner: b.owner_id,
            second: b.card,
        });
        true
    }

    /// 六钻大奖：+6 步，弃掉至多 6 颗钻石（先手牌后公开区），再补牌到 6 张非钻石。
    pub fn jackpot(&mut self, state: &mut GameState, player_id: PlayerId) -> bool {
        if state.total_diamonds(player_id) < JACKPOT_THRESHOLD {
            return false;
        }

        state.change_steps(player_id, JACKPOT_STEPS);

        let mut discarded = Vec::with_capacity(JACKPOT_THRESHOLD);
        let hand_diamonds: Vec<Card> = state.players[player_id as usize]
            .hand
            .iter()
            .filter(|card| card.is_diamond())
            .take(JACKPOT_THRESHOLD)
            .copied()
            .collect();
        for card in hand_diamonds {
            Self::discard_card(state, player_id, &card);
            discarded.push(card);
        }

        let remaining = JACKPOT_THRESHOLD - discarded.len();
        let owned: Vec<usize> = state
            .owned_diamond_indices(player_id)
            .into_iter()
            .take(remaining)
            .collect();
        // 倒序移除，保持前面的下标有效。
        for idx in owned.into_iter().rev() {
            let diamond = state.public_diamonds.remove(idx);
            state.discard_pile.push(diamond.card);
            discarded.push(diamond.card);
        }

        while state.players[player_id as usize].non_diamond_count() < JACKPOT_REFILL {
            if self.draw(state, player_id).is_none() {
                break;
            }
        }

        info!(player = player_id, discarded = discarded.len(), "jackpot claimed");
        state.record_event(GameEvent::Jackpot {
            player_id,
            discarded,
        });
        true
    }
}
