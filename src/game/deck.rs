use rand::seq::SliceRandom;
use tracing::debug;

use super::card::{Card, Suit};
use super::rules::RuleEngine;
use super::state::{GameEvent, GameState, PlayerId};

const KING_STEP_SWING: i32 = 2;
const DIAMOND_KING_DRAWS: usize = 2;

impl RuleEngine {
    /// 从抽牌堆顶摸一张牌，抽牌堆为空时先把弃牌堆洗回。
    /// 两堆都为空时返回 `None`，状态不变。
    pub fn draw(&mut self, state: &mut GameState, player_id: PlayerId) -> Option<Card> {
        state.get_player(player_id)?;
        if state.draw_pile.is_empty() {
            self.reshuffle_discard_into_draw(state);
        }

        let Some(card) = state.draw_pile.pop() else {
            debug!(player = player_id, "no card available to draw");
            return None;
        };
        state.players[player_id as usize].hand.push(card);
        debug!(player = player_id, %card, "card drawn");
        state.record_event(GameEvent::CardDrawn { player_id, card });
        Some(card)
    }

    /// 最多摸 `count` 张，返回实际摸到的张数。
    pub fn draw_many(&mut self, state: &mut GameState, player_id: PlayerId, count: usize) -> usize {
        (0..count)
            .take_while(|_| self.draw(state, player_id).is_some())
            .count()
    }

    fn reshuffle_discard_into_draw(&mut self, state: &mut GameState) -> bool {
        if state.discard_pile.is_empty() {
            return false;
        }
        let mut recycled = std::mem::take(&mut state.discard_pile);
        recycled.shuffle(&mut self.rng);
        let cards = recycled.len();
        state.draw_pile.append(&mut recycled);
        debug!(cards, "discard pile reshuffled into draw pile");
        state.record_event(GameEvent::PileReshuffled { cards });
        true
    }

    /// 打出手牌的标准弃牌路径，会触发国王效果。手中没有该牌时什么也不做。
    pub fn discard_from_hand(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
        card: &Card,
    ) -> bool {
        if !Self::discard_card(state, player_id, card) {
            return false;
        }
        self.king_discard_trigger(state, player_id, card);
        true
    }

    /// 作为代价弃牌，不触发国王效果。
    pub fn discard_card(state: &mut GameState, player_id: PlayerId, card: &Card) -> bool {
        let Some(player) = state.get_player_mut(player_id) else {
            return false;
        };
        let Some(card) = player.remove_card_from_hand(card) else {
            return false;
        };
        state.discard_pile.push(card);
        debug!(player = player_id, %card, "card discarded");
        state.record_event(GameEvent::CardDiscarded { player_id, card });
        true
    }

    fn king_discard_trigger(&mut self, state: &mut GameState, player_id: PlayerId, card: &Card) {
        if !card.is_king() {
            return;
        }
        debug!(player = player_id, %card, "king discard trigger");
        state.record_event(GameEvent::KingTriggered {
            player_id,
            card: *card,
        });
        match card.suit {
            Suit::Spades | Suit::Clubs => {
                state.change_steps(player_id, -KING_STEP_SWING);
            }
            Suit::Hearts => {
                state.change_steps(player_id, KING_STEP_SWING);
            }
            Suit::Diamonds => {
                self.draw_many(state, player_id, DIAMOND_KING_DRAWS);
            }
        }
    }
}
