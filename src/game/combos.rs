use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::card::{Card, Rank, Suit};
use super::rules::RuleEngine;
use super::state::{GameEvent, GameState, PlayerId};

const FOUR_KINGS_STEPS: i32 = 6;
const FOUR_KINGS_DRAWS: usize = 2;

/// 可识别的同点数连招。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ComboKind {
    TwoBlacks,
    HeartPlusBlack,
    HeartPlusBothBlacks,
    HeartPlusDiamond,
    DiamondPlusBlack,
    #[serde(rename = "three_kind_including_diamond")]
    ThreeKindIncludingDiamond,
    ThreeOfKindBasic,
    #[serde(rename = "four_of_kind_any_rank")]
    FourOfKind,
    /// K♥ K♠ K♣ K♦ 同时打出，奖励固定，不查收益表。
    FourKings,
}

/// 一条连招的收益：步数、摸牌数、需从手牌弃掉的张数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ComboPayout {
    pub steps_delta: i32,
    pub draw: u8,
    pub discard_from_hand: u8,
}

impl ComboPayout {
    pub const fn new(steps_delta: i32, draw: u8, discard_from_hand: u8) -> Self {
        Self {
            steps_delta,
            draw,
            discard_from_hand,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct PayoutTable {
    entries: BTreeMap<ComboKind, ComboPayout>,
}

impl PayoutTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.insert(ComboKind::TwoBlacks, ComboPayout::new(1, 0, 0));
        table.insert(ComboKind::HeartPlusBlack, ComboPayout::new(2, 0, 0));
        table.insert(ComboKind::HeartPlusBothBlacks, ComboPayout::new(3, 0, 0));
        table.insert(ComboKind::HeartPlusDiamond, ComboPayout::new(1, 1, 0));
        table.insert(ComboKind::DiamondPlusBlack, ComboPayout::new(0, 1, 1));
        table.insert(ComboKind::ThreeKindIncludingDiamond, ComboPayout::new(1, 1, 1));
        table.insert(ComboKind::ThreeOfKindBasic, ComboPayout::new(1, 0, 0));
        table.insert(ComboKind::FourOfKind, ComboPayout::new(3, 1, 0));
        table
    }

    pub fn insert(&mut self, kind: ComboKind, payout: ComboPayout) {
        self.entries.insert(kind, payout);
    }

    pub fn get(&self, kind: ComboKind) -> Option<ComboPayout> {
        self.entries.get(&kind).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComboKind, ComboPayout)> + '_ {
        self.entries.iter().map(|(kind, payout)| (*kind, *payout))
    }
}

pub fn all_same_rank(cards: &[Card]) -> bool {
    match cards.split_first() {
        Some((first, rest)) => rest.iter().all(|card| card.rank == first.rank),
        None => false,
    }
}

pub fn is_four_kings(cards: &[Card]) -> bool {
    cards.len() == 4
        && cards.iter().all(Card::is_king)
        && Suit::ALL
            .iter()
            .all(|suit| cards.iter().any(|card| card.suit == *suit))
}

/// 按花色组合识别同点数连招。
pub fn classify(cards: &[Card]) -> Option<ComboKind> {
    if !all_same_rank(cards) {
        return None;
    }

    let has = |suit: Suit| cards.iter().any(|card| card.suit == suit);
    match cards.len() {
        4 if is_four_kings(cards) => Some(ComboKind::FourKings),
        4 => Some(ComboKind::FourOfKind),
        3 if has(Suit::Diamonds) => Some(ComboKind::ThreeKindIncludingDiamond),
        3 if has(Suit::Hearts) && has(Suit::Spades) && has(Suit::Clubs) => {
            Some(ComboKind::HeartPlusBothBlacks)
        }
        3 => Some(ComboKind::ThreeOfKindBasic),
        2 => {
            let has_heart = has(Suit::Hearts);
            let has_diamond = has(Suit::Diamonds);
            let has_black = cards.iter().any(Card::is_black);
            if has_heart && has_diamond {
                Some(ComboKind::HeartPlusDiamond)
            } else if has_diamond && has_black {
                Some(ComboKind::DiamondPlusBlack)
            } else if has_heart && has_black {
                Some(ComboKind::HeartPlusBlack)
            } else if cards.iter().all(Card::is_black) {
                Some(ComboKind::TwoBlacks)
            } else {
                None
            }
        }
        _ => None,
    }
}

impl RuleEngine {
    /// 结算一组连招并返回获得的步数。不成立时返回 0 且状态不变。
    pub fn resolve_combo(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
        cards: &[Card],
    ) -> i32 {
        let Some(kind) = classify(cards) else {
            return 0;
        };
        let holds_cards = state
            .get_player(player_id)
            .map(|player| player.holds_all(cards))
            .unwrap_or(false);
        if !holds_cards {
            return 0;
        }

        if kind == ComboKind::FourKings {
            let played = Self::take_played_cards(state, player_id, cards);
            state.change_steps(player_id, FOUR_KINGS_STEPS);
            self.draw_many(state, player_id, FOUR_KINGS_DRAWS);
            Self::bank_played_cards(state, player_id, played);
            info!(player = player_id, steps = FOUR_KINGS_STEPS, "four kings resolved");
            state.record_event(GameEvent::ComboResolved {
                player_id,
                combo: kind,
                steps: FOUR_KINGS_STEPS,
            });
            return FOUR_KINGS_STEPS;
        }

        let Some(payout) = self.payouts.get(kind) else {
            return 0;
        };

        let mut steps = payout.steps_delta;
        if cards[0].rank == Rank::King && steps > 0 {
            steps *= 2;
        }

        let played = Self::take_played_cards(state, player_id, cards);
        state.change_steps(player_id, steps);

        for _ in 0..payout.discard_from_hand {
            let Some(first) = state.players[player_id as usize].hand.first().copied() else {
                break;
            };
            self.discard_from_hand(state, player_id, &first);
        }
        self.draw_many(state, player_id, payout.draw as usize);
        Self::bank_played_cards(state, player_id, played);

        info!(player = player_id, combo = ?kind, steps, "combo resolved");
        state.record_event(GameEvent::ComboResolved {
            player_id,
            combo: kind,
            steps,
        });
        steps
    }

    fn take_played_cards(state: &mut GameState, player_id: PlayerId, cards: &[Card]) -> Vec<Card> {
        let player = &mut state.players[player_id as usize];
        cards
            .iter()
            .filter_map(|card| player.remove_card_from_hand(card))
            .collect()
    }

    fn bank_played_cards(state: &mut GameState, player_id: PlayerId, played: Vec<Card>) {
        for card in played {
            state.discard_pile.push(card);
            state.record_event(GameEvent::CardDiscarded { player_id, card });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::{card, filler_deck, state_with_deck};

    #[test]
    fn mixed_ranks_never_match() {
        let cards = [card(Rank::Ace, Suit::Spades), card(Rank::Two, Suit::Clubs)];
        assert!(!all_same_rank(&cards));
        assert_eq!(classify(&cards), None);
        assert_eq!(classify(&[]), None);
    }

    #[test]
    fn two_card_patterns() {
        let ace = |suit| card(Rank::Ace, suit);
        assert_eq!(
            classify(&[ace(Suit::Spades), ace(Suit::Clubs)]),
            Some(ComboKind::TwoBlacks)
        );
        assert_eq!(
            classify(&[ace(Suit::Hearts), ace(Suit::Spades)]),
            Some(ComboKind::HeartPlusBlack)
        );
        assert_eq!(
            classify(&[ace(Suit::Diamonds), ace(Suit::Hearts)]),
            Some(ComboKind::HeartPlusDiamond)
        );
        assert_eq!(
            classify(&[ace(Suit::Clubs), ace(Suit::Diamonds)]),
            Some(ComboKind::DiamondPlusBlack)
        );
        assert_eq!(classify(&[ace(Suit::Hearts), ace(Suit::Hearts)]), None);
        assert_eq!(classify(&[ace(Suit::Diamonds), ace(Suit::Diamonds)]), None);
    }

    #[test]
    fn three_card_patterns() {
        let seven = |suit| card(Rank::Seven, suit);
        assert_eq!(
            classify(&[seven(Suit::Hearts), seven(Suit::Spades), seven(Suit::Diamonds)]),
            Some(ComboKind::ThreeKindIncludingDiamond)
        );
        assert_eq!(
            classify(&[seven(Suit::Hearts), seven(Suit::Spades), seven(Suit::Clubs)]),
            Some(ComboKind::HeartPlusBothBlacks)
        );
        assert_eq!(
            classify(&[seven(Suit::Spades), seven(Suit::Spades), seven(Suit::Clubs)]),
            Some(ComboKind::ThreeOfKindBasic)
        );
    }

    #[test]
    fn four_card_patterns() {
        let kings = [
            card(Rank::King, Suit::Hearts),
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Clubs),
            card(Rank::King, Suit::Diamonds),
        ];
        assert!(is_four_kings(&kings));
        assert_eq!(classify(&kings), Some(ComboKind::FourKings));
        assert!(!is_four_kings(&kings[..3]));

        let aces = kings.map(|king| card(Rank::Ace, king.suit));
        assert_eq!(classify(&aces), Some(ComboKind::FourOfKind));

        let doubled_spade = [
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Clubs),
            card(Rank::King, Suit::Hearts),
        ];
        assert_eq!(classify(&doubled_spade), Some(ComboKind::FourOfKind));
    }

    #[test]
    fn five_cards_are_not_a_combo() {
        let cards = [card(Rank::Ace, Suit::Spades); 5];
        assert_eq!(classify(&cards), None);
    }

    #[test]
    fn two_blacks_pay_one_step() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(5));
        let combo = [card(Rank::Five, Suit::Spades), card(Rank::Five, Suit::Clubs)];
        state.players[0].hand = combo.to_vec();

        let gained = engine.resolve_combo(&mut state, 0, &combo);

        assert_eq!(gained, 1);
        assert_eq!(state.players[0].steps, 1);
        assert!(state.players[0].hand.is_empty());
        assert_eq!(state.draw_pile_len(), 5);
        assert_eq!(state.discard_pile, combo.to_vec());
    }

    #[test]
    fn king_two_blacks_pay_double() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(5));
        let combo = [card(Rank::King, Suit::Spades), card(Rank::King, Suit::Clubs)];
        state.players[0].hand = combo.to_vec();

        let gained = engine.resolve_combo(&mut state, 0, &combo);

        assert_eq!(gained, 2);
        assert_eq!(state.players[0].steps, 2);
        assert_eq!(state.draw_pile_len(), 5);
    }

    #[test]
    fn played_kings_do_not_trigger_discard_effects() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(5));
        let combo = [card(Rank::King, Suit::Hearts), card(Rank::King, Suit::Spades)];
        state.players[0].hand = combo.to_vec();

        let gained = engine.resolve_combo(&mut state, 0, &combo);

        assert_eq!(gained, 4);
        assert_eq!(state.players[0].steps, 4);
        assert!(!state
            .event_log
            .iter()
            .any(|event| matches!(event, GameEvent::KingTriggered { .. })));
    }

    #[test]
    fn payout_discard_fires_the_king_trigger() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(5));
        let king = card(Rank::King, Suit::Spades);
        let combo = [card(Rank::Four, Suit::Diamonds), card(Rank::Four, Suit::Clubs)];
        state.players[0].hand = vec![king, combo[0], combo[1]];
        state.players[0].steps = 3;

        let gained = engine.resolve_combo(&mut state, 0, &combo);

        assert_eq!(gained, 0);
        assert_eq!(state.players[0].steps, 1);
        assert!(state.event_log.contains(&GameEvent::KingTriggered {
            player_id: 0,
            card: king
        }));
        assert_eq!(state.players[0].hand.len(), 1);
        assert_eq!(state.discard_pile, vec![king, combo[0], combo[1]]);
    }

    #[test]
    fn four_kings_override_four_of_a_kind() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(5));
        let kings = [
            card(Rank::King, Suit::Hearts),
            card(Rank::King, Suit::Spades),
            card(Rank::King, Suit::Clubs),
            card(Rank::King, Suit::Diamonds),
        ];
        state.players[0].hand = kings.to_vec();

        let gained = engine.resolve_combo(&mut state, 0, &kings);

        assert_eq!(gained, 6);
        assert_eq!(state.players[0].steps, 6);
        assert_eq!(state.players[0].hand.len(), 2);
        assert_eq!(state.draw_pile_len(), 3);
        assert_eq!(state.discard_pile.len(), 4);
    }

    #[test]
    fn four_of_a_kind_pays_three_and_draws_one() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(5));
        let aces = [
            card(Rank::Ace, Suit::Hearts),
            card(Rank::Ace, Suit::Spades),
            card(Rank::Ace, Suit::Clubs),
            card(Rank::Ace, Suit::Diamonds),
        ];
        state.players[0].hand = aces.to_vec();

        assert_eq!(engine.resolve_combo(&mut state, 0, &aces), 3);
        assert_eq!(state.players[0].hand.len(), 1);
    }

    #[test]
    fn diamond_plus_black_discards_earliest_other_card_then_draws() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(vec![card(Rank::Queen, Suit::Hearts)]);
        let combo = [card(Rank::Four, Suit::Diamonds), card(Rank::Four, Suit::Spades)];
        let oldest = card(Rank::Nine, Suit::Hearts);
        state.players[0].hand = vec![combo[0], oldest, combo[1], card(Rank::Two, Suit::Clubs)];

        let gained = engine.resolve_combo(&mut state, 0, &combo);

        assert_eq!(gained, 0);
        assert_eq!(
            state.players[0].hand,
            vec![card(Rank::Two, Suit::Clubs), card(Rank::Queen, Suit::Hearts)]
        );
        assert_eq!(state.discard_pile, vec![oldest, combo[0], combo[1]]);
    }

    #[test]
    fn non_matching_combo_leaves_state_untouched() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(2));
        let hearts = [card(Rank::Six, Suit::Hearts), card(Rank::Six, Suit::Hearts)];
        state.players[0].hand = hearts.to_vec();
        let before = state.clone();

        assert_eq!(engine.resolve_combo(&mut state, 0, &hearts), 0);
        assert_eq!(state, before);
    }

    #[test]
    fn cards_outside_the_hand_cannot_be_played() {
        let mut engine = RuleEngine::with_seed(3);
        let mut state = state_with_deck(filler_deck(2));
        state.players[0].hand = vec![card(Rank::Five, Suit::Spades)];
        let before = state.clone();
        let combo = [card(Rank::Five, Suit::Spades), card(Rank::Five, Suit::Clubs)];

        assert_eq!(engine.resolve_combo(&mut state, 0, &combo), 0);
        assert_eq!(state, before);
    }

    #[test]
    fn standard_table_is_keyed_by_combo() {
        let table = PayoutTable::standard();
        assert_eq!(table.get(ComboKind::FourOfKind), Some(ComboPayout::new(3, 1, 0)));
        assert_eq!(table.get(ComboKind::FourKings), None);
        assert_eq!(table.iter().count(), 8);
    }
}
