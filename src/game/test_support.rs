use super::card::{Card, Rank, Suit};
use super::state::GameState;

pub fn card(rank: Rank, suit: Suit) -> Card {
    Card::new(rank, suit)
}

/// 两名玩家（Alice、Bob），目标 20 步，下限 0，`deck` 作为摸牌堆。
pub fn state_with_deck(deck: Vec<Card>) -> GameState {
    let names = vec!["Alice".to_string(), "Bob".to_string()];
    GameState::new(&names, deck, 20, 0, 1)
}

/// `count` 张红心填充牌，彼此不会构成连招。
pub fn filler_deck(count: usize) -> Vec<Card> {
    Rank::ALL
        .iter()
        .cycle()
        .take(count)
        .map(|rank| card(*rank, Suit::Hearts))
        .collect()
}
