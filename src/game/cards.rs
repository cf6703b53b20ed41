use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Suits of the 40-card Italian deck, ordered by table power:
/// coins beat cups beat swords beat clubs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Coins,
    Cups,
    Swords,
    Clubs,
}

impl Suit {
    /// Base power tier for ordinary cards of this suit.
    pub fn tier(&self) -> i32 {
        match self {
            Suit::Coins => 400,
            Suit::Cups => 300,
            Suit::Swords => 200,
            Suit::Clubs => 100,
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Suit::Coins => "coins",
                Suit::Cups => "cups",
                Suit::Swords => "swords",
                Suit::Clubs => "clubs",
            }
        )
    }
}

/// A single card. `value` is always in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub value: u8,
}

impl Card {
    pub fn new(suit: Suit, value: u8) -> Self {
        debug_assert!((1..=10).contains(&value));
        Self { suit, value }
    }

    /// The ace of coins is the only card whose rank depends on how it was
    /// played.
    pub fn is_ace_of_coins(&self) -> bool {
        self.suit == Suit::Coins && self.value == 1
    }

    /// Effective rank of this card for trick resolution.
    ///
    /// The ace of coins ranks below every card unless declared high, in
    /// which case it outranks every card. All other cards rank by suit tier
    /// plus face value, which makes the order strict and total over the
    /// deck: no two table cards can ever tie.
    pub fn power(&self, is_ace_high: bool) -> i32 {
        if self.is_ace_of_coins() {
            if is_ace_high {
                9999
            } else {
                -1
            }
        } else {
            self.suit.tier() + i32::from(self.value)
        }
    }

    /// All 40 cards in a fixed order.
    pub fn all_cards() -> Vec<Card> {
        let mut cards = Vec::with_capacity(40);
        for suit in Suit::iter() {
            for value in 1..=10 {
                cards.push(Card::new(suit, value));
            }
        }
        cards
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.suit, self.value)
    }
}

/// A freshly shuffled deck, built once per round.
pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut cards = Card::all_cards();
    cards.shuffle(rng);
    cards
}
