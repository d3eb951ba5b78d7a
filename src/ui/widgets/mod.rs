//! Reusable widgets.

mod card;

pub use card::Card;
