//! Gold and wave progression

use serde::{Deserialize, Serialize};

use super::entity::Faction;

/// Per-session economy: gold for each side and the wave counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economy {
    pub player_gold: u32,
    pub enemy_gold: u32,
    /// Rounds won so far
    pub wave: u32,
}

impl Economy {
    pub fn gold(&self, faction: Faction) -> u32 {
        match faction {
            Faction::Player => self.player_gold,
            Faction::Enemy => self.enemy_gold,
        }
    }

    /// Pay `amount` to `faction`, returns the new balance
    pub fn credit(&mut self, faction: Faction, amount: u32) -> u32 {
        let purse = match faction {
            Faction::Player => &mut self.player_gold,
            Faction::Enemy => &mut self.enemy_gold,
        };
        *purse = purse.saturating_add(amount);
        *purse
    }

    /// Record a won round, returns the new wave number
    pub fn advance_wave(&mut self) -> u32 {
        self.wave += 1;
        self.wave
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_goes_to_the_named_side() {
        let mut economy = Economy::default();
        assert_eq!(economy.credit(Faction::Player, 5), 5);
        assert_eq!(economy.credit(Faction::Player, 5), 10);
        assert_eq!(economy.gold(Faction::Enemy), 0);
    }

    #[test]
    fn wave_counts_up() {
        let mut economy = Economy::default();
        assert_eq!(economy.advance_wave(), 1);
        assert_eq!(economy.advance_wave(), 2);
    }
}
