//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,
    /// Simulation tunables handed to every new session
    pub sim: SimConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            sim: SimConfig::from_env()?,
        })
    }
}

/// What a gate reaching zero health means for the round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Only the gate visual goes away
    #[default]
    Cosmetic,
    /// Losing a gate ends the round for its side
    EndsRound,
}

impl FromStr for GatePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosmetic" => Ok(Self::Cosmetic),
            "ends_round" => Ok(Self::EndsRound),
            _ => Err(()),
        }
    }
}

/// Outcome of a lethal ram between a player and an enemy unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RamPolicy {
    /// Both hulls are lost and both sides are paid
    #[default]
    Mutual,
    /// Only the enemy is lost; only the player is paid
    EnemyOnly,
}

impl FromStr for RamPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutual" => Ok(Self::Mutual),
            "enemy_only" => Ok(Self::EnemyOnly),
            _ => Err(()),
        }
    }
}

/// Simulation tunables
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Fixed RNG seed; a random one is drawn per session when unset
    pub seed: Option<u64>,
    /// Player roster cap
    pub max_ships: usize,
    /// Enemy units spawned per wave
    pub total_enemy_spawn: usize,
    /// No placements this close to the enemy gate
    pub gate_radius: f32,
    pub unit_max_health: u32,
    /// `None` = indestructible gates
    pub gate_max_health: Option<u32>,
    /// Gold paid per kill
    pub kill_reward: u32,
    pub player_fire_interval_ms: u64,
    pub enemy_fire_interval_ms: u64,
    /// Projectile distance per tick
    pub projectile_speed: f32,
    pub player_projectile_range: f32,
    pub enemy_projectile_range: f32,
    /// Length of a moving unit's velocity per tick
    pub unit_speed: f32,
    /// Sideways speed while deflecting off an obstacle
    pub steering_speed: f32,
    /// Magnitude of the per-tick pull toward the objective gate
    pub gate_seek_speed: f32,
    pub obstacle_count: usize,
    /// Radius of the playable sphere; gates sit at its poles
    pub arena_radius: f32,
    /// Probability an enemy spawns defensive
    pub defensive_share: f64,
    pub gate_policy: GatePolicy,
    pub ram_policy: RamPolicy,
    /// Simulation ticks per second
    pub frame_rate: u32,
    /// Frames between snapshots
    pub snapshot_every: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_ships: 10,
            total_enemy_spawn: 10,
            gate_radius: 200.0,
            unit_max_health: 50,
            gate_max_health: Some(100),
            kill_reward: 5,
            player_fire_interval_ms: 500,
            enemy_fire_interval_ms: 500,
            projectile_speed: 5.0,
            player_projectile_range: 600.0,
            enemy_projectile_range: 600.0,
            unit_speed: 1.0,
            steering_speed: 1.0,
            gate_seek_speed: 0.1,
            obstacle_count: 8,
            arena_radius: 500.0,
            defensive_share: 0.5,
            gate_policy: GatePolicy::Cosmetic,
            ram_policy: RamPolicy::Mutual,
            frame_rate: 60,
            snapshot_every: 3,
        }
    }
}

impl SimConfig {
    /// Load tunables from the environment, defaulting anything unset
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let gate_max_health = env_parse("GATE_MAX_HEALTH", d.gate_max_health.unwrap_or(0))?;

        let config = Self {
            seed: match env::var("SIM_SEED") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "SIM_SEED",
                    value: raw,
                })?),
                Err(_) => None,
            },
            max_ships: env_parse("MAX_SHIPS", d.max_ships)?,
            total_enemy_spawn: env_parse("TOTAL_ENEMY_SPAWN", d.total_enemy_spawn)?,
            gate_radius: env_parse("GATE_RADIUS", d.gate_radius)?,
            unit_max_health: env_parse("UNIT_MAX_HEALTH", d.unit_max_health)?,
            gate_max_health: (gate_max_health > 0).then_some(gate_max_health),
            kill_reward: env_parse("KILL_REWARD", d.kill_reward)?,
            player_fire_interval_ms: env_parse("PLAYER_FIRE_INTERVAL_MS", d.player_fire_interval_ms)?,
            enemy_fire_interval_ms: env_parse("ENEMY_FIRE_INTERVAL_MS", d.enemy_fire_interval_ms)?,
            projectile_speed: env_parse("PROJECTILE_SPEED", d.projectile_speed)?,
            player_projectile_range: env_parse("PLAYER_PROJECTILE_RANGE", d.player_projectile_range)?,
            enemy_projectile_range: env_parse("ENEMY_PROJECTILE_RANGE", d.enemy_projectile_range)?,
            unit_speed: env_parse("UNIT_SPEED", d.unit_speed)?,
            steering_speed: env_parse("STEERING_SPEED", d.steering_speed)?,
            gate_seek_speed: env_parse("GATE_SEEK_SPEED", d.gate_seek_speed)?,
            obstacle_count: env_parse("OBSTACLE_COUNT", d.obstacle_count)?,
            arena_radius: env_parse("ARENA_RADIUS", d.arena_radius)?,
            defensive_share: env_parse("DEFENSIVE_SHARE", d.defensive_share)?,
            gate_policy: env_parse("GATE_POLICY", d.gate_policy)?,
            ram_policy: env_parse("RAM_POLICY", d.ram_policy)?,
            frame_rate: env_parse("FRAME_RATE", d.frame_rate)?,
            snapshot_every: env_parse("SNAPSHOT_EVERY", d.snapshot_every)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the session loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::OutOfRange("FRAME_RATE"));
        }
        if self.snapshot_every == 0 {
            return Err(ConfigError::OutOfRange("SNAPSHOT_EVERY"));
        }
        if self.player_fire_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("PLAYER_FIRE_INTERVAL_MS"));
        }
        if self.enemy_fire_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("ENEMY_FIRE_INTERVAL_MS"));
        }
        if !(0.0..=1.0).contains(&self.defensive_share) {
            return Err(ConfigError::OutOfRange("DEFENSIVE_SHARE"));
        }
        if self.arena_radius <= 0.0 {
            return Err(ConfigError::OutOfRange("ARENA_RADIUS"));
        }
        // A unit at 0 health is dead on arrival
        if self.unit_max_health == 0 {
            return Err(ConfigError::OutOfRange("UNIT_MAX_HEALTH"));
        }
        if self.gate_max_health == Some(0) {
            return Err(ConfigError::OutOfRange("GATE_MAX_HEALTH"));
        }
        if self.unit_speed < 0.0 {
            return Err(ConfigError::OutOfRange("UNIT_SPEED"));
        }
        if self.projectile_speed <= 0.0 {
            return Err(ConfigError::OutOfRange("PROJECTILE_SPEED"));
        }
        Ok(())
    }

    /// Player gate sits at the north pole of the arena
    pub fn player_gate_position(&self) -> Vec3 {
        Vec3::new(0.0, self.arena_radius, 0.0)
    }

    /// Enemy gate sits at the south pole of the arena
    pub fn enemy_gate_position(&self) -> Vec3 {
        Vec3::new(0.0, -self.arena_radius, 0.0)
    }
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Value out of range for {0}")]
    OutOfRange(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fire_interval_is_rejected() {
        let config = SimConfig {
            enemy_fire_interval_ms: 0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange("ENEMY_FIRE_INTERVAL_MS"))
        ));
    }

    #[test]
    fn zero_unit_health_is_rejected() {
        let config = SimConfig {
            unit_max_health: 0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange("UNIT_MAX_HEALTH"))
        ));
    }

    #[test]
    fn defensive_share_outside_unit_interval_is_rejected() {
        for share in [-0.1, 1.5, f64::NAN] {
            let config = SimConfig {
                defensive_share: share,
                ..SimConfig::default()
            };
            assert!(config.validate().is_err(), "share {share} accepted");
        }
    }

    #[test]
    fn policies_parse_from_snake_case() {
        assert_eq!("ends_round".parse::<GatePolicy>(), Ok(GatePolicy::EndsRound));
        assert_eq!("enemy_only".parse::<RamPolicy>(), Ok(RamPolicy::EnemyOnly));
        assert!("sometimes".parse::<RamPolicy>().is_err());
    }

    #[test]
    fn gates_sit_at_the_poles() {
        let config = SimConfig::default();
        assert_eq!(config.player_gate_position(), Vec3::new(0.0, 500.0, 0.0));
        assert_eq!(config.enemy_gate_position(), Vec3::new(0.0, -500.0, 0.0));
    }
}
