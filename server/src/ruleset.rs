//! Weapons of the loaded mod and the host's restriction table

use std::collections::HashMap;

/// How a weapon delivers its damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponKind {
    Projectile,
    Beam,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Weapon {
    pub name: String,
    pub kind: WeaponKind,
    /// Seconds between two shots
    pub rate_of_fire: f32,
    /// Charge percentage consumed per shot
    pub drain: f32,
    /// Charge regained per second while reloading, 1.0 being a full slot
    pub recharge: f32,
}

impl Weapon {
    pub fn new(name: &str, kind: WeaponKind, rate_of_fire: f32, drain: f32, recharge: f32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            rate_of_fire,
            drain,
            recharge,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    weapons: Vec<Weapon>,
}

impl Ruleset {
    pub fn new(weapons: Vec<Weapon>) -> Self {
        Self { weapons }
    }

    /// Small built-in weapon set used when no mod is supplied.
    pub fn standard() -> Self {
        Self::new(vec![
            Weapon::new("Minigun", WeaponKind::Projectile, 0.05, 2.0, 0.5),
            Weapon::new("Shotgun", WeaponKind::Projectile, 0.6, 20.0, 0.4),
            Weapon::new("Bazooka", WeaponKind::Projectile, 1.0, 50.0, 0.3),
            Weapon::new("Laser", WeaponKind::Beam, 0.1, 5.0, 0.5),
            Weapon::new("Dirtball", WeaponKind::Projectile, 0.4, 10.0, 1.0),
        ])
    }

    pub fn weapons(&self) -> &[Weapon] {
        &self.weapons
    }

    pub fn weapon(&self, index: usize) -> Option<&Weapon> {
        self.weapons.get(index)
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }
}

/// Availability of a weapon under the host's restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeaponState {
    #[default]
    Enabled,
    /// Only obtainable from weapon crates
    Bonus,
    Banned,
}

/// Per-weapon restrictions keyed by weapon name. Unlisted weapons are enabled.
#[derive(Debug, Clone, Default)]
pub struct WeaponRestrictions {
    states: HashMap<String, WeaponState>,
}

impl WeaponRestrictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, weapon: &str, state: WeaponState) {
        self.states.insert(weapon.to_ascii_lowercase(), state);
    }

    pub fn state(&self, weapon: &str) -> WeaponState {
        self.states
            .get(&weapon.to_ascii_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub fn is_banned(&self, weapon: &str) -> bool {
        self.state(weapon) == WeaponState::Banned
    }
}
