//! Registry of player-controlled worms
//!
//! The registry is the only owner of worms. IDs are compact: a new worm always gets
//! the lowest free ID, so a departed player's ID is handed out again.
//!
//! A prepared worm is linked into the world object list together with the ninja
//! rope it owns. Removing a worm unlinks both before the worm itself is dropped.

use crate::physics::Vector2;
use crate::ruleset::{Ruleset, WeaponRestrictions};
use log::{info, warn};
use shared::{ConnectionId, WormId, MAX_TEAMS, MAX_WORMS};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("worm id {0} is already in use")]
    IdOccupied(WormId),
    #[error("worm id {0} is not registered")]
    NotRegistered(WormId),
    #[error("all {} worm slots are in use", MAX_WORMS)]
    Full,
}

/// Remaining lives of a worm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lives {
    Unlimited,
    /// Deaths the worm can still take before it is out
    Remaining(u32),
    /// Permanently out until the round resets
    Out,
}

impl Lives {
    pub fn from_setting(lives: Option<u32>) -> Self {
        match lives {
            Some(n) => Lives::Remaining(n),
            None => Lives::Unlimited,
        }
    }

    pub fn is_out(self) -> bool {
        self == Lives::Out
    }

    /// Lives after one more death.
    pub fn after_death(self) -> Lives {
        match self {
            Lives::Unlimited => Lives::Unlimited,
            Lives::Remaining(0) | Lives::Out => Lives::Out,
            Lives::Remaining(n) => Lives::Remaining(n - 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WormKind {
    Human,
    Bot,
}

/// What a player brings along when a worm is created for them.
#[derive(Debug, Clone)]
pub struct WormProfile {
    pub name: String,
    pub team: u8,
    pub kind: WormKind,
}

impl WormProfile {
    pub fn new(name: &str, team: u8, kind: WormKind) -> Self {
        Self {
            name: name.to_string(),
            team,
            kind,
        }
    }
}

/// State of the weapon a worm currently holds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeaponSlot {
    /// Index into the ruleset, `None` until a weapon was assigned
    pub weapon: Option<usize>,
    /// 1.0 is a full slot
    pub charge: f32,
    pub reloading: bool,
    /// Seconds until the next shot is allowed
    pub last_fire: f32,
    /// False when the host's restrictions forbid the weapon
    pub enabled: bool,
}

impl WeaponSlot {
    pub fn loaded(weapon: usize, restrictions: &WeaponRestrictions, ruleset: &Ruleset) -> Self {
        let enabled = ruleset
            .weapon(weapon)
            .map(|w| !restrictions.is_banned(&w.name))
            .unwrap_or(false);
        Self {
            weapon: Some(weapon),
            charge: 1.0,
            reloading: false,
            last_fire: 0.0,
            enabled,
        }
    }

    /// Counts down the fire delay and refills a reloading slot.
    pub fn simulate(&mut self, dt: f32, ruleset: &Ruleset) {
        if self.last_fire > 0.0 {
            self.last_fire = (self.last_fire - dt).max(0.0);
        }

        if !self.reloading {
            return;
        }
        let recharge = self
            .weapon
            .and_then(|i| ruleset.weapon(i))
            .map(|w| w.recharge)
            .unwrap_or(0.0);
        self.charge += recharge * dt;
        if self.charge >= 1.0 {
            self.charge = 1.0;
            self.reloading = false;
        }
    }
}

/// Grappling rope attached to a worm. Lives and dies with its worm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NinjaRope {
    pub released: bool,
    pub anchor: Vector2,
}

/// Entries of the world object list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectRef {
    Worm(WormId),
    Rope(WormId),
}

#[derive(Debug, Clone)]
pub struct Worm {
    pub id: WormId,
    pub name: String,
    pub team: u8,
    pub kind: WormKind,
    pub local: bool,
    /// Connection that controls this worm, `None` for local worms
    pub owner: Option<ConnectionId>,
    pub client_version: u32,

    pub alive: bool,
    pub lives: Lives,
    pub health: f32,
    pub position: Vector2,
    pub velocity: Vector2,
    /// Aim angle in degrees
    pub angle: f32,
    pub facing_left: bool,
    pub weapon: WeaponSlot,
    pub rope: NinjaRope,
    prepared: bool,

    pub tag_it: bool,
    /// Seconds spent as "it" this round
    pub tag_time: f32,
    pub vip: bool,
    pub time_of_death: Duration,

    pub kills: u32,
    pub deaths: u32,
}

impl Worm {
    fn new(id: WormId, local: bool, profile: &WormProfile, client_version: u32) -> Self {
        Self {
            id,
            name: profile.name.clone(),
            team: profile.team.min(MAX_TEAMS as u8 - 1),
            kind: profile.kind,
            local,
            owner: None,
            client_version,
            alive: false,
            lives: Lives::Unlimited,
            health: 100.0,
            position: Vector2::ZERO,
            velocity: Vector2::ZERO,
            angle: 0.0,
            facing_left: false,
            weapon: WeaponSlot::default(),
            rope: NinjaRope::default(),
            prepared: false,
            tag_it: false,
            tag_time: 0.0,
            vip: false,
            time_of_death: Duration::ZERO,
            kills: 0,
            deaths: 0,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Takes part in the running round: prepared for it and not yet out.
    pub fn in_round(&self) -> bool {
        self.prepared && !self.lives.is_out()
    }

    /// Brings the worm back to life at `position` with a fresh weapon charge.
    pub fn spawn(&mut self, position: Vector2) {
        self.alive = true;
        self.health = 100.0;
        self.position = position;
        self.velocity = Vector2::ZERO;
        self.rope = NinjaRope::default();
        self.weapon.charge = 1.0;
        self.weapon.reloading = false;
        self.weapon.last_fire = 0.0;
    }

    pub fn display_name(&self) -> String {
        format!("{}:{}", self.id, self.name)
    }
}

#[derive(Debug, Default)]
pub struct WormRegistry {
    worms: BTreeMap<WormId, Worm>,
    objects: BTreeSet<ObjectRef>,
    dedicated: bool,
}

impl WormRegistry {
    /// A dedicated server has nobody at the keyboard, so local humans become bots.
    pub fn new(dedicated: bool) -> Self {
        Self {
            worms: BTreeMap::new(),
            objects: BTreeSet::new(),
            dedicated,
        }
    }

    /// Lowest ID not currently in use.
    pub fn next_free_id(&self) -> Option<WormId> {
        let mut candidate: usize = 0;
        for &id in self.worms.keys() {
            if id as usize > candidate {
                break;
            }
            candidate = id as usize + 1;
        }
        (candidate < MAX_WORMS).then_some(candidate as WormId)
    }

    pub fn create_worm(
        &mut self,
        id: Option<WormId>,
        local: bool,
        profile: &WormProfile,
        client_version: u32,
    ) -> Result<&mut Worm, RegistryError> {
        let id = match id {
            Some(id) if self.worms.contains_key(&id) => {
                return Err(RegistryError::IdOccupied(id));
            }
            Some(id) if id as usize >= MAX_WORMS => return Err(RegistryError::Full),
            Some(id) => id,
            None => self.next_free_id().ok_or(RegistryError::Full)?,
        };

        let mut worm = Worm::new(id, local, profile, client_version);
        if local && self.dedicated && worm.kind == WormKind::Human {
            warn!(
                "local human worm {} created on a dedicated server, making it a bot",
                worm.display_name()
            );
            worm.kind = WormKind::Bot;
        }

        info!("Created worm {}", worm.display_name());
        Ok(self.worms.entry(id).or_insert(worm))
    }

    /// Links the worm and its rope into the world object list.
    pub fn prepare(&mut self, id: WormId) -> Result<(), RegistryError> {
        let worm = self
            .worms
            .get_mut(&id)
            .ok_or(RegistryError::NotRegistered(id))?;
        worm.prepared = true;
        self.objects.insert(ObjectRef::Worm(id));
        self.objects.insert(ObjectRef::Rope(id));
        Ok(())
    }

    /// Unlinks the worm and its rope from the world object list. Idempotent.
    pub fn unprepare(&mut self, id: WormId) {
        if let Some(worm) = self.worms.get_mut(&id) {
            worm.prepared = false;
        }
        self.objects.remove(&ObjectRef::Worm(id));
        self.objects.remove(&ObjectRef::Rope(id));
    }

    pub fn remove(&mut self, id: WormId) -> Result<Worm, RegistryError> {
        if !self.worms.contains_key(&id) {
            return Err(RegistryError::NotRegistered(id));
        }
        self.unprepare(id);
        let worm = self
            .worms
            .remove(&id)
            .ok_or(RegistryError::NotRegistered(id))?;
        info!("Removed worm {}", worm.display_name());
        Ok(worm)
    }

    /// Unlinks and drops every worm.
    pub fn clear(&mut self) {
        for id in self.ids() {
            self.unprepare(id);
        }
        self.worms.clear();
    }

    pub fn get(&self, id: WormId) -> Option<&Worm> {
        self.worms.get(&id)
    }

    pub fn get_mut(&mut self, id: WormId) -> Option<&mut Worm> {
        self.worms.get_mut(&id)
    }

    pub fn contains(&self, id: WormId) -> bool {
        self.worms.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.worms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worm> {
        self.worms.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worm> {
        self.worms.values_mut()
    }

    // The views below are snapshots, so callers may add or remove worms while
    // walking them.

    pub fn ids(&self) -> Vec<WormId> {
        self.worms.keys().copied().collect()
    }

    pub fn alive_ids(&self) -> Vec<WormId> {
        self.filtered_ids(|w| w.alive)
    }

    pub fn local_ids(&self) -> Vec<WormId> {
        self.filtered_ids(|w| w.local)
    }

    pub fn ids_of_connection(&self, connection: ConnectionId) -> Vec<WormId> {
        self.filtered_ids(|w| w.owner == Some(connection))
    }

    fn filtered_ids(&self, keep: impl Fn(&Worm) -> bool) -> Vec<WormId> {
        self.worms
            .values()
            .filter(|w| keep(w))
            .map(|w| w.id)
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Worm> {
        self.worms
            .values()
            .find(|w| w.name.eq_ignore_ascii_case(name))
    }

    pub fn first_local_human(&self) -> Option<&Worm> {
        self.worms
            .values()
            .find(|w| w.local && w.kind == WormKind::Human)
    }

    /// `"id:name"` for log lines, also for worms that are already gone.
    pub fn worm_name(&self, id: WormId) -> String {
        self.worms
            .get(&id)
            .map(Worm::display_name)
            .unwrap_or_else(|| format!("{}:<unknown-worm>", id))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_linked(&self, object: ObjectRef) -> bool {
        self.objects.contains(&object)
    }
}
