//! Remote entity reconciliation.
//!
//! Each STATE snapshot is authoritative and complete: proxies are created on
//! first sighting, overwritten on every later one (last writer wins), and
//! dropped as soon as a snapshot no longer mentions them.

use crate::presentation::Presentation;
use log::debug;
use shared::{EntityKind, EntityState, Role};
use std::collections::{HashMap, HashSet};

/// Which visual the host should build for a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualClass {
    ShooterShip,
    HaulerShip,
    Asteroid,
    Mineral,
}

impl VisualClass {
    fn for_entity(kind: EntityKind, role: Option<Role>) -> Option<Self> {
        match kind {
            // Players without a role yet look like shooters.
            EntityKind::Player => Some(match role {
                Some(Role::Hauler) => VisualClass::HaulerShip,
                _ => VisualClass::ShooterShip,
            }),
            EntityKind::Asteroid => Some(VisualClass::Asteroid),
            EntityKind::Mineral => Some(VisualClass::Mineral),
            EntityKind::Unknown => None,
        }
    }
}

/// Locally held stand-in for a server-owned or remotely controlled object.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub id: u32,
    pub kind: EntityKind,
    pub visual: VisualClass,
    pub role: Option<Role>,
    pub position: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
}

impl RemoteEntity {
    fn from_state(state: &EntityState, visual: VisualClass) -> Self {
        let mut entity = Self {
            id: state.id,
            kind: state.kind,
            visual,
            role: state.role,
            position: [0.0; 3],
            pitch: 0.0,
            yaw: 0.0,
        };
        entity.overwrite(state);
        entity
    }

    fn overwrite(&mut self, state: &EntityState) {
        self.position = [state.x, state.y, state.z];
        self.pitch = state.pitch.unwrap_or(0.0);
        self.yaw = state.yaw.unwrap_or(0.0);
        if state.role.is_some() {
            self.role = state.role;
        }
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

pub struct Reconciler {
    players: HashMap<u32, RemoteEntity>,
    asteroids: HashMap<u32, RemoteEntity>,
    minerals: HashMap<u32, RemoteEntity>,
    prune_players: bool,
}

impl Reconciler {
    pub fn new(prune_players: bool) -> Self {
        Self {
            players: HashMap::new(),
            asteroids: HashMap::new(),
            minerals: HashMap::new(),
            prune_players,
        }
    }

    fn category(&self, kind: EntityKind) -> Option<&HashMap<u32, RemoteEntity>> {
        match kind {
            EntityKind::Player => Some(&self.players),
            EntityKind::Asteroid => Some(&self.asteroids),
            EntityKind::Mineral => Some(&self.minerals),
            EntityKind::Unknown => None,
        }
    }

    fn category_mut(&mut self, kind: EntityKind) -> Option<&mut HashMap<u32, RemoteEntity>> {
        match kind {
            EntityKind::Player => Some(&mut self.players),
            EntityKind::Asteroid => Some(&mut self.asteroids),
            EntityKind::Mineral => Some(&mut self.minerals),
            EntityKind::Unknown => None,
        }
    }

    pub fn get(&self, kind: EntityKind, id: u32) -> Option<&RemoteEntity> {
        self.category(kind).and_then(|map| map.get(&id))
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.category(kind).map_or(0, HashMap::len)
    }

    pub fn len(&self) -> usize {
        self.players.len() + self.asteroids.len() + self.minerals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked proxies of one category, in no particular order.
    pub fn entities(&self, kind: EntityKind) -> impl Iterator<Item = &RemoteEntity> {
        self.category(kind).into_iter().flat_map(|map| map.values())
    }

    /// Applies a full snapshot. `local_id` is never given a proxy.
    pub fn apply_snapshot<P: Presentation + ?Sized>(
        &mut self,
        entities: &[EntityState],
        local_id: Option<u32>,
        presentation: &mut P,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut seen: HashSet<(EntityKind, u32)> = HashSet::new();

        if let Some(local_id) = local_id {
            report.removed += self.forget_local(local_id, presentation);
        }

        for state in entities {
            if state.kind == EntityKind::Player && Some(state.id) == local_id {
                continue;
            }
            let visual = match VisualClass::for_entity(state.kind, state.role) {
                Some(visual) => visual,
                None => continue,
            };
            let map = match self.category_mut(state.kind) {
                Some(map) => map,
                None => continue,
            };
            seen.insert((state.kind, state.id));

            match map.get_mut(&state.id) {
                Some(proxy) => {
                    proxy.overwrite(state);
                    let visual = VisualClass::for_entity(proxy.kind, proxy.role).unwrap_or(visual);
                    if visual != proxy.visual {
                        presentation.remove_visual(proxy);
                        proxy.visual = visual;
                        presentation.spawn_visual(proxy);
                    }
                    presentation.update_visual(proxy);
                    report.updated += 1;
                }
                None => {
                    let proxy = RemoteEntity::from_state(state, visual);
                    debug!("Tracking {:?} {}", proxy.kind, proxy.id);
                    presentation.spawn_visual(&proxy);
                    map.insert(state.id, proxy);
                    report.created += 1;
                }
            }
        }

        let mut prunable = vec![EntityKind::Asteroid, EntityKind::Mineral];
        if self.prune_players {
            prunable.push(EntityKind::Player);
        }
        for kind in prunable {
            if let Some(map) = self.category_mut(kind) {
                report.removed += prune(map, |id| seen.contains(&(kind, id)), presentation);
            }
        }

        report
    }

    /// Drops player proxies whose id left the roster.
    pub fn retain_players<P: Presentation + ?Sized>(
        &mut self,
        roster: &HashSet<u32>,
        presentation: &mut P,
    ) -> usize {
        prune(&mut self.players, |id| roster.contains(&id), presentation)
    }

    /// Drops a proxy that turned out to be the local player.
    pub fn forget_local<P: Presentation + ?Sized>(&mut self, local_id: u32, presentation: &mut P) -> usize {
        match self.players.remove(&local_id) {
            Some(proxy) => {
                presentation.remove_visual(&proxy);
                1
            }
            None => 0,
        }
    }

    pub fn clear<P: Presentation + ?Sized>(&mut self, presentation: &mut P) -> usize {
        let mut removed = 0;
        for map in [&mut self.players, &mut self.asteroids, &mut self.minerals] {
            removed += prune(map, |_| false, presentation);
        }
        removed
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(true)
    }
}

fn prune<P, F>(map: &mut HashMap<u32, RemoteEntity>, keep: F, presentation: &mut P) -> usize
where
    P: Presentation + ?Sized,
    F: Fn(u32) -> bool,
{
    let stale: Vec<u32> = map.keys().copied().filter(|id| !keep(*id)).collect();
    for id in &stale {
        if let Some(proxy) = map.remove(id) {
            debug!("Removing {:?} {}", proxy.kind, proxy.id);
            presentation.remove_visual(&proxy);
        }
    }
    stale.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPresentation;
    use assert_approx_eq::assert_approx_eq;

    fn asteroid(id: u32, x: f32) -> EntityState {
        EntityState::new(id, EntityKind::Asteroid, x, 0.0, 0.0)
    }

    fn player(id: u32, role: Option<Role>) -> EntityState {
        let mut state = EntityState::new(id, EntityKind::Player, 1.0, 2.0, 3.0);
        state.role = role;
        state.pitch = Some(0.5);
        state.yaw = Some(-0.25);
        state
    }

    #[test]
    fn test_prunes_asteroids_missing_from_snapshot() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();

        reconciler.apply_snapshot(&[asteroid(1, 0.0), asteroid(2, 5.0)], None, &mut presentation);
        assert_eq!(reconciler.count(EntityKind::Asteroid), 2);

        let report = reconciler.apply_snapshot(&[asteroid(1, 1.0)], None, &mut presentation);
        assert_eq!(report.removed, 1);
        assert_eq!(reconciler.count(EntityKind::Asteroid), 1);
        assert!(reconciler.get(EntityKind::Asteroid, 1).is_some());
        assert!(reconciler.get(EntityKind::Asteroid, 2).is_none());
        assert_eq!(presentation.removed, vec![(EntityKind::Asteroid, 2)]);
    }

    #[test]
    fn test_same_snapshot_twice_is_idempotent() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();
        let snapshot = vec![asteroid(1, 3.0), player(7, Some(Role::Hauler))];

        let first = reconciler.apply_snapshot(&snapshot, Some(1), &mut presentation);
        let after_first: Vec<RemoteEntity> = {
            let mut all: Vec<_> = reconciler
                .entities(EntityKind::Asteroid)
                .chain(reconciler.entities(EntityKind::Player))
                .cloned()
                .collect();
            all.sort_by_key(|e| e.id);
            all
        };

        let second = reconciler.apply_snapshot(&snapshot, Some(1), &mut presentation);
        let mut after_second: Vec<_> = reconciler
            .entities(EntityKind::Asteroid)
            .chain(reconciler.entities(EntityKind::Player))
            .cloned()
            .collect();
        after_second.sort_by_key(|e| e.id);

        assert_eq!(first.created, 2);
        assert_eq!(second, ReconcileReport { created: 0, updated: 2, removed: 0 });
        assert_eq!(after_first, after_second);
        assert_eq!(presentation.spawned.len(), 2);
        assert!(presentation.removed.is_empty());
    }

    #[test]
    fn test_never_tracks_local_player() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();

        reconciler.apply_snapshot(&[player(1, None), player(2, None)], Some(1), &mut presentation);
        assert!(reconciler.get(EntityKind::Player, 1).is_none());
        assert!(reconciler.get(EntityKind::Player, 2).is_some());
    }

    #[test]
    fn test_local_proxy_dropped_once_identity_known() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();

        reconciler.apply_snapshot(&[player(1, None)], None, &mut presentation);
        assert_eq!(reconciler.count(EntityKind::Player), 1);

        reconciler.apply_snapshot(&[player(1, None)], Some(1), &mut presentation);
        assert_eq!(reconciler.count(EntityKind::Player), 0);
        assert_eq!(presentation.removed, vec![(EntityKind::Player, 1)]);
    }

    #[test]
    fn test_overwrites_position_and_orientation() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();
        reconciler.apply_snapshot(&[player(2, Some(Role::Shooter))], None, &mut presentation);

        let mut moved = player(2, None);
        moved.x = 10.0;
        moved.pitch = None;
        reconciler.apply_snapshot(&[moved], None, &mut presentation);

        let proxy = reconciler.get(EntityKind::Player, 2).unwrap();
        assert_approx_eq!(proxy.position[0], 10.0);
        assert_approx_eq!(proxy.pitch, 0.0);
        assert_approx_eq!(proxy.yaw, -0.25);
        // Role is sticky when the snapshot omits it.
        assert_eq!(proxy.role, Some(Role::Shooter));
    }

    #[test]
    fn test_visual_class_follows_role() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();

        reconciler.apply_snapshot(&[player(2, None)], None, &mut presentation);
        assert_eq!(
            reconciler.get(EntityKind::Player, 2).unwrap().visual,
            VisualClass::ShooterShip
        );

        reconciler.apply_snapshot(&[player(2, Some(Role::Hauler))], None, &mut presentation);
        assert_eq!(
            reconciler.get(EntityKind::Player, 2).unwrap().visual,
            VisualClass::HaulerShip
        );
        assert_eq!(presentation.spawned.len(), 2);
        assert_eq!(presentation.removed.len(), 1);
    }

    #[test]
    fn test_player_pruning_can_be_disabled() {
        let mut reconciler = Reconciler::new(false);
        let mut presentation = RecordingPresentation::default();

        reconciler.apply_snapshot(&[player(2, None), asteroid(5, 0.0)], None, &mut presentation);
        reconciler.apply_snapshot(&[], None, &mut presentation);
        assert_eq!(reconciler.count(EntityKind::Player), 1);
        assert_eq!(reconciler.count(EntityKind::Asteroid), 0);

        let roster: HashSet<u32> = [1].into_iter().collect();
        assert_eq!(reconciler.retain_players(&roster, &mut presentation), 1);
        assert_eq!(reconciler.count(EntityKind::Player), 0);
    }

    #[test]
    fn test_snapshot_driven_player_removal() {
        let mut reconciler = Reconciler::new(true);
        let mut presentation = RecordingPresentation::default();

        reconciler.apply_snapshot(&[player(2, None)], None, &mut presentation);
        let report = reconciler.apply_snapshot(&[asteroid(9, 0.0)], None, &mut presentation);
        assert_eq!(report.removed, 1);
        assert_eq!(reconciler.count(EntityKind::Player), 0);
    }

    #[test]
    fn test_ids_are_scoped_per_category() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();
        let mineral = EntityState::new(3, EntityKind::Mineral, 0.0, 0.0, 0.0);

        reconciler.apply_snapshot(&[asteroid(3, 0.0), mineral, player(3, None)], None, &mut presentation);
        assert_eq!(reconciler.len(), 3);
    }

    #[test]
    fn test_unknown_kinds_are_ignored() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();
        let bullet = EntityState::new(1, EntityKind::Unknown, 0.0, 0.0, 0.0);

        let report = reconciler.apply_snapshot(&[bullet], None, &mut presentation);
        assert_eq!(report, ReconcileReport::default());
        assert!(reconciler.is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut reconciler = Reconciler::default();
        let mut presentation = RecordingPresentation::default();
        reconciler.apply_snapshot(&[asteroid(1, 0.0), player(2, None)], None, &mut presentation);

        assert_eq!(reconciler.clear(&mut presentation), 2);
        assert!(reconciler.is_empty());
        assert_eq!(presentation.removed.len(), 2);
    }
}
