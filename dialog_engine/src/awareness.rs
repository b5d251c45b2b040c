//! Player-attention check for conversations involving the local player:
//! is the player close enough to the rest of the cast, and either facing
//! one of them or holding the group on screen.

use dialog_script::ActorId;

use crate::session::SessionLink;
use crate::world::entity::EntityId;
use crate::world::types::{Aabb, Vec3};
use crate::world::World;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AwarenessSample {
    pub in_range: bool,
    pub looking: bool,
    pub aware: bool,
}

impl AwarenessSample {
    const AWARE: AwarenessSample = AwarenessSample {
        in_range: true,
        looking: true,
        aware: true,
    };
}

/// Measures whether the local player still pays attention to the
/// conversation. Distance is taken from the player to the center of the
/// other participants' combined bounds; "looking" passes when the player
/// faces any participant in the ground plane or the camera keeps the group
/// volume in view. Thresholds at or below zero disable their sub-check.
pub fn assess_local_player(
    world: &World,
    link: &SessionLink,
    player: ActorId,
    player_entity: EntityId,
) -> AwarenessSample {
    let (max_distance, view_angle_deg) = link.player_awareness_values();
    if max_distance <= 0.0 && view_angle_deg <= 0.0 {
        return AwarenessSample::AWARE;
    }

    let Some(player_state) = world.entity(player_entity) else {
        return AwarenessSample::AWARE;
    };
    let eye_position = player_state.eye_position();
    let eye_direction = player_state
        .eye_direction()
        .flattened()
        .normalized_or(Vec3::ZERO);
    let cos_limit = view_angle_deg.to_radians().cos();

    let mut group_bounds = Aabb::empty();
    let mut facing_someone = false;
    for (actor, entity) in link.cast() {
        if *actor == player {
            continue;
        }
        let Some(other) = world.entity(*entity) else {
            continue;
        };
        group_bounds.add_box(&other.world_bounds());
        let to_other = other
            .position()
            .sub(eye_position)
            .flattened()
            .normalized_or(Vec3::ZERO);
        if eye_direction.dot(to_other).clamp(-1.0, 1.0) >= cos_limit {
            facing_someone = true;
        }
    }
    if group_bounds.is_empty() {
        // Conversation with nobody else resolvable; nothing to drift from.
        return AwarenessSample::AWARE;
    }

    let in_range = max_distance <= 0.0
        || player_state.position().distance_sq(group_bounds.center())
            <= max_distance * max_distance;
    let looking = view_angle_deg <= 0.0
        || facing_someone
        || world.camera.is_aabb_visible(&group_bounds);

    AwarenessSample {
        in_range,
        looking,
        aware: in_range && looking,
    }
}
