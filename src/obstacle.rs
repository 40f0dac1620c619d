use crate::engine::{Point, Rect, Size};
use crate::sprite::TICKS_PER_SECOND;

/// Recycle a moving obstacle once it's this far behind the camera's left edge
pub const RECYCLE_MARGIN: f32 = 100.0;
/// A recycled obstacle reappears at least this far ahead of the player
pub const RECYCLE_LOOKAHEAD: f32 = 1200.0;

/// Collision tolerance for "landed on top": how far the player's previous
/// bottom may already sink into the obstacle's top
const TOP_CONTACT_TOLERANCE: f32 = 4.0;

const BARREL_FRAMES: [&str; 4] = ["barrel004", "barrel003", "barrel002", "barrel001"];
const BARREL_FRAME_RATE: u32 = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObstacleKind {
    /// static boulder, sprite variant 1-6
    Rock(u8),
    /// static ice rock, sprite variant 1-5
    IceRock(u8),
    Barrel,
    Snowball,
}

impl ObstacleKind {
    pub fn is_moving(self) -> bool {
        matches!(self, ObstacleKind::Barrel | ObstacleKind::Snowball)
    }

    /// Horizontal velocity a moving obstacle is (re)launched with
    pub fn base_velocity(self) -> f32 {
        match self {
            ObstacleKind::Barrel => -100.0,
            ObstacleKind::Snowball => -120.0,
            ObstacleKind::Rock(_) | ObstacleKind::IceRock(_) => 0.0,
        }
    }

    /// Gap kept behind the rightmost obstacle of the same type on recycle
    pub fn spacing(self) -> f32 {
        match self {
            ObstacleKind::Barrel => 300.0,
            ObstacleKind::Snowball => 700.0,
            ObstacleKind::Rock(_) | ObstacleKind::IceRock(_) => 450.0,
        }
    }

    /// Same type for recycling purposes; sprite variants don't matter
    pub fn same_type(self, other: ObstacleKind) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }

    /// Image key of the first (or only) frame
    pub fn base_key(self) -> String {
        match self {
            ObstacleKind::Rock(variant) => format!("rock{}", variant),
            ObstacleKind::IceRock(variant) => format!("icerock{}", variant),
            ObstacleKind::Barrel => BARREL_FRAMES[0].to_string(),
            ObstacleKind::Snowball => "snowball".to_string(),
        }
    }

    /// Size used when the sprite image is unavailable
    pub fn fallback_size(self) -> Size {
        match self {
            ObstacleKind::Rock(_) => Size {
                width: 90.0,
                height: 70.0,
            },
            ObstacleKind::IceRock(_) => Size {
                width: 80.0,
                height: 60.0,
            },
            ObstacleKind::Barrel | ObstacleKind::Snowball => Size {
                width: 70.0,
                height: 70.0,
            },
        }
    }
}

/// Where and how an obstacle is placed at level build time. `x` is the
/// horizontal center, `bottom` the resting edge.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ObstacleSpawn {
    pub kind: ObstacleKind,
    pub x: f32,
    pub bottom: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    kind: ObstacleKind,
    /// bottom center
    position: Point,
    velocity: Point,
    size: Size,
    cleared: bool,
    tick: u32,
}

impl Obstacle {
    pub fn new(spawn: ObstacleSpawn, size: Size) -> Self {
        Obstacle {
            kind: spawn.kind,
            position: Point {
                x: spawn.x,
                y: spawn.bottom,
            },
            velocity: Point {
                x: spawn.kind.base_velocity(),
                y: 0.0,
            },
            size,
            cleared: false,
            tick: 0,
        }
    }

    pub fn kind(&self) -> ObstacleKind {
        self.kind
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn velocity(&self) -> Point {
        self.velocity
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    pub fn set_cleared(&mut self, cleared: bool) {
        self.cleared = cleared;
    }

    pub fn bounding_box(&self) -> Rect {
        Rect::from_xywh(
            self.position.x - self.size.width / 2.0,
            self.position.y - self.size.height,
            self.size.width,
            self.size.height,
        )
    }

    /// Image key for the current animation frame
    pub fn sprite_key(&self) -> String {
        match self.kind {
            ObstacleKind::Barrel => {
                let index = self.tick * BARREL_FRAME_RATE / TICKS_PER_SECOND;
                BARREL_FRAMES[index as usize % BARREL_FRAMES.len()].to_string()
            }
            kind => kind.base_key(),
        }
    }

    /// Advance one frame: snowball wobble, then integrate velocity
    pub fn update(&mut self, now_ms: f64, seconds: f32) {
        if self.kind == ObstacleKind::Snowball {
            self.velocity.y = snowball_wobble(now_ms, self.position.x);
        }
        self.position.x += self.velocity.x * seconds;
        self.position.y += self.velocity.y * seconds;
        self.tick = self.tick.wrapping_add(1);
    }

    /// Put the obstacle back in play at `x`, as if freshly launched
    fn relaunch(&mut self, x: f32) {
        self.position.x = x;
        self.cleared = false;
        self.velocity.x = self.kind.base_velocity();
        self.tick = 0;
    }
}

/// Vertical bobbing velocity of a snowball: a sinusoid over time and the
/// snowball's own x, so neighbours drift out of phase
pub fn snowball_wobble(now_ms: f64, x: f32) -> f32 {
    let phase = now_ms * 0.004 + f64::from(x) * 0.01;
    (phase.sin() * 108.0 * 3.0) as f32
}

/// Reposition every moving obstacle that fell more than `RECYCLE_MARGIN`
/// behind the camera ahead of play, each type independently. Returns how
/// many were moved.
pub fn recycle(obstacles: &mut [Obstacle], camera_x: f32, player_x: f32) -> usize {
    let mut recycled = 0;
    for index in 0..obstacles.len() {
        let obstacle = &obstacles[index];
        if !obstacle.kind.is_moving() || obstacle.position.x >= camera_x - RECYCLE_MARGIN {
            continue;
        }
        let kind = obstacle.kind;
        let rightmost = obstacles
            .iter()
            .filter(|other| other.kind.same_type(kind))
            .map(|other| other.position.x)
            .fold(f32::MIN, f32::max);
        let x = (rightmost + kind.spacing()).max(player_x + RECYCLE_LOOKAHEAD);
        obstacles[index].relaunch(x);
        recycled += 1;
    }
    recycled
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Contact {
    /// player's bottom came down onto the obstacle's top
    FromAbove,
    /// blocking contact; the player belongs at this x
    Side { x: f32 },
}

/// Classify an overlap between the player and an obstacle.
/// `previous` is the player's box before this frame's movement.
pub fn classify_contact(previous: &Rect, current: &Rect, obstacle: &Rect) -> Option<Contact> {
    if !current.intersects(obstacle) {
        return None;
    }
    if previous.bottom() <= obstacle.y() + TOP_CONTACT_TOLERANCE {
        return Some(Contact::FromAbove);
    }
    let x = if previous.center_x() < obstacle.center_x() {
        obstacle.x() - current.size.width
    } else {
        obstacle.right()
    };
    Some(Contact::Side { x })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn obstacle(kind: ObstacleKind, x: f32) -> Obstacle {
        Obstacle::new(
            ObstacleSpawn {
                kind,
                x,
                bottom: 490.0,
                scale: 1.0,
            },
            kind.fallback_size(),
        )
    }

    #[test]
    fn only_barrels_and_snowballs_move() {
        assert!(obstacle(ObstacleKind::Barrel, 0.0).velocity().x < 0.0);
        assert!(obstacle(ObstacleKind::Snowball, 0.0).velocity().x < 0.0);
        assert_relative_eq!(obstacle(ObstacleKind::Rock(1), 0.0).velocity().x, 0.0);
        assert!(!ObstacleKind::IceRock(3).is_moving());
    }

    #[test]
    fn recycled_obstacle_lands_past_both_bounds() {
        let mut obstacles = vec![
            obstacle(ObstacleKind::Barrel, 50.0),
            obstacle(ObstacleKind::Barrel, 900.0),
            obstacle(ObstacleKind::Barrel, 1500.0),
        ];
        obstacles[0].set_cleared(true);
        let camera_x = 400.0;
        let player_x = 700.0;

        assert_eq!(recycle(&mut obstacles, camera_x, player_x), 1);
        let moved = &obstacles[0];
        assert!(moved.position().x >= 1500.0 + 300.0);
        assert!(moved.position().x >= player_x + RECYCLE_LOOKAHEAD);
        assert_relative_eq!(moved.position().x, 1900.0);
        assert!(!moved.is_cleared());
        assert_relative_eq!(moved.velocity().x, -100.0);
    }

    #[test]
    fn lookahead_wins_when_the_stream_is_behind_the_player() {
        let mut obstacles = vec![obstacle(ObstacleKind::Barrel, 10.0), obstacle(ObstacleKind::Barrel, 200.0)];
        recycle(&mut obstacles, 500.0, 3000.0);
        assert_relative_eq!(obstacles[0].position().x, 3000.0 + RECYCLE_LOOKAHEAD);
    }

    #[test]
    fn obstacles_within_the_margin_stay_put() {
        let mut obstacles = vec![obstacle(ObstacleKind::Barrel, 301.0)];
        assert_eq!(recycle(&mut obstacles, 400.0, 0.0), 0);
        assert_relative_eq!(obstacles[0].position().x, 301.0);
    }

    #[test]
    fn types_recycle_independently_and_static_ones_never() {
        let mut obstacles = vec![
            obstacle(ObstacleKind::IceRock(1), 0.0),
            obstacle(ObstacleKind::Snowball, 0.0),
            obstacle(ObstacleKind::IceRock(2), 5000.0),
            obstacle(ObstacleKind::Snowball, 2000.0),
        ];
        assert_eq!(recycle(&mut obstacles, 1000.0, 1000.0), 1);
        assert_relative_eq!(obstacles[0].position().x, 0.0);
        // spaced from the other snowball, not from the far ice rock
        assert_relative_eq!(obstacles[1].position().x, 2000.0 + 700.0);
    }

    #[test]
    fn snowballs_wobble_and_barrels_roll() {
        let mut snowball = obstacle(ObstacleKind::Snowball, 0.0);
        snowball.update(0.0, 1.0 / 60.0);
        assert_relative_eq!(snowball.velocity().y, 0.0);
        let expected = snowball_wobble(400.0, snowball.position().x);
        snowball.update(400.0, 1.0 / 60.0);
        assert_relative_eq!(snowball.velocity().y, expected);
        assert!(snowball.velocity().y.abs() <= 324.0);

        let mut barrel = obstacle(ObstacleKind::Barrel, 0.0);
        assert_eq!(barrel.sprite_key(), "barrel004");
        for _ in 0..15 {
            barrel.update(0.0, 1.0 / 60.0);
        }
        assert_eq!(barrel.sprite_key(), "barrel003");
        assert_relative_eq!(barrel.velocity().y, 0.0);
    }

    #[test]
    fn landing_on_top_is_from_above() {
        let rock = Rect::from_xywh(100.0, 400.0, 50.0, 50.0);
        let previous = Rect::from_xywh(100.0, 300.0, 20.0, 98.0);
        let current = Rect::from_xywh(100.0, 310.0, 20.0, 98.0);
        assert_eq!(classify_contact(&previous, &current, &rock), Some(Contact::FromAbove));
    }

    #[test]
    fn walking_into_a_side_blocks() {
        let rock = Rect::from_xywh(100.0, 400.0, 50.0, 50.0);
        let previous = Rect::from_xywh(75.0, 350.0, 20.0, 100.0);
        let current = Rect::from_xywh(85.0, 350.0, 20.0, 100.0);
        assert_eq!(classify_contact(&previous, &current, &rock), Some(Contact::Side { x: 80.0 }));

        let from_right = Rect::from_xywh(155.0, 350.0, 20.0, 100.0);
        let into_right = Rect::from_xywh(145.0, 350.0, 20.0, 100.0);
        assert_eq!(classify_contact(&from_right, &into_right, &rock), Some(Contact::Side { x: 150.0 }));
    }

    #[test]
    fn no_overlap_no_contact() {
        let rock = Rect::from_xywh(100.0, 400.0, 50.0, 50.0);
        let player = Rect::from_xywh(0.0, 400.0, 20.0, 50.0);
        assert_eq!(classify_contact(&player, &player, &rock), None);
    }
}
