use crate::engine::{self, VIEWPORT};
use crate::obstacle::{ObstacleKind, ObstacleSpawn};

/// Lowest edge of walkable ground: 100px of ground plus a 130px platform
/// raise above the bottom of the view
pub const GROUND_Y: f32 = VIEWPORT.height - 100.0 - 130.0;

/// Where the player (re)enters every level, as a top left corner
pub const PLAYER_START_X: f32 = 100.0;
pub const PLAYER_START_HEIGHT: f32 = 250.0;

/// Goal actor distance past the last obstacle
const GOAL_SPACING: f32 = 600.0;
/// World extent past the last obstacle
const WORLD_TAIL: f32 = 800.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    One,
    Two,
    Three,
}

/// A tiled background layer scrolled at `factor` times the camera
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ParallaxLayer {
    pub key: &'static str,
    pub path: &'static str,
    pub factor: f32,
}

/// Terminal sprite whose proximity completes the level
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GoalActor {
    pub key: &'static str,
    pub path: &'static str,
    pub scale: f32,
    /// completion fires once the player is within this distance of it
    pub trigger_offset: f32,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::One, Level::Two, Level::Three];

    pub fn from_number(number: u8) -> Option<Level> {
        match number {
            1 => Some(Level::One),
            2 => Some(Level::Two),
            3 => Some(Level::Three),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Level::One => 1,
            Level::Two => 2,
            Level::Three => 3,
        }
    }

    /// Storage key of this level's best time
    pub fn key(self) -> String {
        format!("level{}", self.number())
    }

    /// Level after this one; the last wraps around to the first
    pub fn next(self) -> Level {
        match self {
            Level::One => Level::Two,
            Level::Two => Level::Three,
            Level::Three => Level::One,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Level::One => "Forest Adventure",
            Level::Two => "Castle Challenge",
            Level::Three => "Mountain Adventure",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Level::One => "Rock Obstacles",
            Level::Two => "Rolling Barrels",
            Level::Three => "Rocks & Flying Snowballs",
        }
    }

    pub fn layers(self) -> &'static [ParallaxLayer] {
        match self {
            Level::One => &LEVEL_ONE_LAYERS,
            Level::Two => &LEVEL_TWO_LAYERS,
            Level::Three => &LEVEL_THREE_LAYERS,
        }
    }

    pub fn goal(self) -> GoalActor {
        match self {
            Level::One => GoalActor {
                key: "dvorac",
                path: "assets/images/dvorac.png",
                scale: 0.96,
                trigger_offset: 300.0,
            },
            Level::Two => GoalActor {
                key: "wizard",
                path: "assets/images/wizard.png",
                scale: 0.25,
                trigger_offset: 300.0,
            },
            Level::Three => GoalActor {
                key: "snow_princess",
                path: "assets/images/background/level3/SnowPrincess.png",
                scale: 0.6,
                // tighter: the run ends right next to the Snow Princess
                trigger_offset: 200.0,
            },
        }
    }

    /// HUD text color readable over the level's background
    pub fn text_color(self) -> &'static str {
        match self {
            Level::Three => "#000",
            Level::One | Level::Two => "#fff",
        }
    }

    /// Initial obstacle placement, left to right
    pub fn layout(self) -> Vec<ObstacleSpawn> {
        let ground = GROUND_Y;
        match self {
            Level::One => (0..10)
                .map(|i| ObstacleSpawn {
                    kind: ObstacleKind::Rock(engine::random_index(6) as u8 + 1),
                    x: 400.0 + i as f32 * 450.0,
                    bottom: ground,
                    scale: engine::random_range(0.4, 0.6),
                })
                .collect(),
            Level::Two => (0..10)
                .map(|i| ObstacleSpawn {
                    kind: ObstacleKind::Barrel,
                    x: 800.0 + i as f32 * 300.0,
                    bottom: ground,
                    scale: 0.2,
                })
                .collect(),
            Level::Three => {
                let ice_rocks = (0..9).map(|i| ObstacleSpawn {
                    kind: ObstacleKind::IceRock(engine::random_index(5) as u8 + 1),
                    x: 400.0 + i as f32 * 450.0,
                    bottom: ground,
                    scale: engine::random_range(0.08, 0.12),
                });
                let snowballs = (0..5).map(|j| ObstacleSpawn {
                    kind: ObstacleKind::Snowball,
                    x: 800.0 + j as f32 * 700.0,
                    bottom: ground - 400.0,
                    scale: 0.3,
                });
                ice_rocks.chain(snowballs).collect()
            }
        }
    }
}

/// Horizontal position of the goal actor for a given layout: a fixed gap
/// past the last placed obstacle
pub fn goal_x(layout: &[ObstacleSpawn]) -> f32 {
    layout.last().map(|spawn| spawn.x).unwrap_or_default() + GOAL_SPACING
}

/// Width of the world (and camera bounds) for a given layout
pub fn world_width(layout: &[ObstacleSpawn]) -> f32 {
    (layout.last().map(|spawn| spawn.x).unwrap_or_default() + WORLD_TAIL).max(VIEWPORT.width)
}

const LEVEL_ONE_LAYERS: [ParallaxLayer; 5] = [
    ParallaxLayer {
        key: "sky",
        path: "assets/images/background/sky.png",
        factor: 0.4,
    },
    ParallaxLayer {
        key: "mountains",
        path: "assets/images/background/mountains.png",
        factor: 0.5,
    },
    ParallaxLayer {
        key: "trees",
        path: "assets/images/background/trees.png",
        factor: 0.6,
    },
    ParallaxLayer {
        key: "path",
        path: "assets/images/background/path.png",
        factor: 0.7,
    },
    ParallaxLayer {
        key: "stone_bottom",
        path: "assets/images/background/stone_bottom.png",
        factor: 0.3,
    },
];

const LEVEL_TWO_LAYERS: [ParallaxLayer; 3] = [
    ParallaxLayer {
        key: "level2_castle_wall",
        path: "assets/images/background/level2/castle_wall.png",
        factor: 0.3,
    },
    ParallaxLayer {
        key: "level2_path",
        path: "assets/images/background/level2/path.png",
        factor: 0.7,
    },
    ParallaxLayer {
        key: "level2_bottom",
        path: "assets/images/background/level2/bottom.png",
        factor: 0.3,
    },
];

const LEVEL_THREE_LAYERS: [ParallaxLayer; 4] = [
    ParallaxLayer {
        key: "level3_sky",
        path: "assets/images/background/level3/level3_sky.png",
        factor: 0.4,
    },
    ParallaxLayer {
        key: "level3_mountains",
        path: "assets/images/background/level3/level3_mountains.png",
        factor: 0.5,
    },
    ParallaxLayer {
        key: "level3_path",
        path: "assets/images/background/level3/level3_path.png",
        factor: 0.7,
    },
    ParallaxLayer {
        key: "level3_StoneBottom",
        path: "assets/images/background/level3/level3_StoneBottom.png",
        factor: 0.3,
    },
];

/// Offset of a tiled layer into its texture: the layer scrolls at `factor`
/// of the camera and wraps every `texture_width`
pub fn parallax_offset(camera_x: f32, factor: f32, texture_width: f32) -> f32 {
    if texture_width <= 0.0 {
        return 0.0;
    }
    (camera_x * factor).rem_euclid(texture_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn level_numbers_round_trip_and_next_wraps() {
        for level in Level::ALL {
            assert_eq!(Level::from_number(level.number()), Some(level));
        }
        assert_eq!(Level::from_number(0), None);
        assert_eq!(Level::from_number(4), None);
        assert_eq!(Level::One.next(), Level::Two);
        assert_eq!(Level::Three.next(), Level::One);
        assert_eq!(Level::Two.key(), "level2");
    }

    #[test]
    fn level_one_is_ten_evenly_spaced_rocks() {
        let layout = Level::One.layout();
        assert_eq!(layout.len(), 10);
        for (i, spawn) in layout.iter().enumerate() {
            assert!(matches!(spawn.kind, ObstacleKind::Rock(1..=6)));
            assert_relative_eq!(spawn.x, 400.0 + i as f32 * 450.0);
            assert_relative_eq!(spawn.bottom, GROUND_Y);
            assert!((0.4..0.6).contains(&spawn.scale));
        }
        assert_relative_eq!(goal_x(&layout), 4450.0 + 600.0);
        assert_relative_eq!(world_width(&layout), 4450.0 + 800.0);
    }

    #[test]
    fn level_two_barrels_start_off_screen() {
        let layout = Level::Two.layout();
        assert_eq!(layout.len(), 10);
        assert!(layout.iter().all(|spawn| spawn.kind == ObstacleKind::Barrel));
        assert_relative_eq!(layout[0].x, 800.0);
        assert_relative_eq!(layout[9].x, 800.0 + 9.0 * 300.0);
    }

    #[test]
    fn level_three_mixes_ground_ice_and_elevated_snowballs() {
        let layout = Level::Three.layout();
        assert_eq!(layout.len(), 14);
        let (ice, snow) = layout.split_at(9);
        assert!(ice.iter().all(|spawn| matches!(spawn.kind, ObstacleKind::IceRock(1..=5))));
        assert!(ice.iter().all(|spawn| spawn.bottom == GROUND_Y));
        assert!(snow.iter().all(|spawn| spawn.kind == ObstacleKind::Snowball));
        assert!(snow.iter().all(|spawn| spawn.bottom == GROUND_Y - 400.0));
        assert_relative_eq!(snow[4].x, 800.0 + 4.0 * 700.0);
        // goal follows the last placed obstacle, a snowball
        assert_relative_eq!(goal_x(&layout), 3600.0 + 600.0);
    }

    #[test]
    fn level_three_triggers_closer_to_the_goal() {
        assert_relative_eq!(Level::One.goal().trigger_offset, 300.0);
        assert_relative_eq!(Level::Two.goal().trigger_offset, 300.0);
        assert_relative_eq!(Level::Three.goal().trigger_offset, 200.0);
    }

    #[test]
    fn parallax_wraps_by_texture_width() {
        assert_relative_eq!(parallax_offset(1000.0, 0.4, 300.0), 100.0);
        assert_relative_eq!(parallax_offset(0.0, 0.7, 300.0), 0.0);
        assert_relative_eq!(parallax_offset(500.0, 0.5, 0.0), 0.0);
    }
}
