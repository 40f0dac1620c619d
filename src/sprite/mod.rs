// ┌────────────────┬────────────────────────────────────────────────────────┐
// │ mod.rs         │ Animation clips + motion state markers                 │
// │ state.rs       │ Typestate PlayerState<S> and the shared PlayerContext  │
// │ jumping_man.rs │ State machine enum, events, and the Player facade      │
// └────────────────┴────────────────────────────────────────────────────────┘
pub mod jumping_man;
pub mod state;

use crate::engine::Size;

/// Frames per second the game loop updates at; animation ticks count updates
pub const TICKS_PER_SECOND: u32 = 60;

/// Animation clips of the player sprite sheet. Both clips are 6 frames of
/// 231x500; idle is the first walking frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Animation {
    Idle,
    Walk,
    Jump,
}

pub struct SpriteMetadata {
    pub prefix: &'static str,
    pub frame_count: u32,
    pub frame_rate: u32,
    pub looping: bool,
}

impl Animation {
    pub const fn metadata(self) -> SpriteMetadata {
        match self {
            Animation::Idle => SpriteMetadata {
                prefix: "walk",
                frame_count: 1,
                frame_rate: 1,
                looping: false,
            },
            Animation::Walk => SpriteMetadata {
                prefix: "walk",
                frame_count: 6,
                frame_rate: 10,
                looping: true,
            },
            Animation::Jump => SpriteMetadata {
                prefix: "jump",
                frame_count: 6,
                frame_rate: 12,
                // plays once, then holds the last frame until landing
                looping: false,
            },
        }
    }

    /// Sheet frame index after `tick` updates in this clip
    pub fn frame_index(self, tick: u32) -> u32 {
        let metadata = self.metadata();
        let index = tick * metadata.frame_rate / TICKS_PER_SECOND;
        if metadata.looping {
            index % metadata.frame_count
        } else {
            index.min(metadata.frame_count - 1)
        }
    }

    pub fn frame_key(self, tick: u32) -> String {
        format!("{}_{}", self.metadata().prefix, self.frame_index(tick))
    }
}

/// Scale the 231x500 sheet frames are drawn at
pub const PLAYER_SCALE: f32 = 0.32;

/// Bounding box used when the sheet is missing a frame
pub const DEFAULT_PLAYER_SIZE: Size = Size {
    width: 231.0 * PLAYER_SCALE,
    height: 500.0 * PLAYER_SCALE,
};

pub trait SpriteState {
    fn name() -> &'static str;
}

// Motion states. Zero sized, they only exist at the type level.
#[derive(Debug, Copy, Clone)]
pub struct Idle;
#[derive(Debug, Copy, Clone)]
pub struct Walking;
/// airborne and rising after a jump impulse
#[derive(Debug, Copy, Clone)]
pub struct Jumping;
/// airborne and descending: past a jump's apex, or dropping in after a spawn
#[derive(Debug, Copy, Clone)]
pub struct Falling;

impl SpriteState for Idle {
    fn name() -> &'static str {
        "idle"
    }
}

impl SpriteState for Walking {
    fn name() -> &'static str {
        "walking"
    }
}

impl SpriteState for Jumping {
    fn name() -> &'static str {
        "jumping"
    }
}

impl SpriteState for Falling {
    fn name() -> &'static str {
        "falling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_loops_at_ten_frames_per_second() {
        assert_eq!(Animation::Walk.frame_key(0), "walk_0");
        assert_eq!(Animation::Walk.frame_key(6), "walk_1");
        assert_eq!(Animation::Walk.frame_key(35), "walk_5");
        assert_eq!(Animation::Walk.frame_key(36), "walk_0");
    }

    #[test]
    fn jump_plays_once_and_holds_last_frame() {
        assert_eq!(Animation::Jump.frame_key(0), "jump_0");
        assert_eq!(Animation::Jump.frame_key(5), "jump_1");
        assert_eq!(Animation::Jump.frame_key(600), "jump_5");
    }

    #[test]
    fn idle_is_first_walking_frame() {
        assert_eq!(Animation::Idle.frame_key(0), "walk_0");
        assert_eq!(Animation::Idle.frame_key(1000), "walk_0");
    }
}
