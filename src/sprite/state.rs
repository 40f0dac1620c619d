/// Every motion state lives behind this module and a transition is only
/// reachable through the methods below, so a player can't be "grounded and
/// jumping" or "past the apex while rising":
/// - PUBLIC  : PlayerState<S> and PlayerContext
/// - PRIVATE : the context mutators
use crate::engine::{Point, Size};
use crate::sprite::{Animation, Falling, Idle, Jumping, Walking};

// physics consts, in pixels and seconds
pub const GRAVITY: f32 = 1400.0;
pub const JUMP_SPEED: f32 = -800.0; // negative because top left is origin
pub const LEFT_SPEED: f32 = 800.0;
pub const RIGHT_SPEED: f32 = 900.0;
/// airborne steering keeps 60% of the grounded speed
pub const AIR_CONTROL: f32 = 0.6;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Heading {
    Left,
    Right,
    Still,
}

impl Heading {
    pub fn from_keys(left: bool, right: bool) -> Self {
        // left wins when both are held
        if left {
            Heading::Left
        } else if right {
            Heading::Right
        } else {
            Heading::Still
        }
    }

    pub fn velocity(self, grounded: bool) -> f32 {
        let factor = if grounded { 1.0 } else { AIR_CONTROL };
        match self {
            Heading::Left => -LEFT_SPEED * factor,
            Heading::Right => RIGHT_SPEED * factor,
            Heading::Still => 0.0,
        }
    }

    fn animation(self) -> Animation {
        match self {
            Heading::Still => Animation::Idle,
            Heading::Left | Heading::Right => Animation::Walk,
        }
    }
}

pub enum IsJumping {
    Rising(PlayerState<Jumping>),
    Apex(PlayerState<Falling>),
    Landed(PlayerState<Idle>),
}

pub enum IsFalling {
    Airborne(PlayerState<Falling>),
    Landed(PlayerState<Idle>),
}

#[derive(Debug, Copy, Clone, PartialEq)]
/// Shared data for :
/// - physics : position (top left) + velocity + floor
/// - display : animation clip + ticks spent in it + facing
pub struct PlayerContext {
    pub tick: u32,
    pub position: Point,
    pub velocity: Point,
    pub size: Size,
    pub animation: Animation,
    pub facing_left: bool,
    floor: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct PlayerState<S> {
    context: PlayerContext,
    // type-level marker only; never read
    _state: S,
}

impl<S> PlayerState<S> {
    pub fn context(&self) -> &PlayerContext {
        &self.context
    }

    /// Push the player back to `x` after a side contact
    pub fn block_at(mut self, x: f32) -> Self {
        self.context.position.x = x;
        self.context.velocity.x = 0.0;
        self
    }

    pub fn clamp_x(mut self, min: f32, max: f32) -> Self {
        self.context.position.x = self.context.position.x.clamp(min, max.max(min));
        self
    }
}

impl PlayerState<Falling> {
    /// Drop the player in at `position`; it falls until it reaches `ground`
    pub fn spawn(position: Point, size: Size, ground: f32) -> Self {
        PlayerState {
            context: PlayerContext {
                tick: 0,
                position,
                velocity: Point::default(),
                size,
                animation: Animation::Idle,
                facing_left: false,
                floor: ground - size.height,
            },
            _state: Falling,
        }
    }

    pub fn steer(mut self, heading: Heading) -> Self {
        self.context = self
            .context
            .with_heading(heading, false)
            .play(heading.animation());
        self
    }

    pub fn update(mut self, seconds: f32) -> IsFalling {
        self.context = self.context.update(seconds);
        if self.context.is_grounded() {
            IsFalling::Landed(self.land())
        } else {
            IsFalling::Airborne(self)
        }
    }

    fn land(self) -> PlayerState<Idle> {
        PlayerState {
            context: self.context.play(Animation::Idle),
            _state: Idle,
        }
    }
}

impl PlayerState<Idle> {
    pub fn update(mut self, seconds: f32) -> Self {
        self.context = self.context.update(seconds);
        self
    }

    pub fn halt(mut self) -> Self {
        self.context = self.context.with_heading(Heading::Still, true);
        self
    }

    pub fn walk(self, heading: Heading) -> PlayerState<Walking> {
        PlayerState {
            context: self
                .context
                .with_heading(heading, true)
                .play(Animation::Walk),
            _state: Walking,
        }
    }

    pub fn jump(self) -> PlayerState<Jumping> {
        PlayerState {
            context: self.context.launch(),
            _state: Jumping,
        }
    }
}

impl PlayerState<Walking> {
    pub fn update(mut self, seconds: f32) -> Self {
        self.context = self.context.update(seconds);
        self
    }

    pub fn steer(mut self, heading: Heading) -> Self {
        self.context = self.context.with_heading(heading, true);
        self
    }

    pub fn stop(self) -> PlayerState<Idle> {
        PlayerState {
            context: self
                .context
                .with_heading(Heading::Still, true)
                .play(Animation::Idle),
            _state: Idle,
        }
    }

    pub fn jump(self) -> PlayerState<Jumping> {
        PlayerState {
            context: self.context.launch(),
            _state: Jumping,
        }
    }
}

impl PlayerState<Jumping> {
    /// Steering while rising never interrupts the jump clip
    pub fn steer(mut self, heading: Heading) -> Self {
        self.context = self.context.with_heading(heading, false);
        self
    }

    pub fn update(mut self, seconds: f32) -> IsJumping {
        self.context = self.context.update(seconds);
        if self.context.is_grounded() {
            IsJumping::Landed(PlayerState {
                context: self.context.play(Animation::Idle),
                _state: Idle,
            })
        } else if self.context.velocity.y > 0.0 {
            // apex: first update where the vertical velocity points down
            let animation = if self.context.velocity.x == 0.0 {
                Animation::Idle
            } else {
                Animation::Walk
            };
            IsJumping::Apex(PlayerState {
                context: self.context.play(animation),
                _state: Falling,
            })
        } else {
            IsJumping::Rising(self)
        }
    }
}

impl PlayerContext {
    /// ::update per frame
    /// - gravity -> velocity -> position
    /// - clamp to the floor
    /// - advance the animation tick
    fn update(mut self, seconds: f32) -> Self {
        self.velocity.y += GRAVITY * seconds;
        self.position.x += self.velocity.x * seconds;
        self.position.y += self.velocity.y * seconds;

        if self.position.y >= self.floor {
            self.position.y = self.floor;
            if self.velocity.y > 0.0 {
                self.velocity.y = 0.0;
            }
        }

        self.tick = self.tick.wrapping_add(1);
        self
    }

    pub fn is_grounded(&self) -> bool {
        self.position.y >= self.floor
    }

    fn with_heading(mut self, heading: Heading, grounded: bool) -> Self {
        self.velocity.x = heading.velocity(grounded);
        match heading {
            Heading::Left => self.facing_left = true,
            Heading::Right => self.facing_left = false,
            Heading::Still => {}
        }
        self
    }

    /// Switch clip; the tick restarts only when the clip actually changes,
    /// so a held walk keeps cycling
    fn play(mut self, animation: Animation) -> Self {
        if self.animation != animation {
            self.animation = animation;
            self.tick = 0;
        }
        self
    }

    fn launch(mut self) -> Self {
        self.velocity.y = JUMP_SPEED;
        self.animation = Animation::Jump;
        self.tick = 0;
        self
    }
}
