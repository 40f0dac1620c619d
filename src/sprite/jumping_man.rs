#[cfg(debug_assertions)]
use crate::engine::DebugDraw;
use crate::engine::{Image, Point, Rect, Renderer, Sheet, Size};
use crate::sprite::state::{Heading, IsFalling, IsJumping, PlayerContext, PlayerState};
use crate::sprite::{self, Animation, SpriteState, DEFAULT_PLAYER_SIZE, PLAYER_SCALE};
use std::rc::Rc;

/// ┌──────────────── State Transition Flow ──────────────────┐
/// │  From State  →  Event          →  To State              │
/// ├─────────────────────────────────────────────────────────┤
/// │  Idle        →  Run(Left/Right)→  Walking               │
/// │  Walking     →  Run(Still)     →  Idle                  │
/// │  Idle        →  Jump           →  Jumping               │
/// │  Walking     →  Jump           →  Jumping               │
/// │  Jumping     →  Update         →  Falling  (apex)       │
/// │  Jumping     →  Update         →  Idle     (landed)     │
/// │  Falling     →  Update         →  Idle     (landed)     │
/// └─────────────────────────────────────────────────────────┘
#[derive(Debug, Copy, Clone)]
pub enum Event {
    Run(Heading),
    Jump,
    Update(f32),
}

#[derive(Debug, Copy, Clone)]
enum PlayerStateMachine {
    Idle(PlayerState<sprite::Idle>),
    Walking(PlayerState<sprite::Walking>),
    Jumping(PlayerState<sprite::Jumping>),
    Falling(PlayerState<sprite::Falling>),
}

impl From<PlayerState<sprite::Idle>> for PlayerStateMachine {
    fn from(state: PlayerState<sprite::Idle>) -> Self {
        PlayerStateMachine::Idle(state)
    }
}

impl From<PlayerState<sprite::Walking>> for PlayerStateMachine {
    fn from(state: PlayerState<sprite::Walking>) -> Self {
        PlayerStateMachine::Walking(state)
    }
}

impl From<PlayerState<sprite::Jumping>> for PlayerStateMachine {
    fn from(state: PlayerState<sprite::Jumping>) -> Self {
        PlayerStateMachine::Jumping(state)
    }
}

impl From<PlayerState<sprite::Falling>> for PlayerStateMachine {
    fn from(state: PlayerState<sprite::Falling>) -> Self {
        PlayerStateMachine::Falling(state)
    }
}

impl From<IsJumping> for PlayerStateMachine {
    fn from(is_jumping: IsJumping) -> Self {
        match is_jumping {
            IsJumping::Rising(state) => state.into(),
            IsJumping::Apex(state) => state.into(),
            IsJumping::Landed(state) => state.into(),
        }
    }
}

impl From<IsFalling> for PlayerStateMachine {
    fn from(is_falling: IsFalling) -> Self {
        match is_falling {
            IsFalling::Airborne(state) => state.into(),
            IsFalling::Landed(state) => state.into(),
        }
    }
}

impl PlayerStateMachine {
    // consumes the current state and returns the next one, so the old state
    // can't be touched after a transition
    fn transition(self, event: Event) -> Self {
        use PlayerStateMachine::*;
        match (self, event) {
            (Idle(state), Event::Run(Heading::Still)) => state.halt().into(),
            (Idle(state), Event::Run(heading)) => state.walk(heading).into(),
            (Walking(state), Event::Run(Heading::Still)) => state.stop().into(),
            (Walking(state), Event::Run(heading)) => state.steer(heading).into(),
            (Jumping(state), Event::Run(heading)) => state.steer(heading).into(),
            (Falling(state), Event::Run(heading)) => state.steer(heading).into(),

            (Idle(state), Event::Jump) => state.jump().into(),
            (Walking(state), Event::Jump) => state.jump().into(),

            (Idle(state), Event::Update(seconds)) => state.update(seconds).into(),
            (Walking(state), Event::Update(seconds)) => state.update(seconds).into(),
            (Jumping(state), Event::Update(seconds)) => state.update(seconds).into(),
            (Falling(state), Event::Update(seconds)) => state.update(seconds).into(),

            // jumping again while airborne is ignored
            (Jumping(_), Event::Jump) | (Falling(_), Event::Jump) => self,
        }
    }

    fn block_at(self, x: f32) -> Self {
        use PlayerStateMachine::*;
        match self {
            Idle(state) => Idle(state.block_at(x)),
            Walking(state) => Walking(state.block_at(x)),
            Jumping(state) => Jumping(state.block_at(x)),
            Falling(state) => Falling(state.block_at(x)),
        }
    }

    fn clamp_x(self, min: f32, max: f32) -> Self {
        use PlayerStateMachine::*;
        match self {
            Idle(state) => Idle(state.clamp_x(min, max)),
            Walking(state) => Walking(state.clamp_x(min, max)),
            Jumping(state) => Jumping(state.clamp_x(min, max)),
            Falling(state) => Falling(state.clamp_x(min, max)),
        }
    }

    fn context(&self) -> &PlayerContext {
        use PlayerStateMachine::*;
        match self {
            Idle(state) => state.context(),
            Walking(state) => state.context(),
            Jumping(state) => state.context(),
            Falling(state) => state.context(),
        }
    }

    fn name(&self) -> &'static str {
        use PlayerStateMachine::*;
        match self {
            Idle(_) => sprite::Idle::name(),
            Walking(_) => sprite::Walking::name(),
            Jumping(_) => sprite::Jumping::name(),
            Falling(_) => sprite::Falling::name(),
        }
    }
}

/// Held direction and jump keys for one update
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Controls {
    pub left: bool,
    pub right: bool,
    pub up: bool,
}

/// Player sprite sheet and the image it indexes
pub struct SpriteSheet {
    pub sheet: Rc<Sheet>,
    pub image: Image,
}

impl SpriteSheet {
    /// On-screen size of a sheet frame, or the default when it's missing
    pub fn frame_size(&self, key: &str) -> Size {
        self.sheet
            .frames
            .get(key)
            .map(|cell| {
                Size {
                    width: cell.frame.w.into(),
                    height: cell.frame.h.into(),
                }
                .scaled(PLAYER_SCALE)
            })
            .unwrap_or_else(|| {
                log!("Warning: Missing sprite data for frame: {}", key);
                DEFAULT_PLAYER_SIZE
            })
    }
}

/// JumpingMan
/// - control() -> Run / Jump / Update events, once per frame
/// - the state machine owns physics; the level only pushes back on contact
pub struct JumpingMan {
    state: PlayerStateMachine,
}

impl JumpingMan {
    pub fn spawn(position: Point, size: Size, ground: f32) -> Self {
        JumpingMan {
            state: PlayerState::<sprite::Falling>::spawn(position, size, ground).into(),
        }
    }

    /// One frame of input then physics; order matters: steering sets the
    /// velocity the jump and the apex check see
    pub fn control(&mut self, controls: Controls, seconds: f32) {
        let heading = Heading::from_keys(controls.left, controls.right);
        self.state = self.state.transition(Event::Run(heading));
        if controls.up {
            self.state = self.state.transition(Event::Jump);
        }
        self.state = self.state.transition(Event::Update(seconds));
    }

    pub fn block_at(&mut self, x: f32) {
        self.state = self.state.block_at(x);
    }

    pub fn clamp_x(&mut self, min: f32, max: f32) {
        self.state = self.state.clamp_x(min, max);
    }

    // Law of Demeter: callers ask the player, not its context
    pub fn position(&self) -> Point {
        self.state.context().position
    }

    pub fn velocity(&self) -> Point {
        self.state.context().velocity
    }

    pub fn bounding_box(&self) -> Rect {
        Rect::new(self.position(), self.state.context().size)
    }

    pub fn animation(&self) -> Animation {
        self.state.context().animation
    }

    pub fn is_grounded(&self) -> bool {
        self.state.context().is_grounded()
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn current_frame_name(&self) -> String {
        let context = self.state.context();
        context.animation.frame_key(context.tick)
    }

    pub fn draw(&self, renderer: &Renderer, sprites: Option<&SpriteSheet>, camera_x: f32) {
        let destination = self.bounding_box().scrolled(camera_x);
        let frame_name = self.current_frame_name();
        let cell = sprites.and_then(|sprites| Some((sprites, sprites.sheet.frames.get(&frame_name)?)));

        match cell {
            Some((sprites, cell)) => {
                let frame = Rect::from(cell.frame);
                if self.state.context().facing_left {
                    renderer.draw_sprite_flipped(&sprites.image, &frame, &destination);
                } else {
                    renderer.draw_sprite(&sprites.image, &frame, &destination);
                }
            }
            None => renderer.fill_rect(&destination, "#3366CC"),
        }

        #[cfg(debug_assertions)]
        destination.draw_debug(renderer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::state::{AIR_CONTROL, LEFT_SPEED, RIGHT_SPEED};
    use approx::assert_relative_eq;

    const GROUND: f32 = 490.0;
    const STEP: f32 = 1.0 / 60.0;

    fn grounded_player() -> JumpingMan {
        let mut player = JumpingMan::spawn(Point { x: 100.0, y: GROUND - 160.0 }, DEFAULT_PLAYER_SIZE, GROUND);
        for _ in 0..10 {
            player.control(Controls::default(), STEP);
        }
        assert!(player.is_grounded());
        player
    }

    #[test]
    fn spawned_player_falls_then_lands_idle() {
        let mut player = JumpingMan::spawn(Point { x: 100.0, y: 100.0 }, DEFAULT_PLAYER_SIZE, GROUND);
        assert_eq!(player.state_name(), "falling");
        for _ in 0..120 {
            player.control(Controls::default(), STEP);
        }
        assert_eq!(player.state_name(), "idle");
        assert_eq!(player.animation(), Animation::Idle);
        assert_relative_eq!(player.bounding_box().bottom(), GROUND);
    }

    #[test]
    fn grounded_speeds_are_asymmetric() {
        let mut player = grounded_player();
        player.control(Controls { right: true, ..Controls::default() }, STEP);
        assert_eq!(player.state_name(), "walking");
        assert_eq!(player.animation(), Animation::Walk);
        assert_relative_eq!(player.velocity().x, RIGHT_SPEED);

        player.control(Controls { left: true, ..Controls::default() }, STEP);
        assert_relative_eq!(player.velocity().x, -LEFT_SPEED);

        player.control(Controls::default(), STEP);
        assert_eq!(player.state_name(), "idle");
        assert_relative_eq!(player.velocity().x, 0.0);
    }

    #[test]
    fn airborne_steering_is_sixty_percent() {
        let mut player = grounded_player();
        player.control(Controls { up: true, right: true, ..Controls::default() }, STEP);
        assert_eq!(player.state_name(), "jumping");
        player.control(Controls { right: true, ..Controls::default() }, STEP);
        assert_relative_eq!(player.velocity().x, RIGHT_SPEED * AIR_CONTROL);

        player.control(Controls { left: true, ..Controls::default() }, STEP);
        assert_relative_eq!(player.velocity().x, -LEFT_SPEED * AIR_CONTROL);
    }

    #[test]
    fn jump_plays_until_apex_then_walks_when_moving() {
        let mut player = grounded_player();
        player.control(Controls { up: true, ..Controls::default() }, STEP);
        assert_eq!(player.animation(), Animation::Jump);

        let held = Controls { right: true, ..Controls::default() };
        let mut frames = 0;
        while player.state_name() == "jumping" {
            assert_eq!(player.animation(), Animation::Jump);
            assert!(player.velocity().y <= 0.0);
            player.control(held, STEP);
            frames += 1;
            assert!(frames < 120, "never reached the apex");
        }
        assert_eq!(player.state_name(), "falling");
        assert_eq!(player.animation(), Animation::Walk);
        assert!(player.velocity().y > 0.0);
    }

    #[test]
    fn apex_without_keys_switches_to_idle() {
        let mut player = grounded_player();
        player.control(Controls { up: true, ..Controls::default() }, STEP);
        while player.state_name() == "jumping" {
            player.control(Controls::default(), STEP);
        }
        assert_eq!(player.animation(), Animation::Idle);
    }

    #[test]
    fn holding_up_in_the_air_does_not_jump_again() {
        let mut player = grounded_player();
        let up = Controls { up: true, ..Controls::default() };
        player.control(up, STEP);
        let rising = player.velocity().y;
        player.control(up, STEP);
        assert!(player.velocity().y > rising, "gravity only, no second impulse");
    }

    #[test]
    fn landing_forces_idle_and_allows_the_next_jump() {
        let mut player = grounded_player();
        let held = Controls { right: true, up: true, ..Controls::default() };
        player.control(held, STEP);
        let mut frames = 0;
        while !player.is_grounded() {
            player.control(Controls { right: true, ..Controls::default() }, STEP);
            frames += 1;
            assert!(frames < 240, "never landed");
        }
        assert_eq!(player.state_name(), "idle");
        assert_eq!(player.animation(), Animation::Idle);

        player.control(Controls { up: true, ..Controls::default() }, STEP);
        assert_eq!(player.state_name(), "jumping");
    }

    #[test]
    fn blocking_stops_horizontal_motion_without_changing_state() {
        let mut player = grounded_player();
        player.control(Controls { right: true, ..Controls::default() }, STEP);
        player.block_at(250.0);
        assert_eq!(player.state_name(), "walking");
        assert_relative_eq!(player.position().x, 250.0);
        assert_relative_eq!(player.velocity().x, 0.0);
    }

    #[test]
    fn clamp_keeps_player_inside_the_world() {
        let mut player = grounded_player();
        player.clamp_x(150.0, 1000.0);
        assert_relative_eq!(player.position().x, 150.0);
    }
}
