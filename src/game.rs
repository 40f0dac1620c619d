use crate::browser;
use crate::engine::input::{self, InputState};
use crate::engine::{
    self, EventListener, Frame, Game, Image, ParticleBurst, Point, Rect, Renderer, Sheet, Size,
    TextAlign, VIEWPORT,
};
use crate::level::{self, GoalActor, Level, ParallaxLayer, GROUND_Y, PLAYER_START_HEIGHT, PLAYER_START_X};
use crate::obstacle::{self, Contact, Obstacle, ObstacleSpawn};
use crate::score::{
    HighScore, HighScoreStore, KeyValueStore, ScoreStorage, Signature, SignatureBuffer,
    SignatureInput,
};
use crate::sprite::jumping_man::{Controls, JumpingMan, SpriteSheet};
use crate::sprite::DEFAULT_PLAYER_SIZE;
use crate::timer::{format_time, LevelTimer};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use futures::future::join_all;
use futures::join;
use std::collections::HashMap;
use std::rc::Rc;
use web_sys::HtmlImageElement;

/// ┌───────────────────────── Scene flow ──────────────────────────┐
/// │                                                               │
/// │   Menu ──Play──────────────────────────┐                      │
/// │    │ ├──Levels──► LevelSelect ──N──────┤                      │
/// │    │ └──High Scores──► HighScores      ▼                      │
/// │    ▲                               Playing(Run)               │
/// │    │                                   │                      │
/// │    │        Active ──hit──► Dying ──1s──┬──► Active (respawn) │
/// │    │          │                         └──► GameOver         │
/// │    │          └──goal──► SignatureEntry (new best)            │
/// │    │                         │                                │
/// │    │                         ▼                                │
/// │    └──Main Menu──────── Completed ──Restart / Next──► Playing │
/// └───────────────────────────────────────────────────────────────┘
pub enum JumpingManGame {
    /// Assets are still loading
    Loading,
    Loaded(Box<Session>),
}

impl JumpingManGame {
    const SHEET_PATH: &'static str = "assets/images/CharSpriteSheets/jumping_man.json";
    const IMAGE_PATH: &'static str = "assets/images/CharSpriteSheets/jumping_man.png";

    pub fn new() -> Self {
        JumpingManGame::Loading
    }

    async fn load_sprite_sheet() -> Result<Sheet> {
        browser::fetch_json::<Sheet>(Self::SHEET_PATH)
            .await
            .with_context(|| format!("Failed to load sprite sheet from : {}", Self::SHEET_PATH))
    }

    async fn load_sprite_image() -> Result<HtmlImageElement> {
        engine::load_image(Self::IMAGE_PATH).await.with_context(|| {
            format!(
                "Failed to load sprite image resource from : {}",
                Self::IMAGE_PATH
            )
        })
    }
}

impl Default for JumpingManGame {
    fn default() -> Self {
        JumpingManGame::new()
    }
}

#[async_trait(?Send)]
impl Game for JumpingManGame {
    async fn initialize(&self) -> Result<Box<dyn Game>> {
        match self {
            JumpingManGame::Loading => {
                // everything loads in parallel; a missing image only costs
                // its own decoration
                let (sheet, image, images) = join!(
                    Self::load_sprite_sheet(),
                    Self::load_sprite_image(),
                    load_images(),
                );
                let player = match (sheet, image) {
                    (Ok(sheet), Ok(image)) => Some(SpriteSheet {
                        sheet: Rc::new(sheet),
                        image: Image::new(image),
                    }),
                    (Err(err), _) | (_, Err(err)) => {
                        error!("Player sprites unavailable : {:#}", err);
                        None
                    }
                };
                let assets = Assets { player, images };
                Ok(Box::new(JumpingManGame::Loaded(Box::new(Session::new(assets)))))
            }
            JumpingManGame::Loaded(_) => Err(anyhow!("Game is already initialized")),
        }
    }

    fn update(&mut self, input: &InputState, frame: Frame) {
        if let JumpingManGame::Loaded(session) = self {
            session.update(input, frame);
        }
    }

    fn draw(&self, renderer: &Renderer) {
        if let JumpingManGame::Loaded(session) = self {
            session.draw(renderer);
        }
    }
}

// ==================== Assets ====================
const HEART: &str = "heart";
const PARTICLE: &str = "explosion_particle";

const IMAGE_SOURCES: [(&str, &str); 18] = [
    (HEART, "assets/images/heart.png"),
    (PARTICLE, "assets/images/explosion_particle.png"),
    ("rock1", "assets/images/boulder-stones-clipart-design-illustration-free-png.png"),
    ("rock2", "assets/images/boulder-stones-clipart-design-illustration-free-png (1).png"),
    ("rock3", "assets/images/boulder-stones-clipart-design-illustration-free-png (2).png"),
    ("rock4", "assets/images/boulder-stones-clipart-design-illustration-free-png (3).png"),
    ("rock5", "assets/images/boulder-stones-clipart-design-illustration-free-png (4).png"),
    ("rock6", "assets/images/boulder-stones-clipart-design-illustration-free-png (5).png"),
    ("icerock1", "assets/images/background/level3/icerock01.png"),
    ("icerock2", "assets/images/background/level3/icerock02.png"),
    ("icerock3", "assets/images/background/level3/icerock03.png"),
    ("icerock4", "assets/images/background/level3/icerock04.png"),
    ("icerock5", "assets/images/background/level3/icerock05.png"),
    ("barrel001", "assets/images/RotatingBarrel/barrel001.png"),
    ("barrel002", "assets/images/RotatingBarrel/barrel002.png"),
    ("barrel003", "assets/images/RotatingBarrel/barrel003.png"),
    ("barrel004", "assets/images/RotatingBarrel/barrel004.png"),
    ("snowball", "assets/images/background/level3/snowball.png"),
];

async fn load_images() -> HashMap<String, Image> {
    let layers = Level::ALL
        .into_iter()
        .flat_map(|level| level.layers().iter().map(|layer| (layer.key, layer.path)));
    let goals = Level::ALL.into_iter().map(|level| {
        let goal = level.goal();
        (goal.key, goal.path)
    });
    let sources: Vec<(&'static str, &'static str)> =
        IMAGE_SOURCES.iter().copied().chain(layers).chain(goals).collect();

    let loads = sources.into_iter().map(|(key, path)| async move {
        let result = engine::load_image(path)
            .await
            .with_context(|| format!("Failed to load image '{}' from : {}", key, path));
        (key, result)
    });

    join_all(loads)
        .await
        .into_iter()
        .filter_map(|(key, result)| match result {
            Ok(element) => Some((key.to_string(), Image::new(element))),
            Err(err) => {
                error!("{:#}", err);
                None
            }
        })
        .collect()
}

#[derive(Default)]
pub struct Assets {
    player: Option<SpriteSheet>,
    images: HashMap<String, Image>,
}

impl Assets {
    /// Decoded, non-empty image for `key`
    pub fn image(&self, key: &str) -> Option<&Image> {
        self.images.get(key).filter(|image| image.is_valid())
    }

    fn player_size(&self) -> Size {
        self.player
            .as_ref()
            .map(|sprites| sprites.frame_size("walk_0"))
            .unwrap_or(DEFAULT_PLAYER_SIZE)
    }

    fn obstacle_size(&self, spawn: &ObstacleSpawn) -> Size {
        self.image(&spawn.kind.base_key())
            .map(|image| image.size().scaled(spawn.scale))
            .unwrap_or_else(|| spawn.kind.fallback_size())
    }

    fn goal_size(&self, actor: &GoalActor) -> Size {
        self.image(actor.key)
            .map(|image| image.size().scaled(actor.scale))
            .unwrap_or(GOAL_PLACEHOLDER)
    }
}

// ==================== Scene entry ====================
pub const STARTING_LIVES: u8 = 3;

/// How a level run is entered: which level, and what happens to lives
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SceneEntry {
    pub level: Level,
    pub lives: Option<u8>,
    pub reset: bool,
}

impl SceneEntry {
    /// Unknown level numbers start level 1
    pub fn new(level: u8, lives: Option<u8>, reset: bool) -> Self {
        SceneEntry {
            level: Level::from_number(level).unwrap_or(Level::One),
            lives,
            reset,
        }
    }

    pub fn fresh(level: Level) -> Self {
        SceneEntry {
            level,
            lives: None,
            reset: true,
        }
    }

    /// Explicit lives win, then a reset to full, then whatever was left
    pub fn resolve_lives(&self, previous: u8) -> u8 {
        match (self.lives, self.reset) {
            (Some(lives), _) => lives,
            (None, true) => STARTING_LIVES,
            (None, false) => previous,
        }
    }
}

// ==================== Buttons ====================
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UiAction {
    Enter(SceneEntry),
    ShowMenu,
    ShowLevels,
    ShowHighScores,
    ClearScores,
    SubmitSignature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    label: String,
    rect: Rect,
    color: &'static str,
    action: UiAction,
}

impl Button {
    fn centered(label: impl Into<String>, center: (f32, f32), size: Size, color: &'static str, action: UiAction) -> Self {
        Button {
            label: label.into(),
            rect: Rect::from_xywh(
                center.0 - size.width / 2.0,
                center.1 - size.height / 2.0,
                size.width,
                size.height,
            ),
            color,
            action,
        }
    }

    fn draw(&self, renderer: &Renderer) {
        renderer.fill_rect(&self.rect, self.color);
        let lines = self.label.lines().count().max(1) as f32;
        let y = self.rect.y() + self.rect.size.height / 2.0 - (lines - 1.0) * BUTTON_TEXT * 1.25 / 2.0;
        renderer.draw_text(
            &self.label,
            Point {
                x: self.rect.center_x(),
                y,
            },
            BUTTON_TEXT as u32,
            "#fff",
            TextAlign::Center,
        );
    }
}

/// First button under any click this update
fn clicked(buttons: &[Button], clicks: &[Point]) -> Option<UiAction> {
    clicks.iter().find_map(|click| {
        buttons
            .iter()
            .find(|button| button.rect.contains(*click))
            .map(|button| button.action)
    })
}

fn draw_buttons(renderer: &Renderer, buttons: &[Button]) {
    for button in buttons {
        button.draw(renderer);
    }
}

const BUTTON: Size = Size {
    width: 200.0,
    height: 60.0,
};
const BUTTON_TEXT: f32 = 24.0;
const CENTER_X: f32 = VIEWPORT.width / 2.0;
const CENTER_Y: f32 = VIEWPORT.height / 2.0;

const SKY_COLOR: &str = "#87CEEB";
const PANEL_COLOR: &str = "#DEB887";
const BROWN: &str = "#8B4513";
const GREEN: &str = "#228B22";
const BLUE: &str = "#4169E1";
const RED: &str = "#B22222";
const GOLD: &str = "#FFD700";

fn menu_buttons() -> Vec<Button> {
    vec![
        Button::centered("Play", (CENTER_X, 330.0), BUTTON, GREEN, UiAction::Enter(SceneEntry::fresh(Level::One))),
        Button::centered("Levels", (CENTER_X, 410.0), BUTTON, BROWN, UiAction::ShowLevels),
        Button::centered("High Scores", (CENTER_X, 490.0), BUTTON, BLUE, UiAction::ShowHighScores),
    ]
}

fn level_select_buttons() -> Vec<Button> {
    let mut buttons: Vec<Button> = Level::ALL
        .into_iter()
        .enumerate()
        .map(|(row, level)| {
            Button::centered(
                format!("Level {}: {}\n{}", level.number(), level.title(), level.description()),
                (CENTER_X, 240.0 + row as f32 * 110.0),
                Size {
                    width: 480.0,
                    height: 90.0,
                },
                BROWN,
                UiAction::Enter(SceneEntry::fresh(level)),
            )
        })
        .collect();
    buttons.push(Button::centered("Back", (CENTER_X, 610.0), BUTTON, BLUE, UiAction::ShowMenu));
    buttons
}

fn high_score_buttons() -> Vec<Button> {
    vec![
        Button::centered("Clear All Scores", (CENTER_X - 130.0, 610.0), Size { width: 240.0, height: 60.0 }, RED, UiAction::ClearScores),
        Button::centered("Back", (CENTER_X + 130.0, 610.0), BUTTON, BLUE, UiAction::ShowMenu),
    ]
}

/// One high score table row: time and signature, or "No record"
pub fn record_line(best: Option<&HighScore>) -> String {
    match best {
        Some(score) => match score.signature() {
            Some(signature) => format!("{} by {}", format_time(score.time()), signature),
            None => format_time(score.time()),
        },
        None => "No record".to_string(),
    }
}

// ==================== Level run ====================
const DEATH_DELAY_MS: f64 = 1000.0;
const CAMERA_LERP: f32 = 0.05;
const GOAL_PLACEHOLDER: Size = Size {
    width: 200.0,
    height: 300.0,
};

const BURST_PARTICLES: usize = 32;
const BURST_SPEED: (f32, f32) = (100.0, 300.0);
const BURST_SCALE: (f32, f32) = (0.05, 0.15);
const BURST_LIFESPAN_MS: f64 = 600.0;

/// Where the camera moves this frame: 5% of the way to centering the
/// player, never showing anything outside the world
pub fn camera_step(camera_x: f32, player_center_x: f32, world_width: f32) -> f32 {
    let target = player_center_x - VIEWPORT.width / 2.0;
    let next = camera_x + (target - camera_x) * CAMERA_LERP;
    next.clamp(0.0, (world_width - VIEWPORT.width).max(0.0))
}

pub fn player_start() -> Point {
    Point {
        x: PLAYER_START_X,
        y: GROUND_Y - PLAYER_START_HEIGHT,
    }
}

enum Capture {
    Pending,
    Listening {
        keys: UnboundedReceiver<String>,
        _listener: EventListener,
    },
    Unavailable,
}

/// Typing a name for a new best time. The keyboard capture is released when
/// this is dropped, whichever way the phase ends.
pub struct SignatureEntry {
    final_time: f64,
    buffer: SignatureBuffer,
    capture: Capture,
}

impl SignatureEntry {
    fn new(final_time: f64) -> Self {
        SignatureEntry {
            final_time,
            buffer: SignatureBuffer::new(),
            capture: Capture::Pending,
        }
    }

    /// Keys typed since the last call; starts listening on first use
    fn typed_keys(&mut self) -> Vec<String> {
        if let Capture::Pending = self.capture {
            self.capture = match input::capture_text() {
                Ok((keys, listener)) => Capture::Listening {
                    keys,
                    _listener: listener,
                },
                Err(err) => {
                    error!("Signature entry can't read the keyboard : {:#?}", err);
                    Capture::Unavailable
                }
            };
        }
        let mut typed = Vec::new();
        if let Capture::Listening { keys, .. } = &mut self.capture {
            while let Ok(key) = keys.try_recv() {
                typed.push(key);
            }
        }
        typed
    }
}

pub enum RunPhase {
    Active,
    /// player hit; counting scene time down to respawn or game over
    Dying { remaining_ms: f64 },
    SignatureEntry(SignatureEntry),
    Completed {
        final_time: f64,
        new_best: bool,
        best: Option<HighScore>,
    },
    GameOver,
}

struct Goal {
    actor: GoalActor,
    /// bottom center
    position: Point,
    size: Size,
}

impl Goal {
    fn bounding_box(&self) -> Rect {
        Rect::from_xywh(
            self.position.x - self.size.width / 2.0,
            self.position.y - self.size.height,
            self.size.width,
            self.size.height,
        )
    }

    fn is_reached_by(&self, player_center_x: f32) -> bool {
        player_center_x >= self.position.x - self.actor.trigger_offset
    }
}

/// One attempt at a level: player, obstacles, goal, camera, timer, lives
pub struct Run {
    level: Level,
    lives: u8,
    player: JumpingMan,
    player_size: Size,
    obstacles: Vec<Obstacle>,
    goal: Goal,
    world_width: f32,
    camera_x: f32,
    timer: LevelTimer,
    now: f64,
    phase: RunPhase,
    burst: Option<ParticleBurst>,
    has_particles: bool,
}

impl Run {
    pub fn new(level: Level, lives: u8, assets: &Assets, now: f64) -> Self {
        Run::with_layout(level, lives, level.layout(), assets, now)
    }

    fn with_layout(level: Level, lives: u8, layout: Vec<ObstacleSpawn>, assets: &Assets, now: f64) -> Self {
        let player_size = assets.player_size();
        let actor = level.goal();
        let goal = Goal {
            actor,
            position: Point {
                x: level::goal_x(&layout),
                y: GROUND_Y,
            },
            size: assets.goal_size(&actor),
        };
        let world_width = level::world_width(&layout);
        let obstacles = layout
            .iter()
            .map(|spawn| Obstacle::new(*spawn, assets.obstacle_size(spawn)))
            .collect();
        let mut timer = LevelTimer::new();
        timer.reset(now);

        Run {
            level,
            lives,
            player: JumpingMan::spawn(player_start(), player_size, GROUND_Y),
            player_size,
            obstacles,
            goal,
            world_width,
            camera_x: 0.0,
            timer,
            now,
            phase: RunPhase::Active,
            burst: None,
            has_particles: assets.image(PARTICLE).is_some(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn lives(&self) -> u8 {
        self.lives
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    pub fn update<S: KeyValueStore>(&mut self, controls: Controls, frame: Frame, scores: &HighScoreStore<S>) {
        match self.phase {
            RunPhase::SignatureEntry(_) | RunPhase::Completed { .. } | RunPhase::GameOver => return,
            RunPhase::Active | RunPhase::Dying { .. } => {}
        }
        self.now = frame.now;
        self.timer.tick(frame.now, frame.delta);

        let seconds = frame.seconds();
        for obstacle in &mut self.obstacles {
            obstacle.update(frame.now, seconds);
        }
        if let Some(burst) = &mut self.burst {
            burst.update(&frame);
            if burst.is_finished() {
                self.burst = None;
            }
        }

        let delay_over = match &mut self.phase {
            RunPhase::Dying { remaining_ms } => {
                *remaining_ms -= frame.delta.max(0.0);
                *remaining_ms <= 0.0
            }
            _ => false,
        };
        if delay_over {
            self.after_death();
        } else if let RunPhase::Active = self.phase {
            self.move_player(controls, seconds, scores);
        }

        self.camera_x = camera_step(
            self.camera_x,
            self.player.bounding_box().center_x(),
            self.world_width,
        );
        obstacle::recycle(
            &mut self.obstacles,
            self.camera_x,
            self.player.bounding_box().center_x(),
        );
    }

    fn move_player<S: KeyValueStore>(&mut self, controls: Controls, seconds: f32, scores: &HighScoreStore<S>) {
        let previous = self.player.bounding_box();
        self.player.control(controls, seconds);
        self.player.clamp_x(0.0, self.world_width - self.player_size.width);

        let mut hit = false;
        for obstacle in &self.obstacles {
            let current = self.player.bounding_box();
            match obstacle::classify_contact(&previous, &current, &obstacle.bounding_box()) {
                Some(Contact::FromAbove) => {
                    hit = true;
                    break;
                }
                Some(Contact::Side { x }) => self.player.block_at(x),
                None => {}
            }
        }
        if hit {
            self.lose_life();
            return;
        }

        if self.goal.is_reached_by(self.player.bounding_box().center_x()) {
            self.complete(scores);
        }
    }

    fn lose_life(&mut self) {
        self.lives = self.lives.saturating_sub(1);
        log!("Player hit on level {}. Lives remaining: {}", self.level.number(), self.lives);
        if self.has_particles {
            let bounds = self.player.bounding_box();
            let origin = Point {
                x: bounds.center_x(),
                y: bounds.y() + bounds.size.height / 2.0,
            };
            self.burst = Some(ParticleBurst::explode(
                origin,
                BURST_PARTICLES,
                BURST_SPEED,
                BURST_SCALE,
                BURST_LIFESPAN_MS,
            ));
        } else {
            log!("Explosion particle not available, skipping effect");
        }
        self.phase = RunPhase::Dying {
            remaining_ms: DEATH_DELAY_MS,
        };
    }

    fn after_death(&mut self) {
        if self.lives == 0 {
            log!("Game over on level {}", self.level.number());
            self.phase = RunPhase::GameOver;
        } else {
            self.player = JumpingMan::spawn(player_start(), self.player_size, GROUND_Y);
            self.phase = RunPhase::Active;
            log!("Player respawned. Lives remaining: {}", self.lives);
        }
    }

    fn complete<S: KeyValueStore>(&mut self, scores: &HighScoreStore<S>) {
        let final_time = self.timer.elapsed_seconds();
        log!(
            "Level {} complete in {}",
            self.level.number(),
            format_time(final_time)
        );
        self.phase = if scores.is_new_best(self.level, final_time) {
            RunPhase::SignatureEntry(SignatureEntry::new(final_time))
        } else {
            RunPhase::Completed {
                final_time,
                new_best: false,
                best: scores.best(self.level),
            }
        };
    }

    /// Feed one typed key to the signature being entered
    pub fn handle_key(&mut self, key: &str) -> Option<Signature> {
        match &mut self.phase {
            RunPhase::SignatureEntry(entry) => match entry.buffer.handle_key(key) {
                SignatureInput::Submit(signature) => Some(signature),
                SignatureInput::Edited | SignatureInput::Ignored => None,
            },
            _ => None,
        }
    }

    /// Signature ready for the Submit button, if any
    pub fn pending_signature(&self) -> Option<Signature> {
        match &self.phase {
            RunPhase::SignatureEntry(entry) => match entry.buffer.submit() {
                SignatureInput::Submit(signature) => Some(signature),
                SignatureInput::Edited | SignatureInput::Ignored => None,
            },
            _ => None,
        }
    }

    /// Save the new best and move on to the completion screen. A failed
    /// write is logged; the screen shows the new best regardless.
    pub fn submit_signature<S: KeyValueStore>(
        &mut self,
        signature: &Signature,
        scores: &mut HighScoreStore<S>,
        date: &str,
    ) {
        let final_time = match &self.phase {
            RunPhase::SignatureEntry(entry) => entry.final_time,
            _ => return,
        };
        if let Err(err) = scores.commit(self.level, final_time, signature, date) {
            error!("Could not save high score : {:#?}", err);
        }
        self.phase = RunPhase::Completed {
            final_time,
            new_best: true,
            best: None,
        };
    }

    fn typed_keys(&mut self) -> Vec<String> {
        match &mut self.phase {
            RunPhase::SignatureEntry(entry) => entry.typed_keys(),
            _ => Vec::new(),
        }
    }

    pub fn buttons(&self) -> Vec<Button> {
        let restart = SceneEntry {
            level: self.level,
            lives: Some(self.lives),
            reset: true,
        };
        match self.phase {
            RunPhase::SignatureEntry(_) => vec![Button::centered(
                "Submit",
                (CENTER_X, CENTER_Y + 80.0),
                Size {
                    width: 160.0,
                    height: 50.0,
                },
                GREEN,
                UiAction::SubmitSignature,
            )],
            RunPhase::Completed { .. } => vec![
                Button::centered("Restart Level", (CENTER_X - 150.0, CENTER_Y + 120.0), BUTTON, BROWN, UiAction::Enter(restart)),
                Button::centered(
                    "Next Level",
                    (CENTER_X + 150.0, CENTER_Y + 120.0),
                    BUTTON,
                    GREEN,
                    UiAction::Enter(SceneEntry {
                        level: self.level.next(),
                        ..restart
                    }),
                ),
                Button::centered("Main Menu", (CENTER_X, CENTER_Y + 190.0), BUTTON, BLUE, UiAction::ShowMenu),
            ],
            RunPhase::GameOver => vec![
                Button::centered("Restart Game", (CENTER_X, CENTER_Y + 60.0), BUTTON, GREEN, UiAction::Enter(SceneEntry::fresh(Level::One))),
                Button::centered("Main Menu", (CENTER_X, CENTER_Y + 140.0), BUTTON, BLUE, UiAction::ShowMenu),
            ],
            RunPhase::Active | RunPhase::Dying { .. } => Vec::new(),
        }
    }

    fn draw(&self, renderer: &Renderer, assets: &Assets) {
        draw_parallax(renderer, assets, self.level.layers(), self.camera_x);

        let goal = self.goal.bounding_box().scrolled(self.camera_x);
        match assets.image(self.goal.actor.key) {
            Some(image) => renderer.draw_entire_image(image, &goal),
            None => renderer.fill_rect(&goal, "rgba(255, 215, 0, 0.6)"),
        }

        for obstacle in &self.obstacles {
            let destination = obstacle.bounding_box().scrolled(self.camera_x);
            match assets.image(&obstacle.sprite_key()) {
                Some(image) => renderer.draw_entire_image(image, &destination),
                None => renderer.fill_rect(&destination, "#777"),
            }
        }

        match self.phase {
            RunPhase::Dying { .. } | RunPhase::GameOver => {}
            _ => self.player.draw(renderer, assets.player.as_ref(), self.camera_x),
        }

        if let (Some(burst), Some(image)) = (&self.burst, assets.image(PARTICLE)) {
            burst.draw(renderer, image, self.camera_x);
        }

        self.draw_hud(renderer, assets);
        self.draw_overlay(renderer);
        draw_buttons(renderer, &self.buttons());
    }

    fn draw_hud(&self, renderer: &Renderer, assets: &Assets) {
        let color = self.level.text_color();
        renderer.fill_rect(&Rect::from_xywh(10.0, 10.0, 250.0, 90.0), "rgba(222, 184, 135, 0.8)");
        renderer.draw_text(
            &format!("Time: {}", self.timer.display(self.now)),
            Point { x: 20.0, y: 35.0 },
            24,
            color,
            TextAlign::Left,
        );
        match assets.image(HEART) {
            Some(heart) => {
                for i in 0..self.lives {
                    let icon = Rect::from_xywh(20.0 + f32::from(i) * 36.0, 58.0, 32.0, 32.0);
                    renderer.draw_entire_image(heart, &icon);
                }
            }
            None => renderer.draw_text(
                &"\u{2764}".repeat(usize::from(self.lives)),
                Point { x: 20.0, y: 74.0 },
                24,
                color,
                TextAlign::Left,
            ),
        }
    }

    fn draw_overlay(&self, renderer: &Renderer) {
        let center = |y: f32| Point { x: CENTER_X, y };
        match &self.phase {
            RunPhase::SignatureEntry(entry) => {
                draw_panel(renderer, Size { width: 600.0, height: 300.0 });
                renderer.draw_text(
                    &format!("NEW HIGH SCORE!\nTime: {}", format_time(entry.final_time)),
                    center(CENTER_Y - 110.0),
                    32,
                    "#000",
                    TextAlign::Center,
                );
                renderer.draw_text("Enter your name:", center(CENTER_Y - 20.0), 24, "#000", TextAlign::Center);
                renderer.fill_rect(&Rect::from_xywh(CENTER_X - 150.0, CENTER_Y + 5.0, 300.0, 40.0), "#fff");
                renderer.draw_text(
                    &format!("{}_", entry.buffer.text()),
                    center(CENTER_Y + 25.0),
                    24,
                    "#000",
                    TextAlign::Center,
                );
            }
            RunPhase::Completed { final_time, new_best, best } => {
                draw_panel(renderer, Size { width: 700.0, height: 500.0 });
                renderer.draw_text(
                    &format!("Level Complete!\nTime: {}", format_time(*final_time)),
                    center(CENTER_Y - 140.0),
                    36,
                    "#000",
                    TextAlign::Center,
                );
                let best_line = if *new_best {
                    Some("NEW HIGH SCORE!".to_string())
                } else {
                    best.as_ref()
                        .map(|best| format!("Best Time: {}", record_line(Some(best))))
                };
                if let Some(line) = best_line {
                    renderer.draw_text(&line, center(CENTER_Y - 30.0), 32, GOLD, TextAlign::Center);
                }
            }
            RunPhase::GameOver => {
                draw_panel(renderer, Size { width: 600.0, height: 400.0 });
                renderer.draw_text(
                    &format!("GAME OVER\nLevel {}: {}", self.level.number(), self.level.title()),
                    center(CENTER_Y - 110.0),
                    36,
                    "#000",
                    TextAlign::Center,
                );
            }
            RunPhase::Active | RunPhase::Dying { .. } => {}
        }
    }
}

fn draw_panel(renderer: &Renderer, size: Size) {
    renderer.fill_rect(
        &Rect::from_xywh(
            CENTER_X - size.width / 2.0,
            CENTER_Y - size.height / 2.0,
            size.width,
            size.height,
        ),
        PANEL_COLOR,
    );
}

/// Tile each layer across the view, scaled to the view height and offset
/// by its share of the camera scroll
fn draw_parallax(renderer: &Renderer, assets: &Assets, layers: &[ParallaxLayer], camera_x: f32) {
    renderer.fill_rect(&Rect::new(Point::default(), VIEWPORT), SKY_COLOR);
    for layer in layers {
        let Some(image) = assets.image(layer.key) else {
            continue;
        };
        let size = image.size();
        let tile = size.scaled(VIEWPORT.height / size.height);
        if tile.width <= 0.0 {
            continue;
        }
        let mut x = -level::parallax_offset(camera_x, layer.factor, tile.width);
        while x < VIEWPORT.width {
            renderer.draw_entire_image(image, &Rect::from_xywh(x, 0.0, tile.width, tile.height));
            x += tile.width;
        }
    }
}

// ==================== Session ====================
pub enum Scene {
    Menu,
    LevelSelect,
    HighScores,
    Playing(Box<Run>),
}

/// Everything alive after loading: assets, the score table, the current
/// scene and the lives carried between runs
pub struct Session {
    assets: Assets,
    scores: HighScoreStore<ScoreStorage>,
    scene: Scene,
    lives: u8,
    /// drives the background scroll on the menu screens
    clock_ms: f64,
}

fn controls(input: &InputState) -> Controls {
    Controls {
        left: input.is_pressed("ArrowLeft"),
        right: input.is_pressed("ArrowRight"),
        up: input.is_pressed("ArrowUp"),
    }
}

impl Session {
    fn new(assets: Assets) -> Self {
        Session {
            assets,
            scores: HighScoreStore::load(ScoreStorage::open()),
            scene: Scene::Menu,
            lives: STARTING_LIVES,
            clock_ms: 0.0,
        }
    }

    fn update(&mut self, input: &InputState, frame: Frame) {
        let action = match &mut self.scene {
            Scene::Playing(run) => update_run(run, &mut self.scores, input, frame),
            Scene::Menu => clicked(&menu_buttons(), input.clicks()),
            Scene::LevelSelect => clicked(&level_select_buttons(), input.clicks()),
            Scene::HighScores => clicked(&high_score_buttons(), input.clicks()),
        };
        if !matches!(self.scene, Scene::Playing(_)) {
            self.clock_ms += frame.delta.max(0.0);
        }
        if let Some(action) = action {
            self.perform(action, frame.now);
        }
    }

    fn perform(&mut self, action: UiAction, now: f64) {
        if let Scene::Playing(run) = &self.scene {
            self.lives = run.lives();
        }
        match action {
            UiAction::Enter(entry) => self.enter(entry, now),
            UiAction::ShowMenu => self.scene = Scene::Menu,
            UiAction::ShowLevels => self.scene = Scene::LevelSelect,
            UiAction::ShowHighScores => {
                self.scores = HighScoreStore::load(ScoreStorage::open());
                self.scene = Scene::HighScores;
            }
            UiAction::ClearScores => {
                match self.scores.clear() {
                    Ok(()) => log!("High scores cleared"),
                    Err(err) => error!("Could not clear high scores : {:#?}", err),
                }
            }
            // handled by the run that owns the signature
            UiAction::SubmitSignature => {}
        }
    }

    /// Start a level run; the previous scene (and any listener it holds) is
    /// dropped here
    fn enter(&mut self, entry: SceneEntry, now: f64) {
        self.lives = entry.resolve_lives(self.lives);
        self.scores = HighScoreStore::load(ScoreStorage::open());
        log!(
            "Entering level {} with {} lives",
            entry.level.number(),
            self.lives
        );
        self.scene = Scene::Playing(Box::new(Run::new(entry.level, self.lives, &self.assets, now)));
    }

    fn draw(&self, renderer: &Renderer) {
        let scroll = (self.clock_ms * 0.1) as f32;
        match &self.scene {
            Scene::Playing(run) => run.draw(renderer, &self.assets),
            Scene::Menu => {
                draw_parallax(renderer, &self.assets, Level::One.layers(), scroll);
                renderer.draw_text("Jumping Man", Point { x: CENTER_X, y: 180.0 }, 64, "#fff", TextAlign::Center);
                draw_buttons(renderer, &menu_buttons());
            }
            Scene::LevelSelect => {
                draw_parallax(renderer, &self.assets, Level::Two.layers(), scroll);
                renderer.draw_text("Select Level", Point { x: CENTER_X, y: 120.0 }, 48, "#fff", TextAlign::Center);
                draw_buttons(renderer, &level_select_buttons());
            }
            Scene::HighScores => {
                draw_parallax(renderer, &self.assets, Level::One.layers(), scroll);
                draw_panel(renderer, Size { width: 760.0, height: 380.0 });
                renderer.draw_text("High Scores", Point { x: CENTER_X, y: 230.0 }, 48, "#000", TextAlign::Center);
                for (row, level) in Level::ALL.into_iter().enumerate() {
                    let best = self.scores.best(level);
                    renderer.draw_text(
                        &format!("Level {} - {}: {}", level.number(), level.title(), record_line(best.as_ref())),
                        Point {
                            x: CENTER_X,
                            y: 310.0 + row as f32 * 60.0,
                        },
                        28,
                        "#000",
                        TextAlign::Center,
                    );
                }
                draw_buttons(renderer, &high_score_buttons());
            }
        }
    }
}

fn update_run(
    run: &mut Run,
    scores: &mut HighScoreStore<ScoreStorage>,
    input: &InputState,
    frame: Frame,
) -> Option<UiAction> {
    for key in run.typed_keys() {
        if let Some(signature) = run.handle_key(&key) {
            run.submit_signature(&signature, scores, &browser::today());
        }
    }
    match clicked(&run.buttons(), input.clicks()) {
        Some(UiAction::SubmitSignature) => {
            if let Some(signature) = run.pending_signature() {
                run.submit_signature(&signature, scores, &browser::today());
            }
            None
        }
        Some(action) => Some(action),
        None => {
            run.update(controls(input), frame, scores);
            None
        }
    }
}
