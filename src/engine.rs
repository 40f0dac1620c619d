use crate::browser;
use anyhow::{anyhow, Error, Result};
// wasm is single threaded, so Rc RefCell over Mutex
use async_trait::async_trait;
use futures::channel::oneshot::channel;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, EventTarget, HtmlCanvasElement, HtmlImageElement};

use self::input::{InputDevice, InputState};

/// Logical size of the play field. The canvas is scaled to fit the window
/// while every game coordinate stays in this space.
pub const VIEWPORT: Size = Size {
    width: 1280.0,
    height: 720.0,
};

#[async_trait(?Send)]
pub trait Game {
    async fn initialize(&self) -> Result<Box<dyn Game>>;
    fn update(&mut self, input: &InputState, frame: Frame);
    fn draw(&self, renderer: &Renderer);
}

/// Timing handed to every `Game::update`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// wall clock in milliseconds (performance.now)
    pub now: f64,
    /// simulated milliseconds since the previous update
    pub delta: f64,
}

impl Frame {
    pub fn seconds(&self) -> f32 {
        (self.delta / 1000.0) as f32
    }
}

// 60 updates per second
const FRAME_SIZE: f64 = 1.0 / 60.0 * 1000.0;
// a backgrounded tab stops requestAnimationFrame; don't replay that gap
const MAX_ACCUMULATED_DELTA: f64 = 250.0;

pub struct GameLoop {
    last_frame: f64,
    accumulated_delta: f64,
}

type SharedLoopClosure = Rc<RefCell<Option<browser::LoopClosure>>>;

impl GameLoop {
    pub async fn start(game: impl Game + 'static) -> Result<()> {
        let mut input = InputDevice::attach()?;
        let mut game = game.initialize().await?;
        let mut game_loop = GameLoop {
            last_frame: browser::now()?,
            accumulated_delta: 0.0,
        };
        let renderer = Renderer::new(browser::context()?, browser::canvas()?);
        renderer.fit_to_window();
        let mut input_state = InputState::default();

        let f: SharedLoopClosure = Rc::new(RefCell::new(None));
        let g = f.clone();
        *g.borrow_mut() = Some(browser::create_raf_closure(move |perf: f64| {
            if input.drain_into(&mut input_state, &renderer) {
                renderer.fit_to_window();
            }
            game_loop.accumulated_delta = (game_loop.accumulated_delta
                + (perf - game_loop.last_frame))
                .min(MAX_ACCUMULATED_DELTA);
            while game_loop.accumulated_delta > FRAME_SIZE {
                game.update(
                    &input_state,
                    Frame {
                        now: perf,
                        delta: FRAME_SIZE,
                    },
                );
                // a click is consumed by the first update that sees it
                input_state.clear_clicks();
                game_loop.accumulated_delta -= FRAME_SIZE;
            }
            game_loop.last_frame = perf;
            renderer.begin_frame();
            game.draw(&renderer);
            if let Some(callback) = f.borrow().as_ref() {
                if let Err(err) = browser::request_animation_frame(callback) {
                    error!("GameLoop: {:#?}", err);
                }
            }
        }));

        browser::request_animation_frame(
            g.borrow()
                .as_ref()
                .ok_or_else(|| anyhow!("GameLoop: Loop is None"))?,
        )?;

        Ok(())
    }
}

// ==================== Geometry ====================
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn scaled(self, scale: f32) -> Size {
        Size {
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub position: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(position: Point, size: Size) -> Self {
        Rect { position, size }
    }

    pub const fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            position: Point { x, y },
            size: Size { width, height },
        }
    }

    pub fn x(&self) -> f32 {
        self.position.x
    }

    pub fn y(&self) -> f32 {
        self.position.y
    }

    pub fn right(&self) -> f32 {
        self.position.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.position.y + self.size.height
    }

    pub fn center_x(&self) -> f32 {
        self.position.x + self.size.width / 2.0
    }

    /// Strict overlap; rectangles that only share an edge don't intersect
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x() < other.right()
            && self.right() > other.x()
            && self.y() < other.bottom()
            && self.bottom() > other.y()
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x() && point.x <= self.right() && point.y >= self.y() && point.y <= self.bottom()
    }

    /// Same rect moved into screen space for a camera scrolled to `camera_x`
    pub fn scrolled(&self, camera_x: f32) -> Rect {
        Rect {
            position: Point {
                x: self.position.x - camera_x,
                y: self.position.y,
            },
            size: self.size,
        }
    }
}

// ==================== Sprite sheet ====================
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Sheet {
    pub frames: HashMap<String, Cell>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Cell {
    pub frame: SheetRect,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct SheetRect {
    pub x: i16,
    pub y: i16,
    pub w: i16,
    pub h: i16,
}

impl From<SheetRect> for Rect {
    fn from(rect: SheetRect) -> Self {
        Rect::from_xywh(rect.x.into(), rect.y.into(), rect.w.into(), rect.h.into())
    }
}

/// Loaded image plus its natural size
#[derive(Clone)]
pub struct Image {
    element: HtmlImageElement,
    size: Size,
}

impl Image {
    pub fn new(element: HtmlImageElement) -> Self {
        let size = Size {
            width: element.natural_width() as f32,
            height: element.natural_height() as f32,
        };
        Image { element, size }
    }

    pub fn element(&self) -> &HtmlImageElement {
        &self.element
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// A decoded image with zero size is as good as missing
    pub fn is_valid(&self) -> bool {
        self.element.complete() && self.size.width > 0.0 && self.size.height > 0.0
    }
}

// ==================== Renderer ====================
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TextAlign {
    Left,
    Center,
}

impl TextAlign {
    fn as_str(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
        }
    }
}

/// Uniform scale and letterbox offset mapping `VIEWPORT` onto the canvas
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Viewport {
    pub fn fit(width: f64, height: f64) -> Self {
        let scale = (width / f64::from(VIEWPORT.width))
            .min(height / f64::from(VIEWPORT.height))
            .max(f64::EPSILON);
        Viewport {
            scale,
            offset_x: (width - f64::from(VIEWPORT.width) * scale) / 2.0,
            offset_y: (height - f64::from(VIEWPORT.height) * scale) / 2.0,
        }
    }

    /// Canvas pixel to logical play field coordinate
    pub fn to_logical(&self, x: f64, y: f64) -> Point {
        Point {
            x: ((x - self.offset_x) / self.scale) as f32,
            y: ((y - self.offset_y) / self.scale) as f32,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

pub struct Renderer {
    context: CanvasRenderingContext2d,
    canvas: HtmlCanvasElement,
    viewport: std::cell::Cell<Viewport>,
}

impl Renderer {
    pub fn new(context: CanvasRenderingContext2d, canvas: HtmlCanvasElement) -> Self {
        Renderer {
            context,
            canvas,
            viewport: std::cell::Cell::new(Viewport::default()),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport.get()
    }

    /// Resize the canvas backing store to the window and refit the viewport
    pub fn fit_to_window(&self) {
        match browser::window_size() {
            Ok((width, height)) => {
                self.canvas.set_width(width as u32);
                self.canvas.set_height(height as u32);
                self.viewport.set(Viewport::fit(width, height));
            }
            Err(err) => error!("Could not fit canvas to window : {:#?}", err),
        }
    }

    /// Clear the whole canvas and install the viewport transform
    pub fn begin_frame(&self) {
        let viewport = self.viewport.get();
        let _ = self.context.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        self.context.set_fill_style_str("#000");
        self.context.fill_rect(
            0.0,
            0.0,
            self.canvas.width().into(),
            self.canvas.height().into(),
        );
        let _ = self.context.set_transform(
            viewport.scale,
            0.0,
            0.0,
            viewport.scale,
            viewport.offset_x,
            viewport.offset_y,
        );
        self.clear(&Rect::new(Point::default(), VIEWPORT));
    }

    pub fn clear(&self, rect: &Rect) {
        self.context.clear_rect(
            rect.x().into(),
            rect.y().into(),
            rect.size.width.into(),
            rect.size.height.into(),
        );
    }

    pub fn set_alpha(&self, alpha: f64) {
        self.context.set_global_alpha(alpha.clamp(0.0, 1.0));
    }

    pub fn fill_rect(&self, rect: &Rect, color: &str) {
        self.context.set_fill_style_str(color);
        self.context.fill_rect(
            rect.x().into(),
            rect.y().into(),
            rect.size.width.into(),
            rect.size.height.into(),
        );
    }

    pub fn stroke_rect(&self, rect: &Rect, color: &str) {
        self.context.set_stroke_style_str(color);
        self.context.stroke_rect(
            rect.x().into(),
            rect.y().into(),
            rect.size.width.into(),
            rect.size.height.into(),
        );
    }

    pub fn draw_text(&self, text: &str, position: Point, size: u32, color: &str, align: TextAlign) {
        self.context.set_font(&format!("{}px sans-serif", size));
        self.context.set_text_align(align.as_str());
        self.context.set_text_baseline("middle");
        self.context.set_fill_style_str(color);
        for (line_number, line) in text.lines().enumerate() {
            let y = f64::from(position.y) + line_number as f64 * f64::from(size) * 1.25;
            if let Err(err) = self.context.fill_text(line, position.x.into(), y) {
                error!("Could not draw text '{}' : {:#?}", line, err);
            }
        }
    }

    /// Draw the whole image stretched into `destination`
    pub fn draw_entire_image(&self, image: &Image, destination: &Rect) {
        if let Err(err) = self
            .context
            .draw_image_with_html_image_element_and_dw_and_dh(
                image.element(),
                destination.x().into(),
                destination.y().into(),
                destination.size.width.into(),
                destination.size.height.into(),
            )
        {
            error!("Could not draw image : {:#?}", err);
        }
    }

    /// Draw the `frame` region of a sheet image into `destination`
    pub fn draw_sprite(&self, image: &Image, frame: &Rect, destination: &Rect) {
        if let Err(err) = self
            .context
            .draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                image.element(),
                frame.x().into(),
                frame.y().into(),
                frame.size.width.into(),
                frame.size.height.into(),
                destination.x().into(),
                destination.y().into(),
                destination.size.width.into(),
                destination.size.height.into(),
            )
        {
            error!("Could not draw sprite : {:#?}", err);
        }
    }

    /// `draw_sprite` mirrored around the destination's vertical axis
    pub fn draw_sprite_flipped(&self, image: &Image, frame: &Rect, destination: &Rect) {
        self.context.save();
        let _ = self
            .context
            .translate(destination.right().into(), destination.y().into());
        let _ = self.context.scale(-1.0, 1.0);
        self.draw_sprite(
            image,
            frame,
            &Rect::new(Point::default(), destination.size),
        );
        self.context.restore();
    }
}

#[cfg(debug_assertions)]
pub trait DebugDraw {
    fn draw_debug(&self, renderer: &Renderer);
}

#[cfg(debug_assertions)]
impl DebugDraw for Rect {
    fn draw_debug(&self, renderer: &Renderer) {
        renderer.stroke_rect(self, "#FF0000");
    }
}

// ==================== Event listeners ====================
/// A DOM event listener that lives exactly as long as this guard.
/// Dropping it deregisters the callback, so every exit path (scene switch,
/// restart, submission) releases it once.
pub struct EventListener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl EventListener {
    pub fn new<F>(target: &EventTarget, event: &'static str, callback: F) -> Result<Self>
    where
        F: FnMut(web_sys::Event) + 'static,
    {
        let callback = browser::closure_wrap(Box::new(callback) as Box<dyn FnMut(web_sys::Event)>);
        target
            .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
            .map_err(|err| anyhow!("Could not listen for '{}' : {:#?}", event, err))?;
        Ok(EventListener {
            target: target.clone(),
            event,
            callback,
        })
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if let Err(err) = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref())
        {
            error!("Could not remove '{}' listener : {:#?}", self.event, err);
        }
    }
}

pub mod input {
    use super::{EventListener, Point, Renderer};
    use crate::browser;
    use anyhow::Result;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use std::collections::HashSet;
    use wasm_bindgen::JsCast;
    use web_sys::{KeyboardEvent, MouseEvent};

    pub enum InputEvent {
        KeyDown(String),
        KeyUp(String),
        /// canvas pixel coordinates
        Click(f64, f64),
        Resize,
    }

    /// Held keys (by `KeyboardEvent.code`) and clicks since the last update,
    /// in play field coordinates
    #[derive(Debug, Default)]
    pub struct InputState {
        pressed_keys: HashSet<String>,
        clicks: Vec<Point>,
    }

    impl InputState {
        pub fn is_pressed(&self, code: &str) -> bool {
            self.pressed_keys.contains(code)
        }

        pub fn clicks(&self) -> &[Point] {
            &self.clicks
        }

        pub fn set_pressed(&mut self, code: &str) {
            self.pressed_keys.insert(code.to_string());
        }

        pub fn set_released(&mut self, code: &str) {
            self.pressed_keys.remove(code);
        }

        pub fn push_click(&mut self, point: Point) {
            self.clicks.push(point);
        }

        pub fn clear_clicks(&mut self) {
            self.clicks.clear();
        }
    }

    /// Browser side of the input: the listeners and the channel they feed
    pub struct InputDevice {
        events: UnboundedReceiver<InputEvent>,
        _listeners: Vec<EventListener>,
    }

    impl InputDevice {
        pub fn attach() -> Result<Self> {
            let (sender, events) = unbounded();
            let window = browser::window()?;
            let canvas = browser::canvas()?;

            let listeners = vec![
                EventListener::new(&window, "keydown", forward(&sender, |event| {
                    let event = event.dyn_ref::<KeyboardEvent>()?;
                    Some(InputEvent::KeyDown(event.code()))
                }))?,
                EventListener::new(&window, "keyup", forward(&sender, |event| {
                    let event = event.dyn_ref::<KeyboardEvent>()?;
                    Some(InputEvent::KeyUp(event.code()))
                }))?,
                EventListener::new(&canvas, "mousedown", forward(&sender, |event| {
                    let event = event.dyn_ref::<MouseEvent>()?;
                    Some(InputEvent::Click(event.offset_x().into(), event.offset_y().into()))
                }))?,
                EventListener::new(&window, "resize", forward(&sender, |_| {
                    Some(InputEvent::Resize)
                }))?,
            ];

            Ok(InputDevice {
                events,
                _listeners: listeners,
            })
        }

        /// Apply pending events; returns true when the window was resized
        pub fn drain_into(&mut self, state: &mut InputState, renderer: &Renderer) -> bool {
            let mut resized = false;
            while let Ok(event) = self.events.try_recv() {
                match event {
                    InputEvent::KeyDown(code) => state.set_pressed(&code),
                    InputEvent::KeyUp(code) => state.set_released(&code),
                    InputEvent::Click(x, y) => state.push_click(renderer.viewport().to_logical(x, y)),
                    InputEvent::Resize => resized = true,
                }
            }
            resized
        }
    }

    fn forward<F>(sender: &UnboundedSender<InputEvent>, map: F) -> impl FnMut(web_sys::Event) + 'static
    where
        F: Fn(&web_sys::Event) -> Option<InputEvent> + 'static,
    {
        let sender = sender.clone();
        move |event: web_sys::Event| {
            if let Some(input) = map(&event) {
                let _ = sender.unbounded_send(input);
            }
        }
    }

    /// Capture typed text (`KeyboardEvent.key`) on the document while the
    /// returned guard is alive
    pub fn capture_text() -> Result<(UnboundedReceiver<String>, EventListener)> {
        let (sender, keys) = unbounded();
        let document = browser::document()?;
        let listener = EventListener::new(&document, "keydown", move |event: web_sys::Event| {
            if let Some(event) = event.dyn_ref::<KeyboardEvent>() {
                let _ = sender.unbounded_send(event.key());
            }
        })?;
        Ok((keys, listener))
    }

}

// ==================== Assets ====================
/// Resolves once the browser has decoded `source`, or errors if it could not
pub async fn load_image(source: &str) -> Result<HtmlImageElement> {
    let image = browser::create_html_image_element()?;
    let (tx, rx) = channel::<Result<(), Error>>();
    let success_tx = Rc::new(RefCell::new(Some(tx)));
    let error_tx = success_tx.clone();

    let success_callback = browser::closure_once(move || {
        if let Some(tx) = success_tx.borrow_mut().take() {
            let _ = tx.send(Ok(()));
        }
    });

    let error_callback = browser::closure_once(move |err: JsValue| {
        if let Some(tx) = error_tx.borrow_mut().take() {
            let _ = tx.send(Err(anyhow!("Error loading image: {:#?}", err)));
        }
    });

    image.set_onload(Some(success_callback.as_ref().unchecked_ref()));
    image.set_onerror(Some(error_callback.as_ref().unchecked_ref()));
    image.set_src(source);

    // onload/onerror fire after this function returns
    success_callback.forget();
    error_callback.forget();

    // Result<Result<(), Error>, oneshot::Canceled>
    // - first ? yields the channel result
    // - second ? yields the image load result
    rx.await??;

    Ok(image)
}

// ==================== Randomness ====================
/// Uniform value in `[min, max)`; falls back to the midpoint when the
/// platform has no entropy source
pub fn random_range(min: f32, max: f32) -> f32 {
    let mut bytes = [0u8; 4];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => {
            let unit = u32::from_le_bytes(bytes) as f64 / (u64::from(u32::MAX) + 1) as f64;
            min + (max - min) * unit as f32
        }
        Err(err) => {
            error!("getrandom failed : {}", err);
            (min + max) / 2.0
        }
    }
}

/// Uniform index in `0..len`
pub fn random_index(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (random_range(0.0, len as f32) as usize).min(len - 1)
}

// ==================== Particles ====================
#[derive(Debug, Clone, Copy)]
struct Particle {
    position: Point,
    velocity: Point,
    scale: f32,
}

/// One-shot radial burst that fades out over its lifespan
#[derive(Debug, Clone)]
pub struct ParticleBurst {
    particles: Vec<Particle>,
    age_ms: f64,
    lifespan_ms: f64,
}

impl ParticleBurst {
    pub fn explode(origin: Point, count: usize, speed: (f32, f32), scale: (f32, f32), lifespan_ms: f64) -> Self {
        let particles = (0..count)
            .map(|_| {
                let angle = random_range(0.0, std::f32::consts::TAU);
                let speed = random_range(speed.0, speed.1);
                Particle {
                    position: origin,
                    velocity: Point {
                        x: angle.cos() * speed,
                        y: angle.sin() * speed,
                    },
                    scale: random_range(scale.0, scale.1),
                }
            })
            .collect();
        ParticleBurst {
            particles,
            age_ms: 0.0,
            lifespan_ms,
        }
    }

    pub fn update(&mut self, frame: &Frame) {
        let seconds = frame.seconds();
        self.age_ms += frame.delta.max(0.0);
        for particle in &mut self.particles {
            particle.position.x += particle.velocity.x * seconds;
            particle.position.y += particle.velocity.y * seconds;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.age_ms >= self.lifespan_ms
    }

    /// Linear fade from 1 to 0 over the lifespan
    pub fn alpha(&self) -> f64 {
        (1.0 - self.age_ms / self.lifespan_ms).clamp(0.0, 1.0)
    }

    pub fn draw(&self, renderer: &Renderer, image: &Image, camera_x: f32) {
        renderer.set_alpha(self.alpha());
        for particle in &self.particles {
            let size = image.size().scaled(particle.scale);
            let destination = Rect::from_xywh(
                particle.position.x - size.width / 2.0,
                particle.position.y - size.height / 2.0,
                size.width,
                size.height,
            );
            renderer.draw_entire_image(image, &destination.scrolled(camera_x));
        }
        renderer.set_alpha(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rects_sharing_an_edge_do_not_intersect() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let touching = Rect::from_xywh(10.0, 0.0, 10.0, 10.0);
        let overlapping = Rect::from_xywh(9.0, 9.0, 10.0, 10.0);

        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
        assert!(overlapping.intersects(&a));
    }

    #[test]
    fn scrolled_rect_moves_only_horizontally() {
        let rect = Rect::from_xywh(500.0, 40.0, 10.0, 20.0).scrolled(120.0);
        assert_relative_eq!(rect.x(), 380.0);
        assert_relative_eq!(rect.y(), 40.0);
    }

    #[test]
    fn viewport_letterboxes_and_maps_clicks_back() {
        // twice as wide as needed: pillarbox on the sides
        let viewport = Viewport::fit(2560.0 * 1.5, 1440.0);
        assert_relative_eq!(viewport.scale, 2.0);
        assert_relative_eq!(viewport.offset_x, 640.0);
        assert_relative_eq!(viewport.offset_y, 0.0);

        let point = viewport.to_logical(640.0 + 200.0, 100.0);
        assert_relative_eq!(point.x, 100.0);
        assert_relative_eq!(point.y, 50.0);
    }

    #[test]
    fn random_range_stays_in_bounds() {
        for _ in 0..200 {
            let value = random_range(0.4, 0.6);
            assert!((0.4..0.6).contains(&value), "{}", value);
        }
        for _ in 0..200 {
            assert!(random_index(6) < 6);
        }
    }

    #[test]
    fn particle_burst_fades_and_finishes() {
        let mut burst = ParticleBurst::explode(Point { x: 10.0, y: 10.0 }, 32, (100.0, 300.0), (0.05, 0.15), 600.0);
        assert_relative_eq!(burst.alpha(), 1.0);

        let frame = Frame {
            now: 0.0,
            delta: 300.0,
        };
        burst.update(&frame);
        assert_relative_eq!(burst.alpha(), 0.5);
        assert!(!burst.is_finished());

        burst.update(&frame);
        assert!(burst.is_finished());
        assert_relative_eq!(burst.alpha(), 0.0);
    }
}
