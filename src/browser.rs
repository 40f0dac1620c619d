use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use wasm_bindgen::closure::{Closure, WasmClosure, WasmClosureFnOnce};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

#[rustfmt::skip]
use web_sys::{
    Document,
    Window,
    CanvasRenderingContext2d,
    HtmlCanvasElement,
    HtmlImageElement,
    Response,
    Storage,
};

// Console logging. Host builds print to stdout/stderr instead.
macro_rules! log {
    ($($t:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::log_1(&format!($($t)*).into());
        #[cfg(not(target_arch = "wasm32"))]
        println!($($t)*);
    }}
}

macro_rules! error {
    ($($t:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        web_sys::console::error_1(&format!($($t)*).into());
        #[cfg(not(target_arch = "wasm32"))]
        eprintln!($($t)*);
    }}
}

mod html {
    pub const CANVAS_ID: &str = "canvas";
    pub const CONTEXT_2D: &str = "2d";
}

pub type LoopClosure = Closure<dyn FnMut(f64)>;

pub fn context() -> Result<CanvasRenderingContext2d> {
    canvas()?
        .get_context(html::CONTEXT_2D)
        .map_err(|err| anyhow!("canvas refused a 2d context: {:#?}", err))?
        .ok_or_else(|| anyhow!("canvas has no 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|ctx| anyhow!("{:#?} is not a 2d rendering context", ctx))
}

pub fn canvas() -> Result<HtmlCanvasElement> {
    document()?
        .get_element_by_id(html::CANVAS_ID)
        .ok_or_else(|| anyhow!("page has no #{} element", html::CANVAS_ID))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|element| anyhow!("#{} is not a canvas: {:#?}", html::CANVAS_ID, element))
}

pub fn window() -> Result<Window> {
    web_sys::window().ok_or_else(|| anyhow!("no global window"))
}

pub fn document() -> Result<Document> {
    window()?.document().ok_or_else(|| anyhow!("window has no document"))
}

/// Inner size of the browser window in CSS pixels
pub fn window_size() -> Result<(f64, f64)> {
    let window = window()?;
    let width = window
        .inner_width()
        .map_err(|err| anyhow!("Could not read window width : {:#?}", err))?
        .as_f64()
        .ok_or_else(|| anyhow!("Window width is not a number"))?;
    let height = window
        .inner_height()
        .map_err(|err| anyhow!("Could not read window height : {:#?}", err))?
        .as_f64()
        .ok_or_else(|| anyhow!("Window height is not a number"))?;
    Ok((width, height))
}

pub fn local_storage() -> Result<Storage> {
    window()?
        .local_storage()
        .map_err(|err| anyhow!("localStorage is not accessible : {:#?}", err))?
        .ok_or_else(|| anyhow!("localStorage is not available"))
}

/// Current date as `YYYY-MM-DD` (UTC)
pub fn today() -> String {
    let iso: String = js_sys::Date::new_0().to_iso_string().into();
    iso.split('T').next().unwrap_or_default().to_string()
}

pub fn create_html_image_element() -> Result<HtmlImageElement> {
    HtmlImageElement::new().map_err(|err| anyhow!("could not create <img>: {:#?}", err))
}

pub fn now() -> Result<f64> {
    let performance = window()?
        .performance()
        .ok_or_else(|| anyhow!("window.performance is unavailable"))?;
    Ok(performance.now())
}

pub fn request_animation_frame(callback: &LoopClosure) -> Result<i32> {
    window()?
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {:#?}", err))
}

pub fn create_raf_closure(f: impl FnMut(f64) + 'static) -> LoopClosure {
    closure_wrap(Box::new(f))
}

pub fn closure_wrap<T: WasmClosure + ?Sized>(data: Box<T>) -> Closure<T> {
    Closure::wrap(data)
}

pub fn closure_once<F, A, R>(f: F) -> Closure<F::FnMut>
where
    F: 'static + WasmClosureFnOnce<A, R>,
{
    Closure::once(f)
}

pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Fetches `path` and decodes its JSON body, e.g. a sprite sheet atlas
pub async fn fetch_json<T>(path: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let response: Response = fetch_with_str(path)
        .await?
        .dyn_into()
        .map_err(|value| anyhow!("{} did not answer with a Response: {:#?}", path, value))?;
    let body = response
        .json()
        .map_err(|err| anyhow!("{} has no JSON body: {:#?}", path, err))?;
    let value = JsFuture::from(body)
        .await
        .map_err(|err| anyhow!("{} body is not valid JSON: {:#?}", path, err))?;

    serde_wasm_bindgen::from_value(value).map_err(|err| anyhow!("{} has an unexpected shape: {:#?}", path, err))
}

async fn fetch_with_str(path: &str) -> Result<JsValue> {
    JsFuture::from(window()?.fetch_with_str(path))
        .await
        .map_err(|err| anyhow!("fetching {} failed: {:#?}", path, err))
}
