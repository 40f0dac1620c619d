use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;

#[macro_use]
mod browser;
pub mod engine;
pub mod game;
pub mod level;
pub mod obstacle;
pub mod score;
pub mod sprite;
pub mod timer;

use engine::GameLoop;
use game::JumpingManGame;

/// Wasm entry point: hooks panics into the console, then hands the
/// Jumping Man game to the loop, which opens on the main menu once
/// assets have loaded.
#[wasm_bindgen]
pub fn main_js() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    browser::spawn_local(async move {
        if let Err(err) = GameLoop::start(JumpingManGame::new()).await {
            error!("Jumping Man stopped before the first frame: {:#?}", err);
        }
    });

    Ok(())
}
