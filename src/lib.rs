pub mod config;
pub mod jack_client;
pub mod layout;
pub mod patchbay;
pub mod scene;
pub mod session;
pub mod theme;
pub mod view;

use std::time::Instant;

use jack_client::JackEvent;
use patchbay::CanvasMessage;

#[derive(Debug, Clone)]
pub enum Message {
    Canvas(CanvasMessage),
    Jack(JackEvent),
    Tick(Instant),
}
