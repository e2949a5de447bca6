use iced::widget::canvas;
use iced::{Element, Length, Subscription, Task};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::error;

use jackfield::config::{Aliasing, Settings};
use jackfield::jack_client;
use jackfield::patchbay::{CanvasAction, CanvasFeatures, CanvasOptions, Notification, Patchbay};
use jackfield::session::SessionBridge;
use jackfield::theme;
use jackfield::Message;

fn main() -> iced::Result {
    let debug = std::env::args().any(|a| a == "--debug");
    tracing_subscriber::fmt()
        .with_max_level(if debug { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    let antialiasing = Settings::load().unwrap_or_default().render.antialiasing != Aliasing::Off;

    iced::application(move || init(debug), update, view)
        .title(title)
        .subscription(subscription)
        .theme(app_theme)
        .antialiasing(antialiasing)
        .run()
}

struct Jackfield {
    canvas: Patchbay,
    settings: Settings,
    bridge: SessionBridge,
    actions: Receiver<CanvasAction>,
    scale: f32,
}

fn init(debug: bool) -> (Jackfield, Task<Message>) {
    let settings = Settings::load().unwrap_or_default();

    let mut patchbay = Patchbay::new();
    patchbay.set_options(CanvasOptions {
        theme_name: settings
            .theme
            .clone()
            .unwrap_or_else(|| theme::default_theme().name.to_string()),
        bezier_lines: settings.render.bezier_lines,
        antialiasing: settings.render.antialiasing,
        auto_hide_groups: settings.render.auto_hide_groups,
        eyecandy: settings.render.eyecandy,
    });
    patchbay.set_features(CanvasFeatures {
        group_info: true,
        group_rename: false,
        port_info: true,
        port_rename: false,
        group_split: true,
        position_persistence: true,
    });
    patchbay.set_saved_layout(settings.clone());

    let (tx, rx) = std::sync::mpsc::channel();
    if let Err(e) = patchbay.init(Box::new(move |action| drop(tx.send(action))), debug) {
        error!("canvas init failed: {e}");
    }

    (
        Jackfield {
            canvas: patchbay,
            settings,
            bridge: SessionBridge::new(),
            actions: rx,
            scale: 1.0,
        },
        Task::none(),
    )
}

fn title(state: &Jackfield) -> String {
    if state.bridge.sample_rate > 0 {
        format!(
            "Jackfield — {} Hz — {:.0}%",
            state.bridge.sample_rate,
            state.scale * 100.0
        )
    } else {
        "Jackfield".to_string()
    }
}

fn update(state: &mut Jackfield, message: Message) -> Task<Message> {
    match message {
        Message::Canvas(msg) => {
            for note in state.canvas.handle_message(msg) {
                match note {
                    Notification::ScaleChanged(scale) => state.scale = scale,
                    Notification::GroupMoved { group_id, side, position } => {
                        if let Some(name) = state.canvas.group_name(group_id).map(str::to_string) {
                            state.settings.set_position(&name, side, position);
                            let _ = state.settings.save();
                        }
                    }
                }
            }
        }
        Message::Jack(event) => {
            state.bridge.handle_event(&mut state.canvas, event);
        }
        Message::Tick(now) => {
            let outcome = state.canvas.tick(now);
            if outcome.layout_dirty {
                state.settings.absorb_layout(state.canvas.saved_layout());
                let _ = state.settings.save();
            }
        }
    }

    while let Ok(action) = state.actions.try_recv() {
        state.bridge.apply_action(&mut state.canvas, action);
    }
    Task::none()
}

fn view(state: &Jackfield) -> Element<'_, Message> {
    canvas(&state.canvas)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn subscription(_state: &Jackfield) -> Subscription<Message> {
    Subscription::batch([
        jack_client::connect().map(Message::Jack),
        iced::time::every(Duration::from_millis(100)).map(Message::Tick),
    ])
}

fn app_theme(state: &Jackfield) -> iced::Theme {
    if state.canvas.theme().dark {
        iced::Theme::Dark
    } else {
        iced::Theme::Light
    }
}
