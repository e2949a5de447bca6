use iced::Color;

use crate::patchbay::{GroupIcon, PortKind};

/// Color data for one canvas theme. Pure data, no drawing logic.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub name: &'static str,
    pub dark: bool,

    pub canvas_bg: Color,
    pub grid_dot: Color,

    pub box_bg: Color,
    pub box_header: Color,
    pub box_header_hw: Color,
    pub box_border: Color,
    pub box_border_selected: Color,
    pub box_shadow: Color,
    pub text_primary: Color,
    pub text_secondary: Color,

    pub port_audio: Color,
    pub port_midi: Color,
    pub port_midi_a2j: Color,
    pub port_midi_alsa: Color,
    pub line_glow_alpha: f32,

    pub rubberband_fill: Color,
    pub rubberband_border: Color,

    pub menu_bg: Color,
    pub menu_border: Color,
    pub menu_text: Color,
    pub menu_hint: Color,
}

impl Theme {
    pub fn port_color(&self, kind: PortKind) -> Color {
        match kind {
            PortKind::Audio => self.port_audio,
            PortKind::Midi => self.port_midi,
            PortKind::MidiA2j => self.port_midi_a2j,
            PortKind::MidiAlsa => self.port_midi_alsa,
        }
    }

    pub fn header_color(&self, icon: GroupIcon) -> Color {
        match icon {
            GroupIcon::Hardware | GroupIcon::LadishRoom => self.box_header_hw,
            GroupIcon::Application => self.box_header,
        }
    }
}

pub const MODERN_DARK: Theme = Theme {
    name: "Modern Dark",
    dark: true,

    canvas_bg: Color::from_rgb(0.075, 0.075, 0.085),
    grid_dot: Color::from_rgba(1.0, 1.0, 1.0, 0.04),

    box_bg: Color::from_rgb(0.11, 0.11, 0.13),
    box_header: Color::from_rgb(0.15, 0.15, 0.18),
    box_header_hw: Color::from_rgb(0.18, 0.15, 0.12),
    box_border: Color::from_rgb(0.22, 0.22, 0.26),
    box_border_selected: Color::from_rgb(0.30, 0.75, 0.85),
    box_shadow: Color::from_rgba(0.0, 0.0, 0.0, 0.4),
    text_primary: Color::from_rgb(0.92, 0.92, 0.94),
    text_secondary: Color::from_rgb(0.55, 0.55, 0.60),

    port_audio: Color::from_rgb(0.35, 0.75, 0.45),
    port_midi: Color::from_rgb(0.85, 0.35, 0.35),
    port_midi_a2j: Color::from_rgb(0.85, 0.55, 0.25),
    port_midi_alsa: Color::from_rgb(0.55, 0.45, 0.85),
    line_glow_alpha: 0.15,

    rubberband_fill: Color::from_rgba(0.30, 0.75, 0.85, 0.08),
    rubberband_border: Color::from_rgba(0.30, 0.75, 0.85, 0.6),

    menu_bg: Color::from_rgb(0.12, 0.12, 0.14),
    menu_border: Color::from_rgb(0.30, 0.30, 0.36),
    menu_text: Color::from_rgb(0.92, 0.92, 0.94),
    menu_hint: Color::from_rgba(1.0, 1.0, 1.0, 0.4),
};

pub const BLACK_GOLD: Theme = Theme {
    name: "Black Gold",
    dark: true,

    canvas_bg: Color::from_rgb(0.04, 0.04, 0.04),
    grid_dot: Color::from_rgba(0.92, 0.66, 0.25, 0.05),

    box_bg: Color::from_rgb(0.09, 0.08, 0.06),
    box_header: Color::from_rgb(0.16, 0.13, 0.07),
    box_header_hw: Color::from_rgb(0.20, 0.15, 0.06),
    box_border: Color::from_rgb(0.45, 0.35, 0.15),
    box_border_selected: Color::from_rgb(0.92, 0.66, 0.25),
    box_shadow: Color::from_rgba(0.0, 0.0, 0.0, 0.55),
    text_primary: Color::from_rgb(0.93, 0.88, 0.76),
    text_secondary: Color::from_rgb(0.62, 0.56, 0.42),

    port_audio: Color::from_rgb(0.92, 0.66, 0.25),
    port_midi: Color::from_rgb(0.85, 0.35, 0.35),
    port_midi_a2j: Color::from_rgb(0.75, 0.52, 0.20),
    port_midi_alsa: Color::from_rgb(0.60, 0.48, 0.70),
    line_glow_alpha: 0.20,

    rubberband_fill: Color::from_rgba(0.92, 0.66, 0.25, 0.08),
    rubberband_border: Color::from_rgba(0.92, 0.66, 0.25, 0.6),

    menu_bg: Color::from_rgb(0.10, 0.09, 0.06),
    menu_border: Color::from_rgb(0.45, 0.35, 0.15),
    menu_text: Color::from_rgb(0.93, 0.88, 0.76),
    menu_hint: Color::from_rgba(0.92, 0.66, 0.25, 0.4),
};

pub const STUDIO_LIGHT: Theme = Theme {
    name: "Studio Light",
    dark: false,

    canvas_bg: Color::from_rgb(0.93, 0.93, 0.91),
    grid_dot: Color::from_rgba(0.0, 0.0, 0.0, 0.06),

    box_bg: Color::from_rgb(0.99, 0.99, 0.98),
    box_header: Color::from_rgb(0.88, 0.88, 0.86),
    box_header_hw: Color::from_rgb(0.90, 0.86, 0.80),
    box_border: Color::from_rgb(0.65, 0.65, 0.62),
    box_border_selected: Color::from_rgb(0.10, 0.45, 0.60),
    box_shadow: Color::from_rgba(0.0, 0.0, 0.0, 0.15),
    text_primary: Color::from_rgb(0.12, 0.12, 0.12),
    text_secondary: Color::from_rgb(0.40, 0.40, 0.42),

    port_audio: Color::from_rgb(0.15, 0.55, 0.25),
    port_midi: Color::from_rgb(0.70, 0.20, 0.20),
    port_midi_a2j: Color::from_rgb(0.70, 0.42, 0.10),
    port_midi_alsa: Color::from_rgb(0.38, 0.28, 0.65),
    line_glow_alpha: 0.10,

    rubberband_fill: Color::from_rgba(0.10, 0.45, 0.60, 0.08),
    rubberband_border: Color::from_rgba(0.10, 0.45, 0.60, 0.6),

    menu_bg: Color::from_rgb(0.97, 0.97, 0.96),
    menu_border: Color::from_rgb(0.65, 0.65, 0.62),
    menu_text: Color::from_rgb(0.12, 0.12, 0.12),
    menu_hint: Color::from_rgba(0.0, 0.0, 0.0, 0.4),
};

const ALL: &[&Theme] = &[&MODERN_DARK, &BLACK_GOLD, &STUDIO_LIGHT];

/// Look up a theme by its persisted name, falling back to the default.
pub fn by_name(name: &str) -> &'static Theme {
    ALL.iter()
        .copied()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .unwrap_or(&MODERN_DARK)
}

pub fn default_theme() -> &'static Theme {
    &MODERN_DARK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_name_is_case_insensitive_and_falls_back() {
        assert_eq!(by_name("black gold").name, "Black Gold");
        assert_eq!(by_name("Studio Light").name, "Studio Light");
        assert_eq!(by_name("no such theme").name, MODERN_DARK.name);
    }
}
