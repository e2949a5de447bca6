use iced::mouse;
use iced::widget::canvas::{self, Frame, Geometry, Path, Stroke, Text};
use iced::{Color, Point, Rectangle, Size, Vector};
use std::time::{Duration, Instant};

use crate::patchbay::{CanvasMessage, GroupIcon, Patchbay, PortDirection, PortId};
use crate::scene::{self, BoxWidget, ContextMenu, Hit, MENU_ITEM_HEIGHT, PORT_RADIUS};
use crate::theme::Theme;
use crate::Message;

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);
const DOUBLE_CLICK_SLOP: f32 = 6.0;
const WHEEL_NOTCH: f32 = 120.0;
const PAN_STEP_PER_LINE: f32 = 40.0;

#[derive(Debug, Clone, Copy, Default)]
pub enum Gesture {
    #[default]
    Idle,
    RubberBand {
        origin: Point,
        current: Point,
    },
    DraggingBoxes {
        last: Point,
        moved: bool,
        from_empty: bool,
    },
    Panning {
        last: Point,
    },
    Connecting {
        from_port: PortId,
        current: Point,
    },
}

/// Transient widget state. Ctrl is tracked through explicit modifier events
/// so a held key survives across the whole gesture, not just the event that
/// happened to carry it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interaction {
    gesture: Gesture,
    ctrl: bool,
    last_click: Option<(Instant, Point)>,
}

impl canvas::Program<Message> for Patchbay {
    type State = Interaction;

    fn update(
        &self,
        state: &mut Self::State,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        match event {
            iced::Event::Mouse(mouse_event) => {
                let cursor_position = cursor.position_in(bounds)?;
                match mouse_event {
                    mouse::Event::ButtonPressed(mouse::Button::Left) => {
                        self.on_left_press(state, cursor_position)
                    }
                    mouse::Event::ButtonPressed(mouse::Button::Right) => {
                        let hit = self.scene().hit_test(cursor_position);
                        Some(publish(CanvasMessage::ContextRequested {
                            at: cursor_position,
                            hit,
                        }))
                    }
                    mouse::Event::ButtonPressed(mouse::Button::Middle) => {
                        state.gesture = Gesture::Panning { last: cursor_position };
                        Some(canvas::Action::request_redraw())
                    }
                    mouse::Event::CursorMoved { .. } => self.on_cursor_moved(state, cursor_position),
                    mouse::Event::ButtonReleased(mouse::Button::Left) => {
                        self.on_left_release(state, cursor_position)
                    }
                    mouse::Event::ButtonReleased(mouse::Button::Middle) => {
                        state.gesture = Gesture::Idle;
                        Some(canvas::Action::request_redraw())
                    }
                    mouse::Event::WheelScrolled { delta } => {
                        let lines = match delta {
                            mouse::ScrollDelta::Lines { y, .. } => *y,
                            mouse::ScrollDelta::Pixels { y, .. } => *y / WHEEL_NOTCH,
                        };
                        if state.ctrl {
                            Some(publish(CanvasMessage::WheelZoom { delta: lines * WHEEL_NOTCH }))
                        } else {
                            Some(publish(CanvasMessage::Pan {
                                delta: Vector::new(0.0, lines * PAN_STEP_PER_LINE),
                            }))
                        }
                    }
                    _ => None,
                }
            }
            iced::Event::Keyboard(iced::keyboard::Event::ModifiersChanged(modifiers)) => {
                state.ctrl = modifiers.control();
                None
            }
            iced::Event::Keyboard(iced::keyboard::Event::KeyPressed { key, .. }) => {
                use iced::keyboard::key::Named;
                use iced::keyboard::Key;
                match key.as_ref() {
                    Key::Named(Named::Home) => {
                        Some(publish(CanvasMessage::ZoomFit { viewport: bounds.size() }))
                    }
                    Key::Named(Named::Escape) if self.scene().menu.is_some() => {
                        Some(publish(CanvasMessage::MenuDismissed))
                    }
                    Key::Character("+") | Key::Character("=") if state.ctrl => {
                        Some(publish(CanvasMessage::ZoomIn))
                    }
                    Key::Character("-") if state.ctrl => Some(publish(CanvasMessage::ZoomOut)),
                    Key::Character("1") if state.ctrl => Some(publish(CanvasMessage::ZoomReset)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn draw(
        &self,
        state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &iced::Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let theme = self.theme();
        let transform = self.scene().transform;
        let now = Instant::now();

        let content = self.cache().draw(renderer, bounds.size(), |frame| {
            frame.fill_rectangle(Point::ORIGIN, bounds.size(), theme.canvas_bg);
            draw_dot_grid(frame, bounds.size(), theme, transform.pan, transform.scale);

            frame.translate(transform.pan);
            frame.scale(transform.scale);

            frame.stroke(
                &Path::rectangle(Point::ORIGIN, self.scene().canvas_size),
                Stroke::default().with_color(faded(theme.box_border, 0.5)).with_width(1.0),
            );

            let mut boxes: Vec<&BoxWidget> = self
                .scene()
                .boxes()
                .iter()
                .filter(|b| !(self.options().auto_hide_groups && b.ports.is_empty()))
                .collect();
            boxes.sort_by_key(|b| b.z);
            for b in boxes {
                draw_box(frame, b, theme, self.scene().selection.contains(&b.id), now);
            }

            let mut lines: Vec<_> = self.scene().lines().iter().collect();
            lines.sort_by_key(|l| l.z);
            for line in lines {
                if let Some((start, end)) = self.scene().line_endpoints(line) {
                    let kind = self.scene().port_kind(line.port_out);
                    let color = kind.map(|k| theme.port_color(k)).unwrap_or(theme.box_border);
                    draw_line(
                        frame,
                        start,
                        end,
                        color,
                        theme.line_glow_alpha,
                        self.options().bezier_lines,
                        line.fade.alpha(now),
                    );
                }
            }
        });

        let mut overlay = Frame::new(renderer, bounds.size());
        match state.gesture {
            Gesture::RubberBand { origin, current } => {
                draw_rubberband(&mut overlay, origin, current, theme);
            }
            Gesture::Connecting { from_port, current, .. } => {
                if let Some(start) = self.scene().port_anchor(from_port) {
                    let kind = self.scene().port_kind(from_port);
                    let color = kind.map(|k| theme.port_color(k)).unwrap_or(theme.box_border);
                    overlay.translate(transform.pan);
                    overlay.scale(transform.scale);
                    let end = transform.to_world(current);
                    draw_line(&mut overlay, start, end, color, 0.1, true, 0.8);
                    overlay.fill(&Path::circle(end, 4.0), color);
                }
            }
            _ => {}
        }

        let mut menu_frame = Frame::new(renderer, bounds.size());
        if let Some(menu) = &self.scene().menu {
            draw_menu(&mut menu_frame, menu, theme);
        }

        vec![content, overlay.into_geometry(), menu_frame.into_geometry()]
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if !cursor.is_over(bounds) {
            return mouse::Interaction::default();
        }
        match state.gesture {
            Gesture::DraggingBoxes { .. } | Gesture::Panning { .. } => mouse::Interaction::Grabbing,
            Gesture::Connecting { .. } => mouse::Interaction::Crosshair,
            Gesture::RubberBand { .. } => mouse::Interaction::default(),
            Gesture::Idle => match cursor.position_in(bounds) {
                Some(pos) => match self.scene().hit_test(pos) {
                    Hit::BoxHeader(_) | Hit::BoxBody(_) => mouse::Interaction::Grab,
                    Hit::Port { .. } => mouse::Interaction::Crosshair,
                    Hit::Line(_) | Hit::MenuItem(_) => mouse::Interaction::Pointer,
                    Hit::None => mouse::Interaction::default(),
                },
                None => mouse::Interaction::default(),
            },
        }
    }
}

impl Patchbay {
    fn on_left_press(
        &self,
        state: &mut Interaction,
        cursor_position: Point,
    ) -> Option<canvas::Action<Message>> {
        let now = Instant::now();
        let hit = self.scene().hit_test(cursor_position);

        if let Some(menu) = &self.scene().menu {
            return if let Some(index) = menu.hit_item(cursor_position) {
                Some(publish(CanvasMessage::MenuItemChosen { index }))
            } else {
                Some(publish(CanvasMessage::MenuDismissed))
            };
        }

        if let Some((at, pos)) = state.last_click {
            let near = (cursor_position.x - pos.x).abs() < DOUBLE_CLICK_SLOP
                && (cursor_position.y - pos.y).abs() < DOUBLE_CLICK_SLOP;
            if now.saturating_duration_since(at) < DOUBLE_CLICK_WINDOW && near {
                state.last_click = None;
                return Some(publish(CanvasMessage::DoubleClicked { hit }));
            }
        }
        state.last_click = Some((now, cursor_position));

        match hit {
            Hit::Port { port_id, .. } => {
                state.gesture =
                    Gesture::Connecting { from_port: port_id, current: cursor_position };
                Some(canvas::Action::request_redraw())
            }
            Hit::BoxHeader(box_id) | Hit::BoxBody(box_id) => {
                state.gesture =
                    Gesture::DraggingBoxes { last: cursor_position, moved: false, from_empty: false };
                Some(publish(CanvasMessage::BoxPressed { box_id }))
            }
            Hit::Line(_) | Hit::None | Hit::MenuItem(_) => {
                // A live selection turns any press into a move; the
                // rubber-band only starts from a clean slate.
                if self.scene().selection.is_empty() {
                    state.gesture =
                        Gesture::RubberBand { origin: cursor_position, current: cursor_position };
                } else {
                    state.gesture = Gesture::DraggingBoxes {
                        last: cursor_position,
                        moved: false,
                        from_empty: true,
                    };
                }
                Some(canvas::Action::request_redraw())
            }
        }
    }

    fn on_cursor_moved(
        &self,
        state: &mut Interaction,
        cursor_position: Point,
    ) -> Option<canvas::Action<Message>> {
        match state.gesture {
            Gesture::DraggingBoxes { last, from_empty, .. } => {
                let delta = Vector::new(cursor_position.x - last.x, cursor_position.y - last.y);
                state.gesture =
                    Gesture::DraggingBoxes { last: cursor_position, moved: true, from_empty };
                Some(publish(CanvasMessage::BoxesDragged { delta }))
            }
            Gesture::RubberBand { origin, .. } => {
                state.gesture = Gesture::RubberBand { origin, current: cursor_position };
                Some(canvas::Action::request_redraw())
            }
            Gesture::Panning { last } => {
                let delta = Vector::new(cursor_position.x - last.x, cursor_position.y - last.y);
                state.gesture = Gesture::Panning { last: cursor_position };
                Some(publish(CanvasMessage::Pan { delta }))
            }
            Gesture::Connecting { from_port, .. } => {
                state.gesture = Gesture::Connecting { from_port, current: cursor_position };
                Some(canvas::Action::request_redraw())
            }
            Gesture::Idle => None,
        }
    }

    fn on_left_release(
        &self,
        state: &mut Interaction,
        cursor_position: Point,
    ) -> Option<canvas::Action<Message>> {
        let gesture = std::mem::take(&mut state.gesture);
        match gesture {
            Gesture::DraggingBoxes { moved, from_empty, .. } => {
                if moved {
                    Some(publish(CanvasMessage::BoxDragEnded))
                } else if from_empty {
                    // A stationary click on empty space clears the selection:
                    // a degenerate rubber-band that contains nothing.
                    let at = self.scene().transform.to_world(cursor_position);
                    Some(publish(CanvasMessage::RubberBandReleased {
                        rect: Rectangle::new(at, Size::ZERO),
                    }))
                } else {
                    Some(canvas::Action::request_redraw())
                }
            }
            Gesture::RubberBand { origin, .. } => {
                let a = self.scene().transform.to_world(origin);
                let b = self.scene().transform.to_world(cursor_position);
                let rect = Rectangle::new(
                    Point::new(a.x.min(b.x), a.y.min(b.y)),
                    Size::new((a.x - b.x).abs(), (a.y - b.y).abs()),
                );
                Some(publish(CanvasMessage::RubberBandReleased { rect }))
            }
            Gesture::Connecting { from_port, .. } => {
                if let Hit::Port { port_id, .. } = self.scene().hit_test(cursor_position) {
                    if port_id != from_port {
                        return Some(publish(CanvasMessage::ConnectDragEnded {
                            from: from_port,
                            to: port_id,
                        }));
                    }
                }
                Some(canvas::Action::request_redraw())
            }
            Gesture::Panning { .. } | Gesture::Idle => Some(canvas::Action::request_redraw()),
        }
    }
}

fn publish(message: CanvasMessage) -> canvas::Action<Message> {
    canvas::Action::publish(Message::Canvas(message))
}

fn faded(color: Color, alpha: f32) -> Color {
    Color::from_rgba(color.r, color.g, color.b, color.a * alpha)
}

fn draw_dot_grid(frame: &mut Frame, size: Size, theme: &Theme, pan: Vector, scale: f32) {
    let grid_size = 40.0 * scale;
    let offset_x = pan.x % grid_size;
    let offset_y = pan.y % grid_size;

    let cols = (size.width / grid_size) as i32 + 2;
    let rows = (size.height / grid_size) as i32 + 2;
    for row in 0..rows {
        for col in 0..cols {
            let x = offset_x + col as f32 * grid_size;
            let y = offset_y + row as f32 * grid_size;
            frame.fill(&Path::circle(Point::new(x, y), 1.0), theme.grid_dot);
        }
    }
}

fn rounded_rect_path(pos: Point, size: Size, radius: f32) -> Path {
    Path::new(|builder| {
        let r = radius.min(size.width / 2.0).min(size.height / 2.0);
        let (x, y, w, h) = (pos.x, pos.y, size.width, size.height);

        builder.move_to(Point::new(x + r, y));
        builder.line_to(Point::new(x + w - r, y));
        builder.arc_to(Point::new(x + w, y), Point::new(x + w, y + r), r);
        builder.line_to(Point::new(x + w, y + h - r));
        builder.arc_to(Point::new(x + w, y + h), Point::new(x + w - r, y + h), r);
        builder.line_to(Point::new(x + r, y + h));
        builder.arc_to(Point::new(x, y + h), Point::new(x, y + h - r), r);
        builder.line_to(Point::new(x, y + r));
        builder.arc_to(Point::new(x, y), Point::new(x + r, y), r);
        builder.close();
    })
}

fn draw_box(frame: &mut Frame, widget: &BoxWidget, theme: &Theme, selected: bool, now: Instant) {
    let alpha = widget.fade.alpha(now);
    let size = Size::new(widget.width, widget.height());
    let radius = 6.0;

    frame.fill(
        &rounded_rect_path(
            Point::new(widget.pos.x - 1.0, widget.pos.y - 1.0),
            Size::new(size.width + 2.0, size.height + 2.0),
            radius + 1.0,
        ),
        faded(theme.box_shadow, alpha),
    );
    frame.fill(&rounded_rect_path(widget.pos, size, radius), faded(theme.box_bg, alpha));

    let header = rounded_rect_path(
        widget.pos,
        Size::new(size.width, scene::BOX_HEADER_HEIGHT),
        radius,
    );
    frame.fill(&header, faded(theme.header_color(widget.icon), alpha));

    let border = if selected { theme.box_border_selected } else { theme.box_border };
    frame.stroke(
        &rounded_rect_path(widget.pos, size, radius),
        Stroke::default()
            .with_color(faded(border, alpha))
            .with_width(if selected { 2.0 } else { 1.0 }),
    );

    draw_icon(frame, widget, theme, alpha);
    frame.fill_text(Text {
        content: widget.title.clone(),
        position: Point::new(widget.pos.x + 24.0, widget.pos.y + 6.0),
        color: faded(theme.text_primary, alpha),
        size: iced::Pixels(13.0),
        ..Text::default()
    });

    for (i, slot) in widget.ports.iter().enumerate() {
        let slot_alpha = alpha * slot.fade.alpha(now);
        let y = widget.port_row_center(i);
        let color = theme.port_color(slot.kind);
        let (anchor_x, label_x) = match slot.direction {
            PortDirection::Input => (
                widget.pos.x,
                widget.pos.x + PORT_RADIUS + 7.0,
            ),
            PortDirection::Output => (
                widget.pos.x + widget.width,
                widget.pos.x + widget.width
                    - PORT_RADIUS
                    - 7.0
                    - slot.label.chars().count() as f32 * 6.0,
            ),
        };
        let anchor = Point::new(anchor_x, y);
        frame.fill(&Path::circle(anchor, PORT_RADIUS + 2.0), faded(color, slot_alpha * 0.25));
        frame.fill(&Path::circle(anchor, PORT_RADIUS), faded(color, slot_alpha));
        frame.fill_text(Text {
            content: slot.label.clone(),
            position: Point::new(label_x, y - 6.0),
            color: faded(theme.text_secondary, slot_alpha),
            size: iced::Pixels(10.0),
            ..Text::default()
        });
    }
}

fn draw_icon(frame: &mut Frame, widget: &BoxWidget, theme: &Theme, alpha: f32) {
    let color = faded(theme.text_secondary, alpha);
    let center = Point::new(widget.pos.x + 13.0, widget.pos.y + scene::BOX_HEADER_HEIGHT / 2.0);
    match widget.icon {
        GroupIcon::Hardware => {
            frame.fill_rectangle(
                Point::new(center.x - 4.0, center.y - 4.0),
                Size::new(8.0, 8.0),
                color,
            );
        }
        GroupIcon::Application => {
            frame.fill(&Path::circle(center, 4.0), color);
        }
        GroupIcon::LadishRoom => {
            frame.fill_rectangle(
                Point::new(center.x - 5.0, center.y - 5.0),
                Size::new(10.0, 10.0),
                color,
            );
            frame.fill_rectangle(
                Point::new(center.x - 2.5, center.y - 2.5),
                Size::new(5.0, 5.0),
                faded(theme.box_bg, alpha),
            );
        }
    }
}

fn draw_line(
    frame: &mut Frame,
    start: Point,
    end: Point,
    color: Color,
    glow_alpha: f32,
    bezier: bool,
    alpha: f32,
) {
    let path = if bezier {
        let (c1, c2) = scene::bezier_controls(start, end);
        Path::new(|builder| {
            builder.move_to(start);
            builder.bezier_curve_to(c1, c2, end);
        })
    } else {
        Path::line(start, end)
    };

    frame.stroke(
        &path,
        Stroke::default()
            .with_color(faded(color, glow_alpha * alpha))
            .with_width(7.0)
            .with_line_cap(canvas::LineCap::Round),
    );
    frame.stroke(
        &path,
        Stroke::default()
            .with_color(faded(color, alpha))
            .with_width(2.0)
            .with_line_cap(canvas::LineCap::Round),
    );
}

fn draw_rubberband(frame: &mut Frame, origin: Point, current: Point, theme: &Theme) {
    let top_left = Point::new(origin.x.min(current.x), origin.y.min(current.y));
    let size = Size::new((origin.x - current.x).abs(), (origin.y - current.y).abs());
    frame.fill_rectangle(top_left, size, theme.rubberband_fill);
    frame.stroke(
        &Path::rectangle(top_left, size),
        Stroke::default().with_color(theme.rubberband_border).with_width(1.0),
    );
}

fn draw_menu(frame: &mut Frame, menu: &ContextMenu, theme: &Theme) {
    let rect = menu.rect();
    frame.fill(
        &rounded_rect_path(Point::new(rect.x, rect.y), Size::new(rect.width, rect.height), 4.0),
        theme.menu_bg,
    );
    frame.stroke(
        &rounded_rect_path(Point::new(rect.x, rect.y), Size::new(rect.width, rect.height), 4.0),
        Stroke::default().with_color(theme.menu_border).with_width(1.0),
    );
    for (i, item) in menu.items.iter().enumerate() {
        let item_rect = menu.item_rect(i);
        frame.fill_text(Text {
            content: item.label.clone(),
            position: Point::new(item_rect.x + 10.0, item_rect.y + (MENU_ITEM_HEIGHT - 12.0) / 2.0),
            color: theme.menu_text,
            size: iced::Pixels(12.0),
            ..Text::default()
        });
    }
}
