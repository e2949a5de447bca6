use iced::{Point, Rectangle, Size, Vector};
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::layout;
use crate::patchbay::{ConnectionId, GroupIcon, GroupId, PortDirection, PortId, PortKind};

pub const BOX_HEADER_HEIGHT: f32 = 26.0;
pub const PORT_ROW_HEIGHT: f32 = 18.0;
pub const PORT_RADIUS: f32 = 5.0;
pub const BOX_BOTTOM_PAD: f32 = 6.0;
pub const MIN_BOX_WIDTH: f32 = 120.0;
const TITLE_CHAR_WIDTH: f32 = 7.5;
const PORT_CHAR_WIDTH: f32 = 6.0;
const LABEL_PADDING: f32 = 24.0;

pub const MIN_SCALE: f32 = 0.2;
pub const MAX_SCALE: f32 = 3.0;
pub const ZOOM_STEP_IN: f32 = 1.2;
pub const ZOOM_STEP_OUT: f32 = 0.8;
/// Base of the logarithmic wheel zoom: one wheel notch (delta 240) scales
/// by 1.41, half a notch by sqrt(1.41), and so on.
pub const WHEEL_ZOOM_BASE: f32 = 1.41;

pub const FADE_DURATION: Duration = Duration::from_millis(300);

const PORT_HIT_RADIUS: f32 = 9.0;
const LINE_HIT_DISTANCE: f32 = 7.0;
const LINE_HIT_SAMPLES: u32 = 20;

pub const MENU_WIDTH: f32 = 160.0;
pub const MENU_ITEM_HEIGHT: f32 = 24.0;
const MENU_PADDING: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(pub u32);

/// Which side of a group a box represents. Joined groups have a single
/// `Both` box; split groups have one `Output` and one `Input` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxSide {
    Both,
    Output,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fade {
    None,
    In { since: Instant },
    Out { since: Instant },
}

impl Fade {
    pub fn alpha(&self, now: Instant) -> f32 {
        let progress = |since: Instant| {
            (now.saturating_duration_since(since).as_secs_f32() / FADE_DURATION.as_secs_f32())
                .clamp(0.0, 1.0)
        };
        match *self {
            Fade::None => 1.0,
            Fade::In { since } => progress(since),
            Fade::Out { since } => 1.0 - progress(since),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        matches!(*self, Fade::Out { since } if now.saturating_duration_since(since) >= FADE_DURATION)
    }

    fn settled(&self, now: Instant) -> bool {
        matches!(*self, Fade::In { since } if now.saturating_duration_since(since) >= FADE_DURATION)
    }

    fn is_out(&self) -> bool {
        matches!(self, Fade::Out { .. })
    }

    fn animating(&self) -> bool {
        !matches!(self, Fade::None)
    }
}

#[derive(Debug, Clone)]
pub struct PortSlot {
    pub port_id: PortId,
    pub label: String,
    pub direction: PortDirection,
    pub kind: PortKind,
    pub fade: Fade,
}

#[derive(Debug, Clone)]
pub struct BoxWidget {
    pub id: BoxId,
    pub group_id: GroupId,
    pub title: String,
    pub icon: GroupIcon,
    pub side: BoxSide,
    pub pos: Point,
    pub z: u32,
    pub width: f32,
    pub ports: Vec<PortSlot>,
    pub fade: Fade,
}

impl BoxWidget {
    pub fn height(&self) -> f32 {
        BOX_HEADER_HEIGHT + self.ports.len() as f32 * PORT_ROW_HEIGHT + BOX_BOTTOM_PAD
    }

    pub fn rect(&self) -> Rectangle {
        Rectangle::new(self.pos, Size::new(self.width, self.height()))
    }

    pub fn header_rect(&self) -> Rectangle {
        Rectangle::new(self.pos, Size::new(self.width, BOX_HEADER_HEIGHT))
    }

    /// Recompute the box width from the title and the widest port label.
    pub fn relayout(&mut self) {
        let title_w = self.title.chars().count() as f32 * TITLE_CHAR_WIDTH + LABEL_PADDING;
        let port_w = self
            .ports
            .iter()
            .map(|p| p.label.chars().count() as f32 * PORT_CHAR_WIDTH + LABEL_PADDING)
            .fold(0.0, f32::max);
        self.width = MIN_BOX_WIDTH.max(title_w).max(port_w);
    }

    pub fn port_row_center(&self, index: usize) -> f32 {
        self.pos.y + BOX_HEADER_HEIGHT + index as f32 * PORT_ROW_HEIGHT + PORT_ROW_HEIGHT / 2.0
    }

    /// Where a connection attaches: input ports on the left edge, output
    /// ports on the right edge.
    pub fn port_anchor(&self, port_id: PortId) -> Option<Point> {
        let index = self.ports.iter().position(|p| p.port_id == port_id)?;
        let slot = &self.ports[index];
        let x = match slot.direction {
            PortDirection::Input => self.pos.x,
            PortDirection::Output => self.pos.x + self.width,
        };
        Some(Point::new(x, self.port_row_center(index)))
    }
}

#[derive(Debug, Clone)]
pub struct LineWidget {
    pub connection_id: ConnectionId,
    pub port_out: PortId,
    pub port_in: PortId,
    pub z: u32,
    pub fade: Fade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub pan: Vector,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self { scale: 1.0, pan: Vector::new(0.0, 0.0) }
    }
}

impl ViewTransform {
    pub fn to_world(&self, screen: Point) -> Point {
        Point::new((screen.x - self.pan.x) / self.scale, (screen.y - self.pan.y) / self.scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    None,
    BoxHeader(BoxId),
    BoxBody(BoxId),
    Port { box_id: BoxId, port_id: PortId },
    Line(ConnectionId),
    MenuItem(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuAction {
    Disconnect(ConnectionId),
    GroupInfo(GroupId),
    GroupRename(GroupId),
    GroupSplit(GroupId),
    GroupJoin(GroupId),
    PortInfo(PortId),
    PortRename(PortId),
}

#[derive(Debug, Clone)]
pub struct MenuItem {
    pub label: String,
    pub action: MenuAction,
}

/// A minimal drawn context menu, positioned in screen coordinates.
#[derive(Debug, Clone)]
pub struct ContextMenu {
    pub origin: Point,
    pub items: Vec<MenuItem>,
}

impl ContextMenu {
    pub fn rect(&self) -> Rectangle {
        Rectangle::new(
            self.origin,
            Size::new(MENU_WIDTH, self.items.len() as f32 * MENU_ITEM_HEIGHT + MENU_PADDING * 2.0),
        )
    }

    pub fn item_rect(&self, index: usize) -> Rectangle {
        Rectangle::new(
            Point::new(self.origin.x, self.origin.y + MENU_PADDING + index as f32 * MENU_ITEM_HEIGHT),
            Size::new(MENU_WIDTH, MENU_ITEM_HEIGHT),
        )
    }

    pub fn hit_item(&self, screen: Point) -> Option<usize> {
        (0..self.items.len()).find(|&i| self.item_rect(i).contains(screen))
    }
}

/// Retained scene graph: every rendered box and connection line, plus the
/// view transform, selection and context-menu state. The scene knows nothing
/// about JACK or the graph model, only about pixels.
#[derive(Debug)]
pub struct Scene {
    boxes: Vec<BoxWidget>,
    lines: Vec<LineWidget>,
    next_box: u32,
    z_counter: u32,
    pub selection: HashSet<BoxId>,
    pub menu: Option<ContextMenu>,
    pub transform: ViewTransform,
    pub canvas_size: Size,
    pub initial_pos: Point,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            boxes: Vec::new(),
            lines: Vec::new(),
            next_box: 1,
            z_counter: 0,
            selection: HashSet::new(),
            menu: None,
            transform: ViewTransform::default(),
            canvas_size: Size::new(3100.0, 2400.0),
            initial_pos: Point::new(50.0, 50.0),
        }
    }

    /// Drop every item and counter, keeping only the layout hints.
    pub fn reset(&mut self) {
        self.boxes.clear();
        self.lines.clear();
        self.next_box = 1;
        self.z_counter = 0;
        self.selection.clear();
        self.menu = None;
        self.transform = ViewTransform::default();
    }

    pub fn boxes(&self) -> &[BoxWidget] {
        &self.boxes
    }

    pub fn lines(&self) -> &[LineWidget] {
        &self.lines
    }

    pub fn box_widget(&self, id: BoxId) -> Option<&BoxWidget> {
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn box_widget_mut(&mut self, id: BoxId) -> Option<&mut BoxWidget> {
        self.boxes.iter_mut().find(|b| b.id == id)
    }

    pub fn add_box(
        &mut self,
        group_id: GroupId,
        title: &str,
        icon: GroupIcon,
        side: BoxSide,
        saved_pos: Option<Point>,
        horizontal: bool,
        fade_in: Option<Instant>,
    ) -> BoxId {
        let id = BoxId(self.next_box);
        self.next_box += 1;
        self.z_counter += 1;

        let mut widget = BoxWidget {
            id,
            group_id,
            title: title.to_string(),
            icon,
            side,
            pos: Point::ORIGIN,
            z: self.z_counter,
            width: 0.0,
            ports: Vec::new(),
            fade: match fade_in {
                Some(since) => Fade::In { since },
                None => Fade::None,
            },
        };
        widget.relayout();
        widget.pos = saved_pos.unwrap_or_else(|| {
            layout::next_box_pos(
                &self.boxes,
                Size::new(widget.width, widget.height()),
                self.initial_pos,
                horizontal,
            )
        });
        self.boxes.push(widget);
        id
    }

    /// Remove a box, fading it out first when `fade_out` carries a start
    /// time. Removing an unknown or already fading-out box is a no-op.
    pub fn remove_box(&mut self, id: BoxId, fade_out: Option<Instant>) {
        self.selection.remove(&id);
        match fade_out {
            Some(since) => {
                if let Some(b) = self.box_widget_mut(id) {
                    if !b.fade.is_out() {
                        b.fade = Fade::Out { since };
                    }
                }
            }
            None => self.boxes.retain(|b| b.id != id),
        }
    }

    pub fn raise_box(&mut self, id: BoxId) {
        self.z_counter += 1;
        let z = self.z_counter;
        if let Some(b) = self.box_widget_mut(id) {
            b.z = z;
        }
    }

    pub fn add_port(
        &mut self,
        box_id: BoxId,
        port_id: PortId,
        label: &str,
        direction: PortDirection,
        kind: PortKind,
        fade_in: Option<Instant>,
    ) {
        if let Some(b) = self.box_widget_mut(box_id) {
            b.ports.push(PortSlot {
                port_id,
                label: label.to_string(),
                direction,
                kind,
                fade: match fade_in {
                    Some(since) => Fade::In { since },
                    None => Fade::None,
                },
            });
            b.relayout();
        }
    }

    pub fn remove_port(&mut self, port_id: PortId, fade_out: Option<Instant>) {
        for b in &mut self.boxes {
            match fade_out {
                Some(since) => {
                    if let Some(slot) = b.ports.iter_mut().find(|p| p.port_id == port_id) {
                        if !slot.fade.is_out() {
                            slot.fade = Fade::Out { since };
                        }
                    }
                }
                None => {
                    let before = b.ports.len();
                    b.ports.retain(|p| p.port_id != port_id);
                    if b.ports.len() != before {
                        b.relayout();
                    }
                }
            }
        }
    }

    pub fn rename_port(&mut self, port_id: PortId, label: &str) {
        for b in &mut self.boxes {
            if let Some(slot) = b.ports.iter_mut().find(|p| p.port_id == port_id) {
                slot.label = label.to_string();
                b.relayout();
            }
        }
    }

    pub fn retitle_group(&mut self, group_id: GroupId, title: &str) {
        for b in &mut self.boxes {
            if b.group_id == group_id {
                b.title = title.to_string();
                b.relayout();
            }
        }
    }

    pub fn box_of_port(&self, port_id: PortId) -> Option<BoxId> {
        self.boxes
            .iter()
            .find(|b| b.ports.iter().any(|p| p.port_id == port_id && !p.fade.is_out()))
            .map(|b| b.id)
    }

    pub fn port_kind(&self, port_id: PortId) -> Option<PortKind> {
        self.boxes
            .iter()
            .flat_map(|b| b.ports.iter())
            .find(|p| p.port_id == port_id)
            .map(|p| p.kind)
    }

    pub fn port_anchor(&self, port_id: PortId) -> Option<Point> {
        self.boxes.iter().find_map(|b| b.port_anchor(port_id))
    }

    pub fn add_line(
        &mut self,
        connection_id: ConnectionId,
        port_out: PortId,
        port_in: PortId,
        fade_in: Option<Instant>,
    ) {
        self.z_counter += 1;
        self.lines.push(LineWidget {
            connection_id,
            port_out,
            port_in,
            z: self.z_counter,
            fade: match fade_in {
                Some(since) => Fade::In { since },
                None => Fade::None,
            },
        });
    }

    pub fn remove_line(&mut self, connection_id: ConnectionId, fade_out: Option<Instant>) {
        match fade_out {
            Some(since) => {
                if let Some(l) = self.lines.iter_mut().find(|l| l.connection_id == connection_id)
                {
                    if !l.fade.is_out() {
                        l.fade = Fade::Out { since };
                    }
                }
            }
            None => self.lines.retain(|l| l.connection_id != connection_id),
        }
    }

    pub fn line_endpoints(&self, line: &LineWidget) -> Option<(Point, Point)> {
        Some((self.port_anchor(line.port_out)?, self.port_anchor(line.port_in)?))
    }

    /// Hit-test a screen point: menu first, then ports, then boxes (topmost
    /// z wins), then connection lines.
    pub fn hit_test(&self, screen: Point) -> Hit {
        if let Some(menu) = &self.menu {
            if let Some(i) = menu.hit_item(screen) {
                return Hit::MenuItem(i);
            }
        }

        let world = self.transform.to_world(screen);

        let mut by_z: Vec<&BoxWidget> = self.boxes.iter().filter(|b| !b.fade.is_out()).collect();
        by_z.sort_by(|a, b| b.z.cmp(&a.z));

        for b in &by_z {
            for (i, slot) in b.ports.iter().enumerate() {
                let x = match slot.direction {
                    PortDirection::Input => b.pos.x,
                    PortDirection::Output => b.pos.x + b.width,
                };
                let anchor = Point::new(x, b.port_row_center(i));
                if distance(world, anchor) < PORT_HIT_RADIUS {
                    return Hit::Port { box_id: b.id, port_id: slot.port_id };
                }
            }
        }

        for b in &by_z {
            if b.header_rect().contains(world) {
                return Hit::BoxHeader(b.id);
            }
            if b.rect().contains(world) {
                return Hit::BoxBody(b.id);
            }
        }

        for line in self.lines.iter().rev() {
            if let Some((start, end)) = self.line_endpoints(line) {
                if bezier_distance(world, start, end) < LINE_HIT_DISTANCE {
                    return Hit::Line(line.connection_id);
                }
            }
        }

        Hit::None
    }

    /// Replace the selection with every box fully contained in `band`
    /// (world coordinates).
    pub fn select_contained(&mut self, band: Rectangle) {
        self.selection = self
            .boxes
            .iter()
            .filter(|b| !b.fade.is_out() && contains_rect(&band, &b.rect()))
            .map(|b| b.id)
            .collect();
    }

    pub fn move_selected(&mut self, delta: Vector) {
        for b in &mut self.boxes {
            if self.selection.contains(&b.id) {
                b.pos = b.pos + delta;
            }
        }
    }

    /// Bounding rectangle of the visible boxes, if any.
    pub fn bounding_rect(&self, hide_empty: bool) -> Option<Rectangle> {
        let mut rects = self
            .boxes
            .iter()
            .filter(|b| !b.fade.is_out() && !(hide_empty && b.ports.is_empty()))
            .map(BoxWidget::rect);
        let first = rects.next()?;
        Some(rects.fold(first, union))
    }

    fn set_scale(&mut self, scale: f32) -> f32 {
        self.transform.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        self.transform.scale
    }

    pub fn zoom_in(&mut self) -> f32 {
        let s = self.transform.scale * ZOOM_STEP_IN;
        self.set_scale(s)
    }

    pub fn zoom_out(&mut self) -> f32 {
        let s = self.transform.scale * ZOOM_STEP_OUT;
        self.set_scale(s)
    }

    pub fn zoom_reset(&mut self) -> f32 {
        self.transform.pan = Vector::new(0.0, 0.0);
        self.set_scale(1.0)
    }

    /// Logarithmic wheel zoom: `delta` in wheel units, one notch being 240.
    pub fn zoom_wheel(&mut self, delta: f32) -> f32 {
        let s = self.transform.scale * WHEEL_ZOOM_BASE.powf(delta / 240.0);
        self.set_scale(s)
    }

    /// Fit every visible box into the viewport, centered.
    pub fn zoom_fit(&mut self, viewport: Size, hide_empty: bool) -> f32 {
        let Some(bounds) = self.bounding_rect(hide_empty) else {
            return self.transform.scale;
        };
        let margin = 20.0;
        let fit_w = viewport.width / (bounds.width + margin * 2.0);
        let fit_h = viewport.height / (bounds.height + margin * 2.0);
        let scale = self.set_scale(fit_w.min(fit_h));

        let center_x = bounds.x + bounds.width / 2.0;
        let center_y = bounds.y + bounds.height / 2.0;
        self.transform.pan = Vector::new(
            viewport.width / 2.0 - center_x * scale,
            viewport.height / 2.0 - center_y * scale,
        );
        scale
    }

    /// Advance fades and evict everything that finished fading out.
    /// Returns true while any animation is still running.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.lines.retain(|l| !l.fade.expired(now));
        self.boxes.retain(|b| !b.fade.expired(now));

        let mut animating = false;
        for b in &mut self.boxes {
            if b.fade.settled(now) {
                b.fade = Fade::None;
            }
            let before = b.ports.len();
            b.ports.retain(|p| !p.fade.expired(now));
            if b.ports.len() != before {
                b.relayout();
            }
            for p in &mut b.ports {
                if p.fade.settled(now) {
                    p.fade = Fade::None;
                }
                animating |= p.fade.animating();
            }
            animating |= b.fade.animating();
        }
        for l in &mut self.lines {
            if l.fade.settled(now) {
                l.fade = Fade::None;
            }
            animating |= l.fade.animating();
        }
        animating
    }
}

fn distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn contains_rect(outer: &Rectangle, inner: &Rectangle) -> bool {
    outer.x <= inner.x
        && outer.y <= inner.y
        && outer.x + outer.width >= inner.x + inner.width
        && outer.y + outer.height >= inner.y + inner.height
}

fn union(a: Rectangle, b: Rectangle) -> Rectangle {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let right = (a.x + a.width).max(b.x + b.width);
    let bottom = (a.y + a.height).max(b.y + b.height);
    Rectangle::new(Point::new(x, y), Size::new(right - x, bottom - y))
}

/// Control points matching the drawn cable curve.
pub fn bezier_controls(start: Point, end: Point) -> (Point, Point) {
    let offset = ((end.x - start.x).abs() / 2.0).max(40.0);
    (Point::new(start.x + offset, start.y), Point::new(end.x - offset, end.y))
}

fn bezier_distance(point: Point, start: Point, end: Point) -> f32 {
    let (c1, c2) = bezier_controls(start, end);
    let mut min_dist = f32::MAX;
    for i in 0..=LINE_HIT_SAMPLES {
        let t = i as f32 / LINE_HIT_SAMPLES as f32;
        let p = cubic_bezier(start, c1, c2, end, t);
        min_dist = min_dist.min(distance(point, p));
    }
    min_dist
}

pub fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f32) -> Point {
    let t2 = t * t;
    let t3 = t2 * t;
    let mt = 1.0 - t;
    let mt2 = mt * mt;
    let mt3 = mt2 * mt;
    Point::new(
        mt3 * p0.x + 3.0 * mt2 * t * p1.x + 3.0 * mt * t2 * p2.x + t3 * p3.x,
        mt3 * p0.y + 3.0 * mt2 * t * p1.y + 3.0 * mt * t2 * p2.y + t3 * p3.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_with_boxes(n: u32) -> (Scene, Vec<BoxId>) {
        let mut scene = Scene::new();
        let ids = (0..n)
            .map(|i| {
                scene.add_box(
                    GroupId(i),
                    &format!("box {i}"),
                    GroupIcon::Application,
                    BoxSide::Both,
                    None,
                    false,
                    None,
                )
            })
            .collect();
        (scene, ids)
    }

    #[test]
    fn zoom_stays_clamped_for_any_sequence() {
        let (mut scene, _) = scene_with_boxes(0);
        for _ in 0..50 {
            let s = scene.zoom_in();
            assert!((MIN_SCALE..=MAX_SCALE).contains(&s));
        }
        assert_eq!(scene.transform.scale, MAX_SCALE);

        for _ in 0..100 {
            let s = scene.zoom_out();
            assert!((MIN_SCALE..=MAX_SCALE).contains(&s));
        }
        assert_eq!(scene.transform.scale, MIN_SCALE);

        scene.zoom_wheel(100_000.0);
        assert_eq!(scene.transform.scale, MAX_SCALE);
        scene.zoom_wheel(-100_000.0);
        assert_eq!(scene.transform.scale, MIN_SCALE);

        assert_eq!(scene.zoom_reset(), 1.0);
    }

    #[test]
    fn one_wheel_notch_scales_by_the_base() {
        let (mut scene, _) = scene_with_boxes(0);
        let s = scene.zoom_wheel(240.0);
        assert!((s - WHEEL_ZOOM_BASE).abs() < 1e-4);
        let s = scene.zoom_wheel(-240.0);
        assert!((s - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rubberband_selects_only_fully_contained_boxes() {
        let mut scene = Scene::new();
        let a = scene.add_box(
            GroupId(1),
            "A",
            GroupIcon::Application,
            BoxSide::Both,
            Some(Point::new(0.0, 0.0)),
            false,
            None,
        );
        let b = scene.add_box(
            GroupId(2),
            "B",
            GroupIcon::Application,
            BoxSide::Both,
            Some(Point::new(400.0, 0.0)),
            false,
            None,
        );
        let c = scene.add_box(
            GroupId(3),
            "C",
            GroupIcon::Application,
            BoxSide::Both,
            Some(Point::new(0.0, 200.0)),
            false,
            None,
        );

        // Band covers A and C entirely, clips B halfway through.
        let band = Rectangle::new(Point::new(-10.0, -10.0), Size::new(470.0, 300.0));
        scene.select_contained(band);
        assert!(scene.selection.contains(&a));
        assert!(scene.selection.contains(&c));
        assert!(!scene.selection.contains(&b));
        assert_eq!(scene.selection.len(), 2);
    }

    #[test]
    fn fading_out_twice_is_harmless_and_tick_evicts() {
        let (mut scene, ids) = scene_with_boxes(1);
        let t0 = Instant::now();
        scene.remove_box(ids[0], Some(t0));
        let since = match scene.box_widget(ids[0]).unwrap().fade {
            Fade::Out { since } => since,
            other => panic!("expected fade-out, got {other:?}"),
        };

        // A second removal request must not restart the fade.
        scene.remove_box(ids[0], Some(t0 + Duration::from_millis(100)));
        assert_eq!(scene.box_widget(ids[0]).unwrap().fade, Fade::Out { since });

        assert!(scene.tick(t0 + Duration::from_millis(100)));
        assert!(scene.box_widget(ids[0]).is_some());

        scene.tick(t0 + FADE_DURATION);
        assert!(scene.box_widget(ids[0]).is_none());

        // Gone entirely: a third removal is a no-op.
        scene.remove_box(ids[0], Some(t0));
    }

    #[test]
    fn box_width_follows_widest_label() {
        let (mut scene, ids) = scene_with_boxes(1);
        let narrow = scene.box_widget(ids[0]).unwrap().width;
        scene.add_port(
            ids[0],
            PortId(1),
            "a rather long port label indeed",
            PortDirection::Output,
            PortKind::Audio,
            None,
        );
        let wide = scene.box_widget(ids[0]).unwrap().width;
        assert!(wide > narrow);

        scene.remove_port(PortId(1), None);
        assert_eq!(scene.box_widget(ids[0]).unwrap().width, narrow);
    }

    #[test]
    fn port_anchors_sit_on_the_matching_edge() {
        let (mut scene, ids) = scene_with_boxes(1);
        scene.add_port(ids[0], PortId(1), "out", PortDirection::Output, PortKind::Audio, None);
        scene.add_port(ids[0], PortId(2), "in", PortDirection::Input, PortKind::Audio, None);

        let b = scene.box_widget(ids[0]).unwrap();
        let out = b.port_anchor(PortId(1)).unwrap();
        let inp = b.port_anchor(PortId(2)).unwrap();
        assert_eq!(out.x, b.pos.x + b.width);
        assert_eq!(inp.x, b.pos.x);
        assert!(inp.y > out.y, "rows stack downward in insertion order");
    }

    #[test]
    fn zoom_fit_scales_to_the_bounding_box() {
        let mut scene = Scene::new();
        scene.add_box(
            GroupId(1),
            "A",
            GroupIcon::Application,
            BoxSide::Both,
            Some(Point::new(0.0, 0.0)),
            false,
            None,
        );
        scene.add_box(
            GroupId(2),
            "B",
            GroupIcon::Application,
            BoxSide::Both,
            Some(Point::new(2000.0, 1500.0)),
            false,
            None,
        );

        let s = scene.zoom_fit(Size::new(800.0, 600.0), false);
        assert!((MIN_SCALE..=MAX_SCALE).contains(&s));
        assert!(s < 1.0, "a sprawling graph must zoom out to fit");
    }
}
