use iced::widget::canvas::Cache;
use iced::{Point, Rectangle, Size, Vector};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Position, Settings};
use crate::scene::{BoxId, BoxSide, BoxWidget, ContextMenu, Hit, MenuAction, MenuItem, Scene};
use crate::theme::{self, Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Midi,
    MidiA2j,
    MidiAlsa,
}

impl PortKind {
    pub fn is_midi(self) -> bool {
        !matches!(self, PortKind::Audio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupIcon {
    Hardware,
    Application,
    LadishRoom,
}

/// Split hint for a new group. `Undefined` defers to the persisted per-group
/// choice when position persistence is granted, else resolves to joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Undefined,
    No,
    Yes,
}

/// One audio/MIDI client mirrored from the session.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub split: bool,
    pub icon: GroupIcon,
    box_out: BoxId,
    box_in: Option<BoxId>,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub group_id: GroupId,
    pub name: String,
    pub direction: PortDirection,
    pub kind: PortKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub port_out: PortId,
    pub port_in: PortId,
}

/// A request the canvas hands to the host. The canvas never applies these
/// itself: the host talks to the session and reflects the result back
/// through the mutation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasAction {
    GroupInfo { group_id: GroupId },
    GroupRename { group_id: GroupId, name: String },
    GroupSplit { group_id: GroupId },
    GroupJoin { group_id: GroupId },
    PortInfo { port_id: PortId },
    PortRename { port_id: PortId, name: String },
    PortsConnect { port_out: PortId, port_in: PortId },
    PortsDisconnect { connection_id: ConnectionId },
}

pub type Callback = Box<dyn FnMut(CanvasAction)>;

/// View-level notifications for the host: not session requests, just state
/// the host may want to persist or display.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ScaleChanged(f32),
    GroupMoved { group_id: GroupId, side: BoxSide, position: Position },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CanvasError {
    #[error("canvas is not initialized")]
    NotInitialized,
    #[error("canvas is already initialized")]
    AlreadyInitialized,
    #[error("duplicate {what} id {id}")]
    DuplicateId { what: &'static str, id: u32 },
    #[error("group {0:?} not found")]
    GroupNotFound(GroupId),
    #[error("port {0:?} not found")]
    PortNotFound(PortId),
    #[error("connection {0:?} not found")]
    ConnectionNotFound(ConnectionId),
    #[error("group {group:?} split state does not allow this (split: {split})")]
    InvalidGroupState { group: GroupId, split: bool },
    #[error("ports {port_out:?} -> {port_in:?} are not an output/input pair")]
    InvalidPortDirection { port_out: PortId, port_in: PortId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasOptions {
    pub theme_name: String,
    pub bezier_lines: bool,
    pub antialiasing: crate::config::Aliasing,
    pub auto_hide_groups: bool,
    pub eyecandy: bool,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            theme_name: theme::default_theme().name.to_string(),
            bezier_lines: true,
            antialiasing: crate::config::Aliasing::Full,
            auto_hide_groups: false,
            eyecandy: false,
        }
    }
}

/// What the host permits the canvas to request on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanvasFeatures {
    pub group_info: bool,
    pub group_rename: bool,
    pub port_info: bool,
    pub port_rename: bool,
    pub group_split: bool,
    pub position_persistence: bool,
}

/// Gesture messages published by the canvas widget, resolved against the
/// model on the update pass.
#[derive(Debug, Clone)]
pub enum CanvasMessage {
    BoxPressed { box_id: BoxId },
    BoxesDragged { delta: Vector },
    BoxDragEnded,
    RubberBandReleased { rect: Rectangle },
    ConnectDragEnded { from: PortId, to: PortId },
    ContextRequested { at: Point, hit: Hit },
    MenuItemChosen { index: usize },
    MenuDismissed,
    DoubleClicked { hit: Hit },
    Pan { delta: Vector },
    WheelZoom { delta: f32 },
    ZoomIn,
    ZoomOut,
    ZoomReset,
    ZoomFit { viewport: Size },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub removed_groups: usize,
    pub layout_dirty: bool,
    pub animating: bool,
}

/// Retries granted to a postponed group removal before it is declared
/// stuck, at one retry per ~100ms tick.
pub const POSTPONED_RETRY_BUDGET: u32 = 100;

#[derive(Debug, Clone, Copy)]
struct Postponed {
    group: GroupId,
    retries_left: u32,
}

/// The patch-bay aggregate: groups, ports and connections mirrored from an
/// external session, their rendered scene, and the host callback.
///
/// Everything runs on the UI thread; session threads must route their
/// notifications through the host's message loop before touching this.
pub struct Patchbay {
    groups: Vec<Group>,
    ports: Vec<Port>,
    connections: Vec<Connection>,
    scene: Scene,
    options: CanvasOptions,
    features: CanvasFeatures,
    theme: &'static Theme,
    saved: Settings,
    callback: Option<Callback>,
    active: bool,
    debug: bool,
    postponed: Vec<Postponed>,
    stuck: Vec<GroupId>,
    cache: Cache,
}

impl Default for Patchbay {
    fn default() -> Self {
        Self::new()
    }
}

impl Patchbay {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            ports: Vec::new(),
            connections: Vec::new(),
            scene: Scene::new(),
            options: CanvasOptions::default(),
            features: CanvasFeatures::default(),
            theme: theme::default_theme(),
            saved: Settings::default(),
            callback: None,
            active: false,
            debug: false,
            postponed: Vec::new(),
            stuck: Vec::new(),
            cache: Cache::new(),
        }
    }

    /// Rendering options; a no-op once the canvas is active.
    pub fn set_options(&mut self, options: CanvasOptions) {
        if self.active {
            warn!("set_options ignored: canvas already initialized");
            return;
        }
        self.theme = theme::by_name(&options.theme_name);
        self.options = options;
    }

    /// Permitted host features; a no-op once the canvas is active.
    pub fn set_features(&mut self, features: CanvasFeatures) {
        if self.active {
            warn!("set_features ignored: canvas already initialized");
            return;
        }
        self.features = features;
    }

    /// Seed the position/split memory from persisted settings; a no-op once
    /// the canvas is active.
    pub fn set_saved_layout(&mut self, saved: Settings) {
        if self.active {
            warn!("set_saved_layout ignored: canvas already initialized");
            return;
        }
        self.saved = saved;
    }

    pub fn set_canvas_size(&mut self, size: Size) {
        self.scene.canvas_size = size;
    }

    pub fn set_initial_pos(&mut self, pos: Point) {
        self.scene.initial_pos = pos;
    }

    /// Activate the canvas. Must be called exactly once before any mutation.
    pub fn init(&mut self, callback: Callback, debug: bool) -> Result<(), CanvasError> {
        if self.active {
            return Err(CanvasError::AlreadyInitialized);
        }
        self.callback = Some(callback);
        self.debug = debug;
        self.active = true;
        if debug {
            debug!(theme = self.theme.name, "canvas initialized");
        }
        Ok(())
    }

    /// Tear everything down (connections, then ports, then groups) and
    /// return to the uninitialized state. Idempotent.
    pub fn clear(&mut self) {
        for id in self.connections.iter().map(|c| c.id).collect::<Vec<_>>() {
            self.remove_connection(id, false);
        }
        for id in self.ports.iter().map(|p| p.id).collect::<Vec<_>>() {
            let _ = self.evict_port(id, false);
        }
        self.groups.clear();
        self.postponed.clear();
        self.stuck.clear();
        self.scene.reset();
        self.callback = None;
        self.active = false;
        self.cache.clear();
    }

    fn ensure_active(&self) -> Result<(), CanvasError> {
        if self.active { Ok(()) } else { Err(CanvasError::NotInitialized) }
    }

    fn fade(&self, animate: bool) -> Option<Instant> {
        (animate && self.options.eyecandy).then(Instant::now)
    }

    fn emit(&mut self, action: CanvasAction) {
        if self.debug {
            debug!(?action, "callback");
        }
        if let Some(cb) = self.callback.as_mut() {
            cb(action);
        }
    }

    fn saved_position(&self, name: &str, side: BoxSide) -> Option<Point> {
        if !self.features.position_persistence {
            return None;
        }
        self.saved.position(name, side).map(|p| Point::new(p.x, p.y))
    }

    // --- groups ------------------------------------------------------------

    pub fn add_group(
        &mut self,
        id: GroupId,
        name: &str,
        split: Split,
        icon: GroupIcon,
    ) -> Result<(), CanvasError> {
        self.ensure_active()?;
        if self.debug {
            debug!(?id, name, ?split, ?icon, "add_group");
        }
        self.insert_group(id, name, split, icon, true)
    }

    fn insert_group(
        &mut self,
        id: GroupId,
        name: &str,
        split: Split,
        icon: GroupIcon,
        animate: bool,
    ) -> Result<(), CanvasError> {
        if self.group(id).is_some() {
            return Err(CanvasError::DuplicateId { what: "group", id: id.0 });
        }

        let split = match split {
            Split::Yes => true,
            Split::No => false,
            Split::Undefined => {
                self.features.position_persistence && self.saved.split(name) == Some(true)
            }
        };
        let horizontal = matches!(icon, GroupIcon::Hardware | GroupIcon::LadishRoom);
        let fade = self.fade(animate);

        let (box_out, box_in) = if split {
            let out = self.scene.add_box(
                id,
                name,
                icon,
                BoxSide::Output,
                self.saved_position(name, BoxSide::Output),
                horizontal,
                fade,
            );
            let inp = self.scene.add_box(
                id,
                name,
                icon,
                BoxSide::Input,
                self.saved_position(name, BoxSide::Input),
                false,
                fade,
            );
            (out, Some(inp))
        } else {
            let both = self.scene.add_box(
                id,
                name,
                icon,
                BoxSide::Both,
                self.saved_position(name, BoxSide::Both),
                horizontal,
                fade,
            );
            (both, None)
        };

        self.groups.push(Group { id, name: name.to_string(), split, icon, box_out, box_in });
        self.cache.clear();
        Ok(())
    }

    /// Remove a group. When ports are still attached the removal is queued
    /// and retried from [`tick`](Self::tick) until the ports are gone or the
    /// retry budget runs out.
    pub fn remove_group(&mut self, id: GroupId) -> Result<(), CanvasError> {
        self.ensure_active()?;
        let Some(index) = self.groups.iter().position(|g| g.id == id) else {
            return Err(CanvasError::GroupNotFound(id));
        };
        if self.group_port_count(id) > 0 {
            if !self.postponed.iter().any(|p| p.group == id) {
                if self.debug {
                    debug!(?id, "remove_group postponed: ports still attached");
                }
                self.postponed.push(Postponed { group: id, retries_left: POSTPONED_RETRY_BUDGET });
            }
            return Ok(());
        }
        if self.debug {
            debug!(?id, "remove_group");
        }
        self.remove_group_now(index, true);
        Ok(())
    }

    fn remove_group_now(&mut self, index: usize, animate: bool) {
        let group = self.groups.remove(index);
        if self.features.position_persistence {
            let mut remember = |box_id: BoxId, side: BoxSide| {
                if let Some(b) = self.scene.box_widget(box_id) {
                    self.saved.set_position(&group.name, side, Position { x: b.pos.x, y: b.pos.y });
                }
            };
            if let Some(box_in) = group.box_in {
                remember(group.box_out, BoxSide::Output);
                remember(box_in, BoxSide::Input);
            } else {
                remember(group.box_out, BoxSide::Both);
            }
            self.saved.set_split(&group.name, group.split);
        }

        let fade = self.fade(animate);
        self.scene.remove_box(group.box_out, fade);
        if let Some(box_in) = group.box_in {
            self.scene.remove_box(box_in, fade);
        }
        self.postponed.retain(|p| p.group != group.id);
        self.cache.clear();
    }

    pub fn rename_group(&mut self, id: GroupId, new_name: &str) -> Result<(), CanvasError> {
        self.ensure_active()?;
        let Some(group) = self.groups.iter_mut().find(|g| g.id == id) else {
            return Err(CanvasError::GroupNotFound(id));
        };
        group.name = new_name.to_string();
        self.scene.retitle_group(id, new_name);
        self.cache.clear();
        Ok(())
    }

    pub fn split_group(&mut self, id: GroupId) -> Result<(), CanvasError> {
        self.ensure_active()?;
        match self.group(id) {
            None => Err(CanvasError::GroupNotFound(id)),
            Some(g) if g.split => Err(CanvasError::InvalidGroupState { group: id, split: true }),
            Some(_) => self.regroup(id, true),
        }
    }

    pub fn join_group(&mut self, id: GroupId) -> Result<(), CanvasError> {
        self.ensure_active()?;
        match self.group(id) {
            None => Err(CanvasError::GroupNotFound(id)),
            Some(g) if !g.split => Err(CanvasError::InvalidGroupState { group: id, split: false }),
            Some(_) => self.regroup(id, false),
        }
    }

    /// Rebuild a group in the opposite split mode: snapshot its ports and
    /// the connections touching them, tear everything down, re-add the group
    /// and replay the snapshot in original order under the original ids.
    fn regroup(&mut self, id: GroupId, to_split: bool) -> Result<(), CanvasError> {
        if self.debug {
            debug!(?id, to_split, "regroup");
        }
        let Some(group) = self.group(id).cloned() else {
            return Err(CanvasError::GroupNotFound(id));
        };
        let snap_ports: Vec<Port> =
            self.ports.iter().filter(|p| p.group_id == id).cloned().collect();
        let snap_conns: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| {
                snap_ports.iter().any(|p| p.id == c.port_out || p.id == c.port_in)
            })
            .copied()
            .collect();

        for c in &snap_conns {
            self.remove_connection(c.id, false);
        }
        for p in &snap_ports {
            self.evict_port(p.id, false)?;
        }
        let Some(index) = self.groups.iter().position(|g| g.id == id) else {
            return Err(CanvasError::GroupNotFound(id));
        };
        self.remove_group_now(index, false);

        self.saved.set_split(&group.name, to_split);
        self.insert_group(
            id,
            &group.name,
            if to_split { Split::Yes } else { Split::No },
            group.icon,
            false,
        )?;
        for p in snap_ports {
            self.insert_port(p.group_id, p.id, &p.name, p.direction, p.kind, false)?;
        }
        for c in snap_conns {
            self.insert_connection(c.id, c.port_out, c.port_in, false)?;
        }
        Ok(())
    }

    // --- ports -------------------------------------------------------------

    pub fn add_port(
        &mut self,
        group_id: GroupId,
        port_id: PortId,
        name: &str,
        direction: PortDirection,
        kind: PortKind,
    ) -> Result<(), CanvasError> {
        self.ensure_active()?;
        if self.debug {
            debug!(?group_id, ?port_id, name, ?direction, ?kind, "add_port");
        }
        self.insert_port(group_id, port_id, name, direction, kind, true)
    }

    fn insert_port(
        &mut self,
        group_id: GroupId,
        port_id: PortId,
        name: &str,
        direction: PortDirection,
        kind: PortKind,
        animate: bool,
    ) -> Result<(), CanvasError> {
        if self.port(port_id).is_some() {
            return Err(CanvasError::DuplicateId { what: "port", id: port_id.0 });
        }
        let Some(group) = self.group(group_id) else {
            return Err(CanvasError::GroupNotFound(group_id));
        };

        let box_id = match (group.split, direction) {
            (false, _) | (true, PortDirection::Output) => group.box_out,
            (true, PortDirection::Input) => group.box_in.unwrap_or(group.box_out),
        };
        let fade = self.fade(animate);
        self.scene.add_port(box_id, port_id, name, direction, kind, fade);
        self.ports.push(Port { id: port_id, group_id, name: name.to_string(), direction, kind });
        self.cache.clear();
        Ok(())
    }

    pub fn remove_port(&mut self, port_id: PortId) -> Result<(), CanvasError> {
        self.ensure_active()?;
        if self.debug {
            debug!(?port_id, "remove_port");
        }
        self.evict_port(port_id, true)
    }

    fn evict_port(&mut self, port_id: PortId, animate: bool) -> Result<(), CanvasError> {
        let Some(index) = self.ports.iter().position(|p| p.id == port_id) else {
            return Err(CanvasError::PortNotFound(port_id));
        };
        // Wires may never reference a dead port.
        for id in self.port_connections(port_id) {
            self.remove_connection(id, animate);
        }
        let fade = self.fade(animate);
        self.scene.remove_port(port_id, fade);
        self.ports.remove(index);
        self.cache.clear();
        Ok(())
    }

    pub fn rename_port(&mut self, port_id: PortId, new_name: &str) -> Result<(), CanvasError> {
        self.ensure_active()?;
        let Some(port) = self.ports.iter_mut().find(|p| p.id == port_id) else {
            return Err(CanvasError::PortNotFound(port_id));
        };
        port.name = new_name.to_string();
        self.scene.rename_port(port_id, new_name);
        self.cache.clear();
        Ok(())
    }

    // --- connections -------------------------------------------------------

    pub fn connect_ports(
        &mut self,
        connection_id: ConnectionId,
        port_out: PortId,
        port_in: PortId,
    ) -> Result<(), CanvasError> {
        self.ensure_active()?;
        if self.debug {
            debug!(?connection_id, ?port_out, ?port_in, "connect_ports");
        }
        self.insert_connection(connection_id, port_out, port_in, true)
    }

    fn insert_connection(
        &mut self,
        connection_id: ConnectionId,
        port_out: PortId,
        port_in: PortId,
        animate: bool,
    ) -> Result<(), CanvasError> {
        if self.connection(connection_id).is_some() {
            return Err(CanvasError::DuplicateId { what: "connection", id: connection_id.0 });
        }
        let out = self.port(port_out).ok_or(CanvasError::PortNotFound(port_out))?;
        let inp = self.port(port_in).ok_or(CanvasError::PortNotFound(port_in))?;
        if out.direction != PortDirection::Output || inp.direction != PortDirection::Input {
            return Err(CanvasError::InvalidPortDirection { port_out, port_in });
        }

        let fade = self.fade(animate);
        self.scene.add_line(connection_id, port_out, port_in, fade);
        if let Some(b) = self.scene.box_of_port(port_out) {
            self.scene.raise_box(b);
        }
        if let Some(b) = self.scene.box_of_port(port_in) {
            self.scene.raise_box(b);
        }
        self.connections.push(Connection { id: connection_id, port_out, port_in });
        self.cache.clear();
        Ok(())
    }

    pub fn disconnect_ports(&mut self, connection_id: ConnectionId) -> Result<(), CanvasError> {
        self.ensure_active()?;
        if self.debug {
            debug!(?connection_id, "disconnect_ports");
        }
        let Some(conn) = self.connection(connection_id).copied() else {
            return Err(CanvasError::ConnectionNotFound(connection_id));
        };
        if self.port(conn.port_out).is_none() {
            return Err(CanvasError::PortNotFound(conn.port_out));
        }
        if self.port(conn.port_in).is_none() {
            return Err(CanvasError::PortNotFound(conn.port_in));
        }
        self.remove_connection(connection_id, true);
        Ok(())
    }

    fn remove_connection(&mut self, connection_id: ConnectionId, animate: bool) {
        let fade = self.fade(animate);
        self.scene.remove_line(connection_id, fade);
        self.connections.retain(|c| c.id != connection_id);
        self.cache.clear();
    }

    // --- queries -----------------------------------------------------------

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn group_name(&self, id: GroupId) -> Option<&str> {
        self.group(id).map(|g| g.name.as_str())
    }

    pub fn group_port_count(&self, id: GroupId) -> usize {
        self.ports.iter().filter(|p| p.group_id == id).count()
    }

    /// `"group:port"`, the qualified form the session speaks.
    pub fn port_qualified_name(&self, id: PortId) -> Option<String> {
        let port = self.port(id)?;
        let group = self.group(port.group_id)?;
        Some(format!("{}:{}", group.name, port.name))
    }

    pub fn port_connections(&self, id: PortId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.port_out == id || c.port_in == id)
            .map(|c| c.id)
            .collect()
    }

    pub fn other_endpoint(&self, connection_id: ConnectionId, port_id: PortId) -> Option<PortId> {
        let c = self.connection(connection_id)?;
        if c.port_out == port_id {
            Some(c.port_in)
        } else if c.port_in == port_id {
            Some(c.port_out)
        } else {
            None
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn group_boxes(&self, id: GroupId) -> Vec<&BoxWidget> {
        let Some(g) = self.group(id) else {
            return Vec::new();
        };
        [Some(g.box_out), g.box_in]
            .into_iter()
            .flatten()
            .filter_map(|b| self.scene.box_widget(b))
            .collect()
    }

    /// Postponed removals that ran out of retries.
    pub fn stuck_removals(&self) -> &[GroupId] {
        &self.stuck
    }

    /// The canvas-maintained layout memory, for the host to persist.
    pub fn saved_layout(&self) -> &Settings {
        &self.saved
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn options(&self) -> &CanvasOptions {
        &self.options
    }

    pub fn theme(&self) -> &'static Theme {
        self.theme
    }

    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }

    // --- host tick ---------------------------------------------------------

    /// Drive postponed removals and fade animations. The host calls this on
    /// its ~100ms timer.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for entry in std::mem::take(&mut self.postponed) {
            let Some(index) = self.groups.iter().position(|g| g.id == entry.group) else {
                continue;
            };
            if self.group_port_count(entry.group) == 0 {
                self.remove_group_now(index, true);
                outcome.removed_groups += 1;
                outcome.layout_dirty = true;
            } else if entry.retries_left <= 1 {
                warn!(group = ?entry.group, "postponed removal stuck: ports never went away");
                self.stuck.push(entry.group);
            } else {
                self.postponed
                    .push(Postponed { group: entry.group, retries_left: entry.retries_left - 1 });
            }
        }

        outcome.animating = self.scene.tick(now);
        if outcome.animating || outcome.removed_groups > 0 {
            self.cache.clear();
        }
        outcome
    }

    // --- gesture handling --------------------------------------------------

    /// Resolve a gesture message against the model. Session requests go out
    /// through the callback; view state changes are returned as
    /// notifications.
    pub fn handle_message(&mut self, message: CanvasMessage) -> Vec<Notification> {
        if !self.active {
            debug!("gesture ignored: canvas not initialized");
            return Vec::new();
        }
        let mut notes = Vec::new();
        match message {
            CanvasMessage::BoxPressed { box_id } => {
                if !self.scene.selection.contains(&box_id) {
                    self.scene.selection.clear();
                    self.scene.selection.insert(box_id);
                }
                self.scene.raise_box(box_id);
                self.cache.clear();
            }
            CanvasMessage::BoxesDragged { delta } => {
                let scale = self.scene.transform.scale;
                self.scene.move_selected(Vector::new(delta.x / scale, delta.y / scale));
                self.cache.clear();
            }
            CanvasMessage::BoxDragEnded => {
                let moved: Vec<(GroupId, BoxSide, Point, String)> = self
                    .scene
                    .selection
                    .iter()
                    .filter_map(|id| self.scene.box_widget(*id))
                    .filter_map(|b| {
                        let name = self.group_name(b.group_id)?.to_string();
                        Some((b.group_id, b.side, b.pos, name))
                    })
                    .collect();
                for (group_id, side, pos, name) in moved {
                    let position = Position { x: pos.x, y: pos.y };
                    if self.features.position_persistence {
                        self.saved.set_position(&name, side, position);
                    }
                    notes.push(Notification::GroupMoved { group_id, side, position });
                }
            }
            CanvasMessage::RubberBandReleased { rect } => {
                self.scene.select_contained(rect);
                self.cache.clear();
            }
            CanvasMessage::ConnectDragEnded { from, to } => {
                self.request_connection(from, to);
            }
            CanvasMessage::ContextRequested { at, hit } => {
                self.scene.menu = self.build_menu(at, hit);
            }
            CanvasMessage::MenuItemChosen { index } => {
                if let Some(menu) = self.scene.menu.take() {
                    if let Some(item) = menu.items.get(index) {
                        self.apply_menu_action(item.action);
                    }
                }
            }
            CanvasMessage::MenuDismissed => {
                self.scene.menu = None;
            }
            CanvasMessage::DoubleClicked { hit } => match hit {
                Hit::BoxHeader(b) | Hit::BoxBody(b) => {
                    if self.features.group_info {
                        if let Some(group_id) =
                            self.scene.box_widget(b).map(|w| w.group_id)
                        {
                            self.emit(CanvasAction::GroupInfo { group_id });
                        }
                    }
                }
                Hit::Port { port_id, .. } => {
                    if self.features.port_info {
                        self.emit(CanvasAction::PortInfo { port_id });
                    }
                }
                _ => {}
            },
            CanvasMessage::Pan { delta } => {
                self.scene.transform.pan = self.scene.transform.pan + delta;
                self.cache.clear();
            }
            CanvasMessage::WheelZoom { delta } => {
                let scale = self.scene.zoom_wheel(delta);
                notes.push(Notification::ScaleChanged(scale));
                self.cache.clear();
            }
            CanvasMessage::ZoomIn => {
                let scale = self.scene.zoom_in();
                notes.push(Notification::ScaleChanged(scale));
                self.cache.clear();
            }
            CanvasMessage::ZoomOut => {
                let scale = self.scene.zoom_out();
                notes.push(Notification::ScaleChanged(scale));
                self.cache.clear();
            }
            CanvasMessage::ZoomReset => {
                let scale = self.scene.zoom_reset();
                notes.push(Notification::ScaleChanged(scale));
                self.cache.clear();
            }
            CanvasMessage::ZoomFit { viewport } => {
                let scale = self.scene.zoom_fit(viewport, self.options.auto_hide_groups);
                notes.push(Notification::ScaleChanged(scale));
                self.cache.clear();
            }
        }
        notes
    }

    /// Order the dragged pair into (output, input) and request the wire.
    /// Incompatible pairs are dropped quietly: mis-drags are routine.
    fn request_connection(&mut self, from: PortId, to: PortId) {
        let (Some(a), Some(b)) = (self.port(from), self.port(to)) else {
            debug!(?from, ?to, "connect drag over unknown ports");
            return;
        };
        if a.kind.is_midi() != b.kind.is_midi() {
            debug!(?from, ?to, "connect drag across port kinds ignored");
            return;
        }
        let pair = match (a.direction, b.direction) {
            (PortDirection::Output, PortDirection::Input) => Some((from, to)),
            (PortDirection::Input, PortDirection::Output) => Some((to, from)),
            _ => None,
        };
        match pair {
            Some((port_out, port_in)) => self.emit(CanvasAction::PortsConnect { port_out, port_in }),
            None => debug!(?from, ?to, "connect drag between same-direction ports ignored"),
        }
    }

    fn build_menu(&self, at: Point, hit: Hit) -> Option<ContextMenu> {
        let mut items = Vec::new();
        match hit {
            Hit::Line(connection_id) => {
                items.push(MenuItem {
                    label: "Disconnect".to_string(),
                    action: MenuAction::Disconnect(connection_id),
                });
            }
            Hit::BoxHeader(b) | Hit::BoxBody(b) => {
                let widget = self.scene.box_widget(b)?;
                let group = self.group(widget.group_id)?;
                if self.features.group_info {
                    items.push(MenuItem {
                        label: "Info".to_string(),
                        action: MenuAction::GroupInfo(group.id),
                    });
                }
                if self.features.group_rename {
                    items.push(MenuItem {
                        label: "Rename…".to_string(),
                        action: MenuAction::GroupRename(group.id),
                    });
                }
                if self.features.group_split {
                    items.push(if group.split {
                        MenuItem { label: "Join".to_string(), action: MenuAction::GroupJoin(group.id) }
                    } else {
                        MenuItem {
                            label: "Split".to_string(),
                            action: MenuAction::GroupSplit(group.id),
                        }
                    });
                }
            }
            Hit::Port { port_id, .. } => {
                if self.features.port_info {
                    items.push(MenuItem {
                        label: "Port info".to_string(),
                        action: MenuAction::PortInfo(port_id),
                    });
                }
                if self.features.port_rename {
                    items.push(MenuItem {
                        label: "Rename port…".to_string(),
                        action: MenuAction::PortRename(port_id),
                    });
                }
            }
            Hit::None | Hit::MenuItem(_) => {}
        }
        if items.is_empty() { None } else { Some(ContextMenu { origin: at, items }) }
    }

    fn apply_menu_action(&mut self, action: MenuAction) {
        match action {
            MenuAction::Disconnect(connection_id) => {
                self.emit(CanvasAction::PortsDisconnect { connection_id });
            }
            MenuAction::GroupInfo(group_id) => self.emit(CanvasAction::GroupInfo { group_id }),
            MenuAction::GroupRename(group_id) => {
                if let Some(name) = self.group_name(group_id).map(str::to_string) {
                    self.emit(CanvasAction::GroupRename { group_id, name });
                }
            }
            MenuAction::GroupSplit(group_id) => self.emit(CanvasAction::GroupSplit { group_id }),
            MenuAction::GroupJoin(group_id) => self.emit(CanvasAction::GroupJoin { group_id }),
            MenuAction::PortInfo(port_id) => self.emit(CanvasAction::PortInfo { port_id }),
            MenuAction::PortRename(port_id) => {
                if let Some(name) = self.port(port_id).map(|p| p.name.clone()) {
                    self.emit(CanvasAction::PortRename { port_id, name });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn canvas() -> (Patchbay, Rc<RefCell<Vec<CanvasAction>>>) {
        let mut pb = Patchbay::new();
        pb.set_features(CanvasFeatures {
            group_info: true,
            group_rename: true,
            port_info: true,
            port_rename: true,
            group_split: true,
            position_persistence: true,
        });
        let actions = Rc::new(RefCell::new(Vec::new()));
        let sink = actions.clone();
        pb.init(Box::new(move |a| sink.borrow_mut().push(a)), false).unwrap();
        (pb, actions)
    }

    fn stereo_group(pb: &mut Patchbay, gid: u32, split: Split) {
        pb.add_group(GroupId(gid), &format!("group {gid}"), split, GroupIcon::Application)
            .unwrap();
        pb.add_port(GroupId(gid), PortId(gid * 10), "out_L", PortDirection::Output, PortKind::Audio)
            .unwrap();
        pb.add_port(
            GroupId(gid),
            PortId(gid * 10 + 1),
            "in_L",
            PortDirection::Input,
            PortKind::Audio,
        )
        .unwrap();
    }

    #[test]
    fn init_can_only_happen_once() {
        let (mut pb, _) = canvas();
        let err = pb.init(Box::new(|_| {}), false).unwrap_err();
        assert_eq!(err, CanvasError::AlreadyInitialized);
    }

    #[test]
    fn mutations_require_init() {
        let mut pb = Patchbay::new();
        assert_eq!(
            pb.add_group(GroupId(1), "x", Split::No, GroupIcon::Application),
            Err(CanvasError::NotInitialized)
        );
        assert_eq!(pb.remove_port(PortId(1)), Err(CanvasError::NotInitialized));
        assert_eq!(pb.disconnect_ports(ConnectionId(1)), Err(CanvasError::NotInitialized));
    }

    #[test]
    fn port_count_tracks_live_ports() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        pb.add_group(GroupId(2), "b", Split::No, GroupIcon::Application).unwrap();
        for i in 0..4 {
            pb.add_port(GroupId(1), PortId(i), "p", PortDirection::Output, PortKind::Audio)
                .unwrap();
        }
        pb.add_port(GroupId(2), PortId(10), "q", PortDirection::Input, PortKind::Audio).unwrap();
        assert_eq!(pb.group_port_count(GroupId(1)), 4);
        assert_eq!(pb.group_port_count(GroupId(2)), 1);

        pb.remove_port(PortId(2)).unwrap();
        assert_eq!(pb.group_port_count(GroupId(1)), 3);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        assert_eq!(
            pb.add_group(GroupId(1), "b", Split::No, GroupIcon::Application),
            Err(CanvasError::DuplicateId { what: "group", id: 1 })
        );

        pb.add_port(GroupId(1), PortId(7), "p", PortDirection::Output, PortKind::Audio).unwrap();
        assert_eq!(
            pb.add_port(GroupId(1), PortId(7), "p2", PortDirection::Input, PortKind::Audio),
            Err(CanvasError::DuplicateId { what: "port", id: 7 })
        );

        pb.add_port(GroupId(1), PortId(8), "q", PortDirection::Input, PortKind::Audio).unwrap();
        pb.connect_ports(ConnectionId(1), PortId(7), PortId(8)).unwrap();
        assert_eq!(
            pb.connect_ports(ConnectionId(1), PortId(7), PortId(8)),
            Err(CanvasError::DuplicateId { what: "connection", id: 1 })
        );
    }

    #[test]
    fn connecting_needs_an_output_input_pair() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        pb.add_port(GroupId(1), PortId(1), "o1", PortDirection::Output, PortKind::Audio).unwrap();
        pb.add_port(GroupId(1), PortId(2), "o2", PortDirection::Output, PortKind::Audio).unwrap();
        pb.add_port(GroupId(1), PortId(3), "i1", PortDirection::Input, PortKind::Audio).unwrap();

        assert_eq!(
            pb.connect_ports(ConnectionId(1), PortId(1), PortId(2)),
            Err(CanvasError::InvalidPortDirection { port_out: PortId(1), port_in: PortId(2) })
        );
        assert_eq!(
            pb.connect_ports(ConnectionId(1), PortId(3), PortId(1)),
            Err(CanvasError::InvalidPortDirection { port_out: PortId(3), port_in: PortId(1) })
        );
        assert!(pb.connect_ports(ConnectionId(1), PortId(1), PortId(3)).is_ok());
    }

    #[test]
    fn missing_ids_come_back_as_typed_errors() {
        let (mut pb, _) = canvas();
        assert_eq!(pb.remove_group(GroupId(9)), Err(CanvasError::GroupNotFound(GroupId(9))));
        assert_eq!(pb.rename_port(PortId(9), "x"), Err(CanvasError::PortNotFound(PortId(9))));
        assert_eq!(
            pb.disconnect_ports(ConnectionId(9)),
            Err(CanvasError::ConnectionNotFound(ConnectionId(9)))
        );
    }

    #[test]
    fn split_group_owns_two_boxes_and_routes_ports_by_direction() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "Firefox", Split::Yes, GroupIcon::Application).unwrap();
        let boxes = pb.group_boxes(GroupId(1));
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].side, BoxSide::Output);
        assert_eq!(boxes[1].side, BoxSide::Input);

        pb.add_port(GroupId(1), PortId(10), "out_L", PortDirection::Output, PortKind::Audio)
            .unwrap();
        pb.add_port(GroupId(1), PortId(11), "in_L", PortDirection::Input, PortKind::Audio).unwrap();

        let out_box = pb.group_boxes(GroupId(1))[0].id;
        let in_box = pb.group_boxes(GroupId(1))[1].id;
        assert_eq!(pb.scene().box_of_port(PortId(10)), Some(out_box));
        assert_eq!(pb.scene().box_of_port(PortId(11)), Some(in_box));
    }

    #[test]
    fn removal_with_ports_is_postponed_until_ports_vanish() {
        let (mut pb, _) = canvas();
        stereo_group(&mut pb, 1, Split::Yes);
        pb.connect_ports(ConnectionId(100), PortId(10), PortId(11)).unwrap();

        pb.remove_group(GroupId(1)).unwrap();
        assert!(pb.group(GroupId(1)).is_some(), "two ports still attached");

        // Ticks alone do not remove it while the ports remain.
        pb.tick(Instant::now());
        assert!(pb.group(GroupId(1)).is_some());

        pb.remove_port(PortId(10)).unwrap();
        pb.remove_port(PortId(11)).unwrap();
        pb.tick(Instant::now());

        assert_eq!(pb.group_count(), 0);
        assert_eq!(pb.port_count(), 0);
        assert_eq!(pb.connection_count(), 0);
    }

    #[test]
    fn postponed_removal_gives_up_after_its_budget() {
        let (mut pb, _) = canvas();
        stereo_group(&mut pb, 1, Split::No);
        pb.remove_group(GroupId(1)).unwrap();

        for _ in 0..POSTPONED_RETRY_BUDGET {
            pb.tick(Instant::now());
        }
        assert!(pb.group(GroupId(1)).is_some(), "the group itself is left alone");
        assert_eq!(pb.stuck_removals(), &[GroupId(1)]);

        // The queue is drained: later port removals no longer trigger it.
        pb.remove_port(PortId(10)).unwrap();
        pb.remove_port(PortId(11)).unwrap();
        pb.tick(Instant::now());
        assert!(pb.group(GroupId(1)).is_some());
    }

    #[test]
    fn split_then_join_round_trips_every_id() {
        let (mut pb, _) = canvas();
        stereo_group(&mut pb, 1, Split::No);
        stereo_group(&mut pb, 2, Split::No);
        pb.connect_ports(ConnectionId(100), PortId(10), PortId(21)).unwrap();
        pb.connect_ports(ConnectionId(101), PortId(20), PortId(11)).unwrap();

        let mut ports_before: Vec<PortId> = pb.ports.iter().map(|p| p.id).collect();
        ports_before.sort();
        let mut conns_before: Vec<Connection> = pb.connections.clone();
        conns_before.sort_by_key(|c| c.id);

        pb.split_group(GroupId(1)).unwrap();
        assert!(pb.group(GroupId(1)).unwrap().split);
        assert_eq!(pb.group_boxes(GroupId(1)).len(), 2);

        pb.join_group(GroupId(1)).unwrap();
        assert!(!pb.group(GroupId(1)).unwrap().split);
        assert_eq!(pb.group_boxes(GroupId(1)).len(), 1);

        let mut ports_after: Vec<PortId> = pb.ports.iter().map(|p| p.id).collect();
        ports_after.sort();
        let mut conns_after: Vec<Connection> = pb.connections.clone();
        conns_after.sort_by_key(|c| c.id);
        assert_eq!(ports_before, ports_after);
        assert_eq!(conns_before, conns_after);
    }

    #[test]
    fn split_state_transitions_are_checked() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        assert_eq!(
            pb.join_group(GroupId(1)),
            Err(CanvasError::InvalidGroupState { group: GroupId(1), split: false })
        );
        pb.split_group(GroupId(1)).unwrap();
        assert_eq!(
            pb.split_group(GroupId(1)),
            Err(CanvasError::InvalidGroupState { group: GroupId(1), split: true })
        );
    }

    #[test]
    fn undefined_split_consults_the_saved_layout() {
        let mut pb = Patchbay::new();
        pb.set_features(CanvasFeatures { position_persistence: true, ..Default::default() });
        let mut saved = Settings::default();
        saved.set_split("system", true);
        pb.set_saved_layout(saved);
        pb.init(Box::new(|_| {}), false).unwrap();

        pb.add_group(GroupId(1), "system", Split::Undefined, GroupIcon::Hardware).unwrap();
        assert!(pb.group(GroupId(1)).unwrap().split);

        pb.add_group(GroupId(2), "Firefox", Split::Undefined, GroupIcon::Application).unwrap();
        assert!(!pb.group(GroupId(2)).unwrap().split);
    }

    #[test]
    fn connect_then_disconnect_restores_the_prior_state() {
        let (mut pb, _) = canvas();
        stereo_group(&mut pb, 1, Split::No);
        stereo_group(&mut pb, 2, Split::No);

        pb.connect_ports(ConnectionId(5), PortId(10), PortId(21)).unwrap();
        assert_eq!(pb.port_connections(PortId(10)), vec![ConnectionId(5)]);
        assert_eq!(pb.other_endpoint(ConnectionId(5), PortId(10)), Some(PortId(21)));

        pb.disconnect_ports(ConnectionId(5)).unwrap();
        assert_eq!(pb.connection_count(), 0);
        assert!(pb.port_connections(PortId(10)).is_empty());
        assert_eq!(pb.group_count(), 2);
        assert_eq!(pb.port_count(), 4);
    }

    #[test]
    fn removing_a_port_severs_its_wires() {
        let (mut pb, _) = canvas();
        stereo_group(&mut pb, 1, Split::No);
        pb.connect_ports(ConnectionId(1), PortId(10), PortId(11)).unwrap();
        pb.remove_port(PortId(10)).unwrap();
        assert_eq!(pb.connection_count(), 0);
        assert!(pb.port(PortId(11)).is_some());
    }

    #[test]
    fn the_firefox_scenario() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "Firefox", Split::Yes, GroupIcon::Application).unwrap();
        assert_eq!(pb.group_boxes(GroupId(1)).len(), 2);

        pb.add_port(GroupId(1), PortId(10), "out_L", PortDirection::Output, PortKind::Audio)
            .unwrap();
        pb.add_port(GroupId(1), PortId(11), "in_L", PortDirection::Input, PortKind::Audio).unwrap();
        pb.connect_ports(ConnectionId(100), PortId(10), PortId(11)).unwrap();
        assert_eq!(pb.connection_count(), 1);

        pb.remove_group(GroupId(1)).unwrap();
        assert!(pb.group(GroupId(1)).is_some(), "removal postponed while ports exist");

        pb.remove_port(PortId(10)).unwrap();
        pb.remove_port(PortId(11)).unwrap();
        pb.tick(Instant::now());

        assert_eq!(pb.group_count(), 0);
        assert_eq!(pb.port_count(), 0);
        assert_eq!(pb.connection_count(), 0);
    }

    #[test]
    fn clear_resets_everything_and_is_idempotent() {
        let (mut pb, _) = canvas();
        stereo_group(&mut pb, 1, Split::Yes);
        pb.connect_ports(ConnectionId(1), PortId(10), PortId(11)).unwrap();

        pb.clear();
        assert!(!pb.is_active());
        assert_eq!(pb.group_count(), 0);
        assert_eq!(pb.port_count(), 0);
        assert_eq!(pb.connection_count(), 0);
        assert!(pb.scene().boxes().is_empty());

        pb.clear();
        assert!(!pb.is_active());

        // A fresh init works after clear.
        pb.init(Box::new(|_| {}), false).unwrap();
        pb.add_group(GroupId(1), "again", Split::No, GroupIcon::Application).unwrap();
        assert_eq!(pb.group_count(), 1);
    }

    #[test]
    fn qualified_names_join_group_and_port() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "system", Split::No, GroupIcon::Hardware).unwrap();
        pb.add_port(GroupId(1), PortId(1), "capture_1", PortDirection::Output, PortKind::Audio)
            .unwrap();
        assert_eq!(pb.port_qualified_name(PortId(1)).as_deref(), Some("system:capture_1"));
        assert_eq!(pb.port_qualified_name(PortId(99)), None);
    }

    #[test]
    fn rename_updates_model_and_boxes() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "old", Split::Yes, GroupIcon::Application).unwrap();
        pb.rename_group(GroupId(1), "new").unwrap();
        assert_eq!(pb.group_name(GroupId(1)), Some("new"));
        for b in pb.group_boxes(GroupId(1)) {
            assert_eq!(b.title, "new");
        }

        pb.add_port(GroupId(1), PortId(1), "out", PortDirection::Output, PortKind::Midi).unwrap();
        pb.rename_port(PortId(1), "midi_out").unwrap();
        assert_eq!(pb.port(PortId(1)).unwrap().name, "midi_out");
        assert_eq!(pb.port_qualified_name(PortId(1)).as_deref(), Some("new:midi_out"));
    }

    #[test]
    fn line_context_menu_emits_a_disconnect_request() {
        let (mut pb, actions) = canvas();
        stereo_group(&mut pb, 1, Split::No);
        pb.connect_ports(ConnectionId(42), PortId(10), PortId(11)).unwrap();

        pb.handle_message(CanvasMessage::ContextRequested {
            at: Point::new(5.0, 5.0),
            hit: Hit::Line(ConnectionId(42)),
        });
        let menu = pb.scene().menu.clone().expect("menu open");
        assert_eq!(menu.items.len(), 1);
        assert_eq!(menu.items[0].label, "Disconnect");

        pb.handle_message(CanvasMessage::MenuItemChosen { index: 0 });
        assert!(pb.scene().menu.is_none());
        assert_eq!(
            actions.borrow().as_slice(),
            &[CanvasAction::PortsDisconnect { connection_id: ConnectionId(42) }]
        );
        // The canvas itself never applies the request.
        assert_eq!(pb.connection_count(), 1);
    }

    #[test]
    fn group_menu_offers_split_or_join() {
        let (mut pb, actions) = canvas();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        let box_id = pb.group_boxes(GroupId(1))[0].id;

        pb.handle_message(CanvasMessage::ContextRequested {
            at: Point::ORIGIN,
            hit: Hit::BoxHeader(box_id),
        });
        let menu = pb.scene().menu.clone().expect("menu open");
        let labels: Vec<&str> = menu.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Info", "Rename…", "Split"]);

        let split_index = labels.iter().position(|l| *l == "Split").unwrap();
        pb.handle_message(CanvasMessage::MenuItemChosen { index: split_index });
        assert_eq!(
            actions.borrow().last(),
            Some(&CanvasAction::GroupSplit { group_id: GroupId(1) })
        );
    }

    #[test]
    fn connect_drag_orders_the_pair_by_direction() {
        let (mut pb, actions) = canvas();
        stereo_group(&mut pb, 1, Split::No);
        stereo_group(&mut pb, 2, Split::No);

        // Dragging input-first still requests (output, input).
        pb.handle_message(CanvasMessage::ConnectDragEnded { from: PortId(21), to: PortId(10) });
        assert_eq!(
            actions.borrow().as_slice(),
            &[CanvasAction::PortsConnect { port_out: PortId(10), port_in: PortId(21) }]
        );

        // Same-direction and cross-kind drags are dropped.
        pb.handle_message(CanvasMessage::ConnectDragEnded { from: PortId(10), to: PortId(20) });
        pb.add_port(GroupId(1), PortId(30), "midi", PortDirection::Input, PortKind::Midi).unwrap();
        pb.handle_message(CanvasMessage::ConnectDragEnded { from: PortId(10), to: PortId(30) });
        assert_eq!(actions.borrow().len(), 1);
    }

    #[test]
    fn double_click_honors_feature_gates() {
        let mut pb = Patchbay::new();
        let actions = Rc::new(RefCell::new(Vec::new()));
        let sink = actions.clone();
        pb.set_features(CanvasFeatures::default()); // everything off
        pb.init(Box::new(move |a| sink.borrow_mut().push(a)), false).unwrap();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        let box_id = pb.group_boxes(GroupId(1))[0].id;

        pb.handle_message(CanvasMessage::DoubleClicked { hit: Hit::BoxHeader(box_id) });
        assert!(actions.borrow().is_empty());
    }

    #[test]
    fn zoom_messages_report_the_resulting_scale() {
        let (mut pb, _) = canvas();
        let notes = pb.handle_message(CanvasMessage::ZoomIn);
        assert_eq!(notes, vec![Notification::ScaleChanged(1.2)]);

        let notes = pb.handle_message(CanvasMessage::ZoomReset);
        assert_eq!(notes, vec![Notification::ScaleChanged(1.0)]);

        for _ in 0..40 {
            pb.handle_message(CanvasMessage::ZoomOut);
        }
        assert_eq!(pb.scene().transform.scale, crate::scene::MIN_SCALE);
    }

    #[test]
    fn finished_drag_reports_each_moved_box() {
        let (mut pb, _) = canvas();
        pb.add_group(GroupId(1), "a", Split::No, GroupIcon::Application).unwrap();
        let box_id = pb.group_boxes(GroupId(1))[0].id;
        let start = pb.group_boxes(GroupId(1))[0].pos;

        pb.handle_message(CanvasMessage::BoxPressed { box_id });
        pb.handle_message(CanvasMessage::BoxesDragged { delta: Vector::new(30.0, 40.0) });
        let notes = pb.handle_message(CanvasMessage::BoxDragEnded);

        assert_eq!(
            notes,
            vec![Notification::GroupMoved {
                group_id: GroupId(1),
                side: BoxSide::Both,
                position: Position { x: start.x + 30.0, y: start.y + 40.0 },
            }]
        );
        // The canvas layout memory picked it up too.
        let saved = pb.saved_layout().position("a", BoxSide::Both).unwrap();
        assert_eq!(saved, Position { x: start.x + 30.0, y: start.y + 40.0 });
    }
}
