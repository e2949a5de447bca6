use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::jack_client::{self, JackEvent};
use crate::patchbay::{
    CanvasAction, ConnectionId, GroupIcon, GroupId, Patchbay, PortDirection, PortId, PortKind,
    Split,
};

/// Glue between the JACK event stream and the canvas mutation API.
///
/// The bridge is the single id authority: JACK speaks names, the canvas
/// speaks ids, and every group/port/connection id is allocated here and
/// mapped both ways.
pub struct SessionBridge {
    group_ids: HashMap<String, GroupId>,
    port_ids: HashMap<String, PortId>,
    connection_ids: HashMap<(PortId, PortId), ConnectionId>,
    next_group: u32,
    next_port: u32,
    next_connection: u32,
    hardware: Regex,
    rooms: Regex,
    pub sample_rate: usize,
    pub buffer_size: u32,
    pub xruns: u32,
}

impl Default for SessionBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBridge {
    pub fn new() -> Self {
        Self {
            group_ids: HashMap::new(),
            port_ids: HashMap::new(),
            connection_ids: HashMap::new(),
            next_group: 1,
            next_port: 1,
            next_connection: 1,
            hardware: Regex::new(r"^(system|alsa_pcm|firewire_pcm|a2j|alsa_midi)")
                .expect("hardware client pattern"),
            rooms: Regex::new(r"^room(-|\.)").expect("room client pattern"),
            sample_rate: 0,
            buffer_size: 0,
            xruns: 0,
        }
    }

    pub fn handle_event(&mut self, canvas: &mut Patchbay, event: JackEvent) {
        match event {
            JackEvent::Started { sample_rate, buffer_size } => {
                self.sample_rate = sample_rate;
                self.buffer_size = buffer_size;
                info!(sample_rate, buffer_size, "JACK session up");
            }
            JackEvent::ClientRegistered { name } => {
                self.group_for(canvas, &name, false);
            }
            JackEvent::ClientUnregistered { name } => {
                if let Some(group_id) = self.group_ids.remove(&name) {
                    if let Err(e) = canvas.remove_group(group_id) {
                        warn!("remove_group {name}: {e}");
                    }
                }
            }
            JackEvent::PortRegistered { name, is_input, is_physical, type_name } => {
                if self.port_ids.contains_key(&name) {
                    debug!(%name, "port already mirrored");
                    return;
                }
                let Some((client, port)) = name.split_once(':') else {
                    warn!(%name, "port without a client prefix");
                    return;
                };
                let client = client.to_string();
                let group_id = self.group_for(canvas, &client, is_physical);
                let port_id = PortId(self.next_port);
                self.next_port += 1;
                self.port_ids.insert(name.clone(), port_id);

                let direction =
                    if is_input { PortDirection::Input } else { PortDirection::Output };
                let kind = classify_kind(&client, &type_name);
                if let Err(e) = canvas.add_port(group_id, port_id, port, direction, kind) {
                    warn!("add_port {name}: {e}");
                    self.port_ids.remove(&name);
                }
            }
            JackEvent::PortUnregistered { name } => {
                let Some(port_id) = self.port_ids.remove(&name) else {
                    debug!(%name, "unregistration for an untracked port");
                    return;
                };
                self.connection_ids.retain(|(out, inp), _| *out != port_id && *inp != port_id);
                if let Err(e) = canvas.remove_port(port_id) {
                    warn!("remove_port {name}: {e}");
                }
            }
            JackEvent::PortRenamed { old_name, new_name } => {
                let Some(port_id) = self.port_ids.remove(&old_name) else {
                    debug!(%old_name, "rename for an untracked port");
                    return;
                };
                self.port_ids.insert(new_name.clone(), port_id);
                let short = new_name.split_once(':').map(|(_, p)| p).unwrap_or(&new_name);
                if let Err(e) = canvas.rename_port(port_id, short) {
                    warn!("rename_port {new_name}: {e}");
                }
            }
            JackEvent::PortsConnected { out_name, in_name } => {
                let (Some(&out), Some(&inp)) =
                    (self.port_ids.get(&out_name), self.port_ids.get(&in_name))
                else {
                    warn!(%out_name, %in_name, "connection between untracked ports");
                    return;
                };
                if self.connection_ids.contains_key(&(out, inp)) {
                    debug!(%out_name, %in_name, "wire already mirrored");
                    return;
                }
                let connection_id = ConnectionId(self.next_connection);
                self.next_connection += 1;
                self.connection_ids.insert((out, inp), connection_id);
                if let Err(e) = canvas.connect_ports(connection_id, out, inp) {
                    warn!("connect {out_name} -> {in_name}: {e}");
                    self.connection_ids.remove(&(out, inp));
                }
            }
            JackEvent::PortsDisconnected { out_name, in_name } => {
                let (Some(&out), Some(&inp)) =
                    (self.port_ids.get(&out_name), self.port_ids.get(&in_name))
                else {
                    debug!(%out_name, %in_name, "disconnection between untracked ports");
                    return;
                };
                let Some(connection_id) = self.connection_ids.remove(&(out, inp)) else {
                    debug!(%out_name, %in_name, "disconnection for an untracked wire");
                    return;
                };
                if let Err(e) = canvas.disconnect_ports(connection_id) {
                    warn!("disconnect {out_name} -> {in_name}: {e}");
                }
            }
            JackEvent::Xrun => {
                self.xruns += 1;
                debug!(total = self.xruns, "xrun");
            }
        }
    }

    /// Relay a canvas request to the session. Connect/disconnect go out to
    /// the JACK thread; split/join are canvas-local and applied directly.
    pub fn apply_action(&mut self, canvas: &mut Patchbay, action: CanvasAction) {
        match action {
            CanvasAction::PortsConnect { port_out, port_in } => {
                let (Some(out), Some(inp)) =
                    (canvas.port_qualified_name(port_out), canvas.port_qualified_name(port_in))
                else {
                    warn!(?port_out, ?port_in, "connect request for unknown ports");
                    return;
                };
                jack_client::request_connect(&out, &inp);
            }
            CanvasAction::PortsDisconnect { connection_id } => {
                let Some(conn) = canvas.connection(connection_id).copied() else {
                    warn!(?connection_id, "disconnect request for an unknown wire");
                    return;
                };
                let (Some(out), Some(inp)) = (
                    canvas.port_qualified_name(conn.port_out),
                    canvas.port_qualified_name(conn.port_in),
                ) else {
                    return;
                };
                jack_client::request_disconnect(&out, &inp);
            }
            CanvasAction::GroupSplit { group_id } => {
                if let Err(e) = canvas.split_group(group_id) {
                    warn!(?group_id, "split: {e}");
                }
            }
            CanvasAction::GroupJoin { group_id } => {
                if let Err(e) = canvas.join_group(group_id) {
                    warn!(?group_id, "join: {e}");
                }
            }
            CanvasAction::GroupInfo { group_id } => {
                let name = canvas.group_name(group_id).unwrap_or("?").to_string();
                info!(
                    group = %name,
                    ports = canvas.group_port_count(group_id),
                    sample_rate = self.sample_rate,
                    buffer_size = self.buffer_size,
                    xruns = self.xruns,
                    "group info"
                );
            }
            CanvasAction::GroupRename { group_id, name } => {
                // JACK has no client rename; the host would prompt and apply
                // an alias through rename_group.
                info!(?group_id, %name, "group rename requested");
            }
            CanvasAction::PortInfo { port_id } => {
                let name = canvas.port_qualified_name(port_id).unwrap_or_default();
                info!(port = %name, "port info");
            }
            CanvasAction::PortRename { port_id, name } => {
                info!(?port_id, %name, "port rename requested");
            }
        }
    }

    fn group_for(&mut self, canvas: &mut Patchbay, client: &str, physical: bool) -> GroupId {
        if let Some(&id) = self.group_ids.get(client) {
            return id;
        }
        let id = GroupId(self.next_group);
        self.next_group += 1;
        self.group_ids.insert(client.to_string(), id);

        let icon = self.classify_icon(client, physical);
        if let Err(e) = canvas.add_group(id, client, Split::Undefined, icon) {
            warn!("add_group {client}: {e}");
        }
        id
    }

    fn classify_icon(&self, client: &str, physical: bool) -> GroupIcon {
        if self.rooms.is_match(client) {
            GroupIcon::LadishRoom
        } else if physical || self.hardware.is_match(client) {
            GroupIcon::Hardware
        } else {
            GroupIcon::Application
        }
    }
}

fn classify_kind(client: &str, type_name: &str) -> PortKind {
    if type_name.contains("midi") {
        if client.starts_with("a2j") {
            PortKind::MidiA2j
        } else if client.starts_with("alsa_midi") {
            PortKind::MidiAlsa
        } else {
            PortKind::Midi
        }
    } else {
        PortKind::Audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patchbay::CanvasFeatures;

    const AUDIO: &str = "32 bit float mono audio";
    const MIDI: &str = "8 bit raw midi";

    fn rig() -> (Patchbay, SessionBridge) {
        let mut canvas = Patchbay::new();
        canvas.set_features(CanvasFeatures {
            group_split: true,
            position_persistence: true,
            ..Default::default()
        });
        canvas.init(Box::new(|_| {}), false).unwrap();
        (canvas, SessionBridge::new())
    }

    fn port(bridge: &mut SessionBridge, canvas: &mut Patchbay, name: &str, input: bool, ty: &str) {
        bridge.handle_event(
            canvas,
            JackEvent::PortRegistered {
                name: name.to_string(),
                is_input: input,
                is_physical: name.starts_with("system"),
                type_name: ty.to_string(),
            },
        );
    }

    #[test]
    fn port_registration_creates_the_group_on_demand() {
        let (mut canvas, mut bridge) = rig();
        port(&mut bridge, &mut canvas, "system:capture_1", false, AUDIO);

        assert_eq!(canvas.group_count(), 1);
        assert_eq!(canvas.group_name(GroupId(1)), Some("system"));
        assert_eq!(canvas.group(GroupId(1)).unwrap().icon, GroupIcon::Hardware);
        assert_eq!(canvas.group_port_count(GroupId(1)), 1);
        assert_eq!(
            canvas.port_qualified_name(PortId(1)).as_deref(),
            Some("system:capture_1")
        );
    }

    #[test]
    fn a_second_port_reuses_the_group() {
        let (mut canvas, mut bridge) = rig();
        port(&mut bridge, &mut canvas, "Firefox:output_FL", false, AUDIO);
        port(&mut bridge, &mut canvas, "Firefox:output_FR", false, AUDIO);

        assert_eq!(canvas.group_count(), 1);
        assert_eq!(canvas.group_port_count(GroupId(1)), 2);
        assert_eq!(canvas.group(GroupId(1)).unwrap().icon, GroupIcon::Application);
    }

    #[test]
    fn connection_events_mirror_wires() {
        let (mut canvas, mut bridge) = rig();
        port(&mut bridge, &mut canvas, "Firefox:output_FL", false, AUDIO);
        port(&mut bridge, &mut canvas, "system:playback_1", true, AUDIO);

        bridge.handle_event(
            &mut canvas,
            JackEvent::PortsConnected {
                out_name: "Firefox:output_FL".to_string(),
                in_name: "system:playback_1".to_string(),
            },
        );
        assert_eq!(canvas.connection_count(), 1);

        // The same wire reported twice is mirrored once.
        bridge.handle_event(
            &mut canvas,
            JackEvent::PortsConnected {
                out_name: "Firefox:output_FL".to_string(),
                in_name: "system:playback_1".to_string(),
            },
        );
        assert_eq!(canvas.connection_count(), 1);

        bridge.handle_event(
            &mut canvas,
            JackEvent::PortsDisconnected {
                out_name: "Firefox:output_FL".to_string(),
                in_name: "system:playback_1".to_string(),
            },
        );
        assert_eq!(canvas.connection_count(), 0);
    }

    #[test]
    fn client_teardown_rides_the_postponed_removal() {
        let (mut canvas, mut bridge) = rig();
        port(&mut bridge, &mut canvas, "Firefox:output_FL", false, AUDIO);

        // The client goes first, its port a little later: the classic race.
        bridge.handle_event(
            &mut canvas,
            JackEvent::ClientUnregistered { name: "Firefox".to_string() },
        );
        assert_eq!(canvas.group_count(), 1);

        bridge.handle_event(
            &mut canvas,
            JackEvent::PortUnregistered { name: "Firefox:output_FL".to_string() },
        );
        canvas.tick(std::time::Instant::now());
        assert_eq!(canvas.group_count(), 0);
        assert_eq!(canvas.port_count(), 0);
    }

    #[test]
    fn rename_keeps_the_id_and_updates_the_label() {
        let (mut canvas, mut bridge) = rig();
        port(&mut bridge, &mut canvas, "app:out", false, AUDIO);
        bridge.handle_event(
            &mut canvas,
            JackEvent::PortRenamed {
                old_name: "app:out".to_string(),
                new_name: "app:main_out".to_string(),
            },
        );
        assert_eq!(canvas.port_qualified_name(PortId(1)).as_deref(), Some("app:main_out"));
    }

    #[test]
    fn midi_flavors_are_classified_by_client() {
        assert_eq!(classify_kind("a2j", MIDI), PortKind::MidiA2j);
        assert_eq!(classify_kind("alsa_midi", MIDI), PortKind::MidiAlsa);
        assert_eq!(classify_kind("fluidsynth", MIDI), PortKind::Midi);
        assert_eq!(classify_kind("system", AUDIO), PortKind::Audio);
    }

    #[test]
    fn room_clients_get_the_room_icon() {
        let (mut canvas, mut bridge) = rig();
        bridge.handle_event(
            &mut canvas,
            JackEvent::ClientRegistered { name: "room-studio".to_string() },
        );
        assert_eq!(canvas.group(GroupId(1)).unwrap().icon, GroupIcon::LadishRoom);
    }

    #[test]
    fn split_request_is_applied_canvas_side() {
        let (mut canvas, mut bridge) = rig();
        port(&mut bridge, &mut canvas, "system:capture_1", false, AUDIO);
        assert!(!canvas.group(GroupId(1)).unwrap().split);

        bridge.apply_action(&mut canvas, CanvasAction::GroupSplit { group_id: GroupId(1) });
        assert!(canvas.group(GroupId(1)).unwrap().split);
        assert_eq!(canvas.group_port_count(GroupId(1)), 1);

        bridge.apply_action(&mut canvas, CanvasAction::GroupJoin { group_id: GroupId(1) });
        assert!(!canvas.group(GroupId(1)).unwrap().split);
    }
}
