use iced::futures::channel::mpsc;
use iced::futures::{SinkExt, StreamExt};
use iced::Subscription;
use jack::{Client, ClientOptions, Control, NotificationHandler, PortFlags, ProcessHandler};
use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use tracing::{debug, error, warn};

/// Everything the canvas host needs to know about the JACK graph, delivered
/// on the UI thread through the iced subscription.
///
/// Ports are identified by their qualified `client:port` name: it is the one
/// identity JACK guarantees unique and queryable from every notification.
/// The session bridge allocates the canvas-side ids.
#[derive(Debug, Clone)]
pub enum JackEvent {
    Started {
        sample_rate: usize,
        buffer_size: u32,
    },
    ClientRegistered {
        name: String,
    },
    ClientUnregistered {
        name: String,
    },
    PortRegistered {
        name: String,
        is_input: bool,
        is_physical: bool,
        type_name: String,
    },
    PortUnregistered {
        name: String,
    },
    PortRenamed {
        old_name: String,
        new_name: String,
    },
    PortsConnected {
        out_name: String,
        in_name: String,
    },
    PortsDisconnected {
        out_name: String,
        in_name: String,
    },
    Xrun,
}

enum JackCommand {
    Connect { out: String, inp: String },
    Disconnect { out: String, inp: String },
}

static COMMANDS: OnceLock<std_mpsc::Sender<JackCommand>> = OnceLock::new();

/// Ask the JACK thread to connect two ports by qualified name.
pub fn request_connect(out: &str, inp: &str) {
    if let Some(tx) = COMMANDS.get() {
        let _ = tx.send(JackCommand::Connect { out: out.to_string(), inp: inp.to_string() });
    } else {
        warn!("connect request dropped: no JACK connection");
    }
}

/// Ask the JACK thread to disconnect two ports by qualified name.
pub fn request_disconnect(out: &str, inp: &str) {
    if let Some(tx) = COMMANDS.get() {
        let _ = tx.send(JackCommand::Disconnect { out: out.to_string(), inp: inp.to_string() });
    } else {
        warn!("disconnect request dropped: no JACK connection");
    }
}

pub fn connect() -> Subscription<JackEvent> {
    Subscription::run(|| {
        iced::stream::channel(100, |mut output: mpsc::Sender<JackEvent>| async move {
            let (tx, mut rx) = mpsc::channel::<JackEvent>(100);

            std::thread::spawn(move || {
                if let Err(e) = run_jack_loop(tx) {
                    error!("JACK session ended: {e}");
                }
            });

            while let Some(event) = rx.next().await {
                let _ = output.send(event).await;
            }
        })
    })
}

struct NoProcess;

impl ProcessHandler for NoProcess {
    fn process(&mut self, _: &Client, _: &jack::ProcessScope) -> Control {
        Control::Continue
    }
}

#[derive(Debug, Clone)]
struct PortMeta {
    name: String,
    is_input: bool,
}

/// Forwards JACK's notification callbacks into the event channel.
///
/// JACK reports ports by registration id; the id-to-name map is learned from
/// the registration and connection callbacks, since a removed port can no
/// longer be looked up by the time its unregistration arrives.
struct Notifications {
    tx: mpsc::Sender<JackEvent>,
    ports: HashMap<jack::PortId, PortMeta>,
}

impl Notifications {
    fn send(&mut self, event: JackEvent) {
        let _ = self.tx.try_send(event);
    }

    fn resolve(&mut self, client: &Client, port_id: jack::PortId) -> Option<PortMeta> {
        if let Some(meta) = self.ports.get(&port_id) {
            return Some(meta.clone());
        }
        let port = client.port_by_id(port_id)?;
        let name = port.name().ok()?;
        let meta = PortMeta { name, is_input: port.flags().contains(PortFlags::IS_INPUT) };
        self.ports.insert(port_id, meta.clone());
        Some(meta)
    }
}

impl NotificationHandler for Notifications {
    fn client_registration(&mut self, _: &Client, name: &str, is_registered: bool) {
        let name = name.to_string();
        if is_registered {
            self.send(JackEvent::ClientRegistered { name });
        } else {
            self.send(JackEvent::ClientUnregistered { name });
        }
    }

    fn port_registration(&mut self, client: &Client, port_id: jack::PortId, is_registered: bool) {
        if is_registered {
            let Some(port) = client.port_by_id(port_id) else {
                debug!(port_id, "registered port vanished before lookup");
                return;
            };
            let Ok(name) = port.name() else {
                return;
            };
            let flags = port.flags();
            let is_input = flags.contains(PortFlags::IS_INPUT);
            self.ports.insert(port_id, PortMeta { name: name.clone(), is_input });
            self.send(JackEvent::PortRegistered {
                name,
                is_input,
                is_physical: flags.contains(PortFlags::IS_PHYSICAL),
                type_name: port.port_type().unwrap_or_default(),
            });
        } else if let Some(meta) = self.ports.remove(&port_id) {
            self.send(JackEvent::PortUnregistered { name: meta.name });
        } else {
            debug!(port_id, "unregistration for a port this session never resolved");
        }
    }

    fn port_rename(
        &mut self,
        _: &Client,
        port_id: jack::PortId,
        old_name: &str,
        new_name: &str,
    ) -> Control {
        if let Some(meta) = self.ports.get_mut(&port_id) {
            meta.name = new_name.to_string();
        }
        self.send(JackEvent::PortRenamed {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Control::Continue
    }

    fn ports_connected(
        &mut self,
        client: &Client,
        port_id_a: jack::PortId,
        port_id_b: jack::PortId,
        are_connected: bool,
    ) {
        let (Some(a), Some(b)) = (self.resolve(client, port_id_a), self.resolve(client, port_id_b))
        else {
            warn!(port_id_a, port_id_b, "connection notification with unresolvable ports");
            return;
        };
        // JACK hands the pair in no guaranteed order.
        let (out, inp) = if a.is_input { (b, a) } else { (a, b) };
        if are_connected {
            self.send(JackEvent::PortsConnected { out_name: out.name, in_name: inp.name });
        } else {
            self.send(JackEvent::PortsDisconnected { out_name: out.name, in_name: inp.name });
        }
    }

    fn xrun(&mut self, _: &Client) -> Control {
        self.send(JackEvent::Xrun);
        Control::Continue
    }
}

fn run_jack_loop(mut tx: mpsc::Sender<JackEvent>) -> Result<(), jack::Error> {
    let (client, _status) = Client::new("jackfield", ClientOptions::NO_START_SERVER)?;

    let _ = tx.try_send(JackEvent::Started {
        sample_rate: client.sample_rate() as usize,
        buffer_size: client.buffer_size(),
    });

    // Replay the graph as it stands; notifications take over afterwards.
    let port_names = client.ports(None, None, PortFlags::empty());
    for name in &port_names {
        let Some(port) = client.port_by_name(name) else {
            continue;
        };
        let flags = port.flags();
        let _ = tx.try_send(JackEvent::PortRegistered {
            name: name.clone(),
            is_input: flags.contains(PortFlags::IS_INPUT),
            is_physical: flags.contains(PortFlags::IS_PHYSICAL),
            type_name: port.port_type().unwrap_or_default(),
        });
    }
    for out_name in &port_names {
        let Some(out_port) = client.port_by_name(out_name) else {
            continue;
        };
        if !out_port.flags().contains(PortFlags::IS_OUTPUT) {
            continue;
        }
        for in_name in &port_names {
            if out_name != in_name && out_port.is_connected_to(in_name).unwrap_or(false) {
                let _ = tx.try_send(JackEvent::PortsConnected {
                    out_name: out_name.clone(),
                    in_name: in_name.clone(),
                });
            }
        }
    }

    let notifications = Notifications { tx, ports: HashMap::new() };
    let active = client.activate_async(notifications, NoProcess)?;

    let (cmd_tx, cmd_rx) = std_mpsc::channel();
    let _ = COMMANDS.set(cmd_tx);

    for command in cmd_rx.iter() {
        match command {
            JackCommand::Connect { out, inp } => {
                if let Err(e) = active.as_client().connect_ports_by_name(&out, &inp) {
                    warn!("connect {out} -> {inp} failed: {e}");
                }
            }
            JackCommand::Disconnect { out, inp } => {
                if let Err(e) = active.as_client().disconnect_ports_by_name(&out, &inp) {
                    warn!("disconnect {out} -> {inp} failed: {e}");
                }
            }
        }
    }

    let _ = active.deactivate();
    Ok(())
}
