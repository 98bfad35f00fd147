use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::process;

use log::{debug, error, info};
use serde_json::json;
use structopt::StructOpt;

use ancs_bridge::common::apis::default_app_display_name;
use ancs_bridge::observer::ancs::builders::{
    AttributeRequest, GetNotificationAttributes, PerformNotificationAction,
};
use ancs_bridge::observer::ancs::constants::{NotificationAttributeID, ANCS_SERVICE};
use ancs_bridge::observer::ancs::parsers::Notification;
use ancs_bridge::{
    AncsError, Characteristic, DeviceCommand, DeviceInput, MobileDevice, ObserverConfig,
    ObserverEvent, PeerId, Result, ShowNotificationData, TransportEvent, Uid,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "ancs-bridge-ctl", about = "Inspect and replay ANCS traffic")]
struct Opt {
    #[structopt(subcommand)]
    subcommand: SubCommand,
}

#[derive(StructOpt, Debug)]
enum SubCommand {
    /// Decode an 8-byte Notification Source event given as hex.
    DecodeSource { hex: String },
    /// Print the Get Notification Attributes command for a uid.
    EncodeFetch {
        uid: Uid,
        #[structopt(long, default_value = "65535")]
        max_title: u16,
        #[structopt(long, default_value = "65535")]
        max_message: u16,
        #[structopt(long, help = "Also ask for the positive action label")]
        positive_label: bool,
        #[structopt(long, help = "Also ask for the negative action label")]
        negative_label: bool,
    },
    /// Print the Perform Notification Action command for a uid.
    EncodeAction {
        uid: Uid,
        #[structopt(long)]
        negative: bool,
    },
    /// Feed a capture through a simulated session and print what a
    /// desktop would be shown. Lines are `ns <hex>`, `ds <hex>` or
    /// `<characteristic uuid> <hex>`.
    Replay {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(long, parse(from_os_str), help = "JSON observer configuration")]
        config: Option<PathBuf>,
        #[structopt(long, default_value = "iPhone")]
        device_name: String,
        #[structopt(long, help = "Do not fetch attributes of pre-existing notifications")]
        skip_preexisting: bool,
        #[structopt(long, help = "Do not ask for action labels")]
        no_action_labels: bool,
    },
}

fn main() {
    let opt = Opt::from_args();
    env_logger::init();

    let result = match opt.subcommand {
        SubCommand::DecodeSource { hex } => decode_source(&hex),
        SubCommand::EncodeFetch {
            uid,
            max_title,
            max_message,
            positive_label,
            negative_label,
        } => {
            encode_fetch(uid, max_title, max_message, positive_label, negative_label);
            Ok(())
        }
        SubCommand::EncodeAction { uid, negative } => {
            encode_action(uid, !negative);
            Ok(())
        }
        SubCommand::Replay {
            file,
            config,
            device_name,
            skip_preexisting,
            no_action_labels,
        } => load_config(config).and_then(|mut config| {
            if skip_preexisting {
                config.fetch_preexisting = false;
            }
            if no_action_labels {
                config.request_action_labels = false;
            }
            replay(file, &config, device_name)
        }),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn decode_hex(data: &str) -> Result<Vec<u8>> {
    let data: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&data).map_err(|e| AncsError::MalformedMessage(format!("{}: {}", data, e)))
}

fn decode_source(data: &str) -> Result<()> {
    let notification = Notification::parse(&decode_hex(data)?)?;
    println!(
        "{}",
        json!({
            "uid": notification.uid.to_string(),
            "event": format!("{:?}", notification.event_id),
            "flags": format!("{:?}", notification.event_flags),
            "category": notification.category.name(),
            "category_count": notification.category_count,
        })
    );
    Ok(())
}

fn encode_fetch(uid: Uid, max_title: u16, max_message: u16, positive: bool, negative: bool) {
    let mut request = GetNotificationAttributes::with_limits(uid, max_title, max_message);
    if positive {
        request.attributes.push(AttributeRequest::new(
            NotificationAttributeID::PositiveActionLabel,
        ));
    }
    if negative {
        request.attributes.push(AttributeRequest::new(
            NotificationAttributeID::NegativeActionLabel,
        ));
    }
    println!("{}", hex::encode(request.to_vec()));
}

fn encode_action(uid: Uid, is_positive: bool) {
    let action = PerformNotificationAction { uid, is_positive };
    println!("{}", hex::encode(action.to_vec()));
}

fn load_config(path: Option<PathBuf>) -> Result<ObserverConfig> {
    match path {
        Some(path) => ObserverConfig::load(path),
        None => Ok(ObserverConfig::default()),
    }
}

fn replay(file: PathBuf, config: &ObserverConfig, device_name: String) -> Result<()> {
    let capture = fs::read_to_string(&file)
        .map_err(|e| AncsError::Config(format!("{}: {}", file.display(), e)))?;

    let mut session = ReplaySession {
        device: MobileDevice::new(config),
        device_name,
    };
    session.drive(DeviceInput::Connect(PeerId::from("replay")))?;

    for (number, line) in capture.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (kind, payload) = line.split_at(line.find(char::is_whitespace).unwrap_or(line.len()));
        let characteristic = match kind {
            "ns" => Characteristic::NotificationSource,
            "ds" => Characteristic::DataSource,
            uuid => Characteristic::from_uuid(uuid).ok_or_else(|| {
                AncsError::MalformedMessage(format!(
                    "line {}: unknown source {:?}",
                    number + 1,
                    uuid
                ))
            })?,
        };
        let value = decode_hex(payload)?;
        session.drive(DeviceInput::Transport(TransportEvent::CharacteristicChanged {
            characteristic,
            value,
        }))?;
    }
    info!(
        "Replay finished with {} notifications",
        session.device.registry().len()
    );
    Ok(())
}

/// Plays the peer's part of the session: every submitted operation is
/// acknowledged right away.
struct ReplaySession {
    device: MobileDevice,
    device_name: String,
}

impl ReplaySession {
    fn drive(&mut self, input: DeviceInput) -> Result<()> {
        let mut inputs = VecDeque::new();
        inputs.push_back(input);
        while let Some(input) = inputs.pop_front() {
            for command in self.device.handle(input) {
                let reply = match command {
                    DeviceCommand::Connect(_) => Some(TransportEvent::Connected),
                    DeviceCommand::DiscoverServices => Some(TransportEvent::ServicesDiscovered(
                        vec![ANCS_SERVICE.to_string()],
                    )),
                    DeviceCommand::EnableNotifications(characteristic) => {
                        Some(TransportEvent::WriteComplete {
                            characteristic,
                            status: Ok(()),
                        })
                    }
                    DeviceCommand::WriteControlPoint(value) => {
                        debug!("Control point <- {}", hex::encode(&value));
                        Some(TransportEvent::WriteComplete {
                            characteristic: Characteristic::ControlPoint,
                            status: Ok(()),
                        })
                    }
                    DeviceCommand::Emit(event) => {
                        self.show(event)?;
                        None
                    }
                    DeviceCommand::Close
                    | DeviceCommand::ArmReconnect(_)
                    | DeviceCommand::CancelReconnect => None,
                };
                if let Some(reply) = reply {
                    inputs.push_back(DeviceInput::Transport(reply));
                }
            }
        }
        Ok(())
    }

    fn show(&self, event: ObserverEvent) -> Result<()> {
        match event {
            ObserverEvent::RecordUpdated(record) => {
                let data = ShowNotificationData::from_record(
                    &self.device_name,
                    &record,
                    default_app_display_name,
                );
                println!("{}", data.json()?);
            }
            ObserverEvent::RecordRemoved(uid) => {
                println!("{}", json!({ "dismiss": uid.to_string() }));
            }
            ObserverEvent::Error(e) => return Err(e),
            other => info!("{:?}", other),
        }
        Ok(())
    }
}
