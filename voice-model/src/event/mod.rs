mod from;
#[cfg(test)]
mod tests;

use serde::de::{Deserializer, Error as DeError, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::opcode::Opcode;
use crate::payload::*;

/// A message sent or received over the voice gateway's control connection.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// Used to begin a voice websocket connection.
    Identify(Identify),
    /// Used to select the voice protocol and encryption mechanism.
    SelectProtocol(SelectProtocol),
    /// Server's response to the client's Identify operation. Contains session-specific
    /// information, e.g. SSRC, and supported encryption modes.
    Ready(Ready),
    /// Periodic messages used to keep the websocket connection alive.
    Heartbeat(Heartbeat),
    /// Server's confirmation of a negotiated encryption scheme.
    SessionDescription(SessionDescription),
    /// A voice event denoting that someone is speaking.
    Speaking(Speaking),
    /// Acknowledgement from the server for a prior voice heartbeat.
    HeartbeatAck(HeartbeatAck),
    /// Used to determine how often the client must send a heartbeat.
    Hello(Hello),
    /// A message with an opcode these models do not cover. The body is discarded.
    Unknown(u8),
}

impl Event {
    /// The opcode of this event, or `None` for [`Event::Unknown`].
    pub fn kind(&self) -> Option<Opcode> {
        use Event::*;
        Some(match self {
            Identify(_) => Opcode::Identify,
            SelectProtocol(_) => Opcode::SelectProtocol,
            Ready(_) => Opcode::Ready,
            Heartbeat(_) => Opcode::Heartbeat,
            SessionDescription(_) => Opcode::SessionDescription,
            Speaking(_) => Opcode::Speaking,
            HeartbeatAck(_) => Opcode::HeartbeatAck,
            Hello(_) => Opcode::Hello,
            Unknown(_) => return None,
        })
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("Event", 2)?;

        use Event::*;
        match self {
            Unknown(op) => s.serialize_field("op", op)?,
            other => s.serialize_field("op", &other.kind())?,
        }

        match self {
            Identify(e) => s.serialize_field("d", e)?,
            SelectProtocol(e) => s.serialize_field("d", e)?,
            Ready(e) => s.serialize_field("d", e)?,
            Heartbeat(e) => s.serialize_field("d", e)?,
            SessionDescription(e) => s.serialize_field("d", e)?,
            Speaking(e) => s.serialize_field("d", e)?,
            HeartbeatAck(e) => s.serialize_field("d", e)?,
            Hello(e) => s.serialize_field("d", e)?,
            Unknown(_) => s.serialize_field("d", &None::<()>)?,
        }

        s.end()
    }
}

fn known_opcode(raw: u8) -> Option<Opcode> {
    Some(match raw {
        0 => Opcode::Identify,
        1 => Opcode::SelectProtocol,
        2 => Opcode::Ready,
        3 => Opcode::Heartbeat,
        4 => Opcode::SessionDescription,
        5 => Opcode::Speaking,
        6 => Opcode::HeartbeatAck,
        8 => Opcode::Hello,
        _ => return None,
    })
}

fn body_from_str(op: Option<Opcode>, raw: u8, d: &str) -> serde_json::Result<Event> {
    Ok(match op {
        Some(Opcode::Identify) => serde_json::from_str::<Identify>(d)?.into(),
        Some(Opcode::SelectProtocol) => serde_json::from_str::<SelectProtocol>(d)?.into(),
        Some(Opcode::Ready) => serde_json::from_str::<Ready>(d)?.into(),
        Some(Opcode::Heartbeat) => serde_json::from_str::<Heartbeat>(d)?.into(),
        Some(Opcode::SessionDescription) =>
            serde_json::from_str::<SessionDescription>(d)?.into(),
        Some(Opcode::Speaking) => serde_json::from_str::<Speaking>(d)?.into(),
        Some(Opcode::HeartbeatAck) => serde_json::from_str::<HeartbeatAck>(d)?.into(),
        Some(Opcode::Hello) => serde_json::from_str::<Hello>(d)?.into(),
        None => Event::Unknown(raw),
    })
}

struct EventVisitor;

impl<'de> Visitor<'de> for EventVisitor {
    type Value = Event;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a map with at least two keys ('d', 'op')")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut d: Option<&RawValue> = None;
        let mut op: Option<u8> = None;

        loop {
            match map.next_key::<&str>()? {
                Some("op") => op = Some(map.next_value::<u8>()?),
                // `op` usually comes first, in which case the body decodes in place.
                Some("d") => match op {
                    Some(raw) => {
                        let event = match known_opcode(raw) {
                            Some(Opcode::Identify) => map.next_value::<Identify>()?.into(),
                            Some(Opcode::SelectProtocol) =>
                                map.next_value::<SelectProtocol>()?.into(),
                            Some(Opcode::Ready) => map.next_value::<Ready>()?.into(),
                            Some(Opcode::Heartbeat) => map.next_value::<Heartbeat>()?.into(),
                            Some(Opcode::SessionDescription) =>
                                map.next_value::<SessionDescription>()?.into(),
                            Some(Opcode::Speaking) => map.next_value::<Speaking>()?.into(),
                            Some(Opcode::HeartbeatAck) =>
                                map.next_value::<HeartbeatAck>()?.into(),
                            Some(Opcode::Hello) => map.next_value::<Hello>()?.into(),
                            None => {
                                map.next_value::<IgnoredAny>()?;
                                Event::Unknown(raw)
                            },
                        };

                        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}

                        return Ok(event);
                    },
                    None => d = Some(map.next_value::<&RawValue>()?),
                },
                Some(_) => {
                    map.next_value::<IgnoredAny>()?;
                },
                None => break,
            }
        }

        let raw = op.ok_or_else(|| DeError::missing_field("op"))?;
        let d = d.ok_or_else(|| DeError::missing_field("d"))?;

        body_from_str(known_opcode(raw), raw, d.get()).map_err(DeError::custom)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(EventVisitor)
    }
}
