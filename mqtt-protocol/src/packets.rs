//! Control packet types.
use crate::{
	misc::{Credentials, Will},
	FilterBuf, Packet, PacketId, QoS, TopicBuf,
};
use bytes::Bytes;
use std::borrow::Cow;

/// The only valid value for [`protocol_name`] in [`Connect`] packets.
///
/// [`protocol_name`]: Connect::protocol_name
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level for MQTT 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscribeFailed;

//
// Packet Types
//

/// A `Connect` packet is sent by the Client to the Server to initialise a
/// session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connect {
	/// Protocol name. Should always be `"MQTT"`.
	pub protocol_name: Cow<'static, str>,

	/// Protocol version.
	pub protocol_level: u8,

	/// Client ID.
	pub client_id: String,

	/// Keep-alive timeout in seconds.
	pub keep_alive: u16,

	/// Request a clean session.
	pub clean_session: bool,

	/// Last will and testament for the Client.
	pub will: Option<Will>,

	/// Login credentials.
	pub credentials: Option<Credentials>,
}

/// A ConnAck packet is sent by the Server to the Client to acknowledge a
/// new session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnAck {
	/// Indicates that the Server has existing state from a previous session for
	/// the client.
	pub session_present: bool,

	/// Status code.
	pub code: ReturnCode,
}

/// Connection status carried by [`ConnAck`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ReturnCode {
	#[default]
	Accepted = 0,
	UnacceptableProtocolVersion,
	IdentifierRejected,
	ServerUnavailable,
	BadCredentials,
	NotAuthorized,
}

/// A Publish packet can be sent by either the Client or the Server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Publish {
	AtMostOnce {
		retain: bool,
		topic: TopicBuf,
		payload: Bytes,
	},
	AtLeastOnce {
		id: PacketId,
		retain: bool,
		duplicate: bool,
		topic: TopicBuf,
		payload: Bytes,
	},
	ExactlyOnce {
		id: PacketId,
		retain: bool,
		duplicate: bool,
		topic: TopicBuf,
		payload: Bytes,
	},
}

id_packet!(PubAck, Packet::PubAck);
id_packet!(PubRec, Packet::PubRec);
id_packet!(PubRel, Packet::PubRel);
id_packet!(PubComp, Packet::PubComp);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscribe {
	pub id: PacketId,
	pub filters: Vec<(FilterBuf, QoS)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubAck {
	pub id: PacketId,
	pub result: Vec<Result<QoS, SubscribeFailed>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unsubscribe {
	pub id: PacketId,
	pub filters: Vec<FilterBuf>,
}

id_packet!(UnsubAck, Packet::UnsubAck);
nul_packet!(PingReq, Packet::PingReq);
nul_packet!(PingResp, Packet::PingResp);
nul_packet!(Disconnect, Packet::Disconnect);

impl Default for Connect {
	fn default() -> Self {
		Self {
			protocol_name: Cow::Borrowed(PROTOCOL_NAME),
			protocol_level: PROTOCOL_LEVEL,
			client_id: String::new(),
			keep_alive: 0,
			clean_session: true,
			will: None,
			credentials: None,
		}
	}
}

impl ConnAck {
	#[inline]
	pub const fn accepted(session_present: bool) -> Self {
		Self {
			session_present,
			code: ReturnCode::Accepted,
		}
	}

	/// A refusal. The Server must not report a present session when refusing a
	/// connection.
	#[inline]
	pub const fn refused(code: ReturnCode) -> Self {
		Self {
			session_present: false,
			code,
		}
	}
}

impl Publish {
	/// Builds a Publish packet at `qos`. `id` is ignored for
	/// [`QoS::AtMostOnce`] and required otherwise.
	pub fn new(
		topic: TopicBuf,
		payload: Bytes,
		qos: QoS,
		retain: bool,
		id: Option<PacketId>,
		duplicate: bool,
	) -> Option<Self> {
		match (qos, id) {
			(QoS::AtMostOnce, _) => Some(Self::AtMostOnce {
				retain,
				topic,
				payload,
			}),
			(QoS::AtLeastOnce, Some(id)) => Some(Self::AtLeastOnce {
				id,
				retain,
				duplicate,
				topic,
				payload,
			}),
			(QoS::ExactlyOnce, Some(id)) => Some(Self::ExactlyOnce {
				id,
				retain,
				duplicate,
				topic,
				payload,
			}),
			_ => None,
		}
	}

	#[inline]
	pub fn topic(&self) -> &TopicBuf {
		match self {
			Self::AtMostOnce { topic, .. }
			| Self::AtLeastOnce { topic, .. }
			| Self::ExactlyOnce { topic, .. } => topic,
		}
	}

	#[inline]
	pub fn payload(&self) -> &Bytes {
		match self {
			Self::AtMostOnce { payload, .. }
			| Self::AtLeastOnce { payload, .. }
			| Self::ExactlyOnce { payload, .. } => payload,
		}
	}

	#[inline]
	pub fn retain(&self) -> bool {
		match self {
			Self::AtMostOnce { retain, .. }
			| Self::AtLeastOnce { retain, .. }
			| Self::ExactlyOnce { retain, .. } => *retain,
		}
	}

	#[inline]
	pub fn qos(&self) -> QoS {
		match self {
			Self::AtMostOnce { .. } => QoS::AtMostOnce,
			Self::AtLeastOnce { .. } => QoS::AtLeastOnce,
			Self::ExactlyOnce { .. } => QoS::ExactlyOnce,
		}
	}

	#[inline]
	pub fn id(&self) -> Option<PacketId> {
		match self {
			Self::AtMostOnce { .. } => None,
			Self::AtLeastOnce { id, .. } | Self::ExactlyOnce { id, .. } => Some(*id),
		}
	}

	#[inline]
	pub fn duplicate(&self) -> bool {
		match self {
			Self::AtMostOnce { .. } => false,
			Self::AtLeastOnce { duplicate, .. } | Self::ExactlyOnce { duplicate, .. } => {
				*duplicate
			}
		}
	}
}

impl SubAck {
	/// Returns the granted QoS levels, or `None` for refused filters.
	pub fn granted(&self) -> impl Iterator<Item = Option<QoS>> + '_ {
		self.result.iter().map(|result| result.ok())
	}
}

macro_rules! id_packet {
	($name:tt,$variant:expr) => {
		#[derive(Clone, Copy, Debug, PartialEq, Eq)]
		pub struct $name {
			pub id: PacketId,
		}

		impl From<$name> for Packet {
			#[inline]
			fn from(value: $name) -> Packet {
				$variant(value)
			}
		}
	};
}
use id_packet;

macro_rules! nul_packet {
	($name:tt,$variant:expr) => {
		#[derive(Clone, Copy, Debug, PartialEq, Eq)]
		pub struct $name;

		impl From<$name> for Packet {
			#[inline]
			fn from(_: $name) -> Packet {
				$variant
			}
		}
	};
}
use nul_packet;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn publish_requires_id_above_qos0() {
		let topic = TopicBuf::new("a/b").unwrap();
		let id = PacketId::new(7);

		let publish = Publish::new(topic.clone(), Bytes::new(), QoS::AtMostOnce, false, id, true);
		assert!(matches!(publish, Some(Publish::AtMostOnce { .. })));

		assert!(Publish::new(topic.clone(), Bytes::new(), QoS::AtLeastOnce, false, None, false).is_none());

		let publish = Publish::new(topic, Bytes::from_static(b"x"), QoS::ExactlyOnce, true, id, true).unwrap();
		assert_eq!(publish.qos(), QoS::ExactlyOnce);
		assert_eq!(publish.id(), id);
		assert!(publish.duplicate());
		assert!(publish.retain());
		assert_eq!(publish.payload().as_ref(), b"x");
	}

	#[test]
	fn refused_connack_never_reports_session() {
		let connack = ConnAck::refused(ReturnCode::IdentifierRejected);
		assert!(!connack.session_present);
		assert_eq!(connack.code as u8, 2);
	}
}
