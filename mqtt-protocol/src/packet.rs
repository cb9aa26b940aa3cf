use crate::{
	packets::{
		ConnAck, Connect, PubAck, PubComp, PubRec, PubRel, Publish, SubAck, Subscribe,
		UnsubAck, Unsubscribe,
	},
	PacketId,
};
use core::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
	Connect(Box<Connect>),
	ConnAck(ConnAck),
	Publish(Box<Publish>),
	PubAck(PubAck),
	PubRec(PubRec),
	PubRel(PubRel),
	PubComp(PubComp),
	Subscribe(Box<Subscribe>),
	SubAck(Box<SubAck>),
	Unsubscribe(Box<Unsubscribe>),
	UnsubAck(UnsubAck),
	PingReq,
	PingResp,
	Disconnect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketType {
	Connect,
	ConnAck,
	Publish,
	PubAck,
	PubRec,
	PubRel,
	PubComp,
	Subscribe,
	SubAck,
	Unsubscribe,
	UnsubAck,
	PingReq,
	PingResp,
	Disconnect,
}

impl Packet {
	#[inline]
	pub fn packet_type(&self) -> PacketType {
		match self {
			Self::Connect(_) => PacketType::Connect,
			Self::ConnAck(_) => PacketType::ConnAck,
			Self::Publish(_) => PacketType::Publish,
			Self::PubAck(_) => PacketType::PubAck,
			Self::PubRec(_) => PacketType::PubRec,
			Self::PubRel(_) => PacketType::PubRel,
			Self::PubComp(_) => PacketType::PubComp,
			Self::Subscribe(_) => PacketType::Subscribe,
			Self::SubAck(_) => PacketType::SubAck,
			Self::Unsubscribe(_) => PacketType::Unsubscribe,
			Self::UnsubAck(_) => PacketType::UnsubAck,
			Self::PingReq => PacketType::PingReq,
			Self::PingResp => PacketType::PingResp,
			Self::Disconnect => PacketType::Disconnect,
		}
	}

	/// Returns the packet identifier, for packets that carry one.
	pub fn id(&self) -> Option<PacketId> {
		match self {
			Self::Publish(publish) => publish.id(),
			Self::PubAck(PubAck { id })
			| Self::PubRec(PubRec { id })
			| Self::PubRel(PubRel { id })
			| Self::PubComp(PubComp { id })
			| Self::UnsubAck(UnsubAck { id }) => Some(*id),
			Self::Subscribe(subscribe) => Some(subscribe.id),
			Self::SubAck(suback) => Some(suback.id),
			Self::Unsubscribe(unsubscribe) => Some(unsubscribe.id),
			Self::Connect(_) | Self::ConnAck(_) | Self::PingReq | Self::PingResp | Self::Disconnect => {
				None
			}
		}
	}
}

impl fmt::Display for PacketType {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl From<Connect> for Packet {
	#[inline]
	fn from(value: Connect) -> Self {
		Self::Connect(value.into())
	}
}

impl From<ConnAck> for Packet {
	#[inline]
	fn from(value: ConnAck) -> Self {
		Self::ConnAck(value)
	}
}

impl From<Publish> for Packet {
	#[inline]
	fn from(value: Publish) -> Self {
		Self::Publish(value.into())
	}
}

impl From<Subscribe> for Packet {
	#[inline]
	fn from(value: Subscribe) -> Self {
		Self::Subscribe(value.into())
	}
}

impl From<SubAck> for Packet {
	#[inline]
	fn from(value: SubAck) -> Self {
		Self::SubAck(value.into())
	}
}

impl From<Unsubscribe> for Packet {
	#[inline]
	fn from(value: Unsubscribe) -> Self {
		Self::Unsubscribe(value.into())
	}
}

#[cfg(test)]
mod tests {
	use super::{Packet, PacketType};
	use crate::{
		packets::{PingReq, PubRel, Unsubscribe},
		FilterBuf, PacketId,
	};

	#[test]
	fn reports_type_and_id() {
		let id = PacketId::new(42).unwrap();

		let packet: Packet = PubRel { id }.into();
		assert_eq!(packet.packet_type(), PacketType::PubRel);
		assert_eq!(packet.id(), Some(id));

		let packet: Packet = Unsubscribe {
			id,
			filters: vec![FilterBuf::new("a/#").unwrap()],
		}
		.into();
		assert_eq!(packet.packet_type(), PacketType::Unsubscribe);
		assert_eq!(packet.id(), Some(id));

		let packet: Packet = PingReq.into();
		assert_eq!(packet, Packet::PingReq);
		assert_eq!(packet.id(), None);
	}
}
