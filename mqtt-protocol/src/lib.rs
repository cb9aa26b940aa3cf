//! # MQTT Protocol
//!
//! Typed MQTT 3.1.1 control packets, together with the topic and filter types
//! they carry. Packets are plain values: turning them into bytes and back is
//! left to the transport.
mod filter;
pub mod misc;
mod packet;
pub mod packets;
mod qos;
mod topic;

pub use self::{
	filter::{Filter, FilterBuf, InvalidFilter, Matches},
	packet::{Packet, PacketType},
	qos::{InvalidQoS, QoS},
	topic::{InvalidTopic, Topic, TopicBuf},
};

/// Identifier correlating the steps of a multi-packet exchange.
///
/// MQTT reserves 0, so the identifier is never zero.
pub type PacketId = core::num::NonZeroU16;
