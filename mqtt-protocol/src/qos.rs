use core::fmt;

/// Quality of Service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum QoS {
	#[default]
	AtMostOnce = 0,
	AtLeastOnce,
	ExactlyOnce,
}

#[derive(Debug, thiserror::Error)]
#[error("quality of service must be 0, 1 or 2")]
pub struct InvalidQoS;

impl QoS {
	/// Returns `true` if delivery at this level is acknowledged by the
	/// receiver, and so needs a packet identifier.
	#[inline]
	pub const fn is_acknowledged(self) -> bool {
		!matches!(self, Self::AtMostOnce)
	}
}

impl TryFrom<u8> for QoS {
	type Error = InvalidQoS;
	#[inline]
	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Self::AtMostOnce),
			1 => Ok(Self::AtLeastOnce),
			2 => Ok(Self::ExactlyOnce),
			_ => Err(InvalidQoS),
		}
	}
}

impl From<QoS> for u8 {
	#[inline]
	fn from(value: QoS) -> Self {
		value as u8
	}
}

impl fmt::Display for QoS {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", *self as u8)
	}
}
