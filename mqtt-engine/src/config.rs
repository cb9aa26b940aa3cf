use mqtt_protocol::QoS;

/// Engine configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfiguration {
	/// Highest QoS granted to a subscription, whatever the Client requests.
	///
	/// Defaults to [`QoS::ExactlyOnce`].
	pub maximum_qos: QoS,

	/// Number of messages queued for a disconnected persistent session before
	/// the oldest are dropped.
	///
	/// Defaults to 1000.
	pub max_pending_messages: usize,

	/// Capacity of the outbound packet channel created for each connection.
	///
	/// Defaults to 64.
	pub delivery_buffer: usize,
}

impl Default for EngineConfiguration {
	fn default() -> Self {
		Self {
			maximum_qos: QoS::ExactlyOnce,
			max_pending_messages: 1000,
			delivery_buffer: 64,
		}
	}
}
