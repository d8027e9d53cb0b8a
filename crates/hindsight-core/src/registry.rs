//! Event decoder registry.

use std::collections::HashMap;

use thiserror::Error;

use crate::snapshot::SNAPSHOT_EVENT_NAME;

/// Decoder from a stored payload to a concrete event.
pub type EventDecoder<E> = fn(&serde_json::Value) -> Result<E, serde_json::Error>;

/// Errors raised while populating a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A decoder is already registered for the discriminator.
    #[error("decoder already registered for event `{0}`")]
    Duplicate(String),

    /// The discriminator collides with the snapshot sentinel.
    #[error("event name `{0}` is reserved for snapshot rows")]
    Reserved(String),
}

/// Errors raised while decoding a stored event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No decoder registered for the discriminator.
    #[error("no decoder registered for event `{event_name}`")]
    Unregistered {
        /// The discriminator that failed to resolve.
        event_name: String,
    },

    /// The registered decoder rejected the payload.
    #[error("payload for event `{event_name}` failed to decode: {source}")]
    Payload {
        /// The discriminator whose payload was rejected.
        event_name: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

/// Maps event discriminators to payload decoders.
///
/// Populated at startup and validated at registration; an unknown
/// discriminator at read time fails the read rather than skipping the
/// record.
#[derive(Debug)]
pub struct EventRegistry<E> {
    decoders: HashMap<&'static str, EventDecoder<E>>,
}

impl<E> EventRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers a decoder for a discriminator.
    ///
    /// # Errors
    /// Rejects duplicate registrations and the reserved snapshot sentinel.
    pub fn register(
        &mut self,
        event_name: &'static str,
        decoder: EventDecoder<E>,
    ) -> Result<(), RegistryError> {
        if event_name == SNAPSHOT_EVENT_NAME {
            return Err(RegistryError::Reserved(event_name.to_string()));
        }
        if self.decoders.contains_key(event_name) {
            return Err(RegistryError::Duplicate(event_name.to_string()));
        }
        self.decoders.insert(event_name, decoder);
        Ok(())
    }

    /// Whether a decoder is registered for the discriminator.
    #[must_use]
    pub fn contains(&self, event_name: &str) -> bool {
        self.decoders.contains_key(event_name)
    }

    /// Registered discriminators, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decodes a stored payload by discriminator.
    ///
    /// # Errors
    /// [`DecodeError::Unregistered`] for an unknown discriminator;
    /// [`DecodeError::Payload`] when the registered decoder rejects the
    /// payload.
    pub fn decode(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<E, DecodeError> {
        let decoder =
            self.decoders
                .get(event_name)
                .ok_or_else(|| DecodeError::Unregistered {
                    event_name: event_name.to_string(),
                })?;
        decoder(payload).map_err(|source| DecodeError::Payload {
            event_name: event_name.to_string(),
            source,
        })
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        n: i64,
    }

    fn decode_ping(payload: &serde_json::Value) -> Result<Ping, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }

    #[test]
    fn test_registered_decoder_round_trips() {
        let mut registry = EventRegistry::new();
        registry.register("ping", decode_ping).unwrap();

        let decoded = registry.decode("ping", &serde_json::json!({"n": 7})).unwrap();

        assert_eq!(decoded, Ping { n: 7 });
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = EventRegistry::new();
        registry.register("ping", decode_ping).unwrap();

        let result = registry.register("ping", decode_ping);

        assert_eq!(result, Err(RegistryError::Duplicate("ping".to_string())));
    }

    #[test]
    fn test_snapshot_sentinel_is_reserved() {
        let mut registry: EventRegistry<Ping> = EventRegistry::new();

        let result = registry.register(SNAPSHOT_EVENT_NAME, decode_ping);

        assert_eq!(
            result,
            Err(RegistryError::Reserved(SNAPSHOT_EVENT_NAME.to_string()))
        );
    }

    #[test]
    fn test_unknown_discriminator_fails_decode() {
        let registry: EventRegistry<Ping> = EventRegistry::new();

        let result = registry.decode("missing", &serde_json::json!({}));

        assert!(matches!(
            result,
            Err(DecodeError::Unregistered { event_name }) if event_name == "missing"
        ));
    }

    #[test]
    fn test_bad_payload_reports_the_discriminator() {
        let mut registry = EventRegistry::new();
        registry.register("ping", decode_ping).unwrap();

        let result = registry.decode("ping", &serde_json::json!({"n": "not a number"}));

        assert!(matches!(
            result,
            Err(DecodeError::Payload { event_name, .. }) if event_name == "ping"
        ));
    }
}
