use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Realtime event names pushed to clients. The socket layer itself lives in
/// another service; this process only publishes onto the channel.
pub mod events {
    pub const TRIP_CREATED: &str = "trip.created";
    pub const TRIP_BID_RECEIVED: &str = "trip.bid.received";
    pub const TRIP_MATCHED: &str = "trip.matched";
    pub const TRIP_DRIVER_EN_ROUTE: &str = "trip.driver.en_route";
    pub const TRIP_ARRIVED: &str = "trip.arrived";
    pub const TRIP_OTP_GENERATED: &str = "trip.otp.generated";
    pub const TRIP_STARTED: &str = "trip.started";
    pub const TRIP_LOCATION_UPDATE: &str = "trip.location.update";
    pub const TRIP_COMPLETED: &str = "trip.completed";
    pub const TRIP_CANCELLED: &str = "trip.cancelled";
    pub const SAFETY_ALERT: &str = "safety.alert";
    pub const USER_LEVEL_UPDATED: &str = "user.level.updated";
    pub const USER_BADGE_UPDATED: &str = "user.badge.updated";
    pub const DRIVER_RESTRICTION_UPDATED: &str = "driver.restriction.updated";
    pub const PASSENGER_RESTRICTION_UPDATED: &str = "passenger.restriction.updated";
    pub const PEAK_GATE_DENIED: &str = "peak.gate.denied";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Audience {
    /// Everyone subscribed to a trip room (passenger, matched driver, ops).
    Trip(Uuid),
    User(Uuid),
    Driver(Uuid),
    Ops,
}

#[derive(Clone, Debug, Serialize)]
pub struct GatewayMessage {
    pub event: String,
    pub audience: Audience,
    pub payload: serde_json::Value,
}

/// Outbound boundary to the realtime layer. Publishing must never fail a
/// dispatch operation, so the trait is infallible and implementations swallow
/// their own delivery problems.
pub trait Gateway: Send + Sync {
    fn emit(&self, message: GatewayMessage);

    fn emit_trip(&self, trip_id: Uuid, event: &str, payload: serde_json::Value) {
        self.emit(GatewayMessage {
            event: event.to_string(),
            audience: Audience::Trip(trip_id),
            payload,
        });
    }

    fn emit_user(&self, user_id: Uuid, event: &str, payload: serde_json::Value) {
        self.emit(GatewayMessage {
            event: event.to_string(),
            audience: Audience::User(user_id),
            payload,
        });
    }

    fn emit_driver(&self, driver_id: Uuid, event: &str, payload: serde_json::Value) {
        self.emit(GatewayMessage {
            event: event.to_string(),
            audience: Audience::Driver(driver_id),
            payload,
        });
    }

    fn emit_ops(&self, event: &str, payload: serde_json::Value) {
        self.emit(GatewayMessage {
            event: event.to_string(),
            audience: Audience::Ops,
            payload,
        });
    }
}

/// Fans messages out over a tokio broadcast channel; the websocket bridge
/// subscribes on its side. Lagging or absent subscribers are fine.
pub struct BroadcastGateway {
    tx: broadcast::Sender<GatewayMessage>,
}

impl BroadcastGateway {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayMessage> {
        self.tx.subscribe()
    }
}

impl Gateway for BroadcastGateway {
    fn emit(&self, message: GatewayMessage) {
        // send only errors when there are no subscribers
        let _ = self.tx.send(message);
    }
}

/// Drops everything; used in tests.
pub struct NullGateway;

impl Gateway for NullGateway {
    fn emit(&self, _message: GatewayMessage) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_subscribers() {
        let gateway = BroadcastGateway::new(16);
        let mut rx = gateway.subscribe();

        let trip_id = Uuid::new_v4();
        gateway.emit_trip(trip_id, events::TRIP_MATCHED, serde_json::json!({"ok": true}));

        let message = rx.try_recv().unwrap();
        assert_eq!(message.event, events::TRIP_MATCHED);
        assert_eq!(message.audience, Audience::Trip(trip_id));
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let gateway = BroadcastGateway::new(16);
        gateway.emit_ops(events::SAFETY_ALERT, serde_json::json!({}));
    }
}
