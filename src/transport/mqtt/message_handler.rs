//! Pure routing of rumqttc events to session-state changes

use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet};

/// What an event means for the session's connected flag
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// ConnAck accepted - session is live
    Established,
    /// ConnAck refused by the broker
    Refused(String),
    /// Broker or client ended the session
    Closed,
    /// Keep-alive, acks and other traffic with no state impact
    Traffic(String),
}

/// Route an MQTT event (pure routing decision)
pub fn route_mqtt_event(event: &Event) -> SessionEvent {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => match ack.code {
            ConnectReturnCode::Success => SessionEvent::Established,
            code => SessionEvent::Refused(format!("{code:?}")),
        },
        Event::Incoming(Packet::Disconnect) => SessionEvent::Closed,
        Event::Outgoing(Outgoing::Disconnect) => SessionEvent::Closed,
        Event::Incoming(other) => SessionEvent::Traffic(format!("{other:?}")),
        Event::Outgoing(other) => SessionEvent::Traffic(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::ConnAck;

    #[test]
    fn test_accepted_connack_establishes_session() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(route_mqtt_event(&event), SessionEvent::Established);
    }

    #[test]
    fn test_refused_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert!(matches!(route_mqtt_event(&event), SessionEvent::Refused(_)));
    }

    #[test]
    fn test_disconnects_close_session() {
        assert_eq!(
            route_mqtt_event(&Event::Incoming(Packet::Disconnect)),
            SessionEvent::Closed
        );
        assert_eq!(
            route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            SessionEvent::Closed
        );
    }

    #[test]
    fn test_ping_is_traffic() {
        assert!(matches!(
            route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            SessionEvent::Traffic(_)
        ));
    }
}
