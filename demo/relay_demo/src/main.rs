mod config;
use config::{kinds, types, DemoConfig};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_core::{telemetry, Bus, Message, MessageHandler, Node, NodeId, NoopHandler};
use tracing::{info, warn};

/// Forwards readings above the threshold to its listeners and broadcasts an alarm.
struct ThresholdRelay {
    threshold: f64,
}

impl MessageHandler for ThresholdRelay {
    fn on_message_received(&self, bus: &Bus, me: NodeId, msg: &Message) {
        let Some(value) = msg.payload()["value"].as_f64() else {
            warn!(target = "relay_demo", node = %me, "Reading without value");
            return;
        };
        if value <= self.threshold {
            return;
        }
        bus.forward(me, msg);
        let alarm = Message::new(types::ALARM, msg.kind()).with_payload(json!({
            "sensor": msg.payload()["sensor"],
            "value": value,
            "threshold": self.threshold,
        }));
        bus.send(me, &alarm);
    }
}

/// Logs every forwarded reading that reaches it.
struct AlarmSink {
    seen: Arc<AtomicU64>,
}

impl MessageHandler for AlarmSink {
    fn on_message_received(&self, _bus: &Bus, me: NodeId, msg: &Message) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        info!(
            target = "relay_demo",
            node = %me,
            sender = ?msg.sender(),
            forwarder = ?msg.forwarder(),
            payload = %msg.payload(),
            "Hot reading"
        );
    }
}

/// Counts broadcasts.
struct Monitor {
    seen: Arc<AtomicU64>,
}

impl MessageHandler for Monitor {
    fn on_broadcast_received(&self, _bus: &Bus, me: NodeId, msg: &Message) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target = "relay_demo", node = %me, type_code = msg.type_code(), "Broadcast");
    }
}

/// Sink takes forwarded readings only; the relay's own alarms go to the monitor.
fn connect_sink(sink: &Node, relay: NodeId) {
    sink.listen_to(relay, types::READING, !0);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    telemetry::init_logging("info,switchboard_core=info,relay_demo=info");

    info!(
        target = "relay_demo",
        "Starting relay demo: sensors -> threshold relay -> sink (+ broadcast monitor)"
    );

    let cfg = DemoConfig::load();
    let bus = Bus::with_config(cfg.bus.clone());

    let hot = Arc::new(AtomicU64::new(0));
    let broadcasts = Arc::new(AtomicU64::new(0));

    let relay = bus.create_node(ThresholdRelay {
        threshold: cfg.alarm_threshold,
    })?;
    let sink = bus.create_node(AlarmSink {
        seen: Arc::clone(&hot),
    })?;
    connect_sink(&sink, relay.id());

    let monitor = bus.create_node(Monitor {
        seen: Arc::clone(&broadcasts),
    })?;
    if cfg.monitor_broadcasts {
        // alarms only; raw readings stay off the monitor
        monitor.set_receives_broadcasts(true, types::ALARM, kinds::TEMPERATURE | kinds::HUMIDITY);
    }

    let sensors = (0..cfg.sensors)
        .map(|_| bus.create_node(NoopHandler))
        .collect::<Result<Vec<_>, _>>()?;
    for sensor in &sensors {
        relay.listen_to(sensor.id(), types::READING, kinds::TEMPERATURE | kinds::HUMIDITY);
    }

    // 1) Regular traffic
    for round in 0..cfg.readings_per_sensor {
        for (i, sensor) in sensors.iter().enumerate() {
            let kind = if round % 2 == 0 {
                kinds::TEMPERATURE
            } else {
                kinds::HUMIDITY
            };
            let value = 20.0 + ((i as u32 * 7 + round * 5) % 20) as f64;
            sensor.send(
                &Message::new(types::READING, kind)
                    .with_payload(json!({ "sensor": i, "value": value })),
            );
        }
    }

    // 2) Private calibration traffic reaches the relay, which cannot forward it
    if let Some(first) = sensors.first() {
        let calibration = Message::new(types::READING, kinds::TEMPERATURE)
            .private()
            .with_payload(json!({ "sensor": 0, "value": 99.0 }));
        first.send(&calibration);
    }

    // 3) Maintenance window: everything is held back
    bus.block_all_messages(true);
    for sensor in &sensors {
        sensor.send(&Message::new(types::CONTROL, kinds::TEMPERATURE));
    }
    bus.block_all_messages(false);

    info!(
        target = "relay_demo",
        hot = hot.load(Ordering::Relaxed),
        broadcasts = broadcasts.load(Ordering::Relaxed),
        "Traffic done"
    );
    bus.log_stats();
    telemetry::log_stats_json(&bus)?;

    drop(sensors);
    bus.shutdown();
    info!(target = "relay_demo", "Relay demo finished");
    Ok(())
}
