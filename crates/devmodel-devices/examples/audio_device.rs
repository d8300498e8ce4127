use std::sync::Arc;

use devmodel_core::config::ModelConfig;
use devmodel_devices::prelude::{info, Value};
use devmodel_devices::{
    Authorizer, CommandResponse, DetailLevel, DeviceEvent, DeviceModelSpec, SetValueEntry,
    SharedDeviceRegistry,
};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const MODEL: &str = r#"{
    "slot": 1,
    "constraints": {
        "gain_db": {"type": "float_range", "min": -60.0, "max": 12.0, "step": 0.5}
    },
    "params": {
        "gain": {"type": "FLOAT32", "constraint": {"ref_oid": "gain_db"}},
        "mute": {"type": "INT32", "constraint": {"type": "int_range", "min": 0, "max": 1, "strict": true}},
        "serial": {"type": "STRING", "read_only": true, "value": {"string_value": "AU-0001"}}
    },
    "commands": {
        "identify": {"type": "EMPTY"}
    },
    "language_packs": {
        "en": {"name": "English", "words": {"gain": "Gain", "mute": "Mute"}}
    }
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Create device registry
    let device_registry = SharedDeviceRegistry::new();

    // Build the device from its model and register it
    let spec = DeviceModelSpec::from_json_str(MODEL)?;
    let device = device_registry
        .registry()
        .register(spec.into_device(&ModelConfig::default())?)?;

    // Business logic for the identify command
    device.lock()?.define_command(
        "/identify",
        Arc::new(|_: Value| CommandResponse::Response(Value::from("blinking"))),
    )?;

    // Subscribe to device events
    let mut event_rx = device.subscribe();
    let events = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match event {
                DeviceEvent::ValueSetByClient { oid, value, .. } => {
                    info!("Client set {} = {:?}", oid, value);
                }
                DeviceEvent::ValueSetByServer { oid, value, .. } => {
                    info!("Server set {} = {:?}", oid, value);
                }
                DeviceEvent::LanguageAdded { language, .. } => {
                    info!("Language pack {} added", language);
                }
            }
        }
    });

    let authz = Authorizer::disabled();
    {
        let mut model = device.lock()?;

        // Out of range gain is clamped to the nearest step
        model.set_value("/gain", Value::Float32(20.3), &authz)?;
        info!("Gain: {:?}", model.get_value("/gain", &authz)?);

        // A batch with one bad entry changes nothing
        let result = model.multi_set_value(
            vec![
                SetValueEntry::new("/gain", -6.0f32),
                SetValueEntry::new("/mute", 2),
            ],
            &authz,
        );
        info!("Batch rejected: {:?}", result.err().map(|e| e.status()));
        info!("Gain after rejected batch: {:?}", model.get_value("/gain", &authz)?);

        let response = model.execute_command("/identify", Value::Empty, &authz)?;
        info!("Identify: {:?}", response);

        model.set_value_by_server("/serial", Value::from("AU-0002"))?;

        let snapshot = model.serialize(DetailLevel::Full, &authz)?;
        info!("Device: {}", serde_json::to_string_pretty(&snapshot)?);
    }

    // Dropping the last handle to the device closes the event stream
    drop(device);
    let removed = device_registry.registry().unregister(1)?;
    drop(removed);
    events.await?;

    Ok(())
}
