use std::time::Duration;

use btleplug::api::{
    Central as _, CentralEvent, Peripheral as _, PeripheralProperties, ScanFilter,
    bleuuid::uuid_from_u16,
};
use btleplug::platform::{Adapter, PeripheralId};
use futures::StreamExt as _;
use log::{debug, info, warn};
use mac_address::MacAddress;

use crate::advertisement::AdvertisingRecord;
use crate::decoder::MIBEACON_UUID16;
use crate::dispatcher::Dispatcher;
use crate::mqtt::MqttClient;
use crate::presence::Timestamp;

pub struct Manager {
    adapter: Adapter,
    mqtt_client: MqttClient,
    mqtt_event_loop: rumqttc::EventLoop,
    dispatcher: Dispatcher<MqttClient>,
    tick: Duration,
}

fn event_peripheral(event: &CentralEvent) -> Option<&PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. }
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

fn clamp_rssi(properties: Option<PeripheralProperties>) -> i8 {
    properties
        .and_then(|p| p.rssi)
        .map(|rssi| rssi.clamp(i8::MIN as i16, i8::MAX as i16) as i8)
        .unwrap_or(0)
}

/// Turns one adapter event into an advertising record and dispatches it.
async fn handle_btle_event(
    adapter: &Adapter,
    dispatcher: &mut Dispatcher<MqttClient>,
    event: CentralEvent,
) -> Result<(), btleplug::Error> {
    let Some(id) = event_peripheral(&event) else {
        return Ok(());
    };

    let peripheral = adapter.peripheral(id).await?;
    let address = MacAddress::new(peripheral.address().into_inner());
    let rssi = clamp_rssi(peripheral.properties().await?);

    let mibeacon_uuid = uuid_from_u16(MIBEACON_UUID16);
    let record = match &event {
        CentralEvent::ServiceDataAdvertisement { service_data, .. } => {
            service_data
                .get(&mibeacon_uuid)
                .and_then(|data| {
                    AdvertisingRecord::from_service_data(address, MIBEACON_UUID16, data, rssi)
                })
                .unwrap_or_else(|| AdvertisingRecord::sighting(address, rssi))
        }
        _ => AdvertisingRecord::sighting(address, rssi),
    };

    dispatcher.dispatch(&record);
    Ok(())
}

impl Manager {
    pub fn new(
        adapter: Adapter,
        mqtt_client: MqttClient,
        mqtt_event_loop: rumqttc::EventLoop,
        dispatcher: Dispatcher<MqttClient>,
        tick: Duration,
    ) -> Self {
        Manager {
            adapter,
            mqtt_client,
            mqtt_event_loop,
            dispatcher,
            tick,
        }
    }

    pub async fn run_loop(self) -> anyhow::Result<()> {
        let Manager {
            adapter,
            mqtt_client,
            mut mqtt_event_loop,
            mut dispatcher,
            tick,
        } = self;

        adapter.start_scan(ScanFilter::default()).await?;
        info!("Scanning....");

        tokio::task::spawn(async move {
            MqttClient::event_loop(&mut mqtt_event_loop).await;
        });

        let mut events = adapter.events().await?;
        // btleplug only reports changes, so the window is also checked on a timer
        let mut ticker = tokio::time::interval(tick);

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => {
                        if let Err(err) = handle_btle_event(&adapter, &mut dispatcher, event).await {
                            warn!("Error handling BTLE event: {:?}", err);
                        }
                    }
                    None => {
                        info!("No more events");
                        break;
                    }
                },
                _ = ticker.tick() => dispatcher.tick(Timestamp::now()),
            }
        }
        debug!("Exiting manager event loop");

        adapter.stop_scan().await?;
        mqtt_client.disconnect().await?;

        Ok(())
    }
}
