use std::sync::Arc;

use anyhow::anyhow;
use bluest::Adapter;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use futures_util::future::BoxFuture;
use futures_util::pin_mut;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio::time::Duration;

use crate::error::BmsError;
use crate::link::{LinkSession, RequestSink, RESPONSE_TIMEOUT};
use crate::message::{
    CellVoltagesMessage, GenericInfoMessage, CELL_VOLTAGES_REQUEST, GENERIC_INFO_REQUEST,
};
use crate::telemetry::TelemetryRecord;

/// Connection to the BMS over BLE.
///
/// Owns the adapter, the device handle and the notification pump; all
/// request/response traffic runs through the shared [`LinkSession`].
pub struct BmsClient {
    adapter: Adapter,
    device: Device,
    session: Arc<LinkSession>,
}

struct CharacteristicSink {
    write: Characteristic,
}

impl RequestSink for CharacteristicSink {
    fn send<'a>(&'a self, request: &'a [u8]) -> BoxFuture<'a, Result<(), BmsError>> {
        Box::pin(async move {
            self.write
                .write(request)
                .await
                .map_err(|err| BmsError::WriteFailed(err.to_string()))
        })
    }
}

impl BmsClient {
    const BMS_SERVICE_ID: &'static str = "0000ff00-0000-1000-8000-00805f9b34fb";
    const BMS_NOTIFY_CHARACTERISTIC_ID: &'static str = "0000ff01-0000-1000-8000-00805f9b34fb";
    const BMS_WRITE_CHARACTERISTIC_ID: &'static str = "0000ff02-0000-1000-8000-00805f9b34fb";
    const DISCOVERY_TIMEOUT_S: u64 = 30;

    /// Create a new `BmsClient`: discover the device, connect, find the BMS
    /// service characteristics and start listening for notifications.
    ///
    /// `target` matches either the advertised device name or the platform
    /// device id (which on Linux embeds the MAC address).
    pub async fn new(target: &str) -> anyhow::Result<Self> {
        let adapter = bluest::Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;

        let device = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            Self::discover_device(target, &adapter),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))??;

        adapter.connect_device(&device).await?;
        info!("[{target}] Connected");

        let bms_service = device
            .discover_services_with_uuid(Self::bms_service_id())
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not expose the BMS service."))?
            .clone();
        let write = bms_service
            .discover_characteristics_with_uuid(Self::bms_write_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not expose the BMS write characteristic."))?
            .clone();
        let notify = bms_service
            .discover_characteristics_with_uuid(Self::bms_notify_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not expose the BMS notify characteristic."))?
            .clone();

        let session = Arc::new(LinkSession::new(Arc::new(CharacteristicSink { write })));
        Self::start_notification_pump(notify, session.clone()).await?;
        info!("BMS found");

        Ok(Self {
            adapter,
            device,
            session,
        })
    }

    /// The shared link session, for wiring up a
    /// [`Multiplexer`](crate::bridge::Multiplexer) in bridge mode.
    pub fn session(&self) -> Arc<LinkSession> {
        self.session.clone()
    }

    /// Query both documented commands and merge the results into one record.
    pub async fn fetch_telemetry(&self) -> Result<TelemetryRecord, BmsError> {
        let frame = self.request_response(&GENERIC_INFO_REQUEST).await?;
        let info = GenericInfoMessage::parse(&frame)?;

        let frame = self.request_response(&CELL_VOLTAGES_REQUEST).await?;
        let voltages = CellVoltagesMessage::parse(&frame)?;

        Ok(TelemetryRecord::from_messages(&info, &voltages))
    }

    /// Disconnect from the BMS.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }

    async fn request_response(&self, request: &[u8]) -> Result<Vec<u8>, BmsError> {
        debug!("BMS TX: {}", hex::encode(request));
        self.session.submit(request).await?;
        let frame = self.session.await_response(RESPONSE_TIMEOUT).await?;
        debug!("BMS RX: {}", hex::encode(&frame));
        Ok(frame)
    }

    async fn discover_device(target: &str, adapter: &Adapter) -> anyhow::Result<Device> {
        let required_services = [Self::bms_service_id()];
        let target_as_id = target.replace(':', "_");
        let mut adapter_events = adapter.scan(&required_services).await?;
        while let Some(found) = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            adapter_events.next(),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))?
        {
            let name = found.device.name_async().await.unwrap_or_default();
            let id = format!("{:?}", found.device.id());
            if name == target || id.contains(target) || id.contains(&target_as_id) {
                return Ok(found.device);
            }
        }

        Err(anyhow!("Device not found"))
    }

    fn bms_service_id() -> Uuid {
        Uuid::parse_str(Self::BMS_SERVICE_ID).unwrap()
    }

    fn bms_write_characteristic_id() -> Uuid {
        Uuid::parse_str(Self::BMS_WRITE_CHARACTERISTIC_ID).unwrap()
    }

    fn bms_notify_characteristic_id() -> Uuid {
        Uuid::parse_str(Self::BMS_NOTIFY_CHARACTERISTIC_ID).unwrap()
    }

    /// Subscribe to the notify characteristic and forward every chunk into
    /// the session. Runs until the stream ends, which is how a disconnect
    /// shows up; the session is closed then so waiters fail fast instead of
    /// timing out.
    async fn start_notification_pump(
        notify: Characteristic,
        session: Arc<LinkSession>,
    ) -> anyhow::Result<()> {
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move {
            let stream = match notify.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow!("enabling notifications failed: {err}")));
                    return;
                }
            };
            pin_mut!(stream);
            while let Some(event) = stream.next().await {
                match event {
                    Ok(chunk) => {
                        debug!("BMS RX notification: {}", hex::encode(&chunk));
                        session.on_chunk(&chunk).await;
                    }
                    Err(err) => {
                        error!("BMS notification error: {err}");
                        break;
                    }
                }
            }
            warn!("BMS notification stream ended");
            session.close().await;
        });
        ready_rx
            .await
            .map_err(|_| anyhow!("notification pump exited before subscribing"))?
    }
}
