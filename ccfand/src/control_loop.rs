//! GPU fan control loop
//!
//! Drives one ComputerController board from one temperature source:
//!
//! `Init → Connecting → Verifying → Running → Draining → Terminated`
//!
//! Every run ends in `Terminated`, which releases the sensor. Once the
//! device has proven its identity, leaving `Running` always goes through
//! `Draining`, which commands 0% before the link is closed.

use crate::sensor::SensorProvider;
use ccfan_core::{
    speed_for, CcFanError, DefaultDevice, DeviceProfile, Duty, Endpoint, Result, StaticConfig,
    ThresholdPair,
};
use ccfan_hardware::{is_disconnect_error, Connector, DeviceLink, DeviceLocator};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Control loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Connecting,
    Verifying,
    Running,
    Draining,
    Terminated,
}

/// Parameters of a run
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    /// Pinned endpoint; discovered when `None`
    pub endpoint: Option<Endpoint>,
    pub thresholds: ThresholdPair,
    /// Sampling period
    pub tick: Duration,
    /// Minimum duty change, in percentage points, worth a new command
    pub deadband: u8,
    /// Wait after opening the port (device resets on open)
    pub settle: Duration,
    pub identity_timeout: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &StaticConfig) -> Self {
        Self {
            endpoint: config.device.port.clone().map(Endpoint::from),
            thresholds: config.thresholds,
            tick: config.control.tick_interval(),
            deadband: config.control.deadband,
            settle: config.device.settle_interval(),
            identity_timeout: config.device.identity_timeout(),
        }
    }
}

/// What happened during a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks processed while running
    pub ticks: u64,
    /// Duty commands written, the initial 0% included
    pub dispatches: u64,
    /// Ticks skipped because the sensor could not be read
    pub sensor_failures: u64,
    /// Duty commands that could not be written
    pub dispatch_failures: u64,
    /// Last duty written before draining
    pub last_duty: Duty,
    /// Whether the final 0% command was written
    pub drained: bool,
}

/// Periodic temperature-to-duty controller
pub struct ControlLoop {
    settings: LoopSettings,
    locator: Box<dyn DeviceLocator>,
    connector: Box<dyn Connector>,
    sensor: Box<dyn SensorProvider>,
    state: LoopState,
}

impl ControlLoop {
    pub fn new(
        settings: LoopSettings,
        locator: Box<dyn DeviceLocator>,
        connector: Box<dyn Connector>,
        sensor: Box<dyn SensorProvider>,
    ) -> Self {
        Self {
            settings,
            locator,
            connector,
            sensor,
            state: LoopState::Init,
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!("Control loop: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run until `stop` turns true (or its sender goes away).
    ///
    /// Fatal errors (discovery, connection, identity) end the run early with
    /// that error. The sensor is shut down on every path.
    pub async fn run(mut self, stop: watch::Receiver<bool>) -> Result<RunSummary> {
        let outcome = self.drive(stop).await;
        let reached = self.state;

        self.transition(LoopState::Terminated);
        self.sensor.shutdown();

        match &outcome {
            Ok(summary) => info!(
                "Control loop finished: {} ticks, {} commands, {} sensor failures, {} dispatch failures",
                summary.ticks, summary.dispatches, summary.sensor_failures, summary.dispatch_failures
            ),
            Err(e) => error!("Control loop aborted during {:?}: {}", reached, e),
        }
        outcome
    }

    async fn drive(&mut self, stop: watch::Receiver<bool>) -> Result<RunSummary> {
        let endpoint = self.resolve_endpoint()?;
        let mut link = self.connect(&endpoint).await?;

        if let Err(e) = self.verify(&mut link).await {
            link.close().await;
            return Err(e);
        }

        let mut summary = self.regulate(&mut link, stop).await;

        self.transition(LoopState::Draining);
        summary.drained = link.reset_to_safe_state().await;
        link.close().await;

        Ok(summary)
    }

    fn resolve_endpoint(&mut self) -> Result<Endpoint> {
        if let Some(endpoint) = &self.settings.endpoint {
            info!("Using serial port {}", endpoint);
            return Ok(endpoint.clone());
        }

        match self.locator.locate() {
            Some(endpoint) => {
                info!("Found ComputerController serial port at {}", endpoint);
                Ok(endpoint)
            }
            None => {
                error!("Could not locate the ComputerController serial port. Use --port to specify it explicitly.");
                Err(CcFanError::DeviceNotFound)
            }
        }
    }

    async fn connect(&mut self, endpoint: &Endpoint) -> Result<DeviceLink> {
        self.transition(LoopState::Connecting);
        info!("Connecting to {}...", endpoint);

        let transport = self.connector.open(endpoint).await.map_err(|e| match e {
            CcFanError::Connection { .. } => e,
            other => CcFanError::Connection {
                endpoint: endpoint.to_string(),
                reason: other.to_string(),
            },
        })?;
        let mut link = DeviceLink::new(endpoint.clone(), transport);

        if let Err(e) = link.settle_after_reset(self.settings.settle).await {
            link.close().await;
            return Err(CcFanError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            });
        }

        Ok(link)
    }

    async fn verify(&mut self, link: &mut DeviceLink) -> Result<()> {
        self.transition(LoopState::Verifying);

        match link.verify_identity(self.settings.identity_timeout).await {
            Ok(true) => {
                info!("Device at {} identified as {}", link.endpoint(), DefaultDevice::NAME);
                Ok(())
            }
            Ok(false) => {
                error!(
                    "Connected device did not respond to identity command as expected. Aborting."
                );
                Err(CcFanError::IdentityMismatch {
                    endpoint: link.endpoint().to_string(),
                    expected: DefaultDevice::NAME.to_string(),
                })
            }
            Err(e) => Err(CcFanError::Connection {
                endpoint: link.endpoint().to_string(),
                reason: format!("identity handshake failed: {}", e),
            }),
        }
    }

    async fn regulate(
        &mut self,
        link: &mut DeviceLink,
        mut stop: watch::Receiver<bool>,
    ) -> RunSummary {
        self.transition(LoopState::Running);
        info!(
            "Regulating: thresholds {}, deadband {} points, every {:?}",
            self.settings.thresholds, self.settings.deadband, self.settings.tick
        );

        let mut summary = RunSummary::default();

        // Start with the fan off so device and loop agree on the duty
        let mut last = Duty::OFF;
        match link.send_duty(0).await {
            Ok(_) => summary.dispatches += 1,
            Err(e) => {
                summary.dispatch_failures += 1;
                warn!("Failed to send initial fan speed: {}", e);
            }
        }

        let mut ticker = interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        debug!("Stop channel closed");
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if *stop.borrow() {
                break;
            }
            summary.ticks += 1;

            let reading = match self.sensor.temperature() {
                Ok(reading) => reading,
                Err(e) => {
                    summary.sensor_failures += 1;
                    warn!("Skipping tick, sensor read failed: {}", e);
                    continue;
                }
            };
            info!("{} temperature: {} °C", self.sensor.name(), reading);

            let desired = speed_for(reading, &self.settings.thresholds);
            if desired.abs_diff(last) < self.settings.deadband {
                continue;
            }

            debug!("Updating fan speed {} -> {}", last, desired);
            match link.send_duty(i64::from(desired.percent())).await {
                Ok(sent) => {
                    last = sent;
                    summary.dispatches += 1;
                }
                Err(e) => {
                    summary.dispatch_failures += 1;
                    if is_disconnect_error(&e) {
                        error!("Device appears disconnected, fan speed not updated: {}", e);
                    } else {
                        warn!("Failed to send fan speed: {}", e);
                    }
                }
            }
        }

        info!("Stop requested - resetting fan and exiting");
        summary.last_duty = last;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccfan_hardware::mock::{MockConnector, MockHandle};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Sensor replaying a fixed script, then requesting stop
    struct ScriptedSensor {
        readings: VecDeque<Result<i32>>,
        stop: Option<watch::Sender<bool>>,
        shut_down: Arc<AtomicBool>,
    }

    impl ScriptedSensor {
        fn new(readings: Vec<Result<i32>>, stop: Option<watch::Sender<bool>>) -> Self {
            Self {
                readings: readings.into(),
                stop,
                shut_down: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl SensorProvider for ScriptedSensor {
        fn name(&self) -> &str {
            "scripted"
        }

        fn temperature(&mut self) -> Result<i32> {
            let reading = self
                .readings
                .pop_front()
                .unwrap_or_else(|| Err(CcFanError::Sensor("script exhausted".to_string())));
            if self.readings.is_empty() {
                if let Some(stop) = &self.stop {
                    let _ = stop.send(true);
                }
            }
            reading
        }

        fn shutdown(&mut self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    /// Constant sensor that never stops the loop itself
    struct SteadySensor(i32);

    impl SensorProvider for SteadySensor {
        fn name(&self) -> &str {
            "steady"
        }

        fn temperature(&mut self) -> Result<i32> {
            Ok(self.0)
        }

        fn shutdown(&mut self) {}
    }

    struct FixedLocator {
        endpoint: Option<Endpoint>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedLocator {
        fn boxed(endpoint: Option<&str>) -> (Box<dyn DeviceLocator>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let locator = FixedLocator {
                endpoint: endpoint.map(Endpoint::from),
                calls: calls.clone(),
            };
            (Box::new(locator), calls)
        }
    }

    impl DeviceLocator for FixedLocator {
        fn locate(&self) -> Option<Endpoint> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.endpoint.clone()
        }
    }

    fn settings(low: i32, high: i32) -> LoopSettings {
        LoopSettings {
            endpoint: None,
            thresholds: ThresholdPair::new(low, high).unwrap(),
            tick: Duration::from_secs(1),
            deadband: 2,
            settle: Duration::from_secs(2),
            identity_timeout: Duration::from_secs(2),
        }
    }

    fn controller_handle() -> MockHandle {
        let handle = MockHandle::default();
        handle.respond_to("identity", &["", "ComputerController v1.2", "OK"]);
        handle
    }

    /// Run a loop against a verified mock device with scripted readings
    async fn run_scripted(
        settings: LoopSettings,
        handle: &MockHandle,
        readings: Vec<Result<i32>>,
    ) -> (Result<RunSummary>, Arc<AtomicBool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let sensor = ScriptedSensor::new(readings, Some(stop_tx));
        let shut_down = sensor.shut_down.clone();
        let (locator, _) = FixedLocator::boxed(Some("/dev/ttyUSB0"));

        let control = ControlLoop::new(
            settings,
            locator,
            Box::new(MockConnector::new(handle.clone())),
            Box::new(sensor),
        );
        (control.run(stop_rx).await, shut_down)
    }

    fn commands(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_follows_temperature() {
        let handle = controller_handle();

        let (result, shut_down) =
            run_scripted(settings(70, 80), &handle, vec![Ok(60), Ok(75), Ok(76), Ok(85)]).await;

        let summary = result.unwrap();
        assert_eq!(
            handle.written(),
            commands(&[
                "identity",
                "gpufan 0",
                "gpufan 50",
                "gpufan 60",
                "gpufan 100",
                "gpufan 0",
            ])
        );
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.dispatches, 4);
        assert_eq!(summary.last_duty, Duty::FULL);
        assert!(summary.drained);
        assert!(handle.is_closed());
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadband_suppresses_one_point_changes() {
        // One degree is one percentage point with a 100-degree span
        let handle = controller_handle();

        let (result, _) = run_scripted(settings(20, 120), &handle, vec![Ok(74), Ok(75)]).await;

        let summary = result.unwrap();
        assert_eq!(
            handle.duty_commands(),
            commands(&["gpufan 0", "gpufan 54", "gpufan 0"])
        );
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.last_duty.percent(), 54);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadband_measured_from_last_dispatch() {
        // 54 -> 55 -> 56: the drift adds up to 2 points and is then sent
        let handle = controller_handle();

        let (result, _) =
            run_scripted(settings(20, 120), &handle, vec![Ok(74), Ok(75), Ok(76)]).await;

        result.unwrap();
        assert_eq!(
            handle.duty_commands(),
            commands(&["gpufan 0", "gpufan 54", "gpufan 56", "gpufan 0"])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_sleeping_drains_to_zero() {
        let handle = controller_handle();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (locator, _) = FixedLocator::boxed(Some("/dev/ttyUSB0"));

        let control = ControlLoop::new(
            settings(70, 80),
            locator,
            Box::new(MockConnector::new(handle.clone())),
            Box::new(SteadySensor(95)),
        );
        let task = tokio::spawn(control.run(stop_rx));

        // Settle (2 s) plus a few ticks, then stop between ticks
        tokio::time::sleep(Duration::from_millis(5500)).await;
        stop_tx.send(true).unwrap();

        let summary = task.await.unwrap().unwrap();
        let duty = handle.duty_commands();
        assert_eq!(duty.first().map(String::as_str), Some("gpufan 0"));
        assert!(duty.contains(&"gpufan 100".to_string()));
        assert_eq!(duty.last().map(String::as_str), Some("gpufan 0"));
        assert!(summary.drained);
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_stop_sender_drains() {
        let handle = controller_handle();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (locator, _) = FixedLocator::boxed(Some("/dev/ttyUSB0"));

        let control = ControlLoop::new(
            settings(70, 80),
            locator,
            Box::new(MockConnector::new(handle.clone())),
            Box::new(SteadySensor(90)),
        );
        drop(stop_tx);

        let summary = control.run(stop_rx).await.unwrap();
        assert!(summary.drained);
        assert_eq!(
            handle.duty_commands().last().map(String::as_str),
            Some("gpufan 0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_failure_skips_tick() {
        let handle = controller_handle();

        let (result, _) = run_scripted(
            settings(70, 80),
            &handle,
            vec![
                Ok(75),
                Err(CcFanError::Sensor("NVML read failed".to_string())),
                Ok(75),
            ],
        )
        .await;

        let summary = result.unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.sensor_failures, 1);
        assert_eq!(summary.last_duty.percent(), 50);
        assert_eq!(
            handle.duty_commands(),
            commands(&["gpufan 0", "gpufan 50", "gpufan 0"])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_is_not_fatal() {
        let handle = controller_handle();
        // identity and the initial 0% go through, everything after fails
        handle.fail_writes_after(2);

        let (result, shut_down) =
            run_scripted(settings(70, 80), &handle, vec![Ok(75), Ok(90)]).await;

        let summary = result.unwrap();
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.dispatch_failures, 2);
        assert_eq!(summary.last_duty, Duty::OFF);
        assert!(!summary.drained);
        assert!(handle.is_closed());
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_failure() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let sensor = ScriptedSensor::new(vec![Ok(75)], Some(stop_tx));
        let shut_down = sensor.shut_down.clone();
        let (locator, calls) = FixedLocator::boxed(None);
        let connector = MockConnector::new(controller_handle());

        let control = ControlLoop::new(
            settings(70, 80),
            locator,
            Box::new(connector.clone()),
            Box::new(sensor),
        );
        let result = control.run(stop_rx).await;

        assert!(matches!(result, Err(CcFanError::DeviceNotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(connector.opened().is_empty());
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_endpoint_skips_discovery() {
        let handle = controller_handle();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (locator, calls) = FixedLocator::boxed(Some("/dev/ttyUSB0"));
        let connector = MockConnector::new(handle.clone());

        let mut pinned = settings(70, 80);
        pinned.endpoint = Some(Endpoint::new("/dev/ttyACM7"));

        let control = ControlLoop::new(
            pinned,
            locator,
            Box::new(connector.clone()),
            Box::new(ScriptedSensor::new(vec![Ok(70)], Some(stop_tx))),
        );
        control.run(stop_rx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(connector.opened(), vec![Endpoint::new("/dev/ttyACM7")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let sensor = ScriptedSensor::new(vec![Ok(75)], None);
        let shut_down = sensor.shut_down.clone();
        let (locator, _) = FixedLocator::boxed(Some("/dev/ttyUSB0"));

        let control = ControlLoop::new(
            settings(70, 80),
            locator,
            Box::new(MockConnector::refusing()),
            Box::new(sensor),
        );
        let result = control.run(stop_rx).await;

        match result {
            Err(CcFanError::Connection { endpoint, .. }) => assert_eq!(endpoint, "/dev/ttyUSB0"),
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_mismatch_closes_without_driving() {
        let handle = MockHandle::default();
        handle.respond_to("identity", &["garbage", "OK"]);

        let (result, shut_down) = run_scripted(settings(70, 80), &handle, vec![Ok(90)]).await;

        assert!(matches!(result, Err(CcFanError::IdentityMismatch { .. })));
        assert!(handle.duty_commands().is_empty());
        assert!(handle.is_closed());
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_transport_failure_is_connection_error() {
        let handle = controller_handle();
        handle.fail_writes(true);

        let (result, _) = run_scripted(settings(70, 80), &handle, vec![Ok(90)]).await;

        assert!(matches!(result, Err(CcFanError::Connection { .. })));
        assert!(handle.is_closed());
    }

    #[test]
    fn test_settings_from_config() {
        let config = StaticConfig::from_toml(
            r#"
            [device]
            port = "/dev/ttyUSB2"
            settle_ms = 1500

            [control]
            tick_ms = 250
            deadband = 3
            "#,
        )
        .unwrap();

        let settings = LoopSettings::from_config(&config);
        assert_eq!(settings.endpoint, Some(Endpoint::new("/dev/ttyUSB2")));
        assert_eq!(settings.tick, Duration::from_millis(250));
        assert_eq!(settings.deadband, 3);
        assert_eq!(settings.settle, Duration::from_millis(1500));
        assert_eq!(settings.identity_timeout, Duration::from_secs(2));
        assert_eq!(settings.thresholds, ThresholdPair::default());
    }
}
