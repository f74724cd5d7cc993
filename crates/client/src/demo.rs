//! Colaboradores de demonstração – substituem o shell do aparelho.
//!
//! Sensor sintético (gravidade + oscilação leve), bateria fixa, localização
//! sempre disponível e notificações no log.

use sentinela_client::{LocationProvider, NotificationSink, Session};
use sentinela_core::{GeoFix, LocationSource, SensorReading};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Intervalo das atualizações de posição (igual ao pedido ao GPS no aparelho).
const LOCATION_INTERVAL: Duration = Duration::from_secs(2);

/// Notificações vão para o log.
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn present_alarm(&self) {
        warn!("⚠️  ALERTA DE QUEDA – digite `falso` para dispensar ou `sos` para pedir ajuda");
    }

    fn dismiss_alarm(&self) {
        info!("✓ Monitor confirmou que está tudo bem");
    }

    fn haptic(&self, duration: Duration) {
        info!("📳 Vibração {} ms", duration.as_millis());
    }
}

/// Localização fixa, sempre habilitada.
pub struct FixedLocation {
    pub lat: f64,
    pub lon: f64,
}

impl LocationProvider for FixedLocation {
    fn is_available(&self) -> bool {
        true
    }

    fn last_known(&self) -> Option<GeoFix> {
        Some(GeoFix::new(self.lat, self.lon, LocationSource::Cached))
    }
}

/// Provedor de sensores sintético. Empurra leituras na sessão a `rate_hz`.
pub struct SyntheticSensors {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticSensors {
    pub fn spawn(session: Arc<Session>, rate_hz: u32, location: GeoFix) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let period = Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)));

        let worker = std::thread::Builder::new()
            .name("synthetic-sensors".into())
            .spawn(move || {
                let started = Instant::now();
                let mut last_fix = started;
                while !flag.load(Ordering::Relaxed) {
                    let t = started.elapsed().as_secs_f32();
                    let sway = (t * 1.7).sin() * 0.15;
                    session.on_sensor_reading(SensorReading::Acceleration([sway, -sway * 0.5, 9.81]));
                    session.on_sensor_reading(SensorReading::AngularRate([0.01 * sway, 0.0, -0.02 * sway]));
                    session.on_sensor_reading(SensorReading::Light(300.0 + 20.0 * (t * 0.1).sin()));

                    if last_fix.elapsed() >= LOCATION_INTERVAL {
                        last_fix = Instant::now();
                        session.on_location_update(GeoFix::new(location.lat, location.lon, LocationSource::Gps));
                    }
                    std::thread::sleep(period);
                }
            })
            .expect("Falha ao criar thread de sensores");

        Self {
            stop,
            worker: Some(worker),
        }
    }
}

impl Drop for SyntheticSensors {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
