//! Detecção de queda do lado do monitor.
//!
//! Filtra a aceleração de cada eixo com um Kalman escalar, calcula a
//! magnitude (SVM) e decide quando mandar `ALERT`/`SAFE` ao cliente.
//!
//! ```text
//!            svm > limiar            sosState = 1
//!  Normal ───────────────► Impact ─────────────────► Sos
//!    ▲                       │ ALERT a cada N s        │
//!    └──── sosState = 2 ─────┴──── reset manual ───────┘
//! ```

use crate::config::MonitorConfig;
use crate::protocol::Command;
use crate::types::{SosState, TelemetryFrame};
use std::time::{Duration, Instant};
use tracing::info;

/// Filtro de Kalman escalar (modelo constante).
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    q: f32,
    r: f32,
    p: f32,
    x: f32,
}

impl KalmanFilter {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            q: process_noise,
            r: measurement_noise,
            p: 1.0,
            x: 0.0,
        }
    }

    pub fn update(&mut self, measurement: f32) -> f32 {
        self.p += self.q;
        let k = self.p / (self.p + self.r);
        self.x += k * (measurement - self.x);
        self.p *= 1.0 - k;
        self.x
    }

    pub fn value(&self) -> f32 {
        self.x
    }
}

/// Estado do monitor para um cliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallState {
    Normal,
    Impact,
    Sos,
}

/// Parâmetros do detector.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub impact_threshold: f32,
    pub rearm: Duration,
    pub realert: Duration,
    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for DetectorSettings {
    fn from(c: &MonitorConfig) -> Self {
        Self {
            impact_threshold: c.impact_threshold,
            rearm: Duration::from_secs_f64(c.rearm_secs.max(0.0)),
            realert: Duration::from_secs_f64(c.realert_secs.max(0.0)),
            process_noise: c.process_noise,
            measurement_noise: c.measurement_noise,
        }
    }
}

/// Detector de queda alimentado frame a frame.
#[derive(Debug, Clone)]
pub struct FallDetector {
    settings: DetectorSettings,
    filters: [KalmanFilter; 3],
    state: FallState,
    last_state_change: Instant,
    last_alarm: Instant,
    last_svm: f32,
}

impl FallDetector {
    pub fn new(settings: DetectorSettings, now: Instant) -> Self {
        let filter = KalmanFilter::new(settings.process_noise, settings.measurement_noise);
        Self {
            filters: [filter.clone(), filter.clone(), filter],
            settings,
            state: FallState::Normal,
            last_state_change: now,
            last_alarm: now,
            last_svm: 0.0,
        }
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    /// Última magnitude filtrada (m/s²).
    pub fn last_svm(&self) -> f32 {
        self.last_svm
    }

    /// Processa um frame e retorna o comando a enviar, se houver.
    pub fn process(&mut self, frame: &TelemetryFrame, now: Instant) -> Option<Command> {
        let acc = frame.sensors.acc;
        let mut sum = 0.0_f32;
        for (filter, value) in self.filters.iter_mut().zip(acc) {
            let v = filter.update(value);
            sum += v * v;
        }
        let svm = sum.sqrt();
        self.last_svm = svm;

        match frame.sos {
            SosState::FalseAlarmCooldown if self.state != FallState::Normal => {
                info!("Falso alarme reportado pelo cliente, alerta encerrado");
                Some(self.reset(now))
            }
            SosState::SosActive => {
                if self.state == FallState::Sos {
                    return None;
                }
                info!("🆘 Sinal de SOS recebido");
                self.set_state(FallState::Sos, now);
                Some(Command::Alert)
            }
            _ => self.detect_fall(svm, now),
        }
    }

    fn detect_fall(&mut self, svm: f32, now: Instant) -> Option<Command> {
        match self.state {
            FallState::Sos => None,
            FallState::Normal => {
                let rearmed = now.saturating_duration_since(self.last_state_change) > self.settings.rearm;
                if svm > self.settings.impact_threshold && rearmed {
                    info!("⚠️ Queda detectada (SVM {svm:.1} m/s²)");
                    self.set_state(FallState::Impact, now);
                    self.last_alarm = now;
                    Some(Command::Alert)
                } else {
                    None
                }
            }
            FallState::Impact => {
                if now.saturating_duration_since(self.last_alarm) > self.settings.realert {
                    self.last_alarm = now;
                    Some(Command::Alert)
                } else {
                    None
                }
            }
        }
    }

    /// Reset feito pelo operador do monitor. Sempre devolve `SAFE`.
    pub fn reset(&mut self, now: Instant) -> Command {
        self.set_state(FallState::Normal, now);
        Command::Safe
    }

    fn set_state(&mut self, state: FallState, now: Instant) {
        self.state = state;
        self.last_state_change = now;
    }
}
