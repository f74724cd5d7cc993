//! Definição de tipos/structs do link de telemetria.
//!
//! Leituras de sensores, posição, estado de alerta e o frame montado a cada
//! envio. O formato de fio fica em [`crate::protocol`].

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Sensores
// ──────────────────────────────────────────────

/// Últimas leituras de movimento/ambiente.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorSnapshot {
    /// Aceleração nos três eixos (m/s²)
    pub acc: [f32; 3],
    /// Velocidade angular nos três eixos (rad/s)
    pub gyro: [f32; 3],
    /// Luz ambiente (lux)
    pub light: f32,
}

/// Uma leitura individual entregue pelo provedor de sensores.
///
/// Cada callback de sensor atualiza apenas a sua parte do snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    Acceleration([f32; 3]),
    AngularRate([f32; 3]),
    Light(f32),
}

impl SensorSnapshot {
    /// Aplica uma leitura no lugar. Leituras com NaN/Inf são rejeitadas e o
    /// valor anterior é mantido; retorna `false` nesse caso.
    pub fn apply(&mut self, reading: SensorReading) -> bool {
        match reading {
            SensorReading::Acceleration(v) if all_finite(&v) => self.acc = v,
            SensorReading::AngularRate(v) if all_finite(&v) => self.gyro = v,
            SensorReading::Light(v) if v.is_finite() => self.light = v,
            _ => return false,
        }
        true
    }

    /// Substitui o snapshot inteiro, mantendo os grupos anteriores que
    /// vierem com valores não finitos. Retorna `false` se algo foi rejeitado.
    pub fn merge(&mut self, other: &SensorSnapshot) -> bool {
        let acc = self.apply(SensorReading::Acceleration(other.acc));
        let gyro = self.apply(SensorReading::AngularRate(other.gyro));
        let light = self.apply(SensorReading::Light(other.light));
        acc && gyro && light
    }

    /// Magnitude do vetor de aceleração (SVM).
    pub fn acc_magnitude(&self) -> f32 {
        self.acc.iter().map(|a| a * a).sum::<f32>().sqrt()
    }
}

fn all_finite(values: &[f32; 3]) -> bool {
    values.iter().all(|v| v.is_finite())
}

// ──────────────────────────────────────────────
// Localização
// ──────────────────────────────────────────────

/// Origem de uma posição.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocationSource {
    Gps,
    Network,
    Cached,
    #[default]
    Unknown,
}

impl LocationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationSource::Gps => "GPS",
            LocationSource::Network => "NETWORK",
            LocationSource::Cached => "CACHED",
            LocationSource::Unknown => "UNKNOWN",
        }
    }
}

/// Posição conhecida do cliente. Sempre substituída por inteiro.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoFix {
    /// Latitude (graus decimais)
    pub lat: f64,
    /// Longitude (graus decimais)
    pub lon: f64,
    pub source: LocationSource,
    /// `true` depois que pelo menos uma posição foi recebida
    pub fresh: bool,
}

impl GeoFix {
    pub fn new(lat: f64, lon: f64, source: LocationSource) -> Self {
        Self {
            lat,
            lon,
            source,
            fresh: true,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

// ──────────────────────────────────────────────
// Estado de alerta
// ──────────────────────────────────────────────

/// Postura de alerta do cliente, embutida em todo frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SosState {
    #[default]
    Idle,
    SosActive,
    FalseAlarmCooldown,
}

impl SosState {
    /// Código numérico usado no fio.
    pub fn code(self) -> u8 {
        match self {
            SosState::Idle => 0,
            SosState::SosActive => 1,
            SosState::FalseAlarmCooldown => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SosState::Idle),
            1 => Some(SosState::SosActive),
            2 => Some(SosState::FalseAlarmCooldown),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Frame completo
// ──────────────────────────────────────────────

/// Frame de telemetria montado no momento do envio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryFrame {
    pub sensors: SensorSnapshot,
    /// Bateria (0–100%)
    pub battery: u8,
    pub sos: SosState,
    pub lat: f64,
    pub lon: f64,
}

impl TelemetryFrame {
    /// Monta um frame a partir do estado atual. A bateria é limitada a 0–100.
    pub fn assemble(sensors: SensorSnapshot, fix: &GeoFix, battery: i32, sos: SosState) -> Self {
        Self {
            sensors,
            battery: battery.clamp(0, 100) as u8,
            sos,
            lat: fix.lat,
            lon: fix.lon,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
