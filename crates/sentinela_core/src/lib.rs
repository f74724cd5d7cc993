//! # Sentinela Core
//!
//! Crate compartilhada que define o modelo de dados, o protocolo textual
//! sobre UDP, a máquina de estados de alerta, o limitador de envio e a
//! configuração TOML do sistema Sentinela.
//!
//! ## Módulos
//! - [`types`] – Leituras de sensores, posição, estado SOS e frame
//! - [`protocol`] – Encode/decode do frame e comandos `ALERT`/`SAFE`
//! - [`gate`] – Limitador de taxa dirigido por eventos
//! - [`alerts`] – Máquina de estados de alerta com reset automático
//! - [`config`] – Configuração unificada via TOML
//! - [`detector`] – Detecção de queda do lado do monitor

pub mod types;
pub mod protocol;
pub mod gate;
pub mod alerts;
pub mod config;
pub mod detector;

// Re-exports convenientes
pub use types::{GeoFix, LocationSource, SensorReading, SensorSnapshot, SosState, TelemetryFrame};
pub use protocol::{Command, DecodeError, decode_frame, encode_frame};
pub use alerts::{AlarmPresentation, AlertStateMachine, AlertTimings, NotificationSink};
pub use config::{AppConfig, ClientConfig, Endpoint, MonitorConfig};
