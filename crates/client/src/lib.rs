//! # Sentinela Client
//!
//! Núcleo de rede do dispositivo monitorado: envia frames de telemetria
//! via UDP e escuta comandos `ALERT`/`SAFE` do monitor.
//!
//! ## Módulos
//! - [`session`] – Raiz de composição (start/stop, callbacks de sensores)
//! - [`link`] – Envio best-effort em thread dedicada
//! - [`listener`] – Loop de recepção de comandos
//! - [`collaborators`] – Interfaces fornecidas pelo shell do aplicativo

pub mod collaborators;
pub mod link;
pub mod listener;
pub mod session;

pub use collaborators::{BatteryQuery, Collaborators, LocationProvider, NotificationSink};
pub use session::{Session, SessionError, Transport};
