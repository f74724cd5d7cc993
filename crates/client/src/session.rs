//! Sessão – raiz de composição do cliente.
//!
//! Junta o link de envio, o listener de comandos e a máquina de estados de
//! alerta, e transforma cada callback de sensor/posição num envio limitado
//! pelo [`SendGate`].
//!
//! Compartilhada como `Arc<Session>`: sensores, UI e rede chamam a partir
//! de threads diferentes.

use crate::collaborators::{BatteryQuery, Collaborators, LocationProvider};
use crate::link::OutboundLink;
use crate::listener::InboundListener;
use sentinela_core::gate::SendGate;
use sentinela_core::{
    AlertStateMachine, ClientConfig, Endpoint, GeoFix, LocationSource, SensorReading,
    SensorSnapshot, TelemetryFrame,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Qual transporte falhou ao abrir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Outbound,
    Inbound,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Outbound => f.write_str("de envio"),
            Transport::Inbound => f.write_str("de comandos"),
        }
    }
}

/// Erros do ciclo de vida da sessão.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Serviço de localização desligado (habilite GPS ou rede)")]
    LocationUnavailable,

    #[error("Sessão já está em execução")]
    AlreadyRunning,

    #[error("O destino só pode mudar com a sessão parada")]
    EndpointLocked,

    #[error("Falha ao abrir socket {transport}: {source}")]
    TransportBind {
        transport: Transport,
        source: std::io::Error,
    },
}

/// Últimas leituras conhecidas.
#[derive(Debug, Clone, Copy, Default)]
struct Readings {
    sensors: SensorSnapshot,
    fix: GeoFix,
}

/// Transportes abertos enquanto a sessão roda.
struct Links {
    outbound: OutboundLink,
    inbound: InboundListener,
}

/// Sessão de telemetria do cliente.
pub struct Session {
    config: ClientConfig,
    endpoint: Mutex<Endpoint>,
    running: AtomicBool,
    readings: Mutex<Readings>,
    gate: Mutex<SendGate>,
    links: Mutex<Option<Links>>,
    alerts: AlertStateMachine,
    battery: Arc<dyn BatteryQuery>,
    location: Arc<dyn LocationProvider>,
}

impl Session {
    pub fn new(config: ClientConfig, collaborators: Collaborators) -> Self {
        let alerts = AlertStateMachine::new(config.alert_timings(), collaborators.notifier);
        Self {
            endpoint: Mutex::new(config.endpoint()),
            gate: Mutex::new(SendGate::new(config.min_send_interval())),
            running: AtomicBool::new(false),
            readings: Mutex::new(Readings::default()),
            links: Mutex::new(None),
            alerts,
            battery: collaborators.battery,
            location: collaborators.location,
            config,
        }
    }

    // ──────────────────────────────────────────
    // Ciclo de vida
    // ──────────────────────────────────────────

    /// Abre os transportes e começa a enviar para `endpoint`.
    ///
    /// Se qualquer etapa falhar, o que já foi aberto é liberado e a sessão
    /// continua parada.
    pub fn start(&self, endpoint: Endpoint) -> Result<(), SessionError> {
        let mut links = lock(&self.links);
        if links.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        if !self.location.is_available() {
            warn!("Localização indisponível, sessão não iniciada");
            return Err(SessionError::LocationUnavailable);
        }

        let mut inbound = InboundListener::bind(self.config.listen_port, self.alerts.clone())
            .map_err(|source| SessionError::TransportBind {
                transport: Transport::Inbound,
                source,
            })?;

        let outbound = match OutboundLink::open(&self.config.outbound_bind_addr(), endpoint.clone()) {
            Ok(outbound) => outbound,
            Err(source) => {
                inbound.close();
                return Err(SessionError::TransportBind {
                    transport: Transport::Outbound,
                    source,
                });
            }
        };

        if let Some(fix) = self.location.last_known().filter(GeoFix::is_finite) {
            lock(&self.readings).fix = GeoFix::new(fix.lat, fix.lon, LocationSource::Cached);
            info!("Posição em cache: {:.4}, {:.4}", fix.lat, fix.lon);
        }

        lock(&self.gate).reset();
        *lock(&self.endpoint) = endpoint.clone();
        *links = Some(Links { outbound, inbound });
        self.running.store(true, Ordering::Release);

        info!("🟢 Sessão iniciada → {endpoint}");
        Ok(())
    }

    /// Para a sessão. Idempotente e seguro a partir de qualquer thread.
    pub fn stop(&self) {
        // Flag e transportes mudam sob o mesmo lock do `start()`
        let links = {
            let mut guard = lock(&self.links);
            self.running.store(false, Ordering::Release);
            guard.take()
        };
        if let Some(mut links) = links {
            links.inbound.close();
            links.outbound.close();
            info!("⚪ Sessão parada");
        }
        self.alerts.dismiss_presentation();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn endpoint(&self) -> Endpoint {
        lock(&self.endpoint).clone()
    }

    /// Troca o destino. Rejeitado com a sessão em execução.
    pub fn set_endpoint(&self, endpoint: Endpoint) -> Result<(), SessionError> {
        let links = lock(&self.links);
        if links.is_some() {
            return Err(SessionError::EndpointLocked);
        }
        *lock(&self.endpoint) = endpoint;
        Ok(())
    }

    /// Endereço local do listener de comandos, se em execução.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        lock(&self.links).as_ref().map(|l| l.inbound.local_addr())
    }

    /// Endereço local do socket de envio, se em execução.
    pub fn outbound_addr(&self) -> Option<SocketAddr> {
        lock(&self.links).as_ref().map(|l| l.outbound.local_addr())
    }

    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }

    // ──────────────────────────────────────────
    // Ações do usuário
    // ──────────────────────────────────────────

    pub fn trigger_sos(&self) {
        self.alerts.on_user_trigger_sos();
    }

    pub fn confirm_false_alarm(&self) {
        self.alerts.on_user_false_alarm();
    }

    // ──────────────────────────────────────────
    // Callbacks de sensores e posição
    // ──────────────────────────────────────────

    /// Snapshot completo vindo do provedor de sensores.
    pub fn on_sensor_update(&self, snapshot: SensorSnapshot) {
        if !lock(&self.readings).sensors.merge(&snapshot) {
            debug!("Leitura não finita descartada: {snapshot:?}");
        }
        self.maybe_send();
    }

    /// Leitura de um único sensor.
    pub fn on_sensor_reading(&self, reading: SensorReading) {
        if !lock(&self.readings).sensors.apply(reading) {
            debug!("Leitura não finita descartada: {reading:?}");
        }
        self.maybe_send();
    }

    pub fn on_location_update(&self, fix: GeoFix) {
        if fix.is_finite() {
            lock(&self.readings).fix = GeoFix { fresh: true, ..fix };
            debug!("{}: {:.5}, {:.5}", fix.source.as_str(), fix.lat, fix.lon);
        } else {
            debug!("Posição não finita descartada");
        }
        self.maybe_send();
    }

    pub fn sensors(&self) -> SensorSnapshot {
        lock(&self.readings).sensors
    }

    pub fn location(&self) -> GeoFix {
        lock(&self.readings).fix
    }

    /// Monta e enfileira um frame se o gate liberar. Nunca bloqueia na rede.
    fn maybe_send(&self) {
        let active = self.is_running();
        if !lock(&self.gate).should_send(Instant::now(), active) {
            return;
        }

        let readings = *lock(&self.readings);
        let frame = TelemetryFrame::assemble(
            readings.sensors,
            &readings.fix,
            self.battery.level(),
            self.alerts.sos_state(),
        );
        if let Some(links) = lock(&self.links).as_ref() {
            links.outbound.send(frame);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
