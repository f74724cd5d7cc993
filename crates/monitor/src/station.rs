//! Estado da estação de monitoramento.
//!
//! Recebe frames da thread de rede, roda o detector de queda e devolve
//! `ALERT`/`SAFE` ao último cliente visto.

use crate::net_thread::NetMessage;
use sentinela_core::config::MonitorConfig;
use sentinela_core::detector::{DetectorSettings, FallDetector, FallState};
use sentinela_core::protocol::Command;
use sentinela_core::types::TelemetryFrame;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Estação de monitoramento (um cliente por vez).
pub struct Station {
    detector: FallDetector,
    commands: UdpSocket,
    command_port: u16,
    client: Option<SocketAddr>,
    last_frame: Option<TelemetryFrame>,
    last_data_time: Option<Instant>,
    connected: bool,
    frames: u64,
}

impl Station {
    pub fn new(config: &MonitorConfig, commands: UdpSocket) -> Self {
        Self {
            detector: FallDetector::new(DetectorSettings::from(config), Instant::now()),
            commands,
            command_port: config.client_command_port,
            client: None,
            last_frame: None,
            last_data_time: None,
            connected: false,
            frames: 0,
        }
    }

    pub fn state(&self) -> FallState {
        self.detector.state()
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Processa um frame recebido.
    pub fn on_frame(&mut self, msg: NetMessage, now: Instant) {
        if self.client.map(|c| c.ip()) != Some(msg.source.ip()) {
            info!("Novo dispositivo conectado: {}", msg.source.ip());
        }
        if !self.connected && self.last_data_time.is_some() {
            info!("Dados recebidos novamente");
        }
        self.connected = true;
        self.client = Some(msg.source);
        self.last_data_time = Some(now);
        self.frames += 1;

        if let Some(command) = self.detector.process(&msg.frame, now) {
            self.send(command);
        }

        let f = &msg.frame;
        debug!(
            "← {} bytes | SVM {:.2} | bat {}% | sos {} | {:.6}, {:.6}",
            msg.raw_size,
            self.detector.last_svm(),
            f.battery,
            f.sos.code(),
            f.lat,
            f.lon
        );
        self.last_frame = Some(msg.frame);
    }

    /// Comando digitado pelo operador.
    pub fn on_operator(&mut self, line: &str, now: Instant) {
        match line.trim() {
            "safe" | "reset" => {
                let command = self.detector.reset(now);
                info!("Alerta encerrado pelo operador");
                self.send(command);
            }
            "alert" => self.send(Command::Alert),
            "status" => self.log_status(),
            "" => {}
            other => warn!("Comando desconhecido: {other}"),
        }
    }

    /// Avisa uma vez quando o cliente para de mandar dados.
    pub fn check_connection(&mut self, now: Instant) {
        let alive = self
            .last_data_time
            .is_some_and(|t| now.saturating_duration_since(t) < CONNECTION_TIMEOUT);
        if self.connected && !alive {
            warn!("Sem dados há {}s – cliente desconectado?", CONNECTION_TIMEOUT.as_secs());
            self.connected = false;
        }
    }

    fn log_status(&self) {
        let position = self
            .last_frame
            .map(|f| format!("{:.6}, {:.6}", f.lat, f.lon))
            .unwrap_or_else(|| "-".into());
        info!(
            "Estado: {:?} | Cliente: {} | Frames: {} | Posição: {position}",
            self.detector.state(),
            self.client.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
            self.frames
        );
    }

    /// Envia um comando ao cliente, best-effort.
    fn send(&self, command: Command) {
        let Some(client) = self.client else {
            debug!("Nenhum cliente conhecido para {}", command.as_str());
            return;
        };
        let target = SocketAddr::new(client.ip(), self.command_port);
        match self.commands.send_to(command.as_str().as_bytes(), target) {
            Ok(_) => info!("→ {} para {target}", command.as_str()),
            Err(e) => debug!("Erro ao enviar {}: {e}", command.as_str()),
        }
    }
}
