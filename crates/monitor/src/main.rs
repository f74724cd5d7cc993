//! # Sentinela Monitor
//!
//! Estação de monitoramento sem interface gráfica: recebe a telemetria do
//! cliente via UDP, detecta quedas e envia `ALERT`/`SAFE` de volta.
//!
//! ## Comandos (stdin)
//! - `safe` / `reset` – encerrar o alerta atual e avisar o cliente
//! - `alert` – mandar `ALERT` manualmente
//! - `status` – estado atual
//! - `sair` – encerrar (Ctrl+C também)

mod net_thread;
mod station;

use crossbeam_channel::{Receiver, bounded, never, select, unbounded};
use sentinela_core::config::AppConfig;
use station::Station;
use std::io::BufRead;
use std::net::UdpSocket;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Intervalo da checagem de conexão.
const TICK: Duration = Duration::from_secs(1);

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }
    let monitor_cfg = &config.monitor;

    // ── Sockets ──
    let commands = match UdpSocket::bind("0.0.0.0:0") {
        Ok(sock) => sock,
        Err(e) => {
            error!("Falha ao criar socket de comandos: {e}");
            return;
        }
    };
    let frames = net_thread::spawn_receiver_thread(monitor_cfg.port);

    // ── Operador (stdin) ──
    let (line_tx, mut lines) = unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .expect("Falha ao criar thread de stdin");

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🛰  SENTINELA MONITOR");
    println!("══════════════════════════════════════════════");
    println!("  Porta:          {}", monitor_cfg.port);
    println!("  Comandos para:  <cliente>:{}", monitor_cfg.client_command_port);
    println!("  Limiar impacto: {:.1} m/s²", monitor_cfg.impact_threshold);
    println!("══════════════════════════════════════════════");
    println!();

    let mut station = Station::new(monitor_cfg, commands);
    let shutdown = shutdown_signal();

    // ── Loop principal ──
    loop {
        select! {
            recv(shutdown) -> _ => {
                info!("Ctrl+C recebido");
                break;
            }
            recv(frames) -> msg => match msg {
                Ok(msg) => station.on_frame(msg, Instant::now()),
                Err(_) => {
                    error!("Thread de rede encerrada");
                    break;
                }
            },
            recv(lines) -> line => match line {
                Ok(line) if line.trim() == "sair" => break,
                Ok(line) => station.on_operator(&line, Instant::now()),
                // stdin fechado: segue só com a rede
                Err(_) => lines = never(),
            },
            default(TICK) => station.check_connection(Instant::now()),
        }
    }

    info!("Encerrado");
}

/// Canal que recebe uma mensagem a cada Ctrl+C.
fn shutdown_signal() -> Receiver<()> {
    let (tx, rx) = bounded::<()>(1);
    match ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    }) {
        Ok(()) => rx,
        Err(e) => {
            warn!("Não foi possível instalar o handler de Ctrl+C: {e}");
            never()
        }
    }
}
