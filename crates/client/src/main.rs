//! # Sentinela Client
//!
//! Shell de demonstração do dispositivo monitorado: alimenta a sessão com
//! sensores sintéticos, envia telemetria via UDP e reage aos comandos do
//! monitor.
//!
//! ## Uso
//! ```bash
//! sentinela_client                              # destino do config.toml
//! sentinela_client --host 192.168.0.10 --port 5555
//! ```
//!
//! ## Comandos (stdin)
//! - `sos` – SOS manual
//! - `falso` – confirmar falso alarme
//! - `parar` / `iniciar` – parar/iniciar a sessão
//! - `status` – estado atual
//! - `sair` – encerrar (Ctrl+C também)

mod demo;

use crossbeam_channel::{Receiver, bounded, never, select, unbounded};
use demo::{ConsoleNotifier, FixedLocation, SyntheticSensors};
use sentinela_client::{Collaborators, Session};
use sentinela_core::config::AppConfig;
use sentinela_core::{Endpoint, GeoFix, LocationSource};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Posição usada pelo provedor de demonstração.
const DEMO_LOCATION: (f64, f64) = (-23.550520, -46.633308);

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let endpoint = endpoint_from_args(&config.client.endpoint());

    // ── Sessão ──
    let (lat, lon) = DEMO_LOCATION;
    let collaborators = Collaborators {
        battery: Arc::new(|| 100),
        location: Arc::new(FixedLocation { lat, lon }),
        notifier: Arc::new(ConsoleNotifier),
    };
    let session = Arc::new(Session::new(config.client.clone(), collaborators));

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🛡  SENTINELA CLIENT");
    println!("══════════════════════════════════════════════");
    println!("  Destino:   {endpoint}");
    println!("  Comandos:  porta {}", config.client.listen_port);
    println!("  Intervalo: {} ms", config.client.min_send_interval_ms);
    println!("══════════════════════════════════════════════");
    println!();

    start_session(&session, &endpoint, &mut config, &config_path);

    let _sensors = SyntheticSensors::spawn(
        session.clone(),
        config.client.demo_rate_hz,
        GeoFix::new(lat, lon, LocationSource::Gps),
    );

    // ── Encerramento ──
    let shutdown = shutdown_signal();
    let mut lines = stdin_lines();

    // ── Loop de comandos do usuário ──
    loop {
        select! {
            recv(shutdown) -> _ => {
                info!("Ctrl+C recebido");
                break;
            }
            recv(lines) -> line => match line {
                Ok(line) => {
                    if !handle_command(line.trim(), &session, &mut config, &config_path) {
                        break;
                    }
                }
                Err(_) => {
                    info!("stdin fechado; enviando até Ctrl+C");
                    lines = never();
                }
            },
        }
    }

    session.stop();
    info!("Encerrado");
}

/// Executa um comando do usuário. Retorna `false` para encerrar.
fn handle_command(command: &str, session: &Session, config: &mut AppConfig, path: &Path) -> bool {
    match command {
        "sos" => session.trigger_sos(),
        "falso" => session.confirm_false_alarm(),
        "parar" => session.stop(),
        "iniciar" => {
            let endpoint = session.endpoint();
            start_session(session, &endpoint, config, path);
        }
        "status" => {
            let state = session.alerts().state();
            info!(
                "Rodando: {} | SOS: {:?} | Alarme: {:?} | Posição: {}",
                session.is_running(),
                state.sos,
                state.presentation,
                session.location().source.as_str()
            );
        }
        "sair" => return false,
        "" => {}
        other => warn!("Comando desconhecido: {other}"),
    }
    true
}

/// Linhas do stdin lidas numa thread própria.
fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .expect("Falha ao criar thread de stdin");
    rx
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

/// `--host`/`--port` sobrescrevem o destino salvo. Porta inválida → 5555.
fn endpoint_from_args(saved: &Endpoint) -> Endpoint {
    let args: Vec<String> = std::env::args().collect();
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let host = value_of("--host").unwrap_or_else(|| saved.host.clone());
    let port = value_of("--port").unwrap_or_else(|| saved.port.to_string());
    Endpoint::from_input(&host, &port)
}

/// Inicia a sessão e, se der certo, persiste o destino usado.
fn start_session(session: &Session, endpoint: &Endpoint, config: &mut AppConfig, path: &Path) {
    match session.start(endpoint.clone()) {
        Ok(()) => {
            config.client.dest_ip = endpoint.host.clone();
            config.client.dest_port = endpoint.port;
            if let Err(e) = config.save(path) {
                warn!("Não foi possível salvar o destino: {e}");
            }
        }
        Err(e) => error!("Falha ao iniciar: {e}"),
    }
}
