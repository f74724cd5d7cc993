//! Envio de frames via UDP, best-effort.
//!
//! O caminho dos sensores só enfileira o frame (`try_send`); uma thread
//! dedicada resolve o host, codifica e transmite. Fila cheia ou erro de
//! rede descartam o frame sem avisar ninguém além do log de debug.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use sentinela_core::{Endpoint, TelemetryFrame, encode_frame};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Frames aguardando envio antes de começar a descartar.
const QUEUE_DEPTH: usize = 64;

/// Intervalo mínimo entre tentativas de resolver um host que falhou.
const RESOLVE_RETRY: Duration = Duration::from_secs(1);

/// Lado de envio da sessão.
pub struct OutboundLink {
    tx: Option<Sender<TelemetryFrame>>,
    worker: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl OutboundLink {
    /// Abre o socket de envio. Diferente do envio, falhar aqui é um erro.
    pub fn open(bind_addr: &str, endpoint: Endpoint) -> io::Result<Self> {
        let sock = UdpSocket::bind(bind_addr)?;
        if endpoint.host == "255.255.255.255" {
            sock.set_broadcast(true)?;
            info!("Modo BROADCAST ativado");
        }
        let local_addr = sock.local_addr()?;

        let (tx, rx) = bounded::<TelemetryFrame>(QUEUE_DEPTH);
        let worker = std::thread::Builder::new()
            .name("udp-sender".into())
            .spawn(move || sender_loop(&sock, &rx, &endpoint))?;

        info!("Socket de envio aberto em {local_addr}");
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Enfileira um frame. Nunca bloqueia e nunca falha para o chamador.
    pub fn send(&self, frame: TelemetryFrame) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Fila de envio cheia, descartando frame"),
            Err(TrySendError::Disconnected(_)) => debug!("Worker de envio encerrado"),
        }
    }

    /// Fecha o canal e espera a thread liberar o socket. Idempotente.
    pub fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            debug!("Socket de envio liberado");
        }
    }
}

impl Drop for OutboundLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn sender_loop(sock: &UdpSocket, rx: &Receiver<TelemetryFrame>, endpoint: &Endpoint) {
    let mut target: Option<SocketAddr> = None;
    let mut last_attempt: Option<Instant> = None;

    for frame in rx.iter() {
        // Host vazio: nada a enviar
        if endpoint.host.is_empty() {
            continue;
        }

        let addr = match target {
            Some(addr) => addr,
            None => {
                if last_attempt.is_some_and(|t| t.elapsed() < RESOLVE_RETRY) {
                    continue;
                }
                last_attempt = Some(Instant::now());
                match resolve(endpoint) {
                    Ok(addr) => {
                        info!("Destino {endpoint} → {addr}");
                        target = Some(addr);
                        addr
                    }
                    Err(e) => {
                        debug!("Não foi possível resolver {endpoint}: {e}");
                        continue;
                    }
                }
            }
        };

        let bytes = encode_frame(&frame);
        match sock.send_to(&bytes, addr) {
            Ok(sent) => trace!("→ {sent} bytes para {addr}"),
            Err(e) => debug!("Erro ao enviar UDP: {e}"),
        }
    }
}

/// Resolve o endpoint preferindo IPv4 (o socket é IPv4).
fn resolve(endpoint: &Endpoint) -> io::Result<SocketAddr> {
    (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "nenhum endereço IPv4"))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
