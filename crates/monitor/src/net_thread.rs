//! Thread de rede que escuta UDP e envia frames para o loop principal via
//! channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use sentinela_core::protocol::{MAX_DATAGRAM, decode_frame};
use sentinela_core::types::TelemetryFrame;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, error, info, warn};

/// Mensagem enviada da thread de rede para o loop principal.
#[derive(Debug, Clone)]
pub struct NetMessage {
    pub frame: TelemetryFrame,
    pub source: SocketAddr,
    pub raw_size: usize,
}

/// Inicia a thread de rede. Retorna o receiver do channel.
pub fn spawn_receiver_thread(port: u16) -> Receiver<NetMessage> {
    let (tx, rx) = bounded::<NetMessage>(256);

    std::thread::Builder::new()
        .name("udp-receiver".into())
        .spawn(move || {
            receiver_loop(&tx, port);
        })
        .expect("Falha ao criar thread de rede");

    rx
}

fn receiver_loop(tx: &Sender<NetMessage>, port: u16) {
    loop {
        match UdpSocket::bind(format!("0.0.0.0:{port}")) {
            Ok(sock) => {
                sock.set_read_timeout(Some(std::time::Duration::from_secs(1)))
                    .ok();
                info!("Monitor escutando em 0.0.0.0:{port}");

                if !forward_frames(&sock, tx) {
                    info!("Loop principal encerrado, parando thread de rede");
                    return;
                }
            }
            Err(e) => {
                error!("Falha ao bind porta {port}: {e}. Tentando novamente em 2s...");
                std::thread::sleep(std::time::Duration::from_secs(2));
            }
        }
    }
}

/// Recebe e repassa frames até o outro lado do channel sumir.
fn forward_frames(sock: &UdpSocket, tx: &Sender<NetMessage>) -> bool {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match sock.recv_from(&mut buf) {
            Ok((size, source)) => match decode_frame(&buf[..size]) {
                Ok(frame) => {
                    let msg = NetMessage {
                        frame,
                        source,
                        raw_size: size,
                    };
                    // Non-blocking send: se o loop está lento, descarta
                    match tx.try_send(msg) {
                        Ok(()) => {}
                        Err(crossbeam_channel::TrySendError::Full(_)) => {
                            debug!("Channel cheio, descartando frame");
                        }
                        Err(crossbeam_channel::TrySendError::Disconnected(_)) => return false,
                    }
                }
                Err(e) => {
                    debug!("Pacote inválido de {source}: {e}");
                }
            },
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // Timeout normal, continua
            }
            Err(e) => {
                warn!("Erro ao receber UDP: {e}");
            }
        }
    }
}
