//! Thread de rede que escuta comandos do monitor e alimenta a máquina de
//! estados de alerta.
//!
//! O socket usa timeout de leitura curto; no `close()` a flag de parada é
//! ligada e um datagrama vazio acorda o `recv_from` na hora.

use sentinela_core::AlertStateMachine;
use sentinela_core::protocol::{Command, MAX_DATAGRAM};
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Pausa após um erro de recepção, para não girar em falso.
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Lado de recepção da sessão.
pub struct InboundListener {
    stop: Arc<AtomicBool>,
    local_addr: SocketAddr,
    worker: Option<JoinHandle<()>>,
}

impl InboundListener {
    /// Faz bind em `0.0.0.0:port` e inicia o loop de recepção.
    pub fn bind(port: u16, alerts: AlertStateMachine) -> io::Result<Self> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        sock.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = sock.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let worker = std::thread::Builder::new()
            .name("udp-commands".into())
            .spawn(move || receive_loop(&sock, &flag, &alerts))?;

        info!("Escutando comandos em {local_addr}");
        Ok(Self {
            stop,
            local_addr,
            worker: Some(worker),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Encerra o loop e libera a porta. Idempotente.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else { return };
        self.stop.store(true, Ordering::Release);
        self.wake();
        let _ = worker.join();
        debug!("Porta de comandos {} liberada", self.local_addr.port());
    }

    /// Datagrama vazio para desbloquear o `recv_from`; se falhar, o timeout
    /// de leitura cobre.
    fn wake(&self) {
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_addr.port()));
        if let Ok(sock) = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)) {
            let _ = sock.send_to(&[], target);
        }
    }
}

impl Drop for InboundListener {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(sock: &UdpSocket, stop: &AtomicBool, alerts: &AlertStateMachine) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while !stop.load(Ordering::Acquire) {
        match sock.recv_from(&mut buf) {
            Ok((size, addr)) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                match Command::parse(&buf[..size]) {
                    Some(command) => {
                        info!("← {} de {addr}", command.as_str());
                        alerts.on_remote_command(command);
                    }
                    None => debug!("Ignorando datagrama de {addr} ({size} bytes)"),
                }
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                // Timeout normal, continua
            }
            Err(e) => {
                warn!("Erro ao receber UDP: {e}");
                std::thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!("Loop de comandos encerrado");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinela_core::{AlarmPresentation, AlertTimings, NotificationSink};
    use std::time::Instant;

    struct NullSink;

    impl NotificationSink for NullSink {
        fn present_alarm(&self) {}
        fn dismiss_alarm(&self) {}
    }

    fn send_to(addr: SocketAddr, payload: &[u8]) {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port()));
        sock.send_to(payload, target).unwrap();
    }

    fn wait_presentation(alerts: &AlertStateMachine, expected: AlarmPresentation) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if alerts.presentation() == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn commands_reach_state_machine() {
        let alerts = AlertStateMachine::new(AlertTimings::default(), Arc::new(NullSink));
        let mut listener = InboundListener::bind(0, alerts.clone()).unwrap();

        send_to(listener.local_addr(), b"ALERT\n");
        assert!(wait_presentation(&alerts, AlarmPresentation::Shown));

        send_to(listener.local_addr(), b"SAFE");
        assert!(wait_presentation(&alerts, AlarmPresentation::None));
        listener.close();
    }

    #[test]
    fn unknown_payloads_are_ignored() {
        let alerts = AlertStateMachine::new(AlertTimings::default(), Arc::new(NullSink));
        let mut listener = InboundListener::bind(0, alerts.clone()).unwrap();
        send_to(listener.local_addr(), b"alert");
        send_to(listener.local_addr(), b"0.1,0.2");
        send_to(listener.local_addr(), &[0xFF, 0x00]);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(alerts.presentation(), AlarmPresentation::None);
        listener.close();
    }

    #[test]
    fn close_releases_port_quickly() {
        let alerts = AlertStateMachine::new(AlertTimings::default(), Arc::new(NullSink));
        let mut listener = InboundListener::bind(0, alerts).unwrap();
        let port = listener.local_addr().port();

        let started = Instant::now();
        listener.close();
        listener.close();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok());
    }
}
