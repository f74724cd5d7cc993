//! Limitador de taxa dirigido por eventos.
//!
//! Avaliado uma vez por leitura de sensor: ou envia o snapshot atual, ou
//! não envia nada. Não há timer próprio nem fila de leituras puladas.

use std::time::{Duration, Instant};

/// Intervalo mínimo padrão entre envios (50 envios/s no máximo).
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(20);

/// Decide se um envio deve acontecer agora.
#[derive(Debug, Clone)]
pub struct SendGate {
    min_interval: Duration,
    last_send: Option<Instant>,
}

impl Default for SendGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl SendGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Retorna `true` e registra `now` se a sessão está ativa e já passou
    /// `min_interval` desde o último envio. Caso contrário não altera nada.
    pub fn should_send(&mut self, now: Instant, active: bool) -> bool {
        if !active {
            return false;
        }
        let due = match self.last_send {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if due {
            self.last_send = Some(now);
        }
        due
    }

    /// Esquece o último envio (nova sessão).
    pub fn reset(&mut self) {
        self.last_send = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_reading_sends() {
        let mut gate = SendGate::default();
        assert!(gate.should_send(Instant::now(), true));
    }

    #[test]
    fn inactive_session_never_sends() {
        let mut gate = SendGate::default();
        let t0 = Instant::now();
        assert!(!gate.should_send(t0, false));
        // Sem efeito colateral: o próximo envio ativo ainda passa
        assert!(gate.should_send(t0, true));
    }

    #[test]
    fn readings_inside_interval_are_skipped() {
        let mut gate = SendGate::new(ms(20));
        let t0 = Instant::now();
        assert!(gate.should_send(t0, true));
        assert!(!gate.should_send(t0 + ms(5), true));
        assert!(!gate.should_send(t0 + ms(19), true));
        assert!(gate.should_send(t0 + ms(20), true));
        assert!(!gate.should_send(t0 + ms(39), true));
        assert!(gate.should_send(t0 + ms(40), true));
    }

    #[test]
    fn slow_sensors_send_at_native_rate() {
        let mut gate = SendGate::new(ms(20));
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(gate.should_send(t0 + ms(i * 100), true));
        }
    }

    #[test]
    fn no_two_sends_closer_than_interval() {
        let mut gate = SendGate::new(ms(20));
        let t0 = Instant::now();
        let mut sent = Vec::new();
        // Chegadas irregulares, estritamente crescentes
        let mut t = 0u64;
        for step in [1u64, 3, 7, 2, 11, 19, 1, 25, 4, 4, 4, 4, 4, 30, 9, 13] {
            t += step;
            let now = t0 + ms(t);
            if gate.should_send(now, true) {
                sent.push(now);
            }
        }
        assert!(sent.len() > 1);
        for pair in sent.windows(2) {
            assert!(pair[1] - pair[0] >= ms(20));
        }
    }

    #[test]
    fn reset_allows_immediate_send() {
        let mut gate = SendGate::new(ms(20));
        let t0 = Instant::now();
        assert!(gate.should_send(t0, true));
        gate.reset();
        assert!(gate.should_send(t0 + ms(1), true));
    }
}
