//! Máquina de estados de alerta – SOS, confirmação remota e falso alarme.
//!
//! Duas facetas no mesmo registro, protegidas pelo mesmo lock:
//! - [`SosState`]: vai no fio em todo frame
//! - [`AlarmPresentation`]: o alarme visível, renderizado pelo shell
//!
//! Os resets automáticos para `Idle` rodam numa thread própria. Só existe um
//! reset pendente por vez: cada novo agendamento incrementa a geração e o
//! anterior vira no-op.
//!
//! As notificações chegam ao [`NotificationSink`] na mesma ordem das
//! transições. O sink não deve chamar de volta a máquina.

use crate::types::SosState;
use crossbeam_channel::{Receiver, Sender, after, never, select, unbounded};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::protocol::Command;

/// Alarme apresentado ao usuário (UI do shell).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlarmPresentation {
    #[default]
    None,
    Shown,
}

/// Destino das notificações ao usuário. O núcleo nunca desenha UI.
pub trait NotificationSink: Send + Sync {
    /// Mostrar o alarme de queda.
    fn present_alarm(&self);
    /// Fechar o alarme de queda.
    fn dismiss_alarm(&self);
    /// Vibração com a duração pedida.
    fn haptic(&self, _duration: Duration) {}
}

/// Durações da máquina de estados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTimings {
    /// Tempo que o SOS fica ativo antes de voltar a `Idle`
    pub sos_hold: Duration,
    /// Tempo de `FalseAlarmCooldown` antes de voltar a `Idle`
    pub false_alarm_cooldown: Duration,
    pub alarm_haptic: Duration,
    pub sos_haptic: Duration,
}

impl Default for AlertTimings {
    fn default() -> Self {
        Self {
            sos_hold: Duration::from_millis(5000),
            false_alarm_cooldown: Duration::from_millis(2000),
            alarm_haptic: Duration::from_millis(800),
            sos_haptic: Duration::from_millis(500),
        }
    }
}

/// Registro de estado protegido pelo lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub sos: SosState,
    pub presentation: AlarmPresentation,
    /// Geração do reset pendente, se houver
    pending_reset: Option<u64>,
    generation: u64,
}

/// Efeitos de uma transição, aplicados fora do lock.
#[derive(Debug, Default, PartialEq, Eq)]
struct Effects {
    present: bool,
    dismiss: bool,
    haptic: Option<Duration>,
    arm: Option<(u64, Duration)>,
}

impl AlertState {
    pub fn has_pending_reset(&self) -> bool {
        self.pending_reset.is_some()
    }

    fn remote_command(&mut self, command: Command, timings: &AlertTimings) -> Effects {
        match command {
            Command::Alert => {
                if self.sos == SosState::SosActive {
                    debug!("ALERT ignorado: SOS já ativo");
                    return Effects::default();
                }
                if self.presentation == AlarmPresentation::Shown {
                    debug!("ALERT repetido: alarme já visível");
                    return Effects::default();
                }
                self.presentation = AlarmPresentation::Shown;
                Effects {
                    present: true,
                    haptic: Some(timings.alarm_haptic),
                    ..Default::default()
                }
            }
            Command::Safe => self.dismiss(),
        }
    }

    fn dismiss(&mut self) -> Effects {
        let shown = self.presentation == AlarmPresentation::Shown;
        self.presentation = AlarmPresentation::None;
        Effects {
            dismiss: shown,
            ..Default::default()
        }
    }

    fn user_false_alarm(&mut self, timings: &AlertTimings) -> Effects {
        self.sos = SosState::FalseAlarmCooldown;
        let mut effects = self.dismiss();
        effects.arm = Some((self.arm_reset(), timings.false_alarm_cooldown));
        effects
    }

    fn user_trigger_sos(&mut self, timings: &AlertTimings) -> Effects {
        self.sos = SosState::SosActive;
        let mut effects = self.dismiss();
        effects.haptic = Some(timings.sos_haptic);
        effects.arm = Some((self.arm_reset(), timings.sos_hold));
        effects
    }

    /// Substitui qualquer reset pendente e retorna a nova geração.
    fn arm_reset(&mut self) -> u64 {
        self.generation += 1;
        self.pending_reset = Some(self.generation);
        self.generation
    }

    /// Executa o reset se `generation` ainda for o pendente.
    fn fire_reset(&mut self, generation: u64) -> bool {
        if self.pending_reset != Some(generation) {
            return false;
        }
        self.pending_reset = None;
        self.sos = SosState::Idle;
        true
    }
}

// ──────────────────────────────────────────────
// Máquina de estados compartilhada
// ──────────────────────────────────────────────

struct Shared {
    state: Mutex<AlertState>,
    /// Serializa a entrega dos efeitos; sempre tomado depois de `state`
    delivery: Mutex<()>,
    timings: AlertTimings,
    sink: Arc<dyn NotificationSink>,
    timer_tx: Sender<TimerMsg>,
}

enum TimerMsg {
    Arm { generation: u64, due: Instant },
}

/// Handle clonável da máquina de estados de alerta.
#[derive(Clone)]
pub struct AlertStateMachine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AlertStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertStateMachine")
            .field("state", &self.state())
            .field("timings", &self.shared.timings)
            .finish()
    }
}

impl AlertStateMachine {
    /// Cria a máquina em `Idle` e inicia a thread de timers.
    pub fn new(timings: AlertTimings, sink: Arc<dyn NotificationSink>) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let (timer_tx, timer_rx) = unbounded();
            let weak = weak.clone();
            std::thread::Builder::new()
                .name("alert-timer".into())
                .spawn(move || timer_loop(&timer_rx, &weak))
                .expect("Falha ao criar thread de timers");
            Shared {
                state: Mutex::new(AlertState::default()),
                delivery: Mutex::new(()),
                timings,
                sink,
                timer_tx,
            }
        });
        Self { shared }
    }

    /// Cópia consistente do estado atual.
    pub fn state(&self) -> AlertState {
        *self.shared.lock()
    }

    /// Estado usado na montagem dos frames.
    pub fn sos_state(&self) -> SosState {
        self.shared.lock().sos
    }

    pub fn presentation(&self) -> AlarmPresentation {
        self.shared.lock().presentation
    }

    /// Comando recebido do monitor.
    pub fn on_remote_command(&self, command: Command) {
        self.shared.transition(|s, t| s.remote_command(command, t));
    }

    /// Usuário confirmou que o alerta de queda foi um falso positivo.
    pub fn on_user_false_alarm(&self) {
        info!("Falso alarme confirmado pelo usuário");
        self.shared.transition(|s, t| s.user_false_alarm(t));
    }

    /// Botão de SOS manual. Vale em qualquer estado.
    pub fn on_user_trigger_sos(&self) {
        info!("🆘 SOS acionado pelo usuário");
        self.shared.transition(|s, t| s.user_trigger_sos(t));
    }

    /// Fecha o alarme visível, se houver (usado no `stop()` da sessão).
    pub fn dismiss_presentation(&self) {
        self.shared.transition(|s, _| s.dismiss());
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, f: impl FnOnce(&mut AlertState, &AlertTimings) -> Effects) {
        let (effects, _delivery) = {
            let mut state = self.lock();
            let effects = f(&mut state, &self.timings);
            // Agendado com o lock para preservar a ordem das gerações
            if let Some((generation, delay)) = effects.arm {
                let due = Instant::now() + delay;
                let _ = self.timer_tx.send(TimerMsg::Arm { generation, due });
            }
            // A vez na entrega é pega antes de soltar o estado
            let delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
            (effects, delivery)
        };

        if effects.present {
            info!("⚠️ Alarme de queda apresentado");
            self.sink.present_alarm();
        }
        if effects.dismiss {
            info!("Alarme de queda dispensado");
            self.sink.dismiss_alarm();
        }
        if let Some(duration) = effects.haptic {
            self.sink.haptic(duration);
        }
    }

    fn fire_reset(&self, generation: u64) {
        let mut state = self.lock();
        let previous = state.sos;
        if state.fire_reset(generation) {
            info!("Reset automático: {previous:?} → Idle");
        }
    }
}

/// Mantém no máximo um prazo pendente; um `Arm` novo substitui o anterior.
fn timer_loop(rx: &Receiver<TimerMsg>, shared: &Weak<Shared>) {
    let mut pending: Option<(u64, Instant)> = None;
    loop {
        let timeout = match pending {
            Some((_, due)) => after(due.saturating_duration_since(Instant::now())),
            None => never(),
        };
        select! {
            recv(rx) -> msg => match msg {
                Ok(TimerMsg::Arm { generation, due }) => pending = Some((generation, due)),
                Err(_) => return,
            },
            recv(timeout) -> _ => {
                if let Some((generation, _)) = pending.take() {
                    match shared.upgrade() {
                        Some(shared) => shared.fire_reset(generation),
                        None => return,
                    }
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        presented: AtomicUsize,
        dismissed: AtomicUsize,
        haptics: Mutex<Vec<Duration>>,
    }

    impl NotificationSink for RecordingSink {
        fn present_alarm(&self) {
            self.presented.fetch_add(1, Ordering::SeqCst);
        }
        fn dismiss_alarm(&self) {
            self.dismissed.fetch_add(1, Ordering::SeqCst);
        }
        fn haptic(&self, duration: Duration) {
            self.haptics.lock().unwrap().push(duration);
        }
    }

    fn machine(timings: AlertTimings) -> (AlertStateMachine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (AlertStateMachine::new(timings, sink.clone()), sink)
    }

    fn fast_timings(hold_ms: u64, cooldown_ms: u64) -> AlertTimings {
        AlertTimings {
            sos_hold: Duration::from_millis(hold_ms),
            false_alarm_cooldown: Duration::from_millis(cooldown_ms),
            ..Default::default()
        }
    }

    fn wait_for(m: &AlertStateMachine, expected: SosState, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if m.sos_state() == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        m.sos_state() == expected
    }

    // ── Transições puras ──

    #[test]
    fn initial_state_is_idle() {
        let s = AlertState::default();
        assert_eq!(s.sos, SosState::Idle);
        assert_eq!(s.presentation, AlarmPresentation::None);
        assert!(!s.has_pending_reset());
    }

    #[test]
    fn alert_presents_without_touching_sos() {
        let t = AlertTimings::default();
        let mut s = AlertState::default();
        let fx = s.remote_command(Command::Alert, &t);
        assert!(fx.present);
        assert_eq!(fx.haptic, Some(t.alarm_haptic));
        assert_eq!(s.sos, SosState::Idle);
        assert_eq!(s.presentation, AlarmPresentation::Shown);

        let again = s.remote_command(Command::Alert, &t);
        assert_eq!(again, Effects::default());
    }

    #[test]
    fn alert_ignored_while_sos_active() {
        let t = AlertTimings::default();
        let mut s = AlertState::default();
        s.user_trigger_sos(&t);
        assert_eq!(s.remote_command(Command::Alert, &t), Effects::default());
        assert_eq!(s.presentation, AlarmPresentation::None);
    }

    #[test]
    fn safe_without_alarm_is_noop() {
        let t = AlertTimings::default();
        let mut s = AlertState::default();
        let before = s;
        assert_eq!(s.remote_command(Command::Safe, &t), Effects::default());
        assert_eq!(s, before);
    }

    #[test]
    fn safe_keeps_sos_state() {
        let t = AlertTimings::default();
        let mut s = AlertState::default();
        s.remote_command(Command::Alert, &t);
        s.user_false_alarm(&t);
        s.remote_command(Command::Alert, &t);
        let fx = s.remote_command(Command::Safe, &t);
        assert!(fx.dismiss);
        assert_eq!(s.sos, SosState::FalseAlarmCooldown);
    }

    #[test]
    fn newer_reset_supersedes_older() {
        let t = AlertTimings::default();
        let mut s = AlertState::default();
        let (first, hold) = s.user_trigger_sos(&t).arm.unwrap();
        assert_eq!(hold, t.sos_hold);
        let (second, cooldown) = s.user_false_alarm(&t).arm.unwrap();
        assert_eq!(cooldown, t.false_alarm_cooldown);
        assert!(!s.fire_reset(first));
        assert_eq!(s.sos, SosState::FalseAlarmCooldown);
        assert!(s.fire_reset(second));
        assert_eq!(s.sos, SosState::Idle);
        assert!(!s.fire_reset(second));
    }

    #[test]
    fn sos_overrides_cooldown_and_closes_alarm() {
        let t = AlertTimings::default();
        let mut s = AlertState::default();
        s.user_false_alarm(&t);
        s.remote_command(Command::Alert, &t);
        let fx = s.user_trigger_sos(&t);
        assert!(fx.dismiss);
        assert_eq!(fx.haptic, Some(t.sos_haptic));
        assert_eq!(s.sos, SosState::SosActive);
        assert_eq!(s.presentation, AlarmPresentation::None);
    }

    // ── Máquina com timers reais ──

    #[test]
    fn duplicate_alert_presents_once() {
        let (m, sink) = machine(AlertTimings::default());
        m.on_remote_command(Command::Alert);
        m.on_remote_command(Command::Alert);
        assert_eq!(sink.presented.load(Ordering::SeqCst), 1);
        assert_eq!(*sink.haptics.lock().unwrap(), vec![Duration::from_millis(800)]);

        m.on_remote_command(Command::Safe);
        m.on_remote_command(Command::Safe);
        assert_eq!(sink.dismissed.load(Ordering::SeqCst), 1);

        m.on_remote_command(Command::Alert);
        assert_eq!(sink.presented.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sos_resets_to_idle_after_hold() {
        let (m, _sink) = machine(fast_timings(60, 60));
        m.on_user_trigger_sos();
        assert_eq!(m.sos_state(), SosState::SosActive);
        assert!(wait_for(&m, SosState::Idle, Duration::from_secs(2)));
        assert!(!m.state().has_pending_reset());
    }

    #[test]
    fn false_alarm_overrides_pending_sos_reset() {
        let (m, sink) = machine(fast_timings(50, 500));
        m.on_user_trigger_sos();
        m.on_user_false_alarm();
        assert_eq!(m.sos_state(), SosState::FalseAlarmCooldown);

        // O reset do SOS (50 ms) foi substituído
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(m.sos_state(), SosState::FalseAlarmCooldown);

        assert!(wait_for(&m, SosState::Idle, Duration::from_secs(3)));
        assert_eq!(sink.dismissed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn false_alarm_dismisses_shown_alarm() {
        let (m, sink) = machine(AlertTimings::default());
        m.on_remote_command(Command::Alert);
        m.on_user_false_alarm();
        assert_eq!(m.presentation(), AlarmPresentation::None);
        assert_eq!(sink.dismissed.load(Ordering::SeqCst), 1);
    }

    /// Sink lento para apresentar; registra o que o shell está mostrando.
    #[derive(Default)]
    struct SlowShell {
        shown: Mutex<bool>,
    }

    impl NotificationSink for SlowShell {
        fn present_alarm(&self) {
            std::thread::sleep(Duration::from_millis(100));
            *self.shown.lock().unwrap() = true;
        }
        fn dismiss_alarm(&self) {
            *self.shown.lock().unwrap() = false;
        }
    }

    #[test]
    fn notifications_follow_transition_order() {
        let shell = Arc::new(SlowShell::default());
        let m = AlertStateMachine::new(AlertTimings::default(), shell.clone());

        let receiver = {
            let m = m.clone();
            std::thread::spawn(move || m.on_remote_command(Command::Alert))
        };
        std::thread::sleep(Duration::from_millis(20));
        m.on_user_false_alarm();
        receiver.join().unwrap();
        m.on_remote_command(Command::Safe);

        assert_eq!(m.presentation(), AlarmPresentation::None);
        assert!(!*shell.shown.lock().unwrap());
    }

    #[test]
    fn concurrent_reads_see_valid_states() {
        let (m, _sink) = machine(fast_timings(1, 1));
        let writer = {
            let m = m.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    if i % 2 == 0 {
                        m.on_user_trigger_sos();
                    } else {
                        m.on_user_false_alarm();
                    }
                }
            })
        };
        for _ in 0..2000 {
            let code = m.sos_state().code();
            assert!(code <= 2);
        }
        writer.join().unwrap();
    }
}
