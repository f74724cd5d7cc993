//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável, com as tabelas `[client]`
//! e `[monitor]`.

use crate::alerts::AlertTimings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Porta usada quando o texto digitado não é uma porta válida.
pub const DEFAULT_DEST_PORT: u16 = 5555;

/// Porta fixa onde o cliente escuta comandos.
pub const DEFAULT_LISTEN_PORT: u16 = 5556;

/// Erros de persistência da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de E/S em {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro de serialização: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Destino dos frames de telemetria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host ou IP, resolvido só no envio
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Monta o endpoint a partir do texto digitado. Porta inválida (ou 0)
    /// vira [`DEFAULT_DEST_PORT`]; o host é mantido como veio.
    pub fn from_input(host: &str, port: &str) -> Self {
        let port = port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_DEST_PORT);
        Self::new(host.trim(), port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuração do Cliente (dispositivo monitorado).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// IP/host do monitor (último usado)
    pub dest_ip: String,
    /// Porta UDP do monitor
    pub dest_port: u16,
    /// IP local para bind do socket de envio (vazio = 0.0.0.0)
    pub bind_ip: String,
    /// Porta local de comandos (0 = efêmera)
    pub listen_port: u16,
    /// Intervalo mínimo entre envios (ms)
    pub min_send_interval_ms: u64,
    /// Duração do SOS antes do reset automático (ms)
    pub sos_hold_ms: u64,
    /// Duração do cooldown de falso alarme (ms)
    pub false_alarm_cooldown_ms: u64,
    /// Vibração ao apresentar o alarme de queda (ms)
    pub alarm_haptic_ms: u64,
    /// Vibração ao acionar o SOS (ms)
    pub sos_haptic_ms: u64,
    /// Taxa do sensor sintético do shell de demonstração (Hz)
    pub demo_rate_hz: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dest_ip: "192.168.".into(),
            dest_port: DEFAULT_DEST_PORT,
            bind_ip: String::new(),
            listen_port: DEFAULT_LISTEN_PORT,
            min_send_interval_ms: 20,
            sos_hold_ms: 5000,
            false_alarm_cooldown_ms: 2000,
            alarm_haptic_ms: 800,
            sos_haptic_ms: 500,
            demo_rate_hz: 50,
        }
    }
}

impl ClientConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.dest_ip.clone(), self.dest_port)
    }

    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }

    pub fn alert_timings(&self) -> AlertTimings {
        AlertTimings {
            sos_hold: Duration::from_millis(self.sos_hold_ms),
            false_alarm_cooldown: Duration::from_millis(self.false_alarm_cooldown_ms),
            alarm_haptic: Duration::from_millis(self.alarm_haptic_ms),
            sos_haptic: Duration::from_millis(self.sos_haptic_ms),
        }
    }

    /// Endereço de bind do socket de envio.
    pub fn outbound_bind_addr(&self) -> String {
        if self.bind_ip.is_empty() {
            "0.0.0.0:0".to_string()
        } else {
            format!("{}:0", self.bind_ip)
        }
    }
}

/// Configuração do Monitor (estação que recebe a telemetria).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Porta UDP para escutar frames
    pub port: u16,
    /// Porta de comandos do cliente
    pub client_command_port: u16,
    /// SVM acima disso indica impacto (m/s²)
    pub impact_threshold: f32,
    /// Tempo mínimo no estado normal antes de aceitar novo impacto (s)
    pub rearm_secs: f64,
    /// Intervalo entre ALERTs repetidos durante um impacto (s)
    pub realert_secs: f64,
    /// Ruído de processo do filtro de Kalman
    pub process_noise: f32,
    /// Ruído de medição do filtro de Kalman
    pub measurement_noise: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DEST_PORT,
            client_command_port: DEFAULT_LISTEN_PORT,
            impact_threshold: 25.0,
            rearm_secs: 2.0,
            realert_secs: 3.0,
            process_noise: 1e-4,
            measurement_noise: 5e-2,
        }
    }
}

/// Configuração raiz do aplicativo (unifica cliente e monitor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let c = &self.client;

        if c.dest_port == 0 {
            errors.push("Porta de destino do cliente não pode ser 0".into());
        }
        if c.min_send_interval_ms == 0 || c.min_send_interval_ms > 10_000 {
            errors.push(format!(
                "Intervalo mínimo de envio inválido: {} ms (1–10000)",
                c.min_send_interval_ms
            ));
        }
        if c.sos_hold_ms == 0 || c.false_alarm_cooldown_ms == 0 {
            errors.push("Durações de SOS/cooldown devem ser maiores que 0".into());
        }
        if c.demo_rate_hz == 0 {
            errors.push("Taxa do sensor de demonstração não pode ser 0".into());
        }
        if self.monitor.port == 0 {
            errors.push("Porta do monitor não pode ser 0".into());
        }
        if self.monitor.client_command_port == 0 {
            errors.push("Porta de comandos do cliente não pode ser 0".into());
        }
        let threshold = self.monitor.impact_threshold;
        if threshold.is_nan() || threshold <= 0.0 {
            errors.push(format!(
                "Limiar de impacto inválido: {threshold}"
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.client.dest_port, parsed.client.dest_port);
        assert_eq!(config.monitor.impact_threshold, parsed.monitor.impact_threshold);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[client]
dest_ip = "10.0.0.7"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.client.dest_ip, "10.0.0.7");
        // Outros campos devem ter valor padrão
        assert_eq!(config.client.dest_port, 5555);
        assert_eq!(config.client.listen_port, 5556);
        assert_eq!(config.client.min_send_interval_ms, 20);
        assert_eq!(config.monitor.port, 5555);
    }

    #[test]
    fn invalid_port_text_defaults_to_5555() {
        assert_eq!(Endpoint::from_input("10.0.0.2", "abc").port, 5555);
        assert_eq!(Endpoint::from_input("10.0.0.2", "").port, 5555);
        assert_eq!(Endpoint::from_input("10.0.0.2", "70000").port, 5555);
        assert_eq!(Endpoint::from_input("10.0.0.2", "0").port, 5555);
        assert_eq!(Endpoint::from_input(" 10.0.0.2 ", " 6000 "), Endpoint::new("10.0.0.2", 6000));
    }

    #[test]
    fn timings_follow_config() {
        let c = ClientConfig {
            sos_hold_ms: 100,
            false_alarm_cooldown_ms: 50,
            ..Default::default()
        };
        let t = c.alert_timings();
        assert_eq!(t.sos_hold, Duration::from_millis(100));
        assert_eq!(t.false_alarm_cooldown, Duration::from_millis(50));
        assert_eq!(c.min_send_interval(), Duration::from_millis(20));
    }

    #[test]
    fn outbound_bind_defaults_to_any() {
        let mut c = ClientConfig::default();
        assert_eq!(c.outbound_bind_addr(), "0.0.0.0:0");
        c.bind_ip = "127.0.0.1".into();
        assert_eq!(c.outbound_bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let path = std::env::temp_dir().join(format!("sentinela-config-{}.toml", std::process::id()));
        let mut config = AppConfig::default();
        config.client.dest_ip = "172.16.0.9".into();
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.client.dest_ip, "172.16.0.9");
    }
}
