//! Protocolo de comunicação textual.
//!
//! Dois fluxos UDP independentes:
//!
//! ```text
//! cliente → monitor   accX,accY,accZ,gyroX,gyroY,gyroZ,light,battery,sosState,lat,lon
//! monitor → cliente   ALERT | SAFE
//! ```
//!
//! - Um frame por datagrama, sem newline nem prefixo de tamanho
//! - Aceleração/giroscópio com 3 casas, luz com 1, lat/lon com 6
//! - Separador decimal sempre `.` (a formatação do Rust não depende de locale)

use crate::types::{SensorSnapshot, SosState, TelemetryFrame};
use std::fmt::Write as _;

/// Número de campos de um frame.
pub const FIELD_COUNT: usize = 11;

/// Tamanho do buffer de recepção (frames e comandos cabem com folga).
pub const MAX_DATAGRAM: usize = 1024;

/// Erros de decodificação.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame malformado: {0}")]
    MalformedFrame(String),
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedFrame(reason.into())
}

/// Codifica um [`TelemetryFrame`] para transmissão UDP.
///
/// Valores não finitos saem como zero para nunca corromper o frame.
pub fn encode_frame(frame: &TelemetryFrame) -> Vec<u8> {
    let s = &frame.sensors;
    let mut line = String::with_capacity(96);
    for v in s.acc.iter().chain(s.gyro.iter()) {
        let _ = write!(line, "{:.3},", finite_f32(*v));
    }
    let _ = write!(
        line,
        "{:.1},{},{},{:.6},{:.6}",
        finite_f32(s.light),
        frame.battery.min(100),
        frame.sos.code(),
        finite_f64(frame.lat),
        finite_f64(frame.lon),
    );
    line.into_bytes()
}

/// Decodifica bytes recebidos via UDP em [`TelemetryFrame`].
///
/// Exige exatamente [`FIELD_COUNT`] campos numéricos; nada é aplicado
/// parcialmente.
pub fn decode_frame(data: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    let text = std::str::from_utf8(data).map_err(|_| malformed("não é UTF-8"))?;
    let fields: Vec<&str> = text.trim().split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(malformed(format!(
            "{} campos (esperado {FIELD_COUNT})",
            fields.len()
        )));
    }

    let mut sensors = [0.0_f32; 7];
    for (slot, field) in sensors.iter_mut().zip(&fields[..7]) {
        *slot = parse_f32(field)?;
    }

    let battery: u8 = fields[7]
        .parse()
        .map_err(|_| malformed(format!("bateria inválida: {:?}", fields[7])))?;
    if battery > 100 {
        return Err(malformed(format!("bateria fora de 0–100: {battery}")));
    }

    let sos = fields[8]
        .parse::<u8>()
        .ok()
        .and_then(SosState::from_code)
        .ok_or_else(|| malformed(format!("sosState inválido: {:?}", fields[8])))?;

    Ok(TelemetryFrame {
        sensors: SensorSnapshot {
            acc: [sensors[0], sensors[1], sensors[2]],
            gyro: [sensors[3], sensors[4], sensors[5]],
            light: sensors[6],
        },
        battery,
        sos,
        lat: parse_f64(fields[9])?,
        lon: parse_f64(fields[10])?,
    })
}

fn parse_f32(field: &str) -> Result<f32, DecodeError> {
    field
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| malformed(format!("campo não numérico: {field:?}")))
}

fn parse_f64(field: &str) -> Result<f64, DecodeError> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| malformed(format!("campo não numérico: {field:?}")))
}

fn finite_f32(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

fn finite_f64(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

// ──────────────────────────────────────────────
// Comandos monitor → cliente
// ──────────────────────────────────────────────

/// Comando textual enviado pelo monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Queda confirmada pelo monitor
    Alert,
    /// Monitor confirmou que está tudo bem
    Safe,
}

impl Command {
    /// Interpreta um datagrama. Qualquer coisa além de `ALERT`/`SAFE`
    /// (sensível a maiúsculas, após trim) retorna `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match std::str::from_utf8(data).ok()?.trim() {
            "ALERT" => Some(Command::Alert),
            "SAFE" => Some(Command::Safe),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Alert => "ALERT",
            Command::Safe => "SAFE",
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> TelemetryFrame {
        TelemetryFrame {
            sensors: SensorSnapshot {
                acc: [0.1, 0.2, 9.8],
                gyro: [0.0, 0.0, 0.0],
                light: 120.0,
            },
            battery: 77,
            sos: SosState::Idle,
            lat: 37.123456,
            lon: -122.654321,
        }
    }

    #[test]
    fn encodes_reference_frame_exactly() {
        let encoded = encode_frame(&sample_frame());
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            "0.100,0.200,9.800,0.000,0.000,0.000,120.0,77,0,37.123456,-122.654321"
        );
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = TelemetryFrame {
            sensors: SensorSnapshot {
                acc: [-1.25, 3.5, 9.806],
                gyro: [0.012, -0.5, 2.0],
                light: 3.5,
            },
            battery: 5,
            sos: SosState::FalseAlarmCooldown,
            lat: -23.55052,
            lon: -46.633308,
        };
        let decoded = decode_frame(&encode_frame(&original)).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn non_finite_values_encode_as_zero() {
        let mut frame = sample_frame();
        frame.sensors.acc[0] = f32::NAN;
        frame.lon = f64::NEG_INFINITY;
        let text = String::from_utf8(encode_frame(&frame)).unwrap();
        assert!(text.starts_with("0.000,0.200,"));
        assert!(text.ends_with(",37.123456,0.000000"));
        assert!(decode_frame(text.as_bytes()).is_ok());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(
            decode_frame(b"1,2,3"),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_frame(b"0.1,0.2,9.8,0,0,0,120.0,77,0,37.1,-122.6,99"),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert!(decode_frame(b"").is_err());
    }

    #[test]
    fn rejects_non_numeric_field() {
        assert!(decode_frame(b"0.1,abc,9.8,0,0,0,120.0,77,0,37.1,-122.6").is_err());
        assert!(decode_frame(b"0.1,0.2,9.8,0,0,0,120.0,77,0,NaN,-122.6").is_err());
        assert!(decode_frame(b"0.1,0.2,9.8,0,0,0,120.0,7.5,0,37.1,-122.6").is_err());
    }

    #[test]
    fn rejects_out_of_range_integers() {
        assert!(decode_frame(b"0,0,0,0,0,0,0,101,0,0,0").is_err());
        assert!(decode_frame(b"0,0,0,0,0,0,0,50,3,0,0").is_err());
        assert!(decode_frame(b"0,0,0,0,0,0,0,50,2,0,0").is_ok());
    }

    #[test]
    fn rejects_locale_comma_decimal() {
        // "0,100" com vírgula decimal produz campos demais
        let broken = "0,100,0,200,9,800,0,000,0,000,0,000,120,0,77,0,37,123456,-122,654321";
        assert!(decode_frame(broken.as_bytes()).is_err());
    }

    #[test]
    fn decode_tolerates_trailing_newline() {
        let mut bytes = encode_frame(&sample_frame());
        bytes.push(b'\n');
        assert_eq!(decode_frame(&bytes).unwrap(), sample_frame());
    }

    #[test]
    fn parses_known_commands_only() {
        assert_eq!(Command::parse(b"ALERT"), Some(Command::Alert));
        assert_eq!(Command::parse(b"  SAFE\r\n"), Some(Command::Safe));
        assert_eq!(Command::parse(b"alert"), None);
        assert_eq!(Command::parse(b"PING"), None);
        assert_eq!(Command::parse(&[0xFF, 0xFE]), None);
        assert_eq!(Command::parse(Command::Alert.as_str().as_bytes()), Some(Command::Alert));
    }
}
