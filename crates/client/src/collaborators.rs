//! Interfaces consumidas pela sessão e fornecidas pelo shell do aplicativo.
//!
//! Leitura de sensores, bateria, localização e UI ficam fora do núcleo. Os
//! sensores empurram leituras chamando [`crate::Session::on_sensor_reading`]
//! / [`crate::Session::on_location_update`]; o resto é consultado aqui.

use sentinela_core::GeoFix;
use std::sync::Arc;

pub use sentinela_core::NotificationSink;

/// Consulta síncrona do nível de bateria, chamada uma vez por envio.
pub trait BatteryQuery: Send + Sync {
    /// Percentual atual (valores fora de 0–100 são limitados no frame).
    fn level(&self) -> i32;
}

impl<F> BatteryQuery for F
where
    F: Fn() -> i32 + Send + Sync,
{
    fn level(&self) -> i32 {
        self()
    }
}

/// Serviço de localização do dispositivo.
pub trait LocationProvider: Send + Sync {
    /// Algum provedor (GPS ou rede) está habilitado.
    fn is_available(&self) -> bool;

    /// Última posição conhecida, usada antes da primeira atualização ao vivo.
    fn last_known(&self) -> Option<GeoFix> {
        None
    }
}

/// Colaboradores entregues à sessão na criação.
#[derive(Clone)]
pub struct Collaborators {
    pub battery: Arc<dyn BatteryQuery>,
    pub location: Arc<dyn LocationProvider>,
    pub notifier: Arc<dyn NotificationSink>,
}
